//! Thin PostgreSQL access layer built on sqlx
//!
//! A [`Database`] wraps a connection pool configured from [`Config`]. Types
//! implementing [`Entity`] get a generic [`Repository`] with create, lookup,
//! filtered queries, pagination, counting and deletion, and can be migrated
//! additively with [`Database::auto_migrate`].
//!
//! ```no_run
//! use pgconnect::{Config, Database, DatabaseError};
//!
//! # async fn run() -> Result<(), DatabaseError> {
//! let config = Config::default();
//! let db = Database::connect(&config).await?;
//! db.ping().await?;
//! db.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod db;
pub mod entity;
pub mod errors;
pub mod filter;
pub mod sql;
pub mod telemetry;
pub mod value;

pub use config::{Config, LogLevel};
pub use db::{Database, Repository, Tx, TxRepository};
pub use entity::{Column, ColumnType, Entity, TableSchema};
pub use errors::DatabaseError;
pub use filter::Filter;
pub use value::SqlValue;
