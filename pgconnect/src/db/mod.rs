// Database layer: connection pool, repositories and transactions

pub mod pool;
pub mod repository;
pub mod transaction;

pub use pool::{Database, CONN_MAX_LIFETIME};
pub use repository::Repository;
pub use transaction::{Tx, TxRepository};
