// PostgreSQL connection pool wrapper: ping, close, auto-migration, transactions

use super::transaction::{transaction_error, Tx};
use crate::config::{Config, LogLevel};
use crate::entity::TableSchema;
use crate::errors::DatabaseError;
use crate::sql;
use futures::future::BoxFuture;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Connection;
use std::time::Duration;
use tracing::{info, instrument};

/// Maximum lifetime of a pooled connection; fixed, not part of [`Config`]
pub const CONN_MAX_LIFETIME: Duration = Duration::from_secs(60 * 60);

/// Idle connections above the minimum are closed after this long
pub const CONN_MAX_IDLE_TIME: Duration = Duration::from_secs(5 * 60);

const SET_TIME_ZONE: &str = "SELECT set_config('TimeZone', $1, false)";

/// Pool limits and per-connection session setup for `config`
///
/// sqlx keeps no idle ceiling, so idle connections are reaped after
/// [`CONN_MAX_IDLE_TIME`] instead and the pool holds none open at rest.
/// sqlx also pins `TimeZone=UTC` in the startup packet, so the configured
/// zone is applied with `set_config` on every new connection.
pub(crate) fn pool_options(config: &Config) -> Result<PgPoolOptions, DatabaseError> {
    if config.max_open_conns == 0 {
        return Err(DatabaseError::connection(
            "max_open_conns must be greater than 0",
        ));
    }

    let time_zone = config.time_zone.clone();
    Ok(PgPoolOptions::new()
        .max_connections(config.max_open_conns)
        .min_connections(0)
        .idle_timeout(CONN_MAX_IDLE_TIME)
        .max_lifetime(CONN_MAX_LIFETIME)
        .after_connect(move |conn, _meta| {
            let time_zone = time_zone.clone();
            Box::pin(async move {
                sqlx::query(SET_TIME_ZONE)
                    .bind(time_zone)
                    .execute(conn)
                    .await?;
                Ok(())
            })
        }))
}

/// Shared handle to a PostgreSQL connection pool
///
/// Cloning is cheap and every clone refers to the same pool. Repositories
/// hold clones; the application owns shutdown through [`Database::close`].
#[derive(Debug, Clone)]
pub struct Database {
    pool: PgPool,
    log_level: LogLevel,
}

impl Database {
    /// Open a connection pool for `config`
    ///
    /// One connection is established before returning, so an unreachable
    /// server or bad credentials fail here rather than on first use.
    ///
    /// # Errors
    /// Returns `DatabaseError::ConnectionFailed` if the options are rejected
    /// or no connection can be opened.
    #[instrument(skip(config), fields(
        host = %config.host,
        database = %config.database_name,
        max_open_conns = config.max_open_conns,
        max_idle_conns = config.max_idle_conns
    ))]
    pub async fn connect(config: &Config) -> Result<Self, DatabaseError> {
        info!(dsn = %config.redacted_dsn(), "Initializing database connection pool");

        let options = config.connect_options()?;
        let pool = pool_options(config)?
            .connect_with(options)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to create database pool");
                DatabaseError::connection_with("failed to connect to database", e)
            })?;

        info!(
            max_open_conns = config.max_open_conns,
            max_lifetime_secs = CONN_MAX_LIFETIME.as_secs(),
            time_zone = %config.time_zone,
            "Database connection pool initialized successfully"
        );

        Ok(Self {
            pool,
            log_level: config.log_level,
        })
    }

    /// Wrap an existing pool
    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            log_level: LogLevel::default(),
        }
    }

    /// Set the level used for reporting failed statements
    pub fn with_log_level(mut self, log_level: LogLevel) -> Self {
        self.log_level = log_level;
        self
    }

    /// Get a reference to the underlying pool
    ///
    /// Use this for queries the repositories do not cover
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn log_level(&self) -> LogLevel {
        self.log_level
    }

    /// Check that a connection can be acquired and answers a ping
    ///
    /// # Errors
    /// Returns `DatabaseError::ConnectionFailed` when the pool is closed, the
    /// server is unreachable or the session was rejected.
    #[instrument(skip(self))]
    pub async fn ping(&self) -> Result<(), DatabaseError> {
        let mut conn = self.pool.acquire().await.map_err(|e| {
            tracing::error!(error = %e, "Database ping failed to acquire a connection");
            DatabaseError::connection_with("failed to acquire connection", e)
        })?;

        conn.ping().await.map_err(|e| {
            tracing::error!(error = %e, "Database ping failed");
            DatabaseError::connection_with("ping failed", e)
        })?;

        tracing::debug!("Database ping succeeded");
        Ok(())
    }

    /// Close the connection pool gracefully
    ///
    /// Waits for checked-out connections to be returned. Closing an already
    /// closed pool is a no-op; any later [`Database::ping`] fails.
    #[instrument(skip(self))]
    pub async fn close(&self) -> Result<(), DatabaseError> {
        if self.pool.is_closed() {
            tracing::debug!("Database connection pool already closed");
            return Ok(());
        }

        info!("Closing database connection pool");
        self.pool.close().await;
        info!("Database connection pool closed");
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }

    /// Get the current number of connections in the pool
    pub fn size(&self) -> u32 {
        self.pool.size()
    }

    /// Get the number of idle connections in the pool
    pub fn num_idle(&self) -> usize {
        self.pool.num_idle()
    }

    /// Create or extend tables so they hold every column of `models`
    ///
    /// Tables are processed in order. Missing tables are created, missing
    /// columns and indexes are added; existing columns are never altered or
    /// dropped.
    ///
    /// # Errors
    /// Returns `DatabaseError::MigrationFailed` naming the first table whose
    /// DDL was rejected. Tables migrated before it stay migrated.
    #[instrument(skip(self, models), fields(tables = models.len()))]
    pub async fn auto_migrate(&self, models: &[TableSchema]) -> Result<(), DatabaseError> {
        for schema in models {
            for statement in sql::migration_statements(schema) {
                tracing::debug!(table = schema.table, statement = %statement, "Applying DDL");
                sqlx::query(&statement)
                    .execute(&self.pool)
                    .await
                    .map_err(|source| {
                        tracing::error!(table = schema.table, error = %source, "Migration failed");
                        DatabaseError::MigrationFailed {
                            table: schema.table.to_string(),
                            source,
                        }
                    })?;
            }
            info!(table = schema.table, "Table migrated");
        }

        Ok(())
    }

    /// Run `f` inside a transaction
    ///
    /// Commits when `f` returns `Ok` and rolls back when it returns `Err`.
    /// If `f` panics or its future is dropped, the transaction is rolled back
    /// when the connection is returned to the pool.
    ///
    /// ```no_run
    /// # use pgconnect::{Database, DatabaseError};
    /// # async fn demo(db: Database) -> Result<(), DatabaseError> {
    /// let affected = db
    ///     .with_transaction(|tx| {
    ///         Box::pin(async move {
    ///             let done = sqlx::query("UPDATE accounts SET balance = balance - 10 WHERE id = 1")
    ///                 .execute(tx.conn())
    ///                 .await?;
    ///             Ok::<_, DatabaseError>(done.rows_affected())
    ///         })
    ///     })
    ///     .await?;
    /// # assert!(affected <= 1);
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    /// Returns the callback's error after rolling back. A failed rollback is
    /// logged and does not replace that error. Failing to begin or commit
    /// yields `DatabaseError::TransactionFailed` (or `ConnectionFailed` when
    /// no connection is available).
    #[instrument(skip(self, f))]
    pub async fn with_transaction<F, R, E>(&self, f: F) -> Result<R, E>
    where
        F: for<'t> FnOnce(&'t mut Tx) -> BoxFuture<'t, Result<R, E>> + Send,
        R: Send,
        E: From<DatabaseError> + Send,
    {
        let inner = self
            .pool
            .begin()
            .await
            .map_err(|e| E::from(transaction_error(e)))?;
        let mut tx = Tx::new(inner, self.log_level);

        match f(&mut tx).await {
            Ok(value) => {
                tx.commit().await.map_err(E::from)?;
                tracing::debug!("Transaction committed");
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::error!(error = %rollback_err, "Transaction rollback failed");
                } else {
                    tracing::debug!("Transaction rolled back");
                }
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conn_max_lifetime_is_one_hour() {
        assert_eq!(CONN_MAX_LIFETIME, Duration::from_secs(3600));
    }

    #[tokio::test]
    async fn test_connect_rejects_bad_port_before_dialing() {
        let mut config = Config::default();
        config.port = "not-a-port".to_string();
        let err = Database::connect(&config).await.unwrap_err();
        assert!(err.is_connection());
    }

    #[tokio::test]
    async fn test_connect_rejects_zero_open_conns() {
        let mut config = Config::default();
        config.max_open_conns = 0;
        let err = Database::connect(&config).await.unwrap_err();
        assert!(err.is_connection());
        assert!(err.to_string().contains("max_open_conns"));
    }

    #[test]
    fn test_pool_options_hold_no_idle_floor() {
        let options = pool_options(&Config::default()).unwrap();
        assert_eq!(options.get_max_connections(), 100);
        assert_eq!(options.get_min_connections(), 0);
        assert_eq!(options.get_idle_timeout(), Some(CONN_MAX_IDLE_TIME));
        assert_eq!(options.get_max_lifetime(), Some(CONN_MAX_LIFETIME));
    }

    #[tokio::test]
    async fn test_closed_lazy_pool_fails_ping() {
        let pool = PgPoolOptions::new()
            .connect_lazy_with(Config::default().connect_options().unwrap());
        let db = Database::from_pool(pool);

        db.close().await.unwrap();
        assert!(db.is_closed());
        // Second close is a no-op
        db.close().await.unwrap();

        let err = db.ping().await.unwrap_err();
        assert!(err.is_connection());
    }

    #[tokio::test]
    #[ignore] // Requires running PostgreSQL instance
    async fn test_ping_live_database() {
        let db = Database::connect(&Config::default()).await.unwrap();
        assert!(db.ping().await.is_ok());
        db.close().await.unwrap();
    }
}
