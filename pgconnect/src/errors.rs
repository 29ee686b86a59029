// Error handling framework

use thiserror::Error;

/// SQLSTATE for unique constraint violations
const UNIQUE_VIOLATION: &str = "23505";
/// SQLSTATE for foreign key violations
const FOREIGN_KEY_VIOLATION: &str = "23503";

/// Database-specific errors
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Database connection failed: {message}")]
    ConnectionFailed {
        message: String,
        #[source]
        source: Option<sqlx::Error>,
    },

    #[error("Migration failed for table '{table}': {source}")]
    MigrationFailed {
        table: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Query execution failed: {0}")]
    QueryFailed(#[source] sqlx::Error),

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("Transaction failed: {0}")]
    TransactionFailed(#[source] sqlx::Error),
}

impl DatabaseError {
    pub(crate) fn connection(message: impl Into<String>) -> Self {
        DatabaseError::ConnectionFailed {
            message: message.into(),
            source: None,
        }
    }

    pub(crate) fn connection_with(message: impl Into<String>, source: sqlx::Error) -> Self {
        let message = format!("{}: {}", message.into(), source);
        DatabaseError::ConnectionFailed {
            message,
            source: Some(source),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, DatabaseError::NotFound(_))
    }

    pub fn is_connection(&self) -> bool {
        matches!(self, DatabaseError::ConnectionFailed { .. })
    }

    /// True when the database rejected a write on a unique constraint
    pub fn is_unique_violation(&self) -> bool {
        self.has_sqlstate(UNIQUE_VIOLATION)
    }

    /// True when the database rejected a write on a foreign key
    pub fn is_foreign_key_violation(&self) -> bool {
        self.has_sqlstate(FOREIGN_KEY_VIOLATION)
    }

    fn has_sqlstate(&self, state: &str) -> bool {
        match self {
            DatabaseError::QueryFailed(sqlx::Error::Database(db_err))
            | DatabaseError::TransactionFailed(sqlx::Error::Database(db_err)) => {
                db_err.code().as_deref() == Some(state)
            }
            _ => false,
        }
    }
}

// Classify driver errors into the crate taxonomy
impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DatabaseError::NotFound("Record not found".to_string()),
            sqlx::Error::PoolClosed
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_) => DatabaseError::ConnectionFailed {
                message: err.to_string(),
                source: Some(err),
            },
            other => DatabaseError::QueryFailed(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        let err: DatabaseError = sqlx::Error::RowNotFound.into();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_pool_closed_maps_to_connection_failed() {
        let err: DatabaseError = sqlx::Error::PoolClosed.into();
        assert!(err.is_connection());
        assert!(err.to_string().contains("Database connection failed"));
    }

    #[test]
    fn test_pool_timeout_maps_to_connection_failed() {
        let err: DatabaseError = sqlx::Error::PoolTimedOut.into();
        assert!(err.is_connection());
    }

    #[test]
    fn test_other_errors_map_to_query_failed() {
        let err: DatabaseError = sqlx::Error::ColumnNotFound("email".to_string()).into();
        assert!(matches!(err, DatabaseError::QueryFailed(_)));
        assert!(err.to_string().contains("email"));
        assert!(!err.is_unique_violation());
    }

    #[test]
    fn test_connection_with_keeps_source() {
        let err = DatabaseError::connection_with("open failed", sqlx::Error::PoolTimedOut);
        assert!(std::error::Error::source(&err).is_some());
        assert!(err.to_string().contains("open failed"));
    }
}
