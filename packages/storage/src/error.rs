// ABOUTME: Error types for the session state store
// ABOUTME: Separates retryable store outages from logical failures

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    /// The database could not be reached. Callers may retry.
    #[error("State store unavailable: {0}")]
    Unavailable(#[source] sqlx::Error),

    #[error("Database error: {0}")]
    Database(#[source] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                StorageError::Unavailable(err)
            }
            other => StorageError::Database(other),
        }
    }
}

impl StorageError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StorageError::Unavailable(_))
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_faults_are_retryable() {
        let err: StorageError = sqlx::Error::PoolTimedOut.into();
        assert!(err.is_retryable());

        let err: StorageError = sqlx::Error::PoolClosed.into();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_logical_errors_are_not_retryable() {
        let err: StorageError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, StorageError::Database(_)));
        assert!(!err.is_retryable());
        assert!(!StorageError::TaskNotFound("t1".into()).is_retryable());
    }
}
