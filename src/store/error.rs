//! Storage layer error types
//!
//! The taxonomy distinguishes recoverable conditions (pool exhaustion, bad
//! query parameters) from fatal ones (schema mismatch at startup, store
//! unusable).

use thiserror::Error;

/// Errors that can occur in the storage layer
#[derive(Error, Debug)]
pub enum StoreError {
    /// No pooled handle became available within the acquire timeout.
    /// Recoverable: retry with backoff.
    #[error("connection pool exhausted after waiting {waited_ms}ms")]
    PoolExhausted { waited_ms: u64 },

    /// The live store structure does not match the expected definition.
    /// Fatal at startup.
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    /// Malformed query parameters, rejected before execution
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// A record failed validation before reaching the store
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    /// A migration step failed; prior migrations remain committed
    #[error("migration '{name}' failed: {reason}")]
    Migration { name: String, reason: String },

    /// Bulk import failed
    #[error("import error: {0}")]
    Import(String),

    /// Operation attempted before `initialize()` completed
    #[error("store not initialized: call initialize() first")]
    NotInitialized,

    /// Underlying SQLite error (locked, full, corrupt, ...)
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Label/detail blob serialization failed
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Whether a caller should treat this error as transient and retry
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::PoolExhausted { .. })
    }
}

impl From<csv::Error> for StoreError {
    fn from(err: csv::Error) -> Self {
        StoreError::Import(err.to_string())
    }
}

/// Result type alias for storage operations
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StoreError::PoolExhausted { waited_ms: 500 };
        assert_eq!(
            err.to_string(),
            "connection pool exhausted after waiting 500ms"
        );

        let err = StoreError::SchemaMismatch("table 'metrics' is missing".to_string());
        assert_eq!(err.to_string(), "schema mismatch: table 'metrics' is missing");
    }

    #[test]
    fn test_retryable_classification() {
        assert!(StoreError::PoolExhausted { waited_ms: 0 }.is_retryable());
        assert!(!StoreError::SchemaMismatch("x".into()).is_retryable());
        assert!(!StoreError::NotInitialized.is_retryable());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let store_err: StoreError = io_err.into();
        assert!(matches!(store_err, StoreError::Io(_)));
    }
}
