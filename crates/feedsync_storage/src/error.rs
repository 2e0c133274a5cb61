//! Error types for local store operations.

use std::io;
use thiserror::Error;

/// Result type for local store operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during local store operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The store file could not be decoded.
    #[error("store corrupted: {0}")]
    Corrupted(String),

    /// Another process holds the store directory lock.
    #[error("store directory is locked by another process: {0}")]
    Locked(String),

    /// The store is closed.
    #[error("store is closed")]
    Closed,

    /// A background persistence task failed to complete.
    #[error("background task failed: {0}")]
    Task(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        Self::Corrupted(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        assert_eq!(StorageError::Closed.to_string(), "store is closed");
        let err = StorageError::Locked("/tmp/feed".into());
        assert!(err.to_string().contains("/tmp/feed"));
    }

    #[test]
    fn json_errors_become_corruption() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: StorageError = json_err.into();
        assert!(matches!(err, StorageError::Corrupted(_)));
    }
}
