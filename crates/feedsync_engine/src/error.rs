//! Error types for the sync engine.

use feedsync_model::{EntityId, ModelError};
use feedsync_storage::StorageError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The remote store could not be reached.
    #[error("remote store offline: {0}")]
    Offline(String),

    /// A remote call did not complete within the configured timeout.
    #[error("remote operation timed out")]
    Timeout,

    /// The remote store rejected the request.
    #[error("remote error: {0}")]
    Remote(String),

    /// The requested entity does not exist in any tier.
    #[error("entity not found: {0}")]
    NotFound(EntityId),

    /// A cached or remote payload could not be decoded.
    #[error("failed to parse record {key}: {message}")]
    Parse {
        /// Local key or remote path of the record.
        key: String,
        /// Decoder message.
        message: String,
    },

    /// The entity failed write-time validation.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The ID was deleted earlier and can never be written again.
    #[error("entity {0} has been deleted")]
    Tombstoned(EntityId),

    /// Local storage failure.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// JSON encoding failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SyncError {
    /// Creates an offline error.
    pub fn offline(message: impl Into<String>) -> Self {
        Self::Offline(message.into())
    }

    /// Returns true if the failed operation should be retried later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Offline(_) | SyncError::Timeout)
    }
}

impl From<ModelError> for SyncError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::InvalidRecord { key, message } => SyncError::Parse { key, message },
            ModelError::Encoding(e) => SyncError::Serialization(e),
            other => SyncError::Validation(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(SyncError::offline("no network").is_retryable());
        assert!(SyncError::Timeout.is_retryable());
        assert!(!SyncError::Remote("permission denied".into()).is_retryable());
        assert!(!SyncError::Validation("empty".into()).is_retryable());
        assert!(!SyncError::Tombstoned("p1".into()).is_retryable());
    }

    #[test]
    fn model_errors_map_by_category() {
        let err: SyncError = ModelError::SelfFollow("alice".into()).into();
        assert!(matches!(err, SyncError::Validation(_)));

        let err: SyncError = ModelError::invalid_record("posts/p1", "bad json").into();
        assert!(matches!(err, SyncError::Parse { ref key, .. } if key == "posts/p1"));
    }

    #[test]
    fn error_display() {
        let err = SyncError::Tombstoned("p1".into());
        assert_eq!(err.to_string(), "entity p1 has been deleted");
        assert_eq!(SyncError::Timeout.to_string(), "remote operation timed out");
    }
}
