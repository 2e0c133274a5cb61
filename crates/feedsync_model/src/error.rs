//! Error types for the model layer.

use thiserror::Error;

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors raised while validating or decoding entities.
#[derive(Debug, Error)]
pub enum ModelError {
    /// A record could not be decoded.
    #[error("invalid record {key}: {message}")]
    InvalidRecord {
        /// Key or path the record was read from.
        key: String,
        /// Decoder message.
        message: String,
    },

    /// An entity failed validation.
    #[error("invalid {kind}: {reason}")]
    Invalid {
        /// Entity kind name.
        kind: &'static str,
        /// Why validation failed.
        reason: String,
    },

    /// A follow edge points at its own follower.
    #[error("user {0} cannot follow themselves")]
    SelfFollow(String),

    /// Encoding an entity failed.
    #[error("encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl ModelError {
    /// Creates a validation error.
    pub fn invalid(kind: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            kind,
            reason: reason.into(),
        }
    }

    /// Creates a decode error for the record stored at `key`.
    pub fn invalid_record(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidRecord {
            key: key.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ModelError::invalid("post", "text is empty");
        assert_eq!(err.to_string(), "invalid post: text is empty");

        let err = ModelError::SelfFollow("u1".into());
        assert!(err.to_string().contains("u1"));

        let err = ModelError::invalid_record("posts/p1", "expected object");
        assert!(err.to_string().contains("posts/p1"));
    }
}
