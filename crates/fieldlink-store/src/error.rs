//! Store error types.

use thiserror::Error;

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors from the local persistence layer.
///
/// A `Backend` error means persisted storage is unavailable; callers degrade
/// to ephemeral state rather than failing the app (the identity service is
/// the canonical example).
#[derive(Debug, Error)]
pub enum StoreError {
    /// The underlying key-value backend failed.
    #[error("storage backend error: {0}")]
    Backend(String),

    /// A stored value did not parse as the expected shape.
    #[error("corrupt stored value under '{key}': {reason}")]
    Corrupt { key: String, reason: String },

    /// Failed to serialize a value for storage.
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}
