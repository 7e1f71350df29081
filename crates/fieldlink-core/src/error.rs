//! Domain error types for fieldlink-core.

use thiserror::Error;

/// Errors produced by pure domain logic.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    /// A device identifier that is not a well-formed UUID v4.
    ///
    /// Enforced on the receiving side: any component handed a device id
    /// validates it rather than trusting that generation was correct.
    #[error("invalid device id '{value}': {reason}")]
    InvalidDeviceId { value: String, reason: String },

    /// Unknown case status string on the wire.
    #[error("unknown case status: '{0}'")]
    UnknownStatus(String),

    /// Unknown case priority string on the wire.
    #[error("unknown case priority: '{0}'")]
    UnknownPriority(String),

    /// Unknown platform string.
    #[error("unknown platform: '{0}'")]
    UnknownPlatform(String),
}
