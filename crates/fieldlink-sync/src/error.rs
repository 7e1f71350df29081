//! # Sync Error Types
//!
//! Error taxonomy for the connection and sync layer.
//!
//! ## Error Categories
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │      Auth       │  │    Network      │  │       Protocol          │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  Auth           │  │  Connection     │  │  Protocol               │ │
//! │  │  no auto-retry, │  │  Timeout        │  │  malformed frame:       │ │
//! │  │  surface for    │  │  Disconnected   │  │  logged and dropped,    │ │
//! │  │  re-login       │  │  retried with   │  │  connection stays up    │ │
//! │  │                 │  │  backoff        │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │      Api        │  │    Storage      │  │     Configuration       │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  delta pull     │  │  degrade to     │  │  InvalidConfig          │ │
//! │  │  failures,      │  │  ephemeral      │  │  InvalidUrl             │ │
//! │  │  retried        │  │  state, warn    │  │  ConfigLoad/Save        │ │
//! │  │  internally     │  │  once           │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Sync conflicts deliberately have no error variant: they are resolved by
//! the merge policy's tie-break and logged where they happen, never raised.

use thiserror::Error;

use fieldlink_core::CoreError;
use fieldlink_store::StoreError;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Sync error type covering connection, pull, and configuration failures.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Auth Errors (never auto-retried)
    // =========================================================================
    /// The server rejected our credentials. Surfaced for re-login; the
    /// reconnect loop must not spin on this.
    #[error("authentication failed: {0}")]
    Auth(String),

    // =========================================================================
    // Network Errors (transient, retried with backoff)
    // =========================================================================
    /// Failed to reach or keep the notification connection.
    #[error("connection failed: {0}")]
    Connection(String),

    /// Handshake or request exceeded its deadline.
    #[error("timed out after {0} seconds")]
    Timeout(u64),

    /// The connection dropped unexpectedly.
    #[error("disconnected from notification server")]
    Disconnected,

    /// Bounded reconnect gave up; the caller must re-initiate (typically
    /// after a token refresh).
    #[error("gave up after {attempts} connection attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    // =========================================================================
    // Protocol Errors (logged and dropped, connection stays up)
    // =========================================================================
    /// Malformed or unexpected frame.
    #[error("protocol error: {0}")]
    Protocol(String),

    // =========================================================================
    // Case API Errors (delta pull)
    // =========================================================================
    /// The read-only case API returned a failure.
    #[error("case api error: {0}")]
    Api(String),

    // =========================================================================
    // Storage Errors (degrade, warn once)
    // =========================================================================
    /// Local persistence failed.
    #[error(transparent)]
    Storage(#[from] StoreError),

    // =========================================================================
    // Domain Errors
    // =========================================================================
    #[error(transparent)]
    Core(#[from] CoreError),

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid sync configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Invalid server or API URL.
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// Failed to load the config file.
    #[error("failed to load config: {0}")]
    ConfigLoad(String),

    /// Failed to save the config file.
    #[error("failed to save config: {0}")]
    ConfigSave(String),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// A component channel closed underneath us.
    #[error("channel error: {0}")]
    Channel(String),

    /// The agent is shutting down.
    #[error("shutting down")]
    ShuttingDown,
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<tokio_tungstenite::tungstenite::Error> for SyncError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match err {
            WsError::ConnectionClosed | WsError::AlreadyClosed => SyncError::Disconnected,
            WsError::Protocol(p) => SyncError::Protocol(p.to_string()),
            WsError::Io(io) => SyncError::Connection(io.to_string()),
            other => SyncError::Connection(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Protocol(err.to_string())
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return SyncError::Timeout(0);
        }
        if err.is_connect() {
            return SyncError::Connection(err.to_string());
        }
        match err.status() {
            Some(status) if status.as_u16() == 401 || status.as_u16() == 403 => {
                SyncError::Auth(format!("case api returned {}", status))
            }
            _ => SyncError::Api(err.to_string()),
        }
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::InvalidUrl(err.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoad(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoad(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSave(err.to_string())
    }
}

// =============================================================================
// Error Categorization (drives the retry loops)
// =============================================================================

impl SyncError {
    /// True when backoff retry is the right response.
    ///
    /// Auth errors are deliberately NOT here: an expired token retried
    /// forever is a login prompt the user never sees.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::Connection(_)
                | SyncError::Timeout(_)
                | SyncError::Disconnected
                | SyncError::Api(_)
        )
    }

    /// True when the caller must re-authenticate before trying again.
    pub fn is_auth(&self) -> bool {
        matches!(self, SyncError::Auth(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(SyncError::Connection("refused".into()).is_retryable());
        assert!(SyncError::Timeout(10).is_retryable());
        assert!(SyncError::Disconnected.is_retryable());
        assert!(SyncError::Api("503".into()).is_retryable());

        assert!(!SyncError::Auth("expired token".into()).is_retryable());
        assert!(!SyncError::InvalidConfig("bad".into()).is_retryable());
        assert!(!SyncError::Protocol("garbage frame".into()).is_retryable());
    }

    #[test]
    fn auth_classification() {
        assert!(SyncError::Auth("expired".into()).is_auth());
        assert!(!SyncError::Disconnected.is_auth());
    }
}
