//! # Sync Configuration
//!
//! Configuration for the connection and sync layer.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     FIELDLINK_SERVER_URL=wss://notify.example.com/agent                │
//! │     FIELDLINK_API_URL=https://api.example.com                          │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/fieldlink/sync.toml (Linux)                              │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # sync.toml
//! [connection]
//! server_url = "wss://notify.example.com/agent"
//! handshake_timeout_secs = 10
//! base_delay_ms = 1000
//! max_attempts = 5
//! jitter = 0.2
//!
//! [sync]
//! periodic_interval_secs = 300
//! retry_delay_secs = 30
//! stale_threshold = 3
//! retention_days = 30
//!
//! [api]
//! base_url = "https://api.example.com"
//! request_timeout_secs = 30
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Connection Settings
// =============================================================================

/// Settings for the notification connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionSettings {
    /// WebSocket URL of the notification server.
    #[serde(default)]
    pub server_url: String,

    /// Bound on the whole handshake (socket open + auth exchange), seconds.
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout_secs: u64,

    /// First reconnect delay, milliseconds. Delay n is
    /// `base · 2^(n-1)`, capped at `max_delay_secs`.
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,

    /// Cap on a single reconnect delay, seconds.
    #[serde(default = "default_max_delay")]
    pub max_delay_secs: u64,

    /// Reconnect attempts before giving up and surfacing an error.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Randomization factor applied to each delay (0.0 = deterministic).
    /// Non-zero spreads reconnects across a fleet of devices.
    #[serde(default = "default_jitter")]
    pub jitter: f64,

    /// Keepalive ping interval, seconds.
    #[serde(default = "default_ping_interval")]
    pub ping_interval_secs: u64,
}

fn default_handshake_timeout() -> u64 {
    10
}
fn default_base_delay() -> u64 {
    1_000
}
fn default_max_delay() -> u64 {
    60
}
fn default_max_attempts() -> u32 {
    5
}
fn default_jitter() -> f64 {
    0.2
}
fn default_ping_interval() -> u64 {
    30
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        ConnectionSettings {
            server_url: String::new(),
            handshake_timeout_secs: default_handshake_timeout(),
            base_delay_ms: default_base_delay(),
            max_delay_secs: default_max_delay(),
            max_attempts: default_max_attempts(),
            jitter: default_jitter(),
            ping_interval_secs: default_ping_interval(),
        }
    }
}

impl ConnectionSettings {
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_secs(self.max_delay_secs)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }
}

// =============================================================================
// Sync Settings
// =============================================================================

/// Settings for the sync engine and background scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Interval between periodic syncs while foregrounded, seconds.
    #[serde(default = "default_periodic_interval")]
    pub periodic_interval_secs: u64,

    /// Delay before the single automatic retry after a failed session.
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,

    /// Consecutive failures before the stale-data signal is raised.
    #[serde(default = "default_stale_threshold")]
    pub stale_threshold: u32,

    /// Retention window for queued local mutations, days. Entries older
    /// than this are pruned by session-start maintenance.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

fn default_periodic_interval() -> u64 {
    300
}
fn default_retry_delay() -> u64 {
    30
}
fn default_stale_threshold() -> u32 {
    3
}
fn default_retention_days() -> u32 {
    30
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            periodic_interval_secs: default_periodic_interval(),
            retry_delay_secs: default_retry_delay(),
            stale_threshold: default_stale_threshold(),
            retention_days: default_retention_days(),
        }
    }
}

impl SyncSettings {
    pub fn periodic_interval(&self) -> Duration {
        Duration::from_secs(self.periodic_interval_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

// =============================================================================
// Case API Settings
// =============================================================================

/// Settings for the read-only case API used by delta pulls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSettings {
    /// Base URL of the case API.
    #[serde(default)]
    pub base_url: String,

    /// Per-request timeout, seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for ApiSettings {
    fn default() -> Self {
        ApiSettings {
            base_url: String::new(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

// =============================================================================
// Storage Settings
// =============================================================================

/// Settings for the local key-value store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageSettings {
    /// SQLite database path. Empty = platform data directory default.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

// =============================================================================
// Main Configuration
// =============================================================================

/// Complete sync layer configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub connection: ConnectionSettings,

    #[serde(default)]
    pub sync: SyncSettings,

    #[serde(default)]
    pub api: ApiSettings,

    #[serde(default)]
    pub storage: StorageSettings,
}

impl SyncConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (sync.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading sync config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns defaults if loading fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load sync config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SyncError::ConfigSave("no config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Sync config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        if !self.connection.server_url.is_empty()
            && !self.connection.server_url.starts_with("ws://")
            && !self.connection.server_url.starts_with("wss://")
        {
            return Err(SyncError::InvalidUrl(format!(
                "server_url must start with ws:// or wss://, got: {}",
                self.connection.server_url
            )));
        }

        if !self.api.base_url.is_empty()
            && !self.api.base_url.starts_with("http://")
            && !self.api.base_url.starts_with("https://")
        {
            return Err(SyncError::InvalidUrl(format!(
                "api base_url must start with http:// or https://, got: {}",
                self.api.base_url
            )));
        }

        if self.connection.max_attempts == 0 {
            return Err(SyncError::InvalidConfig(
                "max_attempts must be at least 1".into(),
            ));
        }

        if self.connection.base_delay_ms == 0 {
            return Err(SyncError::InvalidConfig(
                "base_delay_ms must be greater than 0".into(),
            ));
        }

        if !(0.0..1.0).contains(&self.connection.jitter) {
            return Err(SyncError::InvalidConfig(
                "jitter must be in [0.0, 1.0)".into(),
            ));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("FIELDLINK_SERVER_URL") {
            debug!(url = %url, "Overriding server URL from environment");
            self.connection.server_url = url;
        }

        if let Ok(url) = std::env::var("FIELDLINK_API_URL") {
            debug!(url = %url, "Overriding API URL from environment");
            self.api.base_url = url;
        }

        if let Ok(path) = std::env::var("FIELDLINK_STORE_PATH") {
            self.storage.path = Some(PathBuf::from(path));
        }

        if let Ok(interval) = std::env::var("FIELDLINK_SYNC_INTERVAL_SECS") {
            if let Ok(secs) = interval.parse::<u64>() {
                self.sync.periodic_interval_secs = secs;
            }
        }

        if let Ok(attempts) = std::env::var("FIELDLINK_MAX_ATTEMPTS") {
            if let Ok(n) = attempts.parse::<u32>() {
                self.connection.max_attempts = n;
            }
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "fieldlink", "fieldlink")
            .map(|dirs| dirs.config_dir().join("sync.toml"))
    }

    /// Returns the default store path (platform data directory).
    pub fn default_store_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "fieldlink", "fieldlink")
            .map(|dirs| dirs.data_dir().join("fieldlink.db"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = SyncConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.connection.max_attempts, 5);
        assert_eq!(config.connection.handshake_timeout_secs, 10);
        assert_eq!(config.sync.stale_threshold, 3);
    }

    #[test]
    fn rejects_bad_urls() {
        let mut config = SyncConfig::default();
        config.connection.server_url = "http://not-a-ws-url".to_string();
        assert!(config.validate().is_err());

        config.connection.server_url = "wss://ok.example.com".to_string();
        assert!(config.validate().is_ok());

        config.api.base_url = "ftp://nope".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_degenerate_backoff() {
        let mut config = SyncConfig::default();
        config.connection.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = SyncConfig::default();
        config.connection.jitter = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn toml_roundtrip() {
        let config = SyncConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[connection]"));
        assert!(toml_str.contains("[sync]"));

        let parsed: SyncConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.connection.max_attempts, config.connection.max_attempts);
    }
}
