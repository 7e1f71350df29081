//! # Device Identity
//!
//! Value type for the per-installation identity, plus receiving-side
//! validation of device ids.
//!
//! ## Identity Contract
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Device Identity Contract                          │
//! │                                                                         │
//! │  device_id    UUID v4, stable for the lifetime of the install.         │
//! │               Exactly one per installation until an explicit,          │
//! │               audited reset. Used as the connection credential         │
//! │               alongside the access token.                              │
//! │                                                                         │
//! │  fingerprint  Best-effort entropy hash (hex SHA-256). Informational    │
//! │               only - NEVER used as an auth secret.                     │
//! │                                                                         │
//! │  Validation   Receivers reject non-UUID-v4 ids with a typed error;     │
//! │               correctness is enforced where the value is consumed,     │
//! │               not just where it is generated.                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::{Uuid, Version};

use crate::error::CoreError;

// =============================================================================
// Platform
// =============================================================================

/// Operating platform the installation runs on. Sent in the auth handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Android,
    Ios,
    Desktop,
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Platform::Android => write!(f, "android"),
            Platform::Ios => write!(f, "ios"),
            Platform::Desktop => write!(f, "desktop"),
        }
    }
}

impl std::str::FromStr for Platform {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "android" => Ok(Platform::Android),
            "ios" => Ok(Platform::Ios),
            "desktop" => Ok(Platform::Desktop),
            other => Err(CoreError::UnknownPlatform(other.to_string())),
        }
    }
}

// =============================================================================
// Device Identity
// =============================================================================

/// The persisted identity of this installation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceIdentity {
    /// Stable per-installation identifier (UUID v4).
    pub device_id: String,

    /// Best-effort entropy hash. Informational, never an auth secret.
    pub fingerprint: String,

    /// Platform this identity was generated on.
    pub platform: Platform,

    /// When the identity was first generated.
    pub registered_at: DateTime<Utc>,

    /// Last time the identity was presented in a handshake.
    pub last_used_at: DateTime<Utc>,
}

impl DeviceIdentity {
    /// Validates the identity's device id against the UUID v4 contract.
    pub fn validate(&self) -> Result<(), CoreError> {
        validate_device_id(&self.device_id)
    }
}

// =============================================================================
// Validation
// =============================================================================

/// Checks that a device id is a well-formed UUID v4.
///
/// Any non-conforming value is rejected here by the receiving side; a
/// malformed id must never travel further into the handshake.
pub fn validate_device_id(value: &str) -> Result<(), CoreError> {
    let uuid = Uuid::parse_str(value).map_err(|e| CoreError::InvalidDeviceId {
        value: value.to_string(),
        reason: e.to_string(),
    })?;

    if uuid.get_version() != Some(Version::Random) {
        return Err(CoreError::InvalidDeviceId {
            value: value.to_string(),
            reason: format!("expected UUID version 4, got {:?}", uuid.get_version_num()),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_v4_uuid() {
        let id = Uuid::new_v4().to_string();
        assert!(validate_device_id(&id).is_ok());
    }

    #[test]
    fn rejects_garbage() {
        assert!(validate_device_id("not-a-uuid").is_err());
        assert!(validate_device_id("").is_err());
    }

    #[test]
    fn rejects_wrong_version() {
        // Nil UUID parses but is not version 4.
        assert!(validate_device_id("00000000-0000-0000-0000-000000000000").is_err());
        // v1-style UUID (version nibble = 1).
        assert!(validate_device_id("8a6e0804-2bd0-1338-bb9d-8b2b9c9f0b0d").is_err());
    }

    #[test]
    fn platform_roundtrip() {
        for p in ["android", "ios", "desktop"] {
            let parsed: Platform = p.parse().unwrap();
            assert_eq!(parsed.to_string(), p);
        }
        assert!("amiga".parse::<Platform>().is_err());
    }
}
