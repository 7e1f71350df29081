//! # Device Identity Service
//!
//! Owns the stable per-installation identity used as the connection
//! credential (alongside the access token).
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Device Identity Lifecycle                            │
//! │                                                                         │
//! │  first call ──► load from store ──► found + valid ──► cache, done       │
//! │                      │                                                  │
//! │                      ├── not found ──► generate UUID v4, persist        │
//! │                      │                                                  │
//! │                      ├── invalid  ───► regenerate (warn), persist       │
//! │                      │                                                  │
//! │                      └── storage error ──► EPHEMERAL identity for       │
//! │                          this session only + degraded-mode warning      │
//! │                          (identity is never silently dropped)           │
//! │                                                                         │
//! │  reset_identity() - explicit and audited; clears id + fingerprint and   │
//! │  forces server-side re-approval. NOTHING calls this implicitly.         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use fieldlink_core::device::{validate_device_id, DeviceIdentity, Platform};
use fieldlink_store::kv::KeyValue;

use crate::error::SyncResult;

const IDENTITY_KEY: &str = "identity/device";

// =============================================================================
// Service
// =============================================================================

/// Explicitly constructed, injectable identity service. One instance per
/// app; no global state.
pub struct DeviceIdentityService {
    kv: Arc<dyn KeyValue>,
    platform: Platform,

    /// Cached identity after first resolution; makes `device_id()`
    /// idempotent within a session.
    cached: RwLock<Option<DeviceIdentity>>,

    /// Set when storage failed and this session runs on an ephemeral
    /// identity. Gates the warning to once per session.
    degraded: AtomicBool,
}

impl DeviceIdentityService {
    pub fn new(kv: Arc<dyn KeyValue>, platform: Platform) -> Self {
        DeviceIdentityService {
            kv,
            platform,
            cached: RwLock::new(None),
            degraded: AtomicBool::new(false),
        }
    }

    /// Returns this installation's identity, resolving it on first call.
    ///
    /// Infallible by design: a storage failure degrades to an ephemeral
    /// identity rather than leaving the app without one.
    pub async fn identity(&self) -> DeviceIdentity {
        if let Some(identity) = self.cached.read().await.clone() {
            return identity;
        }

        let mut slot = self.cached.write().await;
        // Another caller may have resolved while we waited for the lock.
        if let Some(identity) = slot.clone() {
            return identity;
        }

        let identity = self.resolve().await;
        *slot = Some(identity.clone());
        identity
    }

    /// Returns the stable device id. Same value across repeated calls and,
    /// storage permitting, across app restarts.
    pub async fn device_id(&self) -> String {
        self.identity().await.device_id
    }

    /// True when this session fell back to an ephemeral identity.
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }

    /// Records that the identity was just presented in a handshake.
    /// Best-effort: a storage failure here is only logged.
    pub async fn touch(&self) {
        let mut slot = self.cached.write().await;
        if let Some(identity) = slot.as_mut() {
            identity.last_used_at = Utc::now();
            match serde_json::to_string(identity) {
                Ok(json) => {
                    if let Err(e) = self.kv.set(IDENTITY_KEY, &json).await {
                        debug!(error = %e, "Could not persist last_used_at");
                    }
                }
                Err(e) => debug!(error = %e, "Could not serialize identity"),
            }
        }
    }

    /// Clears the identity and generates a fresh one, forcing server-side
    /// re-approval of this installation.
    ///
    /// This is an explicit, audited operation - it logs at info with the
    /// old and new ids and must never be wired to an implicit trigger.
    pub async fn reset_identity(&self) -> SyncResult<DeviceIdentity> {
        let old_id = self
            .cached
            .read()
            .await
            .as_ref()
            .map(|i| i.device_id.clone());

        self.kv.remove(IDENTITY_KEY).await?;

        let fresh = self.generate();
        let json = serde_json::to_string(&fresh).map_err(fieldlink_store::StoreError::from)?;
        self.kv.set(IDENTITY_KEY, &json).await?;

        info!(
            old_device_id = ?old_id,
            new_device_id = %fresh.device_id,
            "Device identity reset"
        );

        *self.cached.write().await = Some(fresh.clone());
        self.degraded.store(false, Ordering::Relaxed);
        Ok(fresh)
    }

    // =========================================================================
    // Resolution
    // =========================================================================

    async fn resolve(&self) -> DeviceIdentity {
        match self.kv.get(IDENTITY_KEY).await {
            Ok(Some(json)) => match serde_json::from_str::<DeviceIdentity>(&json) {
                Ok(identity) if validate_device_id(&identity.device_id).is_ok() => {
                    debug!(device_id = %identity.device_id, "Loaded device identity");
                    return identity;
                }
                Ok(identity) => {
                    warn!(
                        device_id = %identity.device_id,
                        "Stored device id fails the UUID v4 contract, regenerating"
                    );
                }
                Err(e) => {
                    warn!(error = %e, "Stored identity is corrupt, regenerating");
                }
            },
            Ok(None) => {}
            Err(e) => {
                // Storage is down: ephemeral identity for this session only.
                if !self.degraded.swap(true, Ordering::Relaxed) {
                    warn!(
                        error = %e,
                        "Persisted storage unavailable, using ephemeral device \
                         identity for this session"
                    );
                }
                return self.generate();
            }
        }

        let fresh = self.generate();
        match serde_json::to_string(&fresh) {
            Ok(json) => {
                if let Err(e) = self.kv.set(IDENTITY_KEY, &json).await {
                    if !self.degraded.swap(true, Ordering::Relaxed) {
                        warn!(
                            error = %e,
                            "Could not persist device identity, it is ephemeral \
                             for this session"
                        );
                    }
                } else {
                    info!(device_id = %fresh.device_id, "Generated device identity");
                }
            }
            Err(e) => warn!(error = %e, "Could not serialize device identity"),
        }

        fresh
    }

    fn generate(&self) -> DeviceIdentity {
        let now = Utc::now();
        DeviceIdentity {
            device_id: Uuid::new_v4().to_string(),
            fingerprint: fingerprint(self.platform),
            platform: self.platform,
            registered_at: now,
            last_used_at: now,
        }
    }
}

// =============================================================================
// Fingerprint
// =============================================================================

/// Best-effort entropy hash describing the installation environment.
/// Informational only - never used as an auth secret.
fn fingerprint(platform: Platform) -> String {
    let mut hasher = Sha256::new();
    hasher.update(platform.to_string().as_bytes());
    hasher.update(std::env::consts::OS.as_bytes());
    hasher.update(std::env::consts::ARCH.as_bytes());
    hasher.update(Uuid::new_v4().as_bytes());

    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldlink_store::kv::MemoryKeyValue;

    #[tokio::test]
    async fn device_id_is_stable_within_session() {
        let service = DeviceIdentityService::new(
            Arc::new(MemoryKeyValue::new()),
            Platform::Android,
        );

        let first = service.device_id().await;
        let second = service.device_id().await;
        assert_eq!(first, second);
        assert!(validate_device_id(&first).is_ok());
    }

    #[tokio::test]
    async fn device_id_survives_restart_over_same_store() {
        let kv: Arc<dyn KeyValue> = Arc::new(MemoryKeyValue::new());

        let first = DeviceIdentityService::new(kv.clone(), Platform::Ios)
            .device_id()
            .await;

        // A new service over the same store models an app restart.
        let second = DeviceIdentityService::new(kv, Platform::Ios)
            .device_id()
            .await;

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn invalid_stored_id_is_regenerated() {
        let kv: Arc<dyn KeyValue> = Arc::new(MemoryKeyValue::new());
        kv.set(
            IDENTITY_KEY,
            r#"{"deviceId":"not-a-uuid","fingerprint":"","platform":"android",
                "registeredAt":"2024-01-01T00:00:00Z","lastUsedAt":"2024-01-01T00:00:00Z"}"#,
        )
        .await
        .unwrap();

        let service = DeviceIdentityService::new(kv, Platform::Android);
        let id = service.device_id().await;
        assert!(validate_device_id(&id).is_ok());
    }

    #[tokio::test]
    async fn reset_produces_a_new_identity() {
        let service = DeviceIdentityService::new(
            Arc::new(MemoryKeyValue::new()),
            Platform::Desktop,
        );

        let before = service.identity().await;
        let after = service.reset_identity().await.unwrap();

        assert_ne!(before.device_id, after.device_id);
        assert_ne!(before.fingerprint, after.fingerprint);
        // The reset identity is what subsequent calls observe.
        assert_eq!(service.device_id().await, after.device_id);
    }
}
