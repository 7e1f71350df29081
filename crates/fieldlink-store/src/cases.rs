//! # Offline Case Cache
//!
//! The locally owned mirror of server case state, plus the sync watermark.
//!
//! ## Write Discipline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Who Writes What                                     │
//! │                                                                         │
//! │  SyncEngine ──── apply_remote() ────►  case/<id>      (synced fields)   │
//! │  SyncEngine ──── set_watermark() ───►  sync/watermark                   │
//! │  UI ──────────── MutationQueue ─────►  mutation/<id>  (never case/*)    │
//! │                                                                         │
//! │  Single writer for inbound merges + a separate outbound queue means     │
//! │  there is no write-write race between sync and user edits.              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};

use fieldlink_core::case::{CaseField, CaseRecord, RemoteCase};
use fieldlink_core::merge::{merge_case, MergeOutcome};
use fieldlink_core::session::{watermark_epoch, Watermark};

use crate::error::{StoreError, StoreResult};
use crate::kv::KeyValue;

const CASE_PREFIX: &str = "case/";
const WATERMARK_KEY: &str = "sync/watermark";

/// Offline case cache over the key-value collaborator.
#[derive(Clone)]
pub struct OfflineCaseStore {
    kv: Arc<dyn KeyValue>,
}

impl OfflineCaseStore {
    pub fn new(kv: Arc<dyn KeyValue>) -> Self {
        OfflineCaseStore { kv }
    }

    fn case_key(case_id: &str) -> String {
        format!("{}{}", CASE_PREFIX, case_id)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Returns the cached record for a case, if present.
    pub async fn get(&self, case_id: &str) -> StoreResult<Option<CaseRecord>> {
        let key = Self::case_key(case_id);
        match self.kv.get(&key).await? {
            None => Ok(None),
            Some(json) => {
                let record =
                    serde_json::from_str(&json).map_err(|e| StoreError::Corrupt {
                        key,
                        reason: e.to_string(),
                    })?;
                Ok(Some(record))
            }
        }
    }

    /// Returns all cached records. Corrupt entries are skipped with a
    /// warning rather than failing the whole listing.
    pub async fn list(&self) -> StoreResult<Vec<CaseRecord>> {
        let pairs = self.kv.scan_prefix(CASE_PREFIX).await?;
        let mut records = Vec::with_capacity(pairs.len());

        for (key, json) in pairs {
            match serde_json::from_str::<CaseRecord>(&json) {
                Ok(record) => records.push(record),
                Err(e) => warn!(key = %key, error = %e, "Skipping corrupt case record"),
            }
        }

        Ok(records)
    }

    /// Number of cached cases.
    pub async fn count(&self) -> StoreResult<usize> {
        Ok(self.kv.scan_prefix(CASE_PREFIX).await?.len())
    }

    // =========================================================================
    // Inbound Merge (sync engine only)
    // =========================================================================

    /// Merges one server delta into the cache.
    ///
    /// `pending_fields` are this case's fields with queued unacknowledged
    /// local writes; the merge keeps those local. The write is one key, so
    /// a session that dies mid-merge leaves whole records behind.
    pub async fn apply_remote(
        &self,
        incoming: &RemoteCase,
        pending_fields: &HashSet<CaseField>,
    ) -> StoreResult<MergeOutcome> {
        let local = self.get(&incoming.id).await?;
        let (merged, outcome) = merge_case(local.as_ref(), incoming, pending_fields);

        match &outcome {
            MergeOutcome::SkippedStale => {
                debug!(case_id = %incoming.id, "Skipped stale delta");
            }
            MergeOutcome::Created | MergeOutcome::Applied { .. } => {
                if let MergeOutcome::Applied {
                    status_regression: true,
                    ..
                } = &outcome
                {
                    // Applied anyway: the server is authoritative.
                    warn!(
                        case_id = %incoming.id,
                        status = %incoming.status,
                        "Server moved case status backwards"
                    );
                }

                let json = serde_json::to_string(&merged)?;
                self.kv.set(&Self::case_key(&incoming.id), &json).await?;
            }
        }

        Ok(outcome)
    }

    /// Marks a case's pending-mutation flag, called when the mutation queue
    /// for the case empties (or first fills).
    pub async fn set_pending_flag(&self, case_id: &str, pending: bool) -> StoreResult<()> {
        if let Some(mut record) = self.get(case_id).await? {
            if record.pending_local_mutation != pending {
                record.pending_local_mutation = pending;
                let json = serde_json::to_string(&record)?;
                self.kv.set(&Self::case_key(case_id), &json).await?;
            }
        }
        Ok(())
    }

    // =========================================================================
    // Watermark
    // =========================================================================

    /// The newest `server_updated_at` merged so far; epoch if never synced.
    pub async fn watermark(&self) -> StoreResult<Watermark> {
        match self.kv.get(WATERMARK_KEY).await? {
            None => Ok(watermark_epoch()),
            Some(raw) => raw
                .parse()
                .map_err(|e: chrono::ParseError| StoreError::Corrupt {
                    key: WATERMARK_KEY.to_string(),
                    reason: e.to_string(),
                }),
        }
    }

    /// Advances the watermark. Called on successful sync sessions only.
    pub async fn set_watermark(&self, watermark: Watermark) -> StoreResult<()> {
        self.kv
            .set(WATERMARK_KEY, &watermark.to_rfc3339())
            .await
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    /// Clears all cached cases and the watermark (logout / explicit cache
    /// clear). Key-by-key: no cross-key transaction exists or is needed.
    pub async fn clear(&self) -> StoreResult<()> {
        for (key, _) in self.kv.scan_prefix(CASE_PREFIX).await? {
            self.kv.remove(&key).await?;
        }
        self.kv.remove(WATERMARK_KEY).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKeyValue;
    use chrono::{TimeZone, Utc};
    use fieldlink_core::case::{CasePriority, CaseStatus};

    fn store() -> OfflineCaseStore {
        OfflineCaseStore::new(Arc::new(MemoryKeyValue::new()))
    }

    fn remote(id: &str, at_secs: i64) -> RemoteCase {
        RemoteCase {
            id: id.to_string(),
            status: CaseStatus::Assigned,
            priority: CasePriority::High,
            assigned_to: Some("agent-1".to_string()),
            server_updated_at: Utc.timestamp_opt(at_secs, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn creates_unknown_case() {
        let store = store();
        let outcome = store
            .apply_remote(&remote("c-9", 100), &HashSet::new())
            .await
            .unwrap();
        assert_eq!(outcome, MergeOutcome::Created);
        assert!(store.get("c-9").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn duplicate_delta_is_idempotent() {
        let store = store();
        let delta = remote("c-1", 100);

        store.apply_remote(&delta, &HashSet::new()).await.unwrap();
        let first = store.get("c-1").await.unwrap().unwrap();

        let outcome = store.apply_remote(&delta, &HashSet::new()).await.unwrap();
        assert_eq!(outcome, MergeOutcome::SkippedStale);
        assert_eq!(store.get("c-1").await.unwrap().unwrap(), first);
    }

    #[tokio::test]
    async fn watermark_roundtrip() {
        let store = store();
        assert_eq!(store.watermark().await.unwrap(), watermark_epoch());

        let t = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        store.set_watermark(t).await.unwrap();
        assert_eq!(store.watermark().await.unwrap(), t);
    }

    #[tokio::test]
    async fn clear_removes_everything() {
        let store = store();
        store
            .apply_remote(&remote("c-1", 100), &HashSet::new())
            .await
            .unwrap();
        store
            .set_watermark(Utc.timestamp_opt(100, 0).unwrap())
            .await
            .unwrap();

        store.clear().await.unwrap();

        assert_eq!(store.count().await.unwrap(), 0);
        assert_eq!(store.watermark().await.unwrap(), watermark_epoch());
    }
}
