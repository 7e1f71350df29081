//! # Outbound Mutation Queue
//!
//! UI-originated case edits, queued for the CRUD mutation flow.
//!
//! ## Queue Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Outbound Mutation Queue                              │
//! │                                                                         │
//! │  UI edit ──► enqueue() ──► mutation/<id> key                            │
//! │                               │                                         │
//! │              (out-of-scope CRUD flow pushes the write to the server)    │
//! │                               │                                         │
//! │  server ack ──► acknowledge() ──► key removed,                          │
//! │                                   case pending flag recomputed          │
//! │                                                                         │
//! │  MAINTENANCE: prune_older_than() drops entries past the retention       │
//! │  window (abandoned drafts); run once per app session start.             │
//! │                                                                         │
//! │  The sync engine consults pending_fields(case_id) so merges never       │
//! │  clobber a field the user edited but the server has not confirmed.      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use fieldlink_core::case::CaseField;

use crate::error::{StoreError, StoreResult};
use crate::kv::KeyValue;

const MUTATION_PREFIX: &str = "mutation/";

// =============================================================================
// Entry Type
// =============================================================================

/// One queued local write: a single field of a single case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseMutation {
    /// Queue entry id (UUID v4).
    pub id: String,

    /// Case the edit belongs to.
    pub case_id: String,

    /// Which synced field the edit touches.
    pub field: CaseField,

    /// The new value, as JSON (string for assignee, status name, etc.).
    pub value: serde_json::Value,

    /// When the edit was queued.
    pub queued_at: DateTime<Utc>,
}

// =============================================================================
// Queue
// =============================================================================

/// Append-only outbound queue over the key-value collaborator.
#[derive(Clone)]
pub struct MutationQueue {
    kv: Arc<dyn KeyValue>,
}

impl MutationQueue {
    pub fn new(kv: Arc<dyn KeyValue>) -> Self {
        MutationQueue { kv }
    }

    fn entry_key(id: &str) -> String {
        format!("{}{}", MUTATION_PREFIX, id)
    }

    /// Queues a local edit. Never touches the case record's synced fields.
    pub async fn enqueue(
        &self,
        case_id: &str,
        field: CaseField,
        value: serde_json::Value,
    ) -> StoreResult<CaseMutation> {
        let entry = CaseMutation {
            id: Uuid::new_v4().to_string(),
            case_id: case_id.to_string(),
            field,
            value,
            queued_at: Utc::now(),
        };

        let json = serde_json::to_string(&entry)?;
        self.kv.set(&Self::entry_key(&entry.id), &json).await?;

        debug!(case_id, ?field, entry_id = %entry.id, "Queued local mutation");
        Ok(entry)
    }

    /// All queued entries, oldest first.
    pub async fn pending(&self) -> StoreResult<Vec<CaseMutation>> {
        let mut entries = Vec::new();
        for (key, json) in self.kv.scan_prefix(MUTATION_PREFIX).await? {
            match serde_json::from_str::<CaseMutation>(&json) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!(key = %key, error = %e, "Skipping corrupt queue entry"),
            }
        }
        entries.sort_by_key(|e| e.queued_at);
        Ok(entries)
    }

    /// Number of queued entries (reported in connectivity frames).
    pub async fn pending_count(&self) -> StoreResult<usize> {
        Ok(self.kv.scan_prefix(MUTATION_PREFIX).await?.len())
    }

    /// Fields of `case_id` with unacknowledged local writes. The merge
    /// policy keeps these local.
    pub async fn pending_fields(&self, case_id: &str) -> StoreResult<HashSet<CaseField>> {
        Ok(self
            .pending()
            .await?
            .into_iter()
            .filter(|e| e.case_id == case_id)
            .map(|e| e.field)
            .collect())
    }

    /// Removes an entry after the server acknowledged the write. Returns
    /// whether the case still has other queued entries.
    pub async fn acknowledge(&self, entry_id: &str) -> StoreResult<Option<(String, bool)>> {
        let key = Self::entry_key(entry_id);

        let entry = match self.kv.get(&key).await? {
            None => return Ok(None),
            Some(json) => serde_json::from_str::<CaseMutation>(&json).map_err(|e| {
                StoreError::Corrupt {
                    key: key.clone(),
                    reason: e.to_string(),
                }
            })?,
        };

        self.kv.remove(&key).await?;

        let still_pending = !self.pending_fields(&entry.case_id).await?.is_empty();
        Ok(Some((entry.case_id, still_pending)))
    }

    /// Drops entries queued before `cutoff`. Session-start maintenance;
    /// returns how many were pruned.
    pub async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> StoreResult<usize> {
        let mut pruned = 0;

        for entry in self.pending().await? {
            if entry.queued_at < cutoff {
                self.kv.remove(&Self::entry_key(&entry.id)).await?;
                pruned += 1;
            }
        }

        if pruned > 0 {
            info!(pruned, "Pruned stale mutation queue entries");
        }
        Ok(pruned)
    }

    /// Clears the queue entirely (logout).
    pub async fn clear(&self) -> StoreResult<()> {
        for (key, _) in self.kv.scan_prefix(MUTATION_PREFIX).await? {
            self.kv.remove(&key).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKeyValue;
    use chrono::Duration;

    fn queue() -> MutationQueue {
        MutationQueue::new(Arc::new(MemoryKeyValue::new()))
    }

    #[tokio::test]
    async fn enqueue_and_pending_fields() {
        let q = queue();
        q.enqueue("c-1", CaseField::Status, serde_json::json!("resolved"))
            .await
            .unwrap();
        q.enqueue("c-1", CaseField::Priority, serde_json::json!("high"))
            .await
            .unwrap();
        q.enqueue("c-2", CaseField::AssignedTo, serde_json::json!("agent-2"))
            .await
            .unwrap();

        let fields = q.pending_fields("c-1").await.unwrap();
        assert!(fields.contains(&CaseField::Status));
        assert!(fields.contains(&CaseField::Priority));
        assert!(!fields.contains(&CaseField::AssignedTo));

        assert_eq!(q.pending_count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn acknowledge_reports_remaining_entries() {
        let q = queue();
        let a = q
            .enqueue("c-1", CaseField::Status, serde_json::json!("closed"))
            .await
            .unwrap();
        let b = q
            .enqueue("c-1", CaseField::Priority, serde_json::json!("low"))
            .await
            .unwrap();

        let (case_id, still_pending) = q.acknowledge(&a.id).await.unwrap().unwrap();
        assert_eq!(case_id, "c-1");
        assert!(still_pending);

        let (_, still_pending) = q.acknowledge(&b.id).await.unwrap().unwrap();
        assert!(!still_pending);

        // Acknowledging an unknown entry is a quiet no-op.
        assert!(q.acknowledge("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn prune_respects_cutoff() {
        let q = queue();
        q.enqueue("c-1", CaseField::Status, serde_json::json!("new"))
            .await
            .unwrap();

        // Everything queued just now survives a cutoff in the past...
        let pruned = q
            .prune_older_than(Utc::now() - Duration::days(30))
            .await
            .unwrap();
        assert_eq!(pruned, 0);

        // ...and is dropped by a cutoff in the future.
        let pruned = q
            .prune_older_than(Utc::now() + Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(pruned, 1);
        assert_eq!(q.pending_count().await.unwrap(), 0);
    }
}
