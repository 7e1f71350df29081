//! # Merge Policy
//!
//! Last-writer-wins reconciliation of an inbound server delta against the
//! locally cached record, as a pure function.
//!
//! ## Decision Table
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Merge Decision Table                             │
//! │                                                                         │
//! │  LOCAL RECORD        INCOMING                      DECISION             │
//! │  ─────────────       ──────────────────────────    ──────────────────   │
//! │  absent              any                           create record        │
//! │  present             server_updated_at <= local    skip (stale)         │
//! │  present             server_updated_at >  local    overwrite synced     │
//! │                                                    fields, EXCEPT any   │
//! │                                                    field with a queued  │
//! │                                                    unacknowledged       │
//! │                                                    local write          │
//! │                                                                         │
//! │  STATUS REGRESSION: a newer server delta that moves the workflow        │
//! │  backwards is still applied (server is authoritative) - the outcome     │
//! │  flags it so the caller can log it, never silently dropped.             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Duplicate delivery safety: applying the same delta twice yields the same
//! record (the second application is skipped as stale, `<=` not `<`), which
//! is what makes at-least-once event delivery safe upstream.

use std::collections::HashSet;

use crate::case::{CaseField, CaseRecord, RemoteCase};

// =============================================================================
// Merge Outcome
// =============================================================================

/// What the merge policy decided for one record.
#[derive(Debug, Clone, PartialEq)]
pub enum MergeOutcome {
    /// No local record existed; the delta materialized a new one.
    Created,

    /// The delta was newer and its fields were applied.
    Applied {
        /// Fields kept local because a queued mutation awaits acknowledgment.
        kept_fields: Vec<CaseField>,
        /// The applied status moved the workflow backwards.
        status_regression: bool,
    },

    /// The local record is as new or newer; nothing changed.
    SkippedStale,
}

impl MergeOutcome {
    /// True when the store must be written.
    pub fn changed(&self) -> bool {
        !matches!(self, MergeOutcome::SkippedStale)
    }
}

// =============================================================================
// Merge Function
// =============================================================================

/// Merges a server delta into the local cache state for one case.
///
/// `pending_fields` names the synced fields of this case with queued local
/// writes that the server has not acknowledged yet; those keep their local
/// values. Returns the record to store and the decision taken.
pub fn merge_case(
    local: Option<&CaseRecord>,
    incoming: &RemoteCase,
    pending_fields: &HashSet<CaseField>,
) -> (CaseRecord, MergeOutcome) {
    let local = match local {
        None => {
            let record = incoming.clone().into_record();
            return (record, MergeOutcome::Created);
        }
        Some(local) => local,
    };

    // Tie-break: strictly newer server timestamps win; equal timestamps are
    // duplicates and must be no-ops.
    if incoming.server_updated_at <= local.server_updated_at {
        return (local.clone(), MergeOutcome::SkippedStale);
    }

    let mut merged = local.clone();
    let mut kept_fields = Vec::new();
    let mut status_regression = false;

    if pending_fields.contains(&CaseField::Status) {
        kept_fields.push(CaseField::Status);
    } else {
        status_regression = local.status.is_regression_to(incoming.status);
        merged.status = incoming.status;
    }

    if pending_fields.contains(&CaseField::Priority) {
        kept_fields.push(CaseField::Priority);
    } else {
        merged.priority = incoming.priority;
    }

    if pending_fields.contains(&CaseField::AssignedTo) {
        kept_fields.push(CaseField::AssignedTo);
    } else {
        merged.assigned_to = incoming.assigned_to.clone();
    }

    // The watermark field always advances: the server version has been seen
    // even when some fields stayed local.
    merged.server_updated_at = incoming.server_updated_at;
    merged.pending_local_mutation = !pending_fields.is_empty();

    (
        merged,
        MergeOutcome::Applied {
            kept_fields,
            status_regression,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::case::{CasePriority, CaseStatus};
    use chrono::{Duration, TimeZone, Utc};

    fn remote(id: &str, status: CaseStatus, at_secs: i64) -> RemoteCase {
        RemoteCase {
            id: id.to_string(),
            status,
            priority: CasePriority::Medium,
            assigned_to: Some("agent-7".to_string()),
            server_updated_at: Utc.timestamp_opt(at_secs, 0).unwrap(),
        }
    }

    fn no_pending() -> HashSet<CaseField> {
        HashSet::new()
    }

    #[test]
    fn creates_missing_record() {
        let incoming = remote("c-1", CaseStatus::Assigned, 100);
        let (record, outcome) = merge_case(None, &incoming, &no_pending());
        assert_eq!(outcome, MergeOutcome::Created);
        assert_eq!(record.id, "c-1");
        assert!(!record.pending_local_mutation);
    }

    #[test]
    fn newer_delta_overwrites() {
        let incoming_old = remote("c-1", CaseStatus::Assigned, 100);
        let (local, _) = merge_case(None, &incoming_old, &no_pending());

        let incoming_new = remote("c-1", CaseStatus::InProgress, 200);
        let (record, outcome) = merge_case(Some(&local), &incoming_new, &no_pending());

        assert!(outcome.changed());
        assert_eq!(record.status, CaseStatus::InProgress);
        assert_eq!(record.server_updated_at, incoming_new.server_updated_at);
    }

    #[test]
    fn stale_delta_is_skipped() {
        let incoming_new = remote("c-1", CaseStatus::InProgress, 200);
        let (local, _) = merge_case(None, &incoming_new, &no_pending());

        let incoming_old = remote("c-1", CaseStatus::Assigned, 100);
        let (record, outcome) = merge_case(Some(&local), &incoming_old, &no_pending());

        assert_eq!(outcome, MergeOutcome::SkippedStale);
        assert_eq!(record.status, CaseStatus::InProgress);
    }

    #[test]
    fn equal_timestamp_is_duplicate() {
        // Same delta applied twice must be a no-op the second time.
        let incoming = remote("c-1", CaseStatus::Assigned, 100);
        let (local, _) = merge_case(None, &incoming, &no_pending());
        let (record, outcome) = merge_case(Some(&local), &incoming, &no_pending());
        assert_eq!(outcome, MergeOutcome::SkippedStale);
        assert_eq!(record, local);
    }

    #[test]
    fn pending_field_keeps_local_value() {
        let seeded = remote("c-1", CaseStatus::InProgress, 100);
        let (local, _) = merge_case(None, &seeded, &no_pending());

        let mut pending = HashSet::new();
        pending.insert(CaseField::Status);

        let incoming = RemoteCase {
            status: CaseStatus::Assigned,
            priority: CasePriority::Urgent,
            server_updated_at: local.server_updated_at + Duration::seconds(60),
            ..seeded
        };

        let (record, outcome) = merge_case(Some(&local), &incoming, &pending);

        // Status stayed local, priority followed the server.
        assert_eq!(record.status, CaseStatus::InProgress);
        assert_eq!(record.priority, CasePriority::Urgent);
        assert!(record.pending_local_mutation);
        match outcome {
            MergeOutcome::Applied { kept_fields, .. } => {
                assert_eq!(kept_fields, vec![CaseField::Status])
            }
            other => panic!("expected Applied, got {:?}", other),
        }
    }

    #[test]
    fn regression_is_applied_and_flagged() {
        let seeded = remote("c-1", CaseStatus::Resolved, 100);
        let (local, _) = merge_case(None, &seeded, &no_pending());

        let incoming = remote("c-1", CaseStatus::InProgress, 200);
        let (record, outcome) = merge_case(Some(&local), &incoming, &no_pending());

        // Server is authoritative: the regression lands.
        assert_eq!(record.status, CaseStatus::InProgress);
        match outcome {
            MergeOutcome::Applied {
                status_regression, ..
            } => assert!(status_regression),
            other => panic!("expected Applied, got {:?}", other),
        }
    }
}
