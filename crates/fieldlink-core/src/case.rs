//! # Case Types
//!
//! The locally cached mirror of a server-side case, and the delta shape the
//! server sends for it.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Case Types                                     │
//! │                                                                         │
//! │  ┌──────────────────┐   ┌──────────────────┐   ┌─────────────────┐     │
//! │  │   CaseRecord     │   │   RemoteCase     │   │   CaseField     │     │
//! │  │  ──────────────  │   │  ──────────────  │   │  ─────────────  │     │
//! │  │  local cache row │   │  server delta    │   │  Status         │     │
//! │  │  + pending flag  │   │  (synced fields  │   │  Priority       │     │
//! │  │                  │   │   only)          │   │  AssignedTo     │     │
//! │  └──────────────────┘   └──────────────────┘   └─────────────────┘     │
//! │                                                                         │
//! │  ┌──────────────────┐   ┌──────────────────┐                           │
//! │  │   CaseStatus     │   │  CasePriority    │                           │
//! │  │  ──────────────  │   │  ──────────────  │                           │
//! │  │  New             │   │  Low             │                           │
//! │  │  Assigned        │   │  Medium          │                           │
//! │  │  InProgress      │   │  High            │                           │
//! │  │  Resolved        │   │  Urgent          │                           │
//! │  │  Closed          │   └──────────────────┘                           │
//! │  └──────────────────┘                                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Ownership Rule
//! `CaseRecord` synced fields are written only by the sync engine's merge.
//! UI edits never touch them directly; they go to the outbound mutation
//! queue and come back through the server.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// =============================================================================
// Case Status
// =============================================================================

/// Workflow status of a case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    New,
    Assigned,
    InProgress,
    Resolved,
    Closed,
}

impl CaseStatus {
    /// Position of this status in the normal case workflow.
    ///
    /// Used only to *detect* regressions (the server may legitimately move
    /// a case backwards, e.g. reopening a resolved case); regressions are
    /// applied and logged, never rejected.
    pub const fn workflow_rank(&self) -> u8 {
        match self {
            CaseStatus::New => 0,
            CaseStatus::Assigned => 1,
            CaseStatus::InProgress => 2,
            CaseStatus::Resolved => 3,
            CaseStatus::Closed => 4,
        }
    }

    /// Returns true when moving from `self` to `next` goes backwards in
    /// the workflow.
    pub const fn is_regression_to(&self, next: CaseStatus) -> bool {
        next.workflow_rank() < self.workflow_rank()
    }
}

impl std::fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaseStatus::New => write!(f, "new"),
            CaseStatus::Assigned => write!(f, "assigned"),
            CaseStatus::InProgress => write!(f, "in_progress"),
            CaseStatus::Resolved => write!(f, "resolved"),
            CaseStatus::Closed => write!(f, "closed"),
        }
    }
}

impl std::str::FromStr for CaseStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(CaseStatus::New),
            "assigned" => Ok(CaseStatus::Assigned),
            "in_progress" => Ok(CaseStatus::InProgress),
            "resolved" => Ok(CaseStatus::Resolved),
            "closed" => Ok(CaseStatus::Closed),
            other => Err(CoreError::UnknownStatus(other.to_string())),
        }
    }
}

// =============================================================================
// Case Priority
// =============================================================================

/// Priority of a case. Ordered so that `Urgent > High > Medium > Low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CasePriority {
    Low,
    Medium,
    High,
    Urgent,
}

impl std::fmt::Display for CasePriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CasePriority::Low => write!(f, "low"),
            CasePriority::Medium => write!(f, "medium"),
            CasePriority::High => write!(f, "high"),
            CasePriority::Urgent => write!(f, "urgent"),
        }
    }
}

impl std::str::FromStr for CasePriority {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(CasePriority::Low),
            "medium" => Ok(CasePriority::Medium),
            "high" => Ok(CasePriority::High),
            "urgent" => Ok(CasePriority::Urgent),
            other => Err(CoreError::UnknownPriority(other.to_string())),
        }
    }
}

// =============================================================================
// Case Field Names
// =============================================================================

/// Synced fields of a case that the UI can also edit.
///
/// Queued local mutations name the field they touch; the merge policy keeps
/// those fields local until the write is acknowledged server-side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseField {
    Status,
    Priority,
    AssignedTo,
}

// =============================================================================
// Case Record (local cache row)
// =============================================================================

/// Locally cached mirror of a server case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseRecord {
    /// Server-assigned case identifier.
    pub id: String,

    /// Workflow status.
    pub status: CaseStatus,

    /// Priority.
    pub priority: CasePriority,

    /// User id of the assigned field agent, if any.
    pub assigned_to: Option<String>,

    /// Server-side last-update timestamp. The merge tie-break key.
    pub server_updated_at: DateTime<Utc>,

    /// True while at least one queued local mutation for this case awaits
    /// server acknowledgment.
    pub pending_local_mutation: bool,
}

// =============================================================================
// Remote Case (server delta)
// =============================================================================

/// Synced fields of a case as the server sends them in a delta pull.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteCase {
    pub id: String,
    pub status: CaseStatus,
    pub priority: CasePriority,
    pub assigned_to: Option<String>,
    pub server_updated_at: DateTime<Utc>,
}

impl RemoteCase {
    /// Materializes a fresh local record from a server delta.
    pub fn into_record(self) -> CaseRecord {
        CaseRecord {
            id: self.id,
            status: self.status,
            priority: self.priority,
            assigned_to: self.assigned_to,
            server_updated_at: self.server_updated_at,
            pending_local_mutation: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_roundtrip() {
        for s in ["new", "assigned", "in_progress", "resolved", "closed"] {
            let parsed: CaseStatus = s.parse().unwrap();
            assert_eq!(parsed.to_string(), s);
        }
        assert!("bogus".parse::<CaseStatus>().is_err());
    }

    #[test]
    fn regression_detection() {
        assert!(CaseStatus::Resolved.is_regression_to(CaseStatus::InProgress));
        assert!(!CaseStatus::Assigned.is_regression_to(CaseStatus::InProgress));
        // Same rank is not a regression.
        assert!(!CaseStatus::Closed.is_regression_to(CaseStatus::Closed));
    }

    #[test]
    fn priority_ordering() {
        assert!(CasePriority::Urgent > CasePriority::High);
        assert!(CasePriority::Medium > CasePriority::Low);
    }
}
