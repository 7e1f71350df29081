//! Sync session bookkeeping: why a session ran, what it saw, how it ended.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The watermark is the newest `server_updated_at` already merged locally.
/// Delta pulls request only cases updated after it.
pub type Watermark = DateTime<Utc>;

/// Watermark of a store that has never synced.
pub fn watermark_epoch() -> Watermark {
    DateTime::<Utc>::UNIX_EPOCH
}

// =============================================================================
// Reason / Outcome
// =============================================================================

/// What triggered a sync session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncReason {
    /// A server event (e.g. a sync trigger frame) asked for it.
    EventDriven,
    /// The connection came back after a drop.
    Reconnect,
    /// The background scheduler's fixed interval fired.
    Periodic,
    /// The user pulled to refresh.
    Manual,
}

impl std::fmt::Display for SyncReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncReason::EventDriven => write!(f, "event_driven"),
            SyncReason::Reconnect => write!(f, "reconnect"),
            SyncReason::Periodic => write!(f, "periodic"),
            SyncReason::Manual => write!(f, "manual"),
        }
    }
}

/// How a sync session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    Success,
    Failed,
}

// =============================================================================
// Session
// =============================================================================

/// One short-lived sync session. At most one exists at a time; concurrent
/// triggers coalesce onto it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSession {
    pub started_at: DateTime<Utc>,
    pub reason: SyncReason,
    pub watermark_before: Watermark,
    /// Set on success only; failure leaves the watermark untouched.
    pub watermark_after: Option<Watermark>,
    pub outcome: SyncOutcome,
    /// Records merged (created or updated) by this session.
    pub applied: usize,
}

impl SyncSession {
    /// Starts a session snapshot at the given watermark.
    pub fn begin(reason: SyncReason, watermark_before: Watermark, started_at: DateTime<Utc>) -> Self {
        SyncSession {
            started_at,
            reason,
            watermark_before,
            watermark_after: None,
            outcome: SyncOutcome::Failed,
            applied: 0,
        }
    }

    /// Marks the session successful with its advanced watermark.
    pub fn succeed(mut self, watermark_after: Watermark, applied: usize) -> Self {
        self.watermark_after = Some(watermark_after);
        self.outcome = SyncOutcome::Success;
        self.applied = applied;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_session_keeps_watermark_unset() {
        let session = SyncSession::begin(SyncReason::Manual, watermark_epoch(), Utc::now());
        assert_eq!(session.outcome, SyncOutcome::Failed);
        assert!(session.watermark_after.is_none());
    }

    #[test]
    fn successful_session_records_watermark() {
        let t = Utc::now();
        let session = SyncSession::begin(SyncReason::Periodic, watermark_epoch(), t).succeed(t, 3);
        assert_eq!(session.outcome, SyncOutcome::Success);
        assert_eq!(session.watermark_after, Some(t));
        assert_eq!(session.applied, 3);
    }
}
