//! # Notification Router + Acknowledgment Tracker
//!
//! Demultiplexes inbound frames to typed observers, then acknowledges
//! delivery for frames that carry a notification id.
//!
//! ## Dispatch Turn
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      One Dispatch Turn                                  │
//! │                                                                         │
//! │  frame received                                                        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  route to typed observer method ──► observer error? log it, continue   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  notificationId present AND not acknowledged before?                   │
//! │       │ yes                                  │ no                       │
//! │       ▼                                      ▼                          │
//! │  send notification:ack                   done                           │
//! │                                                                         │
//! │  POLICY: observer failure does NOT suppress the ack. Delivery is        │
//! │  at-least-once and observers are idempotent; recovery for a missed      │
//! │  application is the pull-based sync engine, not server redelivery.      │
//! │                                                                         │
//! │  Observers that start long-running work (a full sync) hand off with     │
//! │  a spawn - the dispatch turn never blocks further event intake on it.   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use fieldlink_core::case::RemoteCase;
use fieldlink_core::session::Watermark;

use crate::connection::ConnectionHandle;
use crate::error::SyncResult;
use crate::protocol::{ServerFrame, ServerMessage};

/// Acknowledged-id window size. Old ids eventually fall out; by then the
/// server has long stopped redelivering them.
const ACK_WINDOW: usize = 1024;

// =============================================================================
// Observer Trait
// =============================================================================

/// Typed observer for inbound case events.
///
/// Implementations MUST be idempotent under duplicate delivery of the same
/// notification id - the transport is at-least-once.
#[async_trait]
pub trait CaseEventObserver: Send + Sync {
    /// A case was assigned to this agent.
    async fn case_assigned(&self, case: &RemoteCase) -> SyncResult<()>;

    /// A case's status changed.
    async fn case_status_changed(&self, case: &RemoteCase) -> SyncResult<()>;

    /// A case's priority changed.
    async fn case_priority_changed(&self, case: &RemoteCase) -> SyncResult<()>;

    /// The server asked for a delta pull.
    async fn sync_requested(&self, reason: Option<&str>) -> SyncResult<()>;

    /// The server finished processing a batch relevant to this device.
    async fn sync_completed(&self, watermark: Option<Watermark>) -> SyncResult<()>;
}

// =============================================================================
// Acknowledgment Tracker
// =============================================================================

/// Remembers which notification ids were already acknowledged, so a given
/// id is acknowledged at most once however often the server delivers it.
pub struct AcknowledgmentTracker {
    seen: HashSet<String>,
    order: VecDeque<String>,
    capacity: usize,
}

impl AcknowledgmentTracker {
    pub fn new(capacity: usize) -> Self {
        AcknowledgmentTracker {
            seen: HashSet::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Records an id; returns true when it was not seen before (i.e. this
    /// delivery should be acknowledged).
    pub fn first_delivery(&mut self, notification_id: &str) -> bool {
        if self.seen.contains(notification_id) {
            return false;
        }

        if self.order.len() == self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.seen.remove(&evicted);
            }
        }

        self.seen.insert(notification_id.to_string());
        self.order.push_back(notification_id.to_string());
        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl Default for AcknowledgmentTracker {
    fn default() -> Self {
        AcknowledgmentTracker::new(ACK_WINDOW)
    }
}

// =============================================================================
// Notification Router
// =============================================================================

/// Routes inbound frames to observers and emits acknowledgments.
pub struct NotificationRouter {
    observers: Vec<Arc<dyn CaseEventObserver>>,
    tracker: AcknowledgmentTracker,
    connection: ConnectionHandle,
}

impl NotificationRouter {
    pub fn new(connection: ConnectionHandle) -> Self {
        NotificationRouter {
            observers: Vec::new(),
            tracker: AcknowledgmentTracker::default(),
            connection,
        }
    }

    /// Registers an observer. All observers see every event.
    pub fn register(&mut self, observer: Arc<dyn CaseEventObserver>) {
        self.observers.push(observer);
    }

    /// Consumes the inbound frame stream until the connection manager
    /// stops or shutdown is requested. Spawn this as a background task.
    pub async fn run(
        mut self,
        mut incoming_rx: mpsc::Receiver<ServerFrame>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        info!("Notification router starting");

        loop {
            tokio::select! {
                frame = incoming_rx.recv() => match frame {
                    Some(frame) => self.dispatch(frame).await,
                    None => break,
                },

                _ = shutdown_rx.recv() => {
                    info!("Notification router shutting down");
                    break;
                }
            }
        }

        info!("Notification router stopped");
    }

    /// One dispatch turn: route, then acknowledge.
    pub async fn dispatch(&mut self, frame: ServerFrame) {
        let frame_type = frame.type_name();
        let notification_id = frame.notification_id.clone();

        self.route(&frame).await;

        if let Some(id) = notification_id {
            if self.tracker.first_delivery(&id) {
                if let Err(e) = self.connection.ack(&id).await {
                    warn!(notification_id = %id, error = %e, "Failed to send ack");
                }
            } else {
                debug!(
                    notification_id = %id,
                    frame = frame_type,
                    "Duplicate delivery, ack suppressed"
                );
            }
        }
    }

    async fn route(&self, frame: &ServerFrame) {
        for observer in &self.observers {
            let result = match &frame.message {
                ServerMessage::CaseAssigned(case) => observer.case_assigned(case).await,
                ServerMessage::CaseStatusChanged(case) => {
                    observer.case_status_changed(case).await
                }
                ServerMessage::CasePriorityChanged(case) => {
                    observer.case_priority_changed(case).await
                }
                ServerMessage::SyncTrigger { reason } => {
                    observer.sync_requested(reason.as_deref()).await
                }
                ServerMessage::SyncCompleted { watermark } => {
                    observer.sync_completed(*watermark).await
                }
                // Handshake verdicts are consumed by the connection manager;
                // one arriving here is a server quirk, not an error.
                ServerMessage::AuthOk(_) | ServerMessage::AuthRejected { .. } => {
                    debug!(frame = frame.type_name(), "Ignoring handshake frame");
                    Ok(())
                }
            };

            // Observer failure is logged, does not stop other observers,
            // and does not suppress the acknowledgment.
            if let Err(e) = result {
                warn!(frame = frame.type_name(), error = %e, "Observer failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracker_acks_each_id_once() {
        let mut tracker = AcknowledgmentTracker::new(8);

        assert!(tracker.first_delivery("n-1"));
        assert!(!tracker.first_delivery("n-1"));
        assert!(tracker.first_delivery("n-2"));
        assert!(!tracker.first_delivery("n-1"));
        assert_eq!(tracker.len(), 2);
    }

    #[test]
    fn tracker_window_is_bounded() {
        let mut tracker = AcknowledgmentTracker::new(2);

        assert!(tracker.first_delivery("a"));
        assert!(tracker.first_delivery("b"));
        assert!(tracker.first_delivery("c")); // evicts "a"
        assert_eq!(tracker.len(), 2);

        // "a" fell out of the window; a (very) late redelivery would be
        // acknowledged again, which the server tolerates.
        assert!(tracker.first_delivery("a"));
        assert!(!tracker.first_delivery("c"));
    }
}
