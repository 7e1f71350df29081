//! # Sync Engine
//!
//! Pull-based reconciliation of the offline case cache against the server.
//!
//! ## Session Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Sync Session Flow                                  │
//! │                                                                         │
//! │  trigger_sync(reason)                                                  │
//! │       │                                                                 │
//! │       ├── session in flight? ──► await ITS result (coalescing:         │
//! │       │                          N concurrent callers, ONE pull)       │
//! │       ▼                                                                 │
//! │  1. PULL   CaseApi::cases_updated_since(watermark)                     │
//! │  2. MERGE  per record: fieldlink-core merge policy                     │
//! │            (strictly-newer wins, pending fields kept, regressions      │
//! │             applied + logged)                                          │
//! │  3. COMMIT advance watermark  ◄── ON SUCCESS ONLY                      │
//! │            emit "refreshed" broadcast, reset failure counter           │
//! │                                                                         │
//! │  ON FAILURE: watermark untouched, ONE delayed retry scheduled,         │
//! │  failure counter incremented; at the threshold a non-fatal             │
//! │  "data stale" health signal is raised - the app keeps running on       │
//! │  the cache it has.                                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{broadcast, watch, Mutex};
use tracing::{debug, info, warn};

use fieldlink_core::case::RemoteCase;
use fieldlink_core::merge::MergeOutcome;
use fieldlink_core::session::{watermark_epoch, SyncReason, SyncSession, Watermark};
use fieldlink_store::{MutationQueue, OfflineCaseStore};

use crate::api::CaseApi;
use crate::config::SyncSettings;
use crate::error::{SyncError, SyncResult};

// =============================================================================
// Health Signal
// =============================================================================

/// Non-fatal freshness signal for the UI. `Stale` never blocks anything;
/// the cache remains usable truth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncHealth {
    Fresh,
    Stale { consecutive_failures: u32 },
}

// =============================================================================
// Sync Engine
// =============================================================================

/// The reconciliation engine. Single writer of the case cache's synced
/// fields; enforces at-most-one in-flight session via coalescing.
pub struct SyncEngine {
    api: Arc<dyn CaseApi>,
    cases: OfflineCaseStore,
    queue: MutationQueue,
    settings: SyncSettings,

    /// The in-flight session's result channel, if one is running.
    /// Coalescing: later callers clone the receiver and await it.
    inflight: Mutex<Option<watch::Receiver<Option<SyncSession>>>>,

    consecutive_failures: AtomicU32,
    /// At most one delayed retry pending at a time.
    retry_scheduled: AtomicBool,

    refreshed_tx: broadcast::Sender<SyncSession>,
    health_tx: watch::Sender<SyncHealth>,
}

impl SyncEngine {
    pub fn new(
        api: Arc<dyn CaseApi>,
        cases: OfflineCaseStore,
        queue: MutationQueue,
        settings: SyncSettings,
    ) -> Arc<Self> {
        let (refreshed_tx, _) = broadcast::channel(16);
        let (health_tx, _) = watch::channel(SyncHealth::Fresh);

        Arc::new(SyncEngine {
            api,
            cases,
            queue,
            settings,
            inflight: Mutex::new(None),
            consecutive_failures: AtomicU32::new(0),
            retry_scheduled: AtomicBool::new(false),
            refreshed_tx,
            health_tx,
        })
    }

    /// Subscribes to the "store refreshed" signal successful sessions emit.
    pub fn subscribe_refreshed(&self) -> broadcast::Receiver<SyncSession> {
        self.refreshed_tx.subscribe()
    }

    /// Watches the freshness health signal.
    pub fn watch_health(&self) -> watch::Receiver<SyncHealth> {
        self.health_tx.subscribe()
    }

    /// Current consecutive-failure count.
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }

    // =========================================================================
    // Trigger (single entry point)
    // =========================================================================

    /// Runs a sync session, or - if one is already in flight - awaits its
    /// completion. All concurrent callers observe the same session result
    /// from exactly one network pull.
    pub async fn trigger_sync(self: &Arc<Self>, reason: SyncReason) -> SyncResult<SyncSession> {
        let mut result_rx = {
            let mut slot = self.inflight.lock().await;

            match slot.as_ref() {
                Some(rx) => {
                    debug!(%reason, "Session in flight, coalescing");
                    rx.clone()
                }
                None => {
                    let (tx, rx) = watch::channel(None);
                    *slot = Some(rx.clone());

                    let engine = self.clone();
                    tokio::spawn(async move {
                        let session = engine.run_session(reason).await;
                        // Clear the slot first so new triggers start fresh
                        // sessions instead of observing a finished one.
                        *engine.inflight.lock().await = None;
                        let _ = tx.send(Some(session));
                    });

                    rx
                }
            }
        };

        loop {
            let finished = result_rx.borrow().clone();
            if let Some(session) = finished {
                return Ok(session);
            }
            if result_rx.changed().await.is_err() {
                return Err(SyncError::Channel("sync session task dropped".into()));
            }
        }
    }

    // =========================================================================
    // Event Application (notification router observers)
    // =========================================================================

    /// Merges one event-borne case delta into the cache. An event for a
    /// case absent from the store creates the record. Does NOT advance the
    /// watermark - only successful sessions do that.
    pub async fn apply_event(&self, case: &RemoteCase) -> SyncResult<MergeOutcome> {
        let pending = self.queue.pending_fields(&case.id).await?;
        let outcome = self.cases.apply_remote(case, &pending).await?;

        debug!(
            case_id = %case.id,
            outcome = ?outcome,
            "Applied event delta"
        );
        Ok(outcome)
    }

    // =========================================================================
    // Session Internals
    // =========================================================================

    async fn run_session(self: &Arc<Self>, reason: SyncReason) -> SyncSession {
        let started_at = Utc::now();

        let watermark_before = match self.cases.watermark().await {
            Ok(w) => w,
            Err(e) => {
                let session = SyncSession::begin(reason, watermark_epoch(), started_at);
                self.note_failure(reason, &SyncError::from(e)).await;
                return session;
            }
        };

        info!(%reason, watermark = %watermark_before.to_rfc3339(), "Sync session starting");
        let session = SyncSession::begin(reason, watermark_before, started_at);

        match self.pull_and_merge(watermark_before).await {
            Ok((watermark_after, applied)) => {
                if watermark_after > watermark_before {
                    if let Err(e) = self.cases.set_watermark(watermark_after).await {
                        self.note_failure(reason, &SyncError::from(e)).await;
                        return session;
                    }
                }

                self.consecutive_failures.store(0, Ordering::Relaxed);
                let _ = self.health_tx.send(SyncHealth::Fresh);

                let session = session.succeed(watermark_after, applied);
                let _ = self.refreshed_tx.send(session.clone());

                info!(
                    %reason,
                    applied,
                    watermark = %watermark_after.to_rfc3339(),
                    "Sync session complete"
                );
                session
            }
            Err(e) => {
                self.note_failure(reason, &e).await;
                session
            }
        }
    }

    /// Pull everything newer than the watermark and merge record by record.
    /// Merges are record-atomic: a failure partway leaves whole records
    /// and an unchanged watermark, so the next session re-pulls the rest.
    async fn pull_and_merge(&self, watermark: Watermark) -> SyncResult<(Watermark, usize)> {
        let deltas = self.api.cases_updated_since(watermark).await?;

        let mut max_seen = watermark;
        let mut applied = 0usize;

        for delta in &deltas {
            let pending = self.queue.pending_fields(&delta.id).await?;
            let outcome = self.cases.apply_remote(delta, &pending).await?;

            if outcome.changed() {
                applied += 1;
            }
            if delta.server_updated_at > max_seen {
                max_seen = delta.server_updated_at;
            }
        }

        Ok((max_seen, applied))
    }

    fn note_failure<'a>(
        self: &'a Arc<Self>,
        reason: SyncReason,
        error: &'a SyncError,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        warn!(%reason, error = %error, failures, "Sync session failed");

        if failures >= self.settings.stale_threshold {
            let _ = self.health_tx.send(SyncHealth::Stale {
                consecutive_failures: failures,
            });
        }

        // Auth failures are surfaced for re-login, not retried here.
        if error.is_auth() {
            return;
        }

        // Exactly one delayed retry at a time.
        if !self.retry_scheduled.swap(true, Ordering::Relaxed) {
            let engine = self.clone();
            let delay = self.settings.retry_delay();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                engine.retry_scheduled.store(false, Ordering::Relaxed);
                debug!(%reason, "Running scheduled sync retry");
                let _ = engine.trigger_sync(reason).await;
            });
        }
        })
    }
}
