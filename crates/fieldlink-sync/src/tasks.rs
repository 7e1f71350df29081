//! # Background Task Manager
//!
//! Periodic sync and session-start maintenance, independent of UI
//! lifecycle.
//!
//! ## Schedule
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Background Jobs                                      │
//! │                                                                         │
//! │  ON START (once per app session)                                       │
//! │  • maintenance: prune mutation-queue entries older than the            │
//! │    retention window                                                     │
//! │                                                                         │
//! │  EVERY periodic_interval WHILE FOREGROUNDED                            │
//! │  • trigger_sync(Periodic)                                              │
//! │    (suspended while backgrounded; the OS budgets background             │
//! │     execution, push events still arrive over the open socket)          │
//! │                                                                         │
//! │  FAILURE ISOLATION: every job is wrapped - an error is logged and      │
//! │  the loop continues; one job can never cancel or block another.        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info};

use fieldlink_core::session::SyncReason;
use fieldlink_store::MutationQueue;

use crate::config::SyncSettings;
use crate::engine::SyncEngine;
use crate::error::SyncResult;
use crate::protocol::AppLifecycle;

// =============================================================================
// Handle
// =============================================================================

/// Handle for stopping the background task manager.
#[derive(Clone)]
pub struct BackgroundTasksHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl BackgroundTasksHandle {
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

// =============================================================================
// Task Manager
// =============================================================================

/// Schedules periodic sync and maintenance jobs.
pub struct BackgroundTaskManager {
    engine: Arc<SyncEngine>,
    queue: MutationQueue,
    settings: SyncSettings,
    lifecycle_rx: watch::Receiver<AppLifecycle>,
    shutdown_rx: mpsc::Receiver<()>,
}

impl BackgroundTaskManager {
    /// Spawns the manager task.
    pub fn spawn(
        engine: Arc<SyncEngine>,
        queue: MutationQueue,
        settings: SyncSettings,
        lifecycle_rx: watch::Receiver<AppLifecycle>,
    ) -> BackgroundTasksHandle {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let manager = BackgroundTaskManager {
            engine,
            queue,
            settings,
            lifecycle_rx,
            shutdown_rx,
        };

        tokio::spawn(manager.run());

        BackgroundTasksHandle { shutdown_tx }
    }

    async fn run(mut self) {
        info!(
            interval_secs = self.settings.periodic_interval_secs,
            "Background task manager starting"
        );

        // Session-start maintenance. Failure-isolated like everything else
        // here: a broken store must not keep periodic sync from running.
        if let Err(e) = self.maintenance().await {
            error!(error = %e, "Session-start maintenance failed");
        }

        let mut interval = tokio::time::interval(self.settings.periodic_interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately; consume it so the first
        // periodic sync happens one full interval after start.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if *self.lifecycle_rx.borrow() != AppLifecycle::Foreground {
                        debug!("Backgrounded, skipping periodic sync");
                        continue;
                    }

                    if let Err(e) = self.engine.trigger_sync(SyncReason::Periodic).await {
                        error!(error = %e, "Periodic sync failed to run");
                    }
                }

                _ = self.shutdown_rx.recv() => {
                    info!("Background task manager shutting down");
                    break;
                }
            }
        }

        info!("Background task manager stopped");
    }

    /// Prunes mutation-queue entries past the retention window.
    async fn maintenance(&self) -> SyncResult<()> {
        let cutoff = Utc::now() - ChronoDuration::days(i64::from(self.settings.retention_days));
        let pruned = self.queue.prune_older_than(cutoff).await?;
        debug!(pruned, retention_days = self.settings.retention_days, "Maintenance pass done");
        Ok(())
    }
}
