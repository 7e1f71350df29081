//! # Sync Agent
//!
//! Orchestrator wiring identity, connection, routing, reconciliation, and
//! background scheduling into one explicitly constructed component with a
//! documented init/teardown lifecycle. No globals anywhere.
//!
//! ## Agent Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        SyncAgent Architecture                           │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                         SyncAgent                                │  │
//! │  │                                                                  │  │
//! │  │  • Builds and owns all components (dependency-injected)          │  │
//! │  │  • login/logout/lifecycle entry points for the embedding app     │  │
//! │  │  • Fans status out to the embedder via SyncEventEmitter          │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │         ┌─────────────────────┼──────────────────────┐                 │
//! │         ▼                     ▼                      ▼                  │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │ Connection     │  │ Notification   │  │ SyncEngine             │    │
//! │  │ Manager        │─►│ Router + Acks  │─►│ (apply events,         │    │
//! │  │ (auth, backoff)│  │ (typed dispatch│  │  coalesced pulls)      │    │
//! │  └────────────────┘  └────────────────┘  └───────────┬────────────┘    │
//! │         ▲                                            ▼                  │
//! │  ┌────────────────┐                       ┌────────────────────────┐   │
//! │  │ DeviceIdentity │                       │ OfflineCaseStore +     │   │
//! │  │ Service        │                       │ MutationQueue          │   │
//! │  └────────────────┘                       └────────────────────────┘   │
//! │                                                                         │
//! │  EMITTER CALLBACKS (to the embedding app):                             │
//! │  • connection_changed  - status indicator                              │
//! │  • auth_required       - blocking re-login prompt (the only blocker)   │
//! │  • case_updated        - one case changed via a live event             │
//! │  • data_refreshed      - a sync session merged new data                │
//! │  • data_stale          - repeated sync failure, non-fatal              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, warn};

use fieldlink_core::case::RemoteCase;
use fieldlink_core::device::Platform;
use fieldlink_core::session::{SyncReason, SyncSession, Watermark};
use fieldlink_store::kv::{KeyValue, SqliteKeyValue};
use fieldlink_store::{MutationQueue, OfflineCaseStore};

use crate::api::{CaseApi, HttpCaseApi};
use crate::config::SyncConfig;
use crate::connection::{ConnectionHandle, ConnectionInfo, ConnectionManager, ConnectionState};
use crate::engine::{SyncEngine, SyncHealth};
use crate::error::{SyncError, SyncResult};
use crate::identity::DeviceIdentityService;
use crate::protocol::{AppLifecycle, ConnectivityPayload};
use crate::router::{CaseEventObserver, NotificationRouter};
use crate::tasks::{BackgroundTaskManager, BackgroundTasksHandle};

// =============================================================================
// Event Emitter
// =============================================================================

/// Callbacks into the embedding app (status indicator, list refresh).
pub trait SyncEventEmitter: Send + Sync {
    /// The connection state changed.
    fn connection_changed(&self, state: &ConnectionState);

    /// Credentials were rejected; the app must re-authenticate. This is
    /// the only signal meant to block the user.
    fn auth_required(&self, reason: &str);

    /// A single case changed through a live event.
    fn case_updated(&self, case_id: &str);

    /// A sync session merged new data; the UI should re-read the cache.
    fn data_refreshed(&self, session: &SyncSession);

    /// Syncs keep failing; cached data may be stale. Non-fatal.
    fn data_stale(&self, consecutive_failures: u32);
}

/// No-op emitter for tests and headless use.
pub struct NoOpEmitter;

impl SyncEventEmitter for NoOpEmitter {
    fn connection_changed(&self, _state: &ConnectionState) {}
    fn auth_required(&self, _reason: &str) {}
    fn case_updated(&self, _case_id: &str) {}
    fn data_refreshed(&self, _session: &SyncSession) {}
    fn data_stale(&self, _consecutive_failures: u32) {}
}

// =============================================================================
// Engine Observer (router → engine bridge)
// =============================================================================

/// The default observer: merges event deltas into the cache and converts
/// sync triggers into engine sessions.
struct EngineObserver {
    engine: Arc<SyncEngine>,
    emitter: Arc<dyn SyncEventEmitter>,
}

impl EngineObserver {
    async fn apply(&self, case: &RemoteCase) -> SyncResult<()> {
        let outcome = self.engine.apply_event(case).await?;
        if outcome.changed() {
            self.emitter.case_updated(&case.id);
        }
        Ok(())
    }
}

#[async_trait]
impl CaseEventObserver for EngineObserver {
    async fn case_assigned(&self, case: &RemoteCase) -> SyncResult<()> {
        self.apply(case).await
    }

    async fn case_status_changed(&self, case: &RemoteCase) -> SyncResult<()> {
        self.apply(case).await
    }

    async fn case_priority_changed(&self, case: &RemoteCase) -> SyncResult<()> {
        self.apply(case).await
    }

    async fn sync_requested(&self, reason: Option<&str>) -> SyncResult<()> {
        debug!(?reason, "Server requested a sync");
        // Hand off: a full pull must never block the dispatch turn.
        let engine = self.engine.clone();
        tokio::spawn(async move {
            let _ = engine.trigger_sync(SyncReason::EventDriven).await;
        });
        Ok(())
    }

    async fn sync_completed(&self, watermark: Option<Watermark>) -> SyncResult<()> {
        debug!(?watermark, "Server reports sync completed");
        Ok(())
    }
}

// =============================================================================
// Agent Status
// =============================================================================

/// Snapshot of the whole sync layer for UI queries.
#[derive(Debug, Clone)]
pub struct AgentStatus {
    pub connection: ConnectionState,
    pub connection_info: ConnectionInfo,
    pub watermark: Watermark,
    pub pending_mutations: usize,
    pub cached_cases: usize,
    pub health: SyncHealth,
    pub identity_degraded: bool,
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for a fully wired [`SyncAgent`].
pub struct SyncAgentBuilder {
    config: SyncConfig,
    platform: Platform,
    kv: Option<Arc<dyn KeyValue>>,
    api: Option<Arc<dyn CaseApi>>,
    emitter: Option<Arc<dyn SyncEventEmitter>>,
    observers: Vec<Arc<dyn CaseEventObserver>>,
}

impl SyncAgentBuilder {
    pub fn new(config: SyncConfig, platform: Platform) -> Self {
        SyncAgentBuilder {
            config,
            platform,
            kv: None,
            api: None,
            emitter: None,
            observers: Vec::new(),
        }
    }

    /// Injects a key-value backend (tests, custom storage).
    pub fn with_store(mut self, kv: Arc<dyn KeyValue>) -> Self {
        self.kv = Some(kv);
        self
    }

    /// Injects a case API (tests). Default builds [`HttpCaseApi`] from the
    /// config.
    pub fn with_case_api(mut self, api: Arc<dyn CaseApi>) -> Self {
        self.api = Some(api);
        self
    }

    pub fn with_emitter(mut self, emitter: Arc<dyn SyncEventEmitter>) -> Self {
        self.emitter = Some(emitter);
        self
    }

    /// Registers an additional typed event observer.
    pub fn with_observer(mut self, observer: Arc<dyn CaseEventObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Wires everything and spawns the background tasks.
    pub async fn build(self) -> SyncResult<SyncAgent> {
        self.config.validate()?;

        // Storage: injected, or SQLite at the configured/platform path.
        let kv: Arc<dyn KeyValue> = match self.kv {
            Some(kv) => kv,
            None => {
                let path = self
                    .config
                    .storage
                    .path
                    .clone()
                    .or_else(SyncConfig::default_store_path)
                    .ok_or_else(|| {
                        SyncError::InvalidConfig("no store path available".into())
                    })?;
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                let path = path.to_string_lossy().into_owned();
                Arc::new(SqliteKeyValue::open(&path).await?)
            }
        };

        let identity = Arc::new(DeviceIdentityService::new(kv.clone(), self.platform));
        let cases = OfflineCaseStore::new(kv.clone());
        let queue = MutationQueue::new(kv);
        let emitter = self.emitter.unwrap_or_else(|| Arc::new(NoOpEmitter));

        // Case API: injected, or HTTP against the configured base URL.
        let (api, http_api): (Arc<dyn CaseApi>, Option<Arc<HttpCaseApi>>) = match self.api {
            Some(api) => (api, None),
            None => {
                let http = Arc::new(HttpCaseApi::new(&self.config.api)?);
                (http.clone(), Some(http))
            }
        };

        let engine = SyncEngine::new(
            api,
            cases.clone(),
            queue.clone(),
            self.config.sync.clone(),
        );

        let (connection, incoming_rx) =
            ConnectionManager::spawn(self.config.connection.clone(), identity.clone());

        // Router: engine bridge first, then any extra observers.
        let mut router = NotificationRouter::new(connection.clone());
        router.register(Arc::new(EngineObserver {
            engine: engine.clone(),
            emitter: emitter.clone(),
        }));
        for observer in self.observers {
            router.register(observer);
        }
        let (router_shutdown_tx, router_shutdown_rx) = mpsc::channel(1);
        tokio::spawn(router.run(incoming_rx, router_shutdown_rx));

        // Background scheduling, gated on app lifecycle.
        let (lifecycle_tx, lifecycle_rx) = watch::channel(AppLifecycle::Foreground);
        let tasks = BackgroundTaskManager::spawn(
            engine.clone(),
            queue.clone(),
            self.config.sync.clone(),
            lifecycle_rx,
        );

        // Status monitor fanning events out to the emitter.
        let (monitor_shutdown_tx, monitor_shutdown_rx) = mpsc::channel(1);
        tokio::spawn(SyncAgent::monitor(
            connection.clone(),
            engine.clone(),
            queue.clone(),
            emitter.clone(),
            monitor_shutdown_rx,
        ));

        info!("Sync agent started");

        Ok(SyncAgent {
            identity,
            connection,
            engine,
            cases,
            queue,
            http_api,
            lifecycle_tx,
            tasks,
            router_shutdown_tx,
            monitor_shutdown_tx,
        })
    }
}

// =============================================================================
// Sync Agent
// =============================================================================

/// The fully wired sync layer. One instance per app session.
pub struct SyncAgent {
    identity: Arc<DeviceIdentityService>,
    connection: ConnectionHandle,
    engine: Arc<SyncEngine>,
    cases: OfflineCaseStore,
    queue: MutationQueue,
    http_api: Option<Arc<HttpCaseApi>>,
    lifecycle_tx: watch::Sender<AppLifecycle>,
    tasks: BackgroundTasksHandle,
    router_shutdown_tx: mpsc::Sender<()>,
    monitor_shutdown_tx: mpsc::Sender<()>,
}

impl SyncAgent {
    /// Entry point for construction.
    pub fn builder(config: SyncConfig, platform: Platform) -> SyncAgentBuilder {
        SyncAgentBuilder::new(config, platform)
    }

    // =========================================================================
    // Session Entry Points
    // =========================================================================

    /// Installs credentials and connects.
    pub async fn login(&self, token: impl Into<String>) -> SyncResult<()> {
        let token = token.into();
        if let Some(http) = &self.http_api {
            http.set_token(token.clone()).await;
        }
        self.connection.connect(token).await
    }

    /// Disconnects, cancels pending reconnects, and clears the local cache
    /// and queue. Cached case data does not outlive the login session.
    pub async fn logout(&self) -> SyncResult<()> {
        self.connection.logout().await?;
        if let Some(http) = &self.http_api {
            http.clear_token().await;
        }
        self.cases.clear().await?;
        self.queue.clear().await?;
        info!("Logged out, local cache cleared");
        Ok(())
    }

    /// Reports an app lifecycle change to the scheduler and the server.
    /// Foregrounding while disconnected reconnects immediately.
    pub async fn set_app_state(&self, state: AppLifecycle) -> SyncResult<()> {
        let _ = self.lifecycle_tx.send(state);
        self.connection.set_app_state(state).await
    }

    /// User-initiated sync (pull to refresh).
    pub async fn refresh(&self) -> SyncResult<SyncSession> {
        self.engine.trigger_sync(SyncReason::Manual).await
    }

    pub async fn subscribe_case(&self, case_id: impl Into<String>) -> SyncResult<()> {
        self.connection.subscribe_case(case_id).await
    }

    pub async fn unsubscribe_case(&self, case_id: impl Into<String>) -> SyncResult<()> {
        self.connection.unsubscribe_case(case_id).await
    }

    /// Stops background work and closes the connection. Keeps the cache:
    /// teardown is not logout.
    pub async fn shutdown(&self) -> SyncResult<()> {
        self.tasks.shutdown().await;
        let _ = self.monitor_shutdown_tx.send(()).await;
        let _ = self.router_shutdown_tx.send(()).await;
        self.connection.logout().await?;
        info!("Sync agent stopped");
        Ok(())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn identity(&self) -> &Arc<DeviceIdentityService> {
        &self.identity
    }

    pub fn connection(&self) -> &ConnectionHandle {
        &self.connection
    }

    pub fn engine(&self) -> &Arc<SyncEngine> {
        &self.engine
    }

    /// The offline cache: local truth for the UI between syncs.
    pub fn cases(&self) -> &OfflineCaseStore {
        &self.cases
    }

    /// The outbound queue UI edits go to.
    pub fn mutations(&self) -> &MutationQueue {
        &self.queue
    }

    /// Full status snapshot.
    pub async fn status(&self) -> SyncResult<AgentStatus> {
        Ok(AgentStatus {
            connection: self.connection.state(),
            connection_info: self.connection.info().await,
            watermark: self.cases.watermark().await?,
            pending_mutations: self.queue.pending_count().await?,
            cached_cases: self.cases.count().await?,
            health: *self.engine.watch_health().borrow(),
            identity_degraded: self.identity.is_degraded(),
        })
    }

    // =========================================================================
    // Status Monitor
    // =========================================================================

    /// Watches connection state, sync health, and the refreshed signal and
    /// fans them out to the emitter. Reconnects trigger a reconcile pull.
    async fn monitor(
        connection: ConnectionHandle,
        engine: Arc<SyncEngine>,
        queue: MutationQueue,
        emitter: Arc<dyn SyncEventEmitter>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        let mut state_rx = connection.watch_state();
        let mut health_rx = engine.watch_health();
        let mut refreshed_rx = engine.subscribe_refreshed();
        let mut last_state = *state_rx.borrow();

        loop {
            tokio::select! {
                changed = state_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let state = *state_rx.borrow_and_update();
                    if state == last_state {
                        continue;
                    }
                    emitter.connection_changed(&state);

                    match state {
                        ConnectionState::Connected => {
                            let pending = queue.pending_count().await.unwrap_or(0);
                            if let Err(e) = connection
                                .report_connectivity(ConnectivityPayload {
                                    is_online: true,
                                    connection_type: "unknown".to_string(),
                                    pending_sync_count: pending,
                                })
                                .await
                            {
                                debug!(error = %e, "Could not report connectivity");
                            }

                            // Reconcile whatever happened while offline.
                            let engine = engine.clone();
                            tokio::spawn(async move {
                                let _ = engine.trigger_sync(SyncReason::Reconnect).await;
                            });
                        }
                        ConnectionState::Disconnected => {
                            let info = connection.info().await;
                            if info.auth_required {
                                emitter.auth_required(
                                    info.last_error
                                        .as_deref()
                                        .unwrap_or("authentication required"),
                                );
                            }
                        }
                        _ => {}
                    }

                    last_state = state;
                }

                changed = health_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    if let SyncHealth::Stale { consecutive_failures } =
                        *health_rx.borrow_and_update()
                    {
                        warn!(consecutive_failures, "Cached data may be stale");
                        emitter.data_stale(consecutive_failures);
                    }
                }

                received = refreshed_rx.recv() => match received {
                    Ok(session) => emitter.data_refreshed(&session),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "Refreshed signal receiver lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },

                _ = shutdown_rx.recv() => break,
            }
        }

        debug!("Status monitor stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use fieldlink_core::case::{CasePriority, CaseStatus};
    use fieldlink_store::kv::MemoryKeyValue;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct EmptyApi;

    #[async_trait]
    impl CaseApi for EmptyApi {
        async fn cases_updated_since(&self, _w: Watermark) -> SyncResult<Vec<RemoteCase>> {
            Ok(vec![])
        }
        async fn case_by_id(&self, _id: &str) -> SyncResult<Option<RemoteCase>> {
            Ok(None)
        }
    }

    fn test_config() -> SyncConfig {
        let mut config = SyncConfig::default();
        config.connection.server_url = "ws://127.0.0.1:1".to_string();
        config
    }

    async fn test_agent() -> SyncAgent {
        SyncAgent::builder(test_config(), Platform::Android)
            .with_store(Arc::new(MemoryKeyValue::new()))
            .with_case_api(Arc::new(EmptyApi))
            .build()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn agent_builds_and_reports_status() {
        let agent = test_agent().await;

        let status = agent.status().await.unwrap();
        assert_eq!(status.connection, ConnectionState::Disconnected);
        assert_eq!(status.pending_mutations, 0);
        assert_eq!(status.cached_cases, 0);
        assert_eq!(status.health, SyncHealth::Fresh);

        agent.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn logout_clears_cache_and_queue() {
        let agent = test_agent().await;

        agent
            .cases()
            .apply_remote(
                &RemoteCase {
                    id: "c-1".to_string(),
                    status: CaseStatus::New,
                    priority: CasePriority::Low,
                    assigned_to: None,
                    server_updated_at: chrono::Utc.timestamp_opt(100, 0).unwrap(),
                },
                &std::collections::HashSet::new(),
            )
            .await
            .unwrap();
        agent
            .mutations()
            .enqueue(
                "c-1",
                fieldlink_core::case::CaseField::Status,
                serde_json::json!("resolved"),
            )
            .await
            .unwrap();

        agent.logout().await.unwrap();

        let status = agent.status().await.unwrap();
        assert_eq!(status.cached_cases, 0);
        assert_eq!(status.pending_mutations, 0);

        agent.shutdown().await.unwrap();
    }

    struct CountingEmitter {
        refreshed: AtomicU32,
    }

    impl SyncEventEmitter for CountingEmitter {
        fn connection_changed(&self, _state: &ConnectionState) {}
        fn auth_required(&self, _reason: &str) {}
        fn case_updated(&self, _case_id: &str) {}
        fn data_refreshed(&self, _session: &SyncSession) {
            self.refreshed.fetch_add(1, Ordering::SeqCst);
        }
        fn data_stale(&self, _consecutive_failures: u32) {}
    }

    #[tokio::test]
    async fn manual_refresh_reaches_the_emitter() {
        let emitter = Arc::new(CountingEmitter {
            refreshed: AtomicU32::new(0),
        });

        let agent = SyncAgent::builder(test_config(), Platform::Android)
            .with_store(Arc::new(MemoryKeyValue::new()))
            .with_case_api(Arc::new(EmptyApi))
            .with_emitter(emitter.clone())
            .build()
            .await
            .unwrap();

        agent.refresh().await.unwrap();

        // The monitor task forwards the broadcast; give it a beat.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(emitter.refreshed.load(Ordering::SeqCst), 1);

        agent.shutdown().await.unwrap();
    }
}
