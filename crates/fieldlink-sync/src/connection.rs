//! # Connection Manager
//!
//! Owns the single live notification connection: authenticated handshake,
//! bounded reconnect with backoff, and app-lifecycle hooks.
//!
//! ## Connection Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Connection States                                   │
//! │                                                                         │
//! │  ┌────────────┐    connect()    ┌────────────┐   auth:ok               │
//! │  │Disconnected│ ──────────────► │ Connecting │ ───────────┐            │
//! │  └────────────┘                 └─────┬──────┘            ▼            │
//! │        ▲  ▲                           │ failure    ┌────────────┐      │
//! │        │  │                           ▼            │ Connected  │      │
//! │        │  │ auth rejected /   ┌───────────────┐    └─────┬──────┘      │
//! │        │  │ attempts          │Reconnecting(n)│ ◄────────┘             │
//! │        │  │ exhausted         └───────┬───────┘   transport drop       │
//! │        │  └──────────────────────────┘│                                │
//! │        │                              │ delay(n) = base · 2^(n-1)      │
//! │        └── logout() ──────────────────┘ (capped, jittered, bounded)    │
//! │                                                                         │
//! │  GUARANTEES                                                            │
//! │  • One connect attempt in flight at any time (single task owns it)     │
//! │  • Handshake bounded by a timeout; timeout is failure                  │
//! │  • auth:rejected NEVER enters the backoff loop                         │
//! │  • logout() is the only Connected/Reconnecting → Disconnected path     │
//! │    initiated by the caller; it cancels pending reconnect timers        │
//! │  • Foregrounding while not Connected reconnects with backoff reset    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use chrono::{DateTime, Utc};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch, RwLock};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use fieldlink_core::device::validate_device_id;

use crate::config::ConnectionSettings;
use crate::error::{SyncError, SyncResult};
use crate::identity::DeviceIdentityService;
use crate::protocol::{
    AppLifecycle, AuthPayload, ClientFrame, ConnectivityPayload, ServerFrame, ServerMessage,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, WsMessage>;

// =============================================================================
// Connection State
// =============================================================================

/// Externally visible connection state. Owned exclusively by the manager
/// task; everyone else reads it through a watch channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected, no attempt pending.
    Disconnected,
    /// First attempt of a connect cycle in flight.
    Connecting,
    /// Authenticated and receiving events.
    Connected,
    /// Waiting out backoff (or retrying) after failure `n`.
    Reconnecting(u32),
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Reconnecting(n) => write!(f, "reconnecting({})", n),
        }
    }
}

/// Connection bookkeeping readable by embedders (status indicator).
#[derive(Debug, Clone, Default)]
pub struct ConnectionInfo {
    pub last_connected_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub reconnect_attempts: u32,
    /// Set when the server rejected our credentials; the caller must
    /// supply a fresh token before anything reconnects.
    pub auth_required: bool,
    /// Set when bounded reconnect gave up.
    pub retries_exhausted: bool,
}

// =============================================================================
// Reconnect Policy
// =============================================================================

/// Bounded exponential backoff: `delay(n) = base · 2^(n-1)`, capped, with a
/// configurable randomization factor (0 = deterministic). Jitter exists so
/// a fleet of devices does not reconnect in lockstep after an outage.
pub struct ReconnectPolicy {
    inner: ExponentialBackoff,
    max_attempts: u32,
    attempt: u32,
}

impl ReconnectPolicy {
    pub fn new(base: Duration, cap: Duration, max_attempts: u32, jitter: f64) -> Self {
        let mut inner = ExponentialBackoff {
            initial_interval: base,
            randomization_factor: jitter,
            multiplier: 2.0,
            max_interval: cap,
            max_elapsed_time: None,
            ..Default::default()
        };
        inner.reset();

        ReconnectPolicy {
            inner,
            max_attempts,
            attempt: 0,
        }
    }

    pub fn from_settings(settings: &ConnectionSettings) -> Self {
        ReconnectPolicy::new(
            settings.base_delay(),
            settings.max_delay(),
            settings.max_attempts,
            settings.jitter,
        )
    }

    /// Delay before the next attempt, or `None` once the attempt budget is
    /// spent (caller-initiated retry required from here on).
    pub fn next_delay(&mut self) -> Option<Duration> {
        self.attempt += 1;
        if self.attempt > self.max_attempts {
            return None;
        }
        self.inner.next_backoff()
    }

    /// Failures seen so far in this cycle.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Back to attempt zero with the base delay (successful connect, or a
    /// foreground hook asking for an immediate fresh start).
    pub fn reset(&mut self) {
        self.attempt = 0;
        self.inner.reset();
    }
}

// =============================================================================
// Commands & Handle
// =============================================================================

enum Command {
    Connect { token: String },
    Logout,
    AppState(AppLifecycle),
    SubscribeCase(String),
    UnsubscribeCase(String),
    Connectivity(ConnectivityPayload),
    Ack(String),
}

/// Handle for driving the connection from other components.
#[derive(Clone)]
pub struct ConnectionHandle {
    cmd_tx: mpsc::Sender<Command>,
    state_rx: watch::Receiver<ConnectionState>,
    info: Arc<RwLock<ConnectionInfo>>,
}

impl ConnectionHandle {
    /// Starts a connect cycle with the given access token. A no-op while a
    /// cycle is already in flight or the connection is up.
    pub async fn connect(&self, token: impl Into<String>) -> SyncResult<()> {
        self.send(Command::Connect {
            token: token.into(),
        })
        .await
    }

    /// Tears the connection down and cancels pending reconnect timers.
    /// The only caller-initiated path to `Disconnected`.
    pub async fn logout(&self) -> SyncResult<()> {
        self.send(Command::Logout).await
    }

    /// Reports an app lifecycle change. Foregrounding while not connected
    /// reconnects immediately with backoff reset.
    pub async fn set_app_state(&self, state: AppLifecycle) -> SyncResult<()> {
        self.send(Command::AppState(state)).await
    }

    /// Subscribes to live updates for a case. Remembered across reconnects.
    pub async fn subscribe_case(&self, case_id: impl Into<String>) -> SyncResult<()> {
        self.send(Command::SubscribeCase(case_id.into())).await
    }

    pub async fn unsubscribe_case(&self, case_id: impl Into<String>) -> SyncResult<()> {
        self.send(Command::UnsubscribeCase(case_id.into())).await
    }

    /// Reports connectivity and sync backlog to the server.
    pub async fn report_connectivity(&self, payload: ConnectivityPayload) -> SyncResult<()> {
        self.send(Command::Connectivity(payload)).await
    }

    /// Sends a delivery acknowledgment for a notification id.
    pub async fn ack(&self, notification_id: impl Into<String>) -> SyncResult<()> {
        self.send(Command::Ack(notification_id.into())).await
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Watch channel of state transitions (status indicators, tests).
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Connection bookkeeping snapshot.
    pub async fn info(&self) -> ConnectionInfo {
        self.info.read().await.clone()
    }

    async fn send(&self, command: Command) -> SyncResult<()> {
        self.cmd_tx
            .send(command)
            .await
            .map_err(|_| SyncError::Channel("connection manager stopped".into()))
    }
}

// =============================================================================
// Connection Manager
// =============================================================================

/// How the connected loop ended.
enum LoopEnd {
    Logout,
    Shutdown,
    Dropped(SyncError),
}

/// How a connect cycle ended.
enum CycleEnd {
    Idle,
    Shutdown,
}

/// The task that owns the socket. All I/O suspends at await points; there
/// is no shared-memory blocking anywhere in here.
pub struct ConnectionManager {
    settings: ConnectionSettings,
    identity: Arc<DeviceIdentityService>,

    cmd_rx: mpsc::Receiver<Command>,
    state_tx: watch::Sender<ConnectionState>,
    incoming_tx: mpsc::Sender<ServerFrame>,
    info: Arc<RwLock<ConnectionInfo>>,

    /// Latest access token; kept across transport drops, cleared by logout
    /// and by auth rejection.
    token: Option<String>,
    app_state: AppLifecycle,
    /// Desired case subscriptions, replayed after every (re)connect.
    subscriptions: HashSet<String>,
}

impl ConnectionManager {
    /// Spawns the manager task. Returns the control handle and the stream
    /// of inbound frames (handshake verdicts are consumed internally).
    pub fn spawn(
        settings: ConnectionSettings,
        identity: Arc<DeviceIdentityService>,
    ) -> (ConnectionHandle, mpsc::Receiver<ServerFrame>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        let (incoming_tx, incoming_rx) = mpsc::channel(256);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let info = Arc::new(RwLock::new(ConnectionInfo::default()));

        let manager = ConnectionManager {
            settings,
            identity,
            cmd_rx,
            state_tx,
            incoming_tx,
            info: info.clone(),
            token: None,
            app_state: AppLifecycle::Foreground,
            subscriptions: HashSet::new(),
        };

        tokio::spawn(manager.run());

        let handle = ConnectionHandle {
            cmd_tx,
            state_rx,
            info,
        };

        (handle, incoming_rx)
    }

    fn set_state(&self, state: ConnectionState) {
        let _ = self.state_tx.send(state);
    }

    /// Main loop: idle until something asks for a connection, then run one
    /// connect cycle at a time.
    async fn run(mut self) {
        info!(url = %self.settings.server_url, "Connection manager starting");

        loop {
            let cmd = match self.cmd_rx.recv().await {
                None => break,
                Some(cmd) => cmd,
            };

            let should_connect = match cmd {
                Command::Connect { token } => {
                    self.token = Some(token);
                    true
                }
                Command::AppState(state) => {
                    self.app_state = state;
                    // Foregrounding while disconnected reconnects, provided
                    // we still hold credentials.
                    state == AppLifecycle::Foreground && self.token.is_some()
                }
                Command::Logout => {
                    self.token = None;
                    false
                }
                Command::SubscribeCase(id) => {
                    self.subscriptions.insert(id);
                    false
                }
                Command::UnsubscribeCase(id) => {
                    self.subscriptions.remove(&id);
                    false
                }
                Command::Connectivity(_) | Command::Ack(_) => {
                    debug!("Dropping outbound frame while disconnected");
                    false
                }
            };

            if !should_connect {
                continue;
            }

            {
                let mut info = self.info.write().await;
                info.auth_required = false;
                info.retries_exhausted = false;
            }

            match self.connect_cycle().await {
                CycleEnd::Idle => continue,
                CycleEnd::Shutdown => break,
            }
        }

        self.set_state(ConnectionState::Disconnected);
        info!("Connection manager stopped");
    }

    /// One connect cycle: attempt, and on transient failure retry with
    /// bounded backoff until connected, exhausted, rejected, or logged out.
    async fn connect_cycle(&mut self) -> CycleEnd {
        let mut policy = ReconnectPolicy::from_settings(&self.settings);
        self.set_state(ConnectionState::Connecting);

        loop {
            let token = match self.token.clone() {
                Some(token) => token,
                None => {
                    self.set_state(ConnectionState::Disconnected);
                    return CycleEnd::Idle;
                }
            };

            let last_error;

            match self.attempt_handshake(&token).await {
                Ok(ws) => {
                    policy.reset();
                    self.set_state(ConnectionState::Connected);
                    {
                        let mut info = self.info.write().await;
                        info.last_connected_at = Some(Utc::now());
                        info.reconnect_attempts = 0;
                        info.last_error = None;
                    }
                    self.identity.touch().await;
                    info!("Notification connection established");

                    match self.connected_loop(ws).await {
                        LoopEnd::Logout => return CycleEnd::Idle,
                        LoopEnd::Shutdown => return CycleEnd::Shutdown,
                        LoopEnd::Dropped(e) => {
                            warn!(error = %e, "Notification connection dropped");
                            last_error = e;
                        }
                    }
                }
                Err(e) if e.is_auth() => {
                    // Distinct from transient failure: surface for re-login,
                    // never feed the backoff loop.
                    error!(error = %e, "Authentication rejected");
                    {
                        let mut info = self.info.write().await;
                        info.last_error = Some(e.to_string());
                        info.auth_required = true;
                    }
                    self.token = None;
                    self.set_state(ConnectionState::Disconnected);
                    return CycleEnd::Idle;
                }
                Err(e) => {
                    debug!(error = %e, "Connect attempt failed");
                    last_error = e;
                }
            }

            self.info.write().await.last_error = Some(last_error.to_string());

            let delay = match policy.next_delay() {
                Some(delay) => delay,
                None => {
                    let exhausted = SyncError::RetriesExhausted {
                        attempts: policy.attempt() - 1,
                        last_error: last_error.to_string(),
                    };
                    error!(error = %exhausted, "Giving up on reconnect");
                    {
                        let mut info = self.info.write().await;
                        info.last_error = Some(exhausted.to_string());
                        info.retries_exhausted = true;
                    }
                    self.set_state(ConnectionState::Disconnected);
                    return CycleEnd::Idle;
                }
            };

            self.set_state(ConnectionState::Reconnecting(policy.attempt()));
            self.info.write().await.reconnect_attempts = policy.attempt();
            debug!(?delay, attempt = policy.attempt(), "Waiting before reconnect");

            // Sleep out the backoff while staying responsive: logout cancels
            // the timer, fresh credentials or a foreground hook skip it.
            let sleep = tokio::time::sleep(delay);
            tokio::pin!(sleep);
            loop {
                tokio::select! {
                    _ = &mut sleep => break,
                    cmd = self.cmd_rx.recv() => match cmd {
                        None => return CycleEnd::Shutdown,
                        Some(Command::Logout) => {
                            info!("Logout during backoff, cancelling reconnect");
                            self.token = None;
                            self.set_state(ConnectionState::Disconnected);
                            return CycleEnd::Idle;
                        }
                        Some(Command::Connect { token }) => {
                            self.token = Some(token);
                            policy.reset();
                            break;
                        }
                        Some(Command::AppState(state)) => {
                            self.app_state = state;
                            if state == AppLifecycle::Foreground {
                                policy.reset();
                                break;
                            }
                        }
                        Some(Command::SubscribeCase(id)) => {
                            self.subscriptions.insert(id);
                        }
                        Some(Command::UnsubscribeCase(id)) => {
                            self.subscriptions.remove(&id);
                        }
                        Some(Command::Connectivity(_)) | Some(Command::Ack(_)) => {
                            debug!("Dropping outbound frame during backoff");
                        }
                    }
                }
            }
        }
    }

    /// Opens the socket and runs the auth exchange, all under one bounded
    /// timeout. A timeout is a failure, never treated as success.
    async fn attempt_handshake(&self, token: &str) -> SyncResult<WsStream> {
        let identity = self.identity.identity().await;
        // Receiving-side contract: a malformed id must not reach the server.
        validate_device_id(&identity.device_id)?;

        let handshake = async {
            let (mut ws, response) = connect_async(&self.settings.server_url).await?;
            debug!(status = ?response.status(), "WebSocket handshake complete");

            let auth = ClientFrame::Auth(AuthPayload {
                token: token.to_string(),
                platform: identity.platform,
                device_id: identity.device_id.clone(),
            });
            ws.send(WsMessage::Text(auth.to_json()?.into())).await?;

            loop {
                let msg = match ws.next().await {
                    None => return Err(SyncError::Disconnected),
                    Some(msg) => msg?,
                };

                match msg {
                    WsMessage::Text(text) => match ServerFrame::from_json(&text) {
                        Ok(frame) => match frame.message {
                            ServerMessage::AuthOk(payload) => {
                                debug!(server_time = ?payload.server_time, "Authenticated");
                                return Ok(ws);
                            }
                            ServerMessage::AuthRejected { reason } => {
                                return Err(SyncError::Auth(reason));
                            }
                            _ => {
                                debug!(
                                    frame = frame.type_name(),
                                    "Frame before auth verdict, dropping"
                                );
                            }
                        },
                        Err(e) => return Err(SyncError::Protocol(e.to_string())),
                    },
                    WsMessage::Ping(data) => ws.send(WsMessage::Pong(data)).await?,
                    WsMessage::Close(_) => return Err(SyncError::Disconnected),
                    _ => {}
                }
            }
        };

        match timeout(self.settings.handshake_timeout(), handshake).await {
            Ok(result) => result,
            Err(_) => Err(SyncError::Timeout(self.settings.handshake_timeout_secs)),
        }
    }

    /// Connected: pump frames in, commands out, keepalive pings.
    async fn connected_loop(&mut self, ws: WsStream) -> LoopEnd {
        let (mut write, mut read) = ws.split();

        if let Err(e) = self.announce(&mut write).await {
            return LoopEnd::Dropped(e);
        }

        let mut ping_interval = tokio::time::interval(self.settings.ping_interval());
        ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                msg = read.next() => {
                    match self.handle_inbound(msg, &mut write).await {
                        Ok(()) => {}
                        Err(e) => return LoopEnd::Dropped(e),
                    }
                }

                cmd = self.cmd_rx.recv() => {
                    let cmd = match cmd {
                        None => {
                            let _ = write.send(WsMessage::Close(None)).await;
                            return LoopEnd::Shutdown;
                        }
                        Some(cmd) => cmd,
                    };

                    match self.handle_command(cmd, &mut write).await {
                        Ok(keep_going) if keep_going => {}
                        Ok(_) => return LoopEnd::Logout,
                        Err(e) => return LoopEnd::Dropped(e),
                    }
                }

                _ = ping_interval.tick() => {
                    if let Err(e) = write.send(WsMessage::Ping(vec![].into())).await {
                        return LoopEnd::Dropped(e.into());
                    }
                }
            }
        }
    }

    /// First frames after connecting: current app state and the replayed
    /// case subscriptions.
    async fn announce(&self, write: &mut WsSink) -> SyncResult<()> {
        send_frame(
            write,
            &ClientFrame::AppState {
                state: self.app_state,
            },
        )
        .await?;

        for case_id in &self.subscriptions {
            send_frame(
                write,
                &ClientFrame::SubscribeCase {
                    case_id: case_id.clone(),
                },
            )
            .await?;
        }

        Ok(())
    }

    async fn handle_inbound(
        &self,
        msg: Option<Result<WsMessage, tokio_tungstenite::tungstenite::Error>>,
        write: &mut WsSink,
    ) -> SyncResult<()> {
        let msg = match msg {
            None => return Err(SyncError::Disconnected),
            Some(msg) => msg?,
        };

        match msg {
            WsMessage::Text(text) => match ServerFrame::from_json(&text) {
                Ok(frame) => {
                    debug!(frame = frame.type_name(), "Received frame");
                    if self.incoming_tx.send(frame).await.is_err() {
                        return Err(SyncError::Channel("frame receiver dropped".into()));
                    }
                }
                Err(e) => {
                    // Malformed frame: logged and dropped, connection stays up.
                    warn!(error = %e, "Dropping malformed frame");
                }
            },
            WsMessage::Ping(data) => write.send(WsMessage::Pong(data)).await?,
            WsMessage::Pong(_) => debug!("Received pong"),
            WsMessage::Close(frame) => {
                info!(?frame, "Server closed the connection");
                return Err(SyncError::Disconnected);
            }
            WsMessage::Binary(_) => warn!("Dropping unexpected binary frame"),
            WsMessage::Frame(_) => {}
        }

        Ok(())
    }

    /// Returns Ok(false) when the command ends the connection (logout).
    async fn handle_command(&mut self, cmd: Command, write: &mut WsSink) -> SyncResult<bool> {
        match cmd {
            Command::Logout => {
                info!("Logout, closing notification connection");
                let _ = write.send(WsMessage::Close(None)).await;
                self.token = None;
                self.set_state(ConnectionState::Disconnected);
                return Ok(false);
            }
            Command::Connect { .. } => {
                // Guard: one connection, one in-flight attempt.
                debug!("Already connected, ignoring connect request");
            }
            Command::AppState(state) => {
                self.app_state = state;
                send_frame(write, &ClientFrame::AppState { state }).await?;
            }
            Command::SubscribeCase(case_id) => {
                self.subscriptions.insert(case_id.clone());
                send_frame(write, &ClientFrame::SubscribeCase { case_id }).await?;
            }
            Command::UnsubscribeCase(case_id) => {
                self.subscriptions.remove(&case_id);
                send_frame(write, &ClientFrame::UnsubscribeCase { case_id }).await?;
            }
            Command::Connectivity(payload) => {
                send_frame(write, &ClientFrame::Connectivity(payload)).await?;
            }
            Command::Ack(notification_id) => {
                send_frame(write, &ClientFrame::NotificationAck { notification_id }).await?;
            }
        }

        Ok(true)
    }
}

async fn send_frame(write: &mut WsSink, frame: &ClientFrame) -> SyncResult<()> {
    debug!(frame = frame.type_name(), "Sending frame");
    write.send(WsMessage::Text(frame.to_json()?.into())).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_display() {
        assert_eq!(ConnectionState::Connected.to_string(), "connected");
        assert_eq!(ConnectionState::Reconnecting(3).to_string(), "reconnecting(3)");
    }

    #[test]
    fn backoff_is_deterministic_without_jitter() {
        let mut policy =
            ReconnectPolicy::new(Duration::from_secs(1), Duration::from_secs(60), 5, 0.0);

        // Three consecutive failures at base 1s: 1s, 2s, 4s.
        assert_eq!(policy.next_delay(), Some(Duration::from_secs(1)));
        assert_eq!(policy.next_delay(), Some(Duration::from_secs(2)));
        assert_eq!(policy.next_delay(), Some(Duration::from_secs(4)));
        assert_eq!(policy.attempt(), 3);
    }

    #[test]
    fn backoff_stops_after_max_attempts() {
        let mut policy =
            ReconnectPolicy::new(Duration::from_millis(100), Duration::from_secs(60), 2, 0.0);

        assert!(policy.next_delay().is_some());
        assert!(policy.next_delay().is_some());
        assert_eq!(policy.next_delay(), None);
        // Still None: the budget stays spent until reset.
        assert_eq!(policy.next_delay(), None);
    }

    #[test]
    fn backoff_is_capped() {
        let mut policy =
            ReconnectPolicy::new(Duration::from_secs(1), Duration::from_secs(4), 10, 0.0);

        let delays: Vec<_> = (0..5).filter_map(|_| policy.next_delay()).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(4),
                Duration::from_secs(4),
            ]
        );
    }

    #[test]
    fn backoff_reset_restores_base_delay() {
        let mut policy =
            ReconnectPolicy::new(Duration::from_secs(1), Duration::from_secs(60), 5, 0.0);

        policy.next_delay();
        policy.next_delay();
        policy.reset();

        assert_eq!(policy.attempt(), 0);
        assert_eq!(policy.next_delay(), Some(Duration::from_secs(1)));
    }

    #[test]
    fn jittered_backoff_stays_in_band() {
        let mut policy =
            ReconnectPolicy::new(Duration::from_secs(2), Duration::from_secs(60), 5, 0.5);

        let delay = policy.next_delay().unwrap();
        assert!(delay >= Duration::from_secs(1));
        assert!(delay <= Duration::from_secs(3));
    }
}
