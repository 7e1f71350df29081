//! Connection manager integration tests against a local WebSocket listener.
//!
//! These stand a real `tokio-tungstenite` accept loop in for the
//! notification server, so the handshake, the ack path, and the retry
//! behavior are exercised over actual sockets.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};

use fieldlink_core::case::RemoteCase;
use fieldlink_core::device::Platform;
use fieldlink_core::session::Watermark;
use fieldlink_store::kv::MemoryKeyValue;
use fieldlink_sync::config::ConnectionSettings;
use fieldlink_sync::connection::{ConnectionManager, ConnectionState};
use fieldlink_sync::error::SyncResult;
use fieldlink_sync::identity::DeviceIdentityService;
use fieldlink_sync::protocol::AppLifecycle;
use fieldlink_sync::router::{CaseEventObserver, NotificationRouter};

// =============================================================================
// Helpers
// =============================================================================

async fn bind() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    (listener, url)
}

fn settings(url: &str) -> ConnectionSettings {
    ConnectionSettings {
        server_url: url.to_string(),
        handshake_timeout_secs: 5,
        base_delay_ms: 50,
        max_delay_secs: 1,
        max_attempts: 2,
        jitter: 0.0,
        ping_interval_secs: 30,
    }
}

fn identity_service() -> Arc<DeviceIdentityService> {
    Arc::new(DeviceIdentityService::new(
        Arc::new(MemoryKeyValue::new()),
        Platform::Android,
    ))
}

/// Accepts one connection, verifies the auth frame, and replies `auth:ok`.
async fn accept_and_auth(listener: &TcpListener) -> WebSocketStream<TcpStream> {
    let (stream, _) = listener.accept().await.unwrap();
    let mut ws = accept_async(stream).await.unwrap();

    let msg = ws.next().await.unwrap().unwrap();
    let frame: serde_json::Value = serde_json::from_str(msg.to_text().unwrap()).unwrap();
    assert_eq!(frame["type"], "auth");
    assert!(frame["payload"]["token"].is_string());
    // The device id on the wire honors the UUID v4 contract.
    let device_id = frame["payload"]["deviceId"].as_str().unwrap();
    let parsed = uuid::Uuid::parse_str(device_id).unwrap();
    assert_eq!(parsed.get_version_num(), 4);

    ws.send(Message::Text(
        r#"{"type":"auth:ok","payload":{}}"#.into(),
    ))
    .await
    .unwrap();

    ws
}

/// Reads frames until a `notification:ack` arrives; returns its id.
/// Skips the frames the client sends on connect (app:state, connectivity).
async fn next_ack(ws: &mut WebSocketStream<TcpStream>) -> String {
    loop {
        let msg = ws.next().await.unwrap().unwrap();
        if !msg.is_text() {
            continue;
        }
        let frame: serde_json::Value = serde_json::from_str(msg.to_text().unwrap()).unwrap();
        if frame["type"] == "notification:ack" {
            return frame["payload"]["notificationId"]
                .as_str()
                .unwrap()
                .to_string();
        }
    }
}

fn event_json(notification_id: &str, case_id: &str) -> String {
    format!(
        r#"{{"notificationId":"{}","type":"case:assigned","payload":{{"id":"{}","status":"assigned","priority":"high","assignedTo":"agent-1","serverUpdatedAt":"2024-05-01T12:00:00Z"}}}}"#,
        notification_id, case_id
    )
}

/// Observer that records which cases it saw.
struct RecordingObserver {
    seen: Mutex<Vec<String>>,
}

#[async_trait]
impl CaseEventObserver for RecordingObserver {
    async fn case_assigned(&self, case: &RemoteCase) -> SyncResult<()> {
        self.seen.lock().await.push(case.id.clone());
        Ok(())
    }

    async fn case_status_changed(&self, case: &RemoteCase) -> SyncResult<()> {
        self.seen.lock().await.push(case.id.clone());
        Ok(())
    }

    async fn case_priority_changed(&self, case: &RemoteCase) -> SyncResult<()> {
        self.seen.lock().await.push(case.id.clone());
        Ok(())
    }

    async fn sync_requested(&self, _reason: Option<&str>) -> SyncResult<()> {
        Ok(())
    }

    async fn sync_completed(&self, _watermark: Option<Watermark>) -> SyncResult<()> {
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn handshake_event_ack_roundtrip() {
    let (listener, url) = bind().await;
    let (handle, incoming_rx) = ConnectionManager::spawn(settings(&url), identity_service());

    // Full intake path: router + tracker between the socket and observers.
    let observer = Arc::new(RecordingObserver {
        seen: Mutex::new(Vec::new()),
    });
    let mut router = NotificationRouter::new(handle.clone());
    router.register(observer.clone());
    let (_shutdown_tx, shutdown_rx) = mpsc::channel(1);
    tokio::spawn(router.run(incoming_rx, shutdown_rx));

    handle.connect("tok-1").await.unwrap();

    let mut server = accept_and_auth(&listener).await;

    let mut state_rx = handle.watch_state();
    timeout(
        Duration::from_secs(2),
        state_rx.wait_for(|s| *s == ConnectionState::Connected),
    )
    .await
    .expect("should reach Connected")
    .unwrap();

    // Deliver an event twice (at-least-once), then a second event.
    server
        .send(Message::Text(event_json("n-1", "c-1").into()))
        .await
        .unwrap();
    assert_eq!(next_ack(&mut server).await, "n-1");

    server
        .send(Message::Text(event_json("n-1", "c-1").into()))
        .await
        .unwrap();
    server
        .send(Message::Text(event_json("n-2", "c-2").into()))
        .await
        .unwrap();

    // The duplicate's ack is suppressed: the next ack on the wire is n-2's.
    assert_eq!(next_ack(&mut server).await, "n-2");

    // Observers saw every delivery (idempotence is their contract).
    let seen = observer.seen.lock().await.clone();
    assert_eq!(seen, vec!["c-1", "c-1", "c-2"]);

    // Logout closes the connection and lands in Disconnected.
    handle.logout().await.unwrap();
    timeout(
        Duration::from_secs(2),
        state_rx.wait_for(|s| *s == ConnectionState::Disconnected),
    )
    .await
    .expect("should reach Disconnected")
    .unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn auth_rejection_is_surfaced_not_retried() {
    let (listener, url) = bind().await;
    let (handle, _incoming_rx) = ConnectionManager::spawn(settings(&url), identity_service());

    handle.connect("expired-token").await.unwrap();

    // Reject the handshake.
    let (stream, _) = listener.accept().await.unwrap();
    let mut ws = accept_async(stream).await.unwrap();
    let _auth = ws.next().await.unwrap().unwrap();
    ws.send(Message::Text(
        r#"{"type":"auth:rejected","payload":{"reason":"token expired"}}"#.into(),
    ))
    .await
    .unwrap();

    // Wait for the rejection to land (the initial state is also
    // Disconnected, so poll the bookkeeping rather than the state).
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        let info = handle.info().await;
        if info.auth_required {
            assert_eq!(handle.state(), ConnectionState::Disconnected);
            assert!(!info.retries_exhausted);
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "auth rejection should have been surfaced"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    // No backoff retry follows an auth rejection: with a 50ms base delay a
    // buggy retry would reconnect well within this window.
    let second = timeout(Duration::from_millis(400), listener.accept()).await;
    assert!(second.is_err(), "auth rejection must not re-dial");
}

#[tokio::test(flavor = "multi_thread")]
async fn network_failure_exhausts_bounded_retries() {
    // Bind, take the address, drop the listener: connection refused.
    let (listener, url) = bind().await;
    drop(listener);

    let (handle, _incoming_rx) = ConnectionManager::spawn(settings(&url), identity_service());
    handle.connect("tok-1").await.unwrap();

    // max_attempts=2 at 50ms base: exhaustion lands well inside 2 seconds.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        let info = handle.info().await;
        if info.retries_exhausted {
            assert_eq!(handle.state(), ConnectionState::Disconnected);
            assert!(!info.auth_required);
            assert!(info.last_error.is_some());
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "retries should have exhausted by now"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn foregrounding_while_disconnected_reconnects() {
    let (listener, url) = bind().await;
    drop(listener);

    let mut config = settings(&url);
    config.base_delay_ms = 300; // keep Reconnecting visible

    let (handle, _incoming_rx) = ConnectionManager::spawn(config, identity_service());
    handle.connect("tok-1").await.unwrap();

    // Let the bounded retry cycle run out.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    while !handle.info().await.retries_exhausted {
        assert!(tokio::time::Instant::now() < deadline);
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(handle.state(), ConnectionState::Disconnected);

    // Foregrounding triggers an immediate connect with backoff reset.
    handle.set_app_state(AppLifecycle::Foreground).await.unwrap();

    let mut state_rx = handle.watch_state();
    timeout(
        Duration::from_secs(2),
        state_rx.wait_for(|s| *s != ConnectionState::Disconnected),
    )
    .await
    .expect("foregrounding should start a connect attempt")
    .unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_connect_requests_open_one_connection() {
    let (listener, url) = bind().await;
    let accepts = Arc::new(AtomicU32::new(0));

    // Accept loop that authenticates every connection and holds it open.
    let server_accepts = accepts.clone();
    tokio::spawn(async move {
        loop {
            let (stream, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => break,
            };
            server_accepts.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                let mut ws = accept_async(stream).await.unwrap();
                let _auth = ws.next().await;
                let _ = ws
                    .send(Message::Text(r#"{"type":"auth:ok","payload":{}}"#.into()))
                    .await;
                // Hold the connection open, draining whatever arrives.
                while ws.next().await.is_some() {}
            });
        }
    });

    let (handle, _incoming_rx) = ConnectionManager::spawn(settings(&url), identity_service());

    // Two rapid connect requests, then one more while connected.
    handle.connect("tok-1").await.unwrap();
    handle.connect("tok-1").await.unwrap();

    let mut state_rx = handle.watch_state();
    timeout(
        Duration::from_secs(2),
        state_rx.wait_for(|s| *s == ConnectionState::Connected),
    )
    .await
    .expect("should reach Connected")
    .unwrap();

    handle.connect("tok-1").await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(handle.state(), ConnectionState::Connected);
    assert_eq!(accepts.load(Ordering::SeqCst), 1, "exactly one connection");
}
