//! # Notification Protocol Frames
//!
//! Message types exchanged over the notification connection.
//!
//! ## Protocol Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                   Notification Protocol Frames                          │
//! │                                                                         │
//! │  HANDSHAKE FLOW                                                        │
//! │  ──────────────                                                        │
//! │  CLIENT ───► auth { token, platform, deviceId }                        │
//! │  SERVER ◄─── auth:ok { serverTime }   (or auth:rejected { reason })    │
//! │                                                                         │
//! │  EVENT DELIVERY (SERVER → CLIENT, at-least-once)                       │
//! │  ───────────────────────────────────────────────                       │
//! │  SERVER ───► { notificationId?, type, payload }                        │
//! │              case:assigned / case:status_changed /                     │
//! │              case:priority_changed / sync:trigger / sync:completed     │
//! │  CLIENT ───► notification:ack { notificationId }  (id present only)    │
//! │                                                                         │
//! │  SUBSCRIPTIONS & STATE (CLIENT → SERVER)                               │
//! │  ───────────────────────────────────────                               │
//! │  subscribe:case { caseId }      unsubscribe:case { caseId }            │
//! │  app:state { state }            connectivity { isOnline, ... }         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Wire Format
//! Tagged JSON: `{ "type": "...", "payload": { ... } }`. Inbound frames use
//! one uniform envelope with an optional top-level `notificationId`; whether
//! a frame is acknowledged depends only on that field being present, never
//! on the frame type.

use serde::{Deserialize, Serialize};

use fieldlink_core::case::RemoteCase;
use fieldlink_core::device::Platform;
use fieldlink_core::session::Watermark;

// =============================================================================
// App Lifecycle
// =============================================================================

/// App lifecycle state, reported to the server in `app:state` frames and
/// used by the background scheduler to gate periodic work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppLifecycle {
    Foreground,
    Background,
}

impl std::fmt::Display for AppLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppLifecycle::Foreground => write!(f, "foreground"),
            AppLifecycle::Background => write!(f, "background"),
        }
    }
}

// =============================================================================
// Client → Server Frames
// =============================================================================

/// Frames the client sends.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ClientFrame {
    /// Handshake credentials, first frame on every connection.
    #[serde(rename = "auth")]
    Auth(AuthPayload),

    /// Subscribe to live updates for one case.
    #[serde(rename = "subscribe:case")]
    SubscribeCase { #[serde(rename = "caseId")] case_id: String },

    /// Unsubscribe from a case.
    #[serde(rename = "unsubscribe:case")]
    UnsubscribeCase { #[serde(rename = "caseId")] case_id: String },

    /// Report the app lifecycle state.
    #[serde(rename = "app:state")]
    AppState { state: AppLifecycle },

    /// Report device connectivity and sync backlog.
    #[serde(rename = "connectivity")]
    Connectivity(ConnectivityPayload),

    /// Acknowledge delivery of a notification.
    #[serde(rename = "notification:ack")]
    NotificationAck {
        #[serde(rename = "notificationId")]
        notification_id: String,
    },
}

/// Handshake auth payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthPayload {
    /// Access token issued by the (out-of-scope) auth layer. Opaque here.
    pub token: String,

    /// Platform of this installation.
    pub platform: Platform,

    /// Stable device identifier (UUID v4).
    pub device_id: String,
}

/// Connectivity report payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectivityPayload {
    pub is_online: bool,
    pub connection_type: String,
    pub pending_sync_count: usize,
}

impl ClientFrame {
    /// Frame type name, for logging.
    pub fn type_name(&self) -> &'static str {
        match self {
            ClientFrame::Auth(_) => "auth",
            ClientFrame::SubscribeCase { .. } => "subscribe:case",
            ClientFrame::UnsubscribeCase { .. } => "unsubscribe:case",
            ClientFrame::AppState { .. } => "app:state",
            ClientFrame::Connectivity(_) => "connectivity",
            ClientFrame::NotificationAck { .. } => "notification:ack",
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// =============================================================================
// Server → Client Frames
// =============================================================================

/// Message body of a server frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ServerMessage {
    /// Handshake accepted.
    #[serde(rename = "auth:ok")]
    AuthOk(AuthOkPayload),

    /// Handshake rejected. Distinct from transient network failure; never
    /// retried by the backoff loop.
    #[serde(rename = "auth:rejected")]
    AuthRejected { reason: String },

    /// A case was assigned to this agent.
    #[serde(rename = "case:assigned")]
    CaseAssigned(RemoteCase),

    /// A case's status changed.
    #[serde(rename = "case:status_changed")]
    CaseStatusChanged(RemoteCase),

    /// A case's priority changed.
    #[serde(rename = "case:priority_changed")]
    CasePriorityChanged(RemoteCase),

    /// The server asks the client to run a delta pull.
    #[serde(rename = "sync:trigger")]
    SyncTrigger {
        #[serde(default)]
        reason: Option<String>,
    },

    /// The server finished processing a batch relevant to this device.
    #[serde(rename = "sync:completed")]
    SyncCompleted {
        #[serde(default)]
        watermark: Option<Watermark>,
    },
}

/// Payload of `auth:ok`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthOkPayload {
    /// Server time at handshake, clock-skew reference.
    #[serde(default)]
    pub server_time: Option<chrono::DateTime<chrono::Utc>>,
}

/// Uniform inbound envelope: every server frame is a message body plus an
/// optional `notificationId`. Presence of the id - and nothing else -
/// decides whether the frame is acknowledged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerFrame {
    #[serde(
        rename = "notificationId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub notification_id: Option<String>,

    #[serde(flatten)]
    pub message: ServerMessage,
}

impl ServerFrame {
    /// Frame type name, for logging.
    pub fn type_name(&self) -> &'static str {
        match &self.message {
            ServerMessage::AuthOk(_) => "auth:ok",
            ServerMessage::AuthRejected { .. } => "auth:rejected",
            ServerMessage::CaseAssigned(_) => "case:assigned",
            ServerMessage::CaseStatusChanged(_) => "case:status_changed",
            ServerMessage::CasePriorityChanged(_) => "case:priority_changed",
            ServerMessage::SyncTrigger { .. } => "sync:trigger",
            ServerMessage::SyncCompleted { .. } => "sync:completed",
        }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldlink_core::case::{CasePriority, CaseStatus};

    #[test]
    fn auth_frame_wire_shape() {
        let frame = ClientFrame::Auth(AuthPayload {
            token: "tok-123".to_string(),
            platform: Platform::Android,
            device_id: "f47ac10b-58cc-4372-a567-0e02b2c3d479".to_string(),
        });

        let json = frame.to_json().unwrap();
        assert!(json.contains("\"type\":\"auth\""));
        assert!(json.contains("\"deviceId\""));
        assert!(json.contains("\"platform\":\"android\""));
    }

    #[test]
    fn subscribe_frame_wire_shape() {
        let frame = ClientFrame::SubscribeCase {
            case_id: "c-42".to_string(),
        };
        let json = frame.to_json().unwrap();
        assert!(json.contains("\"type\":\"subscribe:case\""));
        assert!(json.contains("\"caseId\":\"c-42\""));
    }

    #[test]
    fn event_envelope_with_notification_id() {
        let json = r#"{
            "notificationId": "n-7",
            "type": "case:status_changed",
            "payload": {
                "id": "c-1",
                "status": "resolved",
                "priority": "high",
                "assignedTo": "agent-3",
                "serverUpdatedAt": "2024-05-01T12:00:00Z"
            }
        }"#;

        let frame = ServerFrame::from_json(json).unwrap();
        assert_eq!(frame.notification_id.as_deref(), Some("n-7"));
        match frame.message {
            ServerMessage::CaseStatusChanged(case) => {
                assert_eq!(case.id, "c-1");
                assert_eq!(case.status, CaseStatus::Resolved);
                assert_eq!(case.priority, CasePriority::High);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn event_envelope_without_notification_id() {
        // Some frames legitimately carry no id; the envelope stays uniform.
        let json = r#"{ "type": "sync:trigger", "payload": { "reason": "case_updated" } }"#;
        let frame = ServerFrame::from_json(json).unwrap();
        assert!(frame.notification_id.is_none());
        assert_eq!(frame.type_name(), "sync:trigger");
    }

    #[test]
    fn malformed_frame_is_an_error() {
        assert!(ServerFrame::from_json("{\"type\":\"nonsense\"}").is_err());
        assert!(ServerFrame::from_json("not json at all").is_err());
    }
}
