//! # fieldlink-sync: Connection + Sync Engine for FieldLink
//!
//! The live half of FieldLink: a persistent authenticated WebSocket for
//! real-time case notifications, and an offline-first engine reconciling
//! the local case cache with the backend.
//!
//! ## Data Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          FieldLink Data Flow                            │
//! │                                                                         │
//! │  DeviceIdentityService ──► ConnectionManager ──► NotificationRouter    │
//! │      (UUID v4 cred)          (auth, backoff)       + AckTracker        │
//! │                                                        │                │
//! │                                                        ▼                │
//! │                                                   SyncEngine            │
//! │                                                 (coalesced pulls,       │
//! │                                                  LWW merge)             │
//! │                                                        │                │
//! │                                                        ▼                │
//! │   BackgroundTaskManager ──── periodic trigger ──► OfflineCaseStore      │
//! │                                                 (local truth for UI)    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`agent`] - `SyncAgent` orchestrator, builder, event emitter seam
//! - [`api`] - read-only `CaseApi` collaborator + HTTP implementation
//! - [`config`] - TOML + env configuration
//! - [`connection`] - connection state machine with bounded backoff
//! - [`engine`] - coalesced delta-pull reconciliation
//! - [`error`] - error taxonomy
//! - [`identity`] - per-installation device identity
//! - [`protocol`] - wire frames
//! - [`router`] - typed event dispatch + delivery acknowledgments
//! - [`tasks`] - periodic sync and maintenance scheduling
//!
//! ## Usage
//!
//! ```rust,ignore
//! use fieldlink_sync::{Platform, SyncAgent, SyncConfig};
//!
//! let config = SyncConfig::load_or_default(None);
//! let agent = SyncAgent::builder(config, Platform::Android).build().await?;
//!
//! agent.login(access_token).await?;
//! let session = agent.refresh().await?;
//! println!("merged {} case deltas", session.applied);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod agent;
pub mod api;
pub mod config;
pub mod connection;
pub mod engine;
pub mod error;
pub mod identity;
pub mod protocol;
pub mod router;
pub mod tasks;

// =============================================================================
// Re-exports
// =============================================================================

pub use agent::{AgentStatus, NoOpEmitter, SyncAgent, SyncAgentBuilder, SyncEventEmitter};
pub use api::{CaseApi, HttpCaseApi};
pub use config::SyncConfig;
pub use connection::{ConnectionHandle, ConnectionManager, ConnectionState, ReconnectPolicy};
pub use engine::{SyncEngine, SyncHealth};
pub use error::{SyncError, SyncResult};
pub use identity::DeviceIdentityService;
pub use protocol::{AppLifecycle, ClientFrame, ServerFrame, ServerMessage};
pub use router::{AcknowledgmentTracker, CaseEventObserver, NotificationRouter};
pub use tasks::{BackgroundTaskManager, BackgroundTasksHandle};

// Re-export the domain types embedders need at the API surface.
pub use fieldlink_core::case::{CaseField, CasePriority, CaseRecord, CaseStatus, RemoteCase};
pub use fieldlink_core::device::Platform;
pub use fieldlink_core::session::{SyncOutcome, SyncReason, SyncSession, Watermark};
