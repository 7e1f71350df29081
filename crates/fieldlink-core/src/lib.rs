//! # fieldlink-core: Pure Domain Logic for FieldLink
//!
//! This crate holds the value types and decision logic that the sync layer
//! is built on, as pure functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       FieldLink Architecture                            │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 fieldlink-sync (live layer)                     │   │
//! │  │   ConnectionManager ── NotificationRouter ── SyncEngine         │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │              ★ fieldlink-core (THIS CRATE) ★                    │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   case    │  │   merge   │  │  device   │  │  session  │  │   │
//! │  │   │CaseRecord │  │  policy   │  │ identity  │  │ SyncReason│  │   │
//! │  │   │ statuses  │  │ decisions │  │ UUID v4   │  │  outcome  │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │              fieldlink-store (offline cache)                    │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`case`] - Case records, statuses, priorities, mutable field names
//! - [`device`] - Device identity value type and UUID v4 validation
//! - [`merge`] - Last-writer-wins merge policy for inbound server deltas
//! - [`session`] - Sync session bookkeeping (reason, outcome, watermark)
//! - [`error`] - Domain error types

// =============================================================================
// Module Declarations
// =============================================================================

pub mod case;
pub mod device;
pub mod error;
pub mod merge;
pub mod session;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use case::{CaseField, CasePriority, CaseRecord, CaseStatus, RemoteCase};
pub use device::{DeviceIdentity, Platform};
pub use error::CoreError;
pub use merge::{merge_case, MergeOutcome};
pub use session::{SyncOutcome, SyncReason, SyncSession, Watermark};
