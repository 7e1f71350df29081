//! # fieldlink-store: Offline Store for FieldLink
//!
//! Local truth for the UI between syncs. The case cache is written only by
//! the sync engine's merges; UI edits land in the outbound mutation queue.
//!
//! ## Storage Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Key-Value Layout                                  │
//! │                                                                         │
//! │  identity/device          DeviceIdentity JSON                          │
//! │  sync/watermark           RFC3339 timestamp                            │
//! │  case/<case_id>           CaseRecord JSON (one key per case)           │
//! │  mutation/<entry_id>      CaseMutation JSON (one key per entry)        │
//! │                                                                         │
//! │  One record per key means single-key atomicity (all the collaborator   │
//! │  guarantees) is exactly record-atomic merges: a sync session that      │
//! │  dies halfway leaves whole records, never torn ones.                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`kv`] - `KeyValue` collaborator trait, SQLite and in-memory backends
//! - [`cases`] - offline case cache + watermark
//! - [`queue`] - outbound mutation queue (UI writes, retention pruning)
//! - [`error`] - store error types

pub mod cases;
pub mod error;
pub mod kv;
pub mod queue;

pub use cases::OfflineCaseStore;
pub use error::{StoreError, StoreResult};
pub use kv::{KeyValue, MemoryKeyValue, SqliteKeyValue};
pub use queue::{CaseMutation, MutationQueue};
