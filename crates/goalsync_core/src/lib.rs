//! # goalsync core
//!
//! Local entity store for goalsync.
//!
//! This crate provides:
//! - Typed syncable entities (profile, goal, task, purchased item)
//! - Per-entity sync metadata (`needs_sync`, modification time, local revision)
//! - The [`EntityStore`] contract consumed by the sync engine
//! - [`LocalStore`], an in-memory or JSON-file backed implementation
//!
//! ## Key Invariants
//!
//! - Exactly one entity per `(kind, id)`
//! - Every local create/update sets `needs_sync`
//! - `needs_sync` is cleared only by [`EntityStore::mark_synced`] for the
//!   revision that was actually pushed, or by a pull that adopts the remote value
//! - A pull batch and its checkpoint are committed together or not at all

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

pub mod entity;
mod error;
pub mod store;
mod types;

pub use entity::{
    new_entity_id, profile_id_for_account, Entity, Goal, HourWindow, ProductiveHours,
    PurchasedItem, SyncMeta, Task, UserProfile,
};
pub use error::{CoreError, CoreResult};
pub use store::{
    DeviceState, EntityStore, LocalStore, PendingDelete, PullApplied, PullBatch, PullOp, SyncAck,
};
pub use types::{ChangeToken, EntityKind};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
