//! # goalsync sync engine
//!
//! Local-first sync orchestrator for goalsync.
//!
//! This crate provides:
//! - The [`SyncOrchestrator`] state machine (idle → pushing → pulling → idle,
//!   paused while offline or signed out)
//! - Trigger coalescing: at most one pass in flight, one follow-up at most
//! - Last-writer-wins conflict resolution with merge-then-save
//! - Per-kind pull checkpoints committed atomically with each batch
//! - Background fetch within a wall-clock budget
//! - Change subscriptions, reachability gating and push registration
//!
//! ## Architecture
//!
//! A pass pushes before it pulls:
//! 1. Save every dirty entity (goals before their tasks), then queued deletes
//! 2. Fetch changes per kind since the kind's checkpoint and apply each batch
//!    together with its new checkpoint
//!
//! ## Key Invariants
//!
//! - `needs_sync` is cleared only for the revision the remote confirmed
//! - A pull never overwrites a pending local edit unless the remote value wins
//!   under the conflict policy
//! - Transient failures leave state untouched and are retried on the next trigger
//! - Permanent per-entity failures skip the entity, never the pass

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod background;
mod config;
mod error;
mod notifications;
mod orchestrator;
mod pipeline;
mod pull;
mod push;
mod reachability;
mod state;
mod subscriptions;

pub use config::{ConflictRetry, SyncConfig};
pub use error::{SyncError, SyncResult};
pub use notifications::{NotificationRegistrar, PermissionPrompt, TriggerMode};
pub use orchestrator::SyncOrchestrator;
pub use pipeline::{SyncHandle, Trigger};
pub use reachability::ReachabilityMonitor;
pub use state::{
    BackgroundFetchResult, DeferReason, Diagnostic, PassOutcome, PassReport, PassScope,
    SyncEvent, SyncState, SyncStats, MAX_DIAGNOSTICS,
};
pub use subscriptions::{SubscriptionManager, SubscriptionReport};
