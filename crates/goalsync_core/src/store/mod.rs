//! The local entity store.

mod local;
mod state;

pub use local::LocalStore;

use crate::entity::{Entity, Task};
use crate::error::CoreResult;
use crate::types::{ChangeToken, EntityKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A local delete that still has to be propagated to the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingDelete {
    /// Kind of the deleted entity.
    pub kind: EntityKind,
    /// Identifier of the deleted entity.
    pub id: String,
    /// When the delete happened.
    pub deleted_at: DateTime<Utc>,
}

/// A confirmed remote save, recorded with [`EntityStore::mark_synced_all`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncAck {
    /// Kind of the saved entity.
    pub kind: EntityKind,
    /// Identifier of the saved entity.
    pub id: String,
    /// Local revision that was pushed.
    pub revision: u64,
    /// Server version returned by the save.
    pub change_tag: Option<String>,
}

/// One change in a pull batch.
#[derive(Debug, Clone, PartialEq)]
pub enum PullOp {
    /// Write a remote value.
    ///
    /// `expected_revision` is the local revision the decision to overwrite was
    /// based on (`None` if the entity was absent). If the entity changed since,
    /// the op is skipped: the local edit is newer than anything in the batch.
    Upsert {
        /// The remote value, already mapped.
        entity: Entity,
        /// Local revision the write was decided against.
        expected_revision: Option<u64>,
    },
    /// Apply a remote delete, cascading goal deletes to their tasks.
    Delete {
        /// Identifier to delete.
        id: String,
        /// Local revision the delete was decided against.
        expected_revision: Option<u64>,
    },
    /// Keep an entity that was deleted remotely and mark it for re-upload.
    ///
    /// Used when a newer local edit (its own, or a dirty task's for a goal)
    /// wins against a remote delete. The known server version is forgotten,
    /// since the record is gone remotely.
    Restore {
        /// Identifier to keep.
        id: String,
        /// Modification time of the edit that won.
        modified_at: DateTime<Utc>,
        /// Local revision the decision was made against.
        expected_revision: u64,
    },
    /// Hold a task whose goal has not been materialised yet.
    Defer(Task),
    /// Drop a task from the deferred set.
    Undefer {
        /// Task identifier.
        id: String,
    },
}

/// A batch of pulled changes for one kind, committed atomically with its checkpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct PullBatch {
    /// Kind every op in the batch belongs to.
    pub kind: EntityKind,
    /// Changes in application order.
    pub ops: Vec<PullOp>,
    /// New checkpoint for the kind; `None` leaves it unchanged.
    pub checkpoint: Option<ChangeToken>,
}

impl PullBatch {
    /// Creates an empty batch for a kind.
    pub fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            ops: Vec::new(),
            checkpoint: None,
        }
    }

    /// Sets the checkpoint to commit with the batch.
    pub fn with_checkpoint(mut self, token: ChangeToken) -> Self {
        self.checkpoint = Some(token);
        self
    }

    /// Appends an op.
    pub fn push(&mut self, op: PullOp) {
        self.ops.push(op);
    }
}

/// Counts of what a committed pull batch changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PullApplied {
    /// Entities written from remote values.
    pub upserted: usize,
    /// Entities removed by remote deletes (cascades included).
    pub deleted: usize,
    /// Ops skipped because the entity changed locally in the meantime.
    pub skipped: usize,
    /// Tasks placed in the deferred set.
    pub deferred: usize,
    /// Entities kept against a remote delete and queued for re-upload.
    pub restored: usize,
}

/// Per-device state that the sync engine owns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceState {
    /// Push token registered for this device, if any.
    pub push_token: Option<String>,
    /// Identifiers of remote subscriptions known to exist.
    pub subscriptions: BTreeSet<String>,
}

/// The entity store consumed by the sync engine.
///
/// Every method is atomic with respect to every other: a reader never sees an
/// entity with its fields updated but `needs_sync` not yet flipped.
pub trait EntityStore: Send + Sync {
    /// Inserts or updates an entity as a local edit.
    ///
    /// Sets `needs_sync`, stamps `modified_at` and bumps the local revision.
    /// The caller's `server_change_tag` is ignored; the store keeps its own.
    fn save_at(&self, entity: Entity, modified_at: DateTime<Utc>) -> CoreResult<Entity>;

    /// Inserts or updates an entity as a local edit made now.
    fn save(&self, entity: Entity) -> CoreResult<Entity> {
        self.save_at(entity, Utc::now())
    }

    /// Deletes an entity locally and queues the remote deletes.
    ///
    /// Deleting a goal deletes its tasks. Returns every queued delete.
    fn delete_at(
        &self,
        kind: EntityKind,
        id: &str,
        deleted_at: DateTime<Utc>,
    ) -> CoreResult<Vec<PendingDelete>>;

    /// Deletes an entity locally now.
    fn delete(&self, kind: EntityKind, id: &str) -> CoreResult<Vec<PendingDelete>> {
        self.delete_at(kind, id, Utc::now())
    }

    /// Gets an entity by kind and id.
    fn get(&self, kind: EntityKind, id: &str) -> CoreResult<Option<Entity>>;

    /// Lists every entity of a kind.
    fn list(&self, kind: EntityKind) -> CoreResult<Vec<Entity>>;

    /// Lists entities of a kind with `needs_sync` set.
    fn query_dirty(&self, kind: EntityKind) -> CoreResult<Vec<Entity>>;

    /// Lists the tasks owned by a goal.
    fn tasks_for_goal(&self, goal_id: &str) -> CoreResult<Vec<Task>>;

    /// Records a confirmed remote save.
    ///
    /// Always remembers `change_tag` as the entity's server version. Clears
    /// `needs_sync` only if the entity is still at `revision`; returns whether
    /// it did.
    fn mark_synced(
        &self,
        kind: EntityKind,
        id: &str,
        revision: u64,
        change_tag: Option<String>,
    ) -> CoreResult<bool>;

    /// Records several confirmed saves in one write.
    ///
    /// Each ack behaves like [`EntityStore::mark_synced`]. Returns how many
    /// entities had `needs_sync` cleared.
    fn mark_synced_all(&self, acks: Vec<SyncAck>) -> CoreResult<usize>;

    /// Lists queued remote deletes.
    fn pending_deletes(&self) -> CoreResult<Vec<PendingDelete>>;

    /// Looks up a queued remote delete.
    fn pending_delete(&self, kind: EntityKind, id: &str) -> CoreResult<Option<PendingDelete>>;

    /// Removes a queued remote delete once the remote confirmed it.
    fn complete_delete(&self, kind: EntityKind, id: &str) -> CoreResult<()>;

    /// Applies a pull batch and its checkpoint atomically.
    fn apply_pull(&self, batch: PullBatch) -> CoreResult<PullApplied>;

    /// Returns the pull checkpoint for a kind.
    fn checkpoint(&self, kind: EntityKind) -> CoreResult<Option<ChangeToken>>;

    /// Lists tasks waiting for their goal.
    fn deferred_tasks(&self) -> CoreResult<Vec<Task>>;

    /// Returns the device state.
    fn device_state(&self) -> CoreResult<DeviceState>;

    /// Stores (or clears) the device push token.
    fn set_push_token(&self, token: Option<String>) -> CoreResult<()>;

    /// Records remote subscriptions known to exist.
    fn record_subscriptions(&self, ids: &[String]) -> CoreResult<()>;
}
