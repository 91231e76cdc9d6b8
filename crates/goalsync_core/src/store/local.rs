//! In-memory and file-backed entity store.

use super::state::StoreState;
use super::{DeviceState, EntityStore, PendingDelete, PullApplied, PullBatch, SyncAck};
use crate::entity::{Entity, Task};
use crate::error::CoreResult;
use crate::types::{ChangeToken, EntityKind};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// The local entity store.
///
/// All writes go through a copy-on-write step: the mutation runs against a
/// copy of the state, the copy is persisted (for file-backed stores), and only
/// then replaces the live state. A failed write leaves nothing behind, which
/// is what makes a pull batch and its checkpoint atomic.
///
/// # Example
///
/// ```
/// use goalsync_core::{EntityStore, Goal, LocalStore, EntityKind};
///
/// let store = LocalStore::open_in_memory();
/// store.save(Goal::new("G1", "Run a 10k").into()).unwrap();
///
/// let dirty = store.query_dirty(EntityKind::Goal).unwrap();
/// assert_eq!(dirty.len(), 1);
/// ```
pub struct LocalStore {
    state: RwLock<StoreState>,
    path: Option<PathBuf>,
}

impl LocalStore {
    /// Opens a store that lives only in memory.
    pub fn open_in_memory() -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
            path: None,
        }
    }

    /// Opens (or creates) a store persisted as a JSON snapshot at `path`.
    pub fn open(path: impl AsRef<Path>) -> CoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let state = if path.exists() {
            let bytes = fs::read(&path)?;
            let mut state: StoreState = serde_json::from_slice(&bytes)?;
            state.rebuild_index();
            debug!(path = %path.display(), "loaded entity store");
            state
        } else {
            debug!(path = %path.display(), "creating entity store");
            StoreState::default()
        };

        Ok(Self {
            state: RwLock::new(state),
            path: Some(path),
        })
    }

    /// Returns the backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn read<T>(&self, f: impl FnOnce(&StoreState) -> T) -> T {
        f(&self.state.read())
    }

    fn write<T>(&self, f: impl FnOnce(&mut StoreState) -> CoreResult<T>) -> CoreResult<T> {
        let mut guard = self.state.write();
        let mut next = guard.clone();
        let out = f(&mut next)?;
        if let Some(path) = &self.path {
            persist(path, &next)?;
        }
        *guard = next;
        Ok(out)
    }
}

/// Writes the snapshot to a sibling temp file and renames it into place.
fn persist(path: &Path, state: &StoreState) -> CoreResult<()> {
    let bytes = serde_json::to_vec_pretty(state)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

impl EntityStore for LocalStore {
    fn save_at(&self, entity: Entity, modified_at: DateTime<Utc>) -> CoreResult<Entity> {
        self.write(|state| state.save_local(entity, modified_at))
    }

    fn delete_at(
        &self,
        kind: EntityKind,
        id: &str,
        deleted_at: DateTime<Utc>,
    ) -> CoreResult<Vec<PendingDelete>> {
        self.write(|state| state.delete_local(kind, id, deleted_at))
    }

    fn get(&self, kind: EntityKind, id: &str) -> CoreResult<Option<Entity>> {
        Ok(self.read(|state| state.get(kind, id)))
    }

    fn list(&self, kind: EntityKind) -> CoreResult<Vec<Entity>> {
        Ok(self.read(|state| state.list(kind)))
    }

    fn query_dirty(&self, kind: EntityKind) -> CoreResult<Vec<Entity>> {
        Ok(self.read(|state| {
            state
                .list(kind)
                .into_iter()
                .filter(Entity::needs_sync)
                .collect()
        }))
    }

    fn tasks_for_goal(&self, goal_id: &str) -> CoreResult<Vec<Task>> {
        Ok(self.read(|state| state.tasks_for_goal(goal_id)))
    }

    fn mark_synced(
        &self,
        kind: EntityKind,
        id: &str,
        revision: u64,
        change_tag: Option<String>,
    ) -> CoreResult<bool> {
        self.write(|state| state.mark_synced(kind, id, revision, change_tag))
    }

    fn mark_synced_all(&self, acks: Vec<SyncAck>) -> CoreResult<usize> {
        if acks.is_empty() {
            return Ok(0);
        }
        self.write(|state| {
            let mut cleared = 0;
            for ack in acks {
                if state.mark_synced(ack.kind, &ack.id, ack.revision, ack.change_tag)? {
                    cleared += 1;
                }
            }
            Ok(cleared)
        })
    }

    fn pending_deletes(&self) -> CoreResult<Vec<PendingDelete>> {
        Ok(self.read(StoreState::pending_deletes))
    }

    fn pending_delete(&self, kind: EntityKind, id: &str) -> CoreResult<Option<PendingDelete>> {
        Ok(self.read(|state| state.pending_delete(kind, id)))
    }

    fn complete_delete(&self, kind: EntityKind, id: &str) -> CoreResult<()> {
        self.write(|state| {
            state.complete_delete(kind, id);
            Ok(())
        })
    }

    fn apply_pull(&self, batch: PullBatch) -> CoreResult<PullApplied> {
        self.write(|state| state.apply_pull(batch))
    }

    fn checkpoint(&self, kind: EntityKind) -> CoreResult<Option<ChangeToken>> {
        Ok(self.read(|state| state.checkpoint(kind)))
    }

    fn deferred_tasks(&self) -> CoreResult<Vec<Task>> {
        Ok(self.read(StoreState::deferred_tasks))
    }

    fn device_state(&self) -> CoreResult<DeviceState> {
        Ok(self.read(|state| state.device().clone()))
    }

    fn set_push_token(&self, token: Option<String>) -> CoreResult<()> {
        self.write(|state| {
            state.device_mut().push_token = token;
            Ok(())
        })
    }

    fn record_subscriptions(&self, ids: &[String]) -> CoreResult<()> {
        self.write(|state| {
            state.device_mut().subscriptions.extend(ids.iter().cloned());
            Ok(())
        })
    }
}
