//! In-memory store state shared by every [`LocalStore`](super::LocalStore) backend.

use super::{DeviceState, PendingDelete, PullApplied, PullBatch, PullOp};
use crate::entity::{Entity, Goal, PurchasedItem, Task, UserProfile};
use crate::error::{CoreError, CoreResult};
use crate::types::{ChangeToken, EntityKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A goal together with the tasks it owns.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct GoalSlot {
    goal: Goal,
    #[serde(default)]
    tasks: BTreeMap<String, Task>,
}

/// Complete store contents. Also the on-disk snapshot format.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct StoreState {
    #[serde(default)]
    next_revision: u64,
    #[serde(default)]
    profiles: BTreeMap<String, UserProfile>,
    #[serde(default)]
    goals: BTreeMap<String, GoalSlot>,
    /// Task id -> owning goal id. Rebuilt on load.
    #[serde(skip)]
    task_owner: BTreeMap<String, String>,
    #[serde(default)]
    purchases: BTreeMap<String, PurchasedItem>,
    #[serde(default)]
    checkpoints: BTreeMap<EntityKind, ChangeToken>,
    #[serde(default)]
    pending_deletes: Vec<PendingDelete>,
    #[serde(default)]
    deferred_tasks: BTreeMap<String, Task>,
    #[serde(default)]
    device: DeviceState,
}

impl StoreState {
    /// Rebuilds the task ownership index after deserialization.
    pub(crate) fn rebuild_index(&mut self) {
        self.task_owner = self
            .goals
            .values()
            .flat_map(|slot| {
                slot.tasks
                    .keys()
                    .map(move |task_id| (task_id.clone(), slot.goal.id.clone()))
            })
            .collect();
    }

    fn bump_revision(&mut self) -> u64 {
        self.next_revision += 1;
        self.next_revision
    }

    fn revision_of(&self, kind: EntityKind, id: &str) -> Option<u64> {
        self.get(kind, id).map(|e| e.meta().local_revision)
    }

    fn drop_pending_delete(&mut self, kind: EntityKind, id: &str) {
        self.pending_deletes
            .retain(|pending| !(pending.kind == kind && pending.id == id));
    }

    pub(crate) fn get(&self, kind: EntityKind, id: &str) -> Option<Entity> {
        match kind {
            EntityKind::UserProfile => self.profiles.get(id).cloned().map(Entity::from),
            EntityKind::Goal => self.goals.get(id).map(|slot| slot.goal.clone().into()),
            EntityKind::Task => self
                .task_owner
                .get(id)
                .and_then(|goal_id| self.goals.get(goal_id))
                .and_then(|slot| slot.tasks.get(id))
                .cloned()
                .map(Entity::from),
            EntityKind::PurchasedItem => self.purchases.get(id).cloned().map(Entity::from),
        }
    }

    pub(crate) fn list(&self, kind: EntityKind) -> Vec<Entity> {
        match kind {
            EntityKind::UserProfile => self.profiles.values().cloned().map(Entity::from).collect(),
            EntityKind::Goal => self
                .goals
                .values()
                .map(|slot| slot.goal.clone().into())
                .collect(),
            EntityKind::Task => self
                .goals
                .values()
                .flat_map(|slot| slot.tasks.values().cloned().map(Entity::from))
                .collect(),
            EntityKind::PurchasedItem => {
                self.purchases.values().cloned().map(Entity::from).collect()
            }
        }
    }

    pub(crate) fn tasks_for_goal(&self, goal_id: &str) -> Vec<Task> {
        self.goals
            .get(goal_id)
            .map(|slot| slot.tasks.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Writes an entity as-is, enforcing parent existence for tasks.
    fn put(&mut self, entity: Entity) -> CoreResult<()> {
        if entity.id().is_empty() {
            return Err(CoreError::EmptyIdentifier {
                kind: entity.kind(),
            });
        }

        match entity {
            Entity::UserProfile(profile) => {
                self.profiles.insert(profile.id.clone(), profile);
            }
            Entity::Goal(goal) => match self.goals.get_mut(&goal.id) {
                Some(slot) => slot.goal = goal,
                None => {
                    self.goals.insert(
                        goal.id.clone(),
                        GoalSlot {
                            goal,
                            tasks: BTreeMap::new(),
                        },
                    );
                }
            },
            Entity::Task(task) => {
                if !self.goals.contains_key(&task.goal_id) {
                    return Err(CoreError::MissingParent {
                        task_id: task.id,
                        goal_id: task.goal_id,
                    });
                }
                // A task may move between goals.
                if let Some(previous) = self.task_owner.get(&task.id).cloned() {
                    if previous != task.goal_id {
                        if let Some(slot) = self.goals.get_mut(&previous) {
                            slot.tasks.remove(&task.id);
                        }
                    }
                }
                self.task_owner.insert(task.id.clone(), task.goal_id.clone());
                if let Some(slot) = self.goals.get_mut(&task.goal_id) {
                    slot.tasks.insert(task.id.clone(), task);
                }
            }
            Entity::PurchasedItem(item) => {
                self.purchases.insert(item.id.clone(), item);
            }
        }
        Ok(())
    }

    /// Removes an entity, returning every removed key (cascades included).
    fn remove(&mut self, kind: EntityKind, id: &str) -> Option<Vec<(EntityKind, String)>> {
        match kind {
            EntityKind::UserProfile => self
                .profiles
                .remove(id)
                .map(|_| vec![(kind, id.to_string())]),
            EntityKind::Goal => {
                let slot = self.goals.remove(id)?;
                let mut removed = vec![(kind, id.to_string())];
                for task_id in slot.tasks.into_keys() {
                    self.task_owner.remove(&task_id);
                    removed.push((EntityKind::Task, task_id));
                }
                Some(removed)
            }
            EntityKind::Task => {
                let goal_id = self.task_owner.remove(id)?;
                self.goals
                    .get_mut(&goal_id)
                    .and_then(|slot| slot.tasks.remove(id))
                    .map(|_| vec![(kind, id.to_string())])
            }
            EntityKind::PurchasedItem => self
                .purchases
                .remove(id)
                .map(|_| vec![(kind, id.to_string())]),
        }
    }

    pub(crate) fn save_local(
        &mut self,
        mut entity: Entity,
        modified_at: DateTime<Utc>,
    ) -> CoreResult<Entity> {
        let kind = entity.kind();
        let id = entity.id().to_string();
        let known_tag = self
            .get(kind, &id)
            .and_then(|existing| existing.meta().server_change_tag.clone());
        let revision = self.bump_revision();

        let meta = entity.meta_mut();
        meta.needs_sync = true;
        meta.modified_at = modified_at;
        meta.local_revision = revision;
        meta.server_change_tag = known_tag;

        self.put(entity.clone())?;
        self.drop_pending_delete(kind, &id);
        Ok(entity)
    }

    pub(crate) fn delete_local(
        &mut self,
        kind: EntityKind,
        id: &str,
        deleted_at: DateTime<Utc>,
    ) -> CoreResult<Vec<PendingDelete>> {
        let removed = self
            .remove(kind, id)
            .ok_or_else(|| CoreError::not_found(kind, id))?;

        let queued: Vec<PendingDelete> = removed
            .into_iter()
            .map(|(kind, id)| PendingDelete {
                kind,
                id,
                deleted_at,
            })
            .collect();
        for pending in &queued {
            self.drop_pending_delete(pending.kind, &pending.id);
            self.pending_deletes.push(pending.clone());
        }
        Ok(queued)
    }

    pub(crate) fn mark_synced(
        &mut self,
        kind: EntityKind,
        id: &str,
        revision: u64,
        change_tag: Option<String>,
    ) -> CoreResult<bool> {
        let Some(mut entity) = self.get(kind, id) else {
            return Ok(false);
        };
        let meta = entity.meta_mut();
        meta.server_change_tag = change_tag;
        let cleared = meta.local_revision == revision;
        if cleared {
            meta.needs_sync = false;
        }
        self.put(entity)?;
        Ok(cleared)
    }

    pub(crate) fn pending_deletes(&self) -> Vec<PendingDelete> {
        self.pending_deletes.clone()
    }

    pub(crate) fn pending_delete(&self, kind: EntityKind, id: &str) -> Option<PendingDelete> {
        self.pending_deletes
            .iter()
            .find(|pending| pending.kind == kind && pending.id == id)
            .cloned()
    }

    pub(crate) fn complete_delete(&mut self, kind: EntityKind, id: &str) {
        self.drop_pending_delete(kind, id);
    }

    /// Applies a pull batch. Callers run this on a copy and discard it on error.
    pub(crate) fn apply_pull(&mut self, batch: PullBatch) -> CoreResult<PullApplied> {
        let kind = batch.kind;
        let mut applied = PullApplied::default();

        for op in batch.ops {
            match op {
                PullOp::Upsert {
                    mut entity,
                    expected_revision,
                } => {
                    if entity.kind() != kind {
                        return Err(CoreError::KindMismatch {
                            batch: kind,
                            found: entity.kind(),
                        });
                    }
                    let id = entity.id().to_string();
                    if self.revision_of(kind, &id) != expected_revision {
                        applied.skipped += 1;
                        continue;
                    }
                    let revision = self.bump_revision();
                    let meta = entity.meta_mut();
                    meta.needs_sync = false;
                    meta.local_revision = revision;

                    self.put(entity)?;
                    self.drop_pending_delete(kind, &id);
                    if kind == EntityKind::Task {
                        self.deferred_tasks.remove(&id);
                    }
                    applied.upserted += 1;
                }
                PullOp::Delete {
                    id,
                    expected_revision,
                } => {
                    self.drop_pending_delete(kind, &id);
                    let current = self.revision_of(kind, &id);
                    if current.is_none() {
                        continue;
                    }
                    if current != expected_revision {
                        applied.skipped += 1;
                        continue;
                    }
                    if let Some(removed) = self.remove(kind, &id) {
                        applied.deleted += removed.len();
                    }
                }
                PullOp::Restore {
                    id,
                    modified_at,
                    expected_revision,
                } => {
                    let Some(mut entity) = self.get(kind, &id) else {
                        continue;
                    };
                    if entity.meta().local_revision != expected_revision {
                        applied.skipped += 1;
                        continue;
                    }
                    let revision = self.bump_revision();
                    let meta = entity.meta_mut();
                    meta.needs_sync = true;
                    meta.modified_at = meta.modified_at.max(modified_at);
                    meta.local_revision = revision;
                    meta.server_change_tag = None;
                    self.put(entity)?;
                    applied.restored += 1;
                }
                PullOp::Defer(task) => {
                    if kind != EntityKind::Task {
                        return Err(CoreError::KindMismatch {
                            batch: kind,
                            found: EntityKind::Task,
                        });
                    }
                    self.deferred_tasks.insert(task.id.clone(), task);
                    applied.deferred += 1;
                }
                PullOp::Undefer { id } => {
                    self.deferred_tasks.remove(&id);
                }
            }
        }

        if let Some(token) = batch.checkpoint {
            self.checkpoints.insert(kind, token);
        }
        Ok(applied)
    }

    pub(crate) fn checkpoint(&self, kind: EntityKind) -> Option<ChangeToken> {
        self.checkpoints.get(&kind).copied()
    }

    pub(crate) fn deferred_tasks(&self) -> Vec<Task> {
        self.deferred_tasks.values().cloned().collect()
    }

    pub(crate) fn device(&self) -> &DeviceState {
        &self.device
    }

    pub(crate) fn device_mut(&mut self) -> &mut DeviceState {
        &mut self.device
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn task_moves_between_goals() {
        let mut state = StoreState::default();
        state.save_local(Goal::new("G1", "One").into(), now()).unwrap();
        state.save_local(Goal::new("G2", "Two").into(), now()).unwrap();
        state.save_local(Task::new("T1", "G1", "Read").into(), now()).unwrap();

        state.save_local(Task::new("T1", "G2", "Read").into(), now()).unwrap();

        assert!(state.tasks_for_goal("G1").is_empty());
        assert_eq!(state.tasks_for_goal("G2").len(), 1);
        assert_eq!(state.list(EntityKind::Task).len(), 1);
    }

    #[test]
    fn rebuild_index_restores_task_lookup() {
        let mut state = StoreState::default();
        state.save_local(Goal::new("G1", "One").into(), now()).unwrap();
        state.save_local(Task::new("T1", "G1", "Read").into(), now()).unwrap();

        let json = serde_json::to_string(&state).unwrap();
        let mut restored: StoreState = serde_json::from_str(&json).unwrap();
        assert!(restored.get(EntityKind::Task, "T1").is_none());
        restored.rebuild_index();
        assert!(restored.get(EntityKind::Task, "T1").is_some());
    }

    #[test]
    fn revisions_are_monotonic_across_entities() {
        let mut state = StoreState::default();
        let a = state.save_local(Goal::new("G1", "One").into(), now()).unwrap();
        let b = state.save_local(Goal::new("G2", "Two").into(), now()).unwrap();
        let c = state.save_local(Goal::new("G1", "One!").into(), now()).unwrap();
        assert!(a.meta().local_revision < b.meta().local_revision);
        assert!(b.meta().local_revision < c.meta().local_revision);
    }

    #[test]
    fn restore_redirties_and_forgets_the_server_version() {
        let mut state = StoreState::default();
        let saved = state.save_local(Goal::new("G1", "One").into(), now()).unwrap();
        let revision = saved.meta().local_revision;
        state
            .mark_synced(EntityKind::Goal, "G1", revision, Some("3".into()))
            .unwrap();

        let later = now() + chrono::Duration::hours(1);
        let mut batch = PullBatch::new(EntityKind::Goal);
        batch.push(PullOp::Restore {
            id: "G1".into(),
            modified_at: later,
            expected_revision: revision,
        });
        let applied = state.apply_pull(batch).unwrap();
        assert_eq!(applied.restored, 1);

        let goal = state.get(EntityKind::Goal, "G1").unwrap();
        assert!(goal.needs_sync());
        assert_eq!(goal.meta().server_change_tag, None);
        assert_eq!(goal.meta().modified_at, later);
        assert!(goal.meta().local_revision > revision);

        // A stale restore is skipped.
        let mut batch = PullBatch::new(EntityKind::Goal);
        batch.push(PullOp::Restore {
            id: "G1".into(),
            modified_at: later,
            expected_revision: revision,
        });
        assert_eq!(state.apply_pull(batch).unwrap().skipped, 1);
    }

    #[test]
    fn empty_identifier_rejected() {
        let mut state = StoreState::default();
        let result = state.save_local(Goal::new("", "Nameless").into(), now());
        assert!(matches!(result, Err(CoreError::EmptyIdentifier { .. })));
    }
}
