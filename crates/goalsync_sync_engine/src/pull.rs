//! Pull pass: remote changes into the local store.
//!
//! Each fetched change batch becomes one [`PullBatch`] committed together
//! with the batch's change token. If any record in the batch cannot be
//! mapped, nothing from it is written and the checkpoint stays put, so the
//! next pass fetches the same changes again.

use crate::error::{SyncError, SyncResult};
use crate::orchestrator::SyncOrchestrator;
use crate::state::{PassReport, PassScope};
use chrono::{DateTime, Utc};
use goalsync_core::{Entity, EntityKind, EntityStore, PullBatch, PullOp};
use goalsync_sync_protocol::{
    entity_id_from, from_remote_of_kind, ChangeBatch, Conflict, ConflictPhase, Mapped,
    RemoteRecordClient,
};
use tracing::debug;

impl<S, C> SyncOrchestrator<S, C>
where
    S: EntityStore + 'static,
    C: RemoteRecordClient + 'static,
{
    /// Pulls every kind in scope, in dependency order.
    ///
    /// `cap` bounds the records applied per kind, for background fetches.
    pub(crate) async fn pull_pass(
        &self,
        scope: &PassScope,
        cap: Option<u32>,
        report: &mut PassReport,
    ) -> SyncResult<()> {
        for kind in EntityKind::ALL {
            if !scope.includes(kind) {
                continue;
            }
            self.pull_kind(kind, cap, report).await?;
            if kind == EntityKind::Goal {
                self.retry_deferred(report)?;
            }
        }
        Ok(())
    }

    async fn pull_kind(
        &self,
        kind: EntityKind,
        cap: Option<u32>,
        report: &mut PassReport,
    ) -> SyncResult<()> {
        let limit = cap
            .map_or(self.config.pull_batch_size, |cap| {
                cap.min(self.config.pull_batch_size)
            })
            .max(1);
        let mut fetched = 0usize;

        loop {
            let since = self.store.checkpoint(kind)?;
            let changes = match self
                .remote(self.client.fetch_changed(kind, since, limit))
                .await
            {
                Ok(changes) => changes,
                Err(err) => return self.remote_failure(kind, kind.record_type(), err, report),
            };

            let batch = match self.plan_batch(kind, &changes, report) {
                Ok(batch) => batch,
                // Leave the checkpoint where it is.
                Err(SyncError::Mapping(err)) => {
                    self.pull_blocked(kind, err.to_string(), report);
                    return Ok(());
                }
                Err(err) => return Err(err),
            };

            let applied = self.store.apply_pull(batch)?;
            report.pulled += applied.upserted;
            report.remote_deleted += applied.deleted;
            report.deferred += applied.deferred;
            report.restored += applied.restored;
            debug!(
                %kind,
                token = %changes.next_token,
                upserted = applied.upserted,
                deleted = applied.deleted,
                deferred = applied.deferred,
                skipped = applied.skipped,
                "pull batch applied"
            );

            fetched += changes.len();
            if !changes.has_more || since == Some(changes.next_token) {
                break;
            }
            if cap.is_some_and(|cap| fetched >= cap as usize) {
                debug!(%kind, fetched, "background cap reached");
                break;
            }
        }
        self.stats.write().blocked_kinds.remove(&kind);
        Ok(())
    }

    /// Turns a change batch into store ops, resolving conflicts with pending
    /// local edits and deletes.
    fn plan_batch(
        &self,
        kind: EntityKind,
        changes: &ChangeBatch,
        report: &mut PassReport,
    ) -> SyncResult<PullBatch> {
        let parents = |goal_id: &str| self.goal_exists(goal_id);
        let mut batch = PullBatch::new(kind).with_checkpoint(changes.next_token);

        for record in &changes.records {
            let mapped = match from_remote_of_kind(record, kind, &parents) {
                Ok(mapped) => mapped,
                Err(err) => {
                    self.entity_failed(
                        kind,
                        record.id.as_str(),
                        format!("change batch rejected: {err}"),
                        report,
                    );
                    return Err(err.into());
                }
            };
            match mapped {
                Mapped::Ready(entity) => {
                    if let Some(op) = self.plan_upsert(entity, report)? {
                        batch.push(op);
                    }
                }
                Mapped::AwaitingParent(task) => {
                    debug!(id = %task.id, goal_id = %task.goal_id, "task deferred until its goal arrives");
                    batch.push(PullOp::Defer(task));
                }
            }
        }

        for tombstone in &changes.deleted {
            let id = match entity_id_from(kind, &tombstone.id) {
                Ok(id) => id,
                Err(err) => {
                    self.entity_failed(
                        kind,
                        tombstone.id.as_str(),
                        format!("change batch rejected: {err}"),
                        report,
                    );
                    return Err(err.into());
                }
            };
            self.plan_delete(&mut batch, id, tombstone.deleted_at, report)?;
        }

        Ok(batch)
    }

    /// Decides whether a pulled value overwrites local state.
    ///
    /// Returns `None` when the local side wins or already has this version.
    fn plan_upsert(&self, entity: Entity, report: &mut PassReport) -> SyncResult<Option<PullOp>> {
        let kind = entity.kind();
        let remote_modified = entity.meta().modified_at;

        let Some(local) = self.store.get(kind, entity.id())? else {
            if let Some(pending) = self.store.pending_delete(kind, entity.id())? {
                if self.local_wins(kind, entity.id(), pending.deleted_at, remote_modified, report) {
                    return Ok(None);
                }
            }
            return Ok(Some(PullOp::Upsert {
                entity,
                expected_revision: None,
            }));
        };

        let meta = local.meta();
        if meta.needs_sync {
            if self.local_wins(kind, entity.id(), meta.modified_at, remote_modified, report) {
                return Ok(None);
            }
        } else if meta.server_change_tag.is_some()
            && meta.server_change_tag == entity.meta().server_change_tag
        {
            return Ok(None);
        }

        Ok(Some(PullOp::Upsert {
            entity,
            expected_revision: Some(meta.local_revision),
        }))
    }

    fn plan_delete(
        &self,
        batch: &mut PullBatch,
        id: String,
        deleted_at: DateTime<Utc>,
        report: &mut PassReport,
    ) -> SyncResult<()> {
        let kind = batch.kind;
        let Some(local) = self.store.get(kind, &id)? else {
            if kind == EntityKind::Task
                && self.store.deferred_tasks()?.iter().any(|task| task.id == id)
            {
                batch.push(PullOp::Undefer { id: id.clone() });
            }
            // Clears any queued local delete for the same record.
            batch.push(PullOp::Delete {
                id,
                expected_revision: None,
            });
            return Ok(());
        };

        let meta = local.meta();
        let revision = meta.local_revision;
        let mut local_edit = meta.needs_sync.then_some(meta.modified_at);
        if kind == EntityKind::Goal {
            // The delete cascades, so pending task edits count as edits to the goal.
            let newest_task = self
                .store
                .tasks_for_goal(&id)?
                .into_iter()
                .filter(|task| task.meta.needs_sync)
                .map(|task| task.meta.modified_at)
                .max();
            local_edit = local_edit.max(newest_task);
        }

        if let Some(edited) = local_edit {
            if self.local_wins(kind, &id, edited, deleted_at, report) {
                debug!(%kind, id, "newer local edit outlives remote delete");
                batch.push(PullOp::Restore {
                    id,
                    modified_at: edited,
                    expected_revision: revision,
                });
                return Ok(());
            }
        }
        batch.push(PullOp::Delete {
            id,
            expected_revision: Some(revision),
        });
        Ok(())
    }

    fn local_wins(
        &self,
        kind: EntityKind,
        id: &str,
        local_modified: DateTime<Utc>,
        remote_modified: DateTime<Utc>,
        report: &mut PassReport,
    ) -> bool {
        let conflict = Conflict::resolve(
            kind,
            id,
            ConflictPhase::Pull,
            local_modified,
            remote_modified,
        );
        let local_won = conflict.local_won();
        self.record_conflict(conflict, report);
        local_won
    }

    /// Materialises deferred tasks whose goal has arrived.
    fn retry_deferred(&self, report: &mut PassReport) -> SyncResult<()> {
        let ready: Vec<_> = self
            .store
            .deferred_tasks()?
            .into_iter()
            .filter(|task| self.goal_exists(&task.goal_id))
            .collect();
        if ready.is_empty() {
            return Ok(());
        }

        let mut batch = PullBatch::new(EntityKind::Task);
        for task in ready {
            let id = task.id.clone();
            match self.plan_upsert(task.into(), report)? {
                Some(op) => batch.push(op),
                None => batch.push(PullOp::Undefer { id }),
            }
        }
        let applied = self.store.apply_pull(batch)?;
        report.pulled += applied.upserted;
        debug!(upserted = applied.upserted, "deferred tasks materialised");
        Ok(())
    }
}
