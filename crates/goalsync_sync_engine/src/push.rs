//! Push pass: local edits to the remote store.

use crate::error::{SyncError, SyncResult};
use crate::orchestrator::SyncOrchestrator;
use crate::state::PassReport;
use goalsync_core::{Entity, EntityKind, EntityStore, PullBatch, PullOp, SyncAck};
use goalsync_sync_protocol::{
    from_remote, record_id_for, to_remote, Conflict, ConflictPhase, ConflictResolution, ErrorClass,
    Mapped, RemoteError, RemoteRecord, RemoteRecordClient,
};
use std::collections::HashMap;
use tracing::debug;

impl<S, C> SyncOrchestrator<S, C>
where
    S: EntityStore + 'static,
    C: RemoteRecordClient + 'static,
{
    /// Saves every dirty entity, then propagates queued deletes.
    ///
    /// Kinds go in dependency order. A task waits until its goal has been
    /// saved remotely and is still there; a goal deleted remotely is left to
    /// the pull, which decides between the delete and the task's edit.
    ///
    /// Confirmed saves are recorded once per kind, before the next kind
    /// looks for saved parents.
    pub(crate) async fn push_pass(&self, report: &mut PassReport) -> SyncResult<()> {
        let mut goals_present = HashMap::new();
        for kind in EntityKind::ALL {
            let mut acks = Vec::new();
            let pushed = self
                .push_kind(kind, &mut goals_present, &mut acks, report)
                .await;
            let saved = acks.len();
            let cleared = self.store.mark_synced_all(acks)?;
            if cleared < saved {
                debug!(%kind, edited = saved - cleared, "edited during save, stays dirty");
            }
            pushed?;
        }
        self.push_deletes(report).await
    }

    async fn push_kind(
        &self,
        kind: EntityKind,
        goals_present: &mut HashMap<String, bool>,
        acks: &mut Vec<SyncAck>,
        report: &mut PassReport,
    ) -> SyncResult<()> {
        for entity in self.store.query_dirty(kind)? {
            if let Some(goal_id) = entity.parent_goal_id() {
                if !self.goal_saved_remotely(goal_id)? {
                    debug!(id = entity.id(), goal_id, "task held back until its goal is saved");
                    report.held_back += 1;
                    continue;
                }
                let present = match goals_present.get(goal_id) {
                    Some(present) => *present,
                    None => {
                        let present = self.goal_present_remotely(goal_id).await?;
                        goals_present.insert(goal_id.to_string(), present);
                        present
                    }
                };
                if !present {
                    debug!(id = entity.id(), goal_id, "task held back, goal deleted remotely");
                    report.held_back += 1;
                    report.missing_goals.insert(goal_id.to_string());
                    continue;
                }
            }
            self.push_entity(entity, acks, report).await?;
        }
        Ok(())
    }

    fn goal_saved_remotely(&self, goal_id: &str) -> SyncResult<bool> {
        Ok(self
            .store
            .get(EntityKind::Goal, goal_id)?
            .is_some_and(|goal| goal.meta().server_change_tag.is_some()))
    }

    async fn goal_present_remotely(&self, goal_id: &str) -> SyncResult<bool> {
        let record_id = record_id_for(EntityKind::Goal, goal_id);
        match self
            .remote(self.client.fetch(EntityKind::Goal, &record_id))
            .await
        {
            Ok(_) => Ok(true),
            Err(err) => match err.class() {
                ErrorClass::NotFound => Ok(false),
                ErrorClass::Transient => Err(SyncError::Remote(err)),
                ErrorClass::PermanentAuth => Err(SyncError::AuthenticationRequired(err.to_string())),
                // The task's own save reports anything else.
                ErrorClass::Conflict | ErrorClass::PermanentEntity => Ok(true),
            },
        }
    }

    async fn push_entity(
        &self,
        entity: Entity,
        acks: &mut Vec<SyncAck>,
        report: &mut PassReport,
    ) -> SyncResult<()> {
        let kind = entity.kind();
        let id = entity.id().to_string();
        let revision = entity.meta().local_revision;
        let local = to_remote(&entity);
        let mut record = local.clone();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let err = match self.remote(self.client.save(record)).await {
                Ok(saved) => {
                    acks.push(SyncAck {
                        kind,
                        id,
                        revision,
                        change_tag: saved.change_tag,
                    });
                    report.pushed += 1;
                    return Ok(());
                }
                Err(err) => err,
            };

            let server_record = match err {
                RemoteError::Conflict { server_record } => server_record,
                err => return self.remote_failure(kind, &id, err, report),
            };

            let conflict = Conflict::resolve(
                kind,
                &id,
                ConflictPhase::Push,
                entity.meta().modified_at,
                server_record.modification_time(),
            );
            let resolution = conflict.resolution;
            self.record_conflict(conflict, report);

            match resolution {
                ConflictResolution::AcceptRemote => {
                    return self.adopt_remote(&server_record, revision, report);
                }
                ConflictResolution::KeepLocal => {
                    if attempt >= self.config.retry.max_attempts {
                        self.entity_failed(
                            kind,
                            &id,
                            format!("save still conflicting after {attempt} attempts"),
                            report,
                        );
                        return Ok(());
                    }
                    tokio::time::sleep(self.config.retry.delay_after(attempt)).await;
                    // Merge onto the server's copy so fields this client does not
                    // know survive, and save against its change tag.
                    let mut merged = *server_record;
                    merged.overlay(&local);
                    record = merged;
                }
            }
        }
    }

    /// Replaces a pending local edit with the remote value.
    fn adopt_remote(
        &self,
        record: &RemoteRecord,
        revision: u64,
        report: &mut PassReport,
    ) -> SyncResult<()> {
        let kind = record.kind;
        let mapped = match from_remote(record, &|goal_id: &str| self.goal_exists(goal_id)) {
            Ok(mapped) => mapped,
            Err(err) => {
                self.entity_failed(kind, record.id.as_str(), err.to_string(), report);
                return Ok(());
            }
        };

        let mut batch = PullBatch::new(kind);
        batch.push(match mapped {
            Mapped::Ready(entity) => PullOp::Upsert {
                entity,
                expected_revision: Some(revision),
            },
            Mapped::AwaitingParent(task) => PullOp::Defer(task),
        });
        let applied = self.store.apply_pull(batch)?;
        report.pulled += applied.upserted;
        report.deferred += applied.deferred;
        if applied.skipped > 0 {
            debug!(%kind, id = %record.id, "edited while resolving, stays dirty");
        }
        Ok(())
    }

    async fn push_deletes(&self, report: &mut PassReport) -> SyncResult<()> {
        for pending in self.store.pending_deletes()? {
            let record_id = record_id_for(pending.kind, &pending.id);
            match self.remote(self.client.delete(pending.kind, &record_id)).await {
                Ok(()) | Err(RemoteError::NotFound { .. }) => {
                    self.store.complete_delete(pending.kind, &pending.id)?;
                    report.pushed_deletes += 1;
                }
                Err(err) => self.remote_failure(pending.kind, &pending.id, err, report)?,
            }
        }
        Ok(())
    }
}
