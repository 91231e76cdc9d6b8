//! The sync orchestrator.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::notifications::NotificationRegistrar;
use crate::reachability::ReachabilityMonitor;
use crate::state::{
    DeferReason, Diagnostic, PassOutcome, PassReport, PassScope, SyncEvent, SyncState, SyncStats,
};
use crate::subscriptions::{SubscriptionManager, SubscriptionReport};
use chrono::Utc;
use goalsync_core::{EntityKind, EntityStore};
use goalsync_sync_protocol::{
    Conflict, ErrorClass, RemoteError, RemoteNotification, RemoteRecordClient, RemoteResult,
};
use parking_lot::RwLock;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

const EVENT_CAPACITY: usize = 64;

/// Coordinates push and pull passes between the local store and the remote
/// record store.
///
/// At most one pass runs at a time. A pass requested while another is in
/// flight is folded into a single follow-up pass. The orchestrator is built
/// once by the host and shared through an [`Arc`]; it owns the subscription
/// manager and the notification registrar.
pub struct SyncOrchestrator<S, C> {
    pub(crate) config: SyncConfig,
    pub(crate) store: Arc<S>,
    pub(crate) client: Arc<C>,
    pub(crate) reachability: ReachabilityMonitor,
    subscriptions: SubscriptionManager<S, C>,
    registrar: NotificationRegistrar<S, C>,
    state: RwLock<SyncState>,
    pub(crate) stats: RwLock<SyncStats>,
    events: broadcast::Sender<SyncEvent>,
    in_progress: AtomicBool,
    follow_up: AtomicBool,
    auth_paused: AtomicBool,
}

/// Releases the pass flag when a pass ends, including when its future is
/// dropped by a timeout.
struct PassGuard<'a> {
    in_progress: &'a AtomicBool,
    state: &'a RwLock<SyncState>,
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        {
            let mut state = self.state.write();
            if state.is_active() {
                *state = SyncState::Idle;
            }
        }
        self.in_progress.store(false, Ordering::SeqCst);
    }
}

impl<S, C> SyncOrchestrator<S, C>
where
    S: EntityStore + 'static,
    C: RemoteRecordClient + 'static,
{
    /// Creates an orchestrator.
    pub fn new(
        config: SyncConfig,
        store: Arc<S>,
        client: Arc<C>,
        reachability: ReachabilityMonitor,
    ) -> Self {
        let subscriptions = SubscriptionManager::new(
            Arc::clone(&store),
            Arc::clone(&client),
            config.operation_timeout,
        );
        let registrar = NotificationRegistrar::new(
            Arc::clone(&store),
            Arc::clone(&client),
            config.operation_timeout,
        );
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let state = if reachability.is_online() {
            SyncState::Idle
        } else {
            SyncState::Paused
        };

        Self {
            config,
            store,
            client,
            reachability,
            subscriptions,
            registrar,
            state: RwLock::new(state),
            stats: RwLock::new(SyncStats::default()),
            events,
            in_progress: AtomicBool::new(false),
            follow_up: AtomicBool::new(false),
            auth_paused: AtomicBool::new(false),
        }
    }

    /// The configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// The local store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// The reachability monitor.
    pub fn reachability(&self) -> &ReachabilityMonitor {
        &self.reachability
    }

    /// The notification registrar.
    pub fn registrar(&self) -> &NotificationRegistrar<S, C> {
        &self.registrar
    }

    /// Gets the current state.
    pub fn state(&self) -> SyncState {
        *self.state.read()
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Subscribes to pipeline events.
    pub fn subscribe_events(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Returns true if a follow-up pass is owed.
    pub fn has_pending_pass(&self) -> bool {
        self.follow_up.load(Ordering::SeqCst)
    }

    /// Registers the change subscriptions.
    pub async fn setup_subscriptions(&self) -> SubscriptionReport {
        self.subscriptions.setup_subscriptions().await
    }

    /// Runs a full pass: push every dirty entity, then pull every kind.
    pub async fn sync(&self) -> SyncResult<PassOutcome> {
        self.request_pass(PassScope::All, None).await
    }

    /// Runs a pass pulling only `scope`.
    pub async fn sync_scoped(&self, scope: PassScope) -> SyncResult<PassOutcome> {
        self.request_pass(scope, None).await
    }

    /// Handles a push notification payload.
    ///
    /// A payload naming a kind pulls that kind; anything else pulls all kinds.
    pub async fn notification_received(
        &self,
        payload: &serde_json::Value,
    ) -> SyncResult<PassOutcome> {
        let notification = RemoteNotification::parse(payload);
        debug!(?notification, "remote change notification");
        self.request_pass(PassScope::for_notification(notification.as_ref()), None)
            .await
    }

    /// Applies a connectivity change.
    ///
    /// Going offline pauses the pipeline. Coming back online resumes it and
    /// runs a full pass so that anything deferred while offline goes out.
    pub async fn reachability_changed(&self, online: bool) -> SyncResult<PassOutcome> {
        self.reachability.set_online(online);
        if !online {
            self.enter_paused();
            return Ok(PassOutcome::Deferred(DeferReason::Offline));
        }

        let resumed = {
            let mut state = self.state.write();
            let paused = *state == SyncState::Paused;
            if paused {
                *state = SyncState::Idle;
            }
            paused
        };
        if resumed {
            info!("back online, resuming sync");
            self.emit(SyncEvent::Resumed);
        }
        self.request_pass(PassScope::All, None).await
    }

    /// Lifts the authentication pause without running a pass.
    pub fn resume_after_reauthentication(&self) {
        if self.auth_paused.swap(false, Ordering::SeqCst) {
            {
                let mut state = self.state.write();
                *state = if self.reachability.is_online() {
                    SyncState::Idle
                } else {
                    SyncState::Paused
                };
            }
            info!("re-authenticated, resuming sync");
            self.emit(SyncEvent::Resumed);
        }
    }

    /// Lifts the authentication pause and runs a full pass.
    pub async fn reauthenticated(&self) -> SyncResult<PassOutcome> {
        self.resume_after_reauthentication();
        self.request_pass(PassScope::All, None).await
    }

    fn blocked(&self) -> Option<DeferReason> {
        if self.auth_paused.load(Ordering::SeqCst) {
            Some(DeferReason::AuthenticationRequired)
        } else if !self.reachability.is_online() {
            Some(DeferReason::Offline)
        } else {
            None
        }
    }

    fn enter_paused(&self) {
        let paused = {
            let mut state = self.state.write();
            let pause = matches!(*state, SyncState::Idle);
            if pause {
                *state = SyncState::Paused;
            }
            pause
        };
        if paused {
            info!("offline, sync paused");
            self.emit(SyncEvent::Paused);
        }
    }

    fn pause_for_auth(&self, reason: &str) {
        if !self.auth_paused.swap(true, Ordering::SeqCst) {
            error!(reason, "authentication revoked, sync paused until sign-in");
            self.emit(SyncEvent::AuthenticationRequired);
        }
        *self.state.write() = SyncState::AuthRequired;
    }

    /// Runs a pass unless one is in flight, then keeps running follow-up
    /// passes while triggers arrived during the previous one.
    pub(crate) async fn request_pass(
        &self,
        scope: PassScope,
        cap: Option<u32>,
    ) -> SyncResult<PassOutcome> {
        if let Some(reason) = self.blocked() {
            self.follow_up.store(true, Ordering::SeqCst);
            if reason == DeferReason::Offline {
                self.enter_paused();
            }
            debug!(?reason, "pass deferred");
            return Ok(PassOutcome::Deferred(reason));
        }

        if self
            .in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            self.follow_up.store(true, Ordering::SeqCst);
            self.stats.write().coalesced += 1;
            debug!("pass in flight, trigger coalesced");
            return Ok(PassOutcome::Coalesced);
        }

        let mut scope = scope;
        loop {
            let guard = PassGuard {
                in_progress: &self.in_progress,
                state: &self.state,
            };
            let report = loop {
                self.follow_up.store(false, Ordering::SeqCst);
                let report = match self.run_pass(&scope, cap).await {
                    Ok(report) => report,
                    Err(err) => return Err(self.pass_failed(err)),
                };
                if !self.follow_up.load(Ordering::SeqCst) || self.blocked().is_some() {
                    break report;
                }
                debug!("running follow-up pass");
                scope = PassScope::All;
            };
            drop(guard);

            // A trigger may have landed between the last check and the release.
            if !self.follow_up.load(Ordering::SeqCst)
                || self.blocked().is_some()
                || self
                    .in_progress
                    .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                    .is_err()
            {
                return Ok(PassOutcome::Completed(report));
            }
            scope = PassScope::All;
        }
    }

    fn pass_failed(&self, err: SyncError) -> SyncError {
        match &err {
            SyncError::AuthenticationRequired(reason) => self.pause_for_auth(reason),
            err if err.is_retryable() => {
                self.stats.write().transient_failures += 1;
                info!(error = %err, "pass interrupted, will retry on next trigger");
            }
            err => error!(error = %err, "pass failed"),
        }
        err
    }

    async fn run_pass(&self, scope: &PassScope, cap: Option<u32>) -> SyncResult<PassReport> {
        let started = Instant::now();
        let pass = self.stats.read().passes + 1;
        let mut report = PassReport {
            pass,
            ..PassReport::default()
        };
        self.emit(SyncEvent::PassStarted { pass });
        debug!(pass, ?scope, ?cap, "pass started");

        self.set_state(SyncState::Pushing);
        self.push_pass(&mut report).await?;

        // Tasks held back on a vanished goal are settled by pulling goal and
        // task deletes, whatever the trigger asked for.
        let widened;
        let scope = if report.missing_goals.is_empty() {
            scope
        } else {
            debug!(goals = ?report.missing_goals, "goals deleted remotely");
            widened = scope.clone().merge(PassScope::kind(EntityKind::Task));
            &widened
        };

        self.set_state(SyncState::Pulling);
        self.pull_pass(scope, cap, &mut report).await?;
        if report.restored > 0 {
            // Restored entities go back up in the next pass.
            self.follow_up.store(true, Ordering::SeqCst);
        }

        self.set_state(SyncState::Idle);
        report.duration = started.elapsed();
        self.stats.write().record_pass(&report);
        info!(
            pass,
            pushed = report.pushed,
            pulled = report.pulled,
            deleted = report.pushed_deletes + report.remote_deleted,
            failed = report.failed,
            "pass completed"
        );
        self.emit(SyncEvent::PassCompleted {
            pass,
            pushed: report.pushed,
            pulled: report.pulled,
            deleted: report.pushed_deletes + report.remote_deleted,
        });
        Ok(report)
    }

    fn set_state(&self, state: SyncState) {
        *self.state.write() = state;
    }

    pub(crate) fn emit(&self, event: SyncEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Runs a remote call under the per-operation timeout.
    pub(crate) async fn remote<T>(
        &self,
        call: impl Future<Output = RemoteResult<T>>,
    ) -> RemoteResult<T> {
        tokio::time::timeout(self.config.operation_timeout, call)
            .await
            .unwrap_or(Err(RemoteError::Timeout))
    }

    /// Routes a failed remote call.
    ///
    /// Transient and auth failures abort the pass. Anything else is recorded
    /// against the entity and the pass moves on.
    pub(crate) fn remote_failure(
        &self,
        kind: EntityKind,
        id: &str,
        err: RemoteError,
        report: &mut PassReport,
    ) -> SyncResult<()> {
        match err.class() {
            ErrorClass::Transient => Err(SyncError::Remote(err)),
            ErrorClass::PermanentAuth => Err(SyncError::AuthenticationRequired(err.to_string())),
            ErrorClass::Conflict | ErrorClass::NotFound | ErrorClass::PermanentEntity => {
                self.entity_failed(kind, id, err.to_string(), report);
                Ok(())
            }
        }
    }

    pub(crate) fn entity_failed(
        &self,
        kind: EntityKind,
        id: &str,
        message: String,
        report: &mut PassReport,
    ) {
        warn!(%kind, id, error = %message, "entity skipped");
        report.failed += 1;
        self.stats.write().record_diagnostic(Diagnostic {
            kind,
            id: id.to_string(),
            message: message.clone(),
            at: Utc::now(),
        });
        self.emit(SyncEvent::EntityFailed {
            kind,
            id: id.to_string(),
            error: message,
        });
    }

    pub(crate) fn pull_blocked(&self, kind: EntityKind, error: String, report: &mut PassReport) {
        warn!(%kind, %error, "pull stopped at an unreadable record");
        report.blocked.insert(kind);
        self.stats.write().blocked_kinds.insert(kind);
        self.emit(SyncEvent::PullBlocked { kind, error });
    }

    pub(crate) fn record_conflict(&self, conflict: Conflict, report: &mut PassReport) {
        debug!(
            kind = %conflict.kind,
            id = %conflict.id,
            phase = ?conflict.phase,
            winner = %conflict.resolution,
            "conflict resolved"
        );
        self.stats.write().record_conflict(&conflict);
        report.conflicts.push(conflict);
    }

    pub(crate) fn goal_exists(&self, goal_id: &str) -> bool {
        matches!(self.store.get(EntityKind::Goal, goal_id), Ok(Some(_)))
    }
}
