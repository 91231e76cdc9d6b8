//! The trigger pipeline: a long-running task that turns app lifecycle,
//! notification and reachability events into passes.

use crate::error::{SyncError, SyncResult};
use crate::orchestrator::SyncOrchestrator;
use crate::reachability::ReachabilityMonitor;
use crate::state::{BackgroundFetchResult, PassOutcome, PassScope};
use goalsync_core::EntityStore;
use goalsync_sync_protocol::{RemoteNotification, RemoteRecordClient};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Something that asks for a pass.
#[derive(Debug)]
pub enum Trigger {
    /// An entity was edited locally.
    LocalMutation,
    /// A push notification arrived, foreground or background.
    Notification(serde_json::Value),
    /// The app came back to the foreground.
    AppResumed,
    /// The user asked to refresh.
    ManualRefresh,
    /// The user signed in again.
    Reauthenticated,
    /// The host woke the app for a background fetch.
    BackgroundFetch(oneshot::Sender<BackgroundFetchResult>),
}

impl Trigger {
    /// Kinds the trigger asks to pull; `None` for background fetches.
    fn scope(&self) -> Option<PassScope> {
        match self {
            Trigger::LocalMutation => Some(PassScope::push_only()),
            Trigger::Notification(payload) => Some(PassScope::for_notification(
                RemoteNotification::parse(payload).as_ref(),
            )),
            Trigger::AppResumed | Trigger::ManualRefresh | Trigger::Reauthenticated => {
                Some(PassScope::All)
            }
            Trigger::BackgroundFetch(_) => None,
        }
    }
}

/// Scope of triggers that found the queue full, picked up by the run loop.
#[derive(Debug, Default)]
struct Overflow {
    scope: Mutex<Option<PassScope>>,
    wake: Notify,
}

impl Overflow {
    fn merge(&self, scope: PassScope) {
        {
            let mut pending = self.scope.lock();
            *pending = Some(match pending.take() {
                Some(current) => current.merge(scope),
                None => scope,
            });
        }
        self.wake.notify_one();
    }

    fn take(&self) -> Option<PassScope> {
        self.scope.lock().take()
    }
}

/// Cloneable handle the host uses to feed the pipeline.
#[derive(Debug, Clone)]
pub struct SyncHandle {
    triggers: mpsc::Sender<Trigger>,
    overflow: Arc<Overflow>,
    reachability: ReachabilityMonitor,
    cancel: CancellationToken,
}

impl SyncHandle {
    fn send(&self, trigger: Trigger) -> SyncResult<()> {
        match self.triggers.try_send(trigger) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(trigger)) => {
                debug!(?trigger, "trigger queue full, merging into the pending pass");
                if let Some(scope) = trigger.scope() {
                    self.overflow.merge(scope);
                }
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(SyncError::ChannelClosed),
        }
    }

    /// Reports a local edit.
    pub fn local_mutation(&self) -> SyncResult<()> {
        self.send(Trigger::LocalMutation)
    }

    /// Hands over a push notification payload.
    pub fn notification_received(&self, payload: serde_json::Value) -> SyncResult<()> {
        self.send(Trigger::Notification(payload))
    }

    /// Reports that the app returned to the foreground.
    pub fn app_resumed(&self) -> SyncResult<()> {
        self.send(Trigger::AppResumed)
    }

    /// Requests a refresh.
    pub fn manual_refresh(&self) -> SyncResult<()> {
        self.send(Trigger::ManualRefresh)
    }

    /// Reports a connectivity change.
    pub fn reachability_changed(&self, online: bool) {
        self.reachability.set_online(online);
    }

    /// Reports a successful sign-in after credentials were revoked.
    pub async fn reauthenticated(&self) -> SyncResult<()> {
        self.triggers
            .send(Trigger::Reauthenticated)
            .await
            .map_err(|_| SyncError::ChannelClosed)
    }

    /// Runs a background fetch and waits for its result.
    pub async fn background_fetch(&self) -> BackgroundFetchResult {
        let (reply, result) = oneshot::channel();
        if self
            .triggers
            .send(Trigger::BackgroundFetch(reply))
            .await
            .is_err()
        {
            return BackgroundFetchResult::Failed;
        }
        result.await.unwrap_or(BackgroundFetchResult::Failed)
    }

    /// Stops the pipeline after the current pass.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Returns true once shutdown was requested.
    pub fn is_shut_down(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Triggers drained from the queue in one go.
#[derive(Default)]
struct Work {
    scope: Option<PassScope>,
    reauthenticate: bool,
    background: Vec<oneshot::Sender<BackgroundFetchResult>>,
}

impl Work {
    fn add(&mut self, trigger: Trigger) {
        if let Some(scope) = trigger.scope() {
            self.merge(scope);
        }
        match trigger {
            Trigger::Reauthenticated => self.reauthenticate = true,
            Trigger::BackgroundFetch(reply) => self.background.push(reply),
            _ => {}
        }
    }

    fn merge(&mut self, scope: PassScope) {
        self.scope = Some(match self.scope.take() {
            Some(current) => current.merge(scope),
            None => scope,
        });
    }

    /// Everything waiting: queued triggers plus overflowed scopes.
    fn drain(triggers: &mut mpsc::Receiver<Trigger>, overflow: &Overflow) -> Self {
        let mut work = Work::default();
        while let Ok(next) = triggers.try_recv() {
            work.add(next);
        }
        if let Some(scope) = overflow.take() {
            work.merge(scope);
        }
        work
    }
}

impl<S, C> SyncOrchestrator<S, C>
where
    S: EntityStore + 'static,
    C: RemoteRecordClient + 'static,
{
    /// Spawns the pipeline on the current runtime.
    pub fn spawn(self: Arc<Self>) -> (SyncHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(self.config.trigger_queue_depth);
        let overflow = Arc::new(Overflow::default());
        let cancel = CancellationToken::new();
        let handle = SyncHandle {
            triggers: tx,
            overflow: Arc::clone(&overflow),
            reachability: self.reachability.clone(),
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(self.run(rx, overflow, cancel));
        (handle, task)
    }

    /// Runs the pipeline until cancelled or every handle is dropped.
    ///
    /// Sets up subscriptions and runs a full pass first. Triggers queued
    /// while a pass runs are drained and merged into one pass, together with
    /// any that overflowed the queue.
    async fn run(
        self: Arc<Self>,
        mut triggers: mpsc::Receiver<Trigger>,
        overflow: Arc<Overflow>,
        cancel: CancellationToken,
    ) {
        let mut online = self.reachability.subscribe();
        info!("sync pipeline started");

        let subscriptions = self.setup_subscriptions().await;
        if !subscriptions.is_complete() {
            warn!(failed = subscriptions.failed.len(), "running without some change subscriptions");
        }
        log_outcome(self.sync().await);

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                changed = online.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let now = *online.borrow_and_update();
                    log_outcome(self.reachability_changed(now).await);
                }
                trigger = triggers.recv() => {
                    let Some(trigger) = trigger else { break };
                    let mut work = Work::drain(&mut triggers, &overflow);
                    work.add(trigger);
                    self.process(work).await;
                }
                () = overflow.wake.notified() => {
                    let work = Work::drain(&mut triggers, &overflow);
                    self.process(work).await;
                }
            }
        }
        info!("sync pipeline stopped");
    }

    async fn process(&self, work: Work) {
        if work.reauthenticate {
            self.resume_after_reauthentication();
        }
        if !work.background.is_empty() {
            let result = self.background_fetch().await;
            for reply in work.background {
                let _ = reply.send(result);
            }
        }
        if let Some(scope) = work.scope {
            log_outcome(self.sync_scoped(scope).await);
        }
    }
}

fn log_outcome(outcome: SyncResult<PassOutcome>) {
    match outcome {
        Ok(PassOutcome::Completed(report)) => debug!(pass = report.pass, "triggered pass done"),
        Ok(outcome) => debug!(?outcome, "triggered pass not run"),
        Err(err) if err.is_retryable() => debug!(error = %err, "triggered pass interrupted"),
        Err(err) => warn!(error = %err, "triggered pass failed"),
    }
}
