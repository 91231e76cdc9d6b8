//! Remote change subscriptions.

use goalsync_core::{EntityKind, EntityStore};
use goalsync_sync_protocol::{RemoteError, RemoteRecordClient, RemoteResult, Subscription};
use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// What a subscription setup run did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubscriptionReport {
    /// Subscriptions that already existed.
    pub existing: Vec<String>,
    /// Subscriptions created by this run.
    pub created: Vec<String>,
    /// Subscriptions that could not be verified or created.
    pub failed: Vec<(String, RemoteError)>,
}

impl SubscriptionReport {
    /// Returns true if every kind is covered.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Registers one silent change subscription per syncable kind.
pub struct SubscriptionManager<S, C> {
    store: Arc<S>,
    client: Arc<C>,
    timeout: Duration,
}

impl<S: EntityStore, C: RemoteRecordClient> SubscriptionManager<S, C> {
    /// Creates a manager.
    pub fn new(store: Arc<S>, client: Arc<C>, timeout: Duration) -> Self {
        Self {
            store,
            client,
            timeout,
        }
    }

    async fn call<T>(&self, fut: impl Future<Output = RemoteResult<T>>) -> RemoteResult<T> {
        tokio::time::timeout(self.timeout, fut)
            .await
            .unwrap_or(Err(RemoteError::Timeout))
    }

    /// Ensures every kind has its subscription. Idempotent.
    ///
    /// Subscriptions recorded locally are trusted and not re-checked.
    /// Existing remote subscriptions are left untouched. Failures are logged
    /// and reported; the next launch retries them.
    pub async fn setup_subscriptions(&self) -> SubscriptionReport {
        let mut report = SubscriptionReport::default();
        let wanted: Vec<String> = EntityKind::ALL
            .into_iter()
            .map(Subscription::well_known_id)
            .collect();

        let recorded = match self.store.device_state() {
            Ok(state) => state.subscriptions,
            Err(err) => {
                warn!(error = %err, "could not read recorded subscriptions");
                BTreeSet::new()
            }
        };
        if wanted.iter().all(|id| recorded.contains(id)) {
            debug!("subscriptions already recorded");
            report.existing = wanted;
            return report;
        }

        let remote: BTreeSet<String> =
            match self.call(self.client.fetch_subscription_ids()).await {
                Ok(ids) => ids.into_iter().collect(),
                Err(err) => {
                    warn!(error = %err, "could not list subscriptions, will retry next launch");
                    report.failed = wanted.into_iter().map(|id| (id, err.clone())).collect();
                    return report;
                }
            };

        for kind in EntityKind::ALL {
            let subscription = Subscription::for_kind(kind);
            if remote.contains(&subscription.id) {
                report.existing.push(subscription.id);
                continue;
            }
            let id = subscription.id.clone();
            match self.call(self.client.save_subscription(subscription)).await {
                Ok(()) => {
                    info!(subscription = %id, "created change subscription");
                    report.created.push(id);
                }
                Err(err) => {
                    warn!(subscription = %id, error = %err, "subscription setup failed, will retry next launch");
                    report.failed.push((id, err));
                }
            }
        }

        let confirmed: Vec<String> = report
            .existing
            .iter()
            .chain(report.created.iter())
            .cloned()
            .collect();
        if let Err(err) = self.store.record_subscriptions(&confirmed) {
            warn!(error = %err, "could not record subscriptions");
        }
        report
    }
}
