//! Host-initiated background fetch.

use crate::orchestrator::SyncOrchestrator;
use crate::state::{BackgroundFetchResult, PassOutcome, PassScope};
use goalsync_core::EntityStore;
use goalsync_sync_protocol::RemoteRecordClient;
use tracing::{debug, info, warn};

impl<S, C> SyncOrchestrator<S, C>
where
    S: EntityStore + 'static,
    C: RemoteRecordClient + 'static,
{
    /// Runs a capped pass within the background budget.
    ///
    /// Never exceeds `background_budget`: on expiry the pass is dropped at its
    /// current remote call, which leaves unpushed entities dirty and unapplied
    /// batches unacknowledged.
    pub async fn background_fetch(&self) -> BackgroundFetchResult {
        let budget = self.config.background_budget;
        let cap = self.config.background_batch_cap;

        let result = match tokio::time::timeout(
            budget,
            self.request_pass(PassScope::All, Some(cap)),
        )
        .await
        {
            Err(_) => {
                warn!(?budget, "background fetch ran out of time");
                BackgroundFetchResult::Failed
            }
            Ok(Ok(PassOutcome::Completed(report))) if report.has_new_data() => {
                BackgroundFetchResult::NewData
            }
            Ok(Ok(PassOutcome::Completed(_) | PassOutcome::Coalesced)) => {
                BackgroundFetchResult::NoData
            }
            Ok(Ok(PassOutcome::Deferred(reason))) => {
                debug!(?reason, "background fetch skipped");
                BackgroundFetchResult::Failed
            }
            Ok(Err(err)) => {
                debug!(error = %err, "background fetch failed");
                BackgroundFetchResult::Failed
            }
        };
        info!(?result, "background fetch finished");
        result
    }
}
