//! A device's connection to the cloud.

use crate::faults::FaultInjector;
use crate::server::CloudServer;
use async_trait::async_trait;
use chrono::Utc;
use goalsync_core::{ChangeToken, EntityKind};
use goalsync_sync_protocol::{
    ChangeBatch, MutationKind, RecordId, RemoteRecord, RemoteRecordClient, RemoteResult,
    Subscription,
};
use std::sync::Arc;
use tracing::debug;

/// [`RemoteRecordClient`] for one device connected to a [`CloudServer`].
#[derive(Clone)]
pub struct CloudClient {
    device_id: String,
    server: Arc<CloudServer>,
    faults: Arc<FaultInjector>,
}

impl CloudClient {
    pub(crate) fn new(
        device_id: String,
        server: Arc<CloudServer>,
        faults: Arc<FaultInjector>,
    ) -> Self {
        Self {
            device_id,
            server,
            faults,
        }
    }

    /// Returns the device id.
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Returns the faults injected into this device's calls.
    pub fn faults(&self) -> &FaultInjector {
        &self.faults
    }

    /// Returns the cloud this client talks to.
    pub fn server(&self) -> &Arc<CloudServer> {
        &self.server
    }
}

impl std::fmt::Debug for CloudClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudClient")
            .field("device_id", &self.device_id)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl RemoteRecordClient for CloudClient {
    async fn fetch(&self, kind: EntityKind, id: &RecordId) -> RemoteResult<RemoteRecord> {
        self.faults.enter("fetch").await?;
        Ok(self.server.zone().fetch(kind, id)?)
    }

    async fn fetch_changed(
        &self,
        kind: EntityKind,
        since: Option<ChangeToken>,
        limit: u32,
    ) -> RemoteResult<ChangeBatch> {
        self.faults.enter("fetch_changed").await?;
        let limit = limit.min(self.server.config().max_fetch_batch);
        let batch = self.server.zone().changes_since(kind, since, limit);
        debug!(device_id = %self.device_id, %kind, changes = batch.len(), "changes served");
        Ok(batch)
    }

    async fn save(&self, record: RemoteRecord) -> RemoteResult<RemoteRecord> {
        self.faults.enter("save").await?;
        self.faults.check_record(record.id.as_str())?;

        let zone = self.server.zone();
        let mutation = match zone.fetch(record.kind, &record.id) {
            Ok(_) => MutationKind::Update,
            Err(_) => MutationKind::Create,
        };
        let saved = zone.save(record, Utc::now())?;
        self.server
            .fan_out(&self.device_id, saved.kind, &saved.id, mutation);
        Ok(saved)
    }

    async fn delete(&self, kind: EntityKind, id: &RecordId) -> RemoteResult<()> {
        self.faults.enter("delete").await?;
        self.server.zone().delete(kind, id, Utc::now())?;
        self.server
            .fan_out(&self.device_id, kind, id, MutationKind::Delete);
        Ok(())
    }

    async fn fetch_subscription_ids(&self) -> RemoteResult<Vec<String>> {
        self.faults.enter("fetch_subscription_ids").await?;
        Ok(self.server.subscription_ids())
    }

    async fn save_subscription(&self, subscription: Subscription) -> RemoteResult<()> {
        self.faults.enter("save_subscription").await?;
        self.server.save_subscription(subscription);
        Ok(())
    }

    async fn register_device_token(&self, token: &str) -> RemoteResult<()> {
        self.faults.enter("register_device_token").await?;
        Ok(self.server.register_token(&self.device_id, token)?)
    }
}
