//! Devices wired to a shared reference cloud.

#![allow(dead_code)]

use chrono::{DateTime, Utc};
use goalsync_cloud::{CloudClient, CloudServer, FaultInjector, ServerConfig};
use goalsync_core::{Entity, EntityKind, EntityStore, LocalStore};
use goalsync_sync_engine::{
    ConflictRetry, PassOutcome, PassReport, ReachabilityMonitor, SyncConfig, SyncOrchestrator,
    SyncResult,
};
use goalsync_sync_protocol::{to_remote, RemoteRecord};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

pub const ACCOUNT: &str = "_acct42";

pub type Engine = SyncOrchestrator<LocalStore, CloudClient>;

pub struct Device {
    pub sync: Arc<Engine>,
    pub client: Arc<CloudClient>,
    pub pushes: mpsc::Receiver<Value>,
}

impl Device {
    pub fn store(&self) -> &LocalStore {
        self.sync.store()
    }

    pub fn faults(&self) -> &FaultInjector {
        self.client.faults()
    }

    pub fn get(&self, kind: EntityKind, id: &str) -> Entity {
        match self.store().get(kind, id) {
            Ok(Some(entity)) => entity,
            other => panic!("{kind} {id} not in store: {other:?}"),
        }
    }

    pub fn has(&self, kind: EntityKind, id: &str) -> bool {
        matches!(self.store().get(kind, id), Ok(Some(_)))
    }
}

pub fn cloud() -> Arc<CloudServer> {
    CloudServer::new(ServerConfig::default())
}

pub fn config() -> SyncConfig {
    SyncConfig::new(ACCOUNT)
        .with_retry(ConflictRetry::immediate(3))
        .with_operation_timeout(Duration::from_secs(5))
}

pub fn device(cloud: &Arc<CloudServer>, name: &str) -> Device {
    device_with(cloud, name, config())
}

pub fn device_with(cloud: &Arc<CloudServer>, name: &str, config: SyncConfig) -> Device {
    let (client, pushes) = cloud.connect(name);
    let client = Arc::new(client);
    let sync = Arc::new(SyncOrchestrator::new(
        config,
        Arc::new(LocalStore::open_in_memory()),
        Arc::clone(&client),
        ReachabilityMonitor::new(true),
    ));
    Device {
        sync,
        client,
        pushes,
    }
}

/// Unwraps a completed pass.
pub fn completed(outcome: SyncResult<PassOutcome>) -> PassReport {
    match outcome {
        Ok(PassOutcome::Completed(report)) => report,
        other => panic!("expected a completed pass, got {other:?}"),
    }
}

/// Writes an entity straight into the cloud, as another device would have.
pub fn put_remote(cloud: &CloudServer, entity: Entity, modified_at: DateTime<Utc>) -> RemoteRecord {
    let mut entity = entity;
    entity.meta_mut().modified_at = modified_at;
    match cloud.zone().save(to_remote(&entity), Utc::now()) {
        Ok(record) => record,
        Err(err) => panic!("remote save of {} failed: {err}", entity.id()),
    }
}
