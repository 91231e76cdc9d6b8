//! The shared cloud: one account's records, subscriptions and devices.

use crate::client::CloudClient;
use crate::config::ServerConfig;
use crate::error::{CloudError, CloudResult};
use crate::faults::FaultInjector;
use crate::zone::RecordZone;
use goalsync_core::EntityKind;
use goalsync_sync_protocol::{MutationKind, RecordId, RemoteNotification, Subscription};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

struct Device {
    token: Option<String>,
    outbox: mpsc::Sender<Value>,
    faults: Arc<FaultInjector>,
}

/// In-memory cloud record store for one account.
///
/// Devices [`connect`](CloudServer::connect) to get a [`CloudClient`] and a
/// receiver for push payloads. A save or delete notifies every other device
/// that registered a push token, once per matching subscription.
///
/// # Example
///
/// ```
/// use goalsync_cloud::{CloudServer, ServerConfig};
///
/// let cloud = CloudServer::new(ServerConfig::default());
/// let (phone, _pushes) = cloud.connect("phone");
/// assert_eq!(phone.device_id(), "phone");
/// ```
pub struct CloudServer {
    config: ServerConfig,
    zone: RecordZone,
    subscriptions: RwLock<BTreeMap<String, Subscription>>,
    devices: RwLock<HashMap<String, Device>>,
}

impl CloudServer {
    /// Creates an empty cloud.
    pub fn new(config: ServerConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            zone: RecordZone::new(),
            subscriptions: RwLock::new(BTreeMap::new()),
            devices: RwLock::new(HashMap::new()),
        })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Returns the record zone.
    pub fn zone(&self) -> &RecordZone {
        &self.zone
    }

    /// Connects a device, replacing any earlier connection with the same id.
    pub fn connect(self: &Arc<Self>, device_id: &str) -> (CloudClient, mpsc::Receiver<Value>) {
        let (outbox, pushes) = mpsc::channel(self.config.notification_buffer);
        let faults = Arc::new(FaultInjector::new());
        self.devices.write().insert(
            device_id.to_string(),
            Device {
                token: None,
                outbox,
                faults: Arc::clone(&faults),
            },
        );
        info!(device_id, "device connected");
        (
            CloudClient::new(device_id.to_string(), Arc::clone(self), faults),
            pushes,
        )
    }

    /// Returns a connected device's fault injector.
    pub fn faults(&self, device_id: &str) -> Option<Arc<FaultInjector>> {
        self.devices
            .read()
            .get(device_id)
            .map(|device| Arc::clone(&device.faults))
    }

    /// Returns the push token registered by a device.
    pub fn device_token(&self, device_id: &str) -> Option<String> {
        self.devices
            .read()
            .get(device_id)
            .and_then(|device| device.token.clone())
    }

    /// Returns the ids of all subscriptions, sorted.
    pub fn subscription_ids(&self) -> Vec<String> {
        self.subscriptions.read().keys().cloned().collect()
    }

    pub(crate) fn save_subscription(&self, subscription: Subscription) {
        debug!(id = %subscription.id, kind = %subscription.kind, "subscription saved");
        self.subscriptions
            .write()
            .insert(subscription.id.clone(), subscription);
    }

    pub(crate) fn register_token(&self, device_id: &str, token: &str) -> CloudResult<()> {
        let mut devices = self.devices.write();
        let device = devices
            .get_mut(device_id)
            .ok_or_else(|| CloudError::UnknownDevice(device_id.to_string()))?;
        device.token = Some(token.to_string());
        info!(device_id, "push token registered");
        Ok(())
    }

    /// Notifies every other registered device of a mutation.
    ///
    /// Returns the number of payloads queued. A device whose buffer is full
    /// misses the notification and catches up on its next pass.
    pub(crate) fn fan_out(
        &self,
        origin: &str,
        kind: EntityKind,
        id: &RecordId,
        mutation: MutationKind,
    ) -> usize {
        let payloads: Vec<Value> = self
            .subscriptions
            .read()
            .values()
            .filter(|sub| sub.kind == kind && sub.fires_for(mutation))
            .map(|sub| {
                RemoteNotification::for_record(sub.id.clone(), kind, id.clone(), mutation)
                    .to_payload()
            })
            .collect();
        if payloads.is_empty() {
            return 0;
        }

        let devices = self.devices.read();
        let mut queued = 0;
        for (device_id, device) in devices.iter() {
            if device_id == origin || device.token.is_none() {
                continue;
            }
            for payload in &payloads {
                match device.outbox.try_send(payload.clone()) {
                    Ok(()) => queued += 1,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        debug!(device_id, %kind, %id, "push buffer full, notification dropped");
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {}
                }
            }
        }
        queued
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use goalsync_sync_protocol::RemoteRecordClient;

    #[tokio::test]
    async fn fan_out_skips_origin_and_unregistered_devices() {
        let cloud = CloudServer::new(ServerConfig::default());
        let (phone, mut phone_pushes) = cloud.connect("phone");
        let (tablet, mut tablet_pushes) = cloud.connect("tablet");
        let (_watch, mut watch_pushes) = cloud.connect("watch");

        phone.register_device_token("phone-token").await.unwrap();
        tablet.register_device_token("tablet-token").await.unwrap();
        cloud.save_subscription(Subscription::for_kind(EntityKind::Goal));

        let queued = cloud.fan_out("phone", EntityKind::Goal, &"G1".into(), MutationKind::Create);
        assert_eq!(queued, 1);

        let payload = tablet_pushes.try_recv().unwrap();
        let notification = RemoteNotification::parse(&payload).unwrap();
        assert_eq!(notification.kind, Some(EntityKind::Goal));
        assert_eq!(notification.mutation, Some(MutationKind::Create));
        assert!(phone_pushes.try_recv().is_err());
        assert!(watch_pushes.try_recv().is_err());
    }

    #[tokio::test]
    async fn no_subscription_no_push() {
        let cloud = CloudServer::new(ServerConfig::default());
        let (_phone, _) = cloud.connect("phone");
        let (tablet, _tablet_pushes) = cloud.connect("tablet");
        tablet.register_device_token("t").await.unwrap();

        assert_eq!(
            cloud.fan_out("phone", EntityKind::Task, &"T1".into(), MutationKind::Update),
            0
        );
    }

    #[test]
    fn full_buffer_drops() {
        let cloud = CloudServer::new(ServerConfig::default().with_notification_buffer(1));
        let (_phone, _) = cloud.connect("phone");
        let (_tablet, _tablet_pushes) = cloud.connect("tablet");
        cloud.register_token("tablet", "t").unwrap();
        cloud.save_subscription(Subscription::for_kind(EntityKind::Goal));

        assert_eq!(cloud.fan_out("phone", EntityKind::Goal, &"G1".into(), MutationKind::Create), 1);
        assert_eq!(cloud.fan_out("phone", EntityKind::Goal, &"G2".into(), MutationKind::Create), 0);
    }

    #[test]
    fn unknown_device_cannot_register() {
        let cloud = CloudServer::new(ServerConfig::default());
        assert!(matches!(
            cloud.register_token("ghost", "t"),
            Err(CloudError::UnknownDevice(_))
        ));
    }
}
