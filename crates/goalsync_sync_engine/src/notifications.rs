//! Notification permission and device token registration.
//!
//! Push delivery is an optimisation: without it the pipeline still converges
//! through resume, background fetch and manual refresh triggers. Nothing in
//! here is fatal to sync.

use crate::error::SyncResult;
use async_trait::async_trait;
use goalsync_core::EntityStore;
use goalsync_sync_protocol::{RemoteError, RemoteRecordClient};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// The host's notification permission prompt.
#[async_trait]
pub trait PermissionPrompt: Send + Sync {
    /// Asks the user and resolves once they decided.
    async fn request(&self) -> bool;
}

/// Which triggers can start a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerMode {
    /// Remote changes arrive as push notifications.
    Push,
    /// Only local, resume, background and manual triggers.
    PollOnly,
}

/// Obtains notification consent and registers this device's push token.
pub struct NotificationRegistrar<S, C> {
    store: Arc<S>,
    client: Arc<C>,
    timeout: Duration,
    mode: RwLock<TriggerMode>,
}

impl<S: EntityStore, C: RemoteRecordClient> NotificationRegistrar<S, C> {
    /// Creates a registrar in poll-only mode.
    pub fn new(store: Arc<S>, client: Arc<C>, timeout: Duration) -> Self {
        Self {
            store,
            client,
            timeout,
            mode: RwLock::new(TriggerMode::PollOnly),
        }
    }

    /// Current trigger mode.
    pub fn mode(&self) -> TriggerMode {
        *self.mode.read()
    }

    /// Asks for notification permission.
    ///
    /// Denial is not an error; it keeps the pipeline in poll-only mode.
    pub async fn request_permission(&self, prompt: &dyn PermissionPrompt) -> bool {
        let granted = prompt.request().await;
        if granted {
            info!("notification permission granted");
        } else {
            info!("notification permission denied, continuing poll-only");
            *self.mode.write() = TriggerMode::PollOnly;
        }
        granted
    }

    /// Persists the device token and associates it with the account.
    ///
    /// A remote failure leaves the token stored locally, logs and falls back
    /// to poll-only mode. Only a local store failure is returned as an error.
    pub async fn register_device_token(&self, token: &str) -> SyncResult<TriggerMode> {
        self.store.set_push_token(Some(token.to_string()))?;

        let result = tokio::time::timeout(self.timeout, self.client.register_device_token(token))
            .await
            .unwrap_or(Err(RemoteError::Timeout));

        let mode = match result {
            Ok(()) => {
                info!("device registered for push delivery");
                TriggerMode::Push
            }
            Err(err) => {
                warn!(error = %err, "device token registration failed, continuing poll-only");
                TriggerMode::PollOnly
            }
        };
        *self.mode.write() = mode;
        Ok(mode)
    }

    /// Records that the platform could not issue a push token.
    pub fn register_failure(&self, error: &str) {
        warn!(error, "push registration failed, continuing poll-only");
        *self.mode.write() = TriggerMode::PollOnly;
    }
}
