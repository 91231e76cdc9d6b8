//! Remote record client abstraction.

use crate::change::ChangeBatch;
use crate::record::{RecordId, RemoteRecord};
use crate::subscription::Subscription;
use async_trait::async_trait;
use goalsync_core::{ChangeToken, EntityKind};
use thiserror::Error;

/// Result type for remote operations.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// How the orchestrator should react to a [`RemoteError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Retry on the next trigger.
    Transient,
    /// Resolve with the conflict policy.
    Conflict,
    /// The record does not exist.
    NotFound,
    /// Skip this entity, keep going.
    PermanentEntity,
    /// Stop everything until the user signs in again.
    PermanentAuth,
}

/// Errors returned by a remote record store.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RemoteError {
    /// Network unreachable or connection dropped.
    #[error("network error: {0}")]
    Network(String),

    /// The call did not complete in time.
    #[error("remote operation timed out")]
    Timeout,

    /// The record does not exist.
    #[error("{kind} record not found: {id}")]
    NotFound {
        /// Kind requested.
        kind: EntityKind,
        /// Record name requested.
        id: RecordId,
    },

    /// The remote copy changed since the change tag the save was based on.
    #[error("record changed on the server")]
    Conflict {
        /// The record as currently stored.
        server_record: Box<RemoteRecord>,
    },

    /// Server-side validation rejected the record.
    #[error("record rejected: {reason}")]
    Rejected {
        /// Reason given by the server.
        reason: String,
    },

    /// The account ran out of storage.
    #[error("quota exceeded")]
    QuotaExceeded,

    /// Credentials are no longer valid.
    #[error("authentication revoked: {0}")]
    AuthRevoked(String),
}

impl RemoteError {
    /// Classifies the error.
    pub fn class(&self) -> ErrorClass {
        match self {
            RemoteError::Network(_) | RemoteError::Timeout => ErrorClass::Transient,
            RemoteError::Conflict { .. } => ErrorClass::Conflict,
            RemoteError::NotFound { .. } => ErrorClass::NotFound,
            RemoteError::Rejected { .. } | RemoteError::QuotaExceeded => {
                ErrorClass::PermanentEntity
            }
            RemoteError::AuthRevoked(_) => ErrorClass::PermanentAuth,
        }
    }

    /// Returns true if the operation may succeed when retried later.
    pub fn is_transient(&self) -> bool {
        self.class() == ErrorClass::Transient
    }
}

/// A remote record store scoped to one signed-in account.
///
/// Implementations must not panic; every failure is reported as a
/// [`RemoteError`].
#[async_trait]
pub trait RemoteRecordClient: Send + Sync {
    /// Fetches one record.
    async fn fetch(&self, kind: EntityKind, id: &RecordId) -> RemoteResult<RemoteRecord>;

    /// Fetches up to `limit` changes of `kind` after `since`.
    ///
    /// `None` starts from the beginning of the change log.
    async fn fetch_changed(
        &self,
        kind: EntityKind,
        since: Option<ChangeToken>,
        limit: u32,
    ) -> RemoteResult<ChangeBatch>;

    /// Saves a record and returns the stored version.
    ///
    /// Fails with [`RemoteError::Conflict`] if the record exists with a change
    /// tag different from the one on `record`.
    async fn save(&self, record: RemoteRecord) -> RemoteResult<RemoteRecord>;

    /// Deletes a record.
    async fn delete(&self, kind: EntityKind, id: &RecordId) -> RemoteResult<()>;

    /// Lists the ids of the account's subscriptions.
    async fn fetch_subscription_ids(&self) -> RemoteResult<Vec<String>>;

    /// Creates or replaces a subscription.
    async fn save_subscription(&self, subscription: Subscription) -> RemoteResult<()>;

    /// Associates a push token with this device.
    async fn register_device_token(&self, token: &str) -> RemoteResult<()>;
}
