//! Error types for the reference cloud.

use goalsync_core::EntityKind;
use goalsync_sync_protocol::{RecordId, RemoteError, RemoteRecord};
use thiserror::Error;

/// Result type for cloud operations.
pub type CloudResult<T> = Result<T, CloudError>;

/// Errors raised by the record zone.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CloudError {
    /// The record does not exist.
    #[error("{kind} record not found: {id}")]
    NotFound {
        /// Kind requested.
        kind: EntityKind,
        /// Record name requested.
        id: RecordId,
    },

    /// The save was based on a stale change tag.
    #[error("change tag mismatch for {id}: expected {expected:?}, got {actual:?}")]
    TagMismatch {
        /// Record name.
        id: RecordId,
        /// Tag currently stored.
        expected: Option<String>,
        /// Tag the client sent.
        actual: Option<String>,
        /// The stored record.
        current: Box<RemoteRecord>,
    },

    /// The record failed validation.
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    /// The device is not connected.
    #[error("unknown device: {0}")]
    UnknownDevice(String),
}

impl CloudError {
    /// Returns true if the client sent something wrong.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            CloudError::TagMismatch { .. }
                | CloudError::InvalidRecord(_)
                | CloudError::UnknownDevice(_)
        )
    }
}

impl From<CloudError> for RemoteError {
    fn from(err: CloudError) -> Self {
        match err {
            CloudError::NotFound { kind, id } => RemoteError::NotFound { kind, id },
            CloudError::TagMismatch { current, .. } => RemoteError::Conflict {
                server_record: current,
            },
            CloudError::InvalidRecord(reason) => RemoteError::Rejected { reason },
            CloudError::UnknownDevice(device) => {
                RemoteError::AuthRevoked(format!("device {device} is not registered"))
            }
        }
    }
}
