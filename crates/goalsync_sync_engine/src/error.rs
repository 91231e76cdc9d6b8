//! Error types for the sync engine.

use goalsync_core::CoreError;
use goalsync_sync_protocol::{MapError, RemoteError};
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The remote store failed.
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    /// The local store failed.
    #[error("store error: {0}")]
    Store(#[from] CoreError),

    /// A pulled record could not be mapped.
    #[error("mapping error: {0}")]
    Mapping(#[from] MapError),

    /// Credentials were revoked; the pipeline is paused.
    #[error("authentication required: {0}")]
    AuthenticationRequired(String),

    /// The pipeline task is gone.
    #[error("sync pipeline stopped")]
    ChannelClosed,
}

impl SyncError {
    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Remote(err) => err.is_transient(),
            _ => false,
        }
    }
}
