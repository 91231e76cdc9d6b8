//! Change batches returned by a remote change query.

use crate::record::{RecordId, RemoteRecord};
use chrono::{DateTime, Utc};
use goalsync_core::ChangeToken;
use serde::{Deserialize, Serialize};

/// A record deleted on the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tombstone {
    /// Record name.
    pub id: RecordId,
    /// When the server accepted the delete.
    pub deleted_at: DateTime<Utc>,
}

/// Records of one kind changed since a change token.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChangeBatch {
    /// Current versions of changed records.
    pub records: Vec<RemoteRecord>,
    /// Records deleted since the token.
    pub deleted: Vec<Tombstone>,
    /// Token to resume from once this batch is applied.
    pub next_token: ChangeToken,
    /// Whether more changes are waiting after `next_token`.
    pub has_more: bool,
}

impl ChangeBatch {
    /// Creates a batch.
    pub fn new(
        records: Vec<RemoteRecord>,
        deleted: Vec<Tombstone>,
        next_token: ChangeToken,
        has_more: bool,
    ) -> Self {
        Self {
            records,
            deleted,
            next_token,
            has_more,
        }
    }

    /// Returns true if the batch carries no changes.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty() && self.deleted.is_empty()
    }

    /// Number of changes in the batch.
    pub fn len(&self) -> usize {
        self.records.len() + self.deleted.len()
    }
}
