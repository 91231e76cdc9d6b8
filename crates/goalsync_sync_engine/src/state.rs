//! Pipeline state, statistics and events.

use chrono::{DateTime, Utc};
use goalsync_core::EntityKind;
use goalsync_sync_protocol::{Conflict, RemoteNotification};
use std::collections::{BTreeSet, VecDeque};
use std::time::Duration;

/// Diagnostics kept on [`SyncStats`].
pub const MAX_DIAGNOSTICS: usize = 32;

/// The current state of the sync pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// No pass running.
    Idle,
    /// Saving local edits.
    Pushing,
    /// Applying remote changes.
    Pulling,
    /// Offline; a pass runs on reconnect.
    Paused,
    /// Credentials revoked; nothing runs until re-authentication.
    AuthRequired,
}

impl SyncState {
    /// Returns true if a pass is running.
    pub fn is_active(&self) -> bool {
        matches!(self, SyncState::Pushing | SyncState::Pulling)
    }
}

/// Kinds a pass pulls. Pushes always cover every dirty entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassScope {
    /// Every kind.
    All,
    /// Only these kinds.
    Kinds(BTreeSet<EntityKind>),
}

impl PassScope {
    /// Push only; pull nothing.
    pub fn push_only() -> Self {
        PassScope::Kinds(BTreeSet::new())
    }

    /// One kind and the kind it depends on.
    pub fn kind(kind: EntityKind) -> Self {
        let mut kinds: BTreeSet<EntityKind> = kind.parent().into_iter().collect();
        kinds.insert(kind);
        PassScope::Kinds(kinds)
    }

    /// The scope a notification asks for; a full pull if it names no kind.
    pub fn for_notification(notification: Option<&RemoteNotification>) -> Self {
        notification
            .and_then(RemoteNotification::affected_kind)
            .map_or(PassScope::All, PassScope::kind)
    }

    /// Returns true if the scope pulls `kind`.
    pub fn includes(&self, kind: EntityKind) -> bool {
        match self {
            PassScope::All => true,
            PassScope::Kinds(kinds) => kinds.contains(&kind),
        }
    }

    /// Union of two scopes.
    pub fn merge(self, other: PassScope) -> PassScope {
        match (self, other) {
            (PassScope::Kinds(mut a), PassScope::Kinds(b)) => {
                a.extend(b);
                PassScope::Kinds(a)
            }
            _ => PassScope::All,
        }
    }
}

/// A permanent per-entity failure kept for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Entity kind.
    pub kind: EntityKind,
    /// Entity id (or record name, for records that could not be mapped).
    pub id: String,
    /// Error message.
    pub message: String,
    /// When it happened.
    pub at: DateTime<Utc>,
}

/// Statistics about sync operations.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Passes completed.
    pub passes: u64,
    /// Triggers folded into a running pass.
    pub coalesced: u64,
    /// Entities saved remotely.
    pub pushed: u64,
    /// Local deletes confirmed remotely.
    pub pushed_deletes: u64,
    /// Entities written from remote values.
    pub pulled: u64,
    /// Entities removed by remote deletes.
    pub remote_deletes: u64,
    /// Conflicts the local edit won.
    pub conflicts_local_won: u64,
    /// Conflicts the remote value won.
    pub conflicts_remote_won: u64,
    /// Passes aborted by a transient failure.
    pub transient_failures: u64,
    /// Permanent per-entity failures.
    pub entity_failures: u64,
    /// The most recent permanent failures, oldest first.
    pub diagnostics: VecDeque<Diagnostic>,
    /// Kinds whose pull is stuck behind an unreadable record.
    pub blocked_kinds: BTreeSet<EntityKind>,
    /// When the last pass completed.
    pub last_pass_at: Option<DateTime<Utc>>,
}

impl SyncStats {
    pub(crate) fn record_diagnostic(&mut self, diagnostic: Diagnostic) {
        self.entity_failures += 1;
        if self.diagnostics.len() == MAX_DIAGNOSTICS {
            self.diagnostics.pop_front();
        }
        self.diagnostics.push_back(diagnostic);
    }

    pub(crate) fn record_conflict(&mut self, conflict: &Conflict) {
        if conflict.local_won() {
            self.conflicts_local_won += 1;
        } else {
            self.conflicts_remote_won += 1;
        }
    }

    pub(crate) fn record_pass(&mut self, report: &PassReport) {
        self.passes += 1;
        self.pushed += report.pushed as u64;
        self.pushed_deletes += report.pushed_deletes as u64;
        self.pulled += report.pulled as u64;
        self.remote_deletes += report.remote_deleted as u64;
        self.last_pass_at = Some(Utc::now());
    }
}

/// Result of one completed pass.
#[derive(Debug, Clone, Default)]
pub struct PassReport {
    /// Pass number, counting from 1.
    pub pass: u64,
    /// Entities saved remotely.
    pub pushed: usize,
    /// Local deletes confirmed remotely.
    pub pushed_deletes: usize,
    /// Entities written from remote values.
    pub pulled: usize,
    /// Entities removed by remote deletes.
    pub remote_deleted: usize,
    /// Pulled tasks waiting for their goal.
    pub deferred: usize,
    /// Dirty tasks held back until their goal is saved remotely.
    pub held_back: usize,
    /// Entities kept against a remote delete because a local edit was newer.
    pub restored: usize,
    /// Entities that failed permanently and stay dirty.
    pub failed: usize,
    /// Kinds whose pull stopped at an unreadable record.
    pub blocked: BTreeSet<EntityKind>,
    /// Conflicts resolved during the pass.
    pub conflicts: Vec<Conflict>,
    /// Wall-clock duration.
    pub duration: Duration,
    /// Goals found missing remotely while pushing their tasks.
    pub(crate) missing_goals: BTreeSet<String>,
}

impl PassReport {
    /// Returns true if the pass changed local data from remote.
    pub fn has_new_data(&self) -> bool {
        self.pulled + self.remote_deleted + self.deferred > 0
    }
}

/// Why a requested pass did not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferReason {
    /// The device is offline; a pass runs on reconnect.
    Offline,
    /// The pipeline waits for re-authentication.
    AuthenticationRequired,
}

/// Result of asking for a pass.
#[derive(Debug, Clone)]
pub enum PassOutcome {
    /// A pass (and any follow-up) ran; the report is for the last one.
    Completed(PassReport),
    /// A pass was already running and will run once more for this trigger.
    Coalesced,
    /// Nothing ran.
    Deferred(DeferReason),
}

/// Answer to the host's background fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackgroundFetchResult {
    /// Remote changes were applied.
    NewData,
    /// Nothing changed.
    NoData,
    /// The fetch failed or ran out of time.
    Failed,
}

/// Pipeline events.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// A pass started.
    PassStarted {
        /// Pass number.
        pass: u64,
    },
    /// A pass completed.
    PassCompleted {
        /// Pass number.
        pass: u64,
        /// Entities saved remotely.
        pushed: usize,
        /// Entities written from remote values.
        pulled: usize,
        /// Entities deleted, in either direction.
        deleted: usize,
    },
    /// An entity failed permanently and was skipped.
    EntityFailed {
        /// Entity kind.
        kind: EntityKind,
        /// Entity id.
        id: String,
        /// Error message.
        error: String,
    },
    /// A kind's pull stopped at a record it cannot read; its checkpoint
    /// stays put until the record is fixed remotely.
    PullBlocked {
        /// Entity kind.
        kind: EntityKind,
        /// Error message.
        error: String,
    },
    /// Went offline.
    Paused,
    /// Back online, or re-authenticated.
    Resumed,
    /// Credentials were revoked; the user must sign in again.
    AuthenticationRequired,
}
