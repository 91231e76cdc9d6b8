//! Conflict detection and resolution.

use chrono::{DateTime, Utc};
use goalsync_core::EntityKind;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a conflict was detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictPhase {
    /// A save was refused because the remote copy moved on.
    Push,
    /// A pulled value arrived for an entity with a pending local edit.
    Pull,
}

/// Resolution for a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictResolution {
    /// Keep the local value and save it over the remote record.
    KeepLocal,
    /// Discard the pending local edit and adopt the remote value.
    AcceptRemote,
}

impl fmt::Display for ConflictResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictResolution::KeepLocal => f.write_str("local"),
            ConflictResolution::AcceptRemote => f.write_str("remote"),
        }
    }
}

/// Last writer wins: the later modification time is kept, and a tie goes
/// to the remote value.
pub fn last_writer_wins(local: DateTime<Utc>, remote: DateTime<Utc>) -> ConflictResolution {
    if local > remote {
        ConflictResolution::KeepLocal
    } else {
        ConflictResolution::AcceptRemote
    }
}

/// A resolved conflict between a pending local edit and a remote value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    /// Entity kind.
    pub kind: EntityKind,
    /// Entity id.
    pub id: String,
    /// Where it was detected.
    pub phase: ConflictPhase,
    /// Local modification time.
    pub local_modified: DateTime<Utc>,
    /// Remote modification time.
    pub remote_modified: DateTime<Utc>,
    /// How it was resolved.
    pub resolution: ConflictResolution,
}

impl Conflict {
    /// Resolves a conflict with [`last_writer_wins`].
    pub fn resolve(
        kind: EntityKind,
        id: impl Into<String>,
        phase: ConflictPhase,
        local_modified: DateTime<Utc>,
        remote_modified: DateTime<Utc>,
    ) -> Self {
        Self {
            kind,
            id: id.into(),
            phase,
            local_modified,
            remote_modified,
            resolution: last_writer_wins(local_modified, remote_modified),
        }
    }

    /// Returns true if the local edit survived.
    pub fn local_won(&self) -> bool {
        self.resolution == ConflictResolution::KeepLocal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn later_write_wins() {
        let later = t0() + Duration::hours(1);
        assert_eq!(last_writer_wins(later, t0()), ConflictResolution::KeepLocal);
        assert_eq!(last_writer_wins(t0(), later), ConflictResolution::AcceptRemote);
    }

    #[test]
    fn tie_goes_to_remote() {
        assert_eq!(last_writer_wins(t0(), t0()), ConflictResolution::AcceptRemote);
    }

    #[test]
    fn resolve_records_inputs() {
        let conflict = Conflict::resolve(
            EntityKind::Goal,
            "G1",
            ConflictPhase::Pull,
            t0() + Duration::minutes(5),
            t0(),
        );
        assert!(conflict.local_won());
        assert_eq!(conflict.id, "G1");
        assert_eq!(conflict.phase, ConflictPhase::Pull);
    }
}
