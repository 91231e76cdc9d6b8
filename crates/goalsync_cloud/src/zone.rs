//! Versioned record storage with a per-kind change log.

use crate::error::{CloudError, CloudResult};
use chrono::{DateTime, Utc};
use goalsync_core::{ChangeToken, EntityKind};
use goalsync_sync_protocol::{ChangeBatch, RecordId, RemoteRecord, Tombstone};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;

type Key = (EntityKind, RecordId);

/// One entry in a kind's change log.
#[derive(Debug, Clone)]
enum Change {
    Saved(RecordId),
    Deleted(Tombstone),
}

impl Change {
    fn id(&self) -> &RecordId {
        match self {
            Change::Saved(id) => id,
            Change::Deleted(tombstone) => &tombstone.id,
        }
    }
}

#[derive(Default)]
struct ZoneState {
    /// Last sequence number handed out.
    seq: u64,
    records: HashMap<Key, RemoteRecord>,
    /// Change log per kind, keyed by sequence. Only the latest change of a
    /// record is kept.
    log: HashMap<EntityKind, BTreeMap<u64, Change>>,
    latest: HashMap<Key, u64>,
}

impl ZoneState {
    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    fn log_change(&mut self, kind: EntityKind, change: Change) -> u64 {
        let seq = self.next_seq();
        let key = (kind, change.id().clone());
        let log = self.log.entry(kind).or_default();
        if let Some(previous) = self.latest.insert(key, seq) {
            log.remove(&previous);
        }
        log.insert(seq, change);
        seq
    }
}

/// An account's records.
///
/// Every save or delete takes the next value of one zone-wide sequence. A
/// record's change tag is that sequence in hex, and a change token is the
/// sequence of the last change a client has seen.
pub struct RecordZone {
    state: RwLock<ZoneState>,
}

impl RecordZone {
    /// Creates an empty zone.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(ZoneState::default()),
        }
    }

    /// Returns the last sequence number handed out.
    pub fn sequence(&self) -> u64 {
        self.state.read().seq
    }

    /// Fetches one record.
    pub fn fetch(&self, kind: EntityKind, id: &RecordId) -> CloudResult<RemoteRecord> {
        self.state
            .read()
            .records
            .get(&(kind, id.clone()))
            .cloned()
            .ok_or_else(|| CloudError::NotFound {
                kind,
                id: id.clone(),
            })
    }

    /// Returns every live record of a kind, ordered by id.
    pub fn records(&self, kind: EntityKind) -> Vec<RemoteRecord> {
        let state = self.state.read();
        let mut records: Vec<_> = state
            .records
            .iter()
            .filter(|((k, _), _)| *k == kind)
            .map(|(_, record)| record.clone())
            .collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        records
    }

    /// Returns the number of live records.
    pub fn len(&self) -> usize {
        self.state.read().records.len()
    }

    /// Returns true if the zone holds no live records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Saves a record with optimistic concurrency.
    ///
    /// An existing record only accepts a save carrying its current change
    /// tag. A save of an absent record is accepted whatever tag it carries,
    /// which recreates records deleted by another device.
    pub fn save(&self, mut record: RemoteRecord, now: DateTime<Utc>) -> CloudResult<RemoteRecord> {
        if record.id.is_empty() {
            return Err(CloudError::InvalidRecord(format!(
                "{} record without a name",
                record.kind
            )));
        }

        let mut state = self.state.write();
        let key = (record.kind, record.id.clone());
        if let Some(current) = state.records.get(&key) {
            if current.change_tag != record.change_tag {
                return Err(CloudError::TagMismatch {
                    id: record.id,
                    expected: current.change_tag.clone(),
                    actual: record.change_tag,
                    current: Box::new(current.clone()),
                });
            }
        }

        let seq = state.log_change(record.kind, Change::Saved(record.id.clone()));
        record.change_tag = Some(format!("{seq:x}"));
        record.modified_at = Some(now);
        state.records.insert(key, record.clone());
        Ok(record)
    }

    /// Deletes a record and logs a tombstone.
    pub fn delete(&self, kind: EntityKind, id: &RecordId, now: DateTime<Utc>) -> CloudResult<()> {
        let mut state = self.state.write();
        if state.records.remove(&(kind, id.clone())).is_none() {
            return Err(CloudError::NotFound {
                kind,
                id: id.clone(),
            });
        }
        state.log_change(
            kind,
            Change::Deleted(Tombstone {
                id: id.clone(),
                deleted_at: now,
            }),
        );
        Ok(())
    }

    /// Returns up to `limit` changes of `kind` after `since`.
    pub fn changes_since(
        &self,
        kind: EntityKind,
        since: Option<ChangeToken>,
        limit: u32,
    ) -> ChangeBatch {
        let after = since.map_or(0, ChangeToken::as_u64);
        let state = self.state.read();
        let Some(log) = state.log.get(&kind) else {
            return ChangeBatch::new(Vec::new(), Vec::new(), ChangeToken::new(after), false);
        };

        let mut pending = log
            .range((Bound::Excluded(after), Bound::Unbounded))
            .peekable();
        let mut batch = ChangeBatch::new(Vec::new(), Vec::new(), ChangeToken::new(after), false);
        for _ in 0..limit.max(1) {
            let Some((seq, change)) = pending.next() else {
                break;
            };
            match change {
                Change::Saved(id) => {
                    if let Some(record) = state.records.get(&(kind, id.clone())) {
                        batch.records.push(record.clone());
                    }
                }
                Change::Deleted(tombstone) => batch.deleted.push(tombstone.clone()),
            }
            batch.next_token = ChangeToken::new(*seq);
        }
        batch.has_more = pending.peek().is_some();
        batch
    }

    /// Stores a record as-is, skipping validation and concurrency checks.
    ///
    /// Lets tests plant records a real client could never produce.
    pub fn insert_raw(&self, mut record: RemoteRecord, now: DateTime<Utc>) -> RemoteRecord {
        let mut state = self.state.write();
        let seq = state.log_change(record.kind, Change::Saved(record.id.clone()));
        if record.change_tag.is_none() {
            record.change_tag = Some(format!("{seq:x}"));
        }
        record.modified_at.get_or_insert(now);
        state
            .records
            .insert((record.kind, record.id.clone()), record.clone());
        record
    }

    /// Removes a record and every trace of it from the change log.
    ///
    /// Returns true if anything was removed.
    pub fn purge(&self, kind: EntityKind, id: &RecordId) -> bool {
        let mut state = self.state.write();
        let key = (kind, id.clone());
        let removed = state.records.remove(&key).is_some();
        match state.latest.remove(&key) {
            Some(seq) => {
                if let Some(log) = state.log.get_mut(&kind) {
                    log.remove(&seq);
                }
                true
            }
            None => removed,
        }
    }
}

impl Default for RecordZone {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use goalsync_sync_protocol::FieldValue;

    fn goal(id: &str, name: &str) -> RemoteRecord {
        RemoteRecord::new(EntityKind::Goal, id).with_field("name", FieldValue::String(name.into()))
    }

    #[test]
    fn empty_zone() {
        let zone = RecordZone::new();
        assert!(zone.is_empty());
        let batch = zone.changes_since(EntityKind::Goal, None, 10);
        assert!(batch.is_empty());
        assert_eq!(batch.next_token, ChangeToken::new(0));
        assert!(!batch.has_more);
    }

    #[test]
    fn save_assigns_tags() {
        let zone = RecordZone::new();
        let now = Utc::now();
        let first = zone.save(goal("G1", "Read"), now).unwrap();
        assert_eq!(first.change_tag.as_deref(), Some("1"));
        assert_eq!(first.modified_at, Some(now));

        let second = zone.save(first.clone().with_field("name", FieldValue::String("Run".into())), now).unwrap();
        assert_eq!(second.change_tag.as_deref(), Some("2"));
        assert_eq!(zone.sequence(), 2);
    }

    #[test]
    fn stale_tag_conflicts() {
        let zone = RecordZone::new();
        let now = Utc::now();
        let first = zone.save(goal("G1", "Read"), now).unwrap();
        zone.save(first.clone(), now).unwrap();

        let err = zone.save(first, now).unwrap_err();
        match err {
            CloudError::TagMismatch { expected, current, .. } => {
                assert_eq!(expected.as_deref(), Some("2"));
                assert_eq!(current.change_tag.as_deref(), Some("2"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn empty_name_rejected() {
        let zone = RecordZone::new();
        let err = zone.save(goal("", "Read"), Utc::now()).unwrap_err();
        assert!(matches!(err, CloudError::InvalidRecord(_)));
    }

    #[test]
    fn change_log_keeps_latest_change_only() {
        let zone = RecordZone::new();
        let now = Utc::now();
        let g1 = zone.save(goal("G1", "Read"), now).unwrap();
        zone.save(goal("G2", "Run"), now).unwrap();
        zone.save(g1, now).unwrap();

        let batch = zone.changes_since(EntityKind::Goal, None, 10);
        let ids: Vec<_> = batch.records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["G2", "G1"]);
        assert_eq!(batch.next_token, ChangeToken::new(3));
    }

    #[test]
    fn paging() {
        let zone = RecordZone::new();
        let now = Utc::now();
        for i in 0..3 {
            zone.save(goal(&format!("G{i}"), "x"), now).unwrap();
        }

        let first = zone.changes_since(EntityKind::Goal, None, 2);
        assert_eq!(first.len(), 2);
        assert!(first.has_more);

        let rest = zone.changes_since(EntityKind::Goal, Some(first.next_token), 2);
        assert_eq!(rest.len(), 1);
        assert!(!rest.has_more);
        assert_eq!(rest.next_token, ChangeToken::new(3));

        // Other kinds see nothing.
        assert!(zone.changes_since(EntityKind::Task, None, 10).is_empty());
    }

    #[test]
    fn delete_logs_tombstone() {
        let zone = RecordZone::new();
        let now = Utc::now();
        zone.save(goal("G1", "Read"), now).unwrap();
        zone.delete(EntityKind::Goal, &"G1".into(), now).unwrap();

        let batch = zone.changes_since(EntityKind::Goal, None, 10);
        assert!(batch.records.is_empty());
        assert_eq!(batch.deleted.len(), 1);
        assert_eq!(batch.deleted[0].id.as_str(), "G1");

        let err = zone.delete(EntityKind::Goal, &"G1".into(), now).unwrap_err();
        assert!(matches!(err, CloudError::NotFound { .. }));
    }

    #[test]
    fn absent_record_accepts_any_tag() {
        let zone = RecordZone::new();
        let mut record = goal("G1", "Read");
        record.change_tag = Some("ff".into());
        assert!(zone.save(record, Utc::now()).is_ok());
    }

    #[test]
    fn raw_insert_and_purge() {
        let zone = RecordZone::new();
        let now = Utc::now();
        zone.insert_raw(goal("", "broken"), now);
        assert_eq!(zone.changes_since(EntityKind::Goal, None, 10).len(), 1);

        assert!(zone.purge(EntityKind::Goal, &"".into()));
        assert!(zone.changes_since(EntityKind::Goal, None, 10).is_empty());
        assert!(!zone.purge(EntityKind::Goal, &"".into()));
    }
}
