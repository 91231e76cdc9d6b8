//! Record mapping between local entities and remote records.
//!
//! Both directions are pure. [`to_remote`] writes every field that
//! [`from_remote`] reads, with explicit defaults, so a round trip never
//! produces a missing value. [`from_remote`] never fails on a missing or
//! mistyped field: it falls back to the type's default (empty string, zero,
//! false, the Unix epoch, an empty schedule). Only a record without a usable
//! identity is rejected.

use crate::error::{MapError, MapResult};
use crate::record::{FieldValue, RecordId, RemoteRecord};
use goalsync_core::{
    Entity, EntityKind, Goal, ProductiveHours, PurchasedItem, SyncMeta, Task, UserProfile,
};

/// Remote field names.
pub mod fields {
    /// Profile display name.
    pub const USERNAME: &str = "username";
    /// Profile points balance.
    pub const POINTS: &str = "points";
    /// Profile schedule blob.
    pub const PRODUCTIVE_HOURS: &str = "productiveHours";
    /// Name of a goal, task or purchased item.
    pub const NAME: &str = "name";
    /// Goal description.
    pub const DETAILS: &str = "details";
    /// Goal selection flag.
    pub const IS_SELECTED: &str = "isSelected";
    /// Goal completion ratio.
    pub const PROGRESS: &str = "progress";
    /// Task parent goal id.
    pub const GOAL_ID: &str = "goalId";
    /// Task duration.
    pub const DURATION_SECONDS: &str = "durationSeconds";
    /// Task schedule.
    pub const SCHEDULED_AT: &str = "scheduledAt";
    /// Task completion flag.
    pub const IS_COMPLETED: &str = "isCompleted";
    /// Purchase price.
    pub const COST_POINTS: &str = "costPoints";
    /// Purchase time.
    pub const PURCHASED_AT: &str = "purchasedAt";
    /// Creation time.
    pub const CREATED_AT: &str = "createdAt";
}

/// Prefix of the profile's record name.
pub const PROFILE_RECORD_PREFIX: &str = "UserProfile_";

/// Answers whether a parent goal has been materialised locally.
pub trait ParentResolver {
    /// Returns true if a goal with this id exists locally.
    fn goal_exists(&self, goal_id: &str) -> bool;
}

impl<F> ParentResolver for F
where
    F: Fn(&str) -> bool,
{
    fn goal_exists(&self, goal_id: &str) -> bool {
        self(goal_id)
    }
}

/// Outcome of mapping a remote record.
#[derive(Debug, Clone, PartialEq)]
pub enum Mapped {
    /// The entity can be written locally.
    Ready(Entity),
    /// A task whose goal is not available yet; defer it, do not drop it.
    AwaitingParent(Task),
}

impl Mapped {
    /// Returns the mapped entity regardless of parent availability.
    pub fn into_entity(self) -> Entity {
        match self {
            Mapped::Ready(entity) => entity,
            Mapped::AwaitingParent(task) => task.into(),
        }
    }
}

/// Returns the record name used for an entity.
///
/// The profile is stored as `UserProfile_<id>`; every other kind uses the
/// entity id verbatim.
pub fn record_id_for(kind: EntityKind, entity_id: &str) -> RecordId {
    match kind {
        EntityKind::UserProfile => RecordId::new(format!("{PROFILE_RECORD_PREFIX}{entity_id}")),
        _ => RecordId::new(entity_id),
    }
}

/// Returns the entity id a record name maps to.
///
/// Inverse of [`record_id_for`]. Tombstones only carry the record name, so
/// this is also how a remote delete finds its local entity.
pub fn entity_id_from(kind: EntityKind, record_id: &RecordId) -> MapResult<String> {
    let id = match kind {
        EntityKind::UserProfile => record_id
            .as_str()
            .strip_prefix(PROFILE_RECORD_PREFIX)
            .ok_or_else(|| MapError::InvalidProfileIdentifier {
                record_id: record_id.to_string(),
            })?,
        _ => record_id.as_str(),
    };
    if id.is_empty() {
        return Err(MapError::MissingIdentifier { kind });
    }
    Ok(id.to_string())
}

/// Converts an entity into its remote record.
///
/// The record carries the entity's known change tag so the store can detect
/// concurrent modification, and the local modification time in
/// [`RemoteRecord::MODIFIED_AT_FIELD`].
pub fn to_remote(entity: &Entity) -> RemoteRecord {
    let mut record = RemoteRecord::new(entity.kind(), record_id_for(entity.kind(), entity.id()));
    record.change_tag = entity.meta().server_change_tag.clone();
    record.set(
        RemoteRecord::MODIFIED_AT_FIELD,
        FieldValue::Date(entity.meta().modified_at),
    );

    match entity {
        Entity::UserProfile(profile) => {
            record
                .set(fields::USERNAME, FieldValue::String(profile.username.clone()))
                .set(fields::POINTS, FieldValue::Int(profile.points))
                .set(
                    fields::PRODUCTIVE_HOURS,
                    FieldValue::Blob(profile.productive_hours.to_blob()),
                )
                .set(fields::CREATED_AT, FieldValue::Date(profile.created_at));
        }
        Entity::Goal(goal) => {
            record
                .set(fields::NAME, FieldValue::String(goal.name.clone()))
                .set(fields::DETAILS, FieldValue::String(goal.details.clone()))
                .set(fields::IS_SELECTED, FieldValue::bool(goal.is_selected))
                .set(fields::PROGRESS, FieldValue::Double(goal.progress))
                .set(fields::CREATED_AT, FieldValue::Date(goal.created_at));
        }
        Entity::Task(task) => {
            record
                .set(fields::NAME, FieldValue::String(task.name.clone()))
                .set(fields::GOAL_ID, FieldValue::String(task.goal_id.clone()))
                .set(fields::DURATION_SECONDS, FieldValue::Int(task.duration_seconds))
                .set(fields::SCHEDULED_AT, FieldValue::Date(task.scheduled_at))
                .set(fields::IS_COMPLETED, FieldValue::bool(task.is_completed))
                .set(fields::CREATED_AT, FieldValue::Date(task.created_at));
        }
        Entity::PurchasedItem(item) => {
            record
                .set(fields::NAME, FieldValue::String(item.name.clone()))
                .set(fields::COST_POINTS, FieldValue::Int(item.cost_points))
                .set(fields::PURCHASED_AT, FieldValue::Date(item.purchased_at));
        }
    }

    record
}

/// Converts a remote record into an entity.
///
/// The entity comes back clean (`needs_sync == false`) with the record's
/// change tag and modification time. Tasks whose goal `parents` cannot
/// resolve come back as [`Mapped::AwaitingParent`].
pub fn from_remote(record: &RemoteRecord, parents: &dyn ParentResolver) -> MapResult<Mapped> {
    let id = entity_id_from(record.kind, &record.id)?;
    let meta = SyncMeta {
        needs_sync: false,
        modified_at: record.modification_time(),
        local_revision: 0,
        server_change_tag: record.change_tag.clone(),
    };

    let mapped = match record.kind {
        EntityKind::UserProfile => Mapped::Ready(
            UserProfile {
                id,
                username: record.string_or_default(fields::USERNAME),
                points: record.int_or_default(fields::POINTS),
                productive_hours: record
                    .get(fields::PRODUCTIVE_HOURS)
                    .and_then(FieldValue::as_str)
                    .and_then(|blob| ProductiveHours::from_blob(blob).ok())
                    .unwrap_or_default(),
                created_at: record.date_or_default(fields::CREATED_AT),
                meta,
            }
            .into(),
        ),
        EntityKind::Goal => Mapped::Ready(
            Goal {
                id,
                name: record.string_or_default(fields::NAME),
                details: record.string_or_default(fields::DETAILS),
                is_selected: record.bool_or_default(fields::IS_SELECTED),
                progress: record.double_or_default(fields::PROGRESS),
                created_at: record.date_or_default(fields::CREATED_AT),
                meta,
            }
            .into(),
        ),
        EntityKind::Task => {
            let task = Task {
                id,
                goal_id: record.string_or_default(fields::GOAL_ID),
                name: record.string_or_default(fields::NAME),
                duration_seconds: record.int_or_default(fields::DURATION_SECONDS),
                scheduled_at: record.date_or_default(fields::SCHEDULED_AT),
                is_completed: record.bool_or_default(fields::IS_COMPLETED),
                created_at: record.date_or_default(fields::CREATED_AT),
                meta,
            };
            if !task.goal_id.is_empty() && parents.goal_exists(&task.goal_id) {
                Mapped::Ready(task.into())
            } else {
                Mapped::AwaitingParent(task)
            }
        }
        EntityKind::PurchasedItem => Mapped::Ready(
            PurchasedItem {
                id,
                name: record.string_or_default(fields::NAME),
                cost_points: record.int_or_default(fields::COST_POINTS),
                purchased_at: record.date_or_default(fields::PURCHASED_AT),
                meta,
            }
            .into(),
        ),
    };

    Ok(mapped)
}

/// Like [`from_remote`], but first checks the record is of `expected` kind.
pub fn from_remote_of_kind(
    record: &RemoteRecord,
    expected: EntityKind,
    parents: &dyn ParentResolver,
) -> MapResult<Mapped> {
    if record.kind != expected {
        return Err(MapError::UnexpectedKind {
            expected,
            found: record.kind,
        });
    }
    from_remote(record, parents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    fn any_goal(_: &str) -> bool {
        true
    }

    fn no_goal(_: &str) -> bool {
        false
    }

    #[test]
    fn profile_record_name() {
        let id = record_id_for(EntityKind::UserProfile, "a1b2");
        assert_eq!(id.as_str(), "UserProfile_a1b2");
        assert_eq!(record_id_for(EntityKind::Goal, "G1").as_str(), "G1");
    }

    #[test]
    fn profile_without_prefix_is_malformed() {
        let record = RemoteRecord::new(EntityKind::UserProfile, "a1b2");
        assert!(matches!(
            from_remote(&record, &any_goal),
            Err(MapError::InvalidProfileIdentifier { .. })
        ));
    }

    #[test]
    fn empty_id_is_malformed() {
        let record = RemoteRecord::new(EntityKind::Goal, "");
        assert_eq!(
            from_remote(&record, &any_goal),
            Err(MapError::MissingIdentifier {
                kind: EntityKind::Goal
            })
        );
    }

    #[test]
    fn bare_record_maps_to_defaults() {
        let record = RemoteRecord::new(EntityKind::Goal, "G1");
        let Mapped::Ready(Entity::Goal(goal)) = from_remote(&record, &any_goal).unwrap() else {
            panic!("expected a ready goal");
        };
        assert_eq!(goal.name, "");
        assert_eq!(goal.details, "");
        assert!(!goal.is_selected);
        assert_eq!(goal.progress, 0.0);
        assert_eq!(goal.created_at, DateTime::UNIX_EPOCH);
        assert!(!goal.meta.needs_sync);
    }

    #[test]
    fn garbage_schedule_blob_falls_back_to_empty() {
        let record = RemoteRecord::new(EntityKind::UserProfile, "UserProfile_u1")
            .with_field(fields::PRODUCTIVE_HOURS, FieldValue::Blob("{oops".into()))
            .with_field(fields::USERNAME, FieldValue::String("Alice".into()));
        let Mapped::Ready(Entity::UserProfile(profile)) =
            from_remote(&record, &any_goal).unwrap()
        else {
            panic!("expected a ready profile");
        };
        assert!(profile.productive_hours.is_empty());
        assert_eq!(profile.username, "Alice");
        assert_eq!(profile.id, "u1");
    }

    #[test]
    fn task_without_parent_awaits_it() {
        let record = RemoteRecord::new(EntityKind::Task, "T1")
            .with_field(fields::GOAL_ID, FieldValue::String("G1".into()));
        assert!(matches!(
            from_remote(&record, &no_goal).unwrap(),
            Mapped::AwaitingParent(_)
        ));
        assert!(matches!(
            from_remote(&record, &any_goal).unwrap(),
            Mapped::Ready(Entity::Task(_))
        ));
    }

    #[test]
    fn task_with_empty_goal_is_deferred_not_dropped() {
        let record = RemoteRecord::new(EntityKind::Task, "T1");
        assert!(matches!(
            from_remote(&record, &any_goal).unwrap(),
            Mapped::AwaitingParent(_)
        ));
    }

    #[test]
    fn kind_check() {
        let record = RemoteRecord::new(EntityKind::Goal, "G1");
        assert!(from_remote_of_kind(&record, EntityKind::Goal, &any_goal).is_ok());
        assert!(matches!(
            from_remote_of_kind(&record, EntityKind::Task, &any_goal),
            Err(MapError::UnexpectedKind { .. })
        ));
    }

    #[test]
    fn to_remote_writes_every_field() {
        let record = to_remote(&Goal::new("G1", "Fitness").into());
        for name in [
            fields::NAME,
            fields::DETAILS,
            fields::IS_SELECTED,
            fields::PROGRESS,
            fields::CREATED_AT,
            RemoteRecord::MODIFIED_AT_FIELD,
        ] {
            assert!(record.get(name).is_some(), "missing {name}");
        }
        assert_eq!(record.get(fields::DETAILS), Some(&FieldValue::String(String::new())));
    }
}
