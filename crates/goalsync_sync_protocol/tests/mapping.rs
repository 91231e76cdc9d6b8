//! Record mapping laws and scenarios.

use goalsync_core::{Entity, EntityKind, ProductiveHours};
use goalsync_sync_protocol::mapper::{fields, from_remote_of_kind};
use goalsync_sync_protocol::{
    from_remote, to_remote, FieldValue, MapError, Mapped, RemoteRecord,
};
use goalsync_testkit::prelude::*;
use proptest::prelude::*;

fn every_goal_exists(_: &str) -> bool {
    true
}

fn round_trip(entity: &Entity) -> Entity {
    match from_remote(&to_remote(entity), &every_goal_exists) {
        Ok(mapped) => mapped.into_entity(),
        Err(err) => panic!("round trip of {} failed: {err}", entity.id()),
    }
}

proptest! {
    #[test]
    fn from_remote_inverts_to_remote(entity in entity_strategy()) {
        prop_assert_eq!(round_trip(&entity), entity);
    }

    #[test]
    fn schedule_blob_is_idempotent(hours in productive_hours_strategy()) {
        let blob = hours.to_blob();
        let decoded = ProductiveHours::from_blob(&blob).unwrap();
        prop_assert_eq!(&decoded, &hours);
        prop_assert_eq!(decoded.to_blob(), blob);
    }

    #[test]
    fn repeated_round_trips_do_not_drift(profile in profile_strategy()) {
        let once = round_trip(&profile.into());
        let twice = round_trip(&once);
        prop_assert_eq!(to_remote(&once), to_remote(&twice));
    }

    #[test]
    fn kind_is_preserved(entity in entity_strategy()) {
        let record = to_remote(&entity);
        prop_assert_eq!(record.kind, entity.kind());
        prop_assert!(from_remote_of_kind(&record, entity.kind(), &every_goal_exists).is_ok());
    }
}

#[test]
fn pending_edit_maps_back_clean() {
    let mut goal = goal("G1", "Fitness");
    goal.meta.needs_sync = true;
    goal.meta.local_revision = 9;
    goal.meta.modified_at = at(9, 30);

    let pulled = round_trip(&goal.clone().into());
    assert!(!pulled.needs_sync());
    assert_eq!(pulled.meta().local_revision, 0);
    assert_eq!(pulled.meta().modified_at, at(9, 30));
    assert_eq!(pulled.without_meta(), Entity::from(goal).without_meta());
}

#[test]
fn profile_record_uses_account_prefix() {
    let record = to_remote(&profile("001a2b", "Alice").into());
    assert_eq!(record.id.as_str(), "UserProfile_001a2b");

    let Mapped::Ready(Entity::UserProfile(pulled)) =
        from_remote(&record, &every_goal_exists).unwrap()
    else {
        panic!("expected a profile");
    };
    assert_eq!(pulled.id, "001a2b");
}

#[test]
fn malformed_fields_degrade_to_defaults() {
    let record = RemoteRecord::new(EntityKind::Task, "T1")
        .with_field(fields::GOAL_ID, FieldValue::String("G1".into()))
        .with_field(fields::NAME, FieldValue::Int(3))
        .with_field(fields::DURATION_SECONDS, FieldValue::Double(1500.7))
        .with_field(fields::IS_COMPLETED, FieldValue::String("yes".into()))
        .with_field(fields::SCHEDULED_AT, FieldValue::Int(0));

    let Mapped::Ready(Entity::Task(task)) = from_remote(&record, &every_goal_exists).unwrap()
    else {
        panic!("expected a ready task");
    };
    assert_eq!(task.name, "");
    assert_eq!(task.duration_seconds, 1500);
    assert!(!task.is_completed);
    assert_eq!(task.scheduled_at, chrono::DateTime::UNIX_EPOCH);
}

#[test]
fn only_identity_failures_are_errors() {
    let nameless = RemoteRecord::new(EntityKind::PurchasedItem, "");
    assert!(matches!(
        from_remote(&nameless, &every_goal_exists),
        Err(MapError::MissingIdentifier { .. })
    ));

    let bare_profile = RemoteRecord::new(EntityKind::UserProfile, "UserProfile_");
    assert!(matches!(
        from_remote(&bare_profile, &every_goal_exists),
        Err(MapError::MissingIdentifier { .. })
    ));
}

#[test]
fn orphan_task_waits_for_its_goal() {
    let record = to_remote(&task("T1", "G9", "Stretch").into());
    let known = |goal_id: &str| goal_id == "G1";

    match from_remote(&record, &known).unwrap() {
        Mapped::AwaitingParent(task) => assert_eq!(task.goal_id, "G9"),
        other => panic!("expected deferral, got {other:?}"),
    }
}
