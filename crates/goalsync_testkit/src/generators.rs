//! Property-based test generators using proptest.
//!
//! Generated entities carry clean sync metadata (no pending edit, revision
//! zero) so that they compare equal to what a pull would materialise.

use chrono::{DateTime, TimeZone, Utc};
use goalsync_core::{
    Entity, Goal, HourWindow, ProductiveHours, PurchasedItem, SyncMeta, Task, UserProfile,
};
use proptest::prelude::*;

/// Strategy for instants between 1970 and 2100 with nanosecond precision.
pub fn timestamp_strategy() -> impl Strategy<Value = DateTime<Utc>> {
    (0i64..4_102_444_800, 0u32..1_000_000_000).prop_map(|(secs, nanos)| {
        Utc.timestamp_opt(secs, nanos)
            .single()
            .unwrap_or(DateTime::UNIX_EPOCH)
    })
}

/// Strategy for non-empty entity ids.
pub fn entity_id_strategy() -> impl Strategy<Value = String> {
    "[A-Za-z0-9_-]{1,24}"
}

/// Strategy for free text, including empty and non-ASCII strings.
pub fn text_strategy() -> impl Strategy<Value = String> {
    ".{0,32}"
}

/// Strategy for clean sync metadata.
pub fn clean_meta_strategy() -> impl Strategy<Value = SyncMeta> {
    (timestamp_strategy(), proptest::option::of("[0-9a-f]{1,16}")).prop_map(
        |(modified_at, server_change_tag)| SyncMeta {
            needs_sync: false,
            modified_at,
            local_revision: 0,
            server_change_tag,
        },
    )
}

/// Strategy for productive-hours schedules.
pub fn productive_hours_strategy() -> impl Strategy<Value = ProductiveHours> {
    prop::collection::vec(
        (0u8..7, 0u16..1440, 0u16..1440).prop_map(|(weekday, a, b)| {
            HourWindow::new(weekday, a.min(b), a.max(b))
        }),
        0..8,
    )
    .prop_map(ProductiveHours::new)
}

/// Strategy for profiles.
pub fn profile_strategy() -> impl Strategy<Value = UserProfile> {
    (
        entity_id_strategy(),
        text_strategy(),
        any::<i64>(),
        productive_hours_strategy(),
        timestamp_strategy(),
        clean_meta_strategy(),
    )
        .prop_map(
            |(id, username, points, productive_hours, created_at, meta)| UserProfile {
                id,
                username,
                points,
                productive_hours,
                created_at,
                meta,
            },
        )
}

/// Strategy for goals.
pub fn goal_strategy() -> impl Strategy<Value = Goal> {
    (
        entity_id_strategy(),
        text_strategy(),
        text_strategy(),
        any::<bool>(),
        0.0f64..=1.0,
        timestamp_strategy(),
        clean_meta_strategy(),
    )
        .prop_map(
            |(id, name, details, is_selected, progress, created_at, meta)| Goal {
                id,
                name,
                details,
                is_selected,
                progress,
                created_at,
                meta,
            },
        )
}

/// Strategy for tasks with a non-empty goal id.
pub fn task_strategy() -> impl Strategy<Value = Task> {
    (
        (entity_id_strategy(), entity_id_strategy(), text_strategy()),
        0i64..86_400,
        timestamp_strategy(),
        any::<bool>(),
        timestamp_strategy(),
        clean_meta_strategy(),
    )
        .prop_map(
            |((id, goal_id, name), duration_seconds, scheduled_at, is_completed, created_at, meta)| {
                Task {
                    id,
                    goal_id,
                    name,
                    duration_seconds,
                    scheduled_at,
                    is_completed,
                    created_at,
                    meta,
                }
            },
        )
}

/// Strategy for purchased items.
pub fn purchase_strategy() -> impl Strategy<Value = PurchasedItem> {
    (
        entity_id_strategy(),
        text_strategy(),
        any::<i64>(),
        timestamp_strategy(),
        clean_meta_strategy(),
    )
        .prop_map(|(id, name, cost_points, purchased_at, meta)| PurchasedItem {
            id,
            name,
            cost_points,
            purchased_at,
            meta,
        })
}

/// Strategy for any entity kind.
pub fn entity_strategy() -> impl Strategy<Value = Entity> {
    prop_oneof![
        profile_strategy().prop_map(Entity::from),
        goal_strategy().prop_map(Entity::from),
        task_strategy().prop_map(Entity::from),
        purchase_strategy().prop_map(Entity::from),
    ]
}
