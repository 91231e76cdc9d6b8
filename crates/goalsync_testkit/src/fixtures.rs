//! Test fixtures and store helpers.
//!
//! Entity builders use fixed creation times so tests can compare whole
//! entities, and [`at`] gives readable wall-clock instants on one day.

use chrono::{DateTime, Duration, TimeZone, Utc};
use goalsync_core::{
    Entity, EntityStore, Goal, HourWindow, LocalStore, ProductiveHours, PurchasedItem, Task,
    UserProfile,
};
use std::path::PathBuf;
use tempfile::TempDir;

/// Midnight of the day every fixture lives on.
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0)
        .single()
        .unwrap_or(DateTime::UNIX_EPOCH)
}

/// `hour:minute` on the fixture day.
pub fn at(hour: i64, minute: i64) -> DateTime<Utc> {
    base_time() + Duration::hours(hour) + Duration::minutes(minute)
}

/// A profile with a fixed creation time.
pub fn profile(id: &str, username: &str) -> UserProfile {
    UserProfile {
        created_at: base_time(),
        ..UserProfile::new(id, username)
    }
}

/// A weekday-mornings schedule.
pub fn weekday_mornings() -> ProductiveHours {
    ProductiveHours::new(
        (1..=5)
            .map(|weekday| HourWindow::new(weekday, 9 * 60, 12 * 60))
            .collect(),
    )
}

/// A goal with a fixed creation time.
pub fn goal(id: &str, name: &str) -> Goal {
    Goal {
        created_at: base_time(),
        ..Goal::new(id, name)
    }
}

/// A 25 minute task with fixed times.
pub fn task(id: &str, goal_id: &str, name: &str) -> Task {
    Task {
        duration_seconds: 25 * 60,
        scheduled_at: at(10, 0),
        created_at: base_time(),
        ..Task::new(id, goal_id, name)
    }
}

/// A purchase with a fixed time.
pub fn purchase(id: &str, name: &str, cost_points: i64) -> PurchasedItem {
    PurchasedItem {
        purchased_at: at(18, 0),
        ..PurchasedItem::new(id, name, cost_points)
    }
}

/// Saves entities as local edits at `modified_at`, panicking on failure.
pub fn seed(store: &impl EntityStore, modified_at: DateTime<Utc>, entities: Vec<Entity>) {
    for entity in entities {
        let id = entity.id().to_string();
        if let Err(err) = store.save_at(entity, modified_at) {
            panic!("failed to seed {id}: {err}");
        }
    }
}

/// A durable store in a temporary directory, removed on drop.
pub struct TestStore {
    /// The store.
    pub store: LocalStore,
    dir: TempDir,
}

impl TestStore {
    /// Opens a fresh durable store.
    pub fn new() -> Self {
        let dir = match TempDir::new() {
            Ok(dir) => dir,
            Err(err) => panic!("failed to create temp directory: {err}"),
        };
        let path = dir.path().join("store.json");
        let store = match LocalStore::open(&path) {
            Ok(store) => store,
            Err(err) => panic!("failed to open store: {err}"),
        };
        Self { store, dir }
    }

    /// Path of the snapshot file.
    pub fn path(&self) -> PathBuf {
        self.dir.path().join("store.json")
    }

    /// Reopens the snapshot as a second store.
    pub fn reopen(&self) -> LocalStore {
        match LocalStore::open(self.path()) {
            Ok(store) => store,
            Err(err) => panic!("failed to reopen store: {err}"),
        }
    }
}

impl Default for TestStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestStore {
    type Target = LocalStore;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use goalsync_core::EntityKind;

    #[test]
    fn fixed_times() {
        assert_eq!(at(1, 30) - base_time(), Duration::minutes(90));
        assert_eq!(goal("G1", "x").created_at, base_time());
        assert_eq!(weekday_mornings().weekly_minutes(), 5 * 180);
    }

    #[test]
    fn durable_store_reopens() {
        let test = TestStore::new();
        seed(
            &*test,
            at(9, 0),
            vec![goal("G1", "Fitness").into(), task("T1", "G1", "Run").into()],
        );

        let reopened = test.reopen();
        let task = reopened.get(EntityKind::Task, "T1").unwrap().unwrap();
        assert!(task.needs_sync());
        assert_eq!(task.meta().modified_at, at(9, 0));
    }
}
