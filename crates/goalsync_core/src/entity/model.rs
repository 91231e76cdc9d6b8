//! Entity models.

use super::schedule::ProductiveHours;
use crate::types::EntityKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sync bookkeeping carried by every syncable entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncMeta {
    /// True while a local mutation has not been confirmed saved remotely.
    pub needs_sync: bool,
    /// Wall-clock time of the last mutation, local or adopted from remote.
    pub modified_at: DateTime<Utc>,
    /// Local revision, bumped on every write to the entity.
    pub local_revision: u64,
    /// Change tag of the last remote version this entity was based on.
    pub server_change_tag: Option<String>,
}

impl Default for SyncMeta {
    fn default() -> Self {
        Self {
            needs_sync: false,
            modified_at: DateTime::UNIX_EPOCH,
            local_revision: 0,
            server_change_tag: None,
        }
    }
}

/// The account's profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Derived from the account user id, see [`crate::profile_id_for_account`].
    pub id: String,
    /// Display name.
    pub username: String,
    /// Reward points balance.
    pub points: i64,
    /// Weekly productive-hours schedule.
    pub productive_hours: ProductiveHours,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Sync metadata.
    #[serde(default)]
    pub meta: SyncMeta,
}

impl UserProfile {
    /// Creates a profile with no points and an empty schedule.
    pub fn new(id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            points: 0,
            productive_hours: ProductiveHours::default(),
            created_at: Utc::now(),
            meta: SyncMeta::default(),
        }
    }
}

/// A goal the user works toward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    /// Client-generated identifier.
    pub id: String,
    /// Goal name.
    pub name: String,
    /// Free-form description.
    pub details: String,
    /// Whether this is the currently selected goal.
    pub is_selected: bool,
    /// Completion ratio in `0.0..=1.0`.
    pub progress: f64,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Sync metadata.
    #[serde(default)]
    pub meta: SyncMeta,
}

impl Goal {
    /// Creates an unselected goal with no progress.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            details: String::new(),
            is_selected: false,
            progress: 0.0,
            created_at: Utc::now(),
            meta: SyncMeta::default(),
        }
    }
}

/// A task belonging to a goal.
///
/// The goal is referenced by id only. The store owns tasks through their
/// goal, so deleting the goal deletes its tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Client-generated identifier.
    pub id: String,
    /// Owning goal.
    pub goal_id: String,
    /// Task name.
    pub name: String,
    /// Planned focus duration in seconds.
    pub duration_seconds: i64,
    /// When the task is scheduled.
    pub scheduled_at: DateTime<Utc>,
    /// Completion flag.
    pub is_completed: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Sync metadata.
    #[serde(default)]
    pub meta: SyncMeta,
}

impl Task {
    /// Creates an incomplete task scheduled now.
    pub fn new(
        id: impl Into<String>,
        goal_id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            goal_id: goal_id.into(),
            name: name.into(),
            duration_seconds: 0,
            scheduled_at: now,
            is_completed: false,
            created_at: now,
            meta: SyncMeta::default(),
        }
    }
}

/// An item bought with reward points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchasedItem {
    /// Client-generated identifier.
    pub id: String,
    /// Item name.
    pub name: String,
    /// Points spent.
    pub cost_points: i64,
    /// Purchase time.
    pub purchased_at: DateTime<Utc>,
    /// Sync metadata.
    #[serde(default)]
    pub meta: SyncMeta,
}

impl PurchasedItem {
    /// Creates a purchase made now.
    pub fn new(id: impl Into<String>, name: impl Into<String>, cost_points: i64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            cost_points,
            purchased_at: Utc::now(),
            meta: SyncMeta::default(),
        }
    }
}

/// Any syncable entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Entity {
    /// A user profile.
    UserProfile(UserProfile),
    /// A goal.
    Goal(Goal),
    /// A task.
    Task(Task),
    /// A purchased item.
    PurchasedItem(PurchasedItem),
}

impl Entity {
    /// Returns the kind of this entity.
    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::UserProfile(_) => EntityKind::UserProfile,
            Entity::Goal(_) => EntityKind::Goal,
            Entity::Task(_) => EntityKind::Task,
            Entity::PurchasedItem(_) => EntityKind::PurchasedItem,
        }
    }

    /// Returns the identifier.
    pub fn id(&self) -> &str {
        match self {
            Entity::UserProfile(e) => &e.id,
            Entity::Goal(e) => &e.id,
            Entity::Task(e) => &e.id,
            Entity::PurchasedItem(e) => &e.id,
        }
    }

    /// Returns the sync metadata.
    pub fn meta(&self) -> &SyncMeta {
        match self {
            Entity::UserProfile(e) => &e.meta,
            Entity::Goal(e) => &e.meta,
            Entity::Task(e) => &e.meta,
            Entity::PurchasedItem(e) => &e.meta,
        }
    }

    /// Returns the sync metadata mutably.
    pub fn meta_mut(&mut self) -> &mut SyncMeta {
        match self {
            Entity::UserProfile(e) => &mut e.meta,
            Entity::Goal(e) => &mut e.meta,
            Entity::Task(e) => &mut e.meta,
            Entity::PurchasedItem(e) => &mut e.meta,
        }
    }

    /// Shorthand for `meta().needs_sync`.
    pub fn needs_sync(&self) -> bool {
        self.meta().needs_sync
    }

    /// Returns a copy with sync metadata reset, for comparing domain fields.
    pub fn without_meta(&self) -> Entity {
        let mut copy = self.clone();
        *copy.meta_mut() = SyncMeta::default();
        copy
    }

    /// Returns the goal id if this is a task.
    pub fn parent_goal_id(&self) -> Option<&str> {
        match self {
            Entity::Task(task) => Some(&task.goal_id),
            _ => None,
        }
    }
}

impl From<UserProfile> for Entity {
    fn from(value: UserProfile) -> Self {
        Entity::UserProfile(value)
    }
}

impl From<Goal> for Entity {
    fn from(value: Goal) -> Self {
        Entity::Goal(value)
    }
}

impl From<Task> for Entity {
    fn from(value: Task) -> Self {
        Entity::Task(value)
    }
}

impl From<PurchasedItem> for Entity {
    fn from(value: PurchasedItem) -> Self {
        Entity::PurchasedItem(value)
    }
}
