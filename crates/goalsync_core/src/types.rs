//! Core type definitions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The kinds of entity that are mirrored to the remote record store.
///
/// The declaration order is the dependency order: a `Task` is only pushed or
/// pulled after the `Goal` it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    /// The account's profile (one per account).
    UserProfile,
    /// A goal owning zero or more tasks.
    Goal,
    /// A task belonging to a goal.
    Task,
    /// An item bought with reward points.
    PurchasedItem,
}

impl EntityKind {
    /// All kinds, in dependency order.
    pub const ALL: [EntityKind; 4] = [
        EntityKind::UserProfile,
        EntityKind::Goal,
        EntityKind::Task,
        EntityKind::PurchasedItem,
    ];

    /// Returns the remote record type name for this kind.
    pub fn record_type(&self) -> &'static str {
        match self {
            EntityKind::UserProfile => "UserProfile",
            EntityKind::Goal => "Goal",
            EntityKind::Task => "Task",
            EntityKind::PurchasedItem => "PurchasedItem",
        }
    }

    /// Returns the kind this one depends on, if any.
    pub fn parent(&self) -> Option<EntityKind> {
        match self {
            EntityKind::Task => Some(EntityKind::Goal),
            _ => None,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.record_type())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityKind::ALL
            .into_iter()
            .find(|kind| kind.record_type() == s)
            .ok_or_else(|| format!("unknown record type: {s}"))
    }
}

/// Server change token marking a position in a kind's remote change log.
///
/// Tokens are opaque to the client apart from ordering; the pull checkpoint for
/// a kind is the token returned with the last fully applied batch.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ChangeToken(pub u64);

impl ChangeToken {
    /// Creates a new change token.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ChangeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "token:{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_order_puts_goal_before_task() {
        let goal = EntityKind::ALL.iter().position(|k| *k == EntityKind::Goal);
        let task = EntityKind::ALL.iter().position(|k| *k == EntityKind::Task);
        assert!(goal < task);
        assert_eq!(EntityKind::Task.parent(), Some(EntityKind::Goal));
        assert_eq!(EntityKind::Goal.parent(), None);
    }

    #[test]
    fn record_type_parse() {
        for kind in EntityKind::ALL {
            assert_eq!(kind.record_type().parse::<EntityKind>(), Ok(kind));
        }
        assert!("Reward".parse::<EntityKind>().is_err());
    }

    #[test]
    fn change_token_ordering() {
        assert!(ChangeToken::new(3) > ChangeToken::new(2));
        assert_eq!(ChangeToken::new(7).to_string(), "token:7");
    }
}
