//! Server-side change subscriptions.

use crate::notification::MutationKind;
use goalsync_core::EntityKind;
use serde::{Deserialize, Serialize};

const ID_SUFFIX: &str = "-changes";

/// A registration that makes the server notify this account's devices when a
/// record of `kind` changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    /// Well-known identifier, one per kind.
    pub id: String,
    /// Record type watched.
    pub kind: EntityKind,
    /// Mutations that fire it.
    pub fires_on: Vec<MutationKind>,
    /// Silent notifications wake the app without an alert.
    pub silent: bool,
}

impl Subscription {
    /// The standard subscription for a kind: every mutation, silent.
    pub fn for_kind(kind: EntityKind) -> Self {
        Self {
            id: Self::well_known_id(kind),
            kind,
            fires_on: MutationKind::ALL.to_vec(),
            silent: true,
        }
    }

    /// The well-known id for a kind, e.g. `goal-changes`.
    pub fn well_known_id(kind: EntityKind) -> String {
        format!("{}{ID_SUFFIX}", kind.record_type().to_ascii_lowercase())
    }

    /// Maps a well-known id back to its kind.
    pub fn kind_for_id(id: &str) -> Option<EntityKind> {
        EntityKind::ALL
            .into_iter()
            .find(|kind| Self::well_known_id(*kind) == id)
    }

    /// Returns true if a mutation fires this subscription.
    pub fn fires_for(&self, mutation: MutationKind) -> bool {
        self.fires_on.contains(&mutation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_known_ids_round_trip() {
        assert_eq!(Subscription::well_known_id(EntityKind::PurchasedItem), "purchaseditem-changes");
        for kind in EntityKind::ALL {
            assert_eq!(Subscription::kind_for_id(&Subscription::well_known_id(kind)), Some(kind));
        }
        assert_eq!(Subscription::kind_for_id("reward-changes"), None);
    }

    #[test]
    fn standard_subscription_is_silent_and_fires_on_everything() {
        let sub = Subscription::for_kind(EntityKind::Task);
        assert!(sub.silent);
        assert!(MutationKind::ALL.into_iter().all(|m| sub.fires_for(m)));
    }
}
