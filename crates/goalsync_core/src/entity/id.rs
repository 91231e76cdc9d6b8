//! Entity identifiers.
//!
//! Identifiers are plain strings so the same value can be used verbatim as the
//! remote record name. Goals, tasks and purchases get a client-generated UUID;
//! the profile id is derived from the account's remote user id.

use uuid::Uuid;

/// Creates a new random entity identifier.
#[must_use]
pub fn new_entity_id() -> String {
    Uuid::new_v4().to_string()
}

/// Derives the local profile identifier from the remote account user id.
///
/// Remote user ids carry a leading underscore (`_3f9c...`); the profile id is
/// the same value with that prefix removed, so every device signed into the
/// account derives the same id.
#[must_use]
pub fn profile_id_for_account(account_user_id: &str) -> String {
    account_user_id.trim_start_matches('_').to_string()
}
