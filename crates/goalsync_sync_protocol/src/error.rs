//! Record mapping errors.

use goalsync_core::EntityKind;
use thiserror::Error;

/// Result type for record mapping.
pub type MapResult<T> = Result<T, MapError>;

/// A remote record that cannot be mapped to an entity at all.
///
/// Missing or mistyped fields are not errors, they fall back to defaults.
/// These variants cover records with no usable identity.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MapError {
    /// The record has an empty identifier.
    #[error("{kind} record has no identifier")]
    MissingIdentifier {
        /// Kind of the record.
        kind: EntityKind,
    },

    /// A profile record name without the profile prefix.
    #[error("profile record name {record_id:?} lacks the UserProfile_ prefix")]
    InvalidProfileIdentifier {
        /// The offending record name.
        record_id: String,
    },

    /// The record is of a different kind than requested.
    #[error("expected a {expected} record, got {found}")]
    UnexpectedKind {
        /// Requested kind.
        expected: EntityKind,
        /// Kind on the record.
        found: EntityKind,
    },
}
