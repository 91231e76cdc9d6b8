//! Error types for the local entity store.

use crate::types::EntityKind;
use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in local store operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// I/O error while reading or writing the store file.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The store snapshot could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Entity not found.
    #[error("{kind} not found: {id}")]
    EntityNotFound {
        /// Kind that was searched.
        kind: EntityKind,
        /// The identifier that was not found.
        id: String,
    },

    /// A task references a goal that does not exist locally.
    #[error("task {task_id} references missing goal {goal_id}")]
    MissingParent {
        /// The task being written.
        task_id: String,
        /// The goal it points at.
        goal_id: String,
    },

    /// An entity was written with an empty identifier.
    #[error("{kind} has an empty identifier")]
    EmptyIdentifier {
        /// Kind of the offending entity.
        kind: EntityKind,
    },

    /// A pull operation targeted a different kind than its batch.
    #[error("pull batch for {batch} contains a {found} operation")]
    KindMismatch {
        /// Kind declared by the batch.
        batch: EntityKind,
        /// Kind of the operation.
        found: EntityKind,
    },
}

impl CoreError {
    /// Creates an entity-not-found error.
    pub fn not_found(kind: EntityKind, id: impl Into<String>) -> Self {
        Self::EntityNotFound {
            kind,
            id: id.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = CoreError::not_found(EntityKind::Goal, "G1");
        assert_eq!(err.to_string(), "Goal not found: G1");

        let err = CoreError::MissingParent {
            task_id: "T1".into(),
            goal_id: "G9".into(),
        };
        assert!(err.to_string().contains("G9"));
    }
}
