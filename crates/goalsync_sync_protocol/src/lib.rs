//! # goalsync sync protocol
//!
//! Remote record types and the record mapping for goalsync.
//!
//! This crate provides:
//! - [`RemoteRecord`] and its typed [`FieldValue`]s
//! - The record mapper ([`to_remote`] / [`from_remote`])
//! - The [`last_writer_wins`] conflict rule
//! - Push notification payloads and change subscriptions
//! - The [`RemoteRecordClient`] contract and its [`RemoteError`] taxonomy
//!
//! This is a pure protocol crate: nothing here performs I/O, the client
//! trait only describes what a remote store adapter must provide.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod change;
mod client;
mod conflict;
mod error;
pub mod mapper;
mod notification;
mod record;
mod subscription;

pub use change::{ChangeBatch, Tombstone};
pub use client::{ErrorClass, RemoteError, RemoteRecordClient, RemoteResult};
pub use conflict::{last_writer_wins, Conflict, ConflictPhase, ConflictResolution};
pub use error::{MapError, MapResult};
pub use mapper::{
    entity_id_from, from_remote, from_remote_of_kind, record_id_for, to_remote, Mapped,
    ParentResolver,
};
pub use notification::{MutationKind, RemoteNotification};
pub use record::{FieldValue, RecordId, RemoteRecord};
pub use subscription::Subscription;
