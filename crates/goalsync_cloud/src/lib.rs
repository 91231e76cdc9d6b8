//! # goalsync cloud
//!
//! Reference in-memory cloud record store for goalsync.
//!
//! This crate provides:
//! - A record zone with change tags and optimistic concurrency
//! - A per-kind change log with tombstones, served in token-resumable batches
//! - Change subscriptions and push fan-out to other devices
//! - Per-device fault injection (offline, signed out, rejected records, latency)
//!
//! # Architecture
//!
//! One [`CloudServer`] holds one account. Each device connects and gets its
//! own [`CloudClient`], which implements the remote record client contract
//! the sync engine talks to, and a channel of push payloads.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod client;
mod config;
mod error;
mod faults;
mod server;
mod zone;

pub use client::CloudClient;
pub use config::ServerConfig;
pub use error::{CloudError, CloudResult};
pub use faults::FaultInjector;
pub use server::CloudServer;
pub use zone::RecordZone;
