//! # goalsync testkit
//!
//! Test utilities for goalsync.
//!
//! This crate provides:
//! - Entity builders and fixed timestamps
//! - Temporary durable stores
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use goalsync_testkit::prelude::*;
//!
//! #[test]
//! fn dirty_goal() {
//!     let store = goalsync_core::LocalStore::open_in_memory();
//!     store.save_at(goal("G1", "Fitness").into(), at(9, 0)).unwrap();
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;
