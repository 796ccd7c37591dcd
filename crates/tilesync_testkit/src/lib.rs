//! # tilesync Testkit
//!
//! Test utilities for tilesync.
//!
//! This crate provides:
//! - Temporary file stores and seeded in-memory stores
//! - Coordinate, timestamp and payload helpers
//! - Property-based test generators using proptest
//! - Helpers for racing work across threads
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tilesync_testkit::prelude::*;
//!
//! #[test]
//! fn test_with_store() {
//!     let store = TestStore::new();
//!     store.write(&tile(0, 0), Uuid::nil(), recent_timestamp(0), b"map")?;
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
}

pub use fixtures::*;
pub use generators::*;
pub use stress::*;
