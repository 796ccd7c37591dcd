//! # tilesync Core
//!
//! Shared model for replicating explored map tiles between many clients and
//! one authoritative server.
//!
//! This crate provides:
//! - [`DimensionId`] and [`TileCoord`], the coordinate space
//! - [`TileMetadata`], the 28-byte header in front of every stored tile
//! - [`RateLimiter`], a lock-free token bucket
//! - [`TimestampValidator`], clock-skew bounds for peer timestamps
//! - [`TileRegistry`], the server's coordinate → timestamp index
//!
//! ## Reconciliation rule
//!
//! Tiles are reconciled last-write-wins on millisecond timestamps. A write
//! is accepted only if its timestamp is strictly greater than the stored
//! one ([`TileRegistry::is_newer`]).

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod coord;
mod dimension;
mod error;
mod metadata;
mod rate_limiter;
mod registry;
mod timestamp;

pub use coord::{TileCoord, REGION_SIZE};
pub use dimension::{DimensionId, DEFAULT_NAMESPACE};
pub use error::{CoreError, CoreResult};
pub use metadata::{TileMetadata, FORMAT_VERSION, HEADER_SIZE};
pub use rate_limiter::RateLimiter;
pub use registry::TileRegistry;
pub use timestamp::{now_millis, TimestampValidator, EPOCH_FLOOR_MS, MAX_FUTURE_DRIFT_MS};
