//! # tilesync Storage
//!
//! Durable tile storage for the tilesync server.
//!
//! Stores hold one record per [`tilesync_core::TileCoord`]: a 28-byte
//! [`tilesync_core::TileMetadata`] header followed by opaque payload bytes.
//! Payloads are never interpreted here.
//!
//! ## Available Stores
//!
//! - [`FileTileStore`] - One file per tile under a root directory
//! - [`InMemoryTileStore`] - For testing
//!
//! ## Example
//!
//! ```rust
//! use tilesync_core::{DimensionId, TileCoord};
//! use tilesync_storage::{InMemoryTileStore, TileStore};
//! use uuid::Uuid;
//!
//! let store = InMemoryTileStore::new();
//! let coord = TileCoord::new(DimensionId::minecraft("overworld").unwrap(), 0, 0);
//! store.write(&coord, Uuid::nil(), 1, b"hello").unwrap();
//! let record = store.read_record(&coord).unwrap().unwrap();
//! assert_eq!(record.payload, b"hello");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;
mod record;

pub use backend::TileStore;
pub use error::{StorageError, StorageResult};
pub use file::{FileTileStore, ScanProblem, VerifyReport, LOCK_FILE_NAME};
pub use memory::InMemoryTileStore;
pub use record::TileRecord;
