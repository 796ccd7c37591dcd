//! Test fixtures and store helpers.
//!
//! Provides convenience functions for setting up tile stores and common
//! coordinates.

use std::sync::Arc;
use tempfile::TempDir;
use tilesync_core::{now_millis, DimensionId, TileCoord};
use tilesync_storage::{FileTileStore, InMemoryTileStore, TileStore};
use uuid::Uuid;

/// A file-backed store in a temporary directory.
pub struct TestStore {
    /// The store instance.
    pub store: Arc<FileTileStore>,
    /// The temporary directory (kept alive to prevent cleanup).
    pub dir: TempDir,
}

impl TestStore {
    /// Opens a store in a fresh temporary directory.
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let store = FileTileStore::open(dir.path()).expect("Failed to open tile store");
        Self {
            store: Arc::new(store),
            dir,
        }
    }

    /// The store as a trait object.
    pub fn as_dyn(&self) -> Arc<dyn TileStore> {
        Arc::clone(&self.store) as Arc<dyn TileStore>
    }
}

impl Default for TestStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestStore {
    type Target = FileTileStore;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

/// The overworld dimension.
pub fn overworld() -> DimensionId {
    DimensionId::minecraft("overworld").expect("valid dimension")
}

/// The nether dimension.
pub fn the_nether() -> DimensionId {
    DimensionId::minecraft("the_nether").expect("valid dimension")
}

/// An overworld tile.
pub fn tile(x: i32, z: i32) -> TileCoord {
    TileCoord::new(overworld(), x, z)
}

/// A nether tile.
pub fn nether_tile(x: i32, z: i32) -> TileCoord {
    TileCoord::new(the_nether(), x, z)
}

/// A timestamp `ago_ms` milliseconds in the past.
///
/// Recent timestamps pass validation without being clamped.
pub fn recent_timestamp(ago_ms: i64) -> i64 {
    now_millis() - ago_ms
}

/// A deterministic payload for a tile.
pub fn payload_for(coord: &TileCoord, len: usize) -> Vec<u8> {
    let seed = (coord.x as u8) ^ (coord.z as u8).rotate_left(4);
    (0..len).map(|i| seed.wrapping_add(i as u8)).collect()
}

/// An in-memory store holding the given tiles.
pub fn seeded_memory_store(tiles: &[(TileCoord, i64)]) -> Arc<InMemoryTileStore> {
    let store = Arc::new(InMemoryTileStore::new());
    for (coord, timestamp) in tiles {
        store
            .write(coord, Uuid::nil(), *timestamp, &payload_for(coord, 16))
            .expect("Failed to seed store");
    }
    store
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// A store with a `width` by `width` square of overworld tiles.
    pub fn populated_store(width: i32) -> TestStore {
        let test_store = TestStore::new();
        let contributor = Uuid::new_v4();
        for x in 0..width {
            for z in 0..width {
                let coord = tile(x, z);
                test_store
                    .write(&coord, contributor, recent_timestamp(60_000), &payload_for(&coord, 64))
                    .expect("Failed to write tile");
            }
        }
        test_store
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_round_trip() {
        let test_store = TestStore::new();
        test_store.write(&tile(0, 0), Uuid::nil(), 5, b"x").unwrap();
        assert!(test_store.exists(&tile(0, 0)));
        assert!(test_store.dir.path().exists());
    }

    #[test]
    fn test_populated_scenario() {
        let test_store = scenarios::populated_store(3);
        assert_eq!(test_store.rebuild_index().unwrap().len(), 9);
    }

    #[test]
    fn test_seeded_memory_store() {
        let store = seeded_memory_store(&[(tile(1, 1), 10), (nether_tile(0, 0), 20)]);
        assert_eq!(store.len(), 2);
        assert_eq!(store.read_metadata(&tile(1, 1)).unwrap().unwrap().timestamp, 10);
    }

    #[test]
    fn test_payloads_are_deterministic() {
        assert_eq!(payload_for(&tile(2, 3), 8), payload_for(&tile(2, 3), 8));
        assert_ne!(payload_for(&tile(2, 3), 8), payload_for(&tile(3, 2), 8));
    }
}
