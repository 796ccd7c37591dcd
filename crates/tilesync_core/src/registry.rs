//! Authoritative tile registry.

use crate::coord::TileCoord;
use crate::dimension::DimensionId;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

/// In-memory index of every stored tile and its latest timestamp.
///
/// The registry is the server's source of truth for reconciliation. It is
/// rebuilt from storage at startup and must only hold coordinates that
/// have a backing record.
///
/// # Thread Safety
///
/// Readers never block each other. Writers exclude other writers; a reader
/// racing a writer may observe the value from just before the write.
#[derive(Debug, Default)]
pub struct TileRegistry {
    tiles: RwLock<HashMap<TileCoord, i64>>,
}

impl TileRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry from a rebuilt storage index.
    pub fn from_index(index: HashMap<TileCoord, i64>) -> Self {
        Self {
            tiles: RwLock::new(index),
        }
    }

    /// Adds or updates a tile.
    pub fn put(&self, coord: TileCoord, timestamp: i64) {
        self.tiles.write().insert(coord, timestamp);
    }

    /// Removes a tile. Returns true if it was present.
    pub fn remove(&self, coord: &TileCoord) -> bool {
        self.tiles.write().remove(coord).is_some()
    }

    /// Returns true if the tile is present.
    pub fn contains(&self, coord: &TileCoord) -> bool {
        self.tiles.read().contains_key(coord)
    }

    /// Returns the stored timestamp of a tile.
    pub fn timestamp(&self, coord: &TileCoord) -> Option<i64> {
        self.tiles.read().get(coord).copied()
    }

    /// Returns the number of tiles.
    pub fn len(&self) -> usize {
        self.tiles.read().len()
    }

    /// Returns true if the registry holds no tiles.
    pub fn is_empty(&self) -> bool {
        self.tiles.read().is_empty()
    }

    /// Removes every tile.
    pub fn clear(&self) {
        self.tiles.write().clear();
    }

    /// Replaces the whole index, e.g. after a storage rescan.
    pub fn replace_all(&self, index: HashMap<TileCoord, i64>) {
        *self.tiles.write() = index;
    }

    /// The last-write-wins predicate.
    ///
    /// Returns true if the tile is absent or `timestamp` is strictly greater
    /// than the stored one. Equal timestamps are not newer, so the incumbent
    /// keeps the tile.
    pub fn is_newer(&self, coord: &TileCoord, timestamp: i64) -> bool {
        match self.tiles.read().get(coord) {
            Some(&existing) => timestamp > existing,
            None => true,
        }
    }

    /// Returns a point-in-time copy, ordered by coordinate.
    ///
    /// Paging over the returned vector neither skips nor duplicates entries,
    /// whatever writes happen concurrently.
    pub fn snapshot(&self) -> Vec<(TileCoord, i64)> {
        let mut entries: Vec<_> = self
            .tiles
            .read()
            .iter()
            .map(|(coord, ts)| (coord.clone(), *ts))
            .collect();
        entries.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// Returns every tile of one dimension.
    pub fn for_dimension(&self, dimension: &DimensionId) -> HashMap<TileCoord, i64> {
        self.tiles
            .read()
            .iter()
            .filter(|(coord, _)| &coord.dimension == dimension)
            .map(|(coord, ts)| (coord.clone(), *ts))
            .collect()
    }

    /// Counts tiles per dimension.
    pub fn count_by_dimension(&self) -> BTreeMap<DimensionId, usize> {
        let mut counts = BTreeMap::new();
        for coord in self.tiles.read().keys() {
            *counts.entry(coord.dimension.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// Oldest stored timestamp.
    pub fn oldest(&self) -> Option<i64> {
        self.tiles.read().values().copied().min()
    }

    /// Newest stored timestamp.
    pub fn newest(&self) -> Option<i64> {
        self.tiles.read().values().copied().max()
    }
}
