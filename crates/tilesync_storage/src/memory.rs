//! In-memory tile store for testing.

use crate::backend::TileStore;
use crate::error::StorageResult;
use crate::record::TileRecord;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use tilesync_core::{TileCoord, TileMetadata};
use uuid::Uuid;

/// An in-memory tile store.
///
/// Suitable for unit and integration tests. Writes can be made to fail on
/// demand to exercise error paths of callers.
///
/// # Example
///
/// ```rust
/// use tilesync_core::{DimensionId, TileCoord};
/// use tilesync_storage::{InMemoryTileStore, TileStore};
/// use uuid::Uuid;
///
/// let store = InMemoryTileStore::new();
/// let coord = TileCoord::new(DimensionId::minecraft("overworld").unwrap(), 1, 2);
/// store.write(&coord, Uuid::nil(), 10, b"abc").unwrap();
/// assert_eq!(store.rebuild_index().unwrap()[&coord], 10);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryTileStore {
    records: RwLock<HashMap<TileCoord, TileRecord>>,
    fail_writes: AtomicBool,
}

impl InMemoryTileStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store with pre-existing records.
    #[must_use]
    pub fn with_records(records: HashMap<TileCoord, TileRecord>) -> Self {
        Self {
            records: RwLock::new(records),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Makes subsequent writes and deletes fail with an I/O error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Returns the number of stored records.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns true if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    fn check_writable(&self) -> io::Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(io::Error::other("simulated write failure"));
        }
        Ok(())
    }
}

impl TileStore for InMemoryTileStore {
    fn exists(&self, coord: &TileCoord) -> bool {
        self.records.read().contains_key(coord)
    }

    fn read_metadata(&self, coord: &TileCoord) -> StorageResult<Option<TileMetadata>> {
        Ok(self.records.read().get(coord).map(|r| r.metadata))
    }

    fn read_record(&self, coord: &TileCoord) -> StorageResult<Option<TileRecord>> {
        Ok(self.records.read().get(coord).cloned())
    }

    fn write(
        &self,
        coord: &TileCoord,
        contributor: Uuid,
        timestamp: i64,
        payload: &[u8],
    ) -> StorageResult<()> {
        self.check_writable()?;
        let record = TileRecord::new(TileMetadata::new(contributor, timestamp), payload.to_vec());
        self.records.write().insert(coord.clone(), record);
        Ok(())
    }

    fn delete(&self, coord: &TileCoord) -> StorageResult<bool> {
        self.check_writable()?;
        Ok(self.records.write().remove(coord).is_some())
    }

    fn rebuild_index(&self) -> StorageResult<HashMap<TileCoord, i64>> {
        Ok(self
            .records
            .read()
            .iter()
            .map(|(coord, record)| (coord.clone(), record.metadata.timestamp))
            .collect())
    }
}
