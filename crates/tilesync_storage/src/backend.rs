//! Tile store trait definition.

use crate::error::StorageResult;
use crate::record::TileRecord;
use std::collections::HashMap;
use tilesync_core::{TileCoord, TileMetadata};
use uuid::Uuid;

/// A store holding one record per tile coordinate.
///
/// Stores treat payloads as opaque bytes. Size policy belongs to callers.
///
/// # Invariants
///
/// - `write` is atomic: a reader sees either the previous record or the new
///   one, never a partial file
/// - `delete` returns `Ok(false)` when there is nothing to remove
/// - `rebuild_index` reads headers only and returns one entry per readable
///   record
/// - Readers never block each other; a writer excludes readers and other
///   writers of the same store
///
/// # Implementors
///
/// - [`super::FileTileStore`] - Durable storage under a root directory
/// - [`super::InMemoryTileStore`] - For testing
pub trait TileStore: Send + Sync {
    /// Returns true if a record exists for `coord`.
    fn exists(&self, coord: &TileCoord) -> bool;

    /// Reads only the header of a record.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure or a corrupt header. A missing record
    /// is `Ok(None)`.
    fn read_metadata(&self, coord: &TileCoord) -> StorageResult<Option<TileMetadata>>;

    /// Reads a full record.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure or a corrupt header. A missing record
    /// is `Ok(None)`.
    fn read_record(&self, coord: &TileCoord) -> StorageResult<Option<TileRecord>>;

    /// Writes or replaces a record.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be made durable. The previous
    /// record, if any, is left intact.
    fn write(
        &self,
        coord: &TileCoord,
        contributor: Uuid,
        timestamp: i64,
        payload: &[u8],
    ) -> StorageResult<()>;

    /// Deletes a record. Returns true if one was removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the record exists but cannot be removed.
    fn delete(&self, coord: &TileCoord) -> StorageResult<bool>;

    /// Scans every record header and returns `coordinate → timestamp`.
    ///
    /// # Errors
    ///
    /// Returns an error only if the store as a whole cannot be scanned.
    /// Individual unreadable records are skipped.
    fn rebuild_index(&self) -> StorageResult<HashMap<TileCoord, i64>>;
}
