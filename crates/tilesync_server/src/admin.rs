//! Administrative queries and repairs.

use crate::error::ServerResult;
use crate::server::SyncServer;
use crate::session::SessionInfo;
use serde::Serialize;
use std::collections::BTreeMap;
use tilesync_core::TileCoord;
use tracing::{info, warn};
use uuid::Uuid;

/// Overall server status.
#[derive(Debug, Clone, Serialize)]
pub struct ServerStatus {
    /// Whether uploads are accepted.
    pub sync_enabled: bool,
    /// Tiles in the registry.
    pub registry_size: usize,
    /// Tiles per dimension, keyed by `namespace:path`.
    pub tiles_by_dimension: BTreeMap<String, usize>,
    /// Open sessions.
    pub sessions: usize,
    /// Configured upload rate.
    pub max_upload_per_sec: u32,
    /// Configured download rate.
    pub max_download_per_sec: u32,
}

/// Registry size and age range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    /// Tiles in the registry.
    pub size: usize,
    /// Oldest stored timestamp.
    pub oldest: Option<i64>,
    /// Newest stored timestamp.
    pub newest: Option<i64>,
}

/// Details of one stored tile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TileInfo {
    /// Tile coordinate.
    pub coord: TileCoord,
    /// Timestamp from the record header.
    pub timestamp: i64,
    /// Last contributor.
    pub contributor: Uuid,
    /// Payload size in bytes.
    pub payload_size: usize,
    /// Timestamp the registry holds, if indexed.
    pub registry_timestamp: Option<i64>,
}

impl SyncServer {
    /// Returns the overall status.
    pub fn status(&self) -> ServerStatus {
        let config = self.config();
        ServerStatus {
            sync_enabled: config.sync_enabled,
            registry_size: self.registry().len(),
            tiles_by_dimension: self
                .registry()
                .count_by_dimension()
                .into_iter()
                .map(|(dimension, count)| (dimension.to_string(), count))
                .collect(),
            sessions: self.session_count(),
            max_upload_per_sec: config.max_upload_per_sec,
            max_download_per_sec: config.max_download_per_sec,
        }
    }

    /// Returns registry size and age range.
    pub fn registry_stats(&self) -> RegistryStats {
        let registry = self.registry();
        RegistryStats {
            size: registry.len(),
            oldest: registry.oldest(),
            newest: registry.newest(),
        }
    }

    /// Returns details of one session.
    pub fn session_info(&self, player_id: Uuid) -> Option<SessionInfo> {
        self.session(player_id).ok().map(|s| s.lock().info())
    }

    /// Returns details of every session.
    pub fn sessions(&self) -> Vec<SessionInfo> {
        let mut infos: Vec<_> = self
            .all_sessions()
            .iter()
            .map(|s| s.lock().info())
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    /// Reads a tile's header and payload size.
    ///
    /// # Errors
    ///
    /// Returns an error if the record exists but cannot be read.
    pub fn tile_info(&self, coord: &TileCoord) -> ServerResult<Option<TileInfo>> {
        let Some(record) = self.store().read_record(coord)? else {
            return Ok(None);
        };
        Ok(Some(TileInfo {
            coord: coord.clone(),
            timestamp: record.metadata.timestamp,
            contributor: record.metadata.contributor,
            payload_size: record.payload.len(),
            registry_timestamp: self.registry().timestamp(coord),
        }))
    }

    /// Deletes a tile from storage, then from the registry.
    ///
    /// Returns false without touching the registry when storage had no
    /// record, so an index-only entry cannot be removed this way.
    ///
    /// # Errors
    ///
    /// Returns an error if the record exists but cannot be removed.
    pub fn delete_tile(&self, coord: &TileCoord) -> ServerResult<bool> {
        let context = self.context();
        let deleted = context.with_write_lock(|| -> ServerResult<bool> {
            if !context.store.delete(coord)? {
                return Ok(false);
            }
            context.registry.remove(coord);
            Ok(true)
        })?;

        if deleted {
            info!(%coord, "tile deleted");
        } else {
            warn!(%coord, "delete requested for tile with no stored record");
        }
        Ok(deleted)
    }

    /// Replaces the registry with a fresh scan of storage.
    ///
    /// Returns the number of indexed tiles.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be scanned. The registry is left
    /// unchanged in that case.
    pub fn reindex(&self) -> ServerResult<usize> {
        let context = self.context();
        let count = context.with_write_lock(|| -> ServerResult<usize> {
            let index = context.store.rebuild_index()?;
            let count = index.len();
            context.registry.replace_all(index);
            Ok(count)
        })?;
        info!(tiles = count, "registry reindexed");
        Ok(count)
    }
}
