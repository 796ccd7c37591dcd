//! Local and server timestamp tracking.

use parking_lot::RwLock;
use std::collections::HashMap;
use tilesync_core::TileCoord;
use tilesync_protocol::RegistryEntry;

/// Tracks what this client has explored and what the server holds.
///
/// The local map records tiles explored or downloaded here; the server
/// map mirrors the registry as received over the current connection. The
/// two diff sets are the client's whole reconciliation decision.
///
/// Local history survives a disconnect, server knowledge does not.
#[derive(Debug, Default)]
pub struct ClientTracker {
    local: RwLock<HashMap<TileCoord, i64>>,
    server: RwLock<HashMap<TileCoord, i64>>,
}

impl ClientTracker {
    /// Creates an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that a tile was explored or downloaded at `timestamp`.
    pub fn record_local(&self, coord: TileCoord, timestamp: i64) {
        self.local.write().insert(coord, timestamp);
    }

    /// Records the server's timestamp for a tile.
    ///
    /// The server map only moves forward: an older timestamp than the one
    /// already known is ignored.
    pub fn record_server(&self, coord: TileCoord, timestamp: i64) {
        merge_newest(&mut self.server.write(), coord, timestamp);
    }

    /// Returns the local timestamp of a tile.
    pub fn local_timestamp(&self, coord: &TileCoord) -> Option<i64> {
        self.local.read().get(coord).copied()
    }

    /// Returns the last known server timestamp of a tile.
    pub fn server_timestamp(&self, coord: &TileCoord) -> Option<i64> {
        self.server.read().get(coord).copied()
    }

    /// Returns true if the local copy is newer than anything the server has.
    pub fn needs_upload(&self, coord: &TileCoord) -> bool {
        let Some(local) = self.local_timestamp(coord) else {
            return false;
        };
        self.server_timestamp(coord).map_or(true, |server| local > server)
    }

    /// Returns true if the server holds a newer copy than the local one.
    pub fn needs_download(&self, coord: &TileCoord) -> bool {
        let Some(server) = self.server_timestamp(coord) else {
            return false;
        };
        self.local_timestamp(coord).map_or(true, |local| server > local)
    }

    /// Tiles to upload, with their local timestamps.
    pub fn chunks_needing_upload(&self) -> HashMap<TileCoord, i64> {
        diff(&self.local.read(), &self.server.read())
    }

    /// Tiles to download, with their server timestamps.
    pub fn chunks_needing_download(&self) -> HashMap<TileCoord, i64> {
        diff(&self.server.read(), &self.local.read())
    }

    /// Applies the entries of one registry page.
    ///
    /// Applying the same page twice leaves the tracker unchanged. Pages
    /// come from the connect-time snapshot, so an entry older than a
    /// notice already received is ignored.
    pub fn apply_registry_page(&self, entries: &[RegistryEntry]) {
        let mut server = self.server.write();
        for entry in entries {
            merge_newest(&mut server, entry.coord.clone(), entry.timestamp);
        }
    }

    /// Drops both maps.
    pub fn clear(&self) {
        self.local.write().clear();
        self.server.write().clear();
    }

    /// Drops server knowledge and keeps local history.
    pub fn clear_server_knowledge(&self) {
        self.server.write().clear();
    }

    /// Number of locally known tiles.
    pub fn local_count(&self) -> usize {
        self.local.read().len()
    }

    /// Number of tiles known to be on the server.
    pub fn server_count(&self) -> usize {
        self.server.read().len()
    }
}

fn merge_newest(map: &mut HashMap<TileCoord, i64>, coord: TileCoord, timestamp: i64) {
    map.entry(coord).and_modify(|known| *known = (*known).max(timestamp)).or_insert(timestamp);
}

/// Entries of `ours` that `theirs` lacks or holds at an older timestamp.
fn diff(
    ours: &HashMap<TileCoord, i64>,
    theirs: &HashMap<TileCoord, i64>,
) -> HashMap<TileCoord, i64> {
    ours.iter()
        .filter(|(coord, ts)| theirs.get(*coord).map_or(true, |other| *ts > other))
        .map(|(coord, ts)| (coord.clone(), *ts))
        .collect()
}
