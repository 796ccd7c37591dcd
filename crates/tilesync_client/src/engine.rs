//! Client sync engine.

use crate::config::ClientConfig;
use crate::error::{SyncError, SyncResult};
use crate::tracker::ClientTracker;
use crate::transport::ClientTransport;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tilesync_core::{RateLimiter, TileCoord};
use tilesync_protocol::{
    DownloadRequest, ProtocolError, RegistryPage, SyncConfigMessage, SyncMessage, TileData,
    UploadRequest, UploadResult, UploadResultCode, HARD_MAX_PAYLOAD_SIZE,
};
use tracing::{debug, info, warn};

/// Connection phase as seen from the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// No server configuration received yet.
    Disconnected,
    /// Configuration received, registry pages still arriving.
    ReceivingRegistry,
    /// The full registry has been received.
    Synchronized,
}

impl ClientState {
    /// Returns true once the registry transfer has finished.
    pub fn is_synchronized(&self) -> bool {
        matches!(self, ClientState::Synchronized)
    }
}

/// Counters for client activity.
#[derive(Debug, Clone, Default)]
pub struct ClientStats {
    /// Registry pages applied.
    pub pages_received: u64,
    /// Registry update notices applied.
    pub updates_received: u64,
    /// Downloaded tiles handed to the sink.
    pub tiles_downloaded: u64,
    /// Downloaded tiles ignored because the local copy was newer.
    pub stale_downloads: u64,
    /// Upload requests sent.
    pub uploads_sent: u64,
    /// Uploads the server accepted.
    pub uploads_accepted: u64,
    /// Uploads the server rejected.
    pub uploads_rejected: u64,
    /// Download request messages sent.
    pub download_requests_sent: u64,
    /// Last error message.
    pub last_error: Option<String>,
}

/// Result of one [`ClientSyncEngine::sync`] round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncRoundResult {
    /// Upload requests sent.
    pub uploads_sent: usize,
    /// Coordinates requested for download.
    pub downloads_requested: usize,
}

/// Reads locally held tiles for upload.
pub trait TileSource: Send + Sync {
    /// Returns the payload of a tile, or `None` if it is no longer held.
    fn read_tile(&self, coord: &TileCoord) -> SyncResult<Option<Vec<u8>>>;
}

/// Receives tiles downloaded from the server.
pub trait TileSink: Send + Sync {
    /// Stores a downloaded tile.
    fn store_tile(&self, tile: &TileData) -> SyncResult<()>;
}

#[derive(Debug, Default)]
struct PageProgress {
    next_index: u32,
    total: Option<u32>,
}

/// The client half of the sync protocol.
///
/// Feeds server messages into a [`ClientTracker`] and turns the tracker's
/// diff sets into upload and download requests. The engine never blocks on
/// the network: outgoing messages go through the transport, incoming ones
/// are handed to [`ClientSyncEngine::handle_message`] by the host.
pub struct ClientSyncEngine<T: ClientTransport> {
    config: ClientConfig,
    transport: Arc<T>,
    source: Arc<dyn TileSource>,
    sink: Arc<dyn TileSink>,
    tracker: ClientTracker,
    state: RwLock<ClientState>,
    server_config: RwLock<Option<SyncConfigMessage>>,
    upload_limiter: RwLock<Option<RateLimiter>>,
    progress: Mutex<PageProgress>,
    /// Uploads awaiting a result, with the timestamp sent and when.
    in_flight: Mutex<HashMap<TileCoord, (i64, Instant)>>,
    /// Uploads refused for good at the given local timestamp.
    refused: Mutex<HashMap<TileCoord, i64>>,
    requested: Mutex<HashSet<TileCoord>>,
    stats: RwLock<ClientStats>,
}

impl<T: ClientTransport> ClientSyncEngine<T> {
    /// Creates a new engine.
    pub fn new(
        config: ClientConfig,
        transport: T,
        source: Arc<dyn TileSource>,
        sink: Arc<dyn TileSink>,
    ) -> Self {
        Self {
            config,
            transport: Arc::new(transport),
            source,
            sink,
            tracker: ClientTracker::new(),
            state: RwLock::new(ClientState::Disconnected),
            server_config: RwLock::new(None),
            upload_limiter: RwLock::new(None),
            progress: Mutex::new(PageProgress::default()),
            in_flight: Mutex::new(HashMap::new()),
            refused: Mutex::new(HashMap::new()),
            requested: Mutex::new(HashSet::new()),
            stats: RwLock::new(ClientStats::default()),
        }
    }

    /// Gets the current state.
    pub fn state(&self) -> ClientState {
        *self.state.read()
    }

    /// Gets the current stats.
    pub fn stats(&self) -> ClientStats {
        self.stats.read().clone()
    }

    /// The timestamp tracker.
    pub fn tracker(&self) -> &ClientTracker {
        &self.tracker
    }

    /// The transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// The last configuration pushed by the server.
    pub fn server_config(&self) -> Option<SyncConfigMessage> {
        self.server_config.read().clone()
    }

    /// Number of uploads awaiting a result.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().len()
    }

    /// Number of coordinates requested but not yet received.
    pub fn outstanding_downloads(&self) -> usize {
        self.requested.lock().len()
    }

    /// Records a tile explored locally.
    pub fn record_local(&self, coord: TileCoord, timestamp: i64) {
        self.tracker.record_local(coord, timestamp);
    }

    fn set_state(&self, state: ClientState) {
        *self.state.write() = state;
    }

    /// Decodes and handles one frame from the server.
    ///
    /// # Errors
    ///
    /// Returns an error for malformed frames, in addition to the errors of
    /// [`ClientSyncEngine::handle_message`].
    pub fn handle_frame(&self, frame: &[u8]) -> SyncResult<()> {
        let message = SyncMessage::decode(frame)?;
        self.handle_message(message)
    }

    /// Handles one message from the server.
    ///
    /// # Errors
    ///
    /// Returns an error for client-to-server message types, inconsistent
    /// registry pages, an unusable advertised rate and sink failures.
    pub fn handle_message(&self, message: SyncMessage) -> SyncResult<()> {
        let result = match message {
            SyncMessage::Config(config) => self.apply_server_config(config),
            SyncMessage::RegistryPage(page) => self.apply_registry_page(&page),
            SyncMessage::RegistryUpdate(entry) => {
                // A newer version may exist than the one requested.
                self.requested.lock().remove(&entry.coord);
                self.tracker.record_server(entry.coord, entry.timestamp);
                self.stats.write().updates_received += 1;
                Ok(())
            }
            SyncMessage::TileData(tile) => self.apply_tile(&tile),
            SyncMessage::UploadResult(result) => {
                self.apply_upload_result(&result);
                Ok(())
            }
            other @ (SyncMessage::UploadRequest(_) | SyncMessage::DownloadRequest(_)) => {
                Err(SyncError::UnexpectedMessage(other.name()))
            }
        };
        if let Err(e) = &result {
            self.stats.write().last_error = Some(e.to_string());
        }
        result
    }

    fn apply_server_config(&self, config: SyncConfigMessage) -> SyncResult<()> {
        let limiter = RateLimiter::new(config.max_upload_per_sec)?;
        info!(
            sync_enabled = config.sync_enabled,
            upload_rate = config.max_upload_per_sec,
            "server configuration received"
        );
        *self.upload_limiter.write() = Some(limiter);
        *self.server_config.write() = Some(config);

        if self.state() == ClientState::Disconnected {
            *self.progress.lock() = PageProgress::default();
            self.set_state(ClientState::ReceivingRegistry);
        }
        Ok(())
    }

    fn apply_registry_page(&self, page: &RegistryPage) -> SyncResult<()> {
        page.validate()?;
        let mut progress = self.progress.lock();

        if let Some(total) = progress.total {
            if total != page.total_batches {
                return Err(ProtocolError::InvalidBatch {
                    batch_index: page.batch_index,
                    total_batches: page.total_batches,
                    is_last_batch: page.is_last_batch,
                }
                .into());
            }
        }

        if page.batch_index < progress.next_index {
            debug!(batch = page.batch_index, "registry page repeated");
            self.tracker.apply_registry_page(&page.entries);
            return Ok(());
        }
        if page.batch_index > progress.next_index {
            return Err(SyncError::OutOfOrderPage {
                expected: progress.next_index,
                received: page.batch_index,
            });
        }

        self.tracker.apply_registry_page(&page.entries);
        progress.next_index += 1;
        progress.total = Some(page.total_batches);
        self.stats.write().pages_received += 1;

        if page.is_last_batch {
            self.set_state(ClientState::Synchronized);
            info!(
                pages = page.total_batches,
                server_tiles = self.tracker.server_count(),
                "registry transfer complete"
            );
        }
        Ok(())
    }

    fn apply_tile(&self, tile: &TileData) -> SyncResult<()> {
        self.requested.lock().remove(&tile.coord);

        if let Some(local) = self.tracker.local_timestamp(&tile.coord) {
            if local >= tile.timestamp {
                debug!(
                    coord = %tile.coord,
                    local,
                    remote = tile.timestamp,
                    "stale download ignored"
                );
                self.stats.write().stale_downloads += 1;
                return Ok(());
            }
        }

        self.sink.store_tile(tile)?;
        self.tracker.record_local(tile.coord.clone(), tile.timestamp);
        self.tracker.record_server(tile.coord.clone(), tile.timestamp);
        self.stats.write().tiles_downloaded += 1;
        Ok(())
    }

    fn apply_upload_result(&self, result: &UploadResult) {
        let Some(coord) = result.coord() else {
            warn!(dimension = %result.dimension, "upload result for unparsable dimension");
            return;
        };
        let Some((sent, _)) = self.in_flight.lock().remove(&coord) else {
            debug!(%coord, code = result.code.as_str(), "upload result with nothing in flight");
            return;
        };

        match result.code {
            UploadResultCode::Accepted => {
                self.tracker.record_server(coord, sent);
                self.stats.write().uploads_accepted += 1;
                return;
            }
            UploadResultCode::RejectedOutdated => {
                // The server holds at least this version.
                self.tracker.record_server(coord, sent);
            }
            code if code.is_transient() => {
                debug!(%coord, code = code.as_str(), "upload deferred");
            }
            code => {
                warn!(%coord, code = code.as_str(), message = %result.message, "upload refused");
                self.refused.lock().insert(coord, sent);
            }
        }
        self.stats.write().uploads_rejected += 1;
    }

    /// Builds upload requests for tiles the server lacks or holds older.
    ///
    /// Newest tiles go first. Tiles already in flight, tiles in a dimension
    /// the server refuses and tiles refused at their current timestamp are
    /// skipped. An upload unanswered for longer than the configured upload
    /// timeout is released and planned again. The round stops when the
    /// advertised upload rate is spent.
    /// Nothing is planned before the server's configuration arrives or
    /// while sync is disabled.
    ///
    /// # Errors
    ///
    /// Returns an error if the tile source fails.
    pub fn plan_uploads(&self) -> SyncResult<Vec<UploadRequest>> {
        let Some(server_config) = self.server_config() else {
            return Ok(Vec::new());
        };
        if !server_config.sync_enabled {
            return Ok(Vec::new());
        }
        let guard = self.upload_limiter.read();
        let Some(limiter) = guard.as_ref() else {
            return Ok(Vec::new());
        };

        self.expire_in_flight();
        let mut candidates: Vec<_> = self.tracker.chunks_needing_upload().into_iter().collect();
        candidates.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        let mut requests = Vec::new();
        for (coord, timestamp) in candidates {
            if requests.len() >= self.config.max_uploads_per_round || !limiter.can_acquire() {
                break;
            }
            if self.in_flight.lock().contains_key(&coord)
                || self.refused.lock().get(&coord) == Some(&timestamp)
                || !server_config.is_dimension_allowed(&coord.dimension)
            {
                continue;
            }

            let Some(payload) = self.source.read_tile(&coord)? else {
                debug!(%coord, "tile no longer held locally");
                continue;
            };
            if payload.len() > HARD_MAX_PAYLOAD_SIZE {
                warn!(%coord, size = payload.len(), "tile too large to upload");
                self.refused.lock().insert(coord, timestamp);
                continue;
            }
            if !limiter.try_acquire() {
                break;
            }

            self.in_flight.lock().insert(coord.clone(), (timestamp, Instant::now()));
            requests.push(UploadRequest::new(&coord, timestamp, payload));
        }
        Ok(requests)
    }

    fn expire_in_flight(&self) {
        let timeout = self.config.upload_timeout;
        self.in_flight.lock().retain(|coord, (timestamp, sent_at)| {
            let expired = sent_at.elapsed() >= timeout;
            if expired {
                debug!(%coord, timestamp = *timestamp, "upload result overdue, releasing");
            }
            !expired
        });
    }

    /// Builds download requests for tiles the server holds newer.
    ///
    /// Already requested tiles and refused dimensions are skipped, and the
    /// number of outstanding coordinates stays within the configured bound.
    pub fn plan_downloads(&self) -> Vec<DownloadRequest> {
        let Some(server_config) = self.server_config() else {
            return Vec::new();
        };
        let mut requested = self.requested.lock();
        let budget = self
            .config
            .max_outstanding_downloads
            .saturating_sub(requested.len());

        let mut wanted: Vec<_> = self
            .tracker
            .chunks_needing_download()
            .into_keys()
            .filter(|coord| {
                !requested.contains(coord) && server_config.is_dimension_allowed(&coord.dimension)
            })
            .collect();
        wanted.sort();
        wanted.truncate(budget);
        requested.extend(wanted.iter().cloned());

        wanted
            .chunks(self.config.download_batch_size.max(1))
            .map(|batch| DownloadRequest::new(batch.to_vec()))
            .collect()
    }

    /// Plans and sends uploads. Returns the number sent.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotConnected`] when the transport is down, or
    /// the first send failure. Unsent uploads are released for the next
    /// round.
    pub fn flush_uploads(&self) -> SyncResult<usize> {
        if !self.transport.is_connected() {
            return Err(SyncError::NotConnected);
        }
        let requests = self.plan_uploads()?;
        let mut pending = requests
            .iter()
            .map(UploadRequest::coord)
            .collect::<Result<Vec<_>, _>>()?;

        let mut sent = 0;
        for request in requests {
            if let Err(e) = self.transport.send(SyncMessage::UploadRequest(request)) {
                let mut in_flight = self.in_flight.lock();
                for coord in pending.drain(sent..) {
                    in_flight.remove(&coord);
                }
                return Err(e);
            }
            sent += 1;
        }
        self.stats.write().uploads_sent += sent as u64;
        Ok(sent)
    }

    /// Plans and sends download requests. Returns the number of
    /// coordinates requested.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotConnected`] when the transport is down, or
    /// the first send failure. Unsent coordinates are released.
    pub fn request_downloads(&self) -> SyncResult<usize> {
        if !self.transport.is_connected() {
            return Err(SyncError::NotConnected);
        }
        let batches = self.plan_downloads();
        let mut requested = 0;
        for (i, batch) in batches.iter().enumerate() {
            if let Err(e) = self
                .transport
                .send(SyncMessage::DownloadRequest(batch.clone()))
            {
                let mut outstanding = self.requested.lock();
                for coord in batches[i..].iter().flat_map(|b| &b.coords) {
                    outstanding.remove(coord);
                }
                return Err(e);
            }
            requested += batch.coords.len();
            self.stats.write().download_requests_sent += 1;
        }
        Ok(requested)
    }

    /// Runs one reconciliation round: downloads first, then uploads.
    ///
    /// # Errors
    ///
    /// Returns the first transport or tile source error.
    pub fn sync(&self) -> SyncResult<SyncRoundResult> {
        let result = self.request_downloads().and_then(|downloads_requested| {
            Ok(SyncRoundResult {
                downloads_requested,
                uploads_sent: self.flush_uploads()?,
            })
        });
        if let Err(e) = &result {
            warn!(error = %e, retryable = e.is_retryable(), "sync round failed");
            self.stats.write().last_error = Some(e.to_string());
        }
        result
    }

    /// Forgets outstanding download requests so they are planned again.
    ///
    /// The server drops requests when a queue is full, so hosts call this
    /// after a quiet period.
    pub fn forget_requested_downloads(&self) -> usize {
        let mut requested = self.requested.lock();
        let count = requested.len();
        requested.clear();
        count
    }

    /// Resets connection state. Local history is kept.
    pub fn on_disconnect(&self) {
        self.tracker.clear_server_knowledge();
        self.in_flight.lock().clear();
        self.refused.lock().clear();
        self.requested.lock().clear();
        *self.progress.lock() = PageProgress::default();
        *self.server_config.write() = None;
        *self.upload_limiter.write() = None;
        self.set_state(ClientState::Disconnected);
        info!(local_tiles = self.tracker.local_count(), "disconnected from server");
    }
}

/// An in-memory tile source and sink.
#[derive(Debug, Default)]
pub struct MemoryTileCache {
    tiles: RwLock<HashMap<TileCoord, (i64, Vec<u8>)>>,
}

impl MemoryTileCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a tile.
    pub fn insert(&self, coord: TileCoord, timestamp: i64, payload: Vec<u8>) {
        self.tiles.write().insert(coord, (timestamp, payload));
    }

    /// Returns a tile's timestamp and payload.
    pub fn get(&self, coord: &TileCoord) -> Option<(i64, Vec<u8>)> {
        self.tiles.read().get(coord).cloned()
    }

    /// Number of tiles held.
    pub fn len(&self) -> usize {
        self.tiles.read().len()
    }

    /// Returns true if no tiles are held.
    pub fn is_empty(&self) -> bool {
        self.tiles.read().is_empty()
    }
}

impl TileSource for MemoryTileCache {
    fn read_tile(&self, coord: &TileCoord) -> SyncResult<Option<Vec<u8>>> {
        Ok(self.get(coord).map(|(_, payload)| payload))
    }
}

impl TileSink for MemoryTileCache {
    fn store_tile(&self, tile: &TileData) -> SyncResult<()> {
        self.insert(tile.coord.clone(), tile.timestamp, tile.payload.clone());
        Ok(())
    }
}
