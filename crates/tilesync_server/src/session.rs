//! Per-connection session state.

use crate::config::ServerConfig;
use crate::error::ServerResult;
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};
use tilesync_core::{RateLimiter, TileCoord};
use tilesync_protocol::{batch_count, RegistryEntry, RegistryPage, SyncMessage};
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

/// Where a session is in its reconciliation lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Connected; no registry page sent yet.
    AwaitingRegistry,
    /// Registry pages are being streamed.
    ReceivingRegistryBatches,
    /// Registry transfer finished. Steady state.
    Synchronized,
}

/// What happened to a download enqueue request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// Appended to the queue.
    Queued,
    /// Already waiting in the queue.
    Duplicate,
    /// The queue is full.
    Dropped,
}

/// Read-only view of a session for administration.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    /// Player identity.
    pub player_id: Uuid,
    /// Display name.
    pub name: String,
    /// Lifecycle phase.
    pub phase: SessionPhase,
    /// Registry pages sent so far.
    pub batches_sent: u32,
    /// Registry pages in the transfer.
    pub total_batches: u32,
    /// Whether the registry transfer finished.
    pub registry_transfer_complete: bool,
    /// Downloads waiting in the queue.
    pub pending_downloads: usize,
    /// Accepted uploads.
    pub uploads_accepted: u64,
    /// Rejected uploads.
    pub uploads_rejected: u64,
    /// Tiles sent in answer to download requests.
    pub downloads_served: u64,
    /// Seconds since connect.
    pub connected_secs: u64,
}

/// Server-side state for one connected peer.
///
/// Created on connect with limiters seeded from the current configuration
/// and a snapshot of the registry to page over. Dropped on disconnect,
/// discarding all queued work.
#[derive(Debug)]
pub struct SessionState {
    player_id: Uuid,
    name: String,
    upload_limiter: RateLimiter,
    download_limiter: RateLimiter,
    registry_limiter: RateLimiter,
    phase: SessionPhase,
    registry_snapshot: Vec<(TileCoord, i64)>,
    batches_sent: u32,
    total_batches: u32,
    registry_transfer_complete: bool,
    pending_downloads: VecDeque<TileCoord>,
    queued: HashSet<TileCoord>,
    last_upload: HashMap<TileCoord, Instant>,
    sync_enabled: bool,
    connected_at: Instant,
    uploads_accepted: u64,
    uploads_rejected: u64,
    downloads_served: u64,
    outbox: UnboundedSender<SyncMessage>,
}

impl SessionState {
    /// Creates a session that will page over `registry_snapshot`.
    ///
    /// # Errors
    ///
    /// Returns an error if any configured rate is zero.
    pub fn new(
        player_id: Uuid,
        name: impl Into<String>,
        config: &ServerConfig,
        registry_snapshot: Vec<(TileCoord, i64)>,
        outbox: UnboundedSender<SyncMessage>,
    ) -> ServerResult<Self> {
        let total_batches = batch_count(registry_snapshot.len(), config.registry_batch_size);
        Ok(Self {
            player_id,
            name: name.into(),
            upload_limiter: RateLimiter::new(config.max_upload_per_sec)?,
            download_limiter: RateLimiter::new(config.max_download_per_sec)?,
            registry_limiter: RateLimiter::new(config.registry_pages_per_sec)?,
            phase: SessionPhase::AwaitingRegistry,
            registry_snapshot,
            batches_sent: 0,
            total_batches,
            registry_transfer_complete: false,
            pending_downloads: VecDeque::new(),
            queued: HashSet::new(),
            last_upload: HashMap::new(),
            sync_enabled: config.sync_enabled,
            connected_at: Instant::now(),
            uploads_accepted: 0,
            uploads_rejected: 0,
            downloads_served: 0,
            outbox,
        })
    }

    /// Player identity.
    pub fn player_id(&self) -> Uuid {
        self.player_id
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Lifecycle phase.
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Whether sync is enabled for this session.
    pub fn sync_enabled(&self) -> bool {
        self.sync_enabled
    }

    /// Whether the registry transfer finished.
    pub fn registry_transfer_complete(&self) -> bool {
        self.registry_transfer_complete
    }

    /// Takes one upload token.
    pub fn try_acquire_upload(&self) -> bool {
        self.upload_limiter.try_acquire()
    }

    /// Takes one download token.
    pub fn try_acquire_download(&self) -> bool {
        self.download_limiter.try_acquire()
    }

    /// Takes one registry paging token.
    pub fn try_acquire_registry_page(&self) -> bool {
        self.registry_limiter.try_acquire()
    }

    /// Re-seeds limiters and flags from a new configuration.
    ///
    /// Limiters restart at their new full capacity.
    ///
    /// # Errors
    ///
    /// Returns an error if any configured rate is zero. Limiters updated
    /// before the failing one keep their new rate.
    pub fn apply_config(&mut self, config: &ServerConfig) -> ServerResult<()> {
        self.upload_limiter.set_rate(config.max_upload_per_sec)?;
        self.download_limiter.set_rate(config.max_download_per_sec)?;
        self.registry_limiter.set_rate(config.registry_pages_per_sec)?;
        self.sync_enabled = config.sync_enabled;
        Ok(())
    }

    /// Builds the next registry page, or `None` once the transfer is done.
    pub fn next_registry_page(&mut self, batch_size: usize) -> Option<RegistryPage> {
        if self.registry_transfer_complete {
            return None;
        }

        let batch_size = batch_size.max(1);
        let start = (self.batches_sent as usize)
            .saturating_mul(batch_size)
            .min(self.registry_snapshot.len());
        let end = start.saturating_add(batch_size).min(self.registry_snapshot.len());
        let entries = self.registry_snapshot[start..end]
            .iter()
            .map(|(coord, ts)| RegistryEntry::new(coord.clone(), *ts))
            .collect();

        let page = RegistryPage::new(entries, self.batches_sent, self.total_batches);
        self.batches_sent += 1;

        if page.is_last_batch {
            self.registry_transfer_complete = true;
            self.phase = SessionPhase::Synchronized;
            self.registry_snapshot = Vec::new();
        } else {
            self.phase = SessionPhase::ReceivingRegistryBatches;
        }
        Some(page)
    }

    /// Queues a coordinate for download.
    ///
    /// Duplicates are ignored and a full queue drops new entries.
    pub fn enqueue_download(&mut self, coord: TileCoord, max_pending: usize) -> EnqueueOutcome {
        if self.queued.contains(&coord) {
            return EnqueueOutcome::Duplicate;
        }
        if self.pending_downloads.len() >= max_pending {
            return EnqueueOutcome::Dropped;
        }
        self.queued.insert(coord.clone());
        self.pending_downloads.push_back(coord);
        EnqueueOutcome::Queued
    }

    /// Pops the oldest queued download.
    pub fn pop_download(&mut self) -> Option<TileCoord> {
        let coord = self.pending_downloads.pop_front()?;
        self.queued.remove(&coord);
        Some(coord)
    }

    /// Number of queued downloads.
    pub fn pending_download_count(&self) -> usize {
        self.pending_downloads.len()
    }

    /// Returns true if this session uploaded `coord` less than `interval` ago.
    pub fn uploaded_within(&self, coord: &TileCoord, interval: Duration, now: Instant) -> bool {
        if interval.is_zero() {
            return false;
        }
        self.last_upload
            .get(coord)
            .is_some_and(|&at| now.saturating_duration_since(at) < interval)
    }

    /// Records an accepted upload.
    pub fn record_accepted(&mut self, coord: TileCoord, now: Instant) {
        self.last_upload.insert(coord, now);
        self.uploads_accepted += 1;
        if self.registry_transfer_complete {
            self.phase = SessionPhase::Synchronized;
        }
    }

    /// Records a rejected upload.
    pub fn record_rejected(&mut self) {
        self.uploads_rejected += 1;
    }

    /// Records a served download.
    pub fn record_served(&mut self) {
        self.downloads_served += 1;
        if self.registry_transfer_complete {
            self.phase = SessionPhase::Synchronized;
        }
    }

    /// Forgets upload times older than `interval`.
    pub fn prune_upload_history(&mut self, interval: Duration, now: Instant) {
        self.last_upload
            .retain(|_, at| now.saturating_duration_since(*at) < interval);
    }

    /// Queues a message toward the peer. Returns false if the peer is gone.
    pub fn send(&self, message: SyncMessage) -> bool {
        self.outbox.send(message).is_ok()
    }

    /// Returns true if the transport dropped its receiver.
    pub fn is_closed(&self) -> bool {
        self.outbox.is_closed()
    }

    /// Administrative snapshot.
    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            player_id: self.player_id,
            name: self.name.clone(),
            phase: self.phase,
            batches_sent: self.batches_sent,
            total_batches: self.total_batches,
            registry_transfer_complete: self.registry_transfer_complete,
            pending_downloads: self.pending_downloads.len(),
            uploads_accepted: self.uploads_accepted,
            uploads_rejected: self.uploads_rejected,
            downloads_served: self.downloads_served,
            connected_secs: self.connected_at.elapsed().as_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tilesync_core::DimensionId;
    use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

    fn coord(x: i32) -> TileCoord {
        TileCoord::new(DimensionId::minecraft("overworld").unwrap(), x, 0)
    }

    fn session(
        config: &ServerConfig,
        entries: usize,
    ) -> (SessionState, UnboundedReceiver<SyncMessage>) {
        let (tx, rx) = unbounded_channel();
        let snapshot = (0..entries).map(|i| (coord(i as i32), i as i64)).collect();
        let state = SessionState::new(Uuid::new_v4(), "steve", config, snapshot, tx).unwrap();
        (state, rx)
    }

    #[test]
    fn pages_cover_snapshot_exactly_once() {
        let config = ServerConfig::new().with_registry_batch_size(3);
        let (mut state, _rx) = session(&config, 7);
        assert_eq!(state.phase(), SessionPhase::AwaitingRegistry);

        let mut seen = Vec::new();
        let mut pages = 0;
        while let Some(page) = state.next_registry_page(3) {
            page.validate().unwrap();
            assert_eq!(page.total_batches, 3);
            seen.extend(page.entries.into_iter().map(|e| e.coord.x));
            pages += 1;
            if !page.is_last_batch {
                assert_eq!(state.phase(), SessionPhase::ReceivingRegistryBatches);
            }
        }

        assert_eq!(pages, 3);
        assert_eq!(seen, (0..7).collect::<Vec<_>>());
        assert!(state.registry_transfer_complete());
        assert_eq!(state.phase(), SessionPhase::Synchronized);
    }

    #[test]
    fn empty_registry_sends_one_last_page() {
        let (mut state, _rx) = session(&ServerConfig::new(), 0);
        let page = state.next_registry_page(500).unwrap();
        assert!(page.entries.is_empty());
        assert!(page.is_last_batch);
        assert_eq!(page.total_batches, 1);
        assert!(state.next_registry_page(500).is_none());
    }

    #[test]
    fn download_queue_is_fifo_deduped_and_bounded() {
        let (mut state, _rx) = session(&ServerConfig::new(), 0);

        assert_eq!(state.enqueue_download(coord(1), 2), EnqueueOutcome::Queued);
        assert_eq!(state.enqueue_download(coord(1), 2), EnqueueOutcome::Duplicate);
        assert_eq!(state.enqueue_download(coord(2), 2), EnqueueOutcome::Queued);
        assert_eq!(state.enqueue_download(coord(3), 2), EnqueueOutcome::Dropped);
        assert_eq!(state.pending_download_count(), 2);

        assert_eq!(state.pop_download(), Some(coord(1)));
        assert_eq!(state.enqueue_download(coord(1), 2), EnqueueOutcome::Queued);
        assert_eq!(state.pop_download(), Some(coord(2)));
        assert_eq!(state.pop_download(), Some(coord(1)));
        assert_eq!(state.pop_download(), None);
    }

    #[test]
    fn too_soon_is_per_coordinate() {
        let (mut state, _rx) = session(&ServerConfig::new(), 0);
        let now = Instant::now();
        let minute = Duration::from_secs(60);

        state.record_accepted(coord(1), now);
        assert!(state.uploaded_within(&coord(1), minute, now + Duration::from_secs(30)));
        assert!(!state.uploaded_within(&coord(2), minute, now));
        assert!(!state.uploaded_within(&coord(1), minute, now + minute));
        assert!(!state.uploaded_within(&coord(1), Duration::ZERO, now));

        state.prune_upload_history(minute, now + minute);
        assert!(!state.uploaded_within(&coord(1), minute, now));
    }

    #[test]
    fn apply_config_reseeds_limiters() {
        let config = ServerConfig::new().with_max_upload_per_sec(1);
        let (mut state, _rx) = session(&config, 0);
        assert!(state.try_acquire_upload());
        assert!(!state.try_acquire_upload());

        state
            .apply_config(&config.clone().with_max_upload_per_sec(2).with_sync_enabled(false))
            .unwrap();
        assert!(!state.sync_enabled());
        assert!(state.try_acquire_upload());
        assert!(state.try_acquire_upload());
        assert!(!state.try_acquire_upload());
    }

    #[test]
    fn send_reports_closed_peer() {
        let (state, rx) = session(&ServerConfig::new(), 0);
        assert!(state.send(SyncMessage::RegistryPage(RegistryPage::new(vec![], 0, 1))));
        drop(rx);
        assert!(state.is_closed());
        assert!(!state.send(SyncMessage::RegistryPage(RegistryPage::new(vec![], 0, 1))));
    }

    #[test]
    fn info_reflects_counters() {
        let (mut state, _rx) = session(&ServerConfig::new(), 0);
        state.record_accepted(coord(0), Instant::now());
        state.record_rejected();
        state.record_served();
        state.enqueue_download(coord(5), 10);

        let info = state.info();
        assert_eq!(info.name, "steve");
        assert_eq!(info.uploads_accepted, 1);
        assert_eq!(info.uploads_rejected, 1);
        assert_eq!(info.downloads_served, 1);
        assert_eq!(info.pending_downloads, 1);
        assert_eq!(info.phase, SessionPhase::AwaitingRegistry);
    }
}
