//! Upload validation and download queueing.

use crate::config::ServerConfig;
use crate::session::{EnqueueOutcome, SessionState};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Instant;
use tilesync_core::{TileCoord, TileRegistry, TimestampValidator};
use tilesync_protocol::{
    DownloadRequest, RegistryEntry, TileData, UploadRequest, UploadResult, UploadResultCode,
};
use tilesync_storage::TileStore;
use tracing::{debug, error, warn};

/// Shared state every request handler works against.
pub struct HandlerContext {
    config: RwLock<ServerConfig>,
    /// Authoritative index.
    pub registry: Arc<TileRegistry>,
    /// Durable copy behind the registry.
    pub store: Arc<dyn TileStore>,
    /// Serializes the newer-check, storage write and registry update.
    write_lock: Mutex<()>,
}

impl HandlerContext {
    /// Creates a handler context.
    pub fn new(
        config: ServerConfig,
        registry: Arc<TileRegistry>,
        store: Arc<dyn TileStore>,
    ) -> Self {
        Self {
            config: RwLock::new(config),
            registry,
            store,
            write_lock: Mutex::new(()),
        }
    }

    /// Returns a copy of the current configuration.
    pub fn config(&self) -> ServerConfig {
        self.config.read().clone()
    }

    pub(crate) fn set_config(&self, config: ServerConfig) {
        *self.config.write() = config;
    }

    /// Runs `f` while holding the write lock.
    pub(crate) fn with_write_lock<T>(&self, f: impl FnOnce() -> T) -> T {
        let _guard = self.write_lock.lock();
        f()
    }
}

/// Result of one upload attempt.
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    /// Answer for the uploader.
    pub result: UploadResult,
    /// Notice to fan out to other sessions, set only when accepted.
    pub notice: Option<RegistryEntry>,
}

/// Counts from one download request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadEnqueueStats {
    /// Newly queued.
    pub queued: usize,
    /// Already queued.
    pub duplicates: usize,
    /// Dropped because the queue was full.
    pub dropped: usize,
    /// Not present in the registry.
    pub unknown: usize,
}

/// Handler for sync requests.
pub struct RequestHandler {
    context: Arc<HandlerContext>,
}

impl RequestHandler {
    /// Creates a new request handler.
    pub fn new(context: Arc<HandlerContext>) -> Self {
        Self { context }
    }

    /// Validates and applies an upload.
    ///
    /// Checks run in a fixed order and the first failure wins: sync
    /// enabled, identifier parse, dimension policy, payload size, rate
    /// limit, timestamp bounds, re-upload interval, then last-write-wins.
    /// Only an accepted upload mutates storage, the registry or the session.
    pub fn handle_upload(
        &self,
        session: &mut SessionState,
        request: &UploadRequest,
    ) -> UploadOutcome {
        let player = session.player_id();
        let result = self.validate_and_apply(session, request);

        match &result {
            Ok((coord, timestamp)) => {
                session.record_accepted(coord.clone(), Instant::now());
                debug!(%player, %coord, timestamp, "upload accepted");
                UploadOutcome {
                    result: UploadResult::for_request(request, UploadResultCode::Accepted),
                    notice: Some(RegistryEntry::new(coord.clone(), *timestamp)),
                }
            }
            Err(code) => {
                session.record_rejected();
                debug!(
                    %player,
                    dimension = %request.dimension,
                    x = request.x,
                    z = request.z,
                    reason = %code,
                    "upload rejected"
                );
                UploadOutcome {
                    result: UploadResult::for_request(request, *code),
                    notice: None,
                }
            }
        }
    }

    fn validate_and_apply(
        &self,
        session: &SessionState,
        request: &UploadRequest,
    ) -> Result<(TileCoord, i64), UploadResultCode> {
        let (coord, min_interval) = {
            let config = self.context.config.read();

            if !config.sync_enabled || !session.sync_enabled() {
                return Err(UploadResultCode::RejectedSyncDisabled);
            }
            let coord = request
                .coord()
                .map_err(|_| UploadResultCode::RejectedInvalidData)?;
            if !config.is_dimension_allowed(&coord.dimension) {
                return Err(UploadResultCode::RejectedDimensionNotAllowed);
            }
            if request.payload.len() > config.effective_max_payload() {
                return Err(UploadResultCode::RejectedDataTooLarge);
            }
            (coord, config.min_update_interval())
        };

        if !session.try_acquire_upload() {
            return Err(UploadResultCode::RejectedRateLimited);
        }
        if !TimestampValidator::is_valid(request.timestamp) {
            return Err(UploadResultCode::RejectedInvalidData);
        }
        let timestamp = TimestampValidator::sanitize(request.timestamp);

        if session.uploaded_within(&coord, min_interval, Instant::now()) {
            return Err(UploadResultCode::RejectedTooSoon);
        }

        self.context.with_write_lock(|| {
            if !self.context.registry.is_newer(&coord, timestamp) {
                return Err(UploadResultCode::RejectedOutdated);
            }
            if let Err(e) = self.context.store.write(
                &coord,
                session.player_id(),
                timestamp,
                &request.payload,
            ) {
                error!(%coord, error = %e, "failed to persist upload");
                return Err(UploadResultCode::RejectedError);
            }
            self.context.registry.put(coord.clone(), timestamp);
            Ok(())
        })?;

        Ok((coord, timestamp))
    }

    /// Queues every requested coordinate the registry knows about.
    pub fn handle_download_request(
        &self,
        session: &mut SessionState,
        request: &DownloadRequest,
    ) -> DownloadEnqueueStats {
        let max_pending = self.context.config.read().max_pending_downloads;
        let mut stats = DownloadEnqueueStats::default();

        for coord in &request.coords {
            if !self.context.registry.contains(coord) {
                stats.unknown += 1;
                continue;
            }
            match session.enqueue_download(coord.clone(), max_pending) {
                EnqueueOutcome::Queued => stats.queued += 1,
                EnqueueOutcome::Duplicate => stats.duplicates += 1,
                EnqueueOutcome::Dropped => stats.dropped += 1,
            }
        }

        if stats.dropped > 0 {
            warn!(
                player = %session.player_id(),
                dropped = stats.dropped,
                "download queue full"
            );
        }
        stats
    }

    /// Reads one queued tile for sending.
    ///
    /// Returns `None` if the tile vanished or cannot be read.
    pub fn serve_download(&self, coord: &TileCoord) -> Option<TileData> {
        match self.context.store.read_record(coord) {
            Ok(Some(record)) => Some(TileData {
                coord: coord.clone(),
                timestamp: record.metadata.timestamp,
                payload: record.payload,
            }),
            Ok(None) => {
                debug!(%coord, "queued download no longer stored");
                None
            }
            Err(e) => {
                warn!(%coord, error = %e, "failed to read queued download");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tilesync_core::{now_millis, DimensionId, EPOCH_FLOOR_MS, MAX_FUTURE_DRIFT_MS};
    use tilesync_protocol::HARD_MAX_PAYLOAD_SIZE;
    use tilesync_storage::InMemoryTileStore;
    use tokio::sync::mpsc::unbounded_channel;
    use uuid::Uuid;

    struct Fixture {
        handler: RequestHandler,
        context: Arc<HandlerContext>,
        store: Arc<InMemoryTileStore>,
        session: SessionState,
    }

    fn fixture(config: ServerConfig) -> Fixture {
        let store = Arc::new(InMemoryTileStore::new());
        let registry = Arc::new(TileRegistry::new());
        let context = Arc::new(HandlerContext::new(
            config.clone(),
            registry,
            Arc::clone(&store) as Arc<dyn TileStore>,
        ));
        let (tx, _rx) = unbounded_channel();
        let session = SessionState::new(Uuid::new_v4(), "alex", &config, Vec::new(), tx).unwrap();
        Fixture {
            handler: RequestHandler::new(Arc::clone(&context)),
            context,
            store,
            session,
        }
    }

    fn overworld(x: i32, z: i32) -> TileCoord {
        TileCoord::new(DimensionId::minecraft("overworld").unwrap(), x, z)
    }

    fn upload(coord: &TileCoord, timestamp: i64) -> UploadRequest {
        UploadRequest::new(coord, timestamp, vec![7; 32])
    }

    #[test]
    fn accepted_upload_persists_then_indexes() {
        let mut f = fixture(ServerConfig::new());
        let ts = now_millis() - 1_000;
        let outcome = f.handler.handle_upload(&mut f.session, &upload(&overworld(1, 2), ts));

        assert_eq!(outcome.result.code, UploadResultCode::Accepted);
        assert_eq!(outcome.notice, Some(RegistryEntry::new(overworld(1, 2), ts)));
        assert_eq!(f.context.registry.timestamp(&overworld(1, 2)), Some(ts));

        let record = f.store.read_record(&overworld(1, 2)).unwrap().unwrap();
        assert_eq!(record.metadata.contributor, f.session.player_id());
        assert_eq!(record.payload, vec![7; 32]);
    }

    #[test]
    fn sync_disabled_wins_over_everything() {
        let mut f = fixture(ServerConfig::new().with_sync_enabled(false));
        let mut request = upload(&overworld(0, 0), 0);
        request.dimension = "BAD".into();
        request.payload = vec![0; HARD_MAX_PAYLOAD_SIZE + 1];

        let outcome = f.handler.handle_upload(&mut f.session, &request);
        assert_eq!(outcome.result.code, UploadResultCode::RejectedSyncDisabled);
        assert!(outcome.notice.is_none());
    }

    #[test]
    fn unparsable_dimension_is_invalid_data() {
        let mut f = fixture(ServerConfig::new());
        let mut request = upload(&overworld(0, 0), now_millis());
        request.dimension = "Not:Valid Id".into();
        let outcome = f.handler.handle_upload(&mut f.session, &request);
        assert_eq!(outcome.result.code, UploadResultCode::RejectedInvalidData);
    }

    #[test]
    fn dimension_policy_before_size() {
        let nether = DimensionId::minecraft("the_nether").unwrap();
        let mut f = fixture(
            ServerConfig::new()
                .with_blacklisted_dimensions(vec![nether.clone()])
                .with_max_payload_size(4),
        );
        let request = upload(&TileCoord::new(nether, 0, 0), now_millis());
        let outcome = f.handler.handle_upload(&mut f.session, &request);
        assert_eq!(
            outcome.result.code,
            UploadResultCode::RejectedDimensionNotAllowed
        );
    }

    #[test]
    fn oversized_payload_rejected() {
        let mut f = fixture(ServerConfig::new().with_max_payload_size(16));
        let outcome = f
            .handler
            .handle_upload(&mut f.session, &upload(&overworld(0, 0), now_millis()));
        assert_eq!(outcome.result.code, UploadResultCode::RejectedDataTooLarge);

        let mut request = upload(&overworld(0, 0), now_millis());
        request.payload = vec![1; 16];
        let outcome = f.handler.handle_upload(&mut f.session, &request);
        assert_eq!(outcome.result.code, UploadResultCode::Accepted);
    }

    #[test]
    fn rate_limit_then_invalid_timestamp() {
        let mut f = fixture(
            ServerConfig::new()
                .with_max_upload_per_sec(1)
                .with_min_update_interval_minutes(0),
        );
        let bad_ts = now_millis() + MAX_FUTURE_DRIFT_MS + 60_000;

        let outcome = f.handler.handle_upload(&mut f.session, &upload(&overworld(0, 0), bad_ts));
        assert_eq!(outcome.result.code, UploadResultCode::RejectedInvalidData);

        let outcome = f.handler.handle_upload(&mut f.session, &upload(&overworld(0, 0), bad_ts));
        assert_eq!(outcome.result.code, UploadResultCode::RejectedRateLimited);
    }

    #[test]
    fn ancient_timestamp_is_invalid() {
        let mut f = fixture(ServerConfig::new());
        let outcome = f
            .handler
            .handle_upload(&mut f.session, &upload(&overworld(0, 0), EPOCH_FLOOR_MS - 1));
        assert_eq!(outcome.result.code, UploadResultCode::RejectedInvalidData);
        assert!(f.context.registry.is_empty());
    }

    #[test]
    fn near_future_timestamp_is_clamped_to_now() {
        let mut f = fixture(ServerConfig::new());
        let before = now_millis();
        let outcome = f
            .handler
            .handle_upload(&mut f.session, &upload(&overworld(0, 0), before + 60_000));
        assert_eq!(outcome.result.code, UploadResultCode::Accepted);

        let stored = f.context.registry.timestamp(&overworld(0, 0)).unwrap();
        assert!(stored >= before && stored <= now_millis());
    }

    #[test]
    fn reupload_of_same_tile_is_too_soon() {
        let mut f = fixture(ServerConfig::new());
        let ts = now_millis() - 10_000;

        let first = f.handler.handle_upload(&mut f.session, &upload(&overworld(0, 0), ts));
        assert_eq!(first.result.code, UploadResultCode::Accepted);

        let again = f.handler.handle_upload(&mut f.session, &upload(&overworld(0, 0), ts + 1));
        assert_eq!(again.result.code, UploadResultCode::RejectedTooSoon);

        let other = f.handler.handle_upload(&mut f.session, &upload(&overworld(0, 1), ts));
        assert_eq!(other.result.code, UploadResultCode::Accepted);
    }

    #[test]
    fn outdated_and_tied_uploads_rejected() {
        let mut f = fixture(ServerConfig::new().with_min_update_interval_minutes(0));
        let ts = now_millis() - 10_000;
        f.context.registry.put(overworld(0, 0), ts);

        for candidate in [ts - 1, ts] {
            let outcome = f
                .handler
                .handle_upload(&mut f.session, &upload(&overworld(0, 0), candidate));
            assert_eq!(outcome.result.code, UploadResultCode::RejectedOutdated);
        }

        let outcome = f
            .handler
            .handle_upload(&mut f.session, &upload(&overworld(0, 0), ts + 1));
        assert_eq!(outcome.result.code, UploadResultCode::Accepted);
        assert_eq!(f.context.registry.timestamp(&overworld(0, 0)), Some(ts + 1));
    }

    #[test]
    fn storage_failure_leaves_registry_untouched() {
        let mut f = fixture(ServerConfig::new());
        f.store.set_fail_writes(true);

        let outcome = f
            .handler
            .handle_upload(&mut f.session, &upload(&overworld(0, 0), now_millis()));
        assert_eq!(outcome.result.code, UploadResultCode::RejectedError);
        assert!(outcome.notice.is_none());
        assert!(!f.context.registry.contains(&overworld(0, 0)));

        f.store.set_fail_writes(false);
        let outcome = f
            .handler
            .handle_upload(&mut f.session, &upload(&overworld(0, 0), now_millis()));
        assert_eq!(outcome.result.code, UploadResultCode::Accepted);
    }

    #[test]
    fn download_requests_only_queue_known_tiles() {
        let mut f = fixture(ServerConfig::new().with_max_pending_downloads(2));
        for x in 0..3 {
            f.context.registry.put(overworld(x, 0), 1);
        }

        let request = DownloadRequest::new(vec![
            overworld(0, 0),
            overworld(0, 0),
            overworld(9, 9),
            overworld(1, 0),
            overworld(2, 0),
        ]);
        let stats = f.handler.handle_download_request(&mut f.session, &request);
        assert_eq!(
            stats,
            DownloadEnqueueStats {
                queued: 2,
                duplicates: 1,
                dropped: 1,
                unknown: 1,
            }
        );
    }

    #[test]
    fn serve_download_reads_store() {
        let f = fixture(ServerConfig::new());
        f.store
            .write(&overworld(4, 4), Uuid::nil(), 55, b"payload")
            .unwrap();

        let data = f.handler.serve_download(&overworld(4, 4)).unwrap();
        assert_eq!(data.timestamp, 55);
        assert_eq!(data.payload, b"payload");
        assert!(f.handler.serve_download(&overworld(5, 5)).is_none());
    }
}
