//! Main sync server.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::{HandlerContext, RequestHandler};
use crate::session::SessionState;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tilesync_core::TileRegistry;
use tilesync_protocol::{RegistryEntry, SyncMessage, UploadRequest, UploadResult};
use tilesync_storage::{FileTileStore, TileStore};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

type SessionMap = HashMap<Uuid, Arc<Mutex<SessionState>>>;

/// Work done by one [`SyncServer::tick`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickStats {
    /// Registry pages sent.
    pub pages_sent: usize,
    /// Tiles sent from download queues.
    pub downloads_served: usize,
    /// Sessions removed because their peer went away.
    pub sessions_closed: usize,
}

/// The authoritative tile sync server.
///
/// Owns the registry, the store and one [`SessionState`] per connected
/// peer. Messages for a peer are pushed onto the receiver returned by
/// [`SyncServer::connect`]; the host transport drains it.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use tilesync_server::{ServerConfig, SyncServer};
/// use tilesync_storage::InMemoryTileStore;
/// use uuid::Uuid;
///
/// let store = Arc::new(InMemoryTileStore::new());
/// let server = SyncServer::new(ServerConfig::default(), store).unwrap();
/// let player = Uuid::new_v4();
/// let mut outbox = server.connect(player, "steve").unwrap();
///
/// server.tick();
/// assert!(outbox.try_recv().is_ok()); // config push
/// ```
pub struct SyncServer {
    handler: RequestHandler,
    context: Arc<HandlerContext>,
    sessions: RwLock<SessionMap>,
}

impl SyncServer {
    /// Creates a server over `store`, rebuilding the registry from it.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the store cannot
    /// be scanned.
    pub fn new(config: ServerConfig, store: Arc<dyn TileStore>) -> ServerResult<Self> {
        config.validate()?;
        let index = store.rebuild_index()?;
        info!(tiles = index.len(), "registry rebuilt from storage");

        let registry = Arc::new(TileRegistry::from_index(index));
        let context = Arc::new(HandlerContext::new(config, registry, store));
        let handler = RequestHandler::new(Arc::clone(&context));

        Ok(Self {
            handler,
            context,
            sessions: RwLock::new(HashMap::new()),
        })
    }

    /// Opens a [`FileTileStore`] at `root` and creates a server over it.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is locked or unreadable, or the
    /// configuration is invalid.
    pub fn open(config: ServerConfig, root: &Path) -> ServerResult<Self> {
        let store = FileTileStore::open(root)?;
        Self::new(config, Arc::new(store))
    }

    /// Returns a copy of the current configuration.
    pub fn config(&self) -> ServerConfig {
        self.context.config()
    }

    /// The authoritative registry.
    pub fn registry(&self) -> &TileRegistry {
        &self.context.registry
    }

    /// The backing store.
    pub fn store(&self) -> &Arc<dyn TileStore> {
        &self.context.store
    }

    pub(crate) fn context(&self) -> &HandlerContext {
        &self.context
    }

    /// Opens a session for `player_id` and returns its outbound queue.
    ///
    /// The configuration is queued immediately; registry pages follow on
    /// subsequent ticks. An existing session for the same player is
    /// replaced and its queued work discarded.
    ///
    /// # Errors
    ///
    /// Returns an error if the session's limiters cannot be created.
    pub fn connect(
        &self,
        player_id: Uuid,
        name: impl Into<String>,
    ) -> ServerResult<UnboundedReceiver<SyncMessage>> {
        let config = self.context.config();
        let (tx, rx) = unbounded_channel();

        // Snapshot and registration happen under the write lock, so every
        // accepted upload is either in the snapshot or broadcast to this
        // session afterwards.
        let (name, replaced) = self.context.with_write_lock(|| -> ServerResult<_> {
            let snapshot = self.context.registry.snapshot();
            let session = SessionState::new(player_id, name, &config, snapshot, tx)?;
            session.send(SyncMessage::Config(config.to_message()));

            let name = session.name().to_string();
            let replaced = self
                .sessions
                .write()
                .insert(player_id, Arc::new(Mutex::new(session)))
                .is_some();
            Ok((name, replaced))
        })?;
        if replaced {
            warn!(player = %player_id, "replaced existing session");
        }
        info!(player = %player_id, %name, "session opened");
        Ok(rx)
    }

    /// Closes a session. Returns true if one existed.
    pub fn disconnect(&self, player_id: Uuid) -> bool {
        let removed = self.sessions.write().remove(&player_id).is_some();
        if removed {
            info!(player = %player_id, "session closed");
        }
        removed
    }

    /// Returns true if `player_id` has a session.
    pub fn is_connected(&self, player_id: Uuid) -> bool {
        self.sessions.read().contains_key(&player_id)
    }

    /// Number of open sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    pub(crate) fn session(&self, player_id: Uuid) -> ServerResult<Arc<Mutex<SessionState>>> {
        self.sessions
            .read()
            .get(&player_id)
            .cloned()
            .ok_or(ServerError::UnknownSession(player_id))
    }

    pub(crate) fn all_sessions(&self) -> Vec<Arc<Mutex<SessionState>>> {
        self.sessions.read().values().cloned().collect()
    }

    /// Handles an upload from `player_id` and returns the answer.
    ///
    /// An accepted upload is announced to every other session.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::UnknownSession`] if the player has no session.
    /// Rejections are not errors.
    pub fn handle_upload(
        &self,
        player_id: Uuid,
        request: &UploadRequest,
    ) -> ServerResult<UploadResult> {
        let session = self.session(player_id)?;
        let outcome = self.handler.handle_upload(&mut session.lock(), request);
        if let Some(notice) = &outcome.notice {
            self.broadcast(notice, player_id);
        }
        Ok(outcome.result)
    }

    /// Handles a sync message from `player_id`.
    ///
    /// Returns the direct answer, if the message has one. Other traffic
    /// toward the peer goes through its outbound queue.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown sessions and for message types that
    /// only flow from server to client.
    pub fn handle_message(
        &self,
        player_id: Uuid,
        message: SyncMessage,
    ) -> ServerResult<Option<SyncMessage>> {
        match message {
            SyncMessage::UploadRequest(request) => self
                .handle_upload(player_id, &request)
                .map(|result| Some(SyncMessage::UploadResult(result))),
            SyncMessage::DownloadRequest(request) => {
                let session = self.session(player_id)?;
                let stats = self
                    .handler
                    .handle_download_request(&mut session.lock(), &request);
                debug!(player = %player_id, queued = stats.queued, "download request");
                Ok(None)
            }
            other => Err(ServerError::InvalidRequest(format!(
                "unexpected {} from client",
                other.name()
            ))),
        }
    }

    /// Decodes a frame, handles it and encodes the answer.
    ///
    /// # Errors
    ///
    /// Returns an error for malformed frames, in addition to the errors of
    /// [`SyncServer::handle_message`]. A malformed frame does not affect
    /// the session.
    pub fn handle_frame(&self, player_id: Uuid, frame: &[u8]) -> ServerResult<Option<Vec<u8>>> {
        let message = SyncMessage::decode(frame).map_err(|e| {
            warn!(player = %player_id, error = %e, "rejected malformed frame");
            e
        })?;
        match self.handle_message(player_id, message)? {
            Some(answer) => Ok(Some(answer.encode()?)),
            None => Ok(None),
        }
    }

    /// Sends `entry` to every session except `origin`.
    pub fn broadcast(&self, entry: &RegistryEntry, origin: Uuid) {
        for session in self.all_sessions() {
            let session = session.lock();
            if session.player_id() != origin {
                session.send(SyncMessage::RegistryUpdate(entry.clone()));
            }
        }
    }

    /// Runs one round of background work for every session.
    ///
    /// Streams registry pages and drains download queues as far as each
    /// session's limiters allow, and closes sessions whose peer is gone.
    pub fn tick(&self) -> TickStats {
        let config = self.context.config();
        let now = Instant::now();
        let mut stats = TickStats::default();
        let mut closed = Vec::new();

        for session in self.all_sessions() {
            let mut session = session.lock();
            if session.is_closed() {
                closed.push(session.player_id());
                continue;
            }

            while !session.registry_transfer_complete() && session.try_acquire_registry_page() {
                let Some(page) = session.next_registry_page(config.registry_batch_size) else {
                    break;
                };
                session.send(SyncMessage::RegistryPage(page));
                stats.pages_sent += 1;
            }

            while session.pending_download_count() > 0 && session.try_acquire_download() {
                let Some(coord) = session.pop_download() else {
                    break;
                };
                if let Some(data) = self.handler.serve_download(&coord) {
                    session.send(SyncMessage::TileData(data));
                    session.record_served();
                    stats.downloads_served += 1;
                }
            }

            session.prune_upload_history(config.min_update_interval(), now);
        }

        for player_id in closed {
            if self.disconnect(player_id) {
                stats.sessions_closed += 1;
            }
        }
        stats
    }

    /// Runs [`SyncServer::tick`] every `period` on the current tokio runtime.
    ///
    /// The task stops when the returned handle is aborted or dropped along
    /// with the runtime.
    pub fn spawn_ticker(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let server = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                server.tick();
            }
        })
    }

    /// Replaces the configuration at runtime.
    ///
    /// Every session's limiters restart at the new capacity and every peer
    /// is sent the new configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::InvalidConfig`] and keeps the old
    /// configuration if the new one is invalid.
    pub fn update_config(&self, config: ServerConfig) -> ServerResult<()> {
        config.validate()?;
        self.context.set_config(config.clone());

        let message = config.to_message();
        for session in self.all_sessions() {
            let mut session = session.lock();
            session.apply_config(&config)?;
            session.send(SyncMessage::Config(message.clone()));
        }
        info!(
            sync_enabled = config.sync_enabled,
            upload_rate = config.max_upload_per_sec,
            download_rate = config.max_download_per_sec,
            "configuration updated"
        );
        Ok(())
    }
}
