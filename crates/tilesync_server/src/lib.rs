//! # tilesync Server
//!
//! The authoritative half of tile sync.
//!
//! This crate provides:
//! - [`SyncServer`], owning the registry, the store and every session
//! - The upload validation pipeline ([`RequestHandler`])
//! - Per-session flow control ([`SessionState`])
//! - Administrative queries ([`ServerStatus`], [`TileInfo`])
//!
//! # Protocol
//!
//! 1. On connect the server queues its configuration and snapshots the
//!    registry.
//! 2. Each [`SyncServer::tick`] streams registry pages and serves queued
//!    downloads, as far as the session's rate limiters allow.
//! 3. Uploads are answered directly; an accepted upload is announced to
//!    every other session as a registry update.
//!
//! Transport, framing delivery and authentication belong to the host.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod admin;
mod config;
mod error;
mod handler;
mod server;
mod session;

pub use admin::{RegistryStats, ServerStatus, TileInfo};
pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use handler::{DownloadEnqueueStats, HandlerContext, RequestHandler, UploadOutcome};
pub use server::{SyncServer, TickStats};
pub use session::{EnqueueOutcome, SessionInfo, SessionPhase, SessionState};
