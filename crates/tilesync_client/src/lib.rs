//! # tilesync Client
//!
//! Client-side reconciliation for tilesync.
//!
//! This crate provides:
//! - [`ClientTracker`], the local/server timestamp mirror and its diff sets
//! - [`ClientSyncEngine`], which ingests server messages and plans uploads
//!   and download requests
//! - The [`ClientTransport`], [`TileSource`] and [`TileSink`] seams a host
//!   implements
//!
//! ## Reconciliation
//!
//! On connect the server pushes its configuration, then pages its registry.
//! The engine mirrors those timestamps next to the locally explored ones:
//! tiles newer locally are uploaded, tiles newer on the server are
//! requested. Update notices keep the mirror current afterwards, so
//! reconciliation never stops after the first transfer.
//!
//! Local history outlives a connection; server knowledge is dropped on
//! disconnect and rebuilt from the next registry transfer.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod engine;
mod error;
mod tracker;
mod transport;

pub use config::ClientConfig;
pub use engine::{
    ClientState, ClientStats, ClientSyncEngine, MemoryTileCache, SyncRoundResult, TileSink,
    TileSource,
};
pub use error::{SyncError, SyncResult};
pub use tracker::ClientTracker;
pub use transport::{ClientTransport, MockTransport};
