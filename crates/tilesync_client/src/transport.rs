//! Transport abstraction toward the server.

use crate::error::{SyncError, SyncResult};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tilesync_protocol::SyncMessage;

/// Carries client messages to the server.
///
/// Delivery is one-way: answers and server pushes come back through
/// [`ClientSyncEngine::handle_message`](crate::ClientSyncEngine::handle_message).
/// Hosts wrap their network channel in this trait.
pub trait ClientTransport: Send + Sync {
    /// Sends one message.
    fn send(&self, message: SyncMessage) -> SyncResult<()>;

    /// Checks if the transport is connected.
    fn is_connected(&self) -> bool;
}

/// A transport that records everything sent through it.
#[derive(Debug)]
pub struct MockTransport {
    connected: AtomicBool,
    sent: Mutex<Vec<SyncMessage>>,
}

impl MockTransport {
    /// Creates a connected mock transport.
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Sets the connected state.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Returns a copy of the messages sent so far.
    pub fn sent(&self) -> Vec<SyncMessage> {
        self.sent.lock().clone()
    }

    /// Removes and returns the messages sent so far.
    pub fn take_sent(&self) -> Vec<SyncMessage> {
        std::mem::take(&mut *self.sent.lock())
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientTransport for MockTransport {
    fn send(&self, message: SyncMessage) -> SyncResult<()> {
        if !self.is_connected() {
            return Err(SyncError::NotConnected);
        }
        self.sent.lock().push(message);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
