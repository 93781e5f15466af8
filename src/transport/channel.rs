//! Shared broadcast channel.
//!
//! The in-process stand-in for `window.postMessage`: every subscriber sees
//! every posted value, whoever posted it. Values are untyped JSON, so other
//! code sharing the channel can post anything.

// ============================================================================
// Imports
// ============================================================================

use serde_json::Value;
use tokio::sync::broadcast;
use tracing::trace;

// ============================================================================
// Constants
// ============================================================================

/// Buffered broadcasts per subscriber before it starts lagging.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

// ============================================================================
// SharedChannel
// ============================================================================

/// Broadcast channel shared by every context on the page.
///
/// Cloning yields another handle to the same channel.
#[derive(Debug, Clone)]
pub struct SharedChannel {
    sender: broadcast::Sender<Value>,
}

impl SharedChannel {
    /// Creates a channel with the default capacity.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Creates a channel buffering up to `capacity` broadcasts.
    ///
    /// A capacity of zero is raised to one.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Posts a value to every current subscriber.
    ///
    /// Returns the number of subscribers reached. Posting with nobody
    /// listening is not an error; the value is simply lost.
    pub fn post(&self, message: Value) -> usize {
        match self.sender.send(message) {
            Ok(reached) => reached,
            Err(_) => {
                trace!("Broadcast posted with no listeners");
                0
            }
        }
    }

    /// Subscribes to every value posted from now on.
    #[inline]
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Value> {
        self.sender.subscribe()
    }

    /// Returns the number of live subscribers.
    #[inline]
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for SharedChannel {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================
