//! Request/response correlation.
//!
//! Pending requests are keyed by message id. An entry is removed by
//! whichever comes first: its response, its timeout, or shutdown. Anything
//! arriving for a removed id finds nothing and is ignored.

// ============================================================================
// Imports
// ============================================================================

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::MessageId;
use crate::protocol::{Envelope, EventName};

// ============================================================================
// Types
// ============================================================================

/// Receiving half handed to the caller awaiting a response.
pub(crate) type ResponseReceiver = oneshot::Receiver<Result<Value>>;

/// A request awaiting its response.
struct PendingRequest {
    /// Event the request was sent for.
    event: EventName,
    /// Completes the caller's future.
    responder: oneshot::Sender<Result<Value>>,
}

// ============================================================================
// Correlator
// ============================================================================

/// Map of in-flight requests.
#[derive(Default)]
pub(crate) struct Correlator {
    pending: Mutex<FxHashMap<MessageId, PendingRequest>>,
}

impl Correlator {
    /// Registers a pending request, enforcing the `max` limit.
    pub(crate) fn register(
        &self,
        message_id: MessageId,
        event: EventName,
        max: usize,
    ) -> Result<ResponseReceiver> {
        let mut pending = self.pending.lock();

        if pending.len() >= max {
            warn!(pending = pending.len(), max, "Too many pending requests");
            return Err(Error::too_many_pending(pending.len(), max));
        }

        let (responder, receiver) = oneshot::channel();
        pending.insert(message_id, PendingRequest { event, responder });
        Ok(receiver)
    }

    /// Returns `true` if `message_id` is one of our in-flight requests.
    #[inline]
    pub(crate) fn is_pending(&self, message_id: &MessageId) -> bool {
        self.pending.lock().contains_key(message_id)
    }

    /// Settles the request matching a response envelope.
    ///
    /// Returns `false` if no request was pending under that id.
    pub(crate) fn resolve(&self, response: &Envelope) -> bool {
        let Some(request) = self.pending.lock().remove(&response.message_id) else {
            return false;
        };

        let result = match response.error_message() {
            Some(message) => Err(Error::handler_failure(request.event, message)),
            None => Ok(response.payload.clone()),
        };

        if request.responder.send(result).is_err() {
            trace!(message_id = %response.message_id, "Requester gone before response");
        }
        true
    }

    /// Drops a pending request without settling it.
    ///
    /// Returns `false` if it was already settled.
    #[inline]
    pub(crate) fn discard(&self, message_id: &MessageId) -> bool {
        self.pending.lock().remove(message_id).is_some()
    }

    /// Rejects every pending request with the error produced by `make_error`.
    pub(crate) fn fail_all(&self, make_error: impl Fn() -> Error) -> usize {
        let drained: Vec<_> = self.pending.lock().drain().collect();
        let count = drained.len();

        for (_, request) in drained {
            let _ = request.responder.send(Err(make_error()));
        }

        if count > 0 {
            debug!(count, "Failed pending requests");
        }
        count
    }

    /// Returns the number of pending requests.
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.pending.lock().len()
    }
}

// ============================================================================
// Tests
// ============================================================================
