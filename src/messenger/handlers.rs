//! Event handler registry.
//!
//! One async handler per event name; registering again replaces the
//! previous handler. Handler failures become error-marker responses, since
//! only data can cross the context boundary.

// ============================================================================
// Imports
// ============================================================================

use std::any::Any;
use std::error::Error as StdError;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::FutureExt;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::protocol::{Envelope, EventName};
use crate::transport::Transport;

// ============================================================================
// Types
// ============================================================================

/// Error type handlers may return.
pub type HandlerError = Box<dyn StdError + Send + Sync>;

/// Result of handling one request.
pub type HandlerResult = Result<Value, HandlerError>;

// ============================================================================
// EventHandler
// ============================================================================

/// Handles requests for one event.
///
/// Implemented for every `Fn(Value) -> impl Future<Output = HandlerResult>`
/// closure, so most callers never implement it by hand.
///
/// # Example
///
/// ```ignore
/// messenger.add_listener(EventName::Log, |payload: Value| async move {
///     tracing::info!(%payload, "log from page");
///     Ok(payload)
/// });
/// ```
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    /// Handles one request payload.
    async fn handle(&self, payload: Value) -> HandlerResult;
}

#[async_trait]
impl<F, Fut> EventHandler for F
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    async fn handle(&self, payload: Value) -> HandlerResult {
        (self)(payload).await
    }
}

// ============================================================================
// HandlerRegistry
// ============================================================================

/// Map of event names to their handler.
#[derive(Default)]
pub(crate) struct HandlerRegistry {
    handlers: RwLock<FxHashMap<EventName, Arc<dyn EventHandler>>>,
}

impl HandlerRegistry {
    /// Registers `handler` for `event`, returning `true` if one was replaced.
    pub(crate) fn insert(&self, event: EventName, handler: Arc<dyn EventHandler>) -> bool {
        let replaced = self.handlers.write().insert(event, handler).is_some();
        if replaced {
            debug!(%event, "Replaced event handler");
        } else {
            debug!(%event, "Registered event handler");
        }
        replaced
    }

    /// Unregisters the handler for `event`.
    #[inline]
    pub(crate) fn remove(&self, event: EventName) -> bool {
        self.handlers.write().remove(&event).is_some()
    }

    /// Returns the handler for `event`, if any.
    #[inline]
    pub(crate) fn get(&self, event: EventName) -> Option<Arc<dyn EventHandler>> {
        self.handlers.read().get(&event).cloned()
    }

    /// Returns `true` if `event` has a handler.
    #[inline]
    pub(crate) fn contains(&self, event: EventName) -> bool {
        self.handlers.read().contains_key(&event)
    }

    /// Removes every handler.
    #[inline]
    pub(crate) fn clear(&self) {
        self.handlers.write().clear();
    }

    /// Returns the number of registered handlers.
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.handlers.read().len()
    }
}

// ============================================================================
// Dispatch
// ============================================================================

/// Runs `handler` for `request` and posts the response.
pub(crate) async fn respond(
    handler: Arc<dyn EventHandler>,
    request: Envelope,
    transport: Transport,
) {
    let Envelope {
        message_id,
        event,
        payload,
    } = request;

    let outcome = AssertUnwindSafe(handler.handle(payload)).catch_unwind().await;

    let response = match outcome {
        Ok(Ok(value)) => Envelope::response(message_id, value),

        Ok(Err(e)) => {
            warn!(%message_id, %event, error = %e, "Event handler failed");
            Envelope::error_response(message_id, e.to_string())
        }

        Err(panic) => {
            let message = panic_message(panic.as_ref());
            warn!(%message_id, %event, %message, "Event handler panicked");
            Envelope::error_response(message_id, message)
        }
    };

    match transport.send(&response) {
        Ok(()) => trace!(message_id = %response.message_id, %event, "Response posted"),
        Err(e) => warn!(message_id = %response.message_id, error = %e, "Failed to post response"),
    }
}

/// Extracts a readable message from a panic payload.
pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "panicked".to_string()
    }
}

// ============================================================================
// Tests
// ============================================================================
