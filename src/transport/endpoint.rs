//! Namespaced view of the shared channel.
//!
//! [`Transport`] tags outbound envelopes with the namespace and
//! [`Inbound`] drops every broadcast that is not a well-formed envelope
//! carrying that same namespace. Nothing else on the channel ever reaches
//! a registry.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::broadcast::Receiver;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{trace, warn};

use crate::error::Result;
use crate::protocol::Envelope;

use super::SharedChannel;

// ============================================================================
// Transport
// ============================================================================

/// Sends and receives envelopes under one namespace.
///
/// Holds no application state; cloning is cheap.
#[derive(Debug, Clone)]
pub struct Transport {
    /// Underlying broadcast channel.
    channel: SharedChannel,
    /// Namespace tag for this side's traffic.
    namespace: Arc<str>,
}

impl Transport {
    /// Creates a transport over `channel` using `namespace`.
    #[must_use]
    pub fn new(channel: SharedChannel, namespace: impl Into<Arc<str>>) -> Self {
        Self {
            channel,
            namespace: namespace.into(),
        }
    }

    /// Returns the namespace tag.
    #[inline]
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Returns the underlying channel.
    #[inline]
    #[must_use]
    pub fn channel(&self) -> &SharedChannel {
        &self.channel
    }

    /// Serializes `envelope`, tags it and posts it on the channel.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Json`] if the envelope cannot be serialized.
    pub fn send(&self, envelope: &Envelope) -> Result<()> {
        let wire = envelope.to_wire(&self.namespace)?;
        let reached = self.channel.post(wire);

        trace!(
            message_id = %envelope.message_id,
            event = %envelope.event,
            reached,
            "Envelope posted"
        );
        Ok(())
    }

    /// Subscribes to envelopes in this namespace.
    #[must_use]
    pub fn subscribe(&self) -> Inbound {
        Inbound {
            receiver: self.channel.subscribe(),
            namespace: Arc::clone(&self.namespace),
        }
    }

    /// Calls `callback` for every accepted envelope until the channel closes.
    ///
    /// The subscription is taken before this returns, so nothing posted
    /// afterwards is missed. Abort the returned handle to stop listening.
    pub fn on_receive<F>(&self, mut callback: F) -> JoinHandle<()>
    where
        F: FnMut(Envelope) + Send + 'static,
    {
        let mut inbound = self.subscribe();
        tokio::spawn(async move {
            while let Some(envelope) = inbound.recv().await {
                callback(envelope);
            }
        })
    }
}

// ============================================================================
// Inbound
// ============================================================================

/// Filtered stream of inbound envelopes.
#[derive(Debug)]
pub struct Inbound {
    /// Raw channel subscription.
    receiver: Receiver<Value>,
    /// Namespace to accept.
    namespace: Arc<str>,
}

impl Inbound {
    /// Waits for the next envelope in this namespace.
    ///
    /// Foreign and malformed broadcasts are skipped silently. Returns `None`
    /// once the channel is closed.
    pub async fn recv(&mut self) -> Option<Envelope> {
        loop {
            match self.receiver.recv().await {
                Ok(raw) => {
                    if let Some(envelope) = Envelope::from_wire(&raw, &self.namespace) {
                        return Some(envelope);
                    }
                    trace!("Discarded foreign or malformed broadcast");
                }

                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Inbound listener lagged, broadcasts dropped");
                }

                Err(RecvError::Closed) => return None,
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
