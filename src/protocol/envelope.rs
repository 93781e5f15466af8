//! Envelope message type and event names.
//!
//! Every message on the shared channel is an envelope. Requests and
//! responses share one shape; responses use the `response` event name and
//! copy the request's `messageId`.
//!
//! # Format
//!
//! Request:
//! ```json
//! {
//!   "messageId": "9f1c…",
//!   "event": "log",
//!   "payload": "hello",
//!   "namespace": "complexity"
//! }
//! ```
//!
//! Response:
//! ```json
//! {
//!   "messageId": "9f1c…",
//!   "event": "response",
//!   "payload": "hello",
//!   "namespace": "complexity"
//! }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::Result;
use crate::identifiers::MessageId;

// ============================================================================
// Constants
// ============================================================================

/// Namespace tag used when none is configured.
pub const DEFAULT_NAMESPACE: &str = "complexity";

/// Wire field carrying the namespace tag.
const NAMESPACE_FIELD: &str = "namespace";

/// Payload key marking a handler failure.
const ERROR_MARKER: &str = "__messengerError";

// ============================================================================
// EventName
// ============================================================================

/// Closed catalog of event names understood on the channel.
///
/// Anything else on the wire is treated as malformed and dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventName {
    /// Liveness check.
    Ping,
    /// Forward a log line to the other side.
    Log,
    /// Send a raw frame over the page's WebSocket.
    #[serde(alias = "sendWebsocketMessage")]
    SendWebSocketMessage,
    /// Relay of captured WebSocket traffic.
    WebSocketEvent,
    /// Relay of captured long-polling traffic.
    LongPollingEvent,
    /// The page's socket has been captured.
    WebsocketCaptured,
    /// Query which transport the page is using.
    GetActiveWebSocketType,
    /// Ask the page to start relaying socket messages.
    RegisterWebSocketMessageListener,
    /// Client-side navigation inside the page.
    RouteToPage,
    /// Response to a request.
    Response,
}

impl EventName {
    /// Every event name, in declaration order.
    pub const ALL: [EventName; 10] = [
        Self::Ping,
        Self::Log,
        Self::SendWebSocketMessage,
        Self::WebSocketEvent,
        Self::LongPollingEvent,
        Self::WebsocketCaptured,
        Self::GetActiveWebSocketType,
        Self::RegisterWebSocketMessageListener,
        Self::RouteToPage,
        Self::Response,
    ];

    /// Returns the wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ping => "ping",
            Self::Log => "log",
            Self::SendWebSocketMessage => "sendWebSocketMessage",
            Self::WebSocketEvent => "webSocketEvent",
            Self::LongPollingEvent => "longPollingEvent",
            Self::WebsocketCaptured => "websocketCaptured",
            Self::GetActiveWebSocketType => "getActiveWebSocketType",
            Self::RegisterWebSocketMessageListener => "registerWebSocketMessageListener",
            Self::RouteToPage => "routeToPage",
            Self::Response => "response",
        }
    }

    /// Returns `true` for the response event.
    #[inline]
    #[must_use]
    pub const fn is_response(&self) -> bool {
        matches!(self, Self::Response)
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Envelope
// ============================================================================

/// A message on the shared channel, minus its namespace tag.
///
/// The namespace is added by [`Envelope::to_wire`] and checked by
/// [`Envelope::from_wire`]; inside the crate every envelope has already
/// passed the filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Correlation id.
    pub message_id: MessageId,

    /// Event name.
    pub event: EventName,

    /// Event-specific data.
    #[serde(default)]
    pub payload: Value,
}

impl Envelope {
    /// Creates a request envelope with a fresh message id.
    #[inline]
    #[must_use]
    pub fn request(event: EventName, payload: Value) -> Self {
        Self::with_id(MessageId::generate(), event, payload)
    }

    /// Creates an envelope with a specific message id.
    #[inline]
    #[must_use]
    pub fn with_id(message_id: MessageId, event: EventName, payload: Value) -> Self {
        Self {
            message_id,
            event,
            payload,
        }
    }

    /// Creates a response envelope for `message_id`.
    #[inline]
    #[must_use]
    pub fn response(message_id: MessageId, payload: Value) -> Self {
        Self::with_id(message_id, EventName::Response, payload)
    }

    /// Creates a response envelope reporting a handler failure.
    #[must_use]
    pub fn error_response(message_id: MessageId, message: impl Into<String>) -> Self {
        let message: String = message.into();
        Self::response(message_id, json!({ ERROR_MARKER: true, "message": message }))
    }

    /// Returns `true` if this is a response envelope.
    #[inline]
    #[must_use]
    pub fn is_response(&self) -> bool {
        self.event.is_response()
    }

    /// Returns the failure message if the payload is an error marker.
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        let marked = self
            .payload
            .get(ERROR_MARKER)
            .and_then(Value::as_bool)
            .unwrap_or_default();

        if !marked {
            return None;
        }

        Some(
            self.payload
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("handler failed"),
        )
    }

    /// Gets a string field from an object payload.
    #[inline]
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }

    /// Gets an integer field from an object payload.
    #[inline]
    #[must_use]
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.payload.get(key).and_then(Value::as_i64)
    }
}

// ============================================================================
// Envelope - Wire Format
// ============================================================================

impl Envelope {
    /// Serializes the envelope and tags it with `namespace`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Json`] if the payload cannot be serialized.
    pub fn to_wire(&self, namespace: &str) -> Result<Value> {
        let mut wire = match serde_json::to_value(self)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        wire.insert(NAMESPACE_FIELD.to_string(), Value::from(namespace));
        Ok(Value::Object(wire))
    }

    /// Accepts a raw broadcast if it is an envelope tagged with `namespace`.
    ///
    /// Returns `None` for foreign traffic and for anything that is not a
    /// well-formed envelope with a known event name.
    #[must_use]
    pub fn from_wire(raw: &Value, namespace: &str) -> Option<Self> {
        let tagged = raw.get(NAMESPACE_FIELD).and_then(Value::as_str) == Some(namespace);
        if !tagged {
            return None;
        }

        Self::deserialize(raw).ok()
    }
}

// ============================================================================
// Tests
// ============================================================================
