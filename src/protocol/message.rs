//! Typed request messages.
//!
//! [`Message`] pairs every request event with its payload type so that
//! handlers can match on it exhaustively instead of inspecting raw JSON.
//!
//! | Variant | Payload |
//! |---------|---------|
//! | `Ping` | none |
//! | `Log` | log line |
//! | `SendWebSocketMessage` | raw frame text |
//! | `WebSocketEvent` | [`WebSocketEventData`] |
//! | `LongPollingEvent` | [`LongPollingEventData`] |
//! | `WebsocketCaptured` | none |
//! | `GetActiveWebSocketType` | none |
//! | `RegisterWebSocketMessageListener` | listener options |
//! | `RouteToPage` | [`RouteToPage`] |

// ============================================================================
// Imports
// ============================================================================

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

use super::envelope::{Envelope, EventName};
use super::frame::Frame;

// ============================================================================
// WebSocketEventData
// ============================================================================

/// Direction or lifecycle step of captured WebSocket traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WebSocketEventKind {
    /// Frame sent by the page.
    Send,
    /// Socket opened.
    Open,
    /// Frame received by the page.
    Message,
    /// Socket closed.
    Close,
}

/// Payload of a `webSocketEvent` envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebSocketEventData {
    /// What happened on the socket.
    pub event: WebSocketEventKind,

    /// Frame text or event details.
    #[serde(default)]
    pub payload: Value,
}

impl WebSocketEventData {
    /// Creates an event carrying a frame.
    #[inline]
    #[must_use]
    pub fn frame(event: WebSocketEventKind, frame: &Frame) -> Self {
        Self {
            event,
            payload: Value::from(frame.to_string()),
        }
    }

    /// Parses the payload as a frame, if it is one.
    #[must_use]
    pub fn parse_frame(&self) -> Option<Frame> {
        self.payload.as_str().and_then(Frame::parse)
    }
}

// ============================================================================
// LongPollingEventData
// ============================================================================

/// Direction of captured long-polling traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LongPollingEventKind {
    /// Poll request sent by the page.
    Request,
    /// Poll response received by the page.
    Response,
}

/// Payload of a `longPollingEvent` envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LongPollingEventData {
    /// Direction of the traffic.
    pub event: LongPollingEventKind,

    /// Body of the poll request or response.
    #[serde(default)]
    pub payload: Value,
}

// ============================================================================
// ActiveWebSocketType
// ============================================================================

/// Transport the page is currently using.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActiveWebSocketType {
    /// A native WebSocket.
    #[serde(rename = "WebSocket")]
    WebSocket,
    /// HTTP long-polling fallback.
    #[serde(rename = "Long-polling")]
    LongPolling,
}

// ============================================================================
// RouteToPage
// ============================================================================

/// Payload of a `routeToPage` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteToPage {
    /// Page-relative URL.
    pub url: String,

    /// Whether the page should scroll to top after routing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scroll: Option<bool>,
}

// ============================================================================
// Message
// ============================================================================

/// A request, typed by event.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Liveness check.
    Ping,
    /// Log line.
    Log(String),
    /// Raw frame to send over the page's socket.
    SendWebSocketMessage(String),
    /// Captured WebSocket traffic.
    WebSocketEvent(WebSocketEventData),
    /// Captured long-polling traffic.
    LongPollingEvent(LongPollingEventData),
    /// Socket captured notification.
    WebsocketCaptured,
    /// Transport type query.
    GetActiveWebSocketType,
    /// Start relaying socket messages.
    RegisterWebSocketMessageListener(Value),
    /// Client-side navigation.
    RouteToPage(RouteToPage),
}

impl Message {
    /// Returns the event name for this message.
    #[must_use]
    pub const fn event(&self) -> EventName {
        match self {
            Self::Ping => EventName::Ping,
            Self::Log(_) => EventName::Log,
            Self::SendWebSocketMessage(_) => EventName::SendWebSocketMessage,
            Self::WebSocketEvent(_) => EventName::WebSocketEvent,
            Self::LongPollingEvent(_) => EventName::LongPollingEvent,
            Self::WebsocketCaptured => EventName::WebsocketCaptured,
            Self::GetActiveWebSocketType => EventName::GetActiveWebSocketType,
            Self::RegisterWebSocketMessageListener(_) => EventName::RegisterWebSocketMessageListener,
            Self::RouteToPage(_) => EventName::RouteToPage,
        }
    }

    /// Converts the message into its wire payload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if the payload cannot be serialized.
    pub fn into_payload(self) -> Result<Value> {
        let payload = match self {
            Self::Ping | Self::WebsocketCaptured | Self::GetActiveWebSocketType => Value::Null,
            Self::Log(line) => Value::from(line),
            Self::SendWebSocketMessage(frame) => Value::from(frame),
            Self::WebSocketEvent(data) => serde_json::to_value(data)?,
            Self::LongPollingEvent(data) => serde_json::to_value(data)?,
            Self::RegisterWebSocketMessageListener(options) => options,
            Self::RouteToPage(route) => serde_json::to_value(route)?,
        };
        Ok(payload)
    }

    /// Rebuilds a typed message from an event name and raw payload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPayload`] if the payload does not fit the
    /// event, or if `event` is the response event.
    pub fn from_parts(event: EventName, payload: Value) -> Result<Self> {
        let message = match event {
            EventName::Ping => Self::Ping,
            EventName::Log => Self::Log(decode(event, payload)?),
            EventName::SendWebSocketMessage => Self::SendWebSocketMessage(decode(event, payload)?),
            EventName::WebSocketEvent => Self::WebSocketEvent(decode(event, payload)?),
            EventName::LongPollingEvent => Self::LongPollingEvent(decode(event, payload)?),
            EventName::WebsocketCaptured => Self::WebsocketCaptured,
            EventName::GetActiveWebSocketType => Self::GetActiveWebSocketType,
            EventName::RegisterWebSocketMessageListener => {
                Self::RegisterWebSocketMessageListener(payload)
            }
            EventName::RouteToPage => Self::RouteToPage(decode(event, payload)?),
            EventName::Response => {
                return Err(Error::invalid_payload(
                    event,
                    "responses are not request messages",
                ));
            }
        };
        Ok(message)
    }

    /// Rebuilds a typed message from a request envelope.
    ///
    /// # Errors
    ///
    /// See [`Message::from_parts`].
    pub fn from_envelope(envelope: &Envelope) -> Result<Self> {
        Self::from_parts(envelope.event, envelope.payload.clone())
    }
}

/// Decodes a payload, tagging failures with the event name.
fn decode<T: DeserializeOwned>(event: EventName, payload: Value) -> Result<T> {
    serde_json::from_value(payload).map_err(|e| Error::invalid_payload(event, e.to_string()))
}

// ============================================================================
// Tests
// ============================================================================
