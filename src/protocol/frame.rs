//! Socket.IO-style text frames.
//!
//! Tunneled WebSocket traffic is made of frames that start with a numeric
//! message code, optionally followed by a JSON body:
//!
//! ```text
//! 2                                   ping, no body
//! 421["upsert_thread_collection",{}]  event emit with ack id
//! 431[{"status":"ok"}]                ack for the emit above
//! ```
//!
//! Only event codes (`42...` and binary `45...`) carry an event name as
//! the first body element. Ack bodies are all arguments, so `431["ok"]`
//! has the single argument `"ok"`.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde_json::Value;

use super::message::WebSocketEventKind;

// ============================================================================
// Frame
// ============================================================================

/// A parsed text frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Leading message code.
    pub code: u32,

    /// JSON body following the code, if any.
    pub body: Option<Value>,
}

impl Frame {
    /// Creates a frame without a body.
    #[inline]
    #[must_use]
    pub const fn new(code: u32) -> Self {
        Self { code, body: None }
    }

    /// Creates a frame with a JSON body.
    #[inline]
    #[must_use]
    pub fn with_body(code: u32, body: Value) -> Self {
        Self {
            code,
            body: Some(body),
        }
    }

    /// Creates an event frame: `<code>["<event>", data]`.
    #[must_use]
    pub fn event(code: u32, event: impl Into<String>, data: Value) -> Self {
        Self::with_body(code, Value::Array(vec![Value::from(event.into()), data]))
    }

    /// Parses a frame from text.
    ///
    /// Returns `None` if the text does not start with a code or the
    /// remainder is not valid JSON.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let split = text
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(text.len());
        let (digits, rest) = text.split_at(split);

        let code = digits.parse().ok()?;
        if rest.is_empty() {
            return Some(Self::new(code));
        }

        let body = serde_json::from_str(rest).ok()?;
        Some(Self::with_body(code, body))
    }

    /// Returns `true` for event and binary event codes.
    #[must_use]
    pub fn is_event(&self) -> bool {
        let code = self.code.to_string();
        code.starts_with("42") || code.starts_with("45")
    }

    /// Returns the event name of an event frame whose body is an array led
    /// by a string.
    #[must_use]
    pub fn event_name(&self) -> Option<&str> {
        if !self.is_event() {
            return None;
        }
        match &self.body {
            Some(Value::Array(items)) => items.first().and_then(Value::as_str),
            _ => None,
        }
    }

    /// Returns the frame arguments.
    ///
    /// For event frames this is every element after the event name. For
    /// other array bodies, acks included, it is the whole array; a scalar
    /// or object body is a single argument.
    #[must_use]
    pub fn args(&self) -> Vec<Value> {
        match &self.body {
            None => Vec::new(),
            Some(Value::Array(items)) if self.event_name().is_some() => items[1..].to_vec(),
            Some(Value::Array(items)) => items.clone(),
            Some(other) => vec![other.clone()],
        }
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code)?;
        if let Some(body) = &self.body {
            write!(f, "{body}")?;
        }
        Ok(())
    }
}

// ============================================================================
// FrameFilter
// ============================================================================

/// Selects frames by code, event name and direction.
///
/// # Example
///
/// ```
/// use webpage_messenger::protocol::{Frame, FrameFilter, WebSocketEventKind};
///
/// let filter = FrameFilter::code(431).incoming();
/// let frame = Frame::parse(r#"431[{"status":"ok"}]"#).expect("frame");
/// assert!(filter.matches(WebSocketEventKind::Message, &frame));
/// assert!(!filter.matches(WebSocketEventKind::Send, &frame));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameFilter {
    /// Required message code.
    pub code: u32,

    /// Required event name, if any.
    pub event: Option<String>,

    /// Required direction, if any.
    pub direction: Option<WebSocketEventKind>,
}

impl FrameFilter {
    /// Matches frames with `code` in either direction.
    #[inline]
    #[must_use]
    pub const fn code(code: u32) -> Self {
        Self {
            code,
            event: None,
            direction: None,
        }
    }

    /// Also requires the frame's event name.
    #[inline]
    #[must_use]
    pub fn event(mut self, event: impl Into<String>) -> Self {
        self.event = Some(event.into());
        self
    }

    /// Only frames received by the page.
    #[inline]
    #[must_use]
    pub fn incoming(mut self) -> Self {
        self.direction = Some(WebSocketEventKind::Message);
        self
    }

    /// Only frames sent by the page.
    #[inline]
    #[must_use]
    pub fn outgoing(mut self) -> Self {
        self.direction = Some(WebSocketEventKind::Send);
        self
    }

    /// Returns `true` if `frame`, observed as `kind`, passes the filter.
    #[must_use]
    pub fn matches(&self, kind: WebSocketEventKind, frame: &Frame) -> bool {
        if !matches!(kind, WebSocketEventKind::Send | WebSocketEventKind::Message) {
            return false;
        }
        if self.direction.is_some_and(|direction| direction != kind) {
            return false;
        }
        if frame.code != self.code {
            return false;
        }
        match &self.event {
            Some(event) => frame.event_name() == Some(event.as_str()),
            None => true,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
