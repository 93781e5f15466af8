//! Channel protocol message types.
//!
//! This module defines what travels over the shared channel.
//!
//! # Protocol Overview
//!
//! | Message Type | Direction | Purpose |
//! |--------------|-----------|---------|
//! | Request envelope | Either side | Ask the other side to handle an event |
//! | Response envelope | Responder → Requester | Result for a request `messageId` |
//! | Relay envelope | Page → Extension | Captured socket traffic, observed by interceptors |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `envelope` | Envelope and event names |
//! | `frame` | Socket.IO-style frame codec |
//! | `message` | Typed request messages |

// ============================================================================
// Submodules
// ============================================================================

/// Envelope and event name types.
pub mod envelope;

/// Socket.IO-style text frames.
pub mod frame;

/// Typed request messages.
pub mod message;

// ============================================================================
// Re-exports
// ============================================================================

pub use envelope::{DEFAULT_NAMESPACE, Envelope, EventName};
pub use frame::{Frame, FrameFilter};
pub use message::{
    ActiveWebSocketType, LongPollingEventData, LongPollingEventKind, Message, RouteToPage,
    WebSocketEventData, WebSocketEventKind,
};
