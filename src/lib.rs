//! Webpage messenger - request/response messaging between the two contexts
//! of a web page.
//!
//! An extension's isolated script and the page's own script share one
//! broadcast channel that any other script on the page can post to. This
//! library layers a namespaced, correlated protocol over it.
//!
//! # Architecture
//!
//! - **Transport**: tags outgoing envelopes with a namespace, drops
//!   inbound traffic that is foreign or malformed
//! - **Messenger**: correlates requests with responses by message id,
//!   runs one handler per event, and fans every inbound envelope out to
//!   interceptors
//! - **Waits**: one-shot interceptors that resolve a future, with
//!   cancellation and expiry
//!
//! # Quick Start
//!
//! ```no_run
//! use serde_json::{Value, json};
//! use webpage_messenger::{EventName, Messenger, Result, SharedChannel};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let channel = SharedChannel::new();
//!     let page = Messenger::new(&channel)?;
//!     let extension = Messenger::new(&channel)?;
//!
//!     page.add_listener(EventName::Ping, |_| async { Ok(json!("pong")) });
//!
//!     let reply = extension.send_message(EventName::Ping, Value::Null).await?;
//!     println!("{reply}");
//!
//!     extension.dispose();
//!     page.dispose();
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Message and interceptor ids |
//! | [`messenger`] | [`Messenger`], interceptors, waits |
//! | [`protocol`] | Envelopes, event catalog, frame codec |
//! | [`transport`] | Shared channel and namespace filtering |

// ============================================================================
// Modules
// ============================================================================

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Message and interceptor identifiers.
pub mod identifiers;

/// Request/response messaging and interception.
pub mod messenger;

/// Envelope, event and frame types.
pub mod protocol;

/// Shared channel transport.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{InterceptorId, MessageId};

// Messenger types
pub use messenger::{
    EventHandler, EventWait, HandlerError, HandlerResult, Interceptor, InterceptorHandle,
    MatchOutcome, Messenger, MessengerBuilder, MessengerOptions, WaitState,
};

// Protocol types
pub use protocol::{
    ActiveWebSocketType, Envelope, EventName, Frame, FrameFilter, LongPollingEventData,
    LongPollingEventKind, Message, RouteToPage, WebSocketEventData, WebSocketEventKind,
};

// Transport types
pub use transport::{SharedChannel, Transport};
