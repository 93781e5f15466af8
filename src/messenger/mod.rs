//! Messenger module.
//!
//! This module provides request/response messaging and traffic interception
//! on top of the transport.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Messenger`] | Endpoint: requests, handlers, interceptors, waits |
//! | [`MessengerBuilder`] | Fluent configuration builder |
//! | [`MessengerOptions`] | Namespace, timeouts, limits |
//! | [`Interceptor`] | Match / callback / stop-condition registration |
//! | [`EventWait`] | One-shot wait with cancellation |
//!
//! # Example
//!
//! ```no_run
//! use webpage_messenger::{FrameFilter, Messenger, SharedChannel};
//!
//! # async fn example() -> webpage_messenger::Result<()> {
//! let channel = SharedChannel::new();
//! let messenger = Messenger::new(&channel)?;
//!
//! let args = messenger
//!     .wait_for_frame(FrameFilter::code(431).incoming())
//!     .wait()
//!     .await?;
//! println!("{args:?}");
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Fluent builder pattern for messenger configuration.
pub mod builder;

/// Core messenger implementation.
pub mod core;

/// Pending request bookkeeping.
mod correlator;

/// Event handler registry.
pub mod handlers;

/// Interceptor registry.
pub mod interceptor;

/// Messenger options.
pub mod options;

/// One-shot waits.
pub mod wait;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::MessengerBuilder;
pub use core::Messenger;
pub use handlers::{EventHandler, HandlerError, HandlerResult};
pub use interceptor::{Interceptor, InterceptorHandle, MatchOutcome};
pub use options::{DEFAULT_MAX_PENDING, DEFAULT_REQUEST_TIMEOUT, MessengerOptions};
pub use wait::{EventWait, WaitState};
