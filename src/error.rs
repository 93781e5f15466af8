//! Error types for the messenger.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use webpage_messenger::{EventName, Messenger, Result};
//!
//! async fn example(messenger: &Messenger) -> Result<()> {
//!     let kind = messenger
//!         .send_message(EventName::GetActiveWebSocketType, serde_json::Value::Null)
//!         .await?;
//!     println!("{kind}");
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`], [`Error::InvalidArgument`] |
//! | Correlation | [`Error::RequestTimeout`], [`Error::TooManyPending`], [`Error::Disposed`] |
//! | Remote | [`Error::HandlerFailure`] |
//! | Payload | [`Error::InvalidPayload`] |
//! | Waits | [`Error::WaitCancelled`], [`Error::WaitExpired`] |
//! | External | [`Error::Json`] |
//!
//! Foreign or malformed traffic on the shared channel never produces an
//! error; the transport drops it before any registry sees it.

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use thiserror::Error;

use crate::identifiers::MessageId;
use crate::protocol::EventName;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when messenger options are invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Invalid argument to an operation.
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Description of the invalid argument.
        message: String,
    },

    // ========================================================================
    // Correlation Errors
    // ========================================================================
    /// No response arrived within the request timeout.
    ///
    /// This is also what a request for an event without a registered
    /// handler on the other side looks like.
    #[error("Request {message_id} ({event}) timed out after {timeout_ms}ms")]
    RequestTimeout {
        /// The request that timed out.
        message_id: MessageId,
        /// Event the request was sent for.
        event: EventName,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Too many requests awaiting a response.
    #[error("Too many pending requests: {pending}/{max}")]
    TooManyPending {
        /// Requests currently pending.
        pending: usize,
        /// Configured limit.
        max: usize,
    },

    /// The messenger was disposed.
    ///
    /// Pending requests are rejected with this error on dispose.
    #[error("Messenger disposed")]
    Disposed,

    // ========================================================================
    // Remote Errors
    // ========================================================================
    /// The remote handler failed.
    ///
    /// Carried across the boundary as an error-marker payload.
    #[error("Handler for {event} failed: {message}")]
    HandlerFailure {
        /// Event whose handler failed.
        event: EventName,
        /// Error message reported by the handler.
        message: String,
    },

    // ========================================================================
    // Payload Errors
    // ========================================================================
    /// Payload does not have the shape expected for its event.
    #[error("Invalid payload for {event}: {message}")]
    InvalidPayload {
        /// Event the payload belongs to.
        event: EventName,
        /// Description of the mismatch.
        message: String,
    },

    // ========================================================================
    // Wait Errors
    // ========================================================================
    /// A wait-for-event was cancelled through its token.
    #[error("Wait cancelled")]
    WaitCancelled,

    /// A wait-for-event lost its interceptor before matching.
    ///
    /// Happens when the interceptor expiry passes or the messenger is
    /// disposed.
    #[error("Wait expired before a matching envelope arrived")]
    WaitExpired,

    // ========================================================================
    // External Errors
    // ========================================================================
    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    #[inline]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates a request timeout error.
    #[inline]
    pub fn request_timeout(message_id: MessageId, event: EventName, timeout_ms: u64) -> Self {
        Self::RequestTimeout {
            message_id,
            event,
            timeout_ms,
        }
    }

    /// Creates a too-many-pending error.
    #[inline]
    pub fn too_many_pending(pending: usize, max: usize) -> Self {
        Self::TooManyPending { pending, max }
    }

    /// Creates a handler failure error.
    #[inline]
    pub fn handler_failure(event: EventName, message: impl Into<String>) -> Self {
        Self::HandlerFailure {
            event,
            message: message.into(),
        }
    }

    /// Creates an invalid payload error.
    #[inline]
    pub fn invalid_payload(event: EventName, message: impl Into<String>) -> Self {
        Self::InvalidPayload {
            event,
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::RequestTimeout { .. })
    }

    /// Returns `true` if the remote handler reported a failure.
    #[inline]
    #[must_use]
    pub fn is_handler_failure(&self) -> bool {
        matches!(self, Self::HandlerFailure { .. })
    }

    /// Returns `true` if this error is recoverable.
    ///
    /// Recoverable errors may succeed on retry.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::RequestTimeout { .. } | Self::TooManyPending { .. } | Self::WaitExpired
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::request_timeout(MessageId::from("abc"), EventName::Ping, 250);
        assert_eq!(err.to_string(), "Request abc (ping) timed out after 250ms");
    }

    #[test]
    fn test_handler_failure_display() {
        let err = Error::handler_failure(EventName::Log, "boom");
        assert_eq!(err.to_string(), "Handler for log failed: boom");
        assert!(err.is_handler_failure());
        assert!(!err.is_timeout());
    }

    #[test]
    fn test_is_timeout() {
        let timeout_err = Error::request_timeout(MessageId::generate(), EventName::Ping, 10);
        let other_err = Error::config("test");

        assert!(timeout_err.is_timeout());
        assert!(!other_err.is_timeout());
    }

    #[test]
    fn test_is_recoverable() {
        assert!(Error::too_many_pending(100, 100).is_recoverable());
        assert!(Error::WaitExpired.is_recoverable());
        assert!(!Error::Disposed.is_recoverable());
        assert!(!Error::WaitCancelled.is_recoverable());
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }
}
