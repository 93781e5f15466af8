//! Messenger configuration.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use webpage_messenger::MessengerOptions;
//!
//! let options = MessengerOptions::new()
//!     .with_namespace("my-extension")
//!     .with_request_timeout(Duration::from_secs(5))
//!     .with_interceptor_expiry(Duration::from_secs(60));
//!
//! assert!(options.validate().is_ok());
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use crate::error::{Error, Result};
use crate::protocol::DEFAULT_NAMESPACE;

// ============================================================================
// Constants
// ============================================================================

/// Default timeout for a request/response round trip.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum pending requests before rejecting new ones.
pub const DEFAULT_MAX_PENDING: usize = 100;

// ============================================================================
// MessengerOptions
// ============================================================================

/// Messenger configuration options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessengerOptions {
    /// Namespace tag for this messenger's traffic.
    pub namespace: String,

    /// Timeout applied when a request does not specify one.
    pub request_timeout: Duration,

    /// Maximum concurrently pending requests.
    pub max_pending: usize,

    /// Expiry applied to interceptors registered without one.
    pub interceptor_expiry: Option<Duration>,
}

// ============================================================================
// Constructors
// ============================================================================

impl MessengerOptions {
    /// Creates options with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_pending: DEFAULT_MAX_PENDING,
            interceptor_expiry: None,
        }
    }
}

impl Default for MessengerOptions {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl MessengerOptions {
    /// Sets the namespace tag.
    #[inline]
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Sets the default request timeout.
    #[inline]
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the pending request limit.
    #[inline]
    #[must_use]
    pub fn with_max_pending(mut self, max_pending: usize) -> Self {
        self.max_pending = max_pending;
        self
    }

    /// Sets the default interceptor expiry.
    #[inline]
    #[must_use]
    pub fn with_interceptor_expiry(mut self, expiry: Duration) -> Self {
        self.interceptor_expiry = Some(expiry);
        self
    }
}

// ============================================================================
// Validation
// ============================================================================

impl MessengerOptions {
    /// Checks that the options are usable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the namespace is empty, the request
    /// timeout is zero, or the pending limit is zero.
    pub fn validate(&self) -> Result<()> {
        if self.namespace.trim().is_empty() {
            return Err(Error::config("namespace must not be empty"));
        }
        if self.request_timeout.is_zero() {
            return Err(Error::config("request timeout must be greater than zero"));
        }
        if self.max_pending == 0 {
            return Err(Error::config("max pending requests must be at least 1"));
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = MessengerOptions::default();
        assert_eq!(options.namespace, "complexity");
        assert_eq!(options.request_timeout.as_secs(), 30);
        assert_eq!(options.max_pending, 100);
        assert_eq!(options.interceptor_expiry, None);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_builder_chain() {
        let options = MessengerOptions::new()
            .with_namespace("ns")
            .with_request_timeout(Duration::from_millis(250))
            .with_max_pending(4)
            .with_interceptor_expiry(Duration::from_secs(1));

        assert_eq!(options.namespace, "ns");
        assert_eq!(options.request_timeout, Duration::from_millis(250));
        assert_eq!(options.max_pending, 4);
        assert_eq!(options.interceptor_expiry, Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(MessengerOptions::new().with_namespace(" ").validate().is_err());
        assert!(
            MessengerOptions::new()
                .with_request_timeout(Duration::ZERO)
                .validate()
                .is_err()
        );
        assert!(MessengerOptions::new().with_max_pending(0).validate().is_err());
    }
}
