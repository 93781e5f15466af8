//! Builder pattern for messenger configuration.
//!
//! Provides a fluent API for configuring and creating [`Messenger`] instances.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use webpage_messenger::{Messenger, SharedChannel};
//!
//! # async fn example() -> webpage_messenger::Result<()> {
//! let channel = SharedChannel::new();
//! let messenger = Messenger::builder()
//!     .channel(channel)
//!     .namespace("my-extension")
//!     .request_timeout(Duration::from_secs(5))
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use crate::error::{Error, Result};
use crate::transport::SharedChannel;

use super::core::Messenger;
use super::options::MessengerOptions;

// ============================================================================
// MessengerBuilder
// ============================================================================

/// Builder for configuring a [`Messenger`] instance.
///
/// Use [`Messenger::builder()`] to create a new builder.
#[derive(Debug, Default, Clone)]
pub struct MessengerBuilder {
    /// Channel to attach to.
    channel: Option<SharedChannel>,
    /// Messenger options.
    options: MessengerOptions,
}

// ============================================================================
// MessengerBuilder Implementation
// ============================================================================

impl MessengerBuilder {
    /// Creates a new builder with default options and no channel.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the shared channel the messenger attaches to.
    #[inline]
    #[must_use]
    pub fn channel(mut self, channel: SharedChannel) -> Self {
        self.channel = Some(channel);
        self
    }

    /// Sets the namespace tag.
    ///
    /// Both sides of a conversation must use the same namespace.
    #[inline]
    #[must_use]
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.options.namespace = namespace.into();
        self
    }

    /// Sets the default request timeout.
    #[inline]
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.options.request_timeout = timeout;
        self
    }

    /// Sets the pending request limit.
    #[inline]
    #[must_use]
    pub fn max_pending(mut self, max_pending: usize) -> Self {
        self.options.max_pending = max_pending;
        self
    }

    /// Sets the expiry applied to interceptors registered without one.
    #[inline]
    #[must_use]
    pub fn interceptor_expiry(mut self, expiry: Duration) -> Self {
        self.options.interceptor_expiry = Some(expiry);
        self
    }

    /// Replaces all options at once.
    #[inline]
    #[must_use]
    pub fn options(mut self, options: MessengerOptions) -> Self {
        self.options = options;
        self
    }

    /// Builds the messenger with validation and starts its tasks.
    ///
    /// Must be called within a tokio runtime.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if no channel is set
    /// - [`Error::Config`] if the options are invalid
    pub fn build(self) -> Result<Messenger> {
        let channel = self.channel.ok_or_else(|| {
            Error::config(
                "A shared channel is required. Use .channel() to set it.\n\
                 Example: Messenger::builder().channel(SharedChannel::new())",
            )
        })?;

        self.options.validate()?;

        Ok(Messenger::spawn(channel, self.options))
    }
}

// ============================================================================
// Tests
// ============================================================================
