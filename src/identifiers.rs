//! Type-safe identifiers.
//!
//! Newtype wrappers keep correlation ids and interceptor ids from being
//! mixed up at compile time.
//!
//! | Type | Source | Format |
//! |------|--------|--------|
//! | [`MessageId`] | Generated per request, or copied from a peer | Opaque string |
//! | [`InterceptorId`] | Process-wide counter | `u64` |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// MessageId
// ============================================================================

/// Correlation id linking a request envelope to its response.
///
/// Locally generated ids are UUID v4 tokens. Ids received from the other
/// side of the channel are kept verbatim, whatever their format, because
/// the peer only ever compares them for equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    /// Generates a fresh, globally unique message id.
    #[inline]
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Wraps an existing id (e.g. one generated by the peer).
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MessageId {
    #[inline]
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for MessageId {
    #[inline]
    fn from(id: String) -> Self {
        Self(id)
    }
}

// ============================================================================
// InterceptorId
// ============================================================================

/// Global counter for interceptor ids.
static NEXT_INTERCEPTOR_ID: AtomicU64 = AtomicU64::new(1);

/// Identifier of a registered interceptor.
///
/// Unique within the process, so handles from different messengers never
/// collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InterceptorId(u64);

impl InterceptorId {
    /// Allocates the next interceptor id.
    #[inline]
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_INTERCEPTOR_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw numeric value.
    #[inline]
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for InterceptorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "interceptor-{}", self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================
