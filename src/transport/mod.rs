//! Shared-channel transport layer.
//!
//! This module handles communication between the two contexts of a page
//! over one broadcast channel that any other code can also use.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐                              ┌──────────────────┐
//! │  Extension side  │                              │  Page side       │
//! │                  │       SharedChannel          │                  │
//! │  Messenger       │◄────────────────────────────►│  Messenger       │
//! │  → Transport     │   (plus unrelated scripts)   │  → Transport     │
//! └──────────────────┘                              └──────────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `channel` | Untyped broadcast channel |
//! | `endpoint` | Namespace tagging and filtering |

// ============================================================================
// Submodules
// ============================================================================

/// Untyped broadcast channel.
pub mod channel;

/// Namespace tagging and inbound filtering.
pub mod endpoint;

// ============================================================================
// Re-exports
// ============================================================================

pub use channel::{DEFAULT_CHANNEL_CAPACITY, SharedChannel};
pub use endpoint::{Inbound, Transport};
