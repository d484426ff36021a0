//! Outgoing message queue.
//!
//! The queue is the caller-facing half of the crate: it accepts messages,
//! keeps them in submission order and hands them one at a time to a
//! [`MessageSender`], normally the [`crate::SessionManager`].
//!
//! # Guarantees
//!
//! - Messages are dispatched strictly in submission order
//! - At most one message is in flight at any time
//! - A failed message never blocks the ones behind it
//! - The queue is unbounded; there is no backpressure

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;

use crate::error::Result;
use crate::protocol::PendingMessage;
use crate::session::SessionManager;

// ============================================================================
// Submodules
// ============================================================================

/// Send queue implementation.
pub mod core;

// ============================================================================
// Re-exports
// ============================================================================

pub use core::SendQueue;

// ============================================================================
// MessageSender
// ============================================================================

/// Something that can deliver one message and report the outcome.
#[async_trait]
pub trait MessageSender: Send + Sync {
    /// Delivers `message`. Resolves exactly once.
    async fn send(&self, message: &PendingMessage) -> Result<()>;
}

#[async_trait]
impl MessageSender for SessionManager {
    async fn send(&self, message: &PendingMessage) -> Result<()> {
        SessionManager::send(self, message).await
    }
}
