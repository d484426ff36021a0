//! Bus transport layer.
//!
//! This module defines the narrow capability set the session manager needs
//! from the message bus, and the implementations of it.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐                          ┌──────────────────┐
//! │  SessionManager  │        ModemBus          │  ModemManager    │
//! │                  │─────────────────────────►│  (system bus)    │
//! │  discovery       │  GetManagedObjects       │                  │
//! │  create/dispatch │  Messaging.Create        │  Modem/N         │
//! │                  │  Sms.Send                │  SMS/M           │
//! │  presence task   │◄─────────────────────────│  NameOwnerChanged│
//! └──────────────────┘      PresenceStream      └──────────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `memory` | In-process scriptable bus |
//! | `dbus` | ModemManager on the system bus (feature `dbus`) |

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::error::Result;
use crate::identifiers::ObjectPath;
use crate::protocol::{ManagedObjects, MessageProperties, PresenceEvent};

// ============================================================================
// Submodules
// ============================================================================

/// In-process bus with scriptable failures.
pub mod memory;

/// ModemManager over the system D-Bus.
#[cfg(feature = "dbus")]
pub mod dbus;

// ============================================================================
// Re-exports
// ============================================================================

#[cfg(feature = "dbus")]
pub use dbus::DbusBus;
pub use memory::{BusOp, MemoryBus};

// ============================================================================
// Types
// ============================================================================

/// Stream of service registration changes.
pub type PresenceStream = BoxStream<'static, PresenceEvent>;

// ============================================================================
// ModemBus
// ============================================================================

/// Remote operations used by the session manager.
///
/// Failures of `create_message` and `send_message` must be classified
/// (see [`crate::Error::is_transient`]) so the caller can decide whether to
/// retry.
#[async_trait]
pub trait ModemBus: Send + Sync {
    /// Queries the service's object registry.
    async fn managed_objects(&self) -> Result<ManagedObjects>;

    /// Validates that a messaging handle can be built for `path`.
    async fn probe_messaging(&self, path: &ObjectPath) -> Result<()>;

    /// Creates a message object on the messaging object at `messaging`.
    ///
    /// Returns the path of the created message.
    async fn create_message(
        &self,
        messaging: &ObjectPath,
        properties: &MessageProperties,
    ) -> Result<ObjectPath>;

    /// Dispatches a previously created message.
    async fn send_message(&self, message: &ObjectPath) -> Result<()>;

    /// Subscribes to service registration changes.
    async fn presence(&self) -> Result<PresenceStream>;
}
