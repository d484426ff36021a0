//! ModemManager protocol types.
//!
//! This module defines the values exchanged between the session manager
//! and the bus, and the notifications raised towards the caller.
//!
//! # Protocol Overview
//!
//! | Step | Call | Target |
//! |------|------|--------|
//! | Discovery | `GetManagedObjects` | [`MANAGER_PATH`] via [`OBJECT_MANAGER_INTERFACE`] |
//! | Create | `Create({number, text})` | messaging object via [`MESSAGING_INTERFACE`] |
//! | Dispatch | `Send()` | created message via [`SMS_INTERFACE`] |
//!
//! Presence of [`SERVICE_NAME`] on the bus is tracked separately and
//! delivered as [`PresenceEvent`]s.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `event` | Caller notifications and presence events |
//! | `fault` | Bus error names and their classification |
//! | `message` | Pending messages and `Create` properties |
//! | `registry` | Managed object registry snapshot |

// ============================================================================
// Submodules
// ============================================================================

/// Caller notifications and service presence events.
pub mod event;

/// Remote fault classification.
pub mod fault;

/// Message types.
pub mod message;

/// Managed object registry.
pub mod registry;

// ============================================================================
// Re-exports
// ============================================================================

pub use event::{ModemEvent, PresenceEvent};
pub use fault::RemoteFault;
pub use message::{MessageProperties, PendingMessage};
pub use registry::{ManagedObject, ManagedObjects};

// ============================================================================
// Constants
// ============================================================================

/// Well-known bus name of the modem service.
pub const SERVICE_NAME: &str = "org.freedesktop.ModemManager1";

/// Object path of the service's object manager.
pub const MANAGER_PATH: &str = "/org/freedesktop/ModemManager1";

/// Standard object manager interface.
pub const OBJECT_MANAGER_INTERFACE: &str = "org.freedesktop.DBus.ObjectManager";

/// Interface exposed by modems able to create text messages.
pub const MESSAGING_INTERFACE: &str = "org.freedesktop.ModemManager1.Modem.Messaging";

/// Interface exposed by a created text message.
pub const SMS_INTERFACE: &str = "org.freedesktop.ModemManager1.Sms";
