//! Event types.
//!
//! [`ModemEvent`]s flow from the crate to the caller (UI bindings, logs).
//! [`PresenceEvent`]s flow from the bus to the session manager.

// ============================================================================
// Imports
// ============================================================================

use serde::Serialize;

// ============================================================================
// ModemEvent
// ============================================================================

/// A notification raised to the caller.
///
/// Notifications never block the send queue. Serialized form is suitable
/// for forwarding to a UI layer:
///
/// ```json
/// { "type": "sent", "recipient": "+15551234567" }
/// { "type": "logError", "message": "[Modem] ModemManager service disappeared" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ModemEvent {
    /// A message was handed to the session manager.
    Sending {
        /// Recipient of the message.
        recipient: String,
    },

    /// A message was dispatched by the modem.
    Sent {
        /// Recipient of the message.
        recipient: String,
    },

    /// A message could not be sent.
    Failed {
        /// Recipient of the message.
        recipient: String,
    },

    /// Informational log line.
    LogInfo {
        /// Human-readable text.
        message: String,
    },

    /// Error log line.
    LogError {
        /// Human-readable text.
        message: String,
    },
}

impl ModemEvent {
    /// Returns the recipient for dispatch lifecycle events.
    #[inline]
    #[must_use]
    pub fn recipient(&self) -> Option<&str> {
        match self {
            Self::Sending { recipient } | Self::Sent { recipient } | Self::Failed { recipient } => {
                Some(recipient)
            }
            Self::LogInfo { .. } | Self::LogError { .. } => None,
        }
    }

    /// Returns `true` for log notifications.
    #[inline]
    #[must_use]
    pub fn is_log(&self) -> bool {
        matches!(self, Self::LogInfo { .. } | Self::LogError { .. })
    }
}

// ============================================================================
// PresenceEvent
// ============================================================================

/// Registration state change of the modem service on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceEvent {
    /// The service acquired its well-known name.
    Registered,
    /// The service lost its well-known name.
    Unregistered,
}

// ============================================================================
// Tests
// ============================================================================
