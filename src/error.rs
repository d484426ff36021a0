//! Error types for modem-sms.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use modem_sms::{Modem, Result};
//!
//! async fn example(modem: &Modem) -> Result<()> {
//!     modem.send_sms("+15551234567", "hello");
//!     modem.resend()?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Discovery | [`Error::ServiceUnavailable`], [`Error::InvalidRegistry`], [`Error::MessagingNotFound`], [`Error::InvalidHandle`] |
//! | Remote call (transient) | [`Error::InvalidArgs`], [`Error::UnknownObject`], [`Error::ServiceUnknown`], [`Error::Failed`] |
//! | Remote call (fatal) | [`Error::Remote`] |
//! | Lifecycle | [`Error::SessionClosed`], [`Error::NothingToResend`] |
//! | External | [`Error::Json`], `Error::Bus` |

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use thiserror::Error;

use crate::identifiers::ObjectPath;

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
    /// Returned when modem options or builder input are invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Discovery Errors
    // ========================================================================
    /// The modem service is not registered on the bus.
    #[error("Modem service unavailable")]
    ServiceUnavailable,

    /// The object registry reply could not be interpreted.
    #[error("Invalid registry reply: {message}")]
    InvalidRegistry {
        /// Description of the malformed reply.
        message: String,
    },

    /// No managed object exposes the messaging capability.
    #[error("No messaging-capable modem found")]
    MessagingNotFound,

    /// A messaging handle could not be validated.
    #[error("Invalid messaging handle at {path}: {message}")]
    InvalidHandle {
        /// Object path of the rejected handle.
        path: ObjectPath,
        /// Reason reported by the bus.
        message: String,
    },

    // ========================================================================
    // Remote Call Errors
    // ========================================================================
    /// Call arguments were rejected, usually because of stale state.
    #[error("Invalid arguments: {message}")]
    InvalidArgs {
        /// Message reported by the bus.
        message: String,
    },

    /// The target object does not exist (anymore).
    #[error("Unknown object: {path}")]
    UnknownObject {
        /// The missing object path.
        path: ObjectPath,
    },

    /// The callee is not reachable on the bus.
    #[error("Service unknown: {message}")]
    ServiceUnknown {
        /// Message reported by the bus.
        message: String,
    },

    /// Generic call failure.
    #[error("Call failed: {message}")]
    Failed {
        /// Message reported by the bus.
        message: String,
    },

    /// Any other remote error.
    #[error("Remote error {name}: {message}")]
    Remote {
        /// Error name as reported by the bus.
        name: String,
        /// Message reported by the bus.
        message: String,
    },

    // ========================================================================
    // Lifecycle Errors
    // ========================================================================
    /// The session manager has been shut down.
    #[error("Session closed")]
    SessionClosed,

    /// No message has been dispatched yet, so there is nothing to resend.
    #[error("No message has been dispatched yet")]
    NothingToResend,

    // ========================================================================
    // External Errors
    // ========================================================================
    /// JSON deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// D-Bus error not mapped to a more specific variant.
    #[cfg(feature = "dbus")]
    #[error("D-Bus error: {0}")]
    Bus(#[from] zbus::Error),
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

    /// Creates an invalid registry error.
    #[inline]
    pub fn invalid_registry(message: impl Into<String>) -> Self {
        Self::InvalidRegistry {
            message: message.into(),
        }
    }

    /// Creates an invalid handle error.
    #[inline]
    pub fn invalid_handle(path: ObjectPath, message: impl Into<String>) -> Self {
        Self::InvalidHandle {
            path,
            message: message.into(),
        }
    }

    /// Creates an invalid arguments error.
    #[inline]
    pub fn invalid_args(message: impl Into<String>) -> Self {
        Self::InvalidArgs {
            message: message.into(),
        }
    }

    /// Creates an unknown object error.
    #[inline]
    pub fn unknown_object(path: ObjectPath) -> Self {
        Self::UnknownObject { path }
    }

    /// Creates a service unknown error.
    #[inline]
    pub fn service_unknown(message: impl Into<String>) -> Self {
        Self::ServiceUnknown {
            message: message.into(),
        }
    }

    /// Creates a generic call failure.
    #[inline]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }

    /// Creates a remote error with an arbitrary error name.
    #[inline]
    pub fn remote(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Remote {
            name: name.into(),
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if a remote call failing with this error may be retried.
    ///
    /// This is an allow-list: anything not listed is fatal.
    #[inline]
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::InvalidArgs { .. }
                | Self::UnknownObject { .. }
                | Self::ServiceUnknown { .. }
                | Self::Failed { .. }
        )
    }

    /// Returns `true` if this error came out of control object discovery.
    #[inline]
    #[must_use]
    pub fn is_discovery_error(&self) -> bool {
        matches!(
            self,
            Self::ServiceUnavailable
                | Self::InvalidRegistry { .. }
                | Self::MessagingNotFound
                | Self::InvalidHandle { .. }
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn path(raw: &str) -> ObjectPath {
        ObjectPath::new(raw).expect("valid path")
    }

    #[test]
    fn test_error_display() {
        let err = Error::failed("modem busy");
        assert_eq!(err.to_string(), "Call failed: modem busy");
    }

    #[test]
    fn test_config_error() {
        let err = Error::config("max_send_retries too large");
        assert_eq!(
            err.to_string(),
            "Configuration error: max_send_retries too large"
        );
    }

    #[test]
    fn test_transient_allow_list() {
        assert!(Error::invalid_args("stale").is_transient());
        assert!(Error::unknown_object(path("/org/freedesktop/ModemManager1/SMS/3")).is_transient());
        assert!(Error::service_unknown("gone").is_transient());
        assert!(Error::failed("busy").is_transient());
    }

    #[test]
    fn test_fatal_errors() {
        assert!(!Error::remote("org.freedesktop.DBus.Error.AccessDenied", "no").is_transient());
        assert!(!Error::ServiceUnavailable.is_transient());
        assert!(!Error::MessagingNotFound.is_transient());
        assert!(!Error::SessionClosed.is_transient());
        assert!(!Error::config("x").is_transient());
    }

    #[test]
    fn test_is_discovery_error() {
        assert!(Error::ServiceUnavailable.is_discovery_error());
        assert!(Error::invalid_registry("not a map").is_discovery_error());
        assert!(Error::MessagingNotFound.is_discovery_error());
        assert!(Error::invalid_handle(path("/m/0"), "introspection failed").is_discovery_error());
        assert!(!Error::failed("x").is_discovery_error());
    }

    #[test]
    fn test_unknown_object_display() {
        let err = Error::unknown_object(path("/org/freedesktop/ModemManager1/SMS/7"));
        assert_eq!(
            err.to_string(),
            "Unknown object: /org/freedesktop/ModemManager1/SMS/7"
        );
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }
}
