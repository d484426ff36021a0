//! Remote fault classification.
//!
//! The bus reports failures as an error name plus a message. This module
//! maps the names the session manager treats as transient onto dedicated
//! [`Error`] variants; every other name becomes [`Error::Remote`].

// ============================================================================
// Imports
// ============================================================================

use crate::error::Error;
use crate::identifiers::ObjectPath;

// ============================================================================
// Constants
// ============================================================================

/// Arguments rejected by the callee.
pub const INVALID_ARGS: &str = "org.freedesktop.DBus.Error.InvalidArgs";

/// Object path does not exist.
pub const UNKNOWN_OBJECT: &str = "org.freedesktop.DBus.Error.UnknownObject";

/// Destination name is not owned by anyone.
pub const SERVICE_UNKNOWN: &str = "org.freedesktop.DBus.Error.ServiceUnknown";

/// Generic failure.
pub const FAILED: &str = "org.freedesktop.DBus.Error.Failed";

// ============================================================================
// RemoteFault
// ============================================================================

/// A failure reported by the remote end of a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFault {
    /// Error name, e.g. `org.freedesktop.DBus.Error.Failed`.
    pub name: String,

    /// Human-readable message.
    pub message: String,
}

impl RemoteFault {
    /// Creates a new fault.
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Converts the fault into a classified [`Error`].
    ///
    /// `target` is the object the failing call was addressed to; it is
    /// carried by [`Error::UnknownObject`].
    #[must_use]
    pub fn into_error(self, target: &ObjectPath) -> Error {
        match self.name.as_str() {
            INVALID_ARGS => Error::invalid_args(self.message),
            UNKNOWN_OBJECT => Error::unknown_object(target.clone()),
            SERVICE_UNKNOWN => Error::service_unknown(self.message),
            FAILED => Error::failed(self.message),
            _ => Error::remote(self.name, self.message),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> ObjectPath {
        ObjectPath::new("/org/freedesktop/ModemManager1/Modem/0").expect("valid")
    }

    #[test]
    fn test_known_names_are_transient() {
        for name in [INVALID_ARGS, UNKNOWN_OBJECT, SERVICE_UNKNOWN, FAILED] {
            let err = RemoteFault::new(name, "x").into_error(&target());
            assert!(err.is_transient(), "{name} should be transient");
        }
    }

    #[test]
    fn test_unknown_object_keeps_target() {
        let err = RemoteFault::new(UNKNOWN_OBJECT, "gone").into_error(&target());
        assert!(matches!(err, Error::UnknownObject { path } if path == target()));
    }

    #[test]
    fn test_other_names_are_fatal() {
        let err = RemoteFault::new("org.freedesktop.ModemManager1.Error.Core.Unsupported", "no")
            .into_error(&target());
        assert!(!err.is_transient());
        assert!(matches!(err, Error::Remote { .. }));
    }
}
