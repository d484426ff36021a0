//! Message types.

// ============================================================================
// Imports
// ============================================================================

use serde::Serialize;

use crate::identifiers::MessageId;

// ============================================================================
// PendingMessage
// ============================================================================

/// A message waiting in (or taken from) the send queue.
///
/// Immutable once created. The body is opaque: no encoding, length or
/// segmentation checks are made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMessage {
    /// Correlation ID for logs.
    pub id: MessageId,

    /// Recipient phone number.
    pub recipient: String,

    /// Message text.
    pub body: String,
}

impl PendingMessage {
    /// Creates a new message with a fresh ID.
    #[inline]
    #[must_use]
    pub fn new(recipient: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: MessageId::generate(),
            recipient: recipient.into(),
            body: body.into(),
        }
    }

    /// Copies recipient and body into a new message with a fresh ID.
    #[inline]
    #[must_use]
    pub fn resubmission(&self) -> Self {
        Self::new(self.recipient.clone(), self.body.clone())
    }

    /// Returns the `Create` call properties for this message.
    #[inline]
    #[must_use]
    pub fn properties(&self) -> MessageProperties {
        MessageProperties {
            number: self.recipient.clone(),
            text: self.body.clone(),
        }
    }
}

// ============================================================================
// MessageProperties
// ============================================================================

/// Properties dictionary passed to the messaging `Create` call.
///
/// # Format
///
/// ```json
/// { "number": "+15551234567", "text": "hi" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageProperties {
    /// Recipient phone number.
    pub number: String,

    /// Message text.
    pub text: String,
}

// ============================================================================
// Tests
// ============================================================================
