//! Caller notifications.
//!
//! [`Notifier`] fans [`ModemEvent`]s out to any number of subscribers over a
//! broadcast channel. Sending never waits: a subscriber that falls behind
//! sees `RecvError::Lagged` and skips ahead. Log notifications are mirrored
//! to `tracing` so the same diagnostics reach a subscriber-less process.

// ============================================================================
// Imports
// ============================================================================

use tokio::sync::broadcast;
use tracing::{error, info};

use crate::protocol::ModemEvent;

// ============================================================================
// Constants
// ============================================================================

/// Default number of events buffered per subscriber.
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

// ============================================================================
// Notifier
// ============================================================================

/// Broadcasts [`ModemEvent`]s to subscribers.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: broadcast::Sender<ModemEvent>,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl Notifier {
    /// Creates a notifier buffering `capacity` events per subscriber.
    ///
    /// A capacity of zero is raised to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Subscribes to all future events.
    #[inline]
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ModemEvent> {
        self.tx.subscribe()
    }

    /// Returns the number of live subscribers.
    #[inline]
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Publishes an event. Having no subscribers is not an error.
    #[inline]
    pub fn emit(&self, event: ModemEvent) {
        let _ = self.tx.send(event);
    }

    /// Publishes an informational log line.
    pub fn info(&self, message: impl Into<String>) {
        let message = message.into();
        info!("{message}");
        self.emit(ModemEvent::LogInfo { message });
    }

    /// Publishes an error log line.
    pub fn error(&self, message: impl Into<String>) {
        let message = message.into();
        error!("{message}");
        self.emit(ModemEvent::LogError { message });
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_reaches_all_subscribers() {
        let notifier = Notifier::default();
        let mut a = notifier.subscribe();
        let mut b = notifier.subscribe();
        assert_eq!(notifier.subscriber_count(), 2);

        notifier.info("hello");

        let expected = ModemEvent::LogInfo {
            message: "hello".into(),
        };
        assert_eq!(a.recv().await.expect("event"), expected);
        assert_eq!(b.recv().await.expect("event"), expected);
    }

    #[test]
    fn test_emit_without_subscribers() {
        let notifier = Notifier::new(0);
        notifier.error("nobody listens");
        assert_eq!(notifier.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_lagging_subscriber_does_not_block() {
        let notifier = Notifier::new(2);
        let mut rx = notifier.subscribe();

        for i in 0..5 {
            notifier.info(format!("line {i}"));
        }

        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(3))
        ));
        assert_eq!(
            rx.recv().await.expect("event"),
            ModemEvent::LogInfo {
                message: "line 3".into()
            }
        );
    }
}
