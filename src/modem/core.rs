//! Modem facade.
//!
//! The [`Modem`] ties a [`SessionManager`] and a [`SendQueue`] to one
//! [`Notifier`]. Callers submit messages, ask for a resend and subscribe to
//! events; everything else happens in background tasks.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use modem_sms::{MemoryBus, Modem, ModemEvent};
//!
//! # async fn example() -> modem_sms::Result<()> {
//! let modem = Modem::builder()
//!     .bus(Arc::new(MemoryBus::with_modem()))
//!     .build()
//!     .await?;
//!
//! let mut events = modem.subscribe();
//! modem.send_sms("+15551234567", "hello");
//!
//! while let Ok(event) = events.recv().await {
//!     if let ModemEvent::Sent { recipient } = event {
//!         println!("delivered to {recipient}");
//!         break;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::info;

use crate::error::Result;
use crate::identifiers::MessageId;
use crate::notifier::Notifier;
use crate::protocol::ModemEvent;
use crate::queue::SendQueue;
use crate::session::{SessionManager, SessionPhase};
use crate::transport::ModemBus;

use super::builder::ModemBuilder;
use super::options::ModemOptions;

// ============================================================================
// Types
// ============================================================================

/// Internal shared state for the modem.
pub(crate) struct ModemInner {
    /// Options the modem was built with.
    pub options: ModemOptions,

    /// Event fan-out shared by session and queue.
    pub notifier: Notifier,

    /// Discovery and two-phase send.
    pub session: SessionManager,

    /// Single-flight FIFO in front of the session.
    pub queue: SendQueue,
}

// ============================================================================
// Modem
// ============================================================================

/// SMS sender backed by a modem on a message bus.
///
/// Cloning yields another handle to the same modem.
#[derive(Clone)]
pub struct Modem {
    /// Shared inner state.
    pub(crate) inner: Arc<ModemInner>,
}

// ============================================================================
// Modem - Display
// ============================================================================

impl fmt::Debug for Modem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Modem")
            .field("phase", &self.phase())
            .field("queued", &self.inner.queue.len())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Modem - Construction
// ============================================================================

impl Modem {
    /// Creates a configuration builder for the modem.
    #[inline]
    #[must_use]
    pub fn builder() -> ModemBuilder {
        ModemBuilder::new()
    }

    /// Wires the components together and starts discovery.
    pub(crate) async fn start(bus: Arc<dyn ModemBus>, options: ModemOptions) -> Result<Self> {
        let notifier = Notifier::new(options.event_capacity);
        let session = SessionManager::new(bus, options.session_config(), notifier.clone());
        let queue = SendQueue::new(Arc::new(session.clone()), notifier.clone());

        session.watch_presence().await?;
        let ready = session.initialize().await;
        info!(ready, "Modem started");

        Ok(Self {
            inner: Arc::new(ModemInner {
                options,
                notifier,
                session,
                queue,
            }),
        })
    }
}

// ============================================================================
// Modem - Public API
// ============================================================================

impl Modem {
    /// Queues a text message. Never blocks; the outcome arrives as a
    /// [`ModemEvent::Sent`] or [`ModemEvent::Failed`].
    pub fn send_sms(&self, recipient: impl Into<String>, body: impl Into<String>) -> MessageId {
        self.inner.queue.submit(recipient, body)
    }

    /// Queues the most recently dispatched message again.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::NothingToResend`] if nothing was dispatched
    /// yet.
    pub fn resend(&self) -> Result<MessageId> {
        self.inner.queue.resend_last()
    }

    /// Subscribes to message outcomes and log lines.
    #[inline]
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ModemEvent> {
        self.inner.notifier.subscribe()
    }

    /// Returns whether a control object is ready, attempting discovery if not.
    pub async fn ensure_ready(&self) -> bool {
        self.inner.session.ensure_ready().await
    }

    /// Returns `true` if a verified control object is cached.
    #[inline]
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.phase() == SessionPhase::Ready
    }

    /// Returns the current discovery phase.
    #[inline]
    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        self.inner.session.phase()
    }

    /// Returns the options the modem was built with.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &ModemOptions {
        &self.inner.options
    }

    /// Returns the session manager.
    #[inline]
    #[must_use]
    pub fn session(&self) -> &SessionManager {
        &self.inner.session
    }

    /// Returns the send queue.
    #[inline]
    #[must_use]
    pub fn queue(&self) -> &SendQueue {
        &self.inner.queue
    }

    /// Drops queued messages and stops all background work.
    ///
    /// A message already in flight resolves silently.
    pub fn close(&self) {
        let dropped = self.inner.queue.close();
        self.inner.session.shutdown();
        info!(dropped, "Modem closed");
    }
}

// ============================================================================
// Tests
// ============================================================================
