//! Modem SMS - Text messages through a modem manager on a message bus.
//!
//! This library sends SMS through a modem exposed by a modem management
//! service, keeping a cached handle to the modem's messaging object and
//! recovering when the service restarts.
//!
//! # Architecture
//!
//! - **Queue**: [`SendQueue`] keeps submissions in order and dispatches one
//!   at a time
//! - **Session**: [`SessionManager`] discovers the messaging object, retries
//!   on failure and tracks service presence
//! - **Transport**: [`ModemBus`] abstracts the remote calls; [`MemoryBus`]
//!   runs in-process, `DbusBus` talks to the system bus (`dbus` feature)
//!
//! Every submitted message produces exactly one [`ModemEvent::Sending`]
//! followed by one [`ModemEvent::Sent`] or [`ModemEvent::Failed`], until
//! [`Modem::close`] is called. After that queued messages are dropped and
//! the in-flight outcome is not reported.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use modem_sms::{MemoryBus, Modem, ModemEvent, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let modem = Modem::builder()
//!         .bus(Arc::new(MemoryBus::with_modem()))
//!         .build()
//!         .await?;
//!
//!     let mut events = modem.subscribe();
//!     modem.send_sms("+15551234567", "Hello from Rust");
//!
//!     while let Ok(event) = events.recv().await {
//!         match event {
//!             ModemEvent::Sent { recipient } => println!("sent to {recipient}"),
//!             ModemEvent::Failed { recipient } => println!("failed for {recipient}"),
//!             _ => continue,
//!         }
//!         break;
//!     }
//!
//!     modem.close();
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`modem`] | [`Modem`] facade, builder and options |
//! | [`queue`] | Single-flight FIFO send queue |
//! | [`session`] | Discovery, retry and presence tracking |
//! | [`transport`] | Bus abstraction and implementations |
//! | [`protocol`] | Bus constants and message types |
//! | [`notifier`] | Event fan-out |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |

// ============================================================================
// Modules
// ============================================================================

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers for bus objects and messages.
pub mod identifiers;

/// Modem facade and configuration.
///
/// Use [`Modem::builder()`] to create a configured modem.
pub mod modem;

/// Event fan-out to subscribers.
pub mod notifier;

/// Bus constants, events and message types.
pub mod protocol;

/// Single-flight FIFO send queue.
pub mod queue;

/// Session lifecycle against the modem service.
pub mod session;

/// Bus abstraction.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Modem types
pub use modem::{Modem, ModemBuilder, ModemOptions};

// Queue and session types
pub use queue::{MessageSender, SendQueue};
pub use session::{SessionConfig, SessionManager, SessionPhase};

// Protocol types
pub use protocol::{ModemEvent, PendingMessage, PresenceEvent, RemoteFault};

// Transport types
#[cfg(feature = "dbus")]
pub use transport::DbusBus;
pub use transport::{BusOp, MemoryBus, ModemBus};

// Notification types
pub use notifier::Notifier;

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{MessageId, ObjectPath};
