//! Modem entry point.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Modem`] | Caller-facing facade: send, resend, subscribe |
//! | [`ModemBuilder`] | Fluent configuration builder |
//! | [`ModemOptions`] | Retry and notification options |

// ============================================================================
// Submodules
// ============================================================================

/// Fluent builder pattern for modem configuration.
pub mod builder;

/// Core modem implementation.
pub mod core;

/// Retry and notification options.
pub mod options;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::ModemBuilder;
pub use core::Modem;
pub use options::ModemOptions;
