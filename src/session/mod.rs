//! Session management.
//!
//! The session manager owns the lifecycle of the connection to the modem's
//! messaging control object: discovery, validity caching, retry on failure
//! and service-presence tracking. Higher layers only see
//! [`SessionManager::send`].
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`SessionManager`] | Discovery state machine and two-phase send |
//! | [`SessionConfig`] | Retry intervals and limits |
//! | [`SessionPhase`] | Observable discovery state |

// ============================================================================
// Submodules
// ============================================================================

/// Session manager implementation.
pub mod manager;

/// Session state and configuration.
pub mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub use manager::SessionManager;
pub use state::{SessionConfig, SessionPhase};
