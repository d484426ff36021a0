//! Session state and configuration.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::identifiers::ObjectPath;
use crate::protocol::MessageProperties;

// ============================================================================
// Constants
// ============================================================================

/// Interval between discovery retries.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(2000);

/// Discovery retries before giving up until the service re-registers.
pub const DEFAULT_MAX_DISCOVERY_RETRIES: u32 = 100;

/// Retries of the create/dispatch exchange, shared by both phases.
pub const DEFAULT_MAX_SEND_RETRIES: u32 = 3;

/// Pause before rediscovering for a retried exchange.
pub const DEFAULT_SEND_RETRY_DELAY: Duration = Duration::from_millis(1000);

// ============================================================================
// SessionConfig
// ============================================================================

/// Retry configuration of a [`super::SessionManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Period of the discovery retry timer.
    pub retry_interval: Duration,

    /// Timer-driven discovery attempts before entering [`SessionPhase::Failed`].
    pub max_discovery_retries: u32,

    /// Retries of a send after transient failures, across both phases.
    pub max_send_retries: u32,

    /// Delay before a retried exchange.
    pub send_retry_delay: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            retry_interval: DEFAULT_RETRY_INTERVAL,
            max_discovery_retries: DEFAULT_MAX_DISCOVERY_RETRIES,
            max_send_retries: DEFAULT_MAX_SEND_RETRIES,
            send_retry_delay: DEFAULT_SEND_RETRY_DELAY,
        }
    }
}

// ============================================================================
// SessionPhase
// ============================================================================

/// Discovery state of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// No discovery has run yet, or the last one failed without a timer.
    Uninitialized,
    /// A discovery attempt is in progress.
    Discovering,
    /// A verified control object is cached.
    Ready,
    /// The retry timer is armed.
    Retrying,
    /// Retries are exhausted; waiting for the service to re-register.
    Failed,
    /// The service is not registered on the bus.
    Unavailable,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::Discovering => "discovering",
            Self::Ready => "ready",
            Self::Retrying => "retrying",
            Self::Failed => "failed",
            Self::Unavailable => "unavailable",
        };
        f.write_str(name)
    }
}

// ============================================================================
// SessionState
// ============================================================================

/// Mutable state of a session manager, guarded by one lock.
///
/// `control_valid` implies `control_path` is a verified live object.
/// Every invalidation bumps `epoch`, so a discovery that started before the
/// invalidation cannot commit its result.
#[derive(Debug)]
pub(crate) struct SessionState {
    pub control_path: Option<ObjectPath>,
    pub control_valid: bool,
    pub service_available: bool,
    pub retry_count: u32,
    pub phase: SessionPhase,
    pub epoch: u64,
    pub closed: bool,
    pub retry_timer: Option<JoinHandle<()>>,
    pub presence_task: Option<JoinHandle<()>>,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            control_path: None,
            control_valid: false,
            service_available: true,
            retry_count: 0,
            phase: SessionPhase::Uninitialized,
            epoch: 0,
            closed: false,
            retry_timer: None,
            presence_task: None,
        }
    }

    /// Returns the cached control object if it is valid.
    #[inline]
    pub fn ready_path(&self) -> Option<&ObjectPath> {
        if self.control_valid {
            self.control_path.as_ref()
        } else {
            None
        }
    }

    /// Drops the cached control object.
    pub fn invalidate(&mut self) {
        self.control_valid = false;
        self.control_path = None;
        self.epoch = self.epoch.wrapping_add(1);
    }

    /// Stops the retry timer. Returns `true` if one was armed.
    pub fn stop_retry_timer(&mut self) -> bool {
        match self.retry_timer.take() {
            Some(timer) => {
                timer.abort();
                true
            }
            None => false,
        }
    }
}

// ============================================================================
// SendAttempt
// ============================================================================

/// Per-send retry bookkeeping. Never shared between sends.
#[derive(Debug, Clone)]
pub(crate) struct SendAttempt {
    pub retries_used: u32,
    pub properties: MessageProperties,
}

impl SendAttempt {
    pub fn new(properties: MessageProperties) -> Self {
        Self {
            retries_used: 0,
            properties,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SessionConfig::default();
        assert_eq!(config.retry_interval, Duration::from_secs(2));
        assert_eq!(config.max_discovery_retries, 100);
        assert_eq!(config.max_send_retries, 3);
        assert_eq!(config.send_retry_delay, Duration::from_secs(1));
    }

    #[test]
    fn test_invalidate_bumps_epoch() {
        let mut state = SessionState::new();
        state.control_path = ObjectPath::new("/m/0");
        state.control_valid = true;
        assert!(state.ready_path().is_some());

        let before = state.epoch;
        state.invalidate();
        assert!(state.ready_path().is_none());
        assert!(state.control_path.is_none());
        assert_eq!(state.epoch, before + 1);
    }

    #[test]
    fn test_stop_without_timer() {
        let mut state = SessionState::new();
        assert!(!state.stop_retry_timer());
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(SessionPhase::Ready.to_string(), "ready");
        assert_eq!(SessionPhase::Failed.to_string(), "failed");
    }
}
