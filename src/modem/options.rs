//! Modem retry and notification options.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use modem_sms::ModemOptions;
//!
//! let options = ModemOptions::new()
//!     .with_discovery_retry_interval(Duration::from_secs(5))
//!     .with_max_send_retries(1);
//!
//! assert!(options.validate().is_ok());
//! ```
//!
//! Options can also be loaded from JSON, with durations in milliseconds:
//!
//! ```json
//! { "discoveryRetryIntervalMs": 5000, "maxSendRetries": 1 }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::notifier::DEFAULT_EVENT_CAPACITY;
use crate::session::SessionConfig;
use crate::session::state::{
    DEFAULT_MAX_DISCOVERY_RETRIES, DEFAULT_MAX_SEND_RETRIES, DEFAULT_RETRY_INTERVAL,
    DEFAULT_SEND_RETRY_DELAY,
};

// ============================================================================
// ModemOptions
// ============================================================================

/// Retry and notification configuration of a [`super::Modem`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct ModemOptions {
    /// Period of the discovery retry timer.
    #[serde(rename = "discoveryRetryIntervalMs", with = "millis")]
    pub discovery_retry_interval: Duration,

    /// Timer-driven discovery attempts before giving up.
    pub max_discovery_retries: u32,

    /// Retries of a send after transient failures.
    pub max_send_retries: u32,

    /// Pause before a retried send.
    #[serde(rename = "sendRetryDelayMs", with = "millis")]
    pub send_retry_delay: Duration,

    /// Events buffered per subscriber before it starts lagging.
    pub event_capacity: usize,
}

impl Default for ModemOptions {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl ModemOptions {
    /// Creates options with default settings.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            discovery_retry_interval: DEFAULT_RETRY_INTERVAL,
            max_discovery_retries: DEFAULT_MAX_DISCOVERY_RETRIES,
            max_send_retries: DEFAULT_MAX_SEND_RETRIES,
            send_retry_delay: DEFAULT_SEND_RETRY_DELAY,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    /// Parses options from JSON. Missing fields keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Json`] on malformed input or unknown fields.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl ModemOptions {
    /// Sets the discovery retry period.
    #[inline]
    #[must_use]
    pub fn with_discovery_retry_interval(mut self, interval: Duration) -> Self {
        self.discovery_retry_interval = interval;
        self
    }

    /// Sets the number of timer-driven discovery attempts.
    #[inline]
    #[must_use]
    pub fn with_max_discovery_retries(mut self, retries: u32) -> Self {
        self.max_discovery_retries = retries;
        self
    }

    /// Sets the number of send retries.
    #[inline]
    #[must_use]
    pub fn with_max_send_retries(mut self, retries: u32) -> Self {
        self.max_send_retries = retries;
        self
    }

    /// Sets the pause before a retried send.
    #[inline]
    #[must_use]
    pub fn with_send_retry_delay(mut self, delay: Duration) -> Self {
        self.send_retry_delay = delay;
        self
    }

    /// Sets the per-subscriber event buffer.
    #[inline]
    #[must_use]
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }
}

// ============================================================================
// Conversion Methods
// ============================================================================

impl ModemOptions {
    /// Validates the options configuration.
    ///
    /// # Errors
    ///
    /// Returns error message if validation fails.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.discovery_retry_interval.is_zero() {
            return Err("Discovery retry interval must be greater than zero".to_string());
        }
        if self.event_capacity == 0 {
            return Err("Event capacity must be greater than zero".to_string());
        }
        Ok(())
    }

    /// Returns the session part of the options.
    #[inline]
    #[must_use]
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            retry_interval: self.discovery_retry_interval,
            max_discovery_retries: self.max_discovery_retries,
            max_send_retries: self.max_send_retries,
            send_retry_delay: self.send_retry_delay,
        }
    }
}

// ============================================================================
// Serde Helpers
// ============================================================================

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(
        value: &Duration,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let ms = u64::try_from(value.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(ms)
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_new_matches_defaults() {
        let options = ModemOptions::new();
        assert_eq!(options.discovery_retry_interval, Duration::from_millis(2000));
        assert_eq!(options.max_discovery_retries, 100);
        assert_eq!(options.max_send_retries, 3);
        assert_eq!(options.send_retry_delay, Duration::from_millis(1000));
        assert_eq!(options.event_capacity, 64);
        assert_eq!(options, ModemOptions::default());
    }

    #[test]
    fn test_builder_chain() {
        let options = ModemOptions::new()
            .with_discovery_retry_interval(Duration::from_secs(5))
            .with_max_discovery_retries(10)
            .with_max_send_retries(0)
            .with_send_retry_delay(Duration::ZERO)
            .with_event_capacity(8);

        assert_eq!(options.discovery_retry_interval, Duration::from_secs(5));
        assert_eq!(options.max_discovery_retries, 10);
        assert_eq!(options.max_send_retries, 0);
        assert_eq!(options.send_retry_delay, Duration::ZERO);
        assert_eq!(options.event_capacity, 8);
    }

    #[test]
    fn test_session_config() {
        let config = ModemOptions::new()
            .with_max_send_retries(5)
            .session_config();
        assert_eq!(config.max_send_retries, 5);
        assert_eq!(config.retry_interval, DEFAULT_RETRY_INTERVAL);
        assert_eq!(config, SessionConfig {
            max_send_retries: 5,
            ..SessionConfig::default()
        });
    }

    #[test]
    fn test_validate_valid() {
        assert!(ModemOptions::new().validate().is_ok());
    }

    #[test]
    fn test_validate_zero_interval() {
        let options = ModemOptions::new().with_discovery_retry_interval(Duration::ZERO);
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_validate_zero_capacity() {
        let options = ModemOptions::new().with_event_capacity(0);
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_from_json_partial() {
        let options =
            ModemOptions::from_json(r#"{"discoveryRetryIntervalMs": 500, "maxSendRetries": 1}"#)
                .expect("valid json");
        assert_eq!(options.discovery_retry_interval, Duration::from_millis(500));
        assert_eq!(options.max_send_retries, 1);
        assert_eq!(options.max_discovery_retries, 100);
    }

    #[test]
    fn test_from_json_empty_object() {
        let options = ModemOptions::from_json("{}").expect("valid json");
        assert_eq!(options, ModemOptions::new());
    }

    #[test]
    fn test_from_json_unknown_field() {
        let result = ModemOptions::from_json(r#"{"retries": 1}"#);
        assert!(matches!(result, Err(Error::Json(_))));
    }

    #[test]
    fn test_serialize_uses_milliseconds() {
        let json = serde_json::to_value(ModemOptions::new()).expect("serialize");
        assert_eq!(json["discoveryRetryIntervalMs"], 2000);
        assert_eq!(json["sendRetryDelayMs"], 1000);
        assert_eq!(json["eventCapacity"], 64);
    }
}
