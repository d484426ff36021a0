//! Builder pattern for modem configuration.
//!
//! Provides a fluent API for configuring and creating [`Modem`] instances.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use modem_sms::{MemoryBus, Modem};
//!
//! # async fn example() -> modem_sms::Result<()> {
//! let modem = Modem::builder()
//!     .bus(Arc::new(MemoryBus::with_modem()))
//!     .build()
//!     .await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::transport::ModemBus;

use super::core::Modem;
use super::options::ModemOptions;

// ============================================================================
// ModemBuilder
// ============================================================================

/// Builder for configuring a [`Modem`] instance.
///
/// Use [`Modem::builder()`] to create a new builder.
#[derive(Default, Clone)]
pub struct ModemBuilder {
    /// Bus the modem talks to.
    bus: Option<Arc<dyn ModemBus>>,
    /// Retry and notification options.
    options: ModemOptions,
}

impl fmt::Debug for ModemBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModemBuilder")
            .field("bus", &self.bus.is_some())
            .field("options", &self.options)
            .finish()
    }
}

// ============================================================================
// ModemBuilder Implementation
// ============================================================================

impl ModemBuilder {
    /// Creates a new builder with default options and no bus.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the bus implementation.
    ///
    /// Without one, [`build`](Self::build) connects to the system bus when
    /// the `dbus` feature is enabled and fails otherwise.
    #[inline]
    #[must_use]
    pub fn bus(mut self, bus: Arc<dyn ModemBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Replaces all options.
    #[inline]
    #[must_use]
    pub fn options(mut self, options: ModemOptions) -> Self {
        self.options = options;
        self
    }

    /// Builds the modem, subscribes to service presence and runs the first
    /// discovery.
    ///
    /// A failed first discovery is not an error: the retry timer takes over.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if no bus is available or the options are invalid
    /// - Bus errors if the presence subscription fails
    pub async fn build(self) -> Result<Modem> {
        self.options.validate().map_err(Error::config)?;
        let bus = self.resolve_bus().await?;

        Modem::start(bus, self.options).await
    }
}

// ============================================================================
// Validation
// ============================================================================

impl ModemBuilder {
    #[cfg(feature = "dbus")]
    async fn resolve_bus(&self) -> Result<Arc<dyn ModemBus>> {
        match &self.bus {
            Some(bus) => Ok(Arc::clone(bus)),
            None => Ok(Arc::new(crate::transport::DbusBus::system().await?)),
        }
    }

    #[cfg(not(feature = "dbus"))]
    async fn resolve_bus(&self) -> Result<Arc<dyn ModemBus>> {
        self.bus.clone().ok_or_else(|| {
            Error::config(
                "A bus is required. Use .bus() to set it or enable the `dbus` feature.\n\
                 Example: Modem::builder().bus(Arc::new(MemoryBus::with_modem()))",
            )
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use crate::transport::MemoryBus;

    #[test]
    fn test_new_creates_empty_builder() {
        let builder = ModemBuilder::new();
        assert!(builder.bus.is_none());
        assert_eq!(builder.options, ModemOptions::new());
    }

    #[test]
    fn test_options_replaces_all() {
        let options = ModemOptions::new().with_max_send_retries(7);
        let builder = ModemBuilder::new().options(options.clone());
        assert_eq!(builder.options, options);
    }

    #[test]
    fn test_debug_hides_bus() {
        let builder = ModemBuilder::new().bus(Arc::new(MemoryBus::new()));
        let debug = format!("{builder:?}");
        assert!(debug.contains("bus: true"));
    }

    #[tokio::test]
    async fn test_build_rejects_invalid_options() {
        let result = ModemBuilder::new()
            .bus(Arc::new(MemoryBus::with_modem()))
            .options(ModemOptions::new().with_discovery_retry_interval(Duration::ZERO))
            .build()
            .await;

        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[cfg(not(feature = "dbus"))]
    #[tokio::test]
    async fn test_build_requires_bus() {
        let result = ModemBuilder::new().build().await;
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[tokio::test]
    async fn test_build_with_memory_bus() {
        let bus = Arc::new(MemoryBus::with_modem());
        let modem = ModemBuilder::new()
            .bus(bus.clone())
            .build()
            .await
            .expect("build");

        assert!(modem.is_ready());
        modem.close();
    }
}
