//! Session manager.
//!
//! Owns the cached messaging control object, keeps it valid across service
//! restarts and drives the create-then-dispatch exchange.
//!
//! # Discovery
//!
//! ```text
//! Uninitialized ──► Discovering ──► Ready
//!                        │            │ invalidation
//!                        ▼            ▼
//!                    Retrying ──► Discovering ...
//!                        │ retries exhausted
//!                        ▼
//!                     Failed ──(service registered)──► Discovering
//!
//! any ──(service unregistered)──► Unavailable ──(registered)──► Discovering
//! ```
//!
//! # Send
//!
//! 1. Ensure a control object is cached (one discovery attempt at most).
//! 2. `Create` a message object, then `Send` it.
//! 3. On a transient failure of either call: invalidate, rediscover, wait,
//!    restart at step 2. Both calls share one retry budget.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures_util::StreamExt;
use parking_lot::Mutex;
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::identifiers::ObjectPath;
use crate::notifier::Notifier;
use crate::protocol::{MessageProperties, PendingMessage, PresenceEvent};
use crate::transport::{ModemBus, PresenceStream};

use super::state::{SendAttempt, SessionConfig, SessionPhase, SessionState};

// ============================================================================
// SendPhase
// ============================================================================

/// The remote call of the exchange that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SendPhase {
    Create,
    Dispatch,
}

impl fmt::Display for SendPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => f.write_str("creation"),
            Self::Dispatch => f.write_str("sending"),
        }
    }
}

// ============================================================================
// SessionInner
// ============================================================================

/// Shared state behind [`SessionManager`] handles.
struct SessionInner {
    bus: Arc<dyn ModemBus>,
    config: SessionConfig,
    notifier: Notifier,
    state: Mutex<SessionState>,
    /// Serializes discovery attempts.
    discovery: tokio::sync::Mutex<()>,
}

// ============================================================================
// SessionManager
// ============================================================================

/// Keeps a messaging control object valid and sends messages through it.
///
/// Cloning yields another handle to the same session.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<SessionInner>,
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("SessionManager")
            .field("phase", &state.phase)
            .field("control_path", &state.control_path)
            .field("retry_count", &state.retry_count)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// SessionManager - Public API
// ============================================================================

impl SessionManager {
    /// Creates a session manager. No bus call is made until
    /// [`initialize`](Self::initialize), [`ensure_ready`](Self::ensure_ready)
    /// or [`send`](Self::send).
    #[must_use]
    pub fn new(bus: Arc<dyn ModemBus>, config: SessionConfig, notifier: Notifier) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                bus,
                config,
                notifier,
                state: Mutex::new(SessionState::new()),
                discovery: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Runs the first discovery, arming the retry timer if it fails.
    ///
    /// Returns `true` if a control object is ready.
    pub async fn initialize(&self) -> bool {
        self.inner.discover_or_schedule().await.is_ok()
    }

    /// Subscribes to service presence changes from the bus.
    ///
    /// # Errors
    ///
    /// Returns an error if the bus cannot deliver presence events.
    pub async fn watch_presence(&self) -> Result<()> {
        let stream = self.inner.bus.presence().await?;
        let task = tokio::spawn(run_presence_watcher(Arc::downgrade(&self.inner), stream));

        let mut state = self.inner.state.lock();
        if state.closed {
            task.abort();
            return Err(Error::SessionClosed);
        }
        if let Some(previous) = state.presence_task.replace(task) {
            previous.abort();
        }
        Ok(())
    }

    /// Returns whether a valid control object is cached, attempting one
    /// discovery if not.
    ///
    /// While the service is known to be unregistered this returns `false`
    /// without touching the bus. When a control object is cached no bus call
    /// is made.
    pub async fn ensure_ready(&self) -> bool {
        self.inner.ensure_session().await.is_ok()
    }

    /// Sends one message through the create-then-dispatch exchange.
    ///
    /// Resolves exactly once.
    ///
    /// # Errors
    ///
    /// - Discovery errors if no control object could be obtained
    /// - The last remote error on fatal failure or exhausted retries
    /// - [`Error::SessionClosed`] if the manager was shut down meanwhile
    pub async fn send(&self, message: &PendingMessage) -> Result<()> {
        self.inner.send(message).await
    }

    /// Handles the service acquiring its bus name.
    ///
    /// Resets the retry counter and rediscovers immediately.
    pub async fn service_registered(&self) {
        if self.inner.mark_registered() {
            let _ = self.inner.discover_or_schedule().await;
        }
    }

    /// Handles the service losing its bus name.
    ///
    /// Invalidates the control object and stops retrying until the service
    /// registers again.
    pub fn service_unregistered(&self) {
        self.inner.mark_unregistered();
    }

    /// Stops the retry timer and presence watcher.
    ///
    /// Sends still running resolve with [`Error::SessionClosed`].
    pub fn shutdown(&self) {
        let mut state = self.inner.state.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        state.stop_retry_timer();
        state.invalidate();
        if let Some(task) = state.presence_task.take() {
            task.abort();
        }
        drop(state);

        info!("Session manager shut down");
    }

    /// Returns the current discovery phase.
    #[inline]
    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        self.inner.state.lock().phase
    }

    /// Returns the cached control object path if it is valid.
    #[inline]
    #[must_use]
    pub fn control_path(&self) -> Option<ObjectPath> {
        self.inner.state.lock().ready_path().cloned()
    }

    /// Returns the number of timer-driven discovery retries so far.
    #[inline]
    #[must_use]
    pub fn retry_count(&self) -> u32 {
        self.inner.state.lock().retry_count
    }

    /// Returns `true` if the retry timer is armed.
    #[inline]
    #[must_use]
    pub fn is_retrying(&self) -> bool {
        self.inner.state.lock().retry_timer.is_some()
    }

    /// Returns `true` unless the service is known to be unregistered.
    #[inline]
    #[must_use]
    pub fn is_service_available(&self) -> bool {
        self.inner.state.lock().service_available
    }

    /// Returns `true` after [`shutdown`](Self::shutdown).
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    /// Returns the retry configuration.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }
}

// ============================================================================
// SessionInner - Discovery
// ============================================================================

impl SessionInner {
    /// Returns the cached control object or discovers one.
    async fn ensure_session(self: &Arc<Self>) -> Result<ObjectPath> {
        {
            let state = self.state.lock();
            if state.closed {
                return Err(Error::SessionClosed);
            }
            if !state.service_available {
                return Err(Error::ServiceUnavailable);
            }
            if let Some(path) = state.ready_path() {
                return Ok(path.clone());
            }
        }

        self.notifier
            .info("[Modem] Cached D-Bus interfaces invalid, reinitializing...");
        self.discover_or_schedule().await
    }

    /// Discovers, arming the retry timer on failure.
    async fn discover_or_schedule(self: &Arc<Self>) -> Result<ObjectPath> {
        let result = self.discover().await;
        if result.is_err() {
            self.arm_retry_timer();
        }
        result
    }

    /// Runs one discovery attempt and commits its result.
    ///
    /// Returns the cached object immediately if one became valid while
    /// waiting for a concurrent discovery.
    async fn discover(&self) -> Result<ObjectPath> {
        let _serialized = self.discovery.lock().await;

        let (epoch, previous) = {
            let mut state = self.state.lock();
            if state.closed {
                return Err(Error::SessionClosed);
            }
            if !state.service_available {
                return Err(Error::ServiceUnavailable);
            }
            if let Some(path) = state.ready_path() {
                return Ok(path.clone());
            }
            state.invalidate();
            let previous = state.phase;
            state.phase = SessionPhase::Discovering;
            (state.epoch, previous)
        };

        let outcome = self.locate().await;

        let mut state = self.state.lock();
        if state.closed {
            return Err(Error::SessionClosed);
        }
        if state.epoch != epoch {
            debug!("Discovery result discarded after invalidation");
            return Err(match outcome {
                Ok(path) => Error::invalid_handle(path, "invalidated during discovery"),
                Err(e) => e,
            });
        }

        match outcome {
            Ok(path) => {
                state.control_path = Some(path.clone());
                state.control_valid = true;
                state.retry_count = 0;
                state.phase = SessionPhase::Ready;
                state.stop_retry_timer();
                drop(state);

                info!(path = %path, "Messaging control object ready");
                self.notifier
                    .info("[Modem] D-Bus interfaces initialized successfully");
                Ok(path)
            }
            Err(e) => {
                state.phase = if state.retry_timer.is_some() {
                    SessionPhase::Retrying
                } else if previous == SessionPhase::Failed {
                    SessionPhase::Failed
                } else {
                    SessionPhase::Uninitialized
                };
                drop(state);

                self.notifier.error(discovery_failure_message(&e));
                Err(e)
            }
        }
    }

    /// Queries the registry and validates the first messaging object.
    async fn locate(&self) -> Result<ObjectPath> {
        let objects = self.bus.managed_objects().await?;
        let path = objects
            .find_messaging()
            .cloned()
            .ok_or(Error::MessagingNotFound)?;

        debug!(path = %path, candidates = objects.len(), "Found messaging object");
        self.bus.probe_messaging(&path).await?;
        Ok(path)
    }

    /// Arms the periodic discovery retry timer unless it is pointless.
    fn arm_retry_timer(self: &Arc<Self>) {
        let mut state = self.state.lock();
        if state.closed
            || !state.service_available
            || state.control_valid
            || state.phase == SessionPhase::Failed
            || state.retry_timer.is_some()
        {
            return;
        }

        let timer = tokio::spawn(run_retry_timer(
            Arc::downgrade(self),
            self.config.retry_interval,
        ));
        state.retry_timer = Some(timer);
        state.phase = SessionPhase::Retrying;
        drop(state);

        self.notifier
            .info("[Modem] Starting D-Bus initialization retry timer");
    }

    /// One retry timer tick. Returns `true` to keep the timer running.
    async fn retry_tick(&self) -> bool {
        let max = self.config.max_discovery_retries;
        let attempt = {
            let mut state = self.state.lock();
            if state.closed || state.control_valid || !state.service_available {
                state.retry_timer = None;
                return false;
            }
            if state.retry_count >= max {
                state.retry_timer = None;
                state.phase = SessionPhase::Failed;
                drop(state);

                self.notifier.error(
                    "[Modem] Failed to initialize D-Bus interfaces after maximum retries",
                );
                return false;
            }
            state.retry_count += 1;
            state.retry_count
        };

        self.notifier.info(format!(
            "[Modem] Retrying D-Bus initialization (attempt {attempt} of {max})"
        ));
        self.discover().await.is_err()
    }

    /// Marks the service registered. Returns `false` once closed.
    fn mark_registered(&self) -> bool {
        {
            let mut state = self.state.lock();
            if state.closed {
                return false;
            }
            state.service_available = true;
            state.invalidate();
            state.retry_count = 0;
            if state.retry_timer.is_none() {
                state.phase = SessionPhase::Uninitialized;
            }
        }

        self.notifier.info("[Modem] ModemManager service registered");
        true
    }

    /// Marks the service unregistered and stops retrying.
    fn mark_unregistered(&self) {
        {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            state.stop_retry_timer();
            state.invalidate();
            state.service_available = false;
            state.phase = SessionPhase::Unavailable;
        }

        self.notifier.error("[Modem] ModemManager service disappeared");
    }
}

// ============================================================================
// SessionInner - Send
// ============================================================================

impl SessionInner {
    async fn send(self: &Arc<Self>, message: &PendingMessage) -> Result<()> {
        let mut messaging = match self.ensure_session().await {
            Ok(path) => path,
            Err(e) => {
                self.ensure_open()?;
                self.notifier
                    .error("[Modem] Failed to initialize D-Bus interfaces");
                return Err(e);
            }
        };

        let max = self.config.max_send_retries;
        let mut attempt = SendAttempt::new(message.properties());

        loop {
            self.ensure_open()?;

            let (phase, error) = match self.exchange(&messaging, &attempt.properties).await {
                Ok(()) => {
                    self.ensure_open()?;
                    self.notifier.info("[Modem] SMS sent successfully");
                    return Ok(());
                }
                Err(failure) => failure,
            };
            self.ensure_open()?;

            if !error.is_transient() || attempt.retries_used >= max {
                self.notifier
                    .error(format!("[Modem] SMS {phase} failed: {error}"));
                return Err(error);
            }

            attempt.retries_used += 1;
            warn!(
                message_id = %message.id,
                %phase,
                error = %error,
                attempt = attempt.retries_used,
                max,
                "Transient send failure"
            );
            self.notifier.info(format!(
                "[Modem] SMS {phase} failed, retrying (attempt {} of {max})...",
                attempt.retries_used
            ));

            self.invalidate();
            self.retry_pause(self.config.send_retry_delay).await;
            self.ensure_open()?;

            // The service may have gone away during the pause
            messaging = match self.ensure_session().await {
                Ok(path) => path,
                Err(e) => {
                    self.ensure_open()?;
                    self.notifier
                        .error("[Modem] Failed to reinitialize D-Bus interfaces");
                    return Err(e);
                }
            };
        }
    }

    /// Creates the message object and dispatches it.
    async fn exchange(
        &self,
        messaging: &ObjectPath,
        properties: &MessageProperties,
    ) -> std::result::Result<(), (SendPhase, Error)> {
        let created = self
            .bus
            .create_message(messaging, properties)
            .await
            .map_err(|e| (SendPhase::Create, e))?;

        debug!(path = %created, "Message object created");

        self.bus
            .send_message(&created)
            .await
            .map_err(|e| (SendPhase::Dispatch, e))
    }

    async fn retry_pause(&self, delay: Duration) {
        if !delay.is_zero() {
            sleep(delay).await;
        }
    }

    fn invalidate(&self) {
        self.state.lock().invalidate();
    }

    fn ensure_open(&self) -> Result<()> {
        if self.state.lock().closed {
            Err(Error::SessionClosed)
        } else {
            Ok(())
        }
    }
}

// ============================================================================
// Background Tasks
// ============================================================================

/// Periodic discovery retries. Stops itself on success, exhaustion or once
/// the session is gone; aborted from outside on unregistration and shutdown.
async fn run_retry_timer(inner: Weak<SessionInner>, period: Duration) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let Some(inner) = inner.upgrade() else {
            break;
        };
        if !inner.retry_tick().await {
            break;
        }
    }

    debug!("Discovery retry timer stopped");
}

/// Applies presence events in arrival order. Reports the end of the stream
/// to subscribers unless the session was shut down.
///
/// Discovery after registration runs on its own task so a following
/// unregistration is applied without waiting for it.
async fn run_presence_watcher(inner: Weak<SessionInner>, mut events: PresenceStream) {
    while let Some(event) = events.next().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        debug!(?event, "Presence event");

        match event {
            PresenceEvent::Registered => {
                if inner.mark_registered() {
                    tokio::spawn(async move {
                        let _ = inner.discover_or_schedule().await;
                    });
                }
            }
            PresenceEvent::Unregistered => inner.mark_unregistered(),
        }
    }

    debug!("Presence watcher stopped");
    let Some(inner) = inner.upgrade() else {
        return;
    };
    let closed = inner.state.lock().closed;
    if !closed {
        warn!("Presence stream ended while the session is open");
        inner
            .notifier
            .error("[Modem] Lost ModemManager presence tracking");
    }
}

/// Human-readable text for a failed discovery.
fn discovery_failure_message(error: &Error) -> String {
    match error {
        Error::MessagingNotFound => "[Modem] No messaging-capable modem found".to_string(),
        Error::InvalidHandle { .. } => {
            format!("[Modem] Failed to create messaging interface: {error}")
        }
        Error::InvalidRegistry { .. } => {
            "[Modem] Invalid response format from ModemManager".to_string()
        }
        Error::ServiceUnavailable | Error::SessionClosed => {
            format!("[Modem] D-Bus initialization skipped: {error}")
        }
        other => format!("[Modem] Failed to get ModemManager objects: {other}"),
    }
}

// ============================================================================
// Tests
// ============================================================================
