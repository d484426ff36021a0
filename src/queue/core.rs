//! Single-flight FIFO send queue.
//!
//! # Dispatch
//!
//! One lock guards the queue and the in-flight flag. `submit` appends under
//! the lock; if nothing is in flight it takes the head, marks it in flight,
//! releases the lock and spawns a driver task. The driver sends, reports the
//! outcome, then re-takes the lock to clear the flag and continue with the
//! next head, exiting once the queue is empty.

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::identifiers::MessageId;
use crate::notifier::Notifier;
use crate::protocol::{ModemEvent, PendingMessage};

use super::MessageSender;

// ============================================================================
// QueueState
// ============================================================================

#[derive(Debug, Default)]
struct QueueState {
    queue: VecDeque<PendingMessage>,
    in_flight: bool,
    /// Most recently dispatched message; set at dispatch, not at submit.
    last: Option<PendingMessage>,
    closed: bool,
}

impl QueueState {
    /// Takes the head for dispatch if nothing is in flight.
    fn take_next(&mut self) -> Option<PendingMessage> {
        if self.in_flight || self.closed {
            return None;
        }
        let next = self.queue.pop_front()?;
        self.in_flight = true;
        self.last = Some(next.clone());
        Some(next)
    }
}

// ============================================================================
// QueueInner
// ============================================================================

struct QueueInner {
    sender: Arc<dyn MessageSender>,
    notifier: Notifier,
    runtime: Handle,
    state: Mutex<QueueState>,
}

// ============================================================================
// SendQueue
// ============================================================================

/// FIFO queue dispatching one message at a time.
///
/// Cloning yields another handle to the same queue. `submit` and
/// `resend_last` never block and may be called from any thread.
#[derive(Clone)]
pub struct SendQueue {
    inner: Arc<QueueInner>,
}

impl fmt::Debug for SendQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("SendQueue")
            .field("queued", &state.queue.len())
            .field("in_flight", &state.in_flight)
            .field("closed", &state.closed)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// SendQueue - Public API
// ============================================================================

impl SendQueue {
    /// Creates a queue that spawns its driver on the current runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime. Use
    /// [`with_runtime`](Self::with_runtime) to pass a handle explicitly.
    #[must_use]
    pub fn new(sender: Arc<dyn MessageSender>, notifier: Notifier) -> Self {
        Self::with_runtime(sender, notifier, Handle::current())
    }

    /// Creates a queue that spawns its driver on `runtime`.
    #[must_use]
    pub fn with_runtime(
        sender: Arc<dyn MessageSender>,
        notifier: Notifier,
        runtime: Handle,
    ) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                sender,
                notifier,
                runtime,
                state: Mutex::new(QueueState::default()),
            }),
        }
    }

    /// Appends a message to the queue. Always succeeds.
    ///
    /// Returns the ID used to tag the message in logs.
    pub fn submit(&self, recipient: impl Into<String>, body: impl Into<String>) -> MessageId {
        let message = PendingMessage::new(recipient, body);
        let id = message.id;
        self.inner.enqueue(message);
        id
    }

    /// Re-submits the most recently dispatched message at the tail.
    ///
    /// Whether that message succeeded or failed does not matter.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NothingToResend`] if no message was dispatched yet.
    pub fn resend_last(&self) -> Result<MessageId> {
        let message = self
            .inner
            .state
            .lock()
            .last
            .as_ref()
            .map(PendingMessage::resubmission)
            .ok_or(Error::NothingToResend)?;

        let id = message.id;
        debug!(message_id = %id, recipient = %message.recipient, "Resending last message");
        self.inner.enqueue(message);
        Ok(id)
    }

    /// Drops all queued messages and stops reporting outcomes.
    ///
    /// The in-flight message, if any, still runs to resolution. Returns the
    /// number of messages dropped.
    pub fn close(&self) -> usize {
        let dropped = {
            let mut state = self.inner.state.lock();
            state.closed = true;
            let dropped = state.queue.len();
            state.queue.clear();
            dropped
        };

        info!(dropped, "Send queue closed");
        dropped
    }

    /// Returns the number of messages waiting behind the in-flight one.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.state.lock().queue.len()
    }

    /// Returns `true` if no message is waiting.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.state.lock().queue.is_empty()
    }

    /// Returns `true` while a message is being sent.
    #[inline]
    #[must_use]
    pub fn is_in_flight(&self) -> bool {
        self.inner.state.lock().in_flight
    }

    /// Returns the most recently dispatched message.
    #[inline]
    #[must_use]
    pub fn last_dispatched(&self) -> Option<PendingMessage> {
        self.inner.state.lock().last.clone()
    }

    /// Returns `true` after [`close`](Self::close).
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }
}

// ============================================================================
// QueueInner - Dispatch
// ============================================================================

impl QueueInner {
    fn enqueue(self: &Arc<Self>, message: PendingMessage) {
        let next = {
            let mut state = self.state.lock();
            if state.closed {
                debug!(message_id = %message.id, "Send queue closed, message dropped");
                return;
            }
            state.queue.push_back(message);
            state.take_next()
        };

        if let Some(next) = next {
            self.runtime.spawn(Arc::clone(self).drive(next));
        }
    }

    /// Sends messages until the queue is empty.
    async fn drive(self: Arc<Self>, mut message: PendingMessage) {
        loop {
            self.dispatch(&message).await;

            let next = {
                let mut state = self.state.lock();
                state.in_flight = false;
                state.take_next()
            };

            match next {
                Some(next) => message = next,
                None => break,
            }
        }
    }

    async fn dispatch(&self, message: &PendingMessage) {
        let recipient = message.recipient.clone();

        self.notifier.emit(ModemEvent::Sending {
            recipient: recipient.clone(),
        });
        debug!(message_id = %message.id, recipient = %recipient, "Dispatching message");
        self.notifier.info("[Modem] Sending SMS over D-Bus");

        let result = self.sender.send(message).await;

        if self.state.lock().closed {
            debug!(message_id = %message.id, "Outcome dropped after close");
            return;
        }

        match result {
            Ok(()) => {
                self.notifier.emit(ModemEvent::Sent {
                    recipient: recipient.clone(),
                });
                self.notifier
                    .info(format!("SMS sent successfully to {recipient}"));
            }
            Err(e) => {
                debug!(message_id = %message.id, error = %e, "Message failed");
                self.notifier.emit(ModemEvent::Failed {
                    recipient: recipient.clone(),
                });
                self.notifier
                    .error(format!("Failed to send SMS to {recipient}"));
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use proptest::prelude::*;
    use tokio::sync::{Semaphore, broadcast};
    use tokio_test::{assert_err, assert_ok};

    /// Records dispatched messages; optionally holds each send until a
    /// permit is released.
    #[derive(Default)]
    struct RecordingSender {
        log: Mutex<Vec<PendingMessage>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        gate: Option<Semaphore>,
        failing: Vec<String>,
    }

    impl RecordingSender {
        fn gated() -> Self {
            Self {
                gate: Some(Semaphore::new(0)),
                ..Self::default()
            }
        }

        fn failing(recipients: &[&str]) -> Self {
            Self {
                failing: recipients.iter().map(|r| r.to_string()).collect(),
                ..Self::default()
            }
        }

        fn release(&self, sends: usize) {
            if let Some(gate) = &self.gate {
                gate.add_permits(sends);
            }
        }

        fn recipients(&self) -> Vec<String> {
            self.log.lock().iter().map(|m| m.recipient.clone()).collect()
        }
    }

    #[async_trait]
    impl MessageSender for RecordingSender {
        async fn send(&self, message: &PendingMessage) -> Result<()> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            self.log.lock().push(message.clone());

            match &self.gate {
                Some(gate) => {
                    if let Ok(permit) = gate.acquire().await {
                        permit.forget();
                    }
                }
                None => tokio::task::yield_now().await,
            }

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            if self.failing.contains(&message.recipient) {
                Err(Error::failed("scripted"))
            } else {
                Ok(())
            }
        }
    }

    fn queue_with(sender: &Arc<RecordingSender>) -> (SendQueue, broadcast::Receiver<ModemEvent>) {
        let notifier = Notifier::new(256);
        let events = notifier.subscribe();
        (SendQueue::new(sender.clone(), notifier), events)
    }

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    /// Collects `count` lifecycle events, skipping log lines.
    async fn lifecycle(events: &mut broadcast::Receiver<ModemEvent>, count: usize) -> Vec<ModemEvent> {
        let mut out = Vec::with_capacity(count);
        while out.len() < count {
            let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
                .await
                .expect("event in time")
                .expect("channel open");
            if !event.is_log() {
                out.push(event);
            }
        }
        out
    }

    fn sending(r: &str) -> ModemEvent {
        ModemEvent::Sending { recipient: r.into() }
    }

    fn sent(r: &str) -> ModemEvent {
        ModemEvent::Sent { recipient: r.into() }
    }

    fn failed(r: &str) -> ModemEvent {
        ModemEvent::Failed { recipient: r.into() }
    }

    #[tokio::test]
    async fn test_two_messages_never_interleave() {
        let sender = Arc::new(RecordingSender::default());
        let (queue, mut events) = queue_with(&sender);

        queue.submit("+15551234567", "hi");
        queue.submit("+15557654321", "bye");

        let observed = lifecycle(&mut events, 4).await;
        assert_eq!(
            observed,
            vec![
                sending("+15551234567"),
                sent("+15551234567"),
                sending("+15557654321"),
                sent("+15557654321"),
            ]
        );
        assert_eq!(sender.max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_does_not_block_later_messages() {
        let sender = Arc::new(RecordingSender::failing(&["+1"]));
        let (queue, mut events) = queue_with(&sender);

        queue.submit("+1", "a");
        queue.submit("+2", "b");

        let observed = lifecycle(&mut events, 4).await;
        assert_eq!(
            observed,
            vec![sending("+1"), failed("+1"), sending("+2"), sent("+2")]
        );
    }

    #[tokio::test]
    async fn test_single_flight_while_blocked() {
        let sender = Arc::new(RecordingSender::gated());
        let (queue, _events) = queue_with(&sender);

        queue.submit("+1", "a");
        queue.submit("+2", "b");
        queue.submit("+3", "c");
        settle().await;

        assert_eq!(sender.recipients(), vec!["+1"]);
        assert!(queue.is_in_flight());
        assert_eq!(queue.len(), 2);

        sender.release(1);
        settle().await;
        assert_eq!(sender.recipients(), vec!["+1", "+2"]);
        assert_eq!(queue.len(), 1);

        sender.release(2);
        settle().await;
        assert_eq!(sender.recipients(), vec!["+1", "+2", "+3"]);
        assert!(!queue.is_in_flight());
        assert!(queue.is_empty());
        assert_eq!(sender.max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_resend_without_dispatch_fails() {
        let sender = Arc::new(RecordingSender::default());
        let (queue, _events) = queue_with(&sender);

        let result = queue.resend_last();
        assert!(matches!(result, Err(Error::NothingToResend)));
        assert_err!(queue.resend_last());
    }

    #[tokio::test]
    async fn test_resend_repeats_last_dispatched_not_last_submitted() {
        let sender = Arc::new(RecordingSender::gated());
        let (queue, _events) = queue_with(&sender);

        queue.submit("+1", "first");
        queue.submit("+2", "second");
        settle().await;

        // "+1" is in flight, "+2" only queued
        assert_ok!(queue.resend_last());
        assert_eq!(queue.len(), 2);

        sender.release(3);
        settle().await;

        let log = sender.log.lock().clone();
        let pairs: Vec<_> = log
            .iter()
            .map(|m| (m.recipient.as_str(), m.body.as_str()))
            .collect();
        assert_eq!(pairs, vec![("+1", "first"), ("+2", "second"), ("+1", "first")]);
        assert_ne!(log[0].id, log[2].id);
    }

    #[tokio::test]
    async fn test_resend_after_failure() {
        let sender = Arc::new(RecordingSender::failing(&["+1"]));
        let (queue, mut events) = queue_with(&sender);

        queue.submit("+1", "again");
        lifecycle(&mut events, 2).await;

        assert_ok!(queue.resend_last());
        let observed = lifecycle(&mut events, 2).await;
        assert_eq!(observed, vec![sending("+1"), failed("+1")]);
        assert_eq!(sender.recipients(), vec!["+1", "+1"]);
    }

    #[tokio::test]
    async fn test_last_dispatched_is_set_at_dispatch() {
        let sender = Arc::new(RecordingSender::gated());
        let (queue, _events) = queue_with(&sender);

        queue.submit("+1", "a");
        queue.submit("+2", "b");
        settle().await;
        assert_eq!(queue.last_dispatched().map(|m| m.recipient), Some("+1".into()));

        sender.release(1);
        settle().await;
        assert_eq!(queue.last_dispatched().map(|m| m.recipient), Some("+2".into()));
        sender.release(1);
    }

    #[tokio::test]
    async fn test_close_drops_queue_and_outcomes() {
        let sender = Arc::new(RecordingSender::gated());
        let (queue, mut events) = queue_with(&sender);

        queue.submit("+1", "a");
        queue.submit("+2", "b");
        settle().await;

        assert_eq!(queue.close(), 1);
        assert!(queue.is_closed());
        queue.submit("+3", "c");
        assert!(queue.is_empty());

        sender.release(5);
        settle().await;
        assert_eq!(sender.recipients(), vec!["+1"]);

        let mut lifecycle_events = Vec::new();
        while let Ok(event) = events.try_recv() {
            if !event.is_log() {
                lifecycle_events.push(event);
            }
        }
        assert_eq!(lifecycle_events, vec![sending("+1")]);
    }

    #[tokio::test]
    async fn test_session_closed_while_queue_open_reports_failure() {
        struct ClosedSender;

        #[async_trait]
        impl MessageSender for ClosedSender {
            async fn send(&self, _message: &PendingMessage) -> Result<()> {
                Err(Error::SessionClosed)
            }
        }

        let notifier = Notifier::new(16);
        let mut events = notifier.subscribe();
        let queue = SendQueue::new(Arc::new(ClosedSender), notifier);

        queue.submit("+1", "a");
        settle().await;

        let mut lifecycle_events = Vec::new();
        while let Ok(event) = events.try_recv() {
            if !event.is_log() {
                lifecycle_events.push(event);
            }
        }
        assert_eq!(lifecycle_events, vec![sending("+1"), failed("+1")]);
        assert!(!queue.is_in_flight());
    }

    #[test]
    fn test_submit_from_foreign_thread() {
        let runtime = tokio::runtime::Runtime::new().expect("runtime");
        let sender = Arc::new(RecordingSender::default());
        let queue = SendQueue::with_runtime(
            sender.clone(),
            Notifier::default(),
            runtime.handle().clone(),
        );

        let handle = queue.clone();
        std::thread::spawn(move || {
            handle.submit("+1", "from a plain thread");
        })
        .join()
        .expect("thread");

        runtime.block_on(async {
            tokio::time::timeout(Duration::from_secs(5), async {
                while sender.recipients().is_empty() || queue.is_in_flight() {
                    tokio::task::yield_now().await;
                }
            })
            .await
            .expect("dispatched in time");
        });
        assert_eq!(sender.recipients(), vec!["+1"]);
    }

    proptest! {
        #[test]
        fn prop_dispatch_order_matches_submission(recipients in prop::collection::vec("\\+[0-9]{4,8}", 1..20)) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("runtime");

            runtime.block_on(async {
                let sender = Arc::new(RecordingSender::default());
                let queue = SendQueue::new(sender.clone(), Notifier::default());

                for recipient in &recipients {
                    queue.submit(recipient.clone(), "body");
                }

                while sender.log.lock().len() < recipients.len() || queue.is_in_flight() {
                    tokio::task::yield_now().await;
                }

                prop_assert_eq!(sender.recipients(), recipients.clone());
                prop_assert_eq!(sender.max_in_flight.load(Ordering::SeqCst), 1);
                Ok::<(), TestCaseError>(())
            })?;
        }
    }
}
