//! In-process bus.
//!
//! [`MemoryBus`] behaves like a ModemManager instance living in the same
//! process. It keeps a registry of objects, creates message objects on
//! `create_message` and records them as sent on `send_message`. Failures can
//! be scripted per operation, which makes it the backend of choice for tests,
//! benchmarks and running without modem hardware.
//!
//! # Example
//!
//! ```ignore
//! let bus = MemoryBus::with_modem();
//! bus.fail_next(BusOp::CreateMessage, RemoteFault::new(fault::FAILED, "busy"));
//! bus.unregister(); // pushes PresenceEvent::Unregistered to subscribers
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::identifiers::ObjectPath;
use crate::protocol::{
    MANAGER_PATH, MESSAGING_INTERFACE, ManagedObject, ManagedObjects, MessageProperties,
    PresenceEvent, RemoteFault, SERVICE_NAME,
};

use super::{ModemBus, PresenceStream};

// ============================================================================
// Constants
// ============================================================================

/// Path of the modem registered by [`MemoryBus::with_modem`].
pub const DEFAULT_MODEM_PATH: &str = "/org/freedesktop/ModemManager1/Modem/0";

/// Prefix for created message objects.
const SMS_PATH_PREFIX: &str = "/org/freedesktop/ModemManager1/SMS";

// ============================================================================
// BusOp
// ============================================================================

/// Bus operations that can be counted and scripted to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BusOp {
    /// `GetManagedObjects`.
    ManagedObjects,
    /// Messaging handle validation.
    ProbeMessaging,
    /// `Messaging.Create`.
    CreateMessage,
    /// `Sms.Send`.
    SendMessage,
}

// ============================================================================
// MemoryState
// ============================================================================

#[derive(Default)]
struct MemoryState {
    registered: bool,
    objects: Vec<ManagedObject>,
    faults: FxHashMap<BusOp, VecDeque<RemoteFault>>,
    calls: FxHashMap<BusOp, usize>,
    created: FxHashMap<ObjectPath, MessageProperties>,
    sent: Vec<MessageProperties>,
    next_message: u32,
    latency: Duration,
}

impl MemoryState {
    /// Counts a call and pops the next scripted fault for it.
    fn enter(&mut self, op: BusOp) -> Option<RemoteFault> {
        *self.calls.entry(op).or_default() += 1;
        self.faults.get_mut(&op).and_then(VecDeque::pop_front)
    }

    fn is_messaging(&self, path: &ObjectPath) -> bool {
        self.objects
            .iter()
            .any(|o| &o.path == path && o.implements(MESSAGING_INTERFACE))
    }
}

// ============================================================================
// MemoryBus
// ============================================================================

/// Scriptable in-process implementation of [`ModemBus`].
pub struct MemoryBus {
    state: Mutex<MemoryState>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<PresenceEvent>>>,
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// MemoryBus - Constructors
// ============================================================================

impl MemoryBus {
    /// Creates a registered service exporting no objects.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState {
                registered: true,
                ..MemoryState::default()
            }),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Creates a registered service with one messaging-capable modem at
    /// [`DEFAULT_MODEM_PATH`].
    #[must_use]
    pub fn with_modem() -> Self {
        let bus = Self::new();
        if let Some(path) = ObjectPath::new(DEFAULT_MODEM_PATH) {
            bus.add_object(ManagedObject::new(
                path,
                ["org.freedesktop.ModemManager1.Modem", MESSAGING_INTERFACE],
            ));
        }
        bus
    }

    /// Creates a service that is not registered yet.
    #[must_use]
    pub fn unregistered() -> Self {
        let bus = Self::new();
        bus.state.lock().registered = false;
        bus
    }
}

// ============================================================================
// MemoryBus - Scripting
// ============================================================================

impl MemoryBus {
    /// Appends an object to the registry.
    pub fn add_object(&self, object: ManagedObject) {
        self.state.lock().objects.push(object);
    }

    /// Removes an object from the registry.
    ///
    /// Returns `true` if the object was present.
    pub fn remove_object(&self, path: &ObjectPath) -> bool {
        let mut state = self.state.lock();
        let before = state.objects.len();
        state.objects.retain(|o| &o.path != path);
        before != state.objects.len()
    }

    /// Makes the next call of `op` fail with `fault`.
    ///
    /// Faults queue up: scripting two faults fails the next two calls.
    pub fn fail_next(&self, op: BusOp, fault: RemoteFault) {
        self.state
            .lock()
            .faults
            .entry(op)
            .or_default()
            .push_back(fault);
    }

    /// Makes the next `times` calls of `op` fail with `fault`.
    pub fn fail_times(&self, op: BusOp, fault: RemoteFault, times: usize) {
        for _ in 0..times {
            self.fail_next(op, fault.clone());
        }
    }

    /// Delays every call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.state.lock().latency = latency;
    }

    /// Ends every presence stream handed out so far, like a dropped bus
    /// connection.
    pub fn disconnect_presence(&self) {
        self.subscribers.lock().clear();
    }

    /// Returns how many times `op` was called.
    #[must_use]
    pub fn calls(&self, op: BusOp) -> usize {
        self.state.lock().calls.get(&op).copied().unwrap_or(0)
    }

    /// Returns the total number of calls across all operations.
    #[must_use]
    pub fn total_calls(&self) -> usize {
        self.state.lock().calls.values().sum()
    }

    /// Returns the messages dispatched so far, in dispatch order.
    #[must_use]
    pub fn sent(&self) -> Vec<MessageProperties> {
        self.state.lock().sent.clone()
    }

    /// Returns `true` if the service is registered.
    #[must_use]
    pub fn is_registered(&self) -> bool {
        self.state.lock().registered
    }

    /// Registers the service and notifies presence subscribers.
    pub fn register(&self) {
        self.state.lock().registered = true;
        debug!(service = SERVICE_NAME, "Memory bus service registered");
        self.publish(PresenceEvent::Registered);
    }

    /// Unregisters the service and notifies presence subscribers.
    ///
    /// Created but unsent message objects are lost, like on a real restart.
    pub fn unregister(&self) {
        {
            let mut state = self.state.lock();
            state.registered = false;
            state.created.clear();
        }
        debug!(service = SERVICE_NAME, "Memory bus service unregistered");
        self.publish(PresenceEvent::Unregistered);
    }

    fn publish(&self, event: PresenceEvent) {
        self.subscribers
            .lock()
            .retain(|subscriber| subscriber.send(event).is_ok());
    }

    async fn simulate_latency(&self) {
        let latency = self.state.lock().latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }
}

// ============================================================================
// MemoryBus - ModemBus
// ============================================================================

#[async_trait]
impl ModemBus for MemoryBus {
    async fn managed_objects(&self) -> Result<ManagedObjects> {
        self.simulate_latency().await;
        let mut state = self.state.lock();
        let manager = ObjectPath::new(MANAGER_PATH).unwrap_or_else(ObjectPath::root);

        if let Some(fault) = state.enter(BusOp::ManagedObjects) {
            return Err(fault.into_error(&manager));
        }
        if !state.registered {
            return Err(Error::service_unknown(format!(
                "The name {SERVICE_NAME} was not provided by any .service files"
            )));
        }

        Ok(state.objects.iter().cloned().collect())
    }

    async fn probe_messaging(&self, path: &ObjectPath) -> Result<()> {
        self.simulate_latency().await;
        let mut state = self.state.lock();

        if let Some(fault) = state.enter(BusOp::ProbeMessaging) {
            return Err(Error::invalid_handle(path.clone(), fault.message));
        }
        if !state.registered {
            return Err(Error::invalid_handle(path.clone(), "service not registered"));
        }
        if !state.is_messaging(path) {
            return Err(Error::invalid_handle(
                path.clone(),
                format!("no interface {MESSAGING_INTERFACE}"),
            ));
        }

        Ok(())
    }

    async fn create_message(
        &self,
        messaging: &ObjectPath,
        properties: &MessageProperties,
    ) -> Result<ObjectPath> {
        self.simulate_latency().await;
        let mut state = self.state.lock();

        if let Some(fault) = state.enter(BusOp::CreateMessage) {
            return Err(fault.into_error(messaging));
        }
        if !state.registered {
            return Err(Error::service_unknown(SERVICE_NAME));
        }
        if !state.is_messaging(messaging) {
            return Err(Error::unknown_object(messaging.clone()));
        }

        let index = state.next_message;
        state.next_message += 1;
        let path = ObjectPath::new(format!("{SMS_PATH_PREFIX}/{index}"))
            .ok_or_else(|| Error::failed("could not allocate message path"))?;
        state.created.insert(path.clone(), properties.clone());

        trace!(path = %path, "Memory bus created message");
        Ok(path)
    }

    async fn send_message(&self, message: &ObjectPath) -> Result<()> {
        self.simulate_latency().await;
        let mut state = self.state.lock();

        if let Some(fault) = state.enter(BusOp::SendMessage) {
            return Err(fault.into_error(message));
        }
        if !state.registered {
            return Err(Error::service_unknown(SERVICE_NAME));
        }

        let properties = state
            .created
            .remove(message)
            .ok_or_else(|| Error::unknown_object(message.clone()))?;
        state.sent.push(properties);

        trace!(path = %message, "Memory bus sent message");
        Ok(())
    }

    async fn presence(&self) -> Result<PresenceStream> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);

        let events = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        });
        Ok(events.boxed())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::fault;

    fn modem_path() -> ObjectPath {
        ObjectPath::new(DEFAULT_MODEM_PATH).expect("valid path")
    }

    fn props(number: &str) -> MessageProperties {
        MessageProperties {
            number: number.into(),
            text: "hi".into(),
        }
    }

    #[tokio::test]
    async fn test_create_then_send() {
        let bus = MemoryBus::with_modem();
        let sms = bus
            .create_message(&modem_path(), &props("+1"))
            .await
            .expect("create");
        bus.send_message(&sms).await.expect("send");

        assert_eq!(bus.sent(), vec![props("+1")]);
        assert_eq!(bus.calls(BusOp::CreateMessage), 1);
        assert_eq!(bus.calls(BusOp::SendMessage), 1);
    }

    #[tokio::test]
    async fn test_send_twice_is_unknown_object() {
        let bus = MemoryBus::with_modem();
        let sms = bus
            .create_message(&modem_path(), &props("+1"))
            .await
            .expect("create");
        bus.send_message(&sms).await.expect("send");

        let err = bus.send_message(&sms).await.unwrap_err();
        assert!(matches!(err, Error::UnknownObject { .. }));
    }

    #[tokio::test]
    async fn test_scripted_faults_are_consumed_in_order() {
        let bus = MemoryBus::with_modem();
        bus.fail_next(BusOp::CreateMessage, RemoteFault::new(fault::FAILED, "busy"));
        bus.fail_next(BusOp::CreateMessage, RemoteFault::new("x.Fatal", "no"));

        let first = bus.create_message(&modem_path(), &props("+1")).await;
        assert!(first.unwrap_err().is_transient());

        let second = bus.create_message(&modem_path(), &props("+1")).await;
        assert!(!second.unwrap_err().is_transient());

        assert!(bus.create_message(&modem_path(), &props("+1")).await.is_ok());
        assert_eq!(bus.calls(BusOp::CreateMessage), 3);
    }

    #[tokio::test]
    async fn test_unregistered_service() {
        let bus = MemoryBus::unregistered();
        let err = bus.managed_objects().await.unwrap_err();
        assert!(matches!(err, Error::ServiceUnknown { .. }));
    }

    #[tokio::test]
    async fn test_probe_rejects_non_messaging_object() {
        let bus = MemoryBus::new();
        let path = ObjectPath::new("/org/freedesktop/ModemManager1/Sim/0").expect("valid");
        bus.add_object(ManagedObject::new(path.clone(), ["org.freedesktop.ModemManager1.Sim"]));

        assert!(bus.probe_messaging(&path).await.is_err());
        assert!(bus.remove_object(&path));
        assert!(!bus.remove_object(&path));
    }

    #[tokio::test]
    async fn test_presence_events_are_delivered() {
        let bus = MemoryBus::with_modem();
        let mut presence = bus.presence().await.expect("presence");

        bus.unregister();
        bus.register();

        assert_eq!(presence.next().await, Some(PresenceEvent::Unregistered));
        assert_eq!(presence.next().await, Some(PresenceEvent::Registered));
        assert!(bus.is_registered());
    }

    #[tokio::test]
    async fn test_unregister_drops_created_messages() {
        let bus = MemoryBus::with_modem();
        let sms = bus
            .create_message(&modem_path(), &props("+1"))
            .await
            .expect("create");

        bus.unregister();
        bus.register();

        assert!(bus.send_message(&sms).await.is_err());
        assert!(bus.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_latency_applies_to_discovery_calls() {
        let bus = MemoryBus::with_modem();
        bus.set_latency(Duration::from_millis(300));

        let started = tokio::time::Instant::now();
        let objects = bus.managed_objects().await.expect("objects");
        bus.probe_messaging(&modem_path()).await.expect("probe");

        assert_eq!(objects.len(), 1);
        assert!(started.elapsed() >= Duration::from_millis(600));
    }

    #[tokio::test]
    async fn test_disconnect_presence_ends_streams() {
        let bus = MemoryBus::with_modem();
        let mut presence = bus.presence().await.expect("presence");

        bus.disconnect_presence();
        bus.unregister();

        assert_eq!(presence.next().await, None);
    }
}
