//! ModemManager over the system D-Bus.
//!
//! Requires the `dbus` feature. Every call goes to the well-known name
//! [`SERVICE_NAME`], so a restarted ModemManager is picked up transparently
//! once its objects have been rediscovered.

// ============================================================================
// Imports
// ============================================================================

use std::collections::HashMap;

use async_trait::async_trait;
use futures_util::StreamExt;
use tracing::{debug, trace};
use zbus::fdo::{DBusProxy, IntrospectableProxy, ObjectManagerProxy};
use zbus::zvariant::{OwnedObjectPath, Value};
use zbus::{Connection, DBusError, Proxy};

use crate::error::{Error, Result};
use crate::identifiers::ObjectPath;
use crate::protocol::{
    MANAGER_PATH, MESSAGING_INTERFACE, ManagedObject, ManagedObjects, MessageProperties,
    PresenceEvent, RemoteFault, SERVICE_NAME, SMS_INTERFACE, fault,
};

use super::{ModemBus, PresenceStream};

// ============================================================================
// DbusBus
// ============================================================================

/// [`ModemBus`] backed by a zbus connection.
#[derive(Clone)]
pub struct DbusBus {
    connection: Connection,
}

impl DbusBus {
    /// Connects to the system bus.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Bus`] if the system bus is not reachable.
    pub async fn system() -> Result<Self> {
        let connection = Connection::system().await?;
        debug!("Connected to system bus");
        Ok(Self { connection })
    }

    /// Wraps an existing connection.
    #[inline]
    #[must_use]
    pub fn from_connection(connection: Connection) -> Self {
        Self { connection }
    }

    async fn proxy(&self, path: &ObjectPath, interface: &'static str) -> Result<Proxy<'static>> {
        Proxy::new(
            &self.connection,
            SERVICE_NAME,
            path.as_str().to_owned(),
            interface,
        )
        .await
        .map_err(|e| classify(e, path))
    }
}

// ============================================================================
// Error Mapping
// ============================================================================

/// Maps a zbus error to a classified crate error.
fn classify(err: zbus::Error, target: &ObjectPath) -> Error {
    match err {
        zbus::Error::MethodError(name, message, _) => {
            RemoteFault::new(name.as_str(), message.unwrap_or_default()).into_error(target)
        }
        zbus::Error::FDO(fdo) => classify_fdo(*fdo, target),
        other => Error::Bus(other),
    }
}

/// Maps a standard-interface error to a classified crate error.
fn classify_fdo(err: zbus::fdo::Error, target: &ObjectPath) -> Error {
    match err {
        zbus::fdo::Error::ZBus(inner) => classify(inner, target),
        zbus::fdo::Error::InvalidArgs(m) => RemoteFault::new(fault::INVALID_ARGS, m).into_error(target),
        zbus::fdo::Error::UnknownObject(m) => {
            RemoteFault::new(fault::UNKNOWN_OBJECT, m).into_error(target)
        }
        zbus::fdo::Error::ServiceUnknown(m) => {
            RemoteFault::new(fault::SERVICE_UNKNOWN, m).into_error(target)
        }
        zbus::fdo::Error::Failed(m) => RemoteFault::new(fault::FAILED, m).into_error(target),
        other => RemoteFault::new(
            other.name().as_str(),
            other.description().unwrap_or_default(),
        )
        .into_error(target),
    }
}

// ============================================================================
// DbusBus - ModemBus
// ============================================================================

#[async_trait]
impl ModemBus for DbusBus {
    async fn managed_objects(&self) -> Result<ManagedObjects> {
        let manager = ObjectPath::new(MANAGER_PATH).unwrap_or_else(ObjectPath::root);

        let proxy = ObjectManagerProxy::builder(&self.connection)
            .destination(SERVICE_NAME)?
            .path(MANAGER_PATH)?
            .build()
            .await
            .map_err(|e| classify(e, &manager))?;

        let reply = proxy
            .get_managed_objects()
            .await
            .map_err(|e| classify_fdo(e, &manager))?;

        // The reply is a dictionary; sort by path so selection is stable.
        let mut objects = reply
            .into_iter()
            .map(|(path, interfaces)| {
                let path = ObjectPath::new(path.as_str()).ok_or_else(|| {
                    Error::invalid_registry(format!("invalid object path {}", path.as_str()))
                })?;
                let names = interfaces.into_keys().map(|name| name.to_string());
                Ok(ManagedObject::new(path, names))
            })
            .collect::<Result<Vec<_>>>()?;
        objects.sort_by(|a, b| a.path.cmp(&b.path));

        trace!(count = objects.len(), "Received managed objects");
        Ok(ManagedObjects::new(objects))
    }

    async fn probe_messaging(&self, path: &ObjectPath) -> Result<()> {
        let proxy = IntrospectableProxy::builder(&self.connection)
            .destination(SERVICE_NAME)?
            .path(path.as_str().to_owned())?
            .build()
            .await
            .map_err(|e| Error::invalid_handle(path.clone(), e.to_string()))?;

        let xml = proxy
            .introspect()
            .await
            .map_err(|e| Error::invalid_handle(path.clone(), e.to_string()))?;

        if !xml.contains(MESSAGING_INTERFACE) {
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
        let proxy = self.proxy(messaging, MESSAGING_INTERFACE).await?;

        let mut dict: HashMap<&str, Value<'_>> = HashMap::new();
        dict.insert("number", Value::from(properties.number.as_str()));
        dict.insert("text", Value::from(properties.text.as_str()));

        let created: OwnedObjectPath = proxy
            .call("Create", &(dict,))
            .await
            .map_err(|e| classify(e, messaging))?;

        ObjectPath::new(created.as_str())
            .ok_or_else(|| Error::failed(format!("invalid message path {}", created.as_str())))
    }

    async fn send_message(&self, message: &ObjectPath) -> Result<()> {
        let proxy = self.proxy(message, SMS_INTERFACE).await?;

        proxy
            .call::<_, _, ()>("Send", &())
            .await
            .map_err(|e| classify(e, message))
    }

    async fn presence(&self) -> Result<PresenceStream> {
        let proxy = DBusProxy::new(&self.connection).await?;
        let changes = proxy
            .receive_name_owner_changed_with_args(&[(0, SERVICE_NAME)])
            .await?;

        let events = changes.filter_map(|signal| async move {
            let args = signal.args().ok()?;
            Some(if args.new_owner().is_some() {
                PresenceEvent::Registered
            } else {
                PresenceEvent::Unregistered
            })
        });

        Ok(events.boxed())
    }
}
