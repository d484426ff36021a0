//! Managed object registry snapshot.
//!
//! Result of a `GetManagedObjects` query, kept in the order the bus
//! returned it so that control object selection is first-found-wins.

// ============================================================================
// Imports
// ============================================================================

use crate::identifiers::ObjectPath;

use super::MESSAGING_INTERFACE;

// ============================================================================
// ManagedObject
// ============================================================================

/// One object exported by the modem service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedObject {
    /// Object path.
    pub path: ObjectPath,

    /// Names of the interfaces the object implements.
    pub interfaces: Vec<String>,
}

impl ManagedObject {
    /// Creates a managed object entry.
    #[must_use]
    pub fn new(path: ObjectPath, interfaces: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            path,
            interfaces: interfaces.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns `true` if the object implements `interface`.
    #[inline]
    #[must_use]
    pub fn implements(&self, interface: &str) -> bool {
        self.interfaces.iter().any(|i| i == interface)
    }
}

// ============================================================================
// ManagedObjects
// ============================================================================

/// Ordered registry snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManagedObjects {
    objects: Vec<ManagedObject>,
}

impl ManagedObjects {
    /// Creates a snapshot from objects in registry iteration order.
    #[inline]
    #[must_use]
    pub fn new(objects: Vec<ManagedObject>) -> Self {
        Self { objects }
    }

    /// Returns the first object implementing `interface`.
    ///
    /// When several objects match, the first one in registry order wins.
    /// That order is not guaranteed stable across service restarts.
    #[must_use]
    pub fn find(&self, interface: &str) -> Option<&ObjectPath> {
        self.objects
            .iter()
            .find(|object| object.implements(interface))
            .map(|object| &object.path)
    }

    /// Returns the first messaging-capable object.
    #[inline]
    #[must_use]
    pub fn find_messaging(&self) -> Option<&ObjectPath> {
        self.find(MESSAGING_INTERFACE)
    }

    /// Returns the number of objects.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Returns `true` if the registry is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Iterates over the objects in registry order.
    pub fn iter(&self) -> impl Iterator<Item = &ManagedObject> {
        self.objects.iter()
    }
}

impl FromIterator<ManagedObject> for ManagedObjects {
    fn from_iter<I: IntoIterator<Item = ManagedObject>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn path(raw: &str) -> ObjectPath {
        ObjectPath::new(raw).expect("valid path")
    }

    #[test]
    fn test_find_messaging_first_wins() {
        let objects: ManagedObjects = [
            ManagedObject::new(path("/m/Sim/0"), ["org.freedesktop.ModemManager1.Sim"]),
            ManagedObject::new(path("/m/Modem/1"), [MESSAGING_INTERFACE]),
            ManagedObject::new(path("/m/Modem/2"), [MESSAGING_INTERFACE]),
        ]
        .into_iter()
        .collect();

        assert_eq!(objects.find_messaging(), Some(&path("/m/Modem/1")));
        assert_eq!(objects.len(), 3);
    }

    #[test]
    fn test_find_messaging_none() {
        let objects = ManagedObjects::new(vec![ManagedObject::new(
            path("/m/Modem/0"),
            ["org.freedesktop.ModemManager1.Modem"],
        )]);
        assert!(objects.find_messaging().is_none());
        assert!(ManagedObjects::default().is_empty());
    }
}
