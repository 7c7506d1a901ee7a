//! Strongly-typed identifiers for the Vessel container.
//!
//! This module provides the identifier types used throughout the system.
//! Each identifier type is a thin wrapper around a UUID with a phantom
//! type parameter to ensure identifiers for different entity kinds cannot
//! be mixed up.
//!
//! # Examples
//!
//! ```
//! use vessel_core::id::{ComponentId, InstanceId};
//! use std::str::FromStr;
//!
//! // Create new random IDs
//! let component_id = ComponentId::new();
//! let instance_id = InstanceId::new();
//!
//! // Create from string
//! let id_str = "550e8400-e29b-41d4-a716-446655440000";
//! let component_id = ComponentId::from_str(id_str).unwrap();
//! assert_eq!(component_id.to_string(), id_str);
//! ```

use serde::{Deserialize, Serialize};
use std::cmp::{Ord, PartialOrd};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// A type-safe identifier based on UUID.
///
/// This is a generic identifier type that is specialized for different
/// entity types using the phantom type parameter `T`. Identifiers for
/// different entity types are distinct types even though they share the
/// same underlying UUID structure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct Id<T> {
    uuid: Uuid,
    #[serde(skip)]
    _marker: std::marker::PhantomData<T>,
}

impl<T> Id<T> {
    /// Create a new random identifier.
    ///
    /// This generates a new random UUID v4 and wraps it in the appropriate
    /// identifier type.
    pub fn new() -> Self {
        Self {
            uuid: Uuid::new_v4(),
            _marker: std::marker::PhantomData,
        }
    }

    /// Create an identifier from a specific UUID.
    ///
    /// This is useful when you need to create an identifier with a known
    /// UUID, such as when deserializing from a persisted record.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self {
            uuid,
            _marker: std::marker::PhantomData,
        }
    }

    /// Get the underlying UUID.
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// Create a nil (all zeros) identifier.
    ///
    /// This can be useful as a sentinel value or default value.
    pub fn nil() -> Self {
        Self {
            uuid: Uuid::nil(),
            _marker: std::marker::PhantomData,
        }
    }

    /// Check if this is a nil identifier.
    pub fn is_nil(&self) -> bool {
        self.uuid == Uuid::nil()
    }
}

impl<T> Default for Id<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.uuid)
    }
}

impl<T> FromStr for Id<T> {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self {
            uuid: Uuid::parse_str(s)?,
            _marker: std::marker::PhantomData,
        })
    }
}

/// Marker type for deployed components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComponentMarker;
/// Identifier for a deployed component.
pub type ComponentId = Id<ComponentMarker>;

/// Marker type for component instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceMarker;
/// Identifier for a component instance.
pub type InstanceId = Id<InstanceMarker>;

/// Marker type for client proxies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProxyMarker;
/// Identifier for a client proxy bound to a view.
pub type ProxyId = Id<ProxyMarker>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_new() {
        let id1 = ComponentId::new();
        let id2 = ComponentId::new();
        assert_ne!(id1, id2, "Generated IDs should be unique");
    }

    #[test]
    fn test_id_display() {
        let id = InstanceId::new();
        let display = id.to_string();
        assert_eq!(display.len(), 36, "UUID string should be 36 characters");
    }

    #[test]
    fn test_id_from_str() {
        let uuid_str = "550e8400-e29b-41d4-a716-446655440000";
        let id = ComponentId::from_str(uuid_str).unwrap();
        assert_eq!(id.to_string(), uuid_str);
    }

    #[test]
    fn test_id_nil() {
        let nil_id = ProxyId::nil();
        assert_eq!(nil_id.to_string(), "00000000-0000-0000-0000-000000000000");
        assert!(nil_id.is_nil());
        assert!(!ProxyId::new().is_nil());
    }

    #[test]
    fn test_type_safety() {
        // Different ID types are different types, even with the same UUID
        let same_uuid = Uuid::new_v4();
        let component_id = ComponentId::from_uuid(same_uuid);
        let instance_id = InstanceId::from_uuid(same_uuid);

        assert_eq!(component_id.uuid(), instance_id.uuid());
        // But they're still different types; this would not compile:
        // assert_eq!(component_id, instance_id);
    }

    #[test]
    fn test_id_serde() {
        let id = ComponentId::new();
        let serialized = serde_json::to_string(&id).unwrap();
        let deserialized: ComponentId = serde_json::from_str(&serialized).unwrap();
        assert_eq!(id, deserialized);
    }
}
