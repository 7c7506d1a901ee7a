//! Per-instance and per-invocation keyed data stores.
//!
//! Independent interceptors communicate through these stores rather than
//! shared globals. An `InstanceContext` lives as long as one logical
//! component instance; an `InvocationContext` lives for a single in-flight
//! call and is discarded when it completes.

use log::trace;
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use vessel_core::id::{ComponentId, InstanceId};
use vessel_core::types::OperationId;

/// A key into a context store.
///
/// Keys are compared by name; two keys with the same name address the same
/// slot.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ContextKey(Arc<str>);

impl ContextKey {
    /// Create a key with the given name.
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    /// Get the key name.
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ContextKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContextKey({})", self.0)
    }
}

impl fmt::Display for ContextKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ContextKey {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// The well-known key under which the primary instance holder is stored.
pub fn instance_key() -> ContextKey {
    ContextKey::new("vessel.instance")
}

/// The well-known key under which the ambient component name is stored in
/// an invocation context.
pub fn ambient_component_key() -> ContextKey {
    ContextKey::new("vessel.component")
}

/// A stored value.
pub type Holder = Box<dyn Any + Send>;

/// A release action paired with an installed holder.
type ReleaseAction = Box<dyn FnOnce(Holder) + Send>;

/// Per-instance keyed store of acquired resources and their release
/// actions.
///
/// Every holder installed with [`InstanceContext::install`] has a matching
/// release action. Releases run in strict reverse order of installation,
/// and releasing an already-released slot is a no-op, so a partial unwind
/// after a failed construction is safe.
pub struct InstanceContext {
    component: ComponentId,
    instance: InstanceId,
    slots: HashMap<ContextKey, Holder>,
    releases: Vec<(ContextKey, ReleaseAction)>,
}

impl InstanceContext {
    /// Create an empty context owned by one logical instance.
    pub fn new(component: ComponentId, instance: InstanceId) -> Self {
        Self {
            component,
            instance,
            slots: HashMap::new(),
            releases: Vec::new(),
        }
    }

    /// The owning component.
    pub fn component(&self) -> ComponentId {
        self.component
    }

    /// The owning instance.
    pub fn instance_id(&self) -> InstanceId {
        self.instance
    }

    /// Store a value without a release action.
    ///
    /// An existing value under the same key is replaced and dropped.
    pub fn put(&mut self, key: ContextKey, value: impl Any + Send) {
        self.slots.insert(key, Box::new(value));
    }

    /// Install a holder with a matching release action.
    ///
    /// The action runs when this slot is released, receiving the holder.
    pub fn install(
        &mut self,
        key: ContextKey,
        value: Holder,
        release: impl FnOnce(Holder) + Send + 'static,
    ) {
        self.slots.insert(key.clone(), value);
        self.releases.push((key, Box::new(release)));
    }

    /// Get a typed reference to a stored value.
    pub fn get<T: Any>(&self, key: &ContextKey) -> Option<&T> {
        self.slots.get(key).and_then(|v| v.downcast_ref::<T>())
    }

    /// Get a typed mutable reference to a stored value.
    pub fn get_mut<T: Any>(&mut self, key: &ContextKey) -> Option<&mut T> {
        self.slots.get_mut(key).and_then(|v| v.downcast_mut::<T>())
    }

    /// Get an untyped mutable reference to a stored value.
    pub fn get_raw_mut(&mut self, key: &ContextKey) -> Option<&mut (dyn Any + Send)> {
        self.slots.get_mut(key).map(|v| v.as_mut())
    }

    /// Check whether a slot is present.
    pub fn contains(&self, key: &ContextKey) -> bool {
        self.slots.contains_key(key)
    }

    /// Remove and return a stored value without running its release action.
    pub fn take(&mut self, key: &ContextKey) -> Option<Holder> {
        self.slots.remove(key)
    }

    /// Release one slot, running its release action.
    ///
    /// Returns `true` if the slot was present and released. Releasing a
    /// slot that was never installed, or was already released, is a no-op.
    pub fn release(&mut self, key: &ContextKey) -> bool {
        if let Some(pos) = self.releases.iter().rposition(|(k, _)| k == key) {
            let (key, action) = self.releases.remove(pos);
            if let Some(value) = self.slots.remove(&key) {
                trace!("released holder {} for instance {}", key, self.instance);
                action(value);
                return true;
            }
        }
        false
    }

    /// Release every remaining installed holder, newest first.
    pub fn release_remaining(&mut self) {
        while let Some((key, action)) = self.releases.pop() {
            if let Some(value) = self.slots.remove(&key) {
                trace!("released holder {} for instance {}", key, self.instance);
                action(value);
            }
        }
    }

    /// Number of installed holders that have not been released yet.
    pub fn pending_releases(&self) -> usize {
        self.releases.len()
    }
}

impl fmt::Debug for InstanceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceContext")
            .field("component", &self.component)
            .field("instance", &self.instance)
            .field("slots", &self.slots.len())
            .field("pending_releases", &self.releases.len())
            .finish()
    }
}

/// Per-call mutable state passed through a pipeline during one invocation.
///
/// Carries the operation identity, the call parameters, an optional binding
/// to the target instance's context, and a private-data slot map for
/// interceptors to communicate through. Owned by a single in-flight call;
/// never shared between threads.
pub struct InvocationContext<'a> {
    operation: OperationId,
    parameters: Value,
    instance: Option<&'a mut InstanceContext>,
    slots: HashMap<ContextKey, Holder>,
}

impl<'a> InvocationContext<'a> {
    /// Create a context with no instance binding.
    pub fn new(operation: OperationId, parameters: Value) -> Self {
        Self {
            operation,
            parameters,
            instance: None,
            slots: HashMap::new(),
        }
    }

    /// Create a context bound to an instance.
    pub fn with_instance(
        operation: OperationId,
        parameters: Value,
        instance: &'a mut InstanceContext,
    ) -> Self {
        Self {
            operation,
            parameters,
            instance: Some(instance),
            slots: HashMap::new(),
        }
    }

    /// The operation being invoked.
    pub fn operation(&self) -> &OperationId {
        &self.operation
    }

    /// The call parameters.
    pub fn parameters(&self) -> &Value {
        &self.parameters
    }

    /// Mutable access to the call parameters.
    pub fn parameters_mut(&mut self) -> &mut Value {
        &mut self.parameters
    }

    /// Replace the call parameters.
    pub fn set_parameters(&mut self, parameters: Value) {
        self.parameters = parameters;
    }

    /// Take the call parameters, leaving `Value::Null` behind.
    pub fn take_parameters(&mut self) -> Value {
        std::mem::replace(&mut self.parameters, Value::Null)
    }

    /// The bound instance context, if any.
    pub fn instance(&self) -> Option<&InstanceContext> {
        self.instance.as_deref()
    }

    /// Mutable access to the bound instance context, if any.
    pub fn instance_mut(&mut self) -> Option<&mut InstanceContext> {
        self.instance.as_deref_mut()
    }

    /// Store a private-data value.
    pub fn put(&mut self, key: ContextKey, value: impl Any + Send) {
        self.slots.insert(key, Box::new(value));
    }

    /// Get a typed reference to a private-data value.
    pub fn get<T: Any>(&self, key: &ContextKey) -> Option<&T> {
        self.slots.get(key).and_then(|v| v.downcast_ref::<T>())
    }

    /// Get a typed mutable reference to a private-data value.
    pub fn get_mut<T: Any>(&mut self, key: &ContextKey) -> Option<&mut T> {
        self.slots.get_mut(key).and_then(|v| v.downcast_mut::<T>())
    }

    /// Remove and return a private-data value.
    pub fn take(&mut self, key: &ContextKey) -> Option<Holder> {
        self.slots.remove(key)
    }
}
