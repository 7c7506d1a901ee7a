//! Component and view descriptors.
//!
//! A descriptor is the configuration-time record of a component: its
//! instance factory, operation table, interceptor contributions from every
//! source, exclusion flags, resource injections, and views. It is
//! populated incrementally by metadata collaborators and then frozen by
//! the assembler; the descriptor references everything by identity and
//! holds pre-resolved closures, never walking a type hierarchy itself.

use serde_json::Value;
use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use vessel_core::error::{InvocationError, Result};
use vessel_core::types::{LifecyclePhase, OperationId};

use crate::context::{ContextKey, Holder};
use crate::interceptor::InterceptorUnit;
use crate::priority;
use crate::units::LifecycleCallbackUnit;

/// Factory for the primary instance of a component.
pub type InstanceFactory = Arc<dyn Fn() -> Result<Holder> + Send + Sync>;

/// A resolved call target for one declared operation.
pub type TargetOperation = Arc<dyn Fn(&mut (dyn Any + Send), Value) -> Result<Value> + Send + Sync>;

/// A resolved lifecycle callback on the primary instance.
pub type LifecycleCallback = Arc<dyn Fn(&mut (dyn Any + Send)) -> Result<()> + Send + Sync>;

/// Factory for an injected resource value.
pub type ResourceProvider = Arc<dyn Fn() -> Result<Holder> + Send + Sync>;

/// Release action for an injected resource value.
pub type ResourceRelease = Arc<dyn Fn(Holder) + Send + Sync>;

/// Wrap a plain constructor as an [`InstanceFactory`].
pub fn instance_factory<T, F>(f: F) -> InstanceFactory
where
    T: Any + Send,
    F: Fn() -> T + Send + Sync + 'static,
{
    Arc::new(move || Ok(Box::new(f()) as Holder))
}

/// Wrap a typed operation body as a [`TargetOperation`].
///
/// The returned target downcasts the primary instance holder and fails
/// with a type-mismatch invocation error if the holder is not a `T`.
pub fn typed_operation<T, F>(f: F) -> TargetOperation
where
    T: Any + Send,
    F: Fn(&mut T, Value) -> Result<Value> + Send + Sync + 'static,
{
    Arc::new(move |obj, params| {
        let typed = obj.downcast_mut::<T>().ok_or_else(|| {
            InvocationError::TargetTypeMismatch {
                expected: std::any::type_name::<T>().to_string(),
            }
        })?;
        f(typed, params)
    })
}

/// Wrap a typed lifecycle method as a [`LifecycleCallback`].
pub fn typed_callback<T, F>(f: F) -> LifecycleCallback
where
    T: Any + Send,
    F: Fn(&mut T) -> Result<()> + Send + Sync + 'static,
{
    Arc::new(move |obj| {
        let typed = obj.downcast_mut::<T>().ok_or_else(|| {
            InvocationError::TargetTypeMismatch {
                expected: std::any::type_name::<T>().to_string(),
            }
        })?;
        f(typed)
    })
}

/// One interceptor contribution: a unit, its priority, and a name used in
/// logs and diagnostics.
#[derive(Clone)]
pub struct InterceptorBinding {
    /// Diagnostic name of the contribution.
    pub name: Arc<str>,

    /// Ordering priority within the contribution's band; lower runs
    /// earlier, ties resolve by registration order.
    pub priority: i32,

    /// The unit itself.
    pub unit: Arc<dyn InterceptorUnit>,
}

impl InterceptorBinding {
    /// Create a binding.
    pub fn new(name: impl AsRef<str>, priority: i32, unit: Arc<dyn InterceptorUnit>) -> Self {
        Self {
            name: Arc::from(name.as_ref()),
            priority,
            unit,
        }
    }
}

/// A declared resource injection.
///
/// The provider runs during construction; the produced holder is installed
/// under `key` and released, through `release` (or by dropping), in
/// reverse order of installation during destruction.
#[derive(Clone)]
pub struct ResourceInjection {
    /// Diagnostic name of the injection.
    pub name: Arc<str>,

    /// The instance-context slot the resource is installed under.
    pub key: ContextKey,

    /// Produces the resource value.
    pub provider: ResourceProvider,

    /// Optional release action; the holder is dropped if absent.
    pub release: Option<ResourceRelease>,
}

impl ResourceInjection {
    /// Declare an injection that is released by dropping the holder.
    pub fn new(name: impl AsRef<str>, key: ContextKey, provider: ResourceProvider) -> Self {
        Self {
            name: Arc::from(name.as_ref()),
            key,
            provider,
            release: None,
        }
    }

    /// Attach an explicit release action.
    pub fn with_release(mut self, release: ResourceRelease) -> Self {
        self.release = Some(release);
        self
    }
}

/// Declares a client-visible operation surface over a component.
///
/// Each view maps its own operation identities onto component operations
/// and carries its own client-ring and view-ring contributions, plus the
/// client-scoped lifecycle contributions run when a proxy is created and
/// destroyed.
pub struct ViewDescriptor {
    pub(crate) name: String,
    pub(crate) operations: BTreeMap<OperationId, OperationId>,
    pub(crate) client_interceptors: Vec<InterceptorBinding>,
    pub(crate) view_interceptors: Vec<InterceptorBinding>,
    pub(crate) client_post_construct: Vec<InterceptorBinding>,
    pub(crate) client_pre_destroy: Vec<InterceptorBinding>,
}

impl ViewDescriptor {
    /// Create an empty view.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            operations: BTreeMap::new(),
            client_interceptors: Vec::new(),
            view_interceptors: Vec::new(),
            client_post_construct: Vec::new(),
            client_pre_destroy: Vec::new(),
        }
    }

    /// The view name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Map a view operation onto a component operation.
    pub fn map_operation(&mut self, view_op: OperationId, component_op: OperationId) -> &mut Self {
        self.operations.insert(view_op, component_op);
        self
    }

    /// Expose a component operation under its own identity.
    pub fn expose_operation(&mut self, op: OperationId) -> &mut Self {
        self.operations.insert(op.clone(), op);
        self
    }

    /// Add a client-ring contribution, applied to every view operation.
    pub fn add_client_interceptor(&mut self, binding: InterceptorBinding) -> &mut Self {
        self.client_interceptors.push(binding);
        self
    }

    /// Add a view-ring contribution, applied to every view operation.
    pub fn add_view_interceptor(&mut self, binding: InterceptorBinding) -> &mut Self {
        self.view_interceptors.push(binding);
        self
    }

    /// Add a contribution to the client-scoped post-construct pipeline.
    pub fn add_client_post_construct(&mut self, binding: InterceptorBinding) -> &mut Self {
        self.client_post_construct.push(binding);
        self
    }

    /// Add a contribution to the client-scoped pre-destroy pipeline.
    pub fn add_client_pre_destroy(&mut self, binding: InterceptorBinding) -> &mut Self {
        self.client_pre_destroy.push(binding);
        self
    }
}

/// Configuration-time description of a component.
///
/// Immutable after assembly: the assembler consumes the descriptor and
/// freezes its contributions into pipelines.
pub struct ComponentDescriptor {
    pub(crate) name: String,
    pub(crate) description: String,
    pub(crate) instance_factory: Option<InstanceFactory>,
    pub(crate) operations: BTreeMap<OperationId, TargetOperation>,
    pub(crate) class_interceptors: Vec<InterceptorBinding>,
    pub(crate) default_interceptors: Vec<InterceptorBinding>,
    pub(crate) operation_interceptors: BTreeMap<OperationId, Vec<InterceptorBinding>>,
    pub(crate) exclude_default_interceptors: bool,
    pub(crate) exclude_class_for: BTreeSet<OperationId>,
    pub(crate) exclude_default_for: BTreeSet<OperationId>,
    pub(crate) post_construct: Vec<InterceptorBinding>,
    pub(crate) pre_destroy: Vec<InterceptorBinding>,
    pub(crate) pre_passivate: Vec<InterceptorBinding>,
    pub(crate) post_activate: Vec<InterceptorBinding>,
    pub(crate) resource_injections: Vec<ResourceInjection>,
    pub(crate) views: Vec<ViewDescriptor>,
}

impl ComponentDescriptor {
    /// Create an empty descriptor.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            instance_factory: None,
            operations: BTreeMap::new(),
            class_interceptors: Vec::new(),
            default_interceptors: Vec::new(),
            operation_interceptors: BTreeMap::new(),
            exclude_default_interceptors: false,
            exclude_class_for: BTreeSet::new(),
            exclude_default_for: BTreeSet::new(),
            post_construct: Vec::new(),
            pre_destroy: Vec::new(),
            pre_passivate: Vec::new(),
            post_activate: Vec::new(),
            resource_injections: Vec::new(),
            views: Vec::new(),
        }
    }

    /// The component name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The component description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// The declared operation identities, in identity order.
    pub fn operation_ids(&self) -> Vec<OperationId> {
        self.operations.keys().cloned().collect()
    }

    /// Set the factory for the primary instance.
    pub fn set_instance_factory(&mut self, factory: InstanceFactory) -> &mut Self {
        self.instance_factory = Some(factory);
        self
    }

    /// Declare an operation with its resolved call target.
    ///
    /// Returns `true` if the operation was not already declared, `false`
    /// if it was (the first declaration wins).
    pub fn add_operation(&mut self, op: OperationId, target: TargetOperation) -> bool {
        if self.operations.contains_key(&op) {
            return false;
        }
        self.operations.insert(op, target);
        true
    }

    /// Add a class-level interceptor contribution.
    pub fn add_class_interceptor(&mut self, binding: InterceptorBinding) -> &mut Self {
        self.class_interceptors.push(binding);
        self
    }

    /// Add a default (container-level) interceptor contribution.
    pub fn add_default_interceptor(&mut self, binding: InterceptorBinding) -> &mut Self {
        self.default_interceptors.push(binding);
        self
    }

    /// Add an operation-level interceptor contribution.
    ///
    /// Operation-level contributions are independent of the class-level
    /// exclusion mechanism and are never suppressed by it.
    pub fn add_operation_interceptor(
        &mut self,
        op: OperationId,
        binding: InterceptorBinding,
    ) -> &mut Self {
        self.operation_interceptors
            .entry(op)
            .or_default()
            .push(binding);
        self
    }

    /// Exclude default interceptors for the whole component.
    pub fn set_exclude_default_interceptors(&mut self, exclude: bool) -> &mut Self {
        self.exclude_default_interceptors = exclude;
        self
    }

    /// Mark an operation as excluding class-level interceptors.
    pub fn exclude_class_interceptors(&mut self, op: OperationId) -> &mut Self {
        self.exclude_class_for.insert(op);
        self
    }

    /// Mark an operation as excluding default interceptors.
    pub fn exclude_default_interceptors_for(&mut self, op: OperationId) -> &mut Self {
        self.exclude_default_for.insert(op);
        self
    }

    /// Add a lifecycle-phase interceptor contribution.
    pub fn add_lifecycle_unit(
        &mut self,
        phase: LifecyclePhase,
        binding: InterceptorBinding,
    ) -> &mut Self {
        self.phase_contributions_mut(phase).push(binding);
        self
    }

    /// Add a pre-resolved lifecycle callback on the primary instance.
    ///
    /// The callback is wrapped as an ordinary user-band unit for the
    /// phase's pipeline. Pre-destroy callbacks run before resource
    /// release and their failures are logged and swallowed, so release is
    /// never skipped because of a callback.
    pub fn add_lifecycle_callback(
        &mut self,
        phase: LifecyclePhase,
        name: impl AsRef<str>,
        callback: LifecycleCallback,
    ) -> &mut Self {
        let (priority, unit) = match phase {
            LifecyclePhase::PostConstruct => (
                priority::construction::USER,
                LifecycleCallbackUnit::new(callback),
            ),
            LifecyclePhase::PreDestroy => (
                priority::destruction::USER,
                LifecycleCallbackUnit::swallowing(callback),
            ),
            LifecyclePhase::PrePassivate | LifecyclePhase::PostActivate => (
                priority::passivation::USER,
                LifecycleCallbackUnit::new(callback),
            ),
        };
        let binding = InterceptorBinding::new(name, priority, Arc::new(unit));
        self.phase_contributions_mut(phase).push(binding);
        self
    }

    /// Declare a resource injection.
    pub fn add_resource_injection(&mut self, injection: ResourceInjection) -> &mut Self {
        self.resource_injections.push(injection);
        self
    }

    /// Declare a view.
    pub fn add_view(&mut self, view: ViewDescriptor) -> &mut Self {
        self.views.push(view);
        self
    }

    fn phase_contributions_mut(&mut self, phase: LifecyclePhase) -> &mut Vec<InterceptorBinding> {
        match phase {
            LifecyclePhase::PostConstruct => &mut self.post_construct,
            LifecyclePhase::PreDestroy => &mut self.pre_destroy,
            LifecyclePhase::PrePassivate => &mut self.pre_passivate,
            LifecyclePhase::PostActivate => &mut self.post_activate,
        }
    }
}
