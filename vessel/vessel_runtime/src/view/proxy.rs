//! Client proxies and the ring-crossing dispatchers.
//!
//! A proxy invocation travels three rings: the client ring runs entirely
//! client-side logic, the view ring resolves the target instance, and the
//! component ring is the per-operation around-invoke pipeline ending in
//! the target call. The dispatchers are ordinary interceptors sitting at
//! the fixed latest position of their ring, so user contributions always
//! run before dispatch, and a failure in an earlier ring short-circuits
//! every later ring.

use parking_lot::Mutex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use vessel_core::error::{InvocationError, LifecycleError, Result};
use vessel_core::id::{InstanceId, ProxyId};
use vessel_core::types::{LifecyclePhase, OperationId};

use vessel_pipeline::context::{ContextKey, InstanceContext, InvocationContext};
use vessel_pipeline::interceptor::{Interceptor, Next};
use vessel_pipeline::pipeline::InterceptorChain;

use crate::component::{ComponentInstance, ComponentRuntime};

/// The slot under which the view dispatcher publishes the target instance
/// handle.
pub fn target_instance_key() -> ContextKey {
    ContextKey::new("vessel.target-instance")
}

/// The bound view ring of one proxy.
pub(crate) struct ViewRing {
    pub(crate) chains: BTreeMap<OperationId, InterceptorChain>,
}

/// Tail of the client ring: hands the invocation to the view ring.
///
/// Each ring gets its own invocation context, so ring-local private data
/// never leaks across the boundary.
pub(crate) struct ClientDispatcher {
    pub(crate) ring: Arc<ViewRing>,
}

impl Interceptor for ClientDispatcher {
    fn invoke(&self, ctx: &mut InvocationContext<'_>, _next: Next<'_>) -> Result<Value> {
        let operation = ctx.operation().clone();
        let parameters = ctx.take_parameters();
        let chain = self
            .ring
            .chains
            .get(&operation)
            .ok_or_else(|| InvocationError::OperationNotFound(operation.clone()))?;

        let mut inner = InvocationContext::new(operation, parameters);
        chain.invoke(&mut inner)
    }
}

/// Tail of the view ring: looks up the component-ring pipeline of the
/// bound instance and invokes it.
pub(crate) struct ViewDispatcher {
    pub(crate) instance: Arc<ComponentInstance>,
    pub(crate) operation: OperationId,
}

impl Interceptor for ViewDispatcher {
    fn invoke(&self, ctx: &mut InvocationContext<'_>, _next: Next<'_>) -> Result<Value> {
        let parameters = ctx.take_parameters();
        ctx.put(target_instance_key(), self.instance.id());
        self.instance.invoke(&self.operation, parameters)
    }
}

/// A client handle on one view of one component instance.
///
/// Created by [`ViewAssembly::create_proxy_instance`]; owns the component
/// instance it bound at creation and a proxy-scoped context for
/// client-session state.
///
/// [`ViewAssembly::create_proxy_instance`]: super::assembly::ViewAssembly::create_proxy_instance
pub struct ClientProxy {
    id: ProxyId,
    name: String,
    view: String,
    runtime: Arc<ComponentRuntime>,
    instance: Arc<ComponentInstance>,
    context: Mutex<InstanceContext>,
    chains: BTreeMap<OperationId, InterceptorChain>,
    pre_destroy_chain: InterceptorChain,
    destroyed: AtomicBool,
}

impl ClientProxy {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: ProxyId,
        name: String,
        view: String,
        runtime: Arc<ComponentRuntime>,
        instance: Arc<ComponentInstance>,
        context: InstanceContext,
        chains: BTreeMap<OperationId, InterceptorChain>,
        pre_destroy_chain: InterceptorChain,
    ) -> Self {
        Self {
            id,
            name,
            view,
            runtime,
            instance,
            context: Mutex::new(context),
            chains,
            pre_destroy_chain,
            destroyed: AtomicBool::new(false),
        }
    }

    /// The proxy ID.
    pub fn id(&self) -> ProxyId {
        self.id
    }

    /// The generated proxy name.
    pub fn proxy_name(&self) -> &str {
        &self.name
    }

    /// The view this proxy fronts.
    pub fn view(&self) -> &str {
        &self.view
    }

    /// The bound component instance.
    pub fn instance_id(&self) -> InstanceId {
        self.instance.id()
    }

    /// Check if this proxy has been destroyed.
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    /// The view operations this proxy can serve.
    pub fn operations(&self) -> Vec<OperationId> {
        self.chains.keys().cloned().collect()
    }

    /// Invoke a view operation: client ring, then view ring, then the
    /// component ring of the bound instance.
    pub fn invoke(&self, operation: &OperationId, parameters: Value) -> Result<Value> {
        if self.is_destroyed() {
            return Err(LifecycleError::ProxyDestroyed(self.id).into());
        }
        let chain = self
            .chains
            .get(operation)
            .ok_or_else(|| InvocationError::OperationNotFound(operation.clone()))?;

        let mut context = self.context.lock();
        let mut ctx =
            InvocationContext::with_instance(operation.clone(), parameters, &mut context);
        chain.invoke(&mut ctx)
    }

    /// Destroy the proxy.
    ///
    /// Runs the client ring's own pre-destroy pipeline exactly once,
    /// releases proxy-scoped resources, then destroys the bound component
    /// instance. Idempotent: a second call is a silent no-op.
    pub fn destroy(&self) -> Result<()> {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            debug!("proxy {} already destroyed", self.name);
            return Ok(());
        }

        {
            let mut context = self.context.lock();
            {
                let mut ctx = InvocationContext::with_instance(
                    LifecyclePhase::PreDestroy.operation_id(),
                    Value::Null,
                    &mut context,
                );
                if let Err(err) = self.pre_destroy_chain.invoke(&mut ctx) {
                    warn!("client pre-destroy failed for proxy {}: {}", self.name, err);
                }
            }
            context.release_remaining();
        }

        debug!("proxy {} destroyed", self.name);
        self.runtime.destroy_instance(&self.instance)
    }
}
