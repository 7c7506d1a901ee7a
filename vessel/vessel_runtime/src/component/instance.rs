//! Component instance handles.
//!
//! An instance owns its `InstanceContext` and the interceptor chains bound
//! against it at construction time. The handle is cheap to share; all
//! mutable state sits behind the context lock, and the destroy guard makes
//! teardown race-free and idempotent.

use parking_lot::Mutex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use vessel_core::error::{InvocationError, LifecycleError, Result};
use vessel_core::id::{ComponentId, InstanceId};
use vessel_core::types::{LifecyclePhase, OperationId};

use vessel_pipeline::context::{InstanceContext, InvocationContext};
use vessel_pipeline::pipeline::InterceptorChain;

/// A live component instance.
///
/// Created by [`ComponentRuntime::create_instance`], destroyed exactly
/// once through [`ComponentRuntime::destroy_instance`].
///
/// [`ComponentRuntime::create_instance`]: super::runtime::ComponentRuntime::create_instance
/// [`ComponentRuntime::destroy_instance`]: super::runtime::ComponentRuntime::destroy_instance
#[derive(Debug)]
pub struct ComponentInstance {
    id: InstanceId,
    component: ComponentId,
    component_name: Arc<str>,
    context: Mutex<InstanceContext>,
    operation_chains: BTreeMap<OperationId, InterceptorChain>,
    pre_destroy_chain: InterceptorChain,
    pre_passivate_chain: InterceptorChain,
    post_activate_chain: InterceptorChain,
    destroyed: AtomicBool,
}

impl ComponentInstance {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: InstanceId,
        component: ComponentId,
        component_name: Arc<str>,
        context: InstanceContext,
        operation_chains: BTreeMap<OperationId, InterceptorChain>,
        pre_destroy_chain: InterceptorChain,
        pre_passivate_chain: InterceptorChain,
        post_activate_chain: InterceptorChain,
    ) -> Self {
        Self {
            id,
            component,
            component_name,
            context: Mutex::new(context),
            operation_chains,
            pre_destroy_chain,
            pre_passivate_chain,
            post_activate_chain,
            destroyed: AtomicBool::new(false),
        }
    }

    /// The instance ID.
    pub fn id(&self) -> InstanceId {
        self.id
    }

    /// The owning component.
    pub fn component(&self) -> ComponentId {
        self.component
    }

    /// Check if this instance has been destroyed.
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    /// The operations this instance can serve.
    pub fn operations(&self) -> Vec<OperationId> {
        self.operation_chains.keys().cloned().collect()
    }

    /// Invoke an operation through its around-invoke chain.
    pub fn invoke(&self, operation: &OperationId, parameters: Value) -> Result<Value> {
        if self.is_destroyed() {
            return Err(LifecycleError::InstanceDestroyed(self.id).into());
        }
        let chain = self
            .operation_chains
            .get(operation)
            .ok_or_else(|| InvocationError::OperationNotFound(operation.clone()))?;

        let mut context = self.context.lock();
        let mut ctx =
            InvocationContext::with_instance(operation.clone(), parameters, &mut context);
        chain.invoke(&mut ctx)
    }

    /// Run the pre-passivate pipeline.
    pub fn passivate(&self) -> Result<()> {
        if self.is_destroyed() {
            return Err(LifecycleError::InstanceDestroyed(self.id).into());
        }
        self.run_phase(&self.pre_passivate_chain, LifecyclePhase::PrePassivate)
    }

    /// Run the post-activate pipeline.
    pub fn activate(&self) -> Result<()> {
        if self.is_destroyed() {
            return Err(LifecycleError::InstanceDestroyed(self.id).into());
        }
        self.run_phase(&self.post_activate_chain, LifecyclePhase::PostActivate)
    }

    fn run_phase(&self, chain: &InterceptorChain, phase: LifecyclePhase) -> Result<()> {
        let mut context = self.context.lock();
        let mut ctx =
            InvocationContext::with_instance(phase.operation_id(), Value::Null, &mut context);
        chain.invoke(&mut ctx).map(|_| ())
    }

    /// Flip the destroy guard. Returns `true` if this call won the race
    /// and must perform the teardown.
    pub(crate) fn mark_destroyed(&self) -> bool {
        !self.destroyed.swap(true, Ordering::SeqCst)
    }

    /// Run the pre-destroy pipeline and release everything the instance
    /// still holds.
    ///
    /// Callback failures are logged and swallowed so that resource release
    /// is never skipped.
    pub(crate) fn run_pre_destroy(&self) {
        let mut context = self.context.lock();

        {
            let mut ctx = InvocationContext::with_instance(
                LifecyclePhase::PreDestroy.operation_id(),
                Value::Null,
                &mut context,
            );
            if let Err(err) = self.pre_destroy_chain.invoke(&mut ctx) {
                warn!(
                    "pre-destroy failed for instance {} of component {}: {}",
                    self.id, self.component_name, err
                );
            }
        }

        // Safety net: anything the chain did not release goes now, newest
        // first.
        context.release_remaining();
        debug!(
            "instance {} of component {} destroyed",
            self.id, self.component_name
        );
    }
}
