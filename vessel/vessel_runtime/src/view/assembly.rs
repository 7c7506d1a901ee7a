//! View assembly: building client proxies over a component runtime.
//!
//! A `ViewAssembly` pairs one view plan with the component runtime it
//! fronts. Creating a proxy binds a fresh component instance, builds the
//! client and view ring chains with their dispatchers appended at the
//! fixed latest ring position, and runs the client-scoped post-construct
//! pipeline.

use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

use vessel_core::error::{LifecycleError, Result};
use vessel_core::id::{ComponentId, InstanceId, ProxyId};
use vessel_core::types::LifecyclePhase;

use vessel_pipeline::assembler::ViewPlan;
use vessel_pipeline::context::{InstanceContext, InvocationContext};
use vessel_pipeline::pipeline::InterceptorChain;

use crate::component::ComponentRuntime;

use super::proxy::{ClientDispatcher, ClientProxy, ViewDispatcher, ViewRing};

/// A caller-owned sequence generator for proxy naming.
///
/// The container never keeps process-wide counters; whoever owns the
/// deployment owns the sequence.
pub struct ProxySequence {
    next: AtomicU64,
}

impl ProxySequence {
    /// Create a sequence starting at zero.
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    /// Create a sequence starting at the given value.
    pub fn starting_at(start: u64) -> Self {
        Self {
            next: AtomicU64::new(start),
        }
    }

    /// Hand out the next value.
    pub fn next(&self) -> u64 {
        self.next.fetch_add(1, Ordering::SeqCst)
    }
}

impl Default for ProxySequence {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds client proxies for one view of one component.
pub struct ViewAssembly {
    runtime: Arc<ComponentRuntime>,
    plan: Arc<ViewPlan>,
    sequence: Arc<ProxySequence>,
}

impl ViewAssembly {
    /// Look up a view on the runtime's assembly.
    ///
    /// Returns `None` if the component declares no view with that name.
    pub fn for_view(
        runtime: Arc<ComponentRuntime>,
        view: &str,
        sequence: Arc<ProxySequence>,
    ) -> Option<Self> {
        let plan = Arc::clone(runtime.assembly().view(view)?);
        Some(Self {
            runtime,
            plan,
            sequence,
        })
    }

    /// The view name.
    pub fn name(&self) -> &str {
        &self.plan.name
    }

    /// The component this view fronts.
    pub fn component(&self) -> ComponentId {
        self.runtime.id()
    }

    /// Create a client proxy.
    ///
    /// Binds a fresh component instance through the runtime's start gate,
    /// builds the ring chains, and runs the client-scoped post-construct
    /// pipeline. If that pipeline fails, the proxy-scoped resources are
    /// unwound and the bound instance is destroyed again.
    pub fn create_proxy_instance(&self) -> Result<Arc<ClientProxy>> {
        let instance = self.runtime.create_instance()?;
        let number = self.sequence.next();
        let proxy_name = format!("{}$$view{}", self.plan.name, number);

        let mut context = InstanceContext::new(self.runtime.id(), InstanceId::new());

        let built = self.build_rings(&instance, &mut context);
        let (chains, pre_destroy_chain) = match built {
            Ok(parts) => parts,
            Err(err) => {
                context.release_remaining();
                let _ = self.runtime.destroy_instance(&instance);
                return Err(err);
            }
        };

        // Client-scoped post-construct
        let post_construct = match self.plan.client_post_construct.bind(&mut context) {
            Ok(chain) => chain,
            Err(err) => {
                context.release_remaining();
                let _ = self.runtime.destroy_instance(&instance);
                return Err(err);
            }
        };
        let constructed = {
            let mut ctx = InvocationContext::with_instance(
                LifecyclePhase::PostConstruct.operation_id(),
                Value::Null,
                &mut context,
            );
            post_construct.invoke(&mut ctx)
        };
        if let Err(err) = constructed {
            context.release_remaining();
            let _ = self.runtime.destroy_instance(&instance);
            return Err(LifecycleError::PostConstructFailed(err.to_string()).into());
        }

        debug!("created proxy {} over instance {}", proxy_name, instance.id());

        Ok(Arc::new(ClientProxy::new(
            ProxyId::new(),
            proxy_name,
            self.plan.name.clone(),
            Arc::clone(&self.runtime),
            instance,
            context,
            chains,
            pre_destroy_chain,
        )))
    }

    /// Build the client and view ring chains, dispatchers at the tail.
    fn build_rings(
        &self,
        instance: &Arc<crate::component::ComponentInstance>,
        context: &mut InstanceContext,
    ) -> Result<(BTreeMap<vessel_core::types::OperationId, InterceptorChain>, InterceptorChain)>
    {
        let mut view_chains = BTreeMap::new();
        for (view_op, pipeline) in &self.plan.view_pipelines {
            let component_op = self.plan.operations[view_op].clone();
            let mut interceptors = pipeline.instantiate(context)?;
            interceptors.push(Box::new(ViewDispatcher {
                instance: Arc::clone(instance),
                operation: component_op,
            }));
            view_chains.insert(view_op.clone(), InterceptorChain::new(interceptors));
        }
        let ring = Arc::new(ViewRing {
            chains: view_chains,
        });

        let mut client_chains = BTreeMap::new();
        for (view_op, pipeline) in &self.plan.client_pipelines {
            let mut interceptors = pipeline.instantiate(context)?;
            interceptors.push(Box::new(ClientDispatcher {
                ring: Arc::clone(&ring),
            }));
            client_chains.insert(view_op.clone(), InterceptorChain::new(interceptors));
        }

        let pre_destroy_chain = self.plan.client_pre_destroy.bind(context)?;
        Ok((client_chains, pre_destroy_chain))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use vessel_core::error::{Error, InvocationError};
    use vessel_core::types::OperationId;
    use vessel_pipeline::assembler::PipelineAssembler;
    use vessel_pipeline::descriptor::{
        instance_factory, typed_operation, ComponentDescriptor, InterceptorBinding, ViewDescriptor,
    };
    use vessel_pipeline::interceptor::{FnInterceptor, ImmediateUnit};
    use vessel_pipeline::priority;

    fn recording(
        name: &'static str,
        log: &Arc<StdMutex<Vec<&'static str>>>,
        fail: bool,
    ) -> InterceptorBinding {
        let log = Arc::clone(log);
        InterceptorBinding::new(
            name,
            priority::ring::USER,
            Arc::new(ImmediateUnit::new(FnInterceptor::new(move |ctx, next| {
                log.lock().unwrap().push(name);
                if fail {
                    Err(InvocationError::Failed(format!("{} failed", name)).into())
                } else {
                    next.proceed(ctx)
                }
            }))),
        )
    }

    fn descriptor_with_view(
        log: &Arc<StdMutex<Vec<&'static str>>>,
        client_fails: bool,
    ) -> ComponentDescriptor {
        let mut descriptor = ComponentDescriptor::new("echo", "echo component");
        descriptor.set_instance_factory(instance_factory(|| ()));
        let target_log = Arc::clone(log);
        descriptor.add_operation(
            OperationId::new("echo"),
            typed_operation::<(), _>(move |_, params| {
                target_log.lock().unwrap().push("target");
                Ok(params)
            }),
        );
        descriptor.add_operation_interceptor(
            OperationId::new("echo"),
            recording("component-ring", log, false),
        );

        let mut view = ViewDescriptor::new("remote");
        view.expose_operation(OperationId::new("echo"));
        view.add_client_interceptor(recording("client-ring", log, client_fails));
        view.add_view_interceptor(recording("view-ring", log, false));
        descriptor.add_view(view);
        descriptor
    }

    fn started_runtime(descriptor: ComponentDescriptor) -> Arc<ComponentRuntime> {
        let runtime = ComponentRuntime::new(PipelineAssembler::assemble(descriptor).unwrap());
        runtime.start();
        runtime
    }

    #[test]
    fn test_rings_dispatch_in_order() {
        let log = Arc::new(StdMutex::new(Vec::new()));
        let runtime = started_runtime(descriptor_with_view(&log, false));
        let assembly =
            ViewAssembly::for_view(runtime, "remote", Arc::new(ProxySequence::new())).unwrap();

        let proxy = assembly.create_proxy_instance().unwrap();
        let result = proxy
            .invoke(&OperationId::new("echo"), Value::from("hi"))
            .unwrap();

        assert_eq!(result, Value::from("hi"));
        assert_eq!(
            *log.lock().unwrap(),
            vec!["client-ring", "view-ring", "component-ring", "target"]
        );
    }

    #[test]
    fn test_client_ring_failure_short_circuits_later_rings() {
        let log = Arc::new(StdMutex::new(Vec::new()));
        let runtime = started_runtime(descriptor_with_view(&log, true));
        let assembly =
            ViewAssembly::for_view(runtime, "remote", Arc::new(ProxySequence::new())).unwrap();

        let proxy = assembly.create_proxy_instance().unwrap();
        let err = proxy
            .invoke(&OperationId::new("echo"), Value::Null)
            .unwrap_err();

        assert!(matches!(err, Error::Invocation(InvocationError::Failed(_))));
        // Neither the view ring nor the component ring ran
        assert_eq!(*log.lock().unwrap(), vec!["client-ring"]);
    }

    #[test]
    fn test_unknown_view_returns_none() {
        let log = Arc::new(StdMutex::new(Vec::new()));
        let runtime = started_runtime(descriptor_with_view(&log, false));
        assert!(
            ViewAssembly::for_view(runtime, "no-such-view", Arc::new(ProxySequence::new()))
                .is_none()
        );
    }

    #[test]
    fn test_proxy_names_follow_injected_sequence() {
        let log = Arc::new(StdMutex::new(Vec::new()));
        let runtime = started_runtime(descriptor_with_view(&log, false));
        let sequence = Arc::new(ProxySequence::starting_at(7));
        let assembly = ViewAssembly::for_view(runtime, "remote", sequence).unwrap();

        let first = assembly.create_proxy_instance().unwrap();
        let second = assembly.create_proxy_instance().unwrap();
        assert_eq!(first.proxy_name(), "remote$$view7");
        assert_eq!(second.proxy_name(), "remote$$view8");
    }

    #[test]
    fn test_proxy_destroy_is_idempotent_and_destroys_instance() {
        let log = Arc::new(StdMutex::new(Vec::new()));
        let runtime = started_runtime(descriptor_with_view(&log, false));
        let assembly = ViewAssembly::for_view(Arc::clone(&runtime), "remote", Arc::new(ProxySequence::new()))
            .unwrap();

        let proxy = assembly.create_proxy_instance().unwrap();
        assert_eq!(runtime.active_instances(), 1);

        proxy.destroy().unwrap();
        proxy.destroy().unwrap();
        assert_eq!(runtime.active_instances(), 0);
        assert!(proxy.is_destroyed());

        let err = proxy
            .invoke(&OperationId::new("echo"), Value::Null)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Lifecycle(vessel_core::error::LifecycleError::ProxyDestroyed(_))
        ));
    }
}
