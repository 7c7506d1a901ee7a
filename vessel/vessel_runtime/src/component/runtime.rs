//! The component lifecycle state machine.
//!
//! A `ComponentRuntime` owns the frozen pipelines for one deployed
//! component and gates instance creation on the start/stop state. The
//! state pair lives behind a single monitor (mutex + condition variable);
//! `create_instance` is the only operation that may block, waiting
//! cooperatively on the gate until the component starts or begins
//! stopping.

use parking_lot::{Condvar, Mutex};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use vessel_core::error::{LifecycleError, Result};
use vessel_core::id::{ComponentId, InstanceId};
use vessel_core::types::{ComponentState, LifecyclePhase};

use vessel_pipeline::assembler::ComponentAssembly;
use vessel_pipeline::context::{InstanceContext, InvocationContext};
use vessel_pipeline::pipeline::InterceptorChain;

use super::instance::ComponentInstance;

/// State guarded by the runtime monitor.
struct MonitorState {
    /// Current lifecycle state.
    state: ComponentState,

    /// Instances created and not yet destroyed.
    active_instances: usize,
}

/// The lifecycle runtime for one deployed component.
///
/// Owns the frozen pipelines, the start gate, and the instance factory.
/// Pipelines are immutable and shared; the only shared mutable state is
/// the monitor, and every read or write of the state pair goes through it.
pub struct ComponentRuntime {
    id: ComponentId,
    name: Arc<str>,
    assembly: ComponentAssembly,
    monitor: Mutex<MonitorState>,
    gate: Condvar,
}

impl ComponentRuntime {
    /// Create a runtime around a frozen assembly.
    ///
    /// The component starts in `NotStarted`; instance creation blocks
    /// until [`start`](Self::start) is called.
    pub fn new(assembly: ComponentAssembly) -> Arc<Self> {
        let name: Arc<str> = Arc::from(assembly.name());
        Arc::new(Self {
            id: ComponentId::new(),
            name,
            assembly,
            monitor: Mutex::new(MonitorState {
                state: ComponentState::NotStarted,
                active_instances: 0,
            }),
            gate: Condvar::new(),
        })
    }

    /// The component ID.
    pub fn id(&self) -> ComponentId {
        self.id
    }

    /// The component name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The frozen assembly.
    pub fn assembly(&self) -> &ComponentAssembly {
        &self.assembly
    }

    /// The current lifecycle state.
    pub fn state(&self) -> ComponentState {
        self.monitor.lock().state
    }

    /// Instances created and not yet destroyed.
    pub fn active_instances(&self) -> usize {
        self.monitor.lock().active_instances
    }

    /// Open the start gate, waking every thread blocked in
    /// [`create_instance`](Self::create_instance).
    ///
    /// Idempotent: repeated calls are no-ops. Calling start on a stopping
    /// or stopped component is ignored with a warning.
    pub fn start(&self) {
        let mut monitor = self.monitor.lock();
        match monitor.state {
            ComponentState::NotStarted => {
                monitor.state = ComponentState::Started;
                info!("component {} started", self.name);
                self.gate.notify_all();
            }
            ComponentState::Started => {
                debug!("component {} already started", self.name);
            }
            ComponentState::Stopping | ComponentState::Stopped => {
                warn!(
                    "ignoring start of component {} in state {}",
                    self.name, monitor.state
                );
            }
        }
    }

    /// Request a stop.
    ///
    /// Never blocks. The gate closes, blocked creators are woken so they
    /// fail fast, and the component becomes `Stopped` as soon as the last
    /// in-flight instance is destroyed (immediately, if there are none).
    /// Completion is observable through [`state`](Self::state) and
    /// [`await_stopped`](Self::await_stopped). Repeated calls are no-ops.
    pub fn stop(&self) {
        let mut monitor = self.monitor.lock();
        match monitor.state {
            ComponentState::NotStarted | ComponentState::Started => {
                if monitor.active_instances == 0 {
                    monitor.state = ComponentState::Stopped;
                    info!("component {} stopped", self.name);
                } else {
                    monitor.state = ComponentState::Stopping;
                    info!(
                        "component {} stopping, {} instances in flight",
                        self.name, monitor.active_instances
                    );
                }
                self.gate.notify_all();
            }
            ComponentState::Stopping | ComponentState::Stopped => {
                debug!("component {} already stopping or stopped", self.name);
            }
        }
    }

    /// Block until the component reaches `Stopped`.
    pub fn await_stopped(&self) {
        let mut monitor = self.monitor.lock();
        while monitor.state != ComponentState::Stopped {
            self.gate.wait(&mut monitor);
        }
    }

    /// Block until the component reaches `Stopped`, or the timeout
    /// elapses. Returns `true` if the component stopped in time.
    pub fn await_stopped_for(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut monitor = self.monitor.lock();
        while monitor.state != ComponentState::Stopped {
            if self.gate.wait_until(&mut monitor, deadline).timed_out() {
                return monitor.state == ComponentState::Stopped;
            }
        }
        true
    }

    /// Create a new instance, blocking until the component is started.
    ///
    /// If the component is stopping or stopped, fails immediately with an
    /// unavailability error; a waiter is released with the same error if
    /// the component begins stopping before it starts. On success the
    /// post-construct pipeline has run and the returned handle is live.
    pub fn create_instance(&self) -> Result<Arc<ComponentInstance>> {
        self.pass_gate(None)?;
        self.construct()
    }

    /// Like [`create_instance`](Self::create_instance), but gives up on
    /// the gate after `timeout`.
    pub fn create_instance_within(&self, timeout: Duration) -> Result<Arc<ComponentInstance>> {
        self.pass_gate(Some(timeout))?;
        self.construct()
    }

    /// Destroy an instance, running its pre-destroy pipeline exactly once.
    ///
    /// Idempotent: a second call on the same handle is a silent no-op.
    /// Pre-destroy callback failures are logged and never prevent
    /// resource release.
    pub fn destroy_instance(&self, instance: &Arc<ComponentInstance>) -> Result<()> {
        if !instance.mark_destroyed() {
            debug!(
                "instance {} of component {} already destroyed",
                instance.id(),
                self.name
            );
            return Ok(());
        }

        instance.run_pre_destroy();
        self.on_instance_released();
        Ok(())
    }

    /// Wait on the gate; on success the caller holds one active-instance
    /// slot.
    fn pass_gate(&self, timeout: Option<Duration>) -> Result<()> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut monitor = self.monitor.lock();
        loop {
            match monitor.state {
                ComponentState::Started => break,
                ComponentState::NotStarted => match deadline {
                    None => self.gate.wait(&mut monitor),
                    Some(deadline) => {
                        if self.gate.wait_until(&mut monitor, deadline).timed_out()
                            && monitor.state == ComponentState::NotStarted
                        {
                            return Err(LifecycleError::CreateTimeout {
                                component: self.id,
                                waited_ms: timeout.unwrap_or_default().as_millis() as u64,
                            }
                            .into());
                        }
                    }
                },
                ComponentState::Stopping | ComponentState::Stopped => {
                    return Err(LifecycleError::Unavailable(self.id).into());
                }
            }
        }
        monitor.active_instances += 1;
        Ok(())
    }

    /// Allocate the instance context, bind every chain, and run the
    /// post-construct pipeline.
    fn construct(&self) -> Result<Arc<ComponentInstance>> {
        let instance_id = InstanceId::new();
        let mut context = InstanceContext::new(self.id, instance_id);

        match self.bind_and_construct(&mut context) {
            Ok((operation_chains, pre_destroy, pre_passivate, post_activate)) => {
                debug!(
                    "instance {} of component {} constructed",
                    instance_id, self.name
                );
                Ok(Arc::new(ComponentInstance::new(
                    instance_id,
                    self.id,
                    Arc::clone(&self.name),
                    context,
                    operation_chains,
                    pre_destroy,
                    pre_passivate,
                    post_activate,
                )))
            }
            Err(err) => {
                // The chain already unwound what it acquired; drain any
                // remainder and give the slot back.
                context.release_remaining();
                self.on_instance_released();
                Err(LifecycleError::PostConstructFailed(err.to_string()).into())
            }
        }
    }

    #[allow(clippy::type_complexity)]
    fn bind_and_construct(
        &self,
        context: &mut InstanceContext,
    ) -> Result<(
        BTreeMap<vessel_core::types::OperationId, InterceptorChain>,
        InterceptorChain,
        InterceptorChain,
        InterceptorChain,
    )> {
        let lifecycle = self.assembly.lifecycle();
        let post_construct = lifecycle.post_construct.bind(context)?;

        let mut operation_chains = BTreeMap::new();
        for (op, pipeline) in self.assembly.operations() {
            operation_chains.insert(op.clone(), pipeline.bind(context)?);
        }
        let pre_destroy = lifecycle.pre_destroy.bind(context)?;
        let pre_passivate = lifecycle.pre_passivate.bind(context)?;
        let post_activate = lifecycle.post_activate.bind(context)?;

        let mut ctx = InvocationContext::with_instance(
            LifecyclePhase::PostConstruct.operation_id(),
            Value::Null,
            context,
        );
        post_construct.invoke(&mut ctx)?;

        Ok((operation_chains, pre_destroy, pre_passivate, post_activate))
    }

    /// One instance slot released; finish the stop if it was the last.
    fn on_instance_released(&self) {
        let mut monitor = self.monitor.lock();
        monitor.active_instances = monitor.active_instances.saturating_sub(1);
        if monitor.state == ComponentState::Stopping && monitor.active_instances == 0 {
            monitor.state = ComponentState::Stopped;
            info!("component {} stopped", self.name);
            self.gate.notify_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::sync::Mutex as StdMutex;
    use std::thread;
    use vessel_core::error::Error;
    use vessel_core::types::OperationId;
    use vessel_pipeline::context::ContextKey;
    use vessel_pipeline::descriptor::{
        instance_factory, typed_callback, typed_operation, ComponentDescriptor, ResourceInjection,
    };
    use vessel_pipeline::assembler::PipelineAssembler;

    fn counter_descriptor() -> ComponentDescriptor {
        let mut descriptor = ComponentDescriptor::new("counter", "test component");
        descriptor.set_instance_factory(instance_factory(|| 0i64));
        descriptor.add_operation(
            OperationId::new("add"),
            typed_operation::<i64, _>(|state, params| {
                *state += params.as_i64().unwrap_or(0);
                Ok(Value::from(*state))
            }),
        );
        descriptor
    }

    fn runtime_from(descriptor: ComponentDescriptor) -> Arc<ComponentRuntime> {
        ComponentRuntime::new(PipelineAssembler::assemble(descriptor).unwrap())
    }

    #[test]
    fn test_create_blocks_until_start() {
        let runtime = runtime_from(counter_descriptor());
        let (tx, rx) = mpsc::channel();

        let worker = {
            let runtime = Arc::clone(&runtime);
            let tx = tx.clone();
            thread::spawn(move || {
                let result = runtime.create_instance();
                tx.send(result.is_ok()).unwrap();
            })
        };

        // The creator must still be blocked on the gate
        thread::sleep(Duration::from_millis(100));
        assert!(rx.try_recv().is_err(), "create returned before start");

        runtime.start();
        assert!(rx.recv_timeout(Duration::from_secs(5)).unwrap());
        worker.join().unwrap();
        assert_eq!(runtime.active_instances(), 1);
    }

    #[test]
    fn test_create_after_stop_fails_fast() {
        let runtime = runtime_from(counter_descriptor());
        runtime.start();
        runtime.stop();

        let err = runtime.create_instance().unwrap_err();
        assert!(matches!(
            err,
            Error::Lifecycle(LifecycleError::Unavailable(_))
        ));
    }

    #[test]
    fn test_stop_releases_blocked_waiters() {
        let runtime = runtime_from(counter_descriptor());
        let (tx, rx) = mpsc::channel();

        let workers: Vec<_> = (0..3)
            .map(|_| {
                let runtime = Arc::clone(&runtime);
                let tx = tx.clone();
                thread::spawn(move || {
                    let result = runtime.create_instance();
                    tx.send(result.err()).unwrap();
                })
            })
            .collect();

        // Let all three block on the gate, then stop without starting
        thread::sleep(Duration::from_millis(100));
        runtime.stop();

        for _ in 0..3 {
            let err = rx.recv_timeout(Duration::from_secs(5)).unwrap();
            assert!(matches!(
                err,
                Some(Error::Lifecycle(LifecycleError::Unavailable(_)))
            ));
        }
        for worker in workers {
            worker.join().unwrap();
        }
        assert_eq!(runtime.state(), ComponentState::Stopped);
    }

    #[test]
    fn test_create_timeout() {
        let runtime = runtime_from(counter_descriptor());

        let err = runtime
            .create_instance_within(Duration::from_millis(50))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Lifecycle(LifecycleError::CreateTimeout { .. })
        ));
    }

    #[test]
    fn test_invoke_runs_operation_chain() {
        let runtime = runtime_from(counter_descriptor());
        runtime.start();

        let instance = runtime.create_instance().unwrap();
        assert_eq!(
            instance.invoke(&OperationId::new("add"), Value::from(5)).unwrap(),
            Value::from(5)
        );
        assert_eq!(
            instance.invoke(&OperationId::new("add"), Value::from(3)).unwrap(),
            Value::from(8)
        );
    }

    #[test]
    fn test_destroy_is_idempotent() {
        let destroyed = Arc::new(StdMutex::new(0usize));
        let mut descriptor = counter_descriptor();
        let counter = Arc::clone(&destroyed);
        descriptor.add_lifecycle_callback(
            LifecyclePhase::PreDestroy,
            "count-destroy",
            typed_callback::<i64, _>(move |_| {
                *counter.lock().unwrap() += 1;
                Ok(())
            }),
        );

        let runtime = runtime_from(descriptor);
        runtime.start();

        let instance = runtime.create_instance().unwrap();
        runtime.destroy_instance(&instance).unwrap();
        runtime.destroy_instance(&instance).unwrap();

        assert_eq!(*destroyed.lock().unwrap(), 1);
        assert_eq!(runtime.active_instances(), 0);
        assert!(instance.is_destroyed());
    }

    #[test]
    fn test_invoke_after_destroy_fails() {
        let runtime = runtime_from(counter_descriptor());
        runtime.start();

        let instance = runtime.create_instance().unwrap();
        runtime.destroy_instance(&instance).unwrap();

        let err = instance
            .invoke(&OperationId::new("add"), Value::from(1))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Lifecycle(LifecycleError::InstanceDestroyed(_))
        ));
    }

    #[test]
    fn test_failed_construction_unwinds_in_reverse() {
        let released = Arc::new(StdMutex::new(Vec::new()));
        let mut descriptor = counter_descriptor();

        for name in ["a", "b"] {
            let released = Arc::clone(&released);
            descriptor.add_resource_injection(
                ResourceInjection::new(
                    name,
                    ContextKey::new(name),
                    Arc::new(|| Ok(Box::new(()) as vessel_pipeline::context::Holder)),
                )
                .with_release(Arc::new(move |_| {
                    released.lock().unwrap().push(name);
                })),
            );
        }
        descriptor.add_lifecycle_callback(
            LifecyclePhase::PostConstruct,
            "failing-init",
            typed_callback::<i64, _>(|_| {
                Err(vessel_core::error::Error::Runtime("init failed".to_string()))
            }),
        );

        let runtime = runtime_from(descriptor);
        runtime.start();

        let err = runtime.create_instance().unwrap_err();
        assert!(matches!(
            err,
            Error::Lifecycle(LifecycleError::PostConstructFailed(_))
        ));

        // Injection runs innermost-first (b then a), so the unwind
        // releases a then b
        assert_eq!(*released.lock().unwrap(), vec!["a", "b"]);
        assert_eq!(runtime.active_instances(), 0);
    }

    #[test]
    fn test_destroy_failure_still_releases_resources() {
        let released = Arc::new(StdMutex::new(false));
        let mut descriptor = counter_descriptor();

        let flag = Arc::clone(&released);
        descriptor.add_resource_injection(
            ResourceInjection::new(
                "db",
                ContextKey::new("db"),
                Arc::new(|| Ok(Box::new(()) as vessel_pipeline::context::Holder)),
            )
            .with_release(Arc::new(move |_| {
                *flag.lock().unwrap() = true;
            })),
        );
        descriptor.add_lifecycle_callback(
            LifecyclePhase::PreDestroy,
            "failing-close",
            typed_callback::<i64, _>(|_| {
                Err(vessel_core::error::Error::Runtime("close failed".to_string()))
            }),
        );

        let runtime = runtime_from(descriptor);
        runtime.start();

        let instance = runtime.create_instance().unwrap();
        // Destroy succeeds even though the callback failed
        runtime.destroy_instance(&instance).unwrap();
        assert!(*released.lock().unwrap(), "resource leaked on destroy failure");
    }

    #[test]
    fn test_stop_completes_when_last_instance_destroyed() {
        let runtime = runtime_from(counter_descriptor());
        runtime.start();

        let instance = runtime.create_instance().unwrap();
        runtime.stop();
        assert_eq!(runtime.state(), ComponentState::Stopping);

        // Existing instances may still be driven to completion
        runtime.destroy_instance(&instance).unwrap();
        assert_eq!(runtime.state(), ComponentState::Stopped);
        assert!(runtime.await_stopped_for(Duration::from_millis(10)));
    }

    #[test]
    fn test_start_and_stop_are_idempotent() {
        let runtime = runtime_from(counter_descriptor());
        runtime.start();
        runtime.start();
        assert_eq!(runtime.state(), ComponentState::Started);

        runtime.stop();
        runtime.stop();
        assert_eq!(runtime.state(), ComponentState::Stopped);

        // Starting a stopped component is ignored
        runtime.start();
        assert_eq!(runtime.state(), ComponentState::Stopped);
    }

    #[test]
    fn test_passivation_phases_run() {
        let events = Arc::new(StdMutex::new(Vec::new()));
        let mut descriptor = counter_descriptor();

        for (phase, label) in [
            (LifecyclePhase::PrePassivate, "passivate"),
            (LifecyclePhase::PostActivate, "activate"),
        ] {
            let events = Arc::clone(&events);
            descriptor.add_lifecycle_callback(
                phase,
                label,
                typed_callback::<i64, _>(move |_| {
                    events.lock().unwrap().push(label);
                    Ok(())
                }),
            );
        }

        let runtime = runtime_from(descriptor);
        runtime.start();

        let instance = runtime.create_instance().unwrap();
        instance.passivate().unwrap();
        instance.activate().unwrap();
        assert_eq!(*events.lock().unwrap(), vec!["passivate", "activate"]);
    }
}
