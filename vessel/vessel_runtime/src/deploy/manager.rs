//! Component manager.
//!
//! The deploy-layer orchestrator: assembles descriptors, owns the
//! per-component runtimes, and sequences start, stop, undeploy, and
//! shutdown. Assembly failures are fatal at deploy time; nothing is
//! installed for a component whose assembly failed.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::RwLock;
use tokio::task;
use tracing::{info, warn};

use vessel_core::id::ComponentId;
use vessel_core::types::ComponentMetadata;

use vessel_pipeline::assembler::PipelineAssembler;
use vessel_pipeline::descriptor::ComponentDescriptor;

use crate::component::{ComponentInstance, ComponentRuntime};
use crate::config::RuntimeConfig;
use crate::deploy::registry::ComponentRegistry;
use crate::view::{ProxySequence, ViewAssembly};

/// Errors that can occur in component manager operations
#[derive(thiserror::Error, Debug)]
pub enum ManagerError {
    #[error("Component {0} not found")]
    NotFound(ComponentId),

    #[error("Component {0} already deployed")]
    AlreadyDeployed(String),

    #[error("Component {component} has no view named {view}")]
    ViewNotFound {
        component: ComponentId,
        view: String,
    },

    #[error("Component {0} did not stop within the configured timeout")]
    StopTimeout(ComponentId),
}

/// The component manager handles deploying, starting, stopping, and
/// undeploying components
pub struct ComponentManager {
    /// Map of component IDs to runtimes
    components: RwLock<HashMap<ComponentId, Arc<ComponentRuntime>>>,

    /// Registry of deployed-component metadata
    registry: Arc<ComponentRegistry>,

    /// Sequence generator for proxy naming
    sequence: Arc<ProxySequence>,

    /// Runtime configuration
    config: RuntimeConfig,
}

impl ComponentManager {
    /// Create a new component manager
    pub fn new(config: RuntimeConfig) -> Self {
        let sequence = Arc::new(ProxySequence::starting_at(config.proxy_sequence_start));
        Self {
            components: RwLock::new(HashMap::new()),
            registry: Arc::new(ComponentRegistry::new()),
            sequence,
            config,
        }
    }

    /// The metadata registry
    pub fn registry(&self) -> &Arc<ComponentRegistry> {
        &self.registry
    }

    /// Deploy a component from its descriptor
    ///
    /// Assembles all pipelines, creates the runtime, and registers the
    /// metadata. Honors the autostart setting for the component's name.
    pub async fn deploy(&self, descriptor: ComponentDescriptor) -> Result<ComponentId> {
        let name = descriptor.name().to_string();
        info!("Deploying component: {}", name);

        if self.registry.has_name(&name).await {
            return Err(ManagerError::AlreadyDeployed(name).into());
        }

        // Fatal on any unresolved reference; nothing gets installed
        let assembly = PipelineAssembler::assemble(descriptor)?;
        let runtime = ComponentRuntime::new(assembly);
        let id = runtime.id();

        let mut metadata = ComponentMetadata::new(&name, runtime.assembly().description());
        metadata.id = id;
        metadata.set_operations(
            runtime
                .assembly()
                .operation_ids()
                .iter()
                .map(|op| op.name().to_string())
                .collect(),
        );
        metadata.set_views(runtime.assembly().view_names());
        self.registry.register(metadata).await?;

        self.components.write().await.insert(id, runtime);

        let autostart = self
            .config
            .components
            .get(&name)
            .map(|settings| settings.autostart)
            .unwrap_or(false);
        if autostart {
            info!("Auto-starting component: {}", name);
            self.start_component(&id).await?;
        }

        info!("Deployed component {} ({})", name, id);

        Ok(id)
    }

    /// Open a component's start gate
    pub async fn start_component(&self, id: &ComponentId) -> Result<()> {
        let runtime = self.runtime(id).await?;
        runtime.start();
        self.registry.update_state(id, runtime.state()).await?;
        Ok(())
    }

    /// Request a component stop
    ///
    /// Returns immediately; the component finishes stopping when its last
    /// in-flight instance is destroyed.
    pub async fn stop_component(&self, id: &ComponentId) -> Result<()> {
        let runtime = self.runtime(id).await?;
        runtime.stop();
        self.registry.update_state(id, runtime.state()).await?;
        Ok(())
    }

    /// Stop and remove a component
    ///
    /// Waits up to the configured shutdown timeout for in-flight
    /// instances to drain. The component is unregistered either way; a
    /// timeout is reported as an error.
    pub async fn undeploy(&self, id: &ComponentId) -> Result<()> {
        let runtime = {
            let mut components = self.components.write().await;
            components.remove(id).ok_or(ManagerError::NotFound(*id))?
        };

        info!("Undeploying component {}", runtime.name());
        runtime.stop();

        let timeout = Duration::from_secs(self.config.shutdown_timeout);
        let waiter = Arc::clone(&runtime);
        let stopped = task::spawn_blocking(move || waiter.await_stopped_for(timeout)).await?;

        self.registry.update_state(id, runtime.state()).await?;
        self.registry.unregister(id).await?;

        if !stopped {
            warn!(
                "component {} did not stop within {:?}",
                runtime.name(),
                timeout
            );
            return Err(ManagerError::StopTimeout(*id).into());
        }

        Ok(())
    }

    /// Create an instance of a component
    ///
    /// Bridges the blocking start-gate wait onto a blocking-capable
    /// thread; the async caller is never parked on the gate itself.
    pub async fn create_instance(&self, id: &ComponentId) -> Result<Arc<ComponentInstance>> {
        let runtime = self.runtime(id).await?;
        let instance = task::spawn_blocking(move || runtime.create_instance()).await??;
        Ok(instance)
    }

    /// Destroy an instance of a component
    pub async fn destroy_instance(
        &self,
        id: &ComponentId,
        instance: &Arc<ComponentInstance>,
    ) -> Result<()> {
        let runtime = self.runtime(id).await?;
        runtime.destroy_instance(instance)?;
        Ok(())
    }

    /// Get a view assembly for a component
    pub async fn view(&self, id: &ComponentId, view: &str) -> Result<ViewAssembly> {
        let runtime = self.runtime(id).await?;
        ViewAssembly::for_view(runtime, view, Arc::clone(&self.sequence)).ok_or_else(|| {
            ManagerError::ViewNotFound {
                component: *id,
                view: view.to_string(),
            }
            .into()
        })
    }

    /// Get component metadata
    pub async fn metadata(&self, id: &ComponentId) -> Result<ComponentMetadata> {
        self.registry.get(id).await
    }

    /// Get a component ID by name
    pub async fn component_id(&self, name: &str) -> Result<ComponentId> {
        self.registry.get_id_by_name(name).await
    }

    /// List all deployed components
    pub async fn list(&self) -> Vec<ComponentMetadata> {
        self.registry.list().await
    }

    /// Stop all components
    ///
    /// Each component that fails to drain within the timeout is logged;
    /// shutdown always proceeds to the next component.
    pub async fn shutdown(&self) -> Result<()> {
        info!("Stopping all components");

        let runtimes: Vec<Arc<ComponentRuntime>> =
            self.components.read().await.values().cloned().collect();

        for runtime in &runtimes {
            runtime.stop();
        }

        let timeout = Duration::from_secs(self.config.shutdown_timeout);
        for runtime in runtimes {
            let name = runtime.name().to_string();
            let id = runtime.id();
            let stopped =
                task::spawn_blocking(move || runtime.await_stopped_for(timeout)).await?;
            if stopped {
                self.registry
                    .update_state(&id, vessel_core::types::ComponentState::Stopped)
                    .await
                    .ok();
            } else {
                warn!("component {} did not stop within {:?}", name, timeout);
            }
        }

        info!("All components stopped");

        Ok(())
    }

    async fn runtime(&self, id: &ComponentId) -> Result<Arc<ComponentRuntime>> {
        let components = self.components.read().await;
        let runtime = components.get(id).ok_or(ManagerError::NotFound(*id))?;
        Ok(Arc::clone(runtime))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use vessel_core::types::{ComponentState, OperationId};
    use vessel_pipeline::descriptor::{instance_factory, typed_operation};

    fn echo_descriptor(name: &str) -> ComponentDescriptor {
        let mut descriptor = ComponentDescriptor::new(name, "echo component");
        descriptor.set_instance_factory(instance_factory(|| ()));
        descriptor.add_operation(
            OperationId::new("echo"),
            typed_operation::<(), _>(|_, params| Ok(params)),
        );
        descriptor
    }

    #[tokio::test]
    async fn test_deploy_start_invoke_undeploy() {
        let manager = ComponentManager::new(RuntimeConfig::default());

        let id = manager.deploy(echo_descriptor("echo")).await.unwrap();
        assert_eq!(manager.metadata(&id).await.unwrap().state, ComponentState::NotStarted);

        manager.start_component(&id).await.unwrap();
        assert_eq!(manager.metadata(&id).await.unwrap().state, ComponentState::Started);

        let instance = manager.create_instance(&id).await.unwrap();
        assert_eq!(
            instance.invoke(&OperationId::new("echo"), Value::from(1)).unwrap(),
            Value::from(1)
        );
        manager.destroy_instance(&id, &instance).await.unwrap();

        manager.undeploy(&id).await.unwrap();
        assert!(manager.metadata(&id).await.is_err());
        assert!(manager.create_instance(&id).await.is_err());
    }

    #[tokio::test]
    async fn test_duplicate_deploy_fails() {
        let manager = ComponentManager::new(RuntimeConfig::default());

        manager.deploy(echo_descriptor("echo")).await.unwrap();
        let err = manager.deploy(echo_descriptor("echo")).await.unwrap_err();
        assert!(err.to_string().contains("already deployed"));
    }

    #[tokio::test]
    async fn test_failed_assembly_installs_nothing() {
        let manager = ComponentManager::new(RuntimeConfig::default());

        let mut descriptor = echo_descriptor("broken");
        descriptor.add_operation_interceptor(
            OperationId::new("missing"),
            vessel_pipeline::descriptor::InterceptorBinding::new(
                "X",
                10,
                Arc::new(vessel_pipeline::interceptor::ImmediateUnit::new(
                    vessel_pipeline::interceptor::FnInterceptor::new(|ctx, next| {
                        next.proceed(ctx)
                    }),
                )),
            ),
        );

        assert!(manager.deploy(descriptor).await.is_err());
        assert!(manager.list().await.is_empty());
        assert!(manager.component_id("broken").await.is_err());
    }

    #[tokio::test]
    async fn test_autostart_from_config() {
        let mut config = RuntimeConfig::default();
        config
            .components
            .insert("echo".to_string(), crate::config::ComponentSettings { autostart: true });

        let manager = ComponentManager::new(config);
        let id = manager.deploy(echo_descriptor("echo")).await.unwrap();

        assert_eq!(
            manager.metadata(&id).await.unwrap().state,
            ComponentState::Started
        );
    }

    #[tokio::test]
    async fn test_shutdown_stops_all() {
        let manager = ComponentManager::new(RuntimeConfig::default());

        let first = manager.deploy(echo_descriptor("first")).await.unwrap();
        let second = manager.deploy(echo_descriptor("second")).await.unwrap();
        manager.start_component(&first).await.unwrap();
        manager.start_component(&second).await.unwrap();

        manager.shutdown().await.unwrap();

        assert_eq!(
            manager.metadata(&first).await.unwrap().state,
            ComponentState::Stopped
        );
        assert_eq!(
            manager.metadata(&second).await.unwrap().state,
            ComponentState::Stopped
        );
        assert!(manager.create_instance(&first).await.is_err());
    }
}
