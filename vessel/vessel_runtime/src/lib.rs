//! # Vessel Runtime
//!
//! `vessel_runtime` is the runtime half of the Vessel managed-component
//! container: the component lifecycle state machine with its start gate,
//! the three-ring view assembly producing client proxies, and the deploy
//! layer that turns descriptors into running components.

pub mod component;
pub mod config;
pub mod deploy;
pub mod view;

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use vessel_core::id::ComponentId;
use vessel_pipeline::descriptor::ComponentDescriptor;

/// Container facade that ties configuration, the registry, and the
/// component manager together.
pub struct Container {
    /// Component manager for deploying and driving components
    pub components: Arc<deploy::ComponentManager>,
}

impl Container {
    /// Create a new container
    pub async fn new(config_path: Option<&str>) -> Result<Self> {
        info!("Initializing Vessel container");

        let config = config::RuntimeConfig::load(config_path).await?;
        let components = Arc::new(deploy::ComponentManager::new(config));

        info!("Vessel container initialized");

        Ok(Self { components })
    }

    /// Deploy a component from its descriptor
    pub async fn deploy(&self, descriptor: ComponentDescriptor) -> Result<ComponentId> {
        self.components.deploy(descriptor).await
    }

    /// Open a component's start gate
    pub async fn start_component(&self, id: &ComponentId) -> Result<()> {
        self.components.start_component(id).await
    }

    /// Request a component stop
    pub async fn stop_component(&self, id: &ComponentId) -> Result<()> {
        self.components.stop_component(id).await
    }

    /// Get a view assembly for a component
    pub async fn view(&self, id: &ComponentId, view: &str) -> Result<view::ViewAssembly> {
        self.components.view(id, view).await
    }

    /// Gracefully shut down the container
    pub async fn shutdown(&self) -> Result<()> {
        info!("Shutting down Vessel container");

        self.components.shutdown().await?;

        info!("Vessel container shut down");

        Ok(())
    }
}
