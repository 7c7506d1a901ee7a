//! Component registry.
//!
//! Keeps the metadata records of deployed components, indexed by ID and
//! by name.

use std::collections::HashMap;

use anyhow::Result;
use tokio::sync::RwLock;
use tracing::info;

use vessel_core::id::ComponentId;
use vessel_core::types::{ComponentMetadata, ComponentState};

/// Errors that can occur in component registry operations
#[derive(thiserror::Error, Debug)]
pub enum RegistryError {
    #[error("Component {0} not found")]
    NotFound(ComponentId),

    #[error("Component {0} already exists")]
    AlreadyExists(ComponentId),

    #[error("Component with name {0} not found")]
    NameNotFound(String),
}

/// The component registry manages deployed-component metadata
pub struct ComponentRegistry {
    /// Map of component IDs to metadata
    components: RwLock<HashMap<ComponentId, ComponentMetadata>>,

    /// Map of component names to IDs
    component_names: RwLock<HashMap<String, ComponentId>>,
}

impl ComponentRegistry {
    /// Create a new component registry
    pub fn new() -> Self {
        Self {
            components: RwLock::new(HashMap::new()),
            component_names: RwLock::new(HashMap::new()),
        }
    }

    /// Register a component
    pub async fn register(&self, metadata: ComponentMetadata) -> Result<()> {
        let id = metadata.id;
        let name = metadata.name.clone();

        {
            let components = self.components.read().await;
            if components.contains_key(&id) {
                return Err(RegistryError::AlreadyExists(id).into());
            }
        }

        self.components.write().await.insert(id, metadata);
        self.component_names.write().await.insert(name.clone(), id);

        info!("Registered component: {}", name);

        Ok(())
    }

    /// Unregister a component
    pub async fn unregister(&self, id: &ComponentId) -> Result<()> {
        let name = {
            let components = self.components.read().await;
            let metadata = components.get(id).ok_or(RegistryError::NotFound(*id))?;
            metadata.name.clone()
        };

        self.components.write().await.remove(id);
        self.component_names.write().await.remove(&name);

        info!("Unregistered component: {}", name);

        Ok(())
    }

    /// Check if a component is registered
    pub async fn has(&self, id: &ComponentId) -> bool {
        self.components.read().await.contains_key(id)
    }

    /// Check if a name is registered
    pub async fn has_name(&self, name: &str) -> bool {
        self.component_names.read().await.contains_key(name)
    }

    /// Get component metadata by ID
    pub async fn get(&self, id: &ComponentId) -> Result<ComponentMetadata> {
        let components = self.components.read().await;
        let metadata = components.get(id).ok_or(RegistryError::NotFound(*id))?;
        Ok(metadata.clone())
    }

    /// Get a component ID by name
    pub async fn get_id_by_name(&self, name: &str) -> Result<ComponentId> {
        let names = self.component_names.read().await;
        let id = names
            .get(name)
            .ok_or_else(|| RegistryError::NameNotFound(name.to_string()))?;
        Ok(*id)
    }

    /// List all registered components
    pub async fn list(&self) -> Vec<ComponentMetadata> {
        self.components.read().await.values().cloned().collect()
    }

    /// Record a component state change
    pub async fn update_state(&self, id: &ComponentId, state: ComponentState) -> Result<()> {
        let mut components = self.components.write().await;
        let metadata = components.get_mut(id).ok_or(RegistryError::NotFound(*id))?;
        metadata.update_state(state);
        Ok(())
    }
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(name: &str) -> ComponentMetadata {
        ComponentMetadata::new(name, "test component")
    }

    #[tokio::test]
    async fn test_register_and_lookup() {
        let registry = ComponentRegistry::new();
        let meta = metadata("accounts");
        let id = meta.id;

        registry.register(meta).await.unwrap();

        assert!(registry.has(&id).await);
        assert!(registry.has_name("accounts").await);
        assert_eq!(registry.get_id_by_name("accounts").await.unwrap(), id);
        assert_eq!(registry.get(&id).await.unwrap().name, "accounts");
        assert_eq!(registry.list().await.len(), 1);
    }

    #[tokio::test]
    async fn test_register_twice_fails() {
        let registry = ComponentRegistry::new();
        let meta = metadata("accounts");

        registry.register(meta.clone()).await.unwrap();
        assert!(registry.register(meta).await.is_err());
    }

    #[tokio::test]
    async fn test_unregister() {
        let registry = ComponentRegistry::new();
        let meta = metadata("accounts");
        let id = meta.id;

        registry.register(meta).await.unwrap();
        registry.unregister(&id).await.unwrap();

        assert!(!registry.has(&id).await);
        assert!(!registry.has_name("accounts").await);
        assert!(registry.unregister(&id).await.is_err());
    }

    #[tokio::test]
    async fn test_update_state() {
        let registry = ComponentRegistry::new();
        let meta = metadata("accounts");
        let id = meta.id;

        registry.register(meta).await.unwrap();
        registry
            .update_state(&id, ComponentState::Started)
            .await
            .unwrap();

        assert_eq!(
            registry.get(&id).await.unwrap().state,
            ComponentState::Started
        );
    }
}
