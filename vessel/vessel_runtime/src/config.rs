//! Configuration for the Vessel runtime.
//!
//! Handles loading and managing runtime configuration.

use std::collections::HashMap;
use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tracing::{info, warn};

/// Errors that can occur in configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),
}

/// Per-component settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComponentSettings {
    /// Whether to automatically start the component after deploy
    #[serde(default)]
    pub autostart: bool,
}

/// Runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// How long to wait for a component to finish stopping (seconds)
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout: u64,

    /// First value handed out by the proxy naming sequence
    #[serde(default)]
    pub proxy_sequence_start: u64,

    /// Per-component settings, keyed by component name
    #[serde(default)]
    pub components: HashMap<String, ComponentSettings>,

    /// Additional configuration
    #[serde(default)]
    pub extra: HashMap<String, serde_json::Value>,
}

fn default_shutdown_timeout() -> u64 {
    30
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout: default_shutdown_timeout(),
            proxy_sequence_start: 0,
            components: HashMap::new(),
            extra: HashMap::new(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a file
    ///
    /// Falls back to defaults when no path is given or the file does not
    /// exist.
    pub async fn load(path: Option<&str>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(RuntimeConfig::default());
        };

        info!("Loading configuration from {}", path);

        if !Path::new(path).exists() {
            warn!("Configuration file not found: {}", path);
            return Ok(RuntimeConfig::default());
        }

        let content = fs::read_to_string(path)
            .await
            .map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        let config: RuntimeConfig =
            toml::from_str(&content).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;

        Ok(config)
    }
}
