//! Application context for unified dependency injection.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::artifact::ArtifactResolver;
use crate::bridge::{AdbBridge, DeviceBridge};
use crate::config::{ConfigStore, SideloadConfig};
use crate::deploy::Deployer;
use crate::devices::DeviceRegistry;
use crate::types::{DeviceId, RunRequest};

/// Unified application context for dependency injection.
///
/// Frontends (CLI/GUI) create this once from configuration and get every
/// service from it.
#[derive(Debug, Clone)]
pub struct AppContext {
    config: SideloadConfig,
    config_path: PathBuf,
    bridge: Arc<dyn DeviceBridge>,
}

impl AppContext {
    /// Load configuration from `config_path`, or the default location.
    pub fn load(config_path: Option<PathBuf>) -> anyhow::Result<Self> {
        let store = match config_path {
            Some(path) => ConfigStore::from_path(path),
            None => ConfigStore::with_defaults()?,
        };
        let config = store.load()?;
        Ok(Self::new(config, store.config_path().to_path_buf()))
    }

    pub fn new(config: SideloadConfig, config_path: PathBuf) -> Self {
        let bridge: Arc<dyn DeviceBridge> = Arc::new(AdbBridge::from_config(&config.bridge));
        Self {
            config,
            config_path,
            bridge,
        }
    }

    /// Use a different bridge implementation (for testing).
    pub fn with_bridge(mut self, bridge: Arc<dyn DeviceBridge>) -> Self {
        self.bridge = bridge;
        self
    }

    /// Override the configured output root.
    pub fn with_output_root(mut self, output_root: PathBuf) -> Self {
        self.config.output_root = output_root;
        self
    }

    pub fn config(&self) -> &SideloadConfig {
        &self.config
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn config_store(&self) -> ConfigStore {
        ConfigStore::from_path(self.config_path.clone())
    }

    pub fn bridge(&self) -> Arc<dyn DeviceBridge> {
        Arc::clone(&self.bridge)
    }

    pub fn resolver(&self) -> ArtifactResolver {
        ArtifactResolver::new(self.config.output_root.clone())
    }

    pub fn deployer(&self) -> Deployer {
        Deployer::new(self.bridge(), self.resolver())
    }

    /// Registry populated from the bridge's current device listing.
    pub fn device_registry(&self) -> anyhow::Result<DeviceRegistry> {
        let mut registry = DeviceRegistry::new();
        registry.refresh(self.bridge.as_ref())?;
        Ok(registry)
    }

    /// Build a run request; `retain` falls back to the configured default.
    pub fn run_request<P: Into<PathBuf>>(
        &self,
        packages: impl IntoIterator<Item = P>,
        devices: Vec<DeviceId>,
        retain: Option<bool>,
    ) -> RunRequest {
        RunRequest::from_paths(packages, devices)
            .with_retain(retain.unwrap_or(self.config.retain_artifacts))
    }
}
