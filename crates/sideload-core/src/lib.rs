//! Sideload Core Library
//!
//! Deploys Android packages, including multi-split bundles, to one or more
//! devices through an external device bridge. Frontends drive it through
//! [`context::AppContext`] and observe runs through
//! [`deploy::DeployObserver`].

pub mod artifact;
pub mod bridge;
pub mod config;
pub mod context;
pub mod deploy;
pub mod devices;
pub mod error;
pub mod types;

/// Re-exports of commonly used types
pub mod prelude {
    // Configuration
    pub use crate::config::{BridgeConfig, ConfigStore, SideloadConfig};
    pub use crate::context::AppContext;

    // Bridge
    pub use crate::bridge::{AdbBridge, BridgeOutput, DeviceBridge, DeviceEntry, DeviceState};

    // Components
    pub use crate::artifact::{ArtifactResolver, Resolved};
    pub use crate::deploy::{
        CleanupManager, DeployEvent, DeployObserver, Deployer, EventLog, LogLevel, LogRecord,
        PackageEvent, RunHandle,
    };
    pub use crate::devices::DeviceRegistry;

    // Errors
    pub use crate::error::{DeployError, InstallError, RegistryError, ResolutionError};

    // Data model
    pub use crate::types::{
        DeviceId, InstallOutcome, InstallTask, InstallableSet, PackageInput, PackageKind,
        Progress, RunRequest, RunSummary,
    };
}
