//! `sideload.toml` schema.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SideloadConfig {
    /// Root under which each bundle gets its own working directory.
    pub output_root: PathBuf,
    /// Keep extracted split packages after installation.
    pub retain_artifacts: bool,
    pub bridge: BridgeConfig,
}

impl Default for SideloadConfig {
    fn default() -> Self {
        Self {
            output_root: PathBuf::from("output"),
            retain_artifacts: false,
            bridge: BridgeConfig::default(),
        }
    }
}

impl SideloadConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.output_root.as_os_str().is_empty() {
            anyhow::bail!("output_root must not be empty");
        }
        self.bridge.validate()
    }
}

/// How to invoke the device bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BridgeConfig {
    /// Bridge executable, looked up on `PATH` when not absolute.
    pub program: PathBuf,
    /// Flag added on the retry attempt.
    pub replace_flag: String,
    /// Extra arguments for every `install-multiple` call.
    pub install_args: Vec<String>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("adb"),
            replace_flag: "-r".to_string(),
            install_args: Vec::new(),
        }
    }
}

impl BridgeConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.program.as_os_str().is_empty() {
            anyhow::bail!("bridge.program must not be empty");
        }
        if !self.replace_flag.starts_with('-') {
            anyhow::bail!(
                "bridge.replace_flag must be a flag starting with '-', got '{}'",
                self.replace_flag
            );
        }
        Ok(())
    }
}
