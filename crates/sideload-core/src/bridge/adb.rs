//! Subprocess-backed bridge.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Command;

use anyhow::Context;

use super::{BridgeOutput, DeviceBridge, DeviceEntry, parse_device_list};
use crate::config::BridgeConfig;
use crate::types::DeviceId;

/// Runs the bridge executable (`adb` by default) for every operation.
#[derive(Debug, Clone)]
pub struct AdbBridge {
    program: PathBuf,
    replace_flag: String,
    install_args: Vec<String>,
}

impl Default for AdbBridge {
    fn default() -> Self {
        Self::from_config(&BridgeConfig::default())
    }
}

impl AdbBridge {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        let defaults = BridgeConfig::default();
        Self {
            program: program.into(),
            replace_flag: defaults.replace_flag,
            install_args: defaults.install_args,
        }
    }

    pub fn from_config(config: &BridgeConfig) -> Self {
        Self {
            program: config.program.clone(),
            replace_flag: config.replace_flag.clone(),
            install_args: config.install_args.clone(),
        }
    }

    pub fn program(&self) -> &std::path::Path {
        &self.program
    }

    /// Arguments of an `install-multiple` call, program excluded.
    pub fn install_args(&self, device: &DeviceId, files: &[PathBuf], replace: bool) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-s".into(),
            device.as_str().into(),
            "install-multiple".into(),
        ];
        args.extend(self.install_args.iter().map(OsString::from));
        if replace {
            args.push(self.replace_flag.clone().into());
        }
        args.extend(files.iter().map(|file| file.as_os_str().to_os_string()));
        args
    }
}

impl DeviceBridge for AdbBridge {
    fn list_devices(&self) -> anyhow::Result<Vec<DeviceEntry>> {
        let output = Command::new(&self.program)
            .arg("devices")
            .output()
            .with_context(|| format!("Failed to run {} devices", self.program.display()))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!(
                "{} devices failed: {}",
                self.program.display(),
                stderr.trim()
            );
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(parse_device_list(&stdout))
    }

    fn install_multiple(
        &self,
        device: &DeviceId,
        files: &[PathBuf],
        replace: bool,
    ) -> BridgeOutput {
        let args = self.install_args(device, files, replace);
        tracing::debug!(program = %self.program.display(), ?args, "invoking bridge");

        match Command::new(&self.program).args(&args).output() {
            Ok(output) => BridgeOutput {
                code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            },
            Err(err) => {
                tracing::warn!(program = %self.program.display(), error = %err, "bridge did not start");
                BridgeOutput::spawn_failure(&err)
            }
        }
    }
}
