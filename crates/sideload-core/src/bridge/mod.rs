//! Device-bridge command surface.
//!
//! The core never talks to devices itself; every device operation goes
//! through a [`DeviceBridge`]. [`AdbBridge`] shells out to the bridge
//! executable, tests substitute scripted implementations.

mod adb;

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::types::DeviceId;

pub use adb::AdbBridge;

/// State string the bridge prints for a device that accepts commands.
pub const READY_STATE: &str = "device";

/// Connection state of a listed device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceState {
    Ready,
    Unauthorized,
    Offline,
    Other(String),
}

impl DeviceState {
    pub fn parse(raw: &str) -> Self {
        match raw {
            READY_STATE => DeviceState::Ready,
            "unauthorized" => DeviceState::Unauthorized,
            "offline" => DeviceState::Offline,
            other => DeviceState::Other(other.to_string()),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, DeviceState::Ready)
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceState::Ready => f.write_str(READY_STATE),
            DeviceState::Unauthorized => f.write_str("unauthorized"),
            DeviceState::Offline => f.write_str("offline"),
            DeviceState::Other(raw) => f.write_str(raw),
        }
    }
}

/// One line of the bridge's device listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceEntry {
    pub id: DeviceId,
    pub state: DeviceState,
}

/// Captured result of one bridge invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeOutput {
    /// Exit code; `None` when the process was killed by a signal or never ran.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl BridgeOutput {
    pub fn success() -> Self {
        Self {
            code: Some(0),
            stdout: "Success".to_string(),
            stderr: String::new(),
        }
    }

    pub fn failure(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// The bridge could not be started at all.
    pub fn spawn_failure(err: &std::io::Error) -> Self {
        Self {
            code: None,
            stdout: String::new(),
            stderr: err.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Operations the deployment core needs from the device bridge.
pub trait DeviceBridge: fmt::Debug + Send + Sync {
    /// Every device the bridge reports, in listing order, whatever its state.
    fn list_devices(&self) -> anyhow::Result<Vec<DeviceEntry>>;

    /// Install all `files` on `device` in one multi-package session.
    ///
    /// Never fails outright: a bridge that cannot be spawned is reported as
    /// an unsuccessful [`BridgeOutput`] so the retry policy still applies.
    fn install_multiple(&self, device: &DeviceId, files: &[PathBuf], replace: bool)
    -> BridgeOutput;
}

/// Parse the output of the bridge's `devices` command.
///
/// Skips the banner, daemon start-up chatter and blank lines. Extra columns
/// printed by `devices -l` are ignored.
pub fn parse_device_list(output: &str) -> Vec<DeviceEntry> {
    output
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() || line.starts_with("List of devices") || line.starts_with('*') {
                return None;
            }
            let mut fields = line.split_whitespace();
            let id = fields.next()?;
            let state = fields.next()?;
            Some(DeviceEntry {
                id: DeviceId::new(id),
                state: DeviceState::parse(state),
            })
        })
        .collect()
}

/// Only the devices that can take commands.
pub fn ready_devices(entries: &[DeviceEntry]) -> Vec<DeviceId> {
    entries
        .iter()
        .filter(|entry| entry.state.is_ready())
        .map(|entry| entry.id.clone())
        .collect()
}
