#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::mpsc::Receiver;

use sideload_core::bridge::{BridgeOutput, DeviceBridge, DeviceEntry, DeviceState};
use sideload_core::types::DeviceId;

/// One recorded `install_multiple` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallCall {
    pub device: DeviceId,
    pub files: Vec<PathBuf>,
    pub replace: bool,
}

/// Bridge whose answers are queued per device; unqueued calls succeed.
#[derive(Debug, Default)]
pub struct ScriptedBridge {
    devices: Vec<DeviceEntry>,
    responses: Mutex<HashMap<DeviceId, VecDeque<BridgeOutput>>>,
    calls: Mutex<Vec<InstallCall>>,
}

impl ScriptedBridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_listing(entries: &[(&str, DeviceState)]) -> Self {
        Self {
            devices: entries
                .iter()
                .map(|(id, state)| DeviceEntry {
                    id: DeviceId::from(*id),
                    state: state.clone(),
                })
                .collect(),
            ..Self::default()
        }
    }

    /// Queue the next answers for `device`, consumed in order.
    pub fn respond(self, device: &str, outputs: Vec<BridgeOutput>) -> Self {
        self.responses
            .lock()
            .unwrap()
            .entry(DeviceId::from(device))
            .or_default()
            .extend(outputs);
        self
    }

    pub fn calls(&self) -> Vec<InstallCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, device: &str) -> Vec<InstallCall> {
        self.calls()
            .into_iter()
            .filter(|call| call.device.as_str() == device)
            .collect()
    }
}

impl DeviceBridge for ScriptedBridge {
    fn list_devices(&self) -> anyhow::Result<Vec<DeviceEntry>> {
        Ok(self.devices.clone())
    }

    fn install_multiple(&self, device: &DeviceId, files: &[PathBuf], replace: bool) -> BridgeOutput {
        self.calls.lock().unwrap().push(InstallCall {
            device: device.clone(),
            files: files.to_vec(),
            replace,
        });
        self.responses
            .lock()
            .unwrap()
            .get_mut(device)
            .and_then(|queue| queue.pop_front())
            .unwrap_or_else(BridgeOutput::success)
    }
}

/// Bridge that blocks every install until a message arrives on `release`.
#[derive(Debug)]
pub struct GatedBridge {
    release: Mutex<Receiver<()>>,
}

impl GatedBridge {
    pub fn new(release: Receiver<()>) -> Self {
        Self {
            release: Mutex::new(release),
        }
    }
}

impl DeviceBridge for GatedBridge {
    fn list_devices(&self) -> anyhow::Result<Vec<DeviceEntry>> {
        Ok(Vec::new())
    }

    fn install_multiple(&self, _device: &DeviceId, _files: &[PathBuf], _replace: bool) -> BridgeOutput {
        let _ = self.release.lock().unwrap().recv();
        BridgeOutput::success()
    }
}

type InstallHook = Box<dyn Fn(&DeviceId, &[PathBuf]) + Send + Sync>;

/// Succeeding bridge that runs `hook` before answering each install.
pub struct HookedBridge {
    inner: ScriptedBridge,
    hook: InstallHook,
}

impl HookedBridge {
    pub fn new(hook: impl Fn(&DeviceId, &[PathBuf]) + Send + Sync + 'static) -> Self {
        Self {
            inner: ScriptedBridge::new(),
            hook: Box::new(hook),
        }
    }

    pub fn calls(&self) -> Vec<InstallCall> {
        self.inner.calls()
    }
}

impl std::fmt::Debug for HookedBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookedBridge")
            .field("inner", &self.inner)
            .finish_non_exhaustive()
    }
}

impl DeviceBridge for HookedBridge {
    fn list_devices(&self) -> anyhow::Result<Vec<DeviceEntry>> {
        self.inner.list_devices()
    }

    fn install_multiple(&self, device: &DeviceId, files: &[PathBuf], replace: bool) -> BridgeOutput {
        (self.hook)(device, files);
        self.inner.install_multiple(device, files, replace)
    }
}

/// Write a zip archive at `path` holding `entries` as (name, contents).
pub fn write_bundle(path: &Path, entries: &[(&str, &[u8])]) {
    let file = std::fs::File::create(path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Stored);
    for (name, data) in entries {
        zip.start_file(*name, options).unwrap();
        zip.write_all(data).unwrap();
    }
    zip.finish().unwrap();
}

pub fn device_ids(raw: &[&str]) -> Vec<DeviceId> {
    raw.iter().map(|id| DeviceId::from(*id)).collect()
}
