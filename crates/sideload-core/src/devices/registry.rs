//! Selection state over the devices the bridge reports.

use crate::bridge::{DeviceBridge, DeviceEntry, ready_devices};
use crate::error::RegistryError;
use crate::types::DeviceId;

/// Known ready devices plus the current selection.
///
/// `selected` keeps toggle order; that order is the order installs run in.
/// [`all_selected`](Self::all_selected) is derived on every call, so it can
/// never drift from the individual flags.
#[derive(Debug, Clone, Default)]
pub struct DeviceRegistry {
    entries: Vec<DeviceEntry>,
    known: Vec<DeviceId>,
    selected: Vec<DeviceId>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry over a fixed list of ready devices.
    pub fn with_devices(devices: impl IntoIterator<Item = DeviceId>) -> Self {
        let mut registry = Self::new();
        registry.replace_entries(
            devices
                .into_iter()
                .map(|id| DeviceEntry {
                    id,
                    state: crate::bridge::DeviceState::Ready,
                })
                .collect(),
        );
        registry
    }

    /// Ready devices reported by `bridge`, without touching any selection.
    pub fn list_devices(bridge: &dyn DeviceBridge) -> anyhow::Result<Vec<DeviceId>> {
        Ok(ready_devices(&bridge.list_devices()?))
    }

    /// Re-query the bridge. Selections of devices that are still ready survive.
    pub fn refresh(&mut self, bridge: &dyn DeviceBridge) -> anyhow::Result<()> {
        self.replace_entries(bridge.list_devices()?);
        tracing::debug!(known = self.known.len(), selected = self.selected.len(), "refreshed devices");
        Ok(())
    }

    /// Apply a listing obtained elsewhere, e.g. on a background task.
    pub fn replace_entries(&mut self, entries: Vec<DeviceEntry>) {
        let mut known: Vec<DeviceId> = Vec::new();
        for id in ready_devices(&entries) {
            if !known.contains(&id) {
                known.push(id);
            }
        }
        self.selected.retain(|id| known.contains(id));
        self.known = known;
        self.entries = entries;
    }

    /// Full bridge listing, including devices that are not ready.
    pub fn entries(&self) -> &[DeviceEntry] {
        &self.entries
    }

    /// Ready devices in listing order.
    pub fn known(&self) -> &[DeviceId] {
        &self.known
    }

    /// Selected devices in the order they were selected.
    pub fn selected(&self) -> &[DeviceId] {
        &self.selected
    }

    pub fn is_selected(&self, device: &DeviceId) -> bool {
        self.selected.contains(device)
    }

    pub fn toggle(&mut self, device: &DeviceId, selected: bool) -> Result<(), RegistryError> {
        if !self.known.contains(device) {
            return Err(RegistryError::UnknownDevice(device.clone()));
        }
        let present = self.is_selected(device);
        if selected && !present {
            self.selected.push(device.clone());
        } else if !selected && present {
            self.selected.retain(|id| id != device);
        }
        Ok(())
    }

    pub fn select_all(&mut self, selected: bool) {
        if selected {
            for id in &self.known {
                if !self.selected.contains(id) {
                    self.selected.push(id.clone());
                }
            }
        } else {
            self.selected.clear();
        }
    }

    /// True iff there is at least one device and every one is selected.
    pub fn all_selected(&self) -> bool {
        !self.known.is_empty() && self.known.iter().all(|id| self.selected.contains(id))
    }
}
