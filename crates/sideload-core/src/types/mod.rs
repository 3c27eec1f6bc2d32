//! Shared data model used by the resolver, registry and dispatcher.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// File extension of a directly installable package.
pub const INSTALLABLE_EXTENSION: &str = "apk";

/// Returns true when `path` carries the installable-unit extension.
pub fn is_installable(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(INSTALLABLE_EXTENSION))
}

/// How a package input has to be treated before installation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PackageKind {
    /// Installable as-is.
    Single,
    /// Multi-split container that must be extracted first.
    Bundle,
}

/// A package file supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageInput {
    path: PathBuf,
    kind: PackageKind,
}

impl PackageInput {
    /// Classify a path by its extension.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let kind = if is_installable(&path) {
            PackageKind::Single
        } else {
            PackageKind::Bundle
        };
        Self { path, kind }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> PackageKind {
        self.kind
    }

    /// File name used in user-facing messages.
    pub fn display_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    /// Base name without extension; names the bundle's working directory.
    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.display_name())
    }
}

/// Ordered, non-empty list of files handed to one `install-multiple` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct InstallableSet(Vec<PathBuf>);

impl InstallableSet {
    /// Returns `None` for an empty list.
    pub fn new(files: Vec<PathBuf>) -> Option<Self> {
        if files.is_empty() {
            None
        } else {
            Some(Self(files))
        }
    }

    pub fn single(path: impl Into<PathBuf>) -> Self {
        Self(vec![path.into()])
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Serial of a device as reported by the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for DeviceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for DeviceId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for DeviceId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// One (package, device) unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallTask {
    pub package: PackageInput,
    pub device: DeviceId,
    pub files: InstallableSet,
}

/// Terminal result of an install task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum InstallOutcome {
    /// First attempt succeeded.
    Installed,
    /// First attempt failed, the replace retry succeeded.
    InstalledAfterReplace,
    /// Both attempts failed; carries the bridge's stderr from the last one.
    Failed { diagnostic: String },
}

impl InstallOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, InstallOutcome::Failed { .. })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InstallOutcome::Installed => "installed",
            InstallOutcome::InstalledAfterReplace => "installed-after-replace",
            InstallOutcome::Failed { .. } => "failed",
        }
    }
}

/// Completed vs. total task counters for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
}

impl Progress {
    pub fn new(completed: usize, total: usize) -> Self {
        Self { completed, total }
    }

    pub fn is_complete(&self) -> bool {
        self.completed >= self.total
    }

    /// Fraction in `0.0..=1.0`; an empty run counts as done.
    pub fn fraction(&self) -> f32 {
        if self.total == 0 {
            1.0
        } else {
            self.completed as f32 / self.total as f32
        }
    }
}

/// Inputs of one run, captured when the run starts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunRequest {
    pub packages: Vec<PackageInput>,
    pub devices: Vec<DeviceId>,
    pub retain_artifacts: bool,
}

impl RunRequest {
    pub fn new(packages: Vec<PackageInput>, devices: Vec<DeviceId>) -> Self {
        Self {
            packages,
            devices,
            retain_artifacts: false,
        }
    }

    /// Build a request from raw paths, classifying each one.
    pub fn from_paths<P: Into<PathBuf>>(
        paths: impl IntoIterator<Item = P>,
        devices: Vec<DeviceId>,
    ) -> Self {
        Self::new(paths.into_iter().map(PackageInput::from_path).collect(), devices)
    }

    pub fn with_retain(mut self, retain: bool) -> Self {
        self.retain_artifacts = retain;
        self
    }

    /// Number of install tasks this request expands to.
    pub fn task_count(&self) -> usize {
        self.packages.len() * self.devices.len()
    }
}

/// Aggregate result of a finished run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub progress: Progress,
    pub installed: usize,
    pub installed_after_replace: usize,
    pub failed: usize,
    /// Packages whose resolution failed.
    pub packages_skipped: usize,
    /// Packages extracted and kept without any install.
    pub saved_only: usize,
}

impl RunSummary {
    pub fn has_failures(&self) -> bool {
        self.failed > 0 || self.packages_skipped > 0
    }
}
