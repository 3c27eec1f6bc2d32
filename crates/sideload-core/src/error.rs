//! Error taxonomy for deployment runs.
//!
//! Only [`DeployError`] ever stops a run, and only before the first task.
//! Everything else is local to one package or one task and ends up as an
//! event on the observer.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::DeviceId;

/// Failure to turn a package input into an installable set.
#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("package file does not exist: {}", path.display())]
    MissingInput { path: PathBuf },

    #[error("no installable files found after extracting {}", package.display())]
    ExtractionEmpty {
        package: PathBuf,
        working_dir: PathBuf,
    },

    #[error("failed to read {} as an archive: {source}", package.display())]
    Archive {
        package: PathBuf,
        working_dir: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("{context}: {source}")]
    Io {
        context: String,
        working_dir: Option<PathBuf>,
        #[source]
        source: std::io::Error,
    },
}

impl ResolutionError {
    /// Working directory created before the failure, if any.
    pub fn working_dir(&self) -> Option<&PathBuf> {
        match self {
            ResolutionError::MissingInput { .. } => None,
            ResolutionError::ExtractionEmpty { working_dir, .. }
            | ResolutionError::Archive { working_dir, .. } => Some(working_dir),
            ResolutionError::Io { working_dir, .. } => working_dir.as_ref(),
        }
    }

    /// Short tag used in events and JSON output.
    pub fn tag(&self) -> &'static str {
        match self {
            ResolutionError::MissingInput { .. } => "missing-input",
            ResolutionError::ExtractionEmpty { .. } => "extraction-empty",
            ResolutionError::Archive { .. } => "archive",
            ResolutionError::Io { .. } => "io",
        }
    }
}

/// Failure of a single bridge install attempt.
#[derive(Debug, Error)]
pub enum InstallError {
    #[error("install on {device} exited with {}: {stderr}", code.map_or_else(|| "signal".to_string(), |c| c.to_string()))]
    NonZeroExit {
        device: DeviceId,
        code: Option<i32>,
        stderr: String,
    },

    #[error("install on {device} failed after retrying with replace: {stderr}")]
    RetryFailed { device: DeviceId, stderr: String },
}

impl InstallError {
    pub fn diagnostic(&self) -> &str {
        match self {
            InstallError::NonZeroExit { stderr, .. } | InstallError::RetryFailed { stderr, .. } => {
                stderr
            }
        }
    }
}

/// Errors that prevent a run from starting.
#[derive(Debug, Error)]
pub enum DeployError {
    #[error("a deployment run is already active")]
    RunActive,

    #[error("failed to prepare output root {}: {source}", path.display())]
    Setup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to start deployment worker: {0}")]
    Worker(#[source] std::io::Error),
}

/// Selection changes the registry refuses.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("unknown device: {0}")]
    UnknownDevice(DeviceId),
}
