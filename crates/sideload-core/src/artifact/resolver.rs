//! Package input to installable set.

use std::path::{Path, PathBuf};

use crate::error::ResolutionError;
use crate::types::{InstallableSet, PackageInput, PackageKind, is_installable};

use super::archive::extract_file;

/// Result of resolving one package input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub files: InstallableSet,
    /// Extraction directory owned by this package; `None` for single packages.
    pub working_dir: Option<PathBuf>,
}

/// Resolves package inputs, extracting bundles under a fixed output root.
#[derive(Debug, Clone)]
pub struct ArtifactResolver {
    output_root: PathBuf,
}

impl ArtifactResolver {
    pub fn new(output_root: impl Into<PathBuf>) -> Self {
        Self {
            output_root: output_root.into(),
        }
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// Working directory a bundle input extracts into.
    pub fn working_dir_for(&self, package: &PackageInput) -> PathBuf {
        self.output_root.join(package.stem())
    }

    pub fn resolve(&self, package: &PackageInput) -> Result<Resolved, ResolutionError> {
        match package.kind() {
            PackageKind::Single => Ok(Resolved {
                files: InstallableSet::single(package.path()),
                working_dir: None,
            }),
            PackageKind::Bundle => self.resolve_bundle(package),
        }
    }

    fn resolve_bundle(&self, package: &PackageInput) -> Result<Resolved, ResolutionError> {
        let bundle = package.path();
        if !bundle.is_file() {
            return Err(ResolutionError::MissingInput {
                path: bundle.to_path_buf(),
            });
        }

        let working_dir = self.working_dir_for(package);
        std::fs::create_dir_all(&working_dir).map_err(|source| ResolutionError::Io {
            context: format!(
                "Failed to create working directory {}",
                working_dir.display()
            ),
            working_dir: None,
            source,
        })?;

        let written = extract_file(bundle, &working_dir).map_err(|err| match err {
            zip::result::ZipError::Io(io) => ResolutionError::Io {
                context: format!("Failed to extract {}", bundle.display()),
                working_dir: Some(working_dir.clone()),
                source: io,
            },
            other => ResolutionError::Archive {
                package: bundle.to_path_buf(),
                working_dir: working_dir.clone(),
                source: other,
            },
        })?;
        tracing::debug!(
            package = %bundle.display(),
            dir = %working_dir.display(),
            written,
            "extracted bundle"
        );

        let files = list_installables(&working_dir).map_err(|source| ResolutionError::Io {
            context: format!("Failed to read working directory {}", working_dir.display()),
            working_dir: Some(working_dir.clone()),
            source,
        })?;

        match InstallableSet::new(files) {
            Some(files) => Ok(Resolved {
                files,
                working_dir: Some(working_dir),
            }),
            None => Err(ResolutionError::ExtractionEmpty {
                package: bundle.to_path_buf(),
                working_dir,
            }),
        }
    }
}

/// Installable files directly inside `dir`, sorted by name.
fn list_installables(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_file() && is_installable(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
