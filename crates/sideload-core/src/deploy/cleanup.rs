//! Removal of extraction working directories.

use std::path::Path;

use anyhow::Context;

/// Removes per-package working directories once a package is done.
#[derive(Debug, Clone, Copy, Default)]
pub struct CleanupManager;

impl CleanupManager {
    pub fn new() -> Self {
        Self
    }

    /// Remove `working_dir` recursively.
    ///
    /// Returns `Ok(false)` when there was nothing to remove, so calling this
    /// twice on the same directory is fine.
    pub fn cleanup(&self, working_dir: &Path) -> anyhow::Result<bool> {
        remove_path_if_exists(working_dir)
    }
}

/// Remove a file or directory tree if present.
pub fn remove_path_if_exists(path: &Path) -> anyhow::Result<bool> {
    let metadata = match std::fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(err) => {
            return Err(err).with_context(|| format!("Failed to read metadata: {}", path.display()));
        }
    };
    if metadata.is_dir() {
        std::fs::remove_dir_all(path)
            .with_context(|| format!("Failed to remove directory: {}", path.display()))?;
    } else {
        std::fs::remove_file(path)
            .with_context(|| format!("Failed to remove file: {}", path.display()))?;
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removes_nested_tree() {
        let temp = tempfile::TempDir::new().unwrap();
        let dir = temp.path().join("foo");
        std::fs::create_dir_all(dir.join("nested")).unwrap();
        std::fs::write(dir.join("nested").join("split.apk"), b"x").unwrap();

        assert!(CleanupManager::new().cleanup(&dir).unwrap());
        assert!(!dir.exists());
    }

    #[test]
    fn missing_directory_is_not_an_error() {
        let temp = tempfile::TempDir::new().unwrap();
        let dir = temp.path().join("never-created");
        assert!(!CleanupManager::new().cleanup(&dir).unwrap());
    }

    #[test]
    fn removes_plain_file() {
        let temp = tempfile::TempDir::new().unwrap();
        let file = temp.path().join("stray.apk");
        std::fs::write(&file, b"x").unwrap();
        assert!(remove_path_if_exists(&file).unwrap());
        assert!(!file.exists());
    }
}
