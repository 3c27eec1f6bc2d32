//! Config path resolution helpers.

use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "sideload.toml";

/// `<config dir>/sideload/sideload.toml`, falling back to `~/.config`.
pub fn default_config_path() -> anyhow::Result<PathBuf> {
    let base = match dirs::config_dir() {
        Some(dir) => dir,
        None => dirs::home_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?
            .join(".config"),
    };
    Ok(config_path_in(&base))
}

pub fn config_path_in(config_dir: &Path) -> PathBuf {
    config_dir.join("sideload").join(CONFIG_FILE_NAME)
}
