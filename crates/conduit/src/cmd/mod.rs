//! Command implementations for the conduit CLI

pub mod run;
pub mod validate;

use std::path::PathBuf;

use anyhow::Result;

/// Locations tried when no `--config` is given
const DEFAULT_CONFIG_PATHS: [&str; 2] = ["conduit.toml", "configs/conduit.toml"];

/// The explicit path if given (it must exist), else the first default path
/// that exists
pub fn resolve_config_path(explicit: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        if !path.exists() {
            anyhow::bail!("config file not found: {}", path.display());
        }
        return Ok(path);
    }

    DEFAULT_CONFIG_PATHS
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
        .ok_or_else(|| {
            anyhow::anyhow!(
                "no config file given and none of [{}] exists",
                DEFAULT_CONFIG_PATHS.join(", ")
            )
        })
}
