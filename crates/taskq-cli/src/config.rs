//! Layered config loading for the CLI binary.
//!
//! Thin wrapper around [`taskq_core::config::SchedulerConfig`]'s merge helpers: reads a TOML
//! file from disk (if present) and overlays the real process environment, matching the loading
//! order the library itself documents.

use std::path::Path;

use anyhow::{Context, Result};
use taskq_core::config::{SchedulerConfig, SchedulerConfigFile};

/// Default config file name looked up in the current directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILENAME: &str = "taskq.toml";

/// Build a [`SchedulerConfig`] from built-in defaults, an optional TOML file, and the process
/// environment, in that order.
pub fn load(config_path: Option<&Path>) -> Result<SchedulerConfig> {
    let mut config = SchedulerConfig::default();

    let path = config_path.map(Path::to_path_buf).or_else(|| {
        let default = Path::new(DEFAULT_CONFIG_FILENAME);
        default.exists().then(|| default.to_path_buf())
    });

    if let Some(path) = path {
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let file: SchedulerConfigFile = toml::from_str(&raw)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        config.merge_file(file);
    }

    config.merge_env(|key| std::env::var(key).ok());

    Ok(config)
}
