//! Agent configuration loading
//!
//! Layers, lowest precedence first: built-in defaults, the optional file
//! named by `MONITOR_CONFIG` (default `monitor.toml`), then environment
//! variables prefixed with `MONITOR__`.

use anyhow::{Context, Result};
use monitor_lib::MonitorConfig;
use std::path::{Path, PathBuf};

/// Environment variable naming the configuration file
pub const CONFIG_PATH_ENV: &str = "MONITOR_CONFIG";

const DEFAULT_CONFIG_PATH: &str = "monitor.toml";

/// Path of the configuration file to read
pub fn config_path() -> PathBuf {
    std::env::var(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Load configuration from the default file location and environment
pub fn load() -> Result<MonitorConfig> {
    load_from(&config_path())
}

/// Load configuration from `path` (if present) and environment
pub fn load_from(path: &Path) -> Result<MonitorConfig> {
    let config = config::Config::builder()
        .add_source(config::File::from(path).required(false))
        .add_source(
            config::Environment::with_prefix("MONITOR")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .with_context(|| format!("Failed to read configuration from {}", path.display()))?;

    let config: MonitorConfig = config
        .try_deserialize()
        .context("Failed to parse monitor configuration")?;
    config.validate().context("Invalid monitor configuration")?;
    Ok(config)
}
