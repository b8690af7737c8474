pub mod schema;

pub use schema::StatsConfig;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Default home directory (~/.agentstats).
pub fn default_home_dir() -> PathBuf {
    directories::BaseDirs::new()
        .map(|d| d.home_dir().join(".agentstats"))
        .unwrap_or_else(|| PathBuf::from(".agentstats"))
}

/// Load config from the given path, or return defaults.
pub fn load_config(path: &Path) -> Result<StatsConfig> {
    if path.exists() {
        let contents =
            std::fs::read_to_string(path).context("Failed to read agentstats config file")?;
        let config: StatsConfig =
            toml::from_str(&contents).context("Failed to parse agentstats config (TOML)")?;
        Ok(config)
    } else {
        Ok(StatsConfig::default())
    }
}

/// Save config to the given path (TOML format).
pub fn save_config(config: &StatsConfig, path: &Path) -> Result<()> {
    let contents = toml::to_string_pretty(config).context("Failed to serialize config")?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, contents).context("Failed to write config file")?;
    Ok(())
}
