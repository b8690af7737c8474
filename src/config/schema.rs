//! Configuration schema for agentstats.toml.

use serde::{Deserialize, Serialize};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    /// Path to the SQLite database.
    pub db_path: String,

    /// Log level (debug, info, warn, error).
    pub log_level: String,

    /// Leaderboard cache time-to-live in seconds.
    pub cache_ttl_secs: u64,

    /// Maintenance daemon tick interval in seconds.
    pub maintenance_interval_secs: u64,

    /// Default number of leaderboard entries returned.
    pub default_limit: usize,

    /// Default lookback window for progress reports, in days.
    pub default_lookback_days: u32,

    /// Config version.
    pub version: u32,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            db_path: "~/.agentstats/stats.db".into(),
            log_level: "info".into(),
            cache_ttl_secs: 300,
            maintenance_interval_secs: 300,
            default_limit: 20,
            default_lookback_days: 30,
            version: 1,
        }
    }
}

impl StatsConfig {
    /// Resolve a path that may contain `~` to an absolute path.
    pub fn resolve_path(&self, path: &str) -> String {
        shellexpand::tilde(path).into_owned()
    }

    /// Resolved database path.
    pub fn resolved_db_path(&self) -> String {
        self.resolve_path(&self.db_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = StatsConfig::default();
        assert_eq!(cfg.cache_ttl_secs, 300);
        assert_eq!(cfg.default_limit, 20);
        assert!(cfg.db_path.ends_with("stats.db"));
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let cfg: StatsConfig = toml::from_str("cache_ttl_secs = 60").unwrap();
        assert_eq!(cfg.cache_ttl_secs, 60);
        assert_eq!(cfg.default_limit, 20);
    }
}
