//! TOML configuration with environment variable overrides
//!
//! File: `<config_dir>/vaultkeep/config.toml`. Missing fields fall back to
//! their defaults, a missing file yields the default config. Environment
//! overrides are applied on top:
//! - `VAULTKEEP_DATA_DIR`
//! - `VAULTKEEP_DEBOUNCE_MS`
//! - `VAULTKEEP_GUEST_MODE`

use crate::memory::MemoryStore;
use crate::utils::parse_flag;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_DATA_DIR: &str = "VAULTKEEP_DATA_DIR";
pub const ENV_DEBOUNCE_MS: &str = "VAULTKEEP_DEBOUNCE_MS";
pub const ENV_GUEST_MODE: &str = "VAULTKEEP_GUEST_MODE";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Store location; the platform data dir when unset
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_auto_snapshot_interval_hours")]
    pub auto_snapshot_interval_hours: i64,
    #[serde(default = "default_unlock_hold_ms")]
    pub unlock_hold_ms: u64,
    #[serde(default = "default_sensitive_destinations")]
    pub sensitive_destinations: Vec<String>,
    #[serde(default)]
    pub guest_mode: bool,
    #[serde(default = "default_build_metric_cap")]
    pub build_metric_cap: usize,
}

fn default_debounce_ms() -> u64 {
    2000
}
fn default_auto_snapshot_interval_hours() -> i64 {
    24
}
fn default_unlock_hold_ms() -> u64 {
    2500
}
fn default_sensitive_destinations() -> Vec<String> {
    ["vault", "ledger", "health", "dream_log", "companion"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_build_metric_cap() -> usize {
    50
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            debounce_ms: default_debounce_ms(),
            auto_snapshot_interval_hours: default_auto_snapshot_interval_hours(),
            unlock_hold_ms: default_unlock_hold_ms(),
            sensitive_destinations: default_sensitive_destinations(),
            guest_mode: false,
            build_metric_cap: default_build_metric_cap(),
        }
    }
}

impl EngineConfig {
    /// Default config file location
    pub fn default_path() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push("vaultkeep");
        path.push("config.toml");
        path
    }

    /// Load `.env`, the default config file, then environment overrides
    pub fn load() -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();
        let config = Self::load_from(&Self::default_path())?;
        Ok(config.with_overrides(|name| std::env::var(name).ok()))
    }

    /// Parse a config file. A missing file is not an error.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::debug!("No config at {:?}, using defaults", path);
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config = toml::from_str::<Self>(&contents)
            .with_context(|| format!("Invalid config {}", path.display()))?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Write atomically through a temp file, keeping a `.bak` of the old one
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        if path.exists() {
            let _ = fs::copy(path, path.with_extension("toml.bak"));
        }

        let contents = toml::to_string_pretty(self)?;
        let temp_path = path.with_extension("toml.tmp");
        fs::write(&temp_path, contents)?;
        fs::rename(&temp_path, path)?;

        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }

    /// Apply environment overrides through `lookup`. Unparsable values are ignored.
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(ENV_DATA_DIR).filter(|d| !d.trim().is_empty()) {
            self.data_dir = Some(PathBuf::from(dir));
        }

        if let Some(raw) = lookup(ENV_DEBOUNCE_MS) {
            match raw.trim().parse::<u64>() {
                Ok(ms) => self.debounce_ms = ms,
                Err(_) => tracing::warn!("Ignoring invalid {}={:?}", ENV_DEBOUNCE_MS, raw),
            }
        }

        if let Some(raw) = lookup(ENV_GUEST_MODE) {
            self.guest_mode = parse_flag(&raw);
        }

        self
    }

    /// Configured data dir, or the platform default
    pub fn resolved_data_dir(&self) -> anyhow::Result<PathBuf> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(MemoryStore::default_data_dir()?),
        }
    }

    pub fn quiet_period(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn unlock_hold(&self) -> Duration {
        Duration::from_millis(self.unlock_hold_ms)
    }

    pub fn auto_snapshot_interval(&self) -> chrono::Duration {
        chrono::Duration::hours(self.auto_snapshot_interval_hours.max(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::load_from(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.quiet_period(), Duration::from_millis(2000));
        assert_eq!(config.unlock_hold(), Duration::from_millis(2500));
        assert_eq!(config.auto_snapshot_interval(), chrono::Duration::hours(24));
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "debounce_ms = 500\nguest_mode = true\n").unwrap();

        let config = EngineConfig::load_from(&path).unwrap();
        assert_eq!(config.debounce_ms, 500);
        assert!(config.guest_mode);
        assert_eq!(config.build_metric_cap, 50);
        assert!(config.sensitive_destinations.contains(&"vault".to_string()));
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "debounce_ms = \"soon\"").unwrap();
        assert!(EngineConfig::load_from(&path).is_err());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let config = EngineConfig {
            data_dir: Some(dir.path().join("data")),
            unlock_hold_ms: 1000,
            ..EngineConfig::default()
        };

        config.save_to(&path).unwrap();
        config.save_to(&path).unwrap();

        assert_eq!(EngineConfig::load_from(&path).unwrap(), config);
        assert!(path.with_extension("toml.bak").exists());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_DATA_DIR, "/tmp/vk"),
            (ENV_DEBOUNCE_MS, "750"),
            (ENV_GUEST_MODE, "yes"),
        ]
        .into_iter()
        .collect();

        let config = EngineConfig::default()
            .with_overrides(|name| env.get(name).map(|v| v.to_string()));
        assert_eq!(config.data_dir, Some(PathBuf::from("/tmp/vk")));
        assert_eq!(config.debounce_ms, 750);
        assert!(config.guest_mode);
        assert_eq!(config.resolved_data_dir().unwrap(), PathBuf::from("/tmp/vk"));
    }

    #[test]
    fn test_invalid_override_is_ignored() {
        let config = EngineConfig::default().with_overrides(|name| {
            (name == ENV_DEBOUNCE_MS).then(|| "later".to_string())
        });
        assert_eq!(config.debounce_ms, 2000);
    }
}
