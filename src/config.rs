//! Optional `config.toml` in the config directory

use crate::paths;
use anyhow::{Context, Result};
use guildkit::RateLimitConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Overrides the resolved state directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_dir: Option<String>,

    /// Overrides `<config dir>/templates`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub templates_dir: Option<String>,

    #[serde(default)]
    pub rate_limit: RateLimitSection,

    #[serde(default)]
    pub backup: BackupSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSection {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_jitter_ms: u64,
}

impl Default for RateLimitSection {
    fn default() -> Self {
        let defaults = RateLimitConfig::default();
        Self {
            max_attempts: defaults.max_attempts,
            base_delay_ms: defaults.base_delay.as_millis() as u64,
            max_jitter_ms: defaults.max_jitter.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupSection {
    pub messages_per_channel: usize,
}

impl Default for BackupSection {
    fn default() -> Self {
        Self {
            messages_per_channel: 10,
        }
    }
}

impl Config {
    /// Load from the config directory; a missing file yields defaults
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_dir()?.join(CONFIG_FILE))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No config at {}; using defaults", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Could not read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Invalid TOML format in {}", path.display()))
    }

    pub fn state_dir(&self) -> Result<PathBuf> {
        match &self.state_dir {
            Some(dir) => Ok(paths::expand(dir)),
            None => paths::state_dir(),
        }
    }

    pub fn templates_dir(&self) -> Result<PathBuf> {
        match &self.templates_dir {
            Some(dir) => Ok(paths::expand(dir)),
            None => Ok(paths::config_dir()?.join("templates")),
        }
    }

    pub fn rate_limit(&self) -> RateLimitConfig {
        RateLimitConfig {
            max_attempts: self.rate_limit.max_attempts.max(1),
            base_delay: Duration::from_millis(self.rate_limit.base_delay_ms),
            max_jitter: Duration::from_millis(self.rate_limit.max_jitter_ms),
            ..RateLimitConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_default() {
        let temp = TempDir::new().unwrap();
        let config = Config::load_from(&temp.path().join(CONFIG_FILE)).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.rate_limit(), RateLimitConfig::default());
    }

    #[test]
    fn test_partial_sections() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(CONFIG_FILE);
        std::fs::write(
            &path,
            "state_dir = \"/srv/conditor\"\n\n[rate_limit]\nmax_attempts = 6\n\n[backup]\nmessages_per_channel = 3\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.state_dir().unwrap(), PathBuf::from("/srv/conditor"));
        assert_eq!(config.backup.messages_per_channel, 3);
        let limits = config.rate_limit();
        assert_eq!(limits.max_attempts, 6);
        assert_eq!(limits.base_delay, Duration::from_millis(500));
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(CONFIG_FILE);
        std::fs::write(&path, "[rate_limit\n").unwrap();
        assert!(Config::load_from(&path).is_err());
    }
}
