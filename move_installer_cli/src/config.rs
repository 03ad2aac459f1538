//! Configuration management for the Move Everything installer CLI

use anyhow::{bail, Context, Result};
use directories::ProjectDirs;
use move_installer_core::{catalog::DEFAULT_REPOSITORY, DEFAULT_HOSTNAME, DEFAULT_POLL_INTERVAL};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Settings that can be changed with `config set`
pub const KEYS: &[&str] = &["hostname", "address", "repository", "poll-interval"];

/// Installer CLI configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    /// Hostname of the device
    #[serde(default = "default_hostname")]
    pub hostname: String,

    /// Last address the device was reached at
    #[serde(default)]
    pub last_address: Option<String>,

    /// GitHub `owner/repo` releases are fetched from
    #[serde(default = "default_repository")]
    pub repository: String,

    /// Milliseconds between SSH probes while waiting for key approval
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

fn default_hostname() -> String {
    DEFAULT_HOSTNAME.to_string()
}

fn default_repository() -> String {
    DEFAULT_REPOSITORY.to_string()
}

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL.as_millis() as u64
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hostname: default_hostname(),
            last_address: None,
            repository: default_repository(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}

impl Config {
    /// Get the config file path
    pub fn path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("com", "move-everything", "installer")
            .context("Could not determine config directory")?;

        Ok(proj_dirs.config_dir().join("config.json"))
    }

    /// Load config from file, or return default if not exists
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content).with_context(|| "Failed to parse config file")
    }

    /// Save config to file
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory {}", parent.display()))?;
        }

        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, content)
            .with_context(|| format!("Failed to write config to {}", path.display()))?;

        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Change one setting by its `config set` name
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "hostname" => {
                if value.trim().is_empty() {
                    bail!("Hostname cannot be empty");
                }
                self.hostname = value.trim().to_string();
            }
            "address" => {
                self.last_address = match value.trim() {
                    "" | "none" => None,
                    address => Some(address.to_string()),
                };
            }
            "repository" => {
                if value.split('/').filter(|part| !part.is_empty()).count() != 2 {
                    bail!("Repository must look like owner/repo");
                }
                self.repository = value.trim().to_string();
            }
            "poll-interval" => {
                let ms: u64 = value
                    .trim()
                    .parse()
                    .with_context(|| format!("Invalid poll interval: {}", value))?;
                if ms < 100 {
                    bail!("Poll interval must be at least 100 ms");
                }
                self.poll_interval_ms = ms;
            }
            other => bail!("Unknown setting '{}'. Known settings: {}", other, KEYS.join(", ")),
        }
        Ok(())
    }

    /// `(name, value)` pairs for display
    pub fn entries(&self) -> Vec<(&'static str, String)> {
        vec![
            ("hostname", self.hostname.clone()),
            (
                "address",
                self.last_address.clone().unwrap_or_else(|| "(not set)".to_string()),
            ),
            ("repository", self.repository.clone()),
            ("poll-interval", format!("{} ms", self.poll_interval_ms)),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.hostname, "move.local");
        assert_eq!(config.repository, "charlesvestal/move-anything");
        assert_eq!(config.poll_interval(), Duration::from_millis(2000));
        assert!(config.last_address.is_none());
    }

    #[test]
    fn test_set_values() {
        let mut config = Config::default();
        config.set("hostname", "studio-move.local").unwrap();
        config.set("address", "192.168.1.20").unwrap();
        config.set("poll-interval", "500").unwrap();

        assert_eq!(config.hostname, "studio-move.local");
        assert_eq!(config.last_address.as_deref(), Some("192.168.1.20"));
        assert_eq!(config.poll_interval_ms, 500);

        config.set("address", "none").unwrap();
        assert!(config.last_address.is_none());
    }

    #[test]
    fn test_set_rejects_bad_values() {
        let mut config = Config::default();
        assert!(config.set("repository", "just-a-name").is_err());
        assert!(config.set("poll-interval", "fast").is_err());
        assert!(config.set("poll-interval", "10").is_err());
        assert!(config.set("colour", "blue").is_err());
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let config: Config = serde_json::from_str(r#"{"hostname": "move-2.local"}"#).unwrap();
        assert_eq!(config.hostname, "move-2.local");
        assert_eq!(config.repository, "charlesvestal/move-anything");
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("config.json");

        let mut config = Config::default();
        config.set("address", "[fe80::1]").unwrap();
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }
}
