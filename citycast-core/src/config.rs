use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::provider::openweather::DEFAULT_API_BASE_URL;

/// Environment variable that overrides the API key stored on disk.
pub const API_KEY_ENV: &str = "OPENWEATHER_API_KEY";

pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 300;

/// Top-level configuration stored on disk.
///
/// Example TOML:
/// ```toml
/// api_key = "..."
/// refresh_interval_secs = 300
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    pub api_key: Option<String>,

    /// Override for `https://api.openweathermap.org`.
    pub api_base_url: Option<String>,

    /// Override for the geocoding host; defaults to the API host.
    pub geo_base_url: Option<String>,

    pub refresh_interval_secs: Option<u64>,
}

impl Config {
    /// API key from the environment, falling back to the config file. Blank
    /// values count as missing.
    pub fn resolved_api_key(&self) -> Option<String> {
        resolve_api_key(std::env::var(API_KEY_ENV).ok(), self.api_key.as_deref())
    }

    pub fn set_api_key(&mut self, api_key: String) {
        self.api_key = Some(api_key.trim().to_string());
    }

    pub fn api_base_url(&self) -> &str {
        self.api_base_url.as_deref().unwrap_or(DEFAULT_API_BASE_URL)
    }

    pub fn geo_base_url(&self) -> &str {
        self.geo_base_url
            .as_deref()
            .unwrap_or_else(|| self.api_base_url())
    }

    pub fn refresh_interval(&self) -> Duration {
        let secs = self
            .refresh_interval_secs
            .filter(|&s| s > 0)
            .unwrap_or(DEFAULT_REFRESH_INTERVAL_SECS);
        Duration::from_secs(secs)
    }

    /// Load config from disk, or return an empty default if it doesn't exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_file_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            // First run: no config file, return empty.
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save(&self) -> Result<PathBuf> {
        let path = Self::config_file_path()?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "citycast", "citycast")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }
}

fn resolve_api_key(from_env: Option<String>, from_file: Option<&str>) -> Option<String> {
    from_env
        .as_deref()
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .or_else(|| from_file.map(str::trim).filter(|k| !k.is_empty()))
        .map(str::to_string)
}
