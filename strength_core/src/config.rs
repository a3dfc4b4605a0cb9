//! Configuration file support for lift.
//!
//! Configuration is loaded from `$XDG_CONFIG_HOME/lift/config.toml`.

use crate::dashboard::EstimateSettings;
use crate::rounding::{RoundingMode, RoundingPolicy};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,

    #[serde(default)]
    pub rounding: RoundingConfig,

    #[serde(default)]
    pub dashboard: DashboardConfig,
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl DataConfig {
    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join("store.json")
    }
}

/// Rounding for imported programs that do not set their own
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RoundingConfig {
    #[serde(default = "default_increment")]
    pub increment: f64,

    #[serde(default)]
    pub mode: RoundingMode,
}

impl Default for RoundingConfig {
    fn default() -> Self {
        Self {
            increment: default_increment(),
            mode: RoundingMode::default(),
        }
    }
}

impl RoundingConfig {
    pub fn policy(&self) -> RoundingPolicy {
        RoundingPolicy {
            increment: self.increment,
            mode: self.mode,
        }
    }
}

/// Dashboard duration estimate parameters
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DashboardConfig {
    #[serde(default = "default_seconds_per_set")]
    pub seconds_per_set: u32,

    #[serde(default = "default_rest_seconds")]
    pub default_rest_seconds: u32,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            seconds_per_set: default_seconds_per_set(),
            default_rest_seconds: default_rest_seconds(),
        }
    }
}

impl DashboardConfig {
    pub fn estimate_settings(&self) -> EstimateSettings {
        EstimateSettings {
            seconds_per_set: self.seconds_per_set,
            default_rest_seconds: self.default_rest_seconds,
        }
    }
}

// Default value functions
fn home_fallback(suffix: &str) -> PathBuf {
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(suffix),
        None => PathBuf::from("."),
    }
}

fn default_data_dir() -> PathBuf {
    let base = dirs::data_local_dir().unwrap_or_else(|| home_fallback(".local/share"));
    base.join("lift")
}

fn default_increment() -> f64 {
    2.5
}

fn default_seconds_per_set() -> u32 {
    45
}

fn default_rest_seconds() -> u32 {
    120
}

impl Config {
    /// Load configuration from the standard config path
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        if !(config.rounding.increment > 0.0) {
            return Err(Error::Config(format!(
                "rounding increment must be positive, got {}",
                config.rounding.increment
            )));
        }
        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        let base = dirs::config_dir().unwrap_or_else(|| home_fallback(".config"));
        base.join("lift").join("config.toml")
    }

    /// Save the current configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.rounding.increment, 2.5);
        assert_eq!(config.rounding.mode, RoundingMode::Nearest);
        assert_eq!(config.dashboard.seconds_per_set, 45);
        assert!(config.data.store_path().ends_with("lift/store.json"));
    }

    #[test]
    fn test_config_roundtrip() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.rounding.mode = RoundingMode::Floor;
        config.save_to(&path).unwrap();

        let parsed = Config::load_from(&path).unwrap();
        assert_eq!(parsed.rounding.mode, RoundingMode::Floor);
        assert_eq!(parsed.data.data_dir, config.data.data_dir);
    }

    #[test]
    fn test_partial_config() {
        let toml_str = r#"
[rounding]
increment = 1.25
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.rounding.policy().increment, 1.25);
        assert_eq!(config.rounding.mode, RoundingMode::Nearest); // default
        assert_eq!(config.dashboard.default_rest_seconds, 120); // default
    }

    #[test]
    fn test_rejects_zero_increment() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "[rounding]\nincrement = 0.0\n").unwrap();
        assert!(matches!(Config::load_from(&path), Err(Error::Config(_))));
    }
}
