//! User settings (`config.yaml`)

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable pointing at a settings file
pub const SETTINGS_ENV: &str = "STACKFLOW_CONFIG";

const SETTINGS_FILE: &str = "config.yaml";

/// Settings shared by every command
///
/// ```yaml
/// region: eu-west-1
/// state_dir: /var/lib/stackflow
/// retry:
///   max_attempts: 5
/// stabilize:
///   max_polls: 60
///   max_delay_ms: 15000
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Value of `AWS::Region`
    pub region: String,

    /// State directory; defaults to `.stackflow` next to the template
    pub state_dir: Option<PathBuf>,

    pub retry: RetrySettings,

    pub stabilize: StabilizeSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            state_dir: None,
            retry: RetrySettings::default(),
            stabilize: StabilizeSettings::default(),
        }
    }
}

/// Backoff for transient provider errors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1_000,
            max_delay_ms: 30_000,
            multiplier: 2.0,
        }
    }
}

/// Polling while a resource settles
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StabilizeSettings {
    pub max_polls: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
}

impl Default for StabilizeSettings {
    fn default() -> Self {
        Self {
            max_polls: 30,
            initial_delay_ms: 500,
            max_delay_ms: 10_000,
            multiplier: 2.0,
        }
    }
}

impl Settings {
    /// Read settings from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let settings: Settings = serde_yaml::from_str(&content).map_err(|e| {
            ConfigError::InvalidSettings {
                path: path.to_path_buf(),
                message: e.to_string(),
            }
        })?;
        settings.validate(path)?;
        Ok(settings)
    }

    fn validate(&self, path: &Path) -> Result<()> {
        let invalid = |message: &str| ConfigError::InvalidSettings {
            path: path.to_path_buf(),
            message: message.to_string(),
        };
        if self.retry.max_attempts == 0 {
            return Err(invalid("retry.max_attempts must be at least 1"));
        }
        if self.stabilize.max_polls == 0 {
            return Err(invalid("stabilize.max_polls must be at least 1"));
        }
        if self.retry.multiplier < 1.0 || self.stabilize.multiplier < 1.0 {
            return Err(invalid("backoff multipliers must be at least 1.0"));
        }
        if self.region.trim().is_empty() {
            return Err(invalid("region must not be empty"));
        }
        Ok(())
    }
}

/// Load settings
///
/// Looks in this order:
/// 1. `STACKFLOW_CONFIG` (must exist when set)
/// 2. `~/.config/stackflow/config.yaml`
/// 3. built-in defaults
pub fn load_settings() -> Result<Settings> {
    if let Ok(path) = std::env::var(SETTINGS_ENV) {
        let path = PathBuf::from(path);
        if !path.exists() {
            return Err(ConfigError::MissingSettings(path));
        }
        tracing::debug!("Loading settings from {}", path.display());
        return Settings::from_file(path);
    }

    if let Some(config_dir) = dirs::config_dir() {
        let path = config_dir.join("stackflow").join(SETTINGS_FILE);
        if path.exists() {
            tracing::debug!("Loading settings from {}", path.display());
            return Settings::from_file(path);
        }
    }

    Ok(Settings::default())
}
