//! Configuration management for photoram.
//!
//! Configuration is loaded from the platform config directory with defaults for
//! every field, so a missing or partial file is always usable.

mod types;
mod validate;

pub use types::*;
pub use validate::{validate_batch_size, validate_threshold, validate_top_n};

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root configuration structure for photoram.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Input discovery settings
    pub discovery: DiscoveryConfig,

    /// Resource limits
    pub limits: LimitsConfig,

    /// Classifier settings
    pub model: ModelConfig,

    /// Checkpoint source and digests
    pub checkpoint: CheckpointConfig,

    /// Tagging settings
    pub tagging: TaggingConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Returns default configuration if the file doesn't exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Platform config directory, falling back to `~/.photoram`.
    pub fn config_dir() -> PathBuf {
        directories::ProjectDirs::from("com", "photoram", "photoram")
            .map(|dirs| dirs.config_dir().to_path_buf())
            .unwrap_or_else(|| {
                let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
                PathBuf::from(home).join(".photoram")
            })
    }

    /// Get the default config file path.
    pub fn default_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Default location of the tag override map.
    pub fn default_overrides_path() -> PathBuf {
        Self::config_dir().join("override_labels.json")
    }

    /// Get the resolved model directory path (with ~ expansion).
    pub fn model_dir(&self) -> PathBuf {
        let path_str = self.general.model_dir.to_string_lossy();
        let expanded = shellexpand::tilde(&path_str);
        PathBuf::from(expanded.into_owned())
    }

    /// Resolved explicit override file, if configured.
    pub fn overrides_path(&self) -> Option<PathBuf> {
        self.tagging.overrides.as_ref().map(|p| {
            let path_str = p.to_string_lossy();
            PathBuf::from(shellexpand::tilde(&path_str).into_owned())
        })
    }

    /// Serialize the config to a pretty TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ValidationError(e.to_string()))
    }
}
