use crate::error::{ExoError, Result};
use crate::registry::store::validate_key;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub metrics: MetricsConfig,
    pub detection: DetectionConfig,
    pub training: TrainingConfig,
    pub notifications: NotificationConfig,
    pub ipc: IpcConfig,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    pub dir: Option<PathBuf>,
    #[serde(default = "default_records_key")]
    pub records_key: String,
    #[serde(default = "default_selected_key")]
    pub selected_key: String,
}

/// How placeholder quality metrics are assigned to new records
#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MetricsMode {
    #[default]
    Random,
    Fixed,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct MetricsConfig {
    pub mode: MetricsMode,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct DetectionConfig {
    #[serde(default = "default_detection_delay_ms")]
    pub delay_ms: u64,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct TrainingConfig {
    #[serde(default = "default_training_delay_ms")]
    pub delay_ms: u64,
    #[serde(default = "default_dataset_extensions")]
    pub dataset_extensions: Vec<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct NotificationConfig {
    #[serde(default = "default_true")]
    pub enable_status: bool,
    #[serde(default = "default_true")]
    pub enable_errors: bool,
    pub desktop: bool,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct IpcConfig {
    pub socket_path: Option<PathBuf>,
}

// Default value functions
fn default_records_key() -> String {
    "nasa-models".to_string()
}
fn default_selected_key() -> String {
    "nasa-selected-model".to_string()
}
const fn default_detection_delay_ms() -> u64 {
    2500
}
const fn default_training_delay_ms() -> u64 {
    4000
}
fn default_dataset_extensions() -> Vec<String> {
    ["csv", "h5", "hdf5", "fits"]
        .iter()
        .map(ToString::to_string)
        .collect()
}
const fn default_true() -> bool {
    true
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: None,
            records_key: default_records_key(),
            selected_key: default_selected_key(),
        }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            delay_ms: default_detection_delay_ms(),
        }
    }
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            delay_ms: default_training_delay_ms(),
            dataset_extensions: default_dataset_extensions(),
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enable_status: default_true(),
            enable_errors: default_true(),
            desktop: false,
        }
    }
}

impl Config {
    /// Load config from the user config directory, falling back to defaults
    pub fn load() -> Result<Self> {
        Self::load_from(&config_path()?)
    }

    /// Load config from an explicit path. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content).map_err(|e| {
            ExoError::Config(format!("Failed to parse {}: {e}", path.display()))
        })?;
        config.validate()?;

        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.storage.records_key.is_empty() || self.storage.selected_key.is_empty() {
            return Err(ExoError::Config(
                "storage keys must not be empty".to_string(),
            ));
        }
        for key in [&self.storage.records_key, &self.storage.selected_key] {
            validate_key(key).map_err(|_| {
                ExoError::Config(format!(
                    "storage key '{key}' must be a plain file name (no '/', '\\', leading '.' or '.tmp' suffix)"
                ))
            })?;
        }
        if self.storage.records_key == self.storage.selected_key {
            return Err(ExoError::Config(
                "records_key and selected_key must differ".to_string(),
            ));
        }
        if self.training.dataset_extensions.is_empty() {
            return Err(ExoError::Config(
                "training.dataset_extensions must list at least one extension".to_string(),
            ));
        }
        Ok(())
    }

    /// Directory holding the persisted registry keys
    pub fn store_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.storage.dir {
            return Ok(dir.clone());
        }

        let data_dir = if let Ok(xdg_data) = std::env::var("XDG_DATA_HOME") {
            PathBuf::from(xdg_data)
        } else {
            dirs::data_dir()
                .ok_or_else(|| ExoError::Config("Could not determine data directory".to_string()))?
        };

        Ok(data_dir.join("exodetect").join("store"))
    }
}

/// Get config file path
pub fn config_path() -> Result<PathBuf> {
    let config_dir = if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        PathBuf::from(xdg_config)
    } else {
        dirs::config_dir()
            .ok_or_else(|| ExoError::Config("Could not determine config directory".to_string()))?
    };

    Ok(config_dir.join("exodetect").join("config.toml"))
}
