// Player configuration, stored as RON

use crate::midi::loader::FALLBACK_TICKS_PER_QUARTER;
use ron::ser::{PrettyConfig, to_string_pretty};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const CONFIG_DIR: &str = "midi-orchestrator";
const CONFIG_FILE: &str = "config.ron";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Failed to serialize config: {0}")]
    Serialize(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Output port name; first available port when unset
    pub output_port: Option<String>,
    /// Resolution for SMPTE-timed files
    pub fallback_ticks_per_quarter: u16,
    /// Notification ring buffer size
    pub notification_capacity: usize,
    /// Tempo override applied after loading
    pub start_bpm: Option<f64>,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            output_port: None,
            fallback_ticks_per_quarter: FALLBACK_TICKS_PER_QUARTER,
            notification_capacity: 256,
            start_bpm: None,
        }
    }
}

impl PlayerConfig {
    /// `<config dir>/midi-orchestrator/config.ron`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        ron::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load from `path`, or the default location when `None`
    /// A missing or broken file falls back to defaults.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let path = match path.map(Path::to_path_buf).or_else(Self::default_path) {
            Some(path) => path,
            None => return Self::default(),
        };
        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Self::default();
        }
        match Self::load(&path) {
            Ok(config) => {
                log::info!("Loaded config from {}", path.display());
                config
            }
            Err(e) => {
                log::warn!("Ignoring config {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = to_string_pretty(self, PrettyConfig::default())
            .map_err(|e| ConfigError::Serialize(e.to_string()))?;
        std::fs::write(path, text)?;
        Ok(())
    }
}
