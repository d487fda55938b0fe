use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::error::{Result, WidgetError};

/// Persisted window settings. Everything else about the widget is
/// compile-time; there are no CLI flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Last outer window position. `None` places the pill bottom-center.
    pub window_position: Option<(f32, f32)>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            window_position: None,
        }
    }
}

impl AppConfig {
    fn config_dir() -> Result<PathBuf> {
        let home = std::env::var("HOME").map_err(|_| {
            WidgetError::Config("HOME environment variable not set".to_string())
        })?;

        Ok(PathBuf::from(home).join(".config").join("spotipill"))
    }

    fn config_file_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    /// Load configuration from disk, or return defaults if the file does not
    /// exist or fails to parse.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_file_path()?;

        if !config_path.exists() {
            log::info!("Config file not found, using defaults");
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&config_path).map_err(|e| {
            WidgetError::Config(format!("Failed to read config file: {}", e))
        })?;

        match serde_json::from_str(&contents) {
            Ok(config) => {
                log::info!("Loaded configuration from {:?}", config_path);
                Ok(config)
            }
            Err(e) => {
                log::warn!("Failed to parse config file ({}), using defaults", e);
                Ok(Self::default())
            }
        }
    }

    pub fn save(&self) -> Result<()> {
        let config_dir = Self::config_dir()?;
        let config_path = Self::config_file_path()?;

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir).map_err(|e| {
                WidgetError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let json = serde_json::to_string_pretty(self)?;
        fs::write(&config_path, json).map_err(|e| {
            WidgetError::Config(format!("Failed to write config file: {}", e))
        })?;

        log::info!("Saved configuration to {:?}", config_path);
        Ok(())
    }
}
