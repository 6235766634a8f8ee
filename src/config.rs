//! Player configuration, read from a JSON file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::player::{timeout_from_millis, Isolation, LineMode};

const CONFIG_DIR_NAME: &str = "mplayer-slave";
const CONFIG_FILE_NAME: &str = "config.json";

/// Upper bound for the default operation timeout (10 minutes).
const MAX_OPERATION_TIMEOUT_MS: u64 = 600_000;

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("Config I/O error: {0}")]
  Io(#[from] std::io::Error),
  #[error("Config JSON error: {0}")]
  Json(#[from] serde_json::Error),
  #[error("Invalid config: {0}")]
  Invalid(String),
}

/// Player configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerConfig {
  /// Custom MPlayer executable path (None = auto-detect).
  #[serde(default)]
  pub player_path: Option<String>,

  /// Default operation timeout in milliseconds. 0 disables it.
  #[serde(default = "default_operation_timeout_ms")]
  pub operation_timeout_ms: u64,

  /// Whether concurrent operations queue for the output stream.
  #[serde(default)]
  pub isolation: Isolation,

  /// Whether lines split across reads are stitched back together.
  #[serde(default)]
  pub line_mode: LineMode,
}

fn default_operation_timeout_ms() -> u64 {
  2000
}

impl Default for PlayerConfig {
  fn default() -> Self {
    Self {
      player_path: None,
      operation_timeout_ms: default_operation_timeout_ms(),
      isolation: Isolation::default(),
      line_mode: LineMode::default(),
    }
  }
}

impl PlayerConfig {
  /// Validate configuration values.
  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.operation_timeout_ms > MAX_OPERATION_TIMEOUT_MS {
      return Err(ConfigError::Invalid(format!(
        "Operation timeout must be at most {} ms",
        MAX_OPERATION_TIMEOUT_MS
      )));
    }
    Ok(())
  }

  /// Explicit executable, if one is set. Blank strings mean auto-detect.
  pub fn player_path(&self) -> Option<PathBuf> {
    self
      .player_path
      .as_ref()
      .filter(|s| !s.trim().is_empty())
      .map(PathBuf::from)
  }

  pub fn operation_timeout(&self) -> Option<Duration> {
    timeout_from_millis(self.operation_timeout_ms)
  }

  /// `<config dir>/mplayer-slave/config.json`.
  pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
  }

  /// Load and validate a config file.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let text = std::fs::read_to_string(path)?;
    let config: PlayerConfig = serde_json::from_str(&text)?;
    config.validate()?;
    Ok(config)
  }

  /// Load a config file, falling back to defaults if it is missing or bad.
  pub fn load_or_default(path: &Path) -> Self {
    if !path.exists() {
      log::info!("No config at {:?}, using defaults", path);
      return Self::default();
    }
    match Self::load(path) {
      Ok(config) => {
        log::info!("Loaded config from {:?}", path);
        config
      }
      Err(e) => {
        log::warn!("Failed to load config from {:?}: {}", path, e);
        Self::default()
      }
    }
  }
}
