//! Control-layer configuration with JSON persistence.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Configuration the shell hands to the control layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerConfig {
  /// Custom player executable path (None = auto-detect).
  #[serde(default)]
  pub player_path: Option<String>,

  /// Additional player command-line arguments.
  #[serde(default)]
  pub player_args: Vec<String>,

  /// Directory the session FIFOs are created in.
  #[serde(default = "default_pipe_dir")]
  pub pipe_dir: String,

  /// Status poll interval in seconds.
  #[serde(default = "default_poll_interval")]
  pub poll_interval_secs: u32,
}

fn default_pipe_dir() -> String {
  "/tmp".to_string()
}

fn default_poll_interval() -> u32 {
  1
}

impl Default for PlayerConfig {
  fn default() -> Self {
    Self {
      player_path: None,
      player_args: Vec::new(),
      pipe_dir: default_pipe_dir(),
      poll_interval_secs: default_poll_interval(),
    }
  }
}

impl PlayerConfig {
  /// Validate configuration values.
  pub fn validate(&self) -> Result<(), String> {
    if self.pipe_dir.trim().is_empty() {
      return Err("Pipe directory cannot be empty".to_string());
    }
    if self.poll_interval_secs < 1 || self.poll_interval_secs > 60 {
      return Err("Poll interval must be between 1 and 60 seconds".to_string());
    }
    Ok(())
  }

  fn config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("mpctl").join("config.json"))
  }

  /// Load from the user config dir, falling back to defaults.
  pub fn load() -> Self {
    let Some(path) = Self::config_file() else {
      return Self::default();
    };
    match std::fs::read_to_string(&path) {
      Ok(text) => match serde_json::from_str(&text) {
        Ok(config) => config,
        Err(e) => {
          log::warn!("ignoring malformed config {:?}: {}", path, e);
          Self::default()
        }
      },
      Err(_) => Self::default(),
    }
  }

  /// Persist to the user config dir.
  pub fn save(&self) -> std::io::Result<()> {
    let Some(path) = Self::config_file() else {
      return Ok(());
    };
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)?;
    }
    let text = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
    std::fs::write(&path, text)
  }
}
