//! Application configuration with persistence.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::mpv::MpvTimeouts;
use crate::session::SessionSettings;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "PLAYCORE_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "/etc/playcore/config.json";

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
  /// MPV JSON IPC socket (or named pipe on Windows).
  #[serde(default = "default_mpv_socket")]
  pub mpv_socket: String,

  /// Playback history file.
  #[serde(default = "default_history_file")]
  pub history_file: PathBuf,

  /// Maximum number of history entries kept.
  #[serde(default = "default_history_max")]
  pub history_max: usize,

  /// Volume reported while the player is idle.
  #[serde(default = "default_volume")]
  pub default_volume: i64,

  /// Boot-time connect window.
  #[serde(default = "default_connect_timeout_ms")]
  pub connect_timeout_ms: u64,

  #[serde(default = "default_connect_retry_interval_ms")]
  pub connect_retry_interval_ms: u64,

  /// Single lazy reconnect attempt before a command.
  #[serde(default = "default_reconnect_timeout_ms")]
  pub reconnect_timeout_ms: u64,

  /// Deadline for each command's response.
  #[serde(default = "default_command_timeout_ms")]
  pub command_timeout_ms: u64,

  /// Position saver interval in seconds.
  #[serde(default = "default_position_save_interval_secs")]
  pub position_save_interval_secs: u64,

  /// Saved positions at or below this are not resumed.
  #[serde(default = "default_resume_min_position_secs")]
  pub resume_min_position_secs: f64,

  #[serde(default = "default_resume_poll_attempts")]
  pub resume_poll_attempts: u32,

  #[serde(default = "default_resume_poll_interval_ms")]
  pub resume_poll_interval_ms: u64,
}

fn default_mpv_socket() -> String {
  #[cfg(windows)]
  {
    r"\\.\pipe\mpv".to_string()
  }
  #[cfg(not(windows))]
  {
    "/tmp/mpv.sock".to_string()
  }
}

fn default_history_file() -> PathBuf {
  PathBuf::from("/var/lib/playcore/history.json")
}

fn default_history_max() -> usize {
  crate::history::DEFAULT_MAX_ENTRIES
}

fn default_volume() -> i64 {
  80
}

fn default_connect_timeout_ms() -> u64 {
  5000
}

fn default_connect_retry_interval_ms() -> u64 {
  500
}

fn default_reconnect_timeout_ms() -> u64 {
  1000
}

fn default_command_timeout_ms() -> u64 {
  3000
}

fn default_position_save_interval_secs() -> u64 {
  30
}

fn default_resume_min_position_secs() -> f64 {
  5.0
}

fn default_resume_poll_attempts() -> u32 {
  20
}

fn default_resume_poll_interval_ms() -> u64 {
  100
}

impl Default for AppConfig {
  fn default() -> Self {
    Self {
      mpv_socket: default_mpv_socket(),
      history_file: default_history_file(),
      history_max: default_history_max(),
      default_volume: default_volume(),
      connect_timeout_ms: default_connect_timeout_ms(),
      connect_retry_interval_ms: default_connect_retry_interval_ms(),
      reconnect_timeout_ms: default_reconnect_timeout_ms(),
      command_timeout_ms: default_command_timeout_ms(),
      position_save_interval_secs: default_position_save_interval_secs(),
      resume_min_position_secs: default_resume_min_position_secs(),
      resume_poll_attempts: default_resume_poll_attempts(),
      resume_poll_interval_ms: default_resume_poll_interval_ms(),
    }
  }
}

impl AppConfig {
  /// Load from the file named by `PLAYCORE_CONFIG`, or the default path.
  pub fn load() -> Self {
    let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
    Self::load_from(path)
  }

  /// Load from `path`. A missing or unparseable file yields defaults.
  pub fn load_from(path: impl AsRef<Path>) -> Self {
    let path = path.as_ref();
    let data = match std::fs::read(path) {
      Ok(data) => data,
      Err(e) => {
        log::debug!("No config at {} ({}), using defaults", path.display(), e);
        return Self::default();
      }
    };

    match serde_json::from_slice(&data) {
      Ok(config) => {
        log::info!("Loaded config from {}", path.display());
        config
      }
      Err(e) => {
        log::warn!("Invalid config {}: {}, using defaults", path.display(), e);
        Self::default()
      }
    }
  }

  /// Validate configuration values.
  pub fn validate(&self) -> Result<(), String> {
    if self.mpv_socket.trim().is_empty() {
      return Err("MPV socket path cannot be empty".to_string());
    }
    if self.history_file.as_os_str().is_empty() {
      return Err("History file path cannot be empty".to_string());
    }
    if self.history_max == 0 {
      return Err("History size must be at least 1".to_string());
    }
    if !(0..=100).contains(&self.default_volume) {
      return Err("Default volume must be between 0 and 100".to_string());
    }
    if self.command_timeout_ms == 0 || self.reconnect_timeout_ms == 0 {
      return Err("Timeouts must be greater than zero".to_string());
    }
    if self.connect_retry_interval_ms == 0 {
      return Err("Connect retry interval must be greater than zero".to_string());
    }
    if self.position_save_interval_secs < 1 || self.position_save_interval_secs > 3600 {
      return Err("Position save interval must be between 1 and 3600 seconds".to_string());
    }
    if self.resume_min_position_secs < 0.0 {
      return Err("Resume threshold cannot be negative".to_string());
    }
    Ok(())
  }

  pub fn mpv_timeouts(&self) -> MpvTimeouts {
    MpvTimeouts {
      connect: Duration::from_millis(self.connect_timeout_ms),
      connect_retry_interval: Duration::from_millis(self.connect_retry_interval_ms),
      reconnect: Duration::from_millis(self.reconnect_timeout_ms),
      command: Duration::from_millis(self.command_timeout_ms),
    }
  }

  pub fn session_settings(&self) -> SessionSettings {
    SessionSettings {
      position_save_interval: Duration::from_secs(self.position_save_interval_secs),
      resume_min_position: self.resume_min_position_secs,
      resume_poll_attempts: self.resume_poll_attempts,
      resume_poll_interval: Duration::from_millis(self.resume_poll_interval_ms),
    }
  }
}
