//! High-level MPV playback controls.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::correlator::Correlator;
use super::error::MpvError;
use super::protocol::{MpvCommand, PropertyValue};
use super::transport::{ConnectionState, MpvTimeouts, Transport};

/// Playback state reported in a [`StatusSnapshot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
  Idle,
  Playing,
  Paused,
  Error,
}

/// Point-in-time view of the player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
  pub state: PlaybackState,
  pub url: Option<String>,
  /// Seconds.
  pub position: f64,
  /// Seconds.
  pub duration: f64,
  /// 0-100.
  pub volume: i64,
  pub paused: bool,
}

impl StatusSnapshot {
  fn idle(volume: i64) -> Self {
    Self {
      state: PlaybackState::Idle,
      url: None,
      position: 0.0,
      duration: 0.0,
      volume,
      paused: false,
    }
  }

  fn error() -> Self {
    Self {
      state: PlaybackState::Error,
      url: None,
      position: 0.0,
      duration: 0.0,
      volume: 0,
      paused: false,
    }
  }
}

/// Clamp a requested volume into mpv's 0-100 range.
pub fn clamp_volume(level: i64) -> i64 {
  level.clamp(0, 100)
}

/// Controls a running MPV instance over its IPC socket.
pub struct MpvPlayer {
  mpv: Correlator,
  default_volume: i64,
}

impl MpvPlayer {
  pub fn new(socket_path: impl Into<String>, timeouts: MpvTimeouts, default_volume: i64) -> Self {
    let transport = Transport::new(socket_path, timeouts);
    Self {
      mpv: Correlator::new(transport, timeouts.command),
      default_volume: clamp_volume(default_volume),
    }
  }

  /// Connect with retries; on failure commands reconnect lazily.
  pub async fn connect(&self) -> bool {
    self.mpv.connect().await
  }

  pub async fn disconnect(&self) {
    self.mpv.disconnect().await;
  }

  /// True if the socket is usable, reconnecting once if it is not.
  pub async fn is_connected(&self) -> bool {
    self.mpv.ensure_connected().await
  }

  pub fn connection_state(&self) -> ConnectionState {
    self.mpv.state()
  }

  /// Send an arbitrary command and return its reply data.
  pub async fn command(&self, verb: &str, args: Vec<Value>) -> Result<Option<Value>, MpvError> {
    self.mpv.execute(verb, args).await
  }

  /// Get a property value.
  pub async fn get_property(&self, name: &str) -> Result<PropertyValue, MpvError> {
    let response = self.mpv.send(MpvCommand::get_property(name)).await?;
    Ok(PropertyValue::from(response.data))
  }

  pub async fn set_property(&self, name: &str, value: Value) -> Result<(), MpvError> {
    self.mpv.send(MpvCommand::set_property(name, value)).await?;
    Ok(())
  }

  /// Like [`get_property`](Self::get_property), but a property the player
  /// cannot report right now reads as `Null`.
  async fn optional_property(&self, name: &str) -> Result<PropertyValue, MpvError> {
    match self.get_property(name).await {
      Err(MpvError::CommandFailed(reason)) => {
        log::trace!("Property {} unavailable: {}", name, reason);
        Ok(PropertyValue::Null)
      }
      other => other,
    }
  }

  /// Replace the current file. A profile, if given, is applied first so it
  /// governs buffering from the first frame.
  pub async fn load(&self, url: &str, profile: Option<&str>) -> Result<(), MpvError> {
    if let Some(profile) = profile {
      log::info!("Applying profile {} before load", profile);
      self.set_property("profile", profile.into()).await?;
    }
    log::info!("Loading file: {}", url);
    self.mpv.send(MpvCommand::loadfile(url)).await?;
    Ok(())
  }

  /// Flip the pause state and return the new value.
  pub async fn toggle_pause(&self) -> Result<bool, MpvError> {
    let paused = self.get_property("pause").await?.as_bool().unwrap_or(false);
    let new_state = !paused;
    self.set_property("pause", new_state.into()).await?;
    Ok(new_state)
  }

  pub async fn stop(&self) -> Result<(), MpvError> {
    self.mpv.send(MpvCommand::stop()).await?;
    Ok(())
  }

  /// Seek relative to the current position (negative goes back).
  pub async fn seek_relative(&self, seconds: f64) -> Result<(), MpvError> {
    self.mpv.send(MpvCommand::seek_relative(seconds)).await?;
    Ok(())
  }

  /// Set volume, clamping into 0-100. Returns the level actually sent.
  pub async fn set_volume(&self, level: i64) -> Result<i64, MpvError> {
    let level = clamp_volume(level);
    self.set_property("volume", level.into()).await?;
    Ok(level)
  }

  /// Current playback position, `None` while the player cannot report one.
  pub async fn time_pos(&self) -> Result<Option<f64>, MpvError> {
    Ok(self.optional_property("time-pos").await?.as_f64())
  }

  /// Best-effort status. Never fails: any error yields an `error` snapshot.
  pub async fn status(&self) -> StatusSnapshot {
    match self.fetch_status().await {
      Ok(status) => status,
      Err(e) => {
        log::debug!("Status query failed: {}", e);
        StatusSnapshot::error()
      }
    }
  }

  async fn fetch_status(&self) -> Result<StatusSnapshot, MpvError> {
    let idle = self
      .get_property("idle-active")
      .await?
      .as_bool()
      .unwrap_or(false);
    if idle {
      return Ok(StatusSnapshot::idle(self.default_volume));
    }

    let paused = self.get_property("pause").await?.as_bool().unwrap_or(false);
    let url = self
      .optional_property("path")
      .await?
      .as_str()
      .map(str::to_string);
    let position = self.optional_property("time-pos").await?.as_f64().unwrap_or(0.0);
    let duration = self.optional_property("duration").await?.as_f64().unwrap_or(0.0);
    let volume = self
      .optional_property("volume")
      .await?
      .as_f64()
      .map(|v| clamp_volume(v.round() as i64))
      .unwrap_or(self.default_volume);

    Ok(StatusSnapshot {
      state: if paused {
        PlaybackState::Paused
      } else {
        PlaybackState::Playing
      },
      url,
      position,
      duration,
      volume,
      paused,
    })
  }
}
