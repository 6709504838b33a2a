//! Playback session - ties the MPV player to the history store.
//!
//! Handles recording plays, resuming the last item and the periodic
//! position saver.

use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::history::{ContentType, HistoryEntry, HistoryStore};
use crate::mpv::{MpvError, MpvPlayer, PlaybackState};

/// Timing for resume and position saving.
#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
  /// How often the saver polls the player.
  pub position_save_interval: Duration,
  /// Saved positions at or below this many seconds are not resumed.
  pub resume_min_position: f64,
  /// Polls of `time-pos` after a resume load before giving up on the seek.
  pub resume_poll_attempts: u32,
  pub resume_poll_interval: Duration,
}

impl Default for SessionSettings {
  fn default() -> Self {
    Self {
      position_save_interval: Duration::from_secs(30),
      resume_min_position: 5.0,
      resume_poll_attempts: 20,
      resume_poll_interval: Duration::from_millis(100),
    }
  }
}

/// Something to play, as handed over by a caller.
#[derive(Debug, Clone, Default)]
pub struct PlayRequest {
  /// URL given to the player.
  pub url: String,
  /// Detected from the URL when absent.
  pub content_type: Option<ContentType>,
  pub title: String,
  pub channel_name: String,
  pub thumbnail: String,
  pub duration: f64,
  /// Page URL a stream was resolved from. History is keyed by this when set.
  pub source_url: Option<String>,
}

impl PlayRequest {
  pub fn new(url: impl Into<String>) -> Self {
    Self {
      url: url.into(),
      ..Default::default()
    }
  }

  pub fn history_url(&self) -> &str {
    self.source_url.as_deref().unwrap_or(&self.url)
  }

  pub fn resolved_content_type(&self) -> ContentType {
    self
      .content_type
      .unwrap_or_else(|| ContentType::detect(self.history_url()))
  }
}

/// What the session last loaded.
#[derive(Debug, Clone)]
struct NowPlaying {
  loaded_url: String,
  history_url: String,
}

struct SaverTask {
  cancel: CancellationToken,
  handle: JoinHandle<()>,
}

/// Owns the player/history pairing and the background position saver.
pub struct PlaybackSession {
  player: Arc<MpvPlayer>,
  history: Arc<HistoryStore>,
  settings: SessionSettings,
  now_playing: Arc<RwLock<Option<NowPlaying>>>,
  saver: Mutex<Option<SaverTask>>,
}

impl PlaybackSession {
  pub fn new(player: Arc<MpvPlayer>, history: Arc<HistoryStore>, settings: SessionSettings) -> Self {
    Self {
      player,
      history,
      settings,
      now_playing: Arc::new(RwLock::new(None)),
      saver: Mutex::new(None),
    }
  }

  pub fn player(&self) -> &Arc<MpvPlayer> {
    &self.player
  }

  pub fn history(&self) -> &Arc<HistoryStore> {
    &self.history
  }

  /// Load a new item, record it in history and make sure positions are
  /// being saved.
  pub async fn play(&self, request: PlayRequest) -> Result<ContentType, MpvError> {
    let content_type = request.resolved_content_type();
    self.player.load(&request.url, content_type.profile()).await?;

    let history_url = request.history_url().to_string();
    *self.now_playing.write() = Some(NowPlaying {
      loaded_url: request.url.clone(),
      history_url: history_url.clone(),
    });

    let mut entry = HistoryEntry::new(history_url, request.title, content_type)
      .with_channel_name(request.channel_name)
      .with_thumbnail(request.thumbnail)
      .with_duration(request.duration);
    if request.url != entry.url {
      entry = entry.with_stream_url(request.url.clone());
    }
    let history = self.history.clone();
    match tokio::task::spawn_blocking(move || history.record(entry)).await {
      Ok(Ok(())) => {}
      Ok(Err(e)) => log::warn!("Failed to record history for {}: {}", request.url, e),
      Err(e) => log::error!("History task failed: {}", e),
    }

    self.start_position_saver();
    Ok(content_type)
  }

  /// Reload the most recent history entry and seek to its saved position.
  ///
  /// Returns `None` when history is empty. The seek is relative to whatever
  /// position the player reports once loading settles; if it never reports
  /// one within the poll window, the seek is skipped.
  pub async fn resume(&self) -> Result<Option<HistoryEntry>, MpvError> {
    let history = self.history.clone();
    let last = match tokio::task::spawn_blocking(move || history.get_last()).await {
      Ok(last) => last,
      Err(e) => {
        log::error!("History task failed: {}", e);
        None
      }
    };
    let Some(entry) = last else {
      log::info!("Nothing to resume");
      return Ok(None);
    };

    log::info!("Resuming {} at {:.1}s", entry.url, entry.position);
    self.player.load(&entry.url, entry.content_type.profile()).await?;
    *self.now_playing.write() = Some(NowPlaying {
      loaded_url: entry.url.clone(),
      history_url: entry.url.clone(),
    });

    if entry.position > self.settings.resume_min_position {
      match self.wait_for_position().await? {
        Some(current) => {
          let delta = entry.position - current;
          log::debug!(
            "Resume seek: target {:.1}s, player at {:.1}s",
            entry.position,
            current
          );
          if delta != 0.0 {
            self.player.seek_relative(delta).await?;
          }
        }
        None => {
          log::warn!(
            "No playback position after {} polls, skipping resume seek for {}",
            self.settings.resume_poll_attempts,
            entry.url
          );
        }
      }
    }

    self.start_position_saver();
    Ok(Some(entry))
  }

  /// Poll `time-pos` until the player reports one or the attempts run out.
  async fn wait_for_position(&self) -> Result<Option<f64>, MpvError> {
    for attempt in 0..self.settings.resume_poll_attempts {
      if attempt > 0 {
        tokio::time::sleep(self.settings.resume_poll_interval).await;
      }
      match self.player.time_pos().await {
        Ok(Some(position)) => return Ok(Some(position)),
        Ok(None) => {}
        Err(MpvError::NotConnected) => return Err(MpvError::NotConnected),
        Err(e) => log::debug!("time-pos poll {} failed: {}", attempt + 1, e),
      }
    }
    Ok(None)
  }

  /// Save the current position, then stop playback.
  pub async fn stop(&self) -> Result<(), MpvError> {
    Self::save_position_tick(&self.player, &self.history, &self.now_playing).await;
    self.player.stop().await?;
    *self.now_playing.write() = None;
    Ok(())
  }

  /// Run one saver tick immediately. Returns true if a position was stored.
  pub async fn save_position(&self) -> bool {
    Self::save_position_tick(&self.player, &self.history, &self.now_playing).await
  }

  /// Start the periodic position saver. Must be called from within a Tokio
  /// runtime. Returns false if it is already running.
  pub fn start_position_saver(&self) -> bool {
    let mut slot = self.saver.lock();
    if let Some(task) = slot.as_ref() {
      if !task.handle.is_finished() {
        return false;
      }
    }

    let cancel = CancellationToken::new();
    let handle = tokio::spawn(Self::position_saver_loop(
      self.player.clone(),
      self.history.clone(),
      self.now_playing.clone(),
      self.settings.position_save_interval,
      cancel.clone(),
    ));
    *slot = Some(SaverTask { cancel, handle });

    log::info!(
      "Position saver started (every {:?})",
      self.settings.position_save_interval
    );
    true
  }

  /// Stop the position saver and wait briefly for it to exit.
  pub async fn stop_position_saver(&self) {
    let task = self.saver.lock().take();
    if let Some(task) = task {
      task.cancel.cancel();
      if tokio::time::timeout(Duration::from_secs(2), task.handle)
        .await
        .is_err()
      {
        log::warn!("Position saver did not stop in time");
      }
      log::info!("Position saver stopped");
    }
  }

  pub fn is_saver_running(&self) -> bool {
    self
      .saver
      .lock()
      .as_ref()
      .is_some_and(|task| !task.handle.is_finished())
  }

  /// Stop background work and close the player connection.
  pub async fn shutdown(&self) {
    self.stop_position_saver().await;
    self.player.disconnect().await;
  }

  async fn position_saver_loop(
    player: Arc<MpvPlayer>,
    history: Arc<HistoryStore>,
    now_playing: Arc<RwLock<Option<NowPlaying>>>,
    interval: Duration,
    cancel: CancellationToken,
  ) {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
      tokio::select! {
        _ = cancel.cancelled() => break,
        _ = ticker.tick() => {
          Self::save_position_tick(&player, &history, &now_playing).await;
        }
      }
    }
  }

  /// One best-effort save. Never fails; problems are logged.
  async fn save_position_tick(
    player: &MpvPlayer,
    history: &Arc<HistoryStore>,
    now_playing: &RwLock<Option<NowPlaying>>,
  ) -> bool {
    let status = player.status().await;
    if status.state != PlaybackState::Playing {
      return false;
    }
    let Some(url) = status.url else {
      return false;
    };

    // Map a resolved stream back to the URL its history entry is keyed by.
    // Streams loaded by another process are matched by the store.
    let history_url = match now_playing.read().as_ref() {
      Some(current) if current.loaded_url == url => current.history_url.clone(),
      _ => url,
    };

    let position = status.position;
    let history = history.clone();
    let target = history_url.clone();
    match tokio::task::spawn_blocking(move || history.update_position(&target, position)).await {
      Ok(Ok(())) => {
        log::trace!("Saved position {:.1}s for {}", position, history_url);
        true
      }
      Ok(Err(e)) => {
        log::warn!("Failed to save position for {}: {}", history_url, e);
        false
      }
      Err(e) => {
        log::error!("History task failed: {}", e);
        false
      }
    }
  }
}

impl Drop for PlaybackSession {
  fn drop(&mut self) {
    if let Some(task) = self.saver.get_mut().take() {
      task.cancel.cancel();
    }
  }
}
