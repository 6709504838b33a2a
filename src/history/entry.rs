//! History record types.

use serde::{Deserialize, Serialize};

/// mpv profile applied to live sources before loading.
pub const LIVE_PROFILE: &str = "live";

/// Kind of source an entry was played from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
  Youtube,
  Iptv,
  #[default]
  Direct,
}

impl ContentType {
  /// Guess the content type from a URL. IPTV cannot be told apart from a
  /// plain stream, so callers must say so explicitly.
  pub fn detect(url: &str) -> Self {
    if url.contains("youtube.com") || url.contains("youtu.be") {
      ContentType::Youtube
    } else {
      ContentType::Direct
    }
  }

  /// Playback profile to apply before loading this kind of source.
  pub fn profile(self) -> Option<&'static str> {
    match self {
      ContentType::Iptv => Some(LIVE_PROFILE),
      ContentType::Youtube | ContentType::Direct => None,
    }
  }
}

/// One played item. The JSON field names are the on-disk format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
  pub url: String,
  #[serde(default)]
  pub title: String,
  #[serde(default)]
  pub content_type: ContentType,
  /// Channel name for IPTV entries.
  #[serde(default)]
  pub channel_name: String,
  #[serde(default)]
  pub thumbnail: String,
  /// Seconds.
  #[serde(default)]
  pub duration: f64,
  /// Last known playback position in seconds.
  #[serde(default)]
  pub position: f64,
  /// Unix timestamp in seconds, fractional part allowed.
  #[serde(default)]
  pub played_at: f64,
  /// URL actually handed to the player when it differs from `url`, e.g. a
  /// stream resolved from a YouTube page.
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub stream_url: String,
}

impl HistoryEntry {
  pub fn new(url: impl Into<String>, title: impl Into<String>, content_type: ContentType) -> Self {
    Self {
      url: url.into(),
      title: title.into(),
      content_type,
      channel_name: String::new(),
      thumbnail: String::new(),
      duration: 0.0,
      position: 0.0,
      played_at: 0.0,
      stream_url: String::new(),
    }
  }

  pub fn with_channel_name(mut self, channel_name: impl Into<String>) -> Self {
    self.channel_name = channel_name.into();
    self
  }

  pub fn with_thumbnail(mut self, thumbnail: impl Into<String>) -> Self {
    self.thumbnail = thumbnail.into();
    self
  }

  pub fn with_duration(mut self, duration: f64) -> Self {
    self.duration = duration;
    self
  }

  pub fn with_stream_url(mut self, stream_url: impl Into<String>) -> Self {
    self.stream_url = stream_url.into();
    self
  }

  /// True if this entry is the one playing `url`, by either address.
  pub fn matches(&self, url: &str) -> bool {
    self.url == url || (!self.stream_url.is_empty() && self.stream_url == url)
  }
}
