//! Durable, size-bounded playback history.
//!
//! The JSON file is the source of truth: every operation loads it, applies
//! its change and writes it back through a uniquely named temp file plus
//! rename, so readers never see a partial file. Within one process the cycle is serialized;
//! across processes the last writer wins.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tempfile::NamedTempFile;
use thiserror::Error;

use super::entry::HistoryEntry;

/// Default cap on stored entries.
pub const DEFAULT_MAX_ENTRIES: usize = 50;

#[derive(Error, Debug)]
pub enum HistoryError {
  #[error("History I/O failed: {0}")]
  Io(#[from] io::Error),
  #[error("History serialization failed: {0}")]
  Json(#[from] serde_json::Error),
}

pub struct HistoryStore {
  path: PathBuf,
  max_entries: usize,
  lock: Mutex<()>,
}

impl HistoryStore {
  pub fn new(path: impl Into<PathBuf>, max_entries: usize) -> Self {
    Self {
      path: path.into(),
      max_entries: max_entries.max(1),
      lock: Mutex::new(()),
    }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn max_entries(&self) -> usize {
    self.max_entries
  }

  /// Put `entry` at the front as a fresh play: position reset, timestamp
  /// set to now. Any older entry for the same URL is replaced.
  pub fn record(&self, mut entry: HistoryEntry) -> Result<(), HistoryError> {
    let _guard = self.lock.lock();

    if entry.title.is_empty() {
      entry.title = entry.url.clone();
    }
    entry.position = 0.0;
    entry.played_at = now();

    let mut entries = self.load();
    entries.retain(|e| e.url != entry.url);
    log::debug!("Recording history entry for {}", entry.url);
    entries.insert(0, entry);
    entries.truncate(self.max_entries);
    self.save(&entries)
  }

  /// Update the saved position for `url` in place. `url` may also be the
  /// stream an entry was resolved to. Unknown URLs are ignored.
  pub fn update_position(&self, url: &str, position: f64) -> Result<(), HistoryError> {
    let _guard = self.lock.lock();

    let mut entries = self.load();
    let Some(entry) = entries.iter_mut().find(|e| e.matches(url)) else {
      return Ok(());
    };
    entry.position = position;
    self.save(&entries)
  }

  /// Most recently played entry.
  pub fn get_last(&self) -> Option<HistoryEntry> {
    let _guard = self.lock.lock();
    self.load().into_iter().next()
  }

  /// Up to `limit` entries, most recent first.
  pub fn get_all(&self, limit: usize) -> Vec<HistoryEntry> {
    let _guard = self.lock.lock();
    let mut entries = self.load();
    entries.truncate(limit);
    entries
  }

  pub fn len(&self) -> usize {
    let _guard = self.lock.lock();
    self.load().len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn clear(&self) -> Result<(), HistoryError> {
    let _guard = self.lock.lock();
    log::info!("Clearing playback history");
    self.save(&[])
  }

  /// Read the file. Missing, unreadable or corrupt means empty.
  fn load(&self) -> Vec<HistoryEntry> {
    let data = match fs::read(&self.path) {
      Ok(data) => data,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Vec::new(),
      Err(e) => {
        log::warn!("Failed to read history {}: {}", self.path.display(), e);
        return Vec::new();
      }
    };

    match serde_json::from_slice::<Vec<HistoryEntry>>(&data) {
      Ok(mut entries) => {
        entries.truncate(self.max_entries);
        entries
      }
      Err(e) => {
        log::warn!("Ignoring corrupt history {}: {}", self.path.display(), e);
        Vec::new()
      }
    }
  }

  fn save(&self, entries: &[HistoryEntry]) -> Result<(), HistoryError> {
    let dir = match self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
      Some(dir) => dir,
      None => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let json = serde_json::to_vec_pretty(entries)?;
    // Each writer gets its own temp file next to the target.
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(&json)?;
    tmp.as_file().sync_all()?;
    tmp.persist(&self.path).map_err(|e| e.error)?;
    sync_dir(dir)?;
    Ok(())
  }
}

/// Make a rename in `dir` durable.
#[cfg(unix)]
fn sync_dir(dir: &Path) -> io::Result<()> {
  fs::File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> io::Result<()> {
  Ok(())
}

fn now() -> f64 {
  chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}
