//! Media player control over mpv's JSON IPC, with playback history and
//! resume.
//!
//! - [`mpv`] - socket transport, command correlation and playback controls
//! - [`history`] - durable, size-bounded history of played items
//! - [`session`] - resume flow and the background position saver
//! - [`config`] - JSON configuration with defaults

mod cli;
pub mod config;
pub mod history;
pub mod mpv;
pub mod session;

pub use cli::{execute, run, Cli, CliError, Command};
pub use config::AppConfig;
pub use history::{ContentType, HistoryEntry, HistoryError, HistoryStore};
pub use mpv::{ErrorClass, MpvError, MpvPlayer, PlaybackState, StatusSnapshot};
pub use session::{PlayRequest, PlaybackSession, SessionSettings};

use tracing_subscriber::EnvFilter;

/// Install the log backend. `log` records are bridged into a
/// `tracing-subscriber` formatter writing to stderr, filtered by `RUST_LOG`
/// (default `info`).
pub fn init_logging() {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
  if let Err(e) = tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_target(true)
    .with_writer(std::io::stderr)
    .try_init()
  {
    eprintln!("Failed to initialize logging: {}", e);
  }
}
