//! Command-line front end.
//!
//! Each subcommand maps onto one playback or history operation and prints
//! its result as JSON on stdout. `daemon` keeps the connection open and runs
//! the position saver until interrupted.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use serde_json::{json, Value};
use thiserror::Error;

use crate::config::AppConfig;
use crate::history::{ContentType, HistoryError, HistoryStore};
use crate::mpv::{MpvError, MpvPlayer};
use crate::session::{PlayRequest, PlaybackSession};

#[derive(Debug, Error)]
pub enum CliError {
  #[error(transparent)]
  Mpv(#[from] MpvError),
  #[error(transparent)]
  History(#[from] HistoryError),
  #[error("Invalid JSON value: {0}")]
  Json(#[from] serde_json::Error),
  #[error("Invalid configuration: {0}")]
  Config(String),
}

#[derive(Debug, Parser)]
#[command(name = "playcore", version, about = "Control mpv over IPC with playback history")]
pub struct Cli {
  /// Config file (overrides PLAYCORE_CONFIG).
  #[arg(long, global = true)]
  pub config: Option<PathBuf>,

  /// MPV IPC socket path (overrides the config file).
  #[arg(long, global = true)]
  pub socket: Option<String>,

  #[command(subcommand)]
  pub command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ContentTypeArg {
  Youtube,
  Iptv,
  Direct,
}

impl From<ContentTypeArg> for ContentType {
  fn from(arg: ContentTypeArg) -> Self {
    match arg {
      ContentTypeArg::Youtube => ContentType::Youtube,
      ContentTypeArg::Iptv => ContentType::Iptv,
      ContentTypeArg::Direct => ContentType::Direct,
    }
  }
}

#[derive(Debug, Subcommand)]
pub enum Command {
  /// Stay connected and save playback positions until Ctrl-C.
  Daemon,
  /// Load a URL and record it in history.
  Play {
    url: String,
    #[arg(long = "type", value_enum)]
    content_type: Option<ContentTypeArg>,
    #[arg(long, default_value = "")]
    title: String,
    #[arg(long, default_value = "")]
    channel: String,
    #[arg(long, default_value = "")]
    thumbnail: String,
    /// Page URL the stream was resolved from.
    #[arg(long)]
    source: Option<String>,
  },
  /// Toggle pause.
  Pause,
  Stop,
  /// Seek relative, negative goes back.
  Seek {
    #[arg(allow_hyphen_values = true)]
    seconds: f64,
  },
  /// Set volume 0-100 (out-of-range values are clamped).
  Volume {
    #[arg(allow_hyphen_values = true)]
    level: i64,
  },
  /// Read a property.
  Get { name: String },
  /// Write a property; the value is parsed as JSON, falling back to a string.
  Set { name: String, value: String },
  Status,
  /// Reload the most recent history item at its saved position.
  Resume,
  History {
    #[arg(long, default_value_t = 20)]
    limit: usize,
  },
  ClearHistory,
  /// Report whether the player socket is reachable.
  Health,
}

/// Build everything from config and run one subcommand.
pub async fn run(cli: Cli) -> Result<(), CliError> {
  let mut config = match &cli.config {
    Some(path) => AppConfig::load_from(path),
    None => AppConfig::load(),
  };
  if let Some(socket) = cli.socket {
    config.mpv_socket = socket;
  }
  config.validate().map_err(CliError::Config)?;

  let player = Arc::new(MpvPlayer::new(
    config.mpv_socket.clone(),
    config.mpv_timeouts(),
    config.default_volume,
  ));
  let history = Arc::new(HistoryStore::new(
    config.history_file.clone(),
    config.history_max,
  ));
  let session = PlaybackSession::new(player, history, config.session_settings());

  let result = execute(&session, cli.command)
    .await
    .map(|output| println!("{}", output));

  session.shutdown().await;
  result
}

async fn daemon(session: &PlaybackSession) {
  if !session.player().connect().await {
    log::warn!("Starting without a player connection");
  }
  session.start_position_saver();
  log::info!("playcore daemon ready");

  if let Err(e) = tokio::signal::ctrl_c().await {
    log::error!("Failed to listen for shutdown signal: {}", e);
  }
  log::info!("playcore daemon shutting down");
  session.save_position().await;
}

/// Run a one-shot subcommand and return its JSON output.
pub async fn execute(session: &PlaybackSession, command: Command) -> Result<Value, CliError> {
  let player = session.player();

  let output = match command {
    Command::Daemon => {
      daemon(session).await;
      json!({"ok": true})
    }
    Command::Play {
      url,
      content_type,
      title,
      channel,
      thumbnail,
      source,
    } => {
      let request = PlayRequest {
        url: url.clone(),
        content_type: content_type.map(ContentType::from),
        title,
        channel_name: channel,
        thumbnail,
        duration: 0.0,
        source_url: source,
      };
      let content_type = session.play(request).await?;
      json!({"ok": true, "url": url, "type": content_type})
    }
    Command::Pause => {
      let paused = player.toggle_pause().await?;
      json!({"ok": true, "paused": paused})
    }
    Command::Stop => {
      session.stop().await?;
      json!({"ok": true})
    }
    Command::Seek { seconds } => {
      player.seek_relative(seconds).await?;
      json!({"ok": true, "seconds": seconds})
    }
    Command::Volume { level } => {
      let volume = player.set_volume(level).await?;
      json!({"ok": true, "volume": volume})
    }
    Command::Get { name } => {
      let value = player.get_property(&name).await?;
      json!({"name": name, "value": value})
    }
    Command::Set { name, value } => {
      let parsed = serde_json::from_str(&value).unwrap_or(Value::String(value));
      player.set_property(&name, parsed.clone()).await?;
      json!({"ok": true, "name": name, "value": parsed})
    }
    Command::Status => serde_json::to_value(player.status().await)?,
    Command::Resume => match session.resume().await? {
      Some(entry) => json!({"ok": true, "resumed": entry}),
      None => json!({"ok": false, "resumed": null}),
    },
    Command::History { limit } => serde_json::to_value(session.history().get_all(limit))?,
    Command::ClearHistory => {
      session.history().clear()?;
      json!({"ok": true})
    }
    Command::Health => {
      let mpv = if player.is_connected().await {
        "connected"
      } else {
        "disconnected"
      };
      json!({"status": "ok", "mpv": mpv})
    }
  };

  Ok(output)
}
