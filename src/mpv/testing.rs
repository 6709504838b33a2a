//! In-process stand-in for the MPV IPC server.
//!
//! Speaks the JSON IPC line protocol over a Unix socket in a temp dir and
//! keeps a small property table. Every reply is preceded by an event line,
//! a malformed line and a reply carrying a foreign request ID.
//!
//! Verbs beyond the usual ones:
//! - `echo <v>` replies with `v` as data
//! - `hang` never replies
//! - `late <ms>` replies only after sleeping `ms`
//! - `quit` replies, then hangs up
//! - `exit` replies, sends a `shutdown` event, then hangs up

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;

use super::MpvTimeouts;

/// Property consulted on `loadfile`: the `time-pos` the player reports once
/// the file is loaded. `null` means time-pos stays unavailable.
pub const LOAD_TIME_POS: &str = "__load_time_pos";

/// Foreign request ID attached to decoy replies.
pub const FOREIGN_REQUEST_ID: i64 = 999_999;

/// Short timeouts so failure paths finish quickly in tests.
pub fn fast_timeouts() -> MpvTimeouts {
  MpvTimeouts {
    connect: Duration::from_millis(600),
    connect_retry_interval: Duration::from_millis(50),
    reconnect: Duration::from_millis(300),
    command: Duration::from_millis(500),
  }
}

#[derive(Default)]
struct FakeState {
  received: Mutex<Vec<Value>>,
  properties: Mutex<HashMap<String, Value>>,
  connections: AtomicUsize,
}

pub struct FakeMpv {
  _dir: TempDir,
  path: String,
  state: Arc<FakeState>,
  shutdown: CancellationToken,
}

impl FakeMpv {
  /// Bind the socket and start accepting. Must run inside a Tokio runtime.
  pub fn start() -> Self {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("mpv.sock").to_string_lossy().into_owned();
    let listener = UnixListener::bind(&path).expect("bind fake mpv socket");

    let state = Arc::new(FakeState::default());
    {
      let mut props = state.properties.lock();
      props.insert("idle-active".into(), json!(true));
      props.insert("pause".into(), json!(false));
      props.insert("volume".into(), json!(100.0));
      props.insert(LOAD_TIME_POS.into(), json!(0.0));
    }

    let shutdown = CancellationToken::new();
    let accept_state = state.clone();
    let accept_token = shutdown.clone();
    tokio::spawn(async move {
      loop {
        tokio::select! {
          _ = accept_token.cancelled() => break,
          accepted = listener.accept() => {
            let Ok((stream, _)) = accepted else { break };
            accept_state.connections.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(serve(stream, accept_state.clone(), accept_token.clone()));
          }
        }
      }
    });

    Self {
      _dir: dir,
      path,
      state,
      shutdown,
    }
  }

  pub fn path(&self) -> String {
    self.path.clone()
  }

  pub fn set_property(&self, name: &str, value: Value) {
    self.state.properties.lock().insert(name.to_string(), value);
  }

  pub fn remove_property(&self, name: &str) {
    self.state.properties.lock().remove(name);
  }

  pub fn property(&self, name: &str) -> Option<Value> {
    self.state.properties.lock().get(name).cloned()
  }

  /// Command arrays received so far, in arrival order.
  pub fn commands(&self) -> Vec<Value> {
    self.state.received.lock().clone()
  }

  /// Received commands whose verb is `verb`.
  pub fn commands_named(&self, verb: &str) -> Vec<Value> {
    self
      .commands()
      .into_iter()
      .filter(|c| c.get(0).and_then(Value::as_str) == Some(verb))
      .collect()
  }

  pub fn connection_count(&self) -> usize {
    self.state.connections.load(Ordering::SeqCst)
  }

  /// Hang up every connection and remove the socket file.
  pub fn shutdown(&self) {
    self.shutdown.cancel();
    let _ = std::fs::remove_file(&self.path);
  }
}

impl Drop for FakeMpv {
  fn drop(&mut self) {
    self.shutdown.cancel();
  }
}

async fn serve(stream: UnixStream, state: Arc<FakeState>, token: CancellationToken) {
  let (reader, mut writer) = stream.into_split();
  let mut lines = BufReader::new(reader).lines();

  loop {
    let line = tokio::select! {
      _ = token.cancelled() => return,
      line = lines.next_line() => match line {
        Ok(Some(line)) => line,
        _ => return,
      },
    };

    let Ok(message) = serde_json::from_str::<Value>(&line) else {
      continue;
    };
    let request_id = message.get("request_id").cloned().unwrap_or(Value::Null);
    let command = message
      .get("command")
      .and_then(Value::as_array)
      .cloned()
      .unwrap_or_default();
    state.received.lock().push(Value::Array(command.clone()));

    let verb = command.first().and_then(Value::as_str).unwrap_or("");
    let arg = |i: usize| command.get(i).cloned().unwrap_or(Value::Null);

    let reply = match verb {
      "hang" => None,
      "late" => {
        let ms = arg(1).as_u64().unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(ms)).await;
        Some(ok(Value::Null))
      }
      "echo" | "quit" | "exit" => Some(ok(arg(1))),
      "get_property" => {
        let name = arg(1).as_str().unwrap_or("").to_string();
        let value = state.properties.lock().get(&name).cloned();
        match value {
          Some(value) => Some(ok(value)),
          None => Some(failed("property unavailable")),
        }
      }
      "set_property" => {
        let name = arg(1).as_str().unwrap_or("").to_string();
        state.properties.lock().insert(name, arg(2));
        Some(ok(Value::Null))
      }
      "loadfile" => {
        let mut props = state.properties.lock();
        props.insert("path".into(), arg(1));
        props.insert("idle-active".into(), json!(false));
        props.insert("pause".into(), json!(false));
        props.insert("duration".into(), json!(600.0));
        match props.get(LOAD_TIME_POS).cloned() {
          Some(Value::Null) | None => {
            props.remove("time-pos");
          }
          Some(pos) => {
            props.insert("time-pos".into(), pos);
          }
        }
        Some(ok(Value::Null))
      }
      "stop" => {
        let mut props = state.properties.lock();
        props.insert("idle-active".into(), json!(true));
        props.remove("path");
        props.remove("time-pos");
        props.remove("duration");
        Some(ok(Value::Null))
      }
      "seek" => {
        let delta = arg(1).as_f64().unwrap_or(0.0);
        let mut props = state.properties.lock();
        match props.get("time-pos").and_then(Value::as_f64) {
          Some(pos) => {
            props.insert("time-pos".into(), json!(pos + delta));
            Some(ok(Value::Null))
          }
          None => Some(failed("property unavailable")),
        }
      }
      _ => Some(failed("invalid parameter")),
    };

    let Some(mut reply) = reply else {
      continue;
    };
    reply["request_id"] = request_id;

    let mut out = String::new();
    out.push_str("{\"event\":\"playback-restart\"}\n");
    out.push_str("{not json\n");
    out.push_str(&json!({"request_id": FOREIGN_REQUEST_ID, "error": "success", "data": "decoy"}).to_string());
    out.push('\n');
    out.push_str(&reply.to_string());
    out.push('\n');

    if writer.write_all(out.as_bytes()).await.is_err() {
      return;
    }
    if verb == "exit" {
      let _ = writer.write_all(b"{\"event\":\"shutdown\"}\n").await;
    }
    if verb == "quit" || verb == "exit" {
      let _ = writer.shutdown().await;
      return;
    }
  }
}

fn ok(data: Value) -> Value {
  json!({"error": "success", "data": data})
}

fn failed(reason: &str) -> Value {
  json!({"error": reason})
}
