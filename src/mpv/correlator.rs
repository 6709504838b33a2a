//! Request/response correlation over the shared IPC connection.
//!
//! One command is in flight at a time: the lock is held from request ID
//! allocation until the matching reply (or the deadline). Lines that do not
//! answer the current request are skipped.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::Mutex;

use super::error::MpvError;
use super::protocol::{MpvCommand, MpvMessage, MpvResponse};
use super::transport::{ConnectionState, Transport};

/// Transport plus the request ID counter it is paired with.
struct Channel {
  transport: Transport,
  last_request_id: i64,
}

pub struct Correlator {
  channel: Mutex<Channel>,
  state: Arc<RwLock<ConnectionState>>,
  command_timeout: Duration,
}

impl Correlator {
  pub fn new(transport: Transport, command_timeout: Duration) -> Self {
    let state = transport.state_handle();
    Self {
      channel: Mutex::new(Channel {
        transport,
        last_request_id: 0,
      }),
      state,
      command_timeout,
    }
  }

  pub fn state(&self) -> ConnectionState {
    *self.state.read()
  }

  /// Boot-time connect with retries. Returns false if the player never showed
  /// up within the connect deadline.
  pub async fn connect(&self) -> bool {
    self.channel.lock().await.transport.connect().await
  }

  pub async fn disconnect(&self) {
    self.channel.lock().await.transport.disconnect().await;
  }

  /// Health check doubling as a lazy reconnect.
  pub async fn ensure_connected(&self) -> bool {
    self.channel.lock().await.transport.ensure_connected().await
  }

  /// Run `verb args...` and return the reply's data.
  pub async fn execute(&self, verb: &str, args: Vec<Value>) -> Result<Option<Value>, MpvError> {
    let response = self.send(MpvCommand::new(verb, args)).await?;
    Ok(response.data)
  }

  /// Send a command and wait for the reply carrying its request ID.
  pub async fn send(&self, cmd: MpvCommand) -> Result<MpvResponse, MpvError> {
    let mut channel = self.channel.lock().await;

    if !channel.transport.ensure_connected().await {
      return Err(MpvError::NotConnected);
    }

    channel.last_request_id += 1;
    let request_id = channel.last_request_id;
    let cmd = cmd.with_request_id(request_id);
    let line = cmd.to_line()?;
    log::debug!(
      "Sending MPV command: {}",
      String::from_utf8_lossy(&line[..line.len() - 1])
    );

    if channel.transport.send_line(&line).await.is_err() {
      return Err(MpvError::NotConnected);
    }

    let response = match tokio::time::timeout(
      self.command_timeout,
      Self::await_response(&mut channel.transport, request_id),
    )
    .await
    {
      Ok(result) => result?,
      Err(_) => {
        log::error!(
          "MPV command timeout after {:?}, request_id={}",
          self.command_timeout,
          request_id
        );
        return Err(MpvError::Timeout);
      }
    };

    if !response.is_success() {
      log::debug!(
        "MPV rejected {:?} (request_id={}): {}",
        cmd.verb(),
        request_id,
        response.error
      );
      return Err(MpvError::CommandFailed(response.error));
    }

    Ok(response)
  }

  async fn await_response(
    transport: &mut Transport,
    request_id: i64,
  ) -> Result<MpvResponse, MpvError> {
    loop {
      let line = match transport.read_line().await {
        Ok(Some(line)) => line,
        Ok(None) => {
          log::warn!("MPV IPC socket closed while awaiting request_id={}", request_id);
          return Err(MpvError::NotConnected);
        }
        Err(_) => return Err(MpvError::NotConnected),
      };

      let Ok(text) = std::str::from_utf8(&line) else {
        continue;
      };
      let text = text.trim();
      if text.is_empty() {
        continue;
      }

      match MpvMessage::parse(text) {
        Ok(MpvMessage::Response(response)) if response.request_id == request_id => {
          return Ok(response);
        }
        Ok(MpvMessage::Response(response)) => {
          log::debug!(
            "Skipping reply for request_id={} while awaiting {}",
            response.request_id,
            request_id
          );
        }
        Ok(MpvMessage::Event(event)) => {
          log::trace!("Skipping MPV event {}", event.event);
        }
        Err(e) => {
          log::debug!("Skipping unparseable MPV line: {} - {}", e, text);
        }
      }
    }
  }
}
