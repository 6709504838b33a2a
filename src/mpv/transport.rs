//! Persistent duplex connection to the MPV control socket.
//!
//! Handles platform-specific socket/pipe connections, loss detection and
//! lazy reconnection. Framing is newline-delimited.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use parking_lot::RwLock;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::time::Instant;

/// Connection lifecycle as seen from outside the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
  Disconnected,
  Connecting,
  Connected,
}

/// Timing knobs for the IPC connection and command round trips.
#[derive(Debug, Clone, Copy)]
pub struct MpvTimeouts {
  /// Overall deadline for the boot-time connect loop.
  pub connect: Duration,
  /// Pause between attempts in the boot-time connect loop.
  pub connect_retry_interval: Duration,
  /// Single-attempt deadline for lazy reconnects.
  pub reconnect: Duration,
  /// Deadline for a command's matching response.
  pub command: Duration,
}

impl Default for MpvTimeouts {
  fn default() -> Self {
    Self {
      connect: Duration::from_secs(5),
      connect_retry_interval: Duration::from_millis(500),
      reconnect: Duration::from_secs(1),
      command: Duration::from_secs(3),
    }
  }
}

type IpcReader = BufReader<Box<dyn AsyncRead + Send + Unpin>>;
type IpcWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// An open socket handle.
struct Connection {
  reader: IpcReader,
  writer: IpcWriter,
  /// Set once a read hit EOF or any I/O on the handle failed.
  closing: bool,
}

impl Connection {
  /// Non-blocking check of the read side, only run while no command is in
  /// flight. Complete lines already waiting are unsolicited events and are
  /// discarded, so an EOF queued behind them is still seen. Returns whether
  /// the handle is usable and how many bytes were dropped.
  fn probe(&mut self) -> (bool, usize) {
    if self.closing {
      return (false, 0);
    }

    let mut discarded = 0;
    loop {
      let step = match self.reader.fill_buf().now_or_never() {
        None => Some(0),
        Some(Ok(buf)) if buf.is_empty() => None,
        Some(Ok(buf)) => Some(buf.iter().rposition(|&b| b == b'\n').map_or(0, |i| i + 1)),
        Some(Err(_)) => None,
      };
      match step {
        Some(0) => return (true, discarded),
        Some(n) => {
          self.reader.consume(n);
          discarded += n;
        }
        None => {
          self.closing = true;
          return (false, discarded);
        }
      }
    }
  }
}

/// Owner of the single connection to the player.
pub struct Transport {
  path: String,
  timeouts: MpvTimeouts,
  conn: Option<Connection>,
  /// Bytes of a line whose read was interrupted by a timeout.
  line: Vec<u8>,
  state: Arc<RwLock<ConnectionState>>,
}

impl Transport {
  pub fn new(path: impl Into<String>, timeouts: MpvTimeouts) -> Self {
    Self {
      path: path.into(),
      timeouts,
      conn: None,
      line: Vec::new(),
      state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
    }
  }

  pub fn path(&self) -> &str {
    &self.path
  }

  /// Shared view of the connection state, readable without the transport.
  pub fn state_handle(&self) -> Arc<RwLock<ConnectionState>> {
    self.state.clone()
  }

  pub fn state(&self) -> ConnectionState {
    *self.state.read()
  }

  fn set_state(&self, state: ConnectionState) {
    *self.state.write() = state;
  }

  /// Try to open the socket repeatedly until the connect deadline elapses.
  ///
  /// A missing player is not an error: on expiry the transport stays
  /// disconnected and later commands reconnect lazily.
  pub async fn connect(&mut self) -> bool {
    self.drop_connection();
    self.set_state(ConnectionState::Connecting);

    let deadline = Instant::now() + self.timeouts.connect;
    let mut attempt: u32 = 0;

    loop {
      attempt += 1;
      let remaining = deadline.saturating_duration_since(Instant::now());
      match tokio::time::timeout(remaining, open(&self.path)).await {
        Ok(Ok(conn)) => {
          self.attach(conn);
          log::info!("Connected to MPV IPC at {}", self.path);
          return true;
        }
        Ok(Err(e)) => {
          log::debug!("IPC connect attempt {} failed: {}", attempt, e);
        }
        Err(_) => break,
      }

      if Instant::now() + self.timeouts.connect_retry_interval >= deadline {
        break;
      }
      tokio::time::sleep(self.timeouts.connect_retry_interval).await;
    }

    self.set_state(ConnectionState::Disconnected);
    log::warn!(
      "MPV socket {} not available, will retry on each command",
      self.path
    );
    false
  }

  /// Return true if a usable handle exists, otherwise make exactly one fast
  /// connection attempt.
  pub async fn ensure_connected(&mut self) -> bool {
    if let Some(conn) = self.conn.as_mut() {
      let (alive, discarded) = conn.probe();
      if discarded > 0 {
        log::trace!("Discarded {} bytes of unread MPV events", discarded);
        self.line.clear();
      }
      if alive {
        return true;
      }
      log::info!("MPV IPC connection lost, reconnecting");
    }

    self.drop_connection();
    self.set_state(ConnectionState::Connecting);

    match tokio::time::timeout(self.timeouts.reconnect, open(&self.path)).await {
      Ok(Ok(conn)) => {
        self.attach(conn);
        log::info!("Reconnected to MPV IPC at {}", self.path);
        true
      }
      Ok(Err(e)) => {
        log::debug!("MPV reconnect failed: {}", e);
        self.set_state(ConnectionState::Disconnected);
        false
      }
      Err(_) => {
        log::debug!("MPV reconnect timed out after {:?}", self.timeouts.reconnect);
        self.set_state(ConnectionState::Disconnected);
        false
      }
    }
  }

  /// Close the handle. Safe to call repeatedly and on a broken socket.
  pub async fn disconnect(&mut self) {
    if let Some(mut conn) = self.conn.take() {
      if let Err(e) = conn.writer.shutdown().await {
        log::debug!("Ignoring error while closing MPV IPC: {}", e);
      }
      log::info!("MPV IPC connection closed");
    }
    self.line.clear();
    self.set_state(ConnectionState::Disconnected);
  }

  /// Write one line and flush it.
  pub async fn send_line(&mut self, line: &[u8]) -> io::Result<()> {
    let conn = self.conn.as_mut().ok_or_else(not_connected)?;
    let result = match conn.writer.write_all(line).await {
      Ok(()) => conn.writer.flush().await,
      Err(e) => Err(e),
    };

    if let Err(e) = &result {
      log::error!("MPV IPC write error: {}", e);
      conn.closing = true;
    }
    result
  }

  /// Read the next line without its terminator. `None` means EOF.
  ///
  /// Cancel safe: bytes of an interrupted read are kept and completed by the
  /// next call.
  pub async fn read_line(&mut self) -> io::Result<Option<Vec<u8>>> {
    let conn = self.conn.as_mut().ok_or_else(not_connected)?;

    match conn.reader.read_until(b'\n', &mut self.line).await {
      Ok(0) => {
        conn.closing = true;
        self.line.clear();
        Ok(None)
      }
      Ok(_) => {
        let mut line = std::mem::take(&mut self.line);
        if line.last() == Some(&b'\n') {
          line.pop();
        }
        if line.last() == Some(&b'\r') {
          line.pop();
        }
        Ok(Some(line))
      }
      Err(e) => {
        log::error!("MPV IPC read error: {}", e);
        conn.closing = true;
        Err(e)
      }
    }
  }

  fn attach(&mut self, conn: Connection) {
    self.conn = Some(conn);
    self.line.clear();
    self.set_state(ConnectionState::Connected);
  }

  fn drop_connection(&mut self) {
    self.conn = None;
    self.line.clear();
  }
}

fn not_connected() -> io::Error {
  io::Error::new(io::ErrorKind::NotConnected, "MPV IPC not connected")
}

#[cfg(windows)]
async fn open(path: &str) -> io::Result<Connection> {
  use tokio::net::windows::named_pipe::ClientOptions;

  let client = ClientOptions::new().open(path)?;
  let (reader, writer) = tokio::io::split(client);
  Ok(wrap(reader, writer))
}

#[cfg(not(windows))]
async fn open(path: &str) -> io::Result<Connection> {
  use tokio::net::UnixStream;

  let stream = UnixStream::connect(path).await?;
  let (reader, writer) = tokio::io::split(stream);
  Ok(wrap(reader, writer))
}

fn wrap<R, W>(reader: R, writer: W) -> Connection
where
  R: AsyncRead + Send + Unpin + 'static,
  W: AsyncWrite + Send + Unpin + 'static,
{
  let reader: Box<dyn AsyncRead + Send + Unpin> = Box::new(reader);
  Connection {
    reader: BufReader::new(reader),
    writer: Box::new(writer),
    closing: false,
  }
}

#[cfg(all(test, unix))]
mod tests {
  use super::*;
  use crate::mpv::testing::{fast_timeouts, FakeMpv};
  use tokio::net::UnixListener;

  #[tokio::test]
  async fn test_connect_and_exchange_line() {
    let fake = FakeMpv::start();
    let mut transport = Transport::new(fake.path(), fast_timeouts());

    assert!(transport.connect().await);
    assert_eq!(transport.state(), ConnectionState::Connected);

    transport
      .send_line(b"{\"command\":[\"echo\",\"hi\"],\"request_id\":1}\n")
      .await
      .unwrap();

    // The fake interleaves noise; eventually our reply shows up.
    let mut found = false;
    for _ in 0..10 {
      let line = transport.read_line().await.unwrap().unwrap();
      assert!(!line.ends_with(b"\n"));
      if String::from_utf8_lossy(&line).contains("\"request_id\":1") {
        found = true;
        break;
      }
    }
    assert!(found);
  }

  #[tokio::test]
  async fn test_connect_gives_up_after_deadline() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing.sock");
    let mut transport = Transport::new(path.to_string_lossy(), fast_timeouts());

    let started = std::time::Instant::now();
    assert!(!transport.connect().await);
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(transport.state(), ConnectionState::Disconnected);
  }

  #[tokio::test]
  async fn test_connect_waits_for_late_socket() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("late.sock");
    let bind_path = path.clone();

    let server = tokio::spawn(async move {
      tokio::time::sleep(Duration::from_millis(120)).await;
      let listener = UnixListener::bind(&bind_path).unwrap();
      let (_stream, _) = listener.accept().await.unwrap();
      tokio::time::sleep(Duration::from_millis(200)).await;
    });

    let mut transport = Transport::new(path.to_string_lossy(), fast_timeouts());
    assert!(transport.connect().await);
    server.await.unwrap();
  }

  #[tokio::test]
  async fn test_ensure_connected_detects_drop_and_reconnects() {
    let fake = FakeMpv::start();
    let mut transport = Transport::new(fake.path(), fast_timeouts());
    assert!(transport.connect().await);
    assert_eq!(fake.connection_count(), 1);

    transport
      .send_line(b"{\"command\":[\"quit\"],\"request_id\":1}\n")
      .await
      .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Drain whatever the fake wrote before hanging up.
    while let Ok(Some(_)) = transport.read_line().await {}

    assert!(transport.ensure_connected().await);
    assert_eq!(fake.connection_count(), 2);
  }

  #[tokio::test]
  async fn test_ensure_connected_sees_drop_behind_unread_lines() {
    let fake = FakeMpv::start();
    let mut transport = Transport::new(fake.path(), fast_timeouts());
    assert!(transport.connect().await);

    // Reply, noise and a shutdown event all stay unread before the hang-up.
    transport
      .send_line(b"{\"command\":[\"exit\"],\"request_id\":1}\n")
      .await
      .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(transport.ensure_connected().await);
    assert_eq!(fake.connection_count(), 2);
    assert_eq!(transport.state(), ConnectionState::Connected);
  }

  #[tokio::test]
  async fn test_ensure_connected_keeps_live_handle_with_pending_events() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("chatty.sock");
    let listener = UnixListener::bind(&path).unwrap();

    let server = tokio::spawn(async move {
      let (mut stream, _) = listener.accept().await.unwrap();
      stream
        .write_all(b"{\"event\":\"pause\"}\n{\"event\":\"unpause\"}\n")
        .await
        .unwrap();
      tokio::time::sleep(Duration::from_millis(300)).await;
      stream
        .write_all(b"{\"request_id\":7,\"error\":\"success\"}\n")
        .await
        .unwrap();
      tokio::time::sleep(Duration::from_millis(100)).await;
    });

    let mut transport = Transport::new(path.to_string_lossy(), fast_timeouts());
    assert!(transport.connect().await);
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Stale events are dropped; the connection itself stays up.
    assert!(transport.ensure_connected().await);
    let line = transport.read_line().await.unwrap().unwrap();
    assert_eq!(line, b"{\"request_id\":7,\"error\":\"success\"}".to_vec());
    server.await.unwrap();
  }

  #[tokio::test]
  async fn test_ensure_connected_single_attempt_when_player_gone() {
    let fake = FakeMpv::start();
    let mut transport = Transport::new(fake.path(), fast_timeouts());
    assert!(transport.connect().await);

    fake.shutdown();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let started = std::time::Instant::now();
    assert!(!transport.ensure_connected().await);
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(transport.state(), ConnectionState::Disconnected);
  }

  #[tokio::test]
  async fn test_disconnect_is_idempotent() {
    let fake = FakeMpv::start();
    let mut transport = Transport::new(fake.path(), fast_timeouts());
    assert!(transport.connect().await);

    transport.disconnect().await;
    transport.disconnect().await;
    assert_eq!(transport.state(), ConnectionState::Disconnected);
    assert!(transport.send_line(b"{}\n").await.is_err());
  }

  #[tokio::test]
  async fn test_partial_line_survives_cancelled_read() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("split.sock");
    let listener = UnixListener::bind(&path).unwrap();

    let server = tokio::spawn(async move {
      let (mut stream, _) = listener.accept().await.unwrap();
      stream.write_all(b"{\"request_id\":").await.unwrap();
      tokio::time::sleep(Duration::from_millis(150)).await;
      stream.write_all(b"5,\"error\":\"success\"}\n").await.unwrap();
      tokio::time::sleep(Duration::from_millis(100)).await;
    });

    let mut transport = Transport::new(path.to_string_lossy(), fast_timeouts());
    assert!(transport.connect().await);

    let first = tokio::time::timeout(Duration::from_millis(50), transport.read_line()).await;
    assert!(first.is_err());

    let line = transport.read_line().await.unwrap().unwrap();
    assert_eq!(line, b"{\"request_id\":5,\"error\":\"success\"}".to_vec());
    server.await.unwrap();
  }
}
