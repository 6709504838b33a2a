//! MPV JSON IPC protocol types.
//!
//! Reference: https://mpv.io/manual/master/#json-ipc

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Command sent to MPV via IPC.
///
/// The request ID is assigned by the correlator right before the command is
/// written, so builders leave it at zero.
#[derive(Debug, Clone, Serialize)]
pub struct MpvCommand {
  pub command: Vec<Value>,
  pub request_id: i64,
}

impl MpvCommand {
  /// Create a command from a verb and its arguments.
  pub fn new(verb: &str, args: Vec<Value>) -> Self {
    let mut command = Vec::with_capacity(args.len() + 1);
    command.push(Value::from(verb));
    command.extend(args);
    Self {
      command,
      request_id: 0,
    }
  }

  /// Tag the command with a request ID.
  pub fn with_request_id(mut self, request_id: i64) -> Self {
    self.request_id = request_id;
    self
  }

  /// The verb (first element of the command array).
  pub fn verb(&self) -> Option<&str> {
    self.command.first().and_then(Value::as_str)
  }

  /// Replace the current file.
  pub fn loadfile(url: &str) -> Self {
    Self::new("loadfile", vec![url.into(), "replace".into()])
  }

  /// Seek relative to the current position.
  pub fn seek_relative(seconds: f64) -> Self {
    Self::new("seek", vec![seconds.into(), "relative".into()])
  }

  pub fn stop() -> Self {
    Self::new("stop", Vec::new())
  }

  /// Get a property value.
  pub fn get_property(name: &str) -> Self {
    Self::new("get_property", vec![name.into()])
  }

  /// Set a property to an arbitrary JSON value.
  pub fn set_property(name: &str, value: Value) -> Self {
    Self::new("set_property", vec![name.into(), value])
  }

  /// Serialize as a single newline-terminated line.
  pub fn to_line(&self) -> Result<Vec<u8>, serde_json::Error> {
    let mut line = serde_json::to_vec(self)?;
    line.push(b'\n');
    Ok(line)
  }
}

/// Response from MPV for a command.
#[derive(Debug, Clone, Deserialize)]
pub struct MpvResponse {
  /// "success" or error message.
  #[serde(default)]
  pub error: String,
  /// Response data (command-specific).
  #[serde(default)]
  pub data: Option<Value>,
  /// Matching request ID.
  pub request_id: i64,
}

impl MpvResponse {
  /// Check if the command succeeded.
  pub fn is_success(&self) -> bool {
    self.error == "success"
  }
}

/// Event sent by MPV (property changes, playback events, etc.).
#[derive(Debug, Clone, Deserialize)]
pub struct MpvEvent {
  /// Event type (e.g., "property-change", "end-file", "idle").
  pub event: String,
  /// Observer ID for property-change events.
  pub id: Option<i64>,
  /// Property name for property-change events.
  pub name: Option<String>,
  /// Event data.
  pub data: Option<Value>,
  /// Reason for end-file events (e.g., "eof", "stop", "quit", "error").
  pub reason: Option<String>,
}

/// Typed property values from MPV.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
  Bool(bool),
  Number(f64),
  String(String),
  /// Arrays and objects kept as their JSON text.
  Json(String),
  Null,
}

impl PropertyValue {
  pub fn as_bool(&self) -> Option<bool> {
    match self {
      PropertyValue::Bool(b) => Some(*b),
      _ => None,
    }
  }

  pub fn as_f64(&self) -> Option<f64> {
    match self {
      PropertyValue::Number(n) => Some(*n),
      _ => None,
    }
  }

  pub fn as_str(&self) -> Option<&str> {
    match self {
      PropertyValue::String(s) => Some(s),
      _ => None,
    }
  }

  pub fn is_null(&self) -> bool {
    matches!(self, PropertyValue::Null)
  }
}

impl From<Value> for PropertyValue {
  fn from(value: Value) -> Self {
    match value {
      Value::Bool(b) => PropertyValue::Bool(b),
      Value::Number(n) => PropertyValue::Number(n.as_f64().unwrap_or(0.0)),
      Value::String(s) => PropertyValue::String(s),
      Value::Array(_) | Value::Object(_) => PropertyValue::Json(value.to_string()),
      Value::Null => PropertyValue::Null,
    }
  }
}

impl From<Option<Value>> for PropertyValue {
  fn from(value: Option<Value>) -> Self {
    value.map(PropertyValue::from).unwrap_or(PropertyValue::Null)
  }
}

/// Message received from MPV IPC (either response or event).
#[derive(Debug, Clone)]
pub enum MpvMessage {
  Response(MpvResponse),
  Event(MpvEvent),
}

impl MpvMessage {
  /// Parse a JSON line from MPV.
  ///
  /// Anything carrying a `request_id` is a reply, everything else must be
  /// an event object.
  pub fn parse(line: &str) -> Result<Self, serde_json::Error> {
    let value: Value = serde_json::from_str(line)?;
    if value.get("request_id").is_some_and(|id| !id.is_null()) {
      Ok(MpvMessage::Response(serde_json::from_value(value)?))
    } else {
      Ok(MpvMessage::Event(serde_json::from_value(value)?))
    }
  }
}
