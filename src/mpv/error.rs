//! MPV error types.

use thiserror::Error;

/// Errors surfaced by MPV commands.
///
/// Malformed or unrelated lines on the socket are never errors; the
/// correlator skips them.
#[derive(Debug, Error)]
pub enum MpvError {
  /// The socket is unavailable; a later command may reconnect.
  #[error("mpv not connected")]
  NotConnected,

  /// No matching response arrived before the command deadline.
  #[error("mpv command timed out")]
  Timeout,

  /// The player answered with an error status.
  #[error("mpv command failed: {0}")]
  CommandFailed(String),

  #[error("Failed to encode mpv command: {0}")]
  Encode(#[from] serde_json::Error),
}

/// Coarse category a caller can map onto its own status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
  /// Player unreachable or unresponsive.
  Unavailable,
  /// The player rejected the request's arguments.
  Validation,
  /// The named property or resource does not exist.
  NotFound,
}

impl ErrorClass {
  /// HTTP status a routing layer reports for this class.
  pub fn http_status(self) -> u16 {
    match self {
      ErrorClass::Unavailable => 503,
      ErrorClass::Validation => 422,
      ErrorClass::NotFound => 404,
    }
  }
}

impl MpvError {
  pub fn class(&self) -> ErrorClass {
    match self {
      MpvError::NotConnected | MpvError::Timeout => ErrorClass::Unavailable,
      MpvError::Encode(_) => ErrorClass::Validation,
      MpvError::CommandFailed(reason) => match reason.as_str() {
        "property not found" => ErrorClass::NotFound,
        "invalid parameter" | "unsupported format" | "error running command" => {
          ErrorClass::Validation
        }
        _ => ErrorClass::Unavailable,
      },
    }
  }

  /// Whether retrying the same command later may succeed.
  pub fn is_transient(&self) -> bool {
    matches!(self, MpvError::NotConnected | MpvError::Timeout)
  }
}
