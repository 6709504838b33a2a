//! MPV IPC module - controls an external MPV player via JSON IPC.
//!
//! Architecture:
//! - `transport.rs` - Socket lifecycle (Named Pipes on Windows, Unix Sockets on Linux/macOS)
//! - `correlator.rs` - One-at-a-time command/response matching by request ID
//! - `protocol.rs` - JSON command/response types and serialization
//! - `player.rs` - High-level playback controls and status snapshots

mod correlator;
mod error;
mod player;
mod protocol;
mod transport;

#[cfg(all(test, unix))]
pub(crate) mod testing;

pub use correlator::Correlator;
pub use error::{ErrorClass, MpvError};
pub use player::{clamp_volume, MpvPlayer, PlaybackState, StatusSnapshot};
pub use protocol::{MpvCommand, MpvEvent, MpvMessage, MpvResponse, PropertyValue};
pub use transport::{ConnectionState, MpvTimeouts, Transport};
