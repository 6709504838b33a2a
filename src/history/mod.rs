//! Playback history with last-known positions, used for resume.

mod entry;
mod store;

pub use entry::{ContentType, HistoryEntry, LIVE_PROFILE};
pub use store::{HistoryError, HistoryStore, DEFAULT_MAX_ENTRIES};
