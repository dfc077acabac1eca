//! ByteTrack tracking over detector output.

mod byte_tracker;
mod kalman;
mod matching;
mod rect;
mod settings;
mod strack;

pub use byte_tracker::ByteTracker;
pub use settings::{TrackerSettings, DEFAULT_TRACKER, SUPPORTED_TRACKERS};
