//! Tracker settings loaded from a TOML file.

use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

pub const DEFAULT_TRACKER: &str = "bytetrack";

/// `botsort` files are accepted and run with ByteTrack association; their appearance
/// and camera-motion options have no effect.
pub const SUPPORTED_TRACKERS: [&str; 2] = [DEFAULT_TRACKER, "botsort"];

const BOTSORT_ONLY_KEYS: [&str; 5] = [
    "gmc_method",
    "proximity_thresh",
    "appearance_thresh",
    "with_reid",
    "model",
];

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TrackerSettings {
    pub tracker_type: String,
    /// Detections at or above this score take part in the first association.
    pub track_high_thresh: f32,
    /// Detections between this and `track_high_thresh` take part in the second association.
    pub track_low_thresh: f32,
    /// Minimum score for an unmatched detection to start a new track.
    pub new_track_thresh: f32,
    pub track_buffer: u32,
    pub match_thresh: f32,
    pub fuse_score: bool,
    pub frame_rate: u32,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            tracker_type: DEFAULT_TRACKER.to_string(),
            track_high_thresh: 0.25,
            track_low_thresh: 0.1,
            new_track_thresh: 0.25,
            track_buffer: 30,
            match_thresh: 0.8,
            fuse_score: true,
            frame_rate: 30,
        }
    }
}

impl TrackerSettings {
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read tracker config {}", path.display()))?;
        let settings: TrackerSettings = toml::from_str(&raw)
            .with_context(|| format!("failed to parse tracker config {}", path.display()))?;
        settings.validate()?;
        let ignored = ignored_keys(&raw);
        if !ignored.is_empty() {
            log::warn!(
                "{}: ignoring {} (ReID and camera-motion compensation are not available)",
                path.display(),
                ignored.join(", ")
            );
        }
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if !SUPPORTED_TRACKERS.contains(&self.tracker_type.as_str()) {
            return Err(anyhow!(
                "unsupported tracker_type {:?}, expected one of {:?}",
                self.tracker_type,
                SUPPORTED_TRACKERS
            ));
        }
        for (name, value) in [
            ("track_high_thresh", self.track_high_thresh),
            ("track_low_thresh", self.track_low_thresh),
            ("new_track_thresh", self.new_track_thresh),
            ("match_thresh", self.match_thresh),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(anyhow!("{} must be within [0, 1], got {}", name, value));
            }
        }
        if self.frame_rate == 0 {
            return Err(anyhow!("frame_rate must be > 0"));
        }
        Ok(())
    }

    /// Frames a lost track is kept before removal.
    pub fn max_time_lost(&self) -> u32 {
        (self.frame_rate as f32 / 30.0 * self.track_buffer as f32) as u32
    }
}

/// BoT-SORT options present in a settings file that the tracker does not use.
fn ignored_keys(raw: &str) -> Vec<&'static str> {
    match raw.parse::<toml::Table>() {
        Ok(table) => BOTSORT_ONLY_KEYS
            .into_iter()
            .filter(|key| table.contains_key(*key))
            .collect(),
        Err(_) => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "tracker_type = \"bytetrack\"\ntrack_buffer = 60").unwrap();
        let settings = TrackerSettings::from_file(file.path()).unwrap();
        assert_eq!(settings.track_buffer, 60);
        assert_eq!(settings.match_thresh, 0.8);
        assert_eq!(settings.max_time_lost(), 60);
    }

    #[test]
    fn other_tracker_types_are_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "tracker_type = \"deepsort\"").unwrap();
        let err = TrackerSettings::from_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("deepsort"));
    }

    #[test]
    fn botsort_files_load_with_reid_options_ignored() {
        let raw = "tracker_type = \"botsort\"\ntrack_buffer = 45\ngmc_method = \"sparseOptFlow\"\nwith_reid = false\nproximity_thresh = 0.5\n";
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", raw).unwrap();
        let settings = TrackerSettings::from_file(file.path()).unwrap();
        assert_eq!(settings.tracker_type, "botsort");
        assert_eq!(settings.track_buffer, 45);
        assert_eq!(
            ignored_keys(raw),
            vec!["gmc_method", "proximity_thresh", "with_reid"]
        );
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(TrackerSettings::from_file(Path::new("no/such/tracker.toml")).is_err());
    }
}
