//! Model session: a detector backend, its class names, and the tracker state that
//! persists between frames.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use image::{DynamicImage, GenericImageView};

use crate::detect::{ClassNames, Detection, DetectionResult, DetectorBackend};
use crate::track::{ByteTracker, TrackerSettings};

/// Detection and tracking capability consumed by the frame server and the annotate
/// harness.
pub trait DetectionModel {
    /// Plain detection. Results never carry track IDs.
    fn detect(
        &mut self,
        image: &DynamicImage,
        confidence: f32,
        size: u32,
    ) -> Result<Vec<DetectionResult>>;

    /// Detection followed by a tracker update. `tracker_config` selects a settings
    /// file; `None` uses the built-in ByteTrack defaults.
    fn track(
        &mut self,
        image: &DynamicImage,
        confidence: f32,
        size: u32,
        tracker_config: Option<&Path>,
    ) -> Result<Vec<DetectionResult>>;

    fn class_names(&self) -> &ClassNames;
}

struct ActiveTracker {
    source: Option<PathBuf>,
    tracker: ByteTracker,
}

/// [`DetectionModel`] over any [`DetectorBackend`].
///
/// The tracker is created on the first `track` call and kept for as long as later calls
/// ask for the same settings source. Asking for a different source starts a fresh
/// tracker, so track IDs restart from 1.
pub struct TrackingModel<B> {
    backend: B,
    names: ClassNames,
    tracker: Option<ActiveTracker>,
}

impl<B: DetectorBackend> TrackingModel<B> {
    pub fn new(backend: B, names: ClassNames) -> Self {
        Self {
            backend,
            names,
            tracker: None,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn warm_up(&mut self, size: u32) -> Result<()> {
        self.backend.warm_up(size)
    }

    fn tracker_for(&mut self, source: Option<&Path>) -> Result<&mut ByteTracker> {
        let reusable = matches!(
            &self.tracker,
            Some(active) if active.source.as_deref() == source
        );
        if !reusable {
            let settings = match source {
                Some(path) => TrackerSettings::from_file(path)?,
                None => TrackerSettings::default(),
            };
            log::info!(
                "starting tracker from {}",
                source
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "built-in defaults".to_string())
            );
            self.tracker = Some(ActiveTracker {
                source: source.map(Path::to_path_buf),
                tracker: ByteTracker::new(settings),
            });
        }
        self.tracker
            .as_mut()
            .map(|active| &mut active.tracker)
            .ok_or_else(|| anyhow!("tracker unavailable"))
    }
}

impl<B: DetectorBackend> DetectionModel for TrackingModel<B> {
    fn detect(
        &mut self,
        image: &DynamicImage,
        confidence: f32,
        size: u32,
    ) -> Result<Vec<DetectionResult>> {
        let (width, height) = image.dimensions();
        let detections = self.backend.detect(image, confidence, size)?;
        Ok(vec![DetectionResult::new(detections, width, height)])
    }

    fn track(
        &mut self,
        image: &DynamicImage,
        confidence: f32,
        size: u32,
        tracker_config: Option<&Path>,
    ) -> Result<Vec<DetectionResult>> {
        let (width, height) = image.dimensions();
        // Resolve settings before running inference so a bad config costs nothing.
        self.tracker_for(tracker_config)?;
        let detections = self.backend.detect(image, confidence, size)?;
        let tracker = self.tracker_for(tracker_config)?;
        let tracked = tracker
            .update(&detections)
            .into_iter()
            .map(|det| clamp_to_image(det, width, height))
            .collect();
        Ok(vec![DetectionResult::new(tracked, width, height)])
    }

    fn class_names(&self) -> &ClassNames {
        &self.names
    }
}

fn clamp_to_image(det: Detection, width: u32, height: u32) -> Detection {
    let (w, h) = (width as f32, height as f32);
    Detection {
        x1: det.x1.clamp(0.0, w),
        y1: det.y1.clamp(0.0, h),
        x2: det.x2.clamp(0.0, w),
        y2: det.y2.clamp(0.0, h),
        ..det
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::StubBackend;
    use image::{Rgb, RgbImage};
    use std::io::Write;

    fn frame() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(320, 240, Rgb([0, 0, 0])))
    }

    fn model() -> TrackingModel<StubBackend> {
        let backend = StubBackend::with_detections(vec![
            Detection::new(10.0, 10.0, 60.0, 120.0, 0.9, 0),
            Detection::new(150.0, 20.0, 200.0, 140.0, 0.05, 1),
        ]);
        TrackingModel::new(backend, ClassNames::from_list(["person", "car"]))
    }

    #[test]
    fn detect_has_no_track_ids() {
        let mut model = model();
        let results = model.detect(&frame(), 0.25, 640).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].detections.len(), 1);
        assert_eq!(results[0].detections[0].track_id, None);
        assert_eq!((results[0].width, results[0].height), (320, 240));
    }

    #[test]
    fn track_ids_persist_for_same_source() {
        let mut model = model();
        let first = model.track(&frame(), 0.25, 640, None).unwrap();
        let second = model.track(&frame(), 0.25, 640, None).unwrap();
        assert_eq!(first[0].detections[0].track_id, Some(1));
        assert_eq!(second[0].detections[0].track_id, Some(1));
    }

    #[test]
    fn changing_source_starts_new_tracker() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "tracker_type = \"bytetrack\"").unwrap();

        let mut model = model();
        model.track(&frame(), 0.25, 640, None).unwrap();
        let results = model.track(&frame(), 0.25, 640, Some(file.path())).unwrap();
        assert_eq!(results[0].detections[0].track_id, Some(1));
    }

    #[test]
    fn bad_tracker_config_skips_inference() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "tracker_type = \"deepsort\"").unwrap();

        let mut model = model();
        assert!(model.track(&frame(), 0.25, 640, Some(file.path())).is_err());
        assert_eq!(model.backend().calls(), 0);
    }
}
