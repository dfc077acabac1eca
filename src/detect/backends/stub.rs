use anyhow::Result;
use image::{DynamicImage, GenericImageView};

use crate::detect::backend::DetectorBackend;
use crate::detect::result::Detection;

/// Stub backend for testing and for exercising the protocol without weights.
///
/// Returns a fixed set of detections, clipped to the image and filtered by the
/// requested confidence. With no detections configured it reports nothing.
#[derive(Clone, Debug, Default)]
pub struct StubBackend {
    detections: Vec<Detection>,
    calls: u64,
}

impl StubBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_detections(detections: Vec<Detection>) -> Self {
        Self {
            detections,
            calls: 0,
        }
    }

    /// Number of `detect` calls served.
    pub fn calls(&self) -> u64 {
        self.calls
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(
        &mut self,
        image: &DynamicImage,
        confidence: f32,
        _size: u32,
    ) -> Result<Vec<Detection>> {
        self.calls += 1;
        let (width, height) = image.dimensions();
        let (w, h) = (width as f32, height as f32);
        Ok(self
            .detections
            .iter()
            .filter(|det| det.confidence >= confidence)
            .map(|det| Detection {
                x1: det.x1.clamp(0.0, w),
                y1: det.y1.clamp(0.0, h),
                x2: det.x2.clamp(0.0, w),
                y2: det.y2.clamp(0.0, h),
                track_id: None,
                ..det.clone()
            })
            .collect())
    }
}
