use anyhow::Result;
use image::DynamicImage;

use crate::detect::result::Detection;

/// Detector backend trait.
///
/// Backends own the inference engine and nothing else. Tracking state lives in the
/// model session that drives the backend, so a backend may be reused between the
/// tracking and plain-detection paths.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a decoded image.
    ///
    /// Returned boxes are in source-image pixel coordinates and every detection has
    /// `confidence >= confidence`. `size` is the square network input resolution.
    fn detect(
        &mut self,
        image: &DynamicImage,
        confidence: f32,
        size: u32,
    ) -> Result<Vec<Detection>>;

    /// Optional warm-up hook, run once at startup for the configured input size.
    fn warm_up(&mut self, _size: u32) -> Result<()> {
        Ok(())
    }
}

impl DetectorBackend for Box<dyn DetectorBackend> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn detect(
        &mut self,
        image: &DynamicImage,
        confidence: f32,
        size: u32,
    ) -> Result<Vec<Detection>> {
        (**self).detect(image, confidence, size)
    }

    fn warm_up(&mut self, size: u32) -> Result<()> {
        (**self).warm_up(size)
    }
}
