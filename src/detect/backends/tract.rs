#![cfg(feature = "backend-tract")]

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use image::{imageops::FilterType, DynamicImage, GenericImageView, Rgb, RgbImage};
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{non_max_suppression, Detection};

type Plan = RunnableModel<TypedFact, Box<dyn TypedOp>, TypedModel>;

const STRIDE: u32 = 32;
const PAD_VALUE: u8 = 114;
const BOX_CHANNELS: usize = 4;
const MAX_DETECTIONS: usize = 300;
const DEFAULT_IOU_THRESHOLD: f32 = 0.7;

/// Tract-based backend for ONNX exports of YOLO detectors.
///
/// Expects a single `[1, 4 + classes, anchors]` output with `cx, cy, w, h` in
/// network-input pixels followed by per-class scores. One optimized plan is built
/// per input size and kept for the life of the backend.
pub struct TractBackend {
    model_path: PathBuf,
    plans: HashMap<u32, Plan>,
    iou_threshold: f32,
}

impl TractBackend {
    /// Point the backend at an ONNX model on disk. Plans are built lazily (or by
    /// `warm_up`), so a bad model surfaces on the first build.
    pub fn new<P: AsRef<Path>>(model_path: P) -> Result<Self> {
        let model_path = model_path.as_ref();
        if !model_path.is_file() {
            return Err(anyhow!("weights not found: {}", model_path.display()));
        }
        Ok(Self {
            model_path: model_path.to_path_buf(),
            plans: HashMap::new(),
            iou_threshold: DEFAULT_IOU_THRESHOLD,
        })
    }

    /// Override the NMS IoU threshold.
    pub fn with_iou_threshold(mut self, threshold: f32) -> Self {
        self.iou_threshold = threshold;
        self
    }

    fn plan(&mut self, size: u32) -> Result<&Plan> {
        match self.plans.entry(size) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let plan = build_plan(&self.model_path, size)?;
                log::info!(
                    "built inference plan for {} at {}x{}",
                    self.model_path.display(),
                    size,
                    size
                );
                Ok(entry.insert(plan))
            }
        }
    }

    fn decode(
        &self,
        outputs: TVec<TValue>,
        letterbox: &Letterbox,
        confidence: f32,
    ) -> Result<Vec<Detection>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        if view.ndim() != 3 || view.shape()[0] != 1 {
            return Err(anyhow!(
                "unexpected output shape {:?}, expected [1, 4 + classes, anchors]",
                view.shape()
            ));
        }
        let preds = view
            .index_axis(tract_ndarray::Axis(0), 0)
            .into_dimensionality::<tract_ndarray::Ix2>()
            .context("output is not two-dimensional after batch")?;
        let (channels, anchors) = preds.dim();
        if channels <= BOX_CHANNELS {
            return Err(anyhow!("output has {} channels, no class scores", channels));
        }

        let mut detections = Vec::new();
        for anchor in 0..anchors {
            let (class_id, score) = (BOX_CHANNELS..channels)
                .map(|c| (c - BOX_CHANNELS, preds[[c, anchor]]))
                .fold((0, f32::NEG_INFINITY), |best, cur| {
                    if cur.1 > best.1 {
                        cur
                    } else {
                        best
                    }
                });
            if !score.is_finite() || score < confidence {
                continue;
            }

            let cx = preds[[0, anchor]];
            let cy = preds[[1, anchor]];
            let w = preds[[2, anchor]];
            let h = preds[[3, anchor]];
            let (x1, y1) = letterbox.to_source(cx - w / 2.0, cy - h / 2.0);
            let (x2, y2) = letterbox.to_source(cx + w / 2.0, cy + h / 2.0);
            detections.push(Detection::new(x1, y1, x2, y2, score.min(1.0), class_id));
        }

        Ok(non_max_suppression(
            detections,
            self.iou_threshold,
            MAX_DETECTIONS,
        ))
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(
        &mut self,
        image: &DynamicImage,
        confidence: f32,
        size: u32,
    ) -> Result<Vec<Detection>> {
        let size = stride_aligned(size);
        let (input, geometry) = letterbox(image, size)?;
        let outputs = self
            .plan(size)?
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let detections = self.decode(outputs, &geometry, confidence)?;
        log::debug!(
            "{} detections at conf>={:.2} ({}x{} source)",
            detections.len(),
            confidence,
            geometry.width,
            geometry.height
        );
        Ok(detections)
    }

    fn warm_up(&mut self, size: u32) -> Result<()> {
        self.plan(stride_aligned(size)).map(|_| ())
    }
}

fn build_plan(model_path: &Path, size: u32) -> Result<Plan> {
    let side = size as usize;
    tract_onnx::onnx()
        .model_for_path(model_path)
        .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
        .with_input_fact(
            0,
            InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, side, side)),
        )
        .context("failed to set input fact")?
        .into_optimized()
        .context("failed to optimize ONNX model")?
        .into_runnable()
        .context("failed to build runnable ONNX model")
}

/// Round an input size up to the network stride.
fn stride_aligned(size: u32) -> u32 {
    size.max(1).div_ceil(STRIDE) * STRIDE
}

/// Geometry of a letterboxed input, used to map boxes back to the source image.
#[derive(Clone, Copy, Debug)]
struct Letterbox {
    ratio: f32,
    pad_x: f32,
    pad_y: f32,
    width: u32,
    height: u32,
}

impl Letterbox {
    fn to_source(&self, x: f32, y: f32) -> (f32, f32) {
        (
            ((x - self.pad_x) / self.ratio).clamp(0.0, self.width as f32),
            ((y - self.pad_y) / self.ratio).clamp(0.0, self.height as f32),
        )
    }
}

fn letterbox(image: &DynamicImage, size: u32) -> Result<(Tensor, Letterbox)> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(anyhow!("image has zero dimension {}x{}", width, height));
    }
    let ratio = (size as f32 / width as f32).min(size as f32 / height as f32);
    let new_w = ((width as f32 * ratio).round() as u32).clamp(1, size);
    let new_h = ((height as f32 * ratio).round() as u32).clamp(1, size);
    let pad_x = (size - new_w) / 2;
    let pad_y = (size - new_h) / 2;

    let resized = image::imageops::resize(&image.to_rgb8(), new_w, new_h, FilterType::Triangle);
    let mut canvas = RgbImage::from_pixel(size, size, Rgb([PAD_VALUE; 3]));
    image::imageops::replace(&mut canvas, &resized, pad_x as i64, pad_y as i64);

    let side = size as usize;
    let input = tract_ndarray::Array4::from_shape_fn((1, 3, side, side), |(_, c, y, x)| {
        canvas.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
    });

    Ok((
        input.into_tensor(),
        Letterbox {
            ratio,
            pad_x: pad_x as f32,
            pad_y: pad_y as f32,
            width,
            height,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_round_up_to_stride() {
        assert_eq!(stride_aligned(640), 640);
        assert_eq!(stride_aligned(641), 672);
        assert_eq!(stride_aligned(0), 32);
    }

    #[test]
    fn letterbox_centers_wide_images() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(128, 64, Rgb([255, 255, 255])));
        let (tensor, geometry) = letterbox(&image, 64).unwrap();
        assert_eq!(tensor.shape(), &[1, 3, 64, 64]);
        assert_eq!(geometry.pad_x, 0.0);
        assert_eq!(geometry.pad_y, 16.0);
        assert!((geometry.ratio - 0.5).abs() < 1e-6);

        let (x, y) = geometry.to_source(32.0, 32.0);
        assert!((x - 64.0).abs() < 1e-4);
        assert!((y - 32.0).abs() < 1e-4);

        let (x, y) = geometry.to_source(-10.0, 100.0);
        assert_eq!((x, y), (0.0, 64.0));
    }

    #[test]
    fn missing_model_is_rejected() {
        assert!(TractBackend::new("does/not/exist.onnx").is_err());
    }
}
