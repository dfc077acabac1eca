//! Single-image detection harness: detect, draw, save.

use std::fs;
use std::path::{Path, PathBuf};

use ab_glyph::{FontVec, PxScale};
use anyhow::{anyhow, Context};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use thiserror::Error;

use crate::detect::{ClassNames, DetectionResult};
use crate::model::DetectionModel;
use crate::ui::Ui;

/// Per-class box colours, cycled by class id.
const PALETTE: [[u8; 3]; 10] = [
    [255, 56, 56],
    [255, 157, 151],
    [255, 112, 31],
    [255, 178, 29],
    [207, 210, 49],
    [72, 249, 10],
    [26, 147, 52],
    [0, 212, 187],
    [52, 69, 147],
    [203, 56, 255],
];
const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const BOX_THICKNESS: i32 = 2;
const LABEL_PAD: u32 = 2;
/// Label cell size used when no font is available.
const FALLBACK_GLYPH: (u32, u32) = (7, 13);

#[derive(Debug, Clone)]
pub struct AnnotateOptions {
    pub image: PathBuf,
    pub weights: PathBuf,
    pub output: PathBuf,
    pub imgsz: u32,
    pub confidence: f32,
    pub show: bool,
    pub labels: Option<PathBuf>,
    pub font: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationReport {
    pub output: PathBuf,
    pub width: u32,
    pub height: u32,
    pub detections: usize,
}

#[derive(Debug, Error)]
pub enum AnnotateError {
    #[error("image not found: {0}")]
    ImageNotFound(PathBuf),
    #[error("weights not found: {0}")]
    WeightsNotFound(PathBuf),
    #[error("could not read image {path}: {source}")]
    UnreadableImage {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Run detection on `options.image` and write the annotated copy.
///
/// Paths are checked before anything is loaded: a missing image fails without
/// touching the weights or the output location. `load_model` is only called once
/// the image has decoded.
pub fn annotate_file<M, F>(
    options: &AnnotateOptions,
    ui: &Ui,
    load_model: F,
) -> Result<AnnotationReport, AnnotateError>
where
    M: DetectionModel,
    F: FnOnce(&AnnotateOptions) -> anyhow::Result<M>,
{
    if !options.image.is_file() {
        return Err(AnnotateError::ImageNotFound(options.image.clone()));
    }
    if !options.weights.is_file() {
        return Err(AnnotateError::WeightsNotFound(options.weights.clone()));
    }
    let image = image::open(&options.image).map_err(|source| AnnotateError::UnreadableImage {
        path: options.image.clone(),
        source,
    })?;
    let font = options.font.as_deref().map(load_font).transpose()?;
    if font.is_none() {
        log::warn!("no font given: labels are drawn as colour bars without text (use --font)");
    }

    let mut model = {
        let _stage = ui.stage("Loading model");
        load_model(options)?
    };
    let results = {
        let _stage = ui.stage("Running detection");
        model.detect(&image, options.confidence, options.imgsz)?
    };

    let mut canvas = image.to_rgb8();
    let drawn = {
        let _stage = ui.stage("Drawing annotations");
        draw_detections(
            &mut canvas,
            &results,
            model.class_names(),
            font.as_ref(),
            options.confidence,
        )
    };

    {
        let _stage = ui.stage("Saving image");
        save(&canvas, &options.output)?;
    }
    log::info!(
        "{} detections written to {}",
        drawn,
        options.output.display()
    );

    if options.show {
        show(&canvas);
    }

    Ok(AnnotationReport {
        output: options.output.clone(),
        width: canvas.width(),
        height: canvas.height(),
        detections: drawn,
    })
}

/// Draw every detection at or above `confidence`. Returns how many were drawn.
pub fn draw_detections(
    canvas: &mut RgbImage,
    results: &[DetectionResult],
    names: &ClassNames,
    font: Option<&FontVec>,
    confidence: f32,
) -> usize {
    let (width, height) = canvas.dimensions();
    if width == 0 || height == 0 {
        return 0;
    }
    let scale = PxScale::from((width.min(height) as f32 * 0.03).clamp(12.0, 32.0));
    let mut drawn = 0;

    for det in results.iter().flat_map(|r| r.detections.iter()) {
        if det.confidence < confidence {
            continue;
        }
        let color = Rgb(PALETTE[det.class_id % PALETTE.len()]);
        let x1 = det.x1.min(det.x2).max(0.0) as i32;
        let y1 = det.y1.min(det.y2).max(0.0) as i32;
        let x2 = det.x1.max(det.x2) as i32;
        let y2 = det.y1.max(det.y2) as i32;
        for inset in 0..BOX_THICKNESS {
            let w = (x2 - x1 - 2 * inset).max(1) as u32;
            let h = (y2 - y1 - 2 * inset).max(1) as u32;
            draw_hollow_rect_mut(canvas, Rect::at(x1 + inset, y1 + inset).of_size(w, h), color);
        }

        let label = format!("{} {:.2}", names.name(det.class_id), det.confidence);
        let (text_w, text_h) = match font {
            Some(font) => text_size(scale, font, &label),
            None => (
                FALLBACK_GLYPH.0 * label.chars().count() as u32,
                FALLBACK_GLYPH.1,
            ),
        };
        let label_w = text_w + 2 * LABEL_PAD;
        let label_h = text_h + 2 * LABEL_PAD;
        // Above the box when there is room, otherwise just inside its top edge.
        let label_y = if y1 >= label_h as i32 {
            y1 - label_h as i32
        } else {
            y1
        };
        draw_filled_rect_mut(
            canvas,
            Rect::at(x1, label_y).of_size(label_w.max(1), label_h.max(1)),
            color,
        );
        if let Some(font) = font {
            draw_text_mut(
                canvas,
                TEXT_COLOR,
                x1 + LABEL_PAD as i32,
                label_y + LABEL_PAD as i32,
                scale,
                font,
                &label,
            );
        }
        drawn += 1;
    }
    drawn
}

fn load_font(path: &Path) -> anyhow::Result<FontVec> {
    let bytes =
        fs::read(path).with_context(|| format!("failed to read font {}", path.display()))?;
    FontVec::try_from_vec(bytes).map_err(|e| anyhow!("invalid font {}: {}", path.display(), e))
}

fn save(canvas: &RgbImage, output: &Path) -> anyhow::Result<()> {
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    canvas
        .save(output)
        .with_context(|| format!("failed to write {}", output.display()))
}

#[cfg(feature = "preview")]
fn show(canvas: &RgbImage) {
    if let Err(err) = crate::preview::show("annotate_image", canvas) {
        log::warn!("preview unavailable: {:#}", err);
    }
}

#[cfg(not(feature = "preview"))]
fn show(_canvas: &RgbImage) {
    log::warn!("--show ignored: built without the `preview` feature");
}
