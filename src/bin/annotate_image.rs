//! annotate_image - run detection on one image and save an annotated copy.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use detection_bridge::{
    annotate_file, detect::open_backend, ui::Ui, ui::UiMode, AnnotateOptions, BackendKind,
    ClassNames, TrackingModel,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Detect objects in one image and save an annotated copy")]
struct Args {
    /// Image to run detection on.
    #[arg(long)]
    image: PathBuf,

    /// ONNX model weights.
    #[arg(long, env = "BRIDGE_WEIGHTS", default_value = "weights/best.onnx")]
    weights: PathBuf,

    /// Where to write the annotated image.
    #[arg(long, default_value = "output/annotated.jpg")]
    output: PathBuf,

    /// Network input size.
    #[arg(long, default_value_t = 640)]
    imgsz: u32,

    /// Minimum confidence.
    #[arg(long, default_value_t = 0.25)]
    conf: f32,

    /// Open a preview window after saving.
    #[arg(long)]
    show: bool,

    /// Class names file.
    #[arg(long, env = "BRIDGE_LABELS")]
    labels: Option<PathBuf>,

    /// TTF/OTF font for label text. Without it labels are drawn as colour bars only.
    #[arg(long)]
    font: Option<PathBuf>,

    /// Progress output style.
    #[arg(long, value_enum, default_value_t = UiMode::Auto)]
    ui: UiMode,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let options = AnnotateOptions {
        image: args.image,
        weights: args.weights,
        output: args.output,
        imgsz: args.imgsz,
        confidence: args.conf,
        show: args.show,
        labels: args.labels,
        font: args.font,
    };
    let ui = Ui::detect(args.ui);

    match annotate_file(&options, &ui, load_model) {
        Ok(report) => println!(
            "Saved annotated image to: {} ({}x{})",
            report.output.display(),
            report.width,
            report.height
        ),
        Err(err) => {
            log::error!("{:#}", anyhow::Error::from(err));
            std::process::exit(1);
        }
    }
}

fn load_model(
    options: &AnnotateOptions,
) -> Result<TrackingModel<Box<dyn detection_bridge::DetectorBackend>>> {
    let names = match &options.labels {
        Some(path) => ClassNames::from_file(path)?,
        None => ClassNames::new(),
    };
    let backend = open_backend(BackendKind::Tract, &options.weights, 0.7)?;
    Ok(TrackingModel::new(backend, names))
}
