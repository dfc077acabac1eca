//! frame_server - stdio detection and tracking bridge
//!
//! Reads `{"clientId", "len"}` header lines plus raw frame bytes from stdin and
//! answers each with one JSON line of boxes on stdout. Logs go to stderr.

use anyhow::{Context, Result};
use std::io;

use detection_bridge::{
    config::resolve_path, detect::open_backend, ClassNames, FrameServer, InferencePolicy,
    ServerConfig, TrackingModel,
};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(err) = run() {
        log::error!("{:#}", err);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cfg = ServerConfig::load().context("failed to load configuration")?;

    let names = match &cfg.model.labels {
        Some(path) => ClassNames::from_file(path)?,
        None => ClassNames::new(),
    };
    let backend = open_backend(cfg.backend, &cfg.model.weights, cfg.model.iou)
        .context("failed to load model")?;
    log::info!(
        "{} backend ready ({} classes named, weights {})",
        backend.name(),
        names.len(),
        cfg.model.weights.display()
    );

    let mut model = TrackingModel::new(backend, names);
    model
        .warm_up(cfg.model.imgsz)
        .context("failed to prepare model")?;

    let policy = InferencePolicy {
        confidence: cfg.model.confidence,
        imgsz: cfg.model.imgsz,
        tracker_config: cfg.tracker_config.clone(),
    };
    // Relative paths resolve against the working directory, not the binary.
    let tracker_path = resolve_path(&policy.tracker_config);
    if policy.tracker_config.is_file() {
        log::info!("tracker config {}", tracker_path.display());
    } else {
        log::info!(
            "tracker config {} not found, using built-in ByteTrack defaults",
            tracker_path.display()
        );
    }

    let mut server = FrameServer::new(model, policy, cfg.max_frame_bytes);
    let stdin = io::stdin();
    let stdout = io::stdout();
    server.run(stdin.lock(), stdout.lock())?;
    Ok(())
}
