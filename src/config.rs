use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;

const DEFAULT_WEIGHTS: &str = "weights/best.onnx";
const DEFAULT_TRACKER_CONFIG: &str = "trackers/bytetrack.toml";
const DEFAULT_CONFIDENCE: f32 = 0.25;
const DEFAULT_IMGSZ: u32 = 640;
const DEFAULT_IOU: f32 = 0.7;
const DEFAULT_MAX_FRAME_BYTES: u64 = 64 * 1024 * 1024;

#[derive(Debug, Deserialize, Default)]
struct ServerConfigFile {
    backend: Option<String>,
    model: Option<ModelConfigFile>,
    tracker: Option<TrackerConfigFile>,
    max_frame_bytes: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct ModelConfigFile {
    weights: Option<PathBuf>,
    labels: Option<PathBuf>,
    confidence: Option<f32>,
    imgsz: Option<u32>,
    iou: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct TrackerConfigFile {
    config: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Tract,
    Stub,
}

impl FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "tract" => Ok(BackendKind::Tract),
            "stub" => Ok(BackendKind::Stub),
            other => Err(anyhow!("unknown backend {:?} (expected tract or stub)", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub backend: BackendKind,
    pub model: ModelSettings,
    /// Tracker settings file. When it does not exist the built-in tracker defaults apply.
    pub tracker_config: PathBuf,
    pub max_frame_bytes: u64,
}

#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub weights: PathBuf,
    pub labels: Option<PathBuf>,
    pub confidence: f32,
    pub imgsz: u32,
    pub iou: f32,
}

impl ServerConfig {
    /// Load from `$BRIDGE_CONFIG` (JSON, optional), then apply `BRIDGE_*` overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("BRIDGE_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: ServerConfigFile) -> Result<Self> {
        let backend = match file.backend.as_deref() {
            Some(name) => name.parse()?,
            None => BackendKind::Tract,
        };
        let model_file = file.model.unwrap_or_default();
        let model = ModelSettings {
            weights: model_file
                .weights
                .unwrap_or_else(|| PathBuf::from(DEFAULT_WEIGHTS)),
            labels: model_file.labels,
            confidence: model_file.confidence.unwrap_or(DEFAULT_CONFIDENCE),
            imgsz: model_file.imgsz.unwrap_or(DEFAULT_IMGSZ),
            iou: model_file.iou.unwrap_or(DEFAULT_IOU),
        };
        let tracker_config = file
            .tracker
            .and_then(|tracker| tracker.config)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_TRACKER_CONFIG));
        Ok(Self {
            backend,
            model,
            tracker_config,
            max_frame_bytes: file.max_frame_bytes.unwrap_or(DEFAULT_MAX_FRAME_BYTES),
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(backend) = env_value("BRIDGE_BACKEND") {
            self.backend = backend.parse()?;
        }
        if let Some(weights) = env_value("BRIDGE_WEIGHTS") {
            self.model.weights = PathBuf::from(weights);
        }
        if let Some(labels) = env_value("BRIDGE_LABELS") {
            self.model.labels = Some(PathBuf::from(labels));
        }
        if let Some(path) = env_value("BRIDGE_TRACKER_CONFIG") {
            self.tracker_config = PathBuf::from(path);
        }
        if let Some(conf) = parse_env("BRIDGE_CONF", "a number")? {
            self.model.confidence = conf;
        }
        if let Some(imgsz) = parse_env("BRIDGE_IMGSZ", "a positive integer")? {
            self.model.imgsz = imgsz;
        }
        if let Some(max) = parse_env("BRIDGE_MAX_FRAME_BYTES", "an integer number of bytes")? {
            self.max_frame_bytes = max;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.model.confidence) {
            return Err(anyhow!(
                "confidence must be within [0, 1], got {}",
                self.model.confidence
            ));
        }
        if !(0.0..=1.0).contains(&self.model.iou) {
            return Err(anyhow!("iou must be within [0, 1], got {}", self.model.iou));
        }
        if self.model.imgsz == 0 {
            return Err(anyhow!("imgsz must be greater than zero"));
        }
        if self.max_frame_bytes == 0 {
            return Err(anyhow!("max_frame_bytes must be greater than zero"));
        }
        Ok(())
    }
}

/// Where a configured path points once the working directory is applied.
pub fn resolve_path(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path.to_path_buf(),
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

fn parse_env<T: FromStr>(name: &str, expected: &str) -> Result<Option<T>> {
    match env_value(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| anyhow!("{} must be {}", name, expected)),
        None => Ok(None),
    }
}

fn read_config_file(path: &Path) -> Result<ServerConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
