//! Detection Bridge
//!
//! Serves object detection and tracking over stdio. A client writes a JSON header
//! line (`{"clientId": ..., "len": N}`) followed by `N` bytes of an encoded frame and
//! reads back one JSON line with that client's boxes.
//!
//! # Module Structure
//!
//! - `protocol`: header parsing, payload framing, response lines
//! - `server`: the request loop and its fallback from tracking to detection
//! - `model`: detection/tracking session over a detector backend
//! - `detect`: detector backends (ONNX via tract, stub), results, class names
//! - `track`: ByteTrack multi-object tracker
//! - `convert`: detector output to wire boxes
//! - `annotate`: single-image harness that draws and saves detections
//! - `config`: server configuration from file and environment

pub mod annotate;
pub mod config;
pub mod convert;
pub mod detect;
pub mod model;
#[cfg(feature = "preview")]
pub mod preview;
pub mod protocol;
pub mod server;
pub mod track;
pub mod ui;

pub use annotate::{annotate_file, draw_detections, AnnotateError, AnnotateOptions, AnnotationReport};
pub use config::{BackendKind, ModelSettings, ServerConfig};
pub use convert::detections_to_boxes;
pub use detect::{ClassNames, Detection, DetectionResult, DetectorBackend, StubBackend};
pub use model::{DetectionModel, TrackingModel};
pub use protocol::{BoxRecord, FrameError, RequestHeader, Response};
pub use server::{FrameServer, InferencePolicy, ServeStats};
pub use track::{ByteTracker, TrackerSettings};
