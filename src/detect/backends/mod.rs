pub mod stub;

#[cfg(feature = "backend-tract")]
pub mod tract;

use std::path::Path;

use anyhow::Result;

use crate::config::BackendKind;
use crate::detect::backend::DetectorBackend;

pub use stub::StubBackend;

#[cfg(feature = "backend-tract")]
pub use tract::TractBackend;

/// Construct the configured backend.
pub fn open_backend(
    kind: BackendKind,
    weights: &Path,
    iou_threshold: f32,
) -> Result<Box<dyn DetectorBackend>> {
    match kind {
        BackendKind::Stub => Ok(Box::new(StubBackend::new())),
        #[cfg(feature = "backend-tract")]
        BackendKind::Tract => Ok(Box::new(
            TractBackend::new(weights)?.with_iou_threshold(iou_threshold),
        )),
        #[cfg(not(feature = "backend-tract"))]
        BackendKind::Tract => {
            let _ = (weights, iou_threshold);
            Err(anyhow::anyhow!(
                "tract backend requested but built without the `backend-tract` feature"
            ))
        }
    }
}
