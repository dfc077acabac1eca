mod backend;
mod backends;
mod labels;
mod result;

pub use backend::DetectorBackend;
pub use backends::{open_backend, StubBackend};
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use labels::ClassNames;
pub use result::{non_max_suppression, Detection, DetectionResult};
