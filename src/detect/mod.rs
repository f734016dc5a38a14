mod backend;
mod backends;
mod registry;
mod result;

pub use backend::FaceDetectorBackend;
pub use backends::{LumaBlobBackend, StubFaceBackend};
pub use registry::FaceBackendRegistry;
pub use result::FaceDetectionResult;

pub use crate::overlay::DetectionBox;
