mod luma;
mod stub;

pub use luma::LumaBlobBackend;
pub use stub::StubFaceBackend;
