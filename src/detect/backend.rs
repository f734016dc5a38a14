use anyhow::Result;
use image::RgbImage;

use crate::detect::result::FaceDetectionResult;

/// Face detector backend trait.
///
/// Backends receive one frame at a time and report axis-aligned face boxes in
/// source-pixel coordinates. A single request is active per frame stream;
/// implementations may keep per-stream state across calls (a previous-frame
/// hash, a warmed-up interpreter) but must treat the pixel buffer as
/// read-only and ephemeral.
///
/// Reimplementing a production face model is out of scope here; shipped
/// backends are stand-ins wired through this seam so a real model can be
/// dropped in without touching the session.
pub trait FaceDetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a frame.
    fn detect(&mut self, image: &RgbImage) -> Result<FaceDetectionResult>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
