use std::collections::VecDeque;

use anyhow::Result;
use image::RgbImage;

use crate::detect::backend::FaceDetectorBackend;
use crate::detect::result::FaceDetectionResult;
use crate::overlay::DetectionBox;

/// Scripted face backend for tests and stub pipelines.
///
/// Pops one scripted result per call; once the script runs dry it keeps
/// returning the last result (or an empty one), so a looping caller is safe.
pub struct StubFaceBackend {
    script: VecDeque<FaceDetectionResult>,
    last: FaceDetectionResult,
}

impl StubFaceBackend {
    pub fn new() -> Self {
        Self {
            script: VecDeque::new(),
            last: FaceDetectionResult::default(),
        }
    }

    /// Queue a frame's worth of detections.
    pub fn push_faces(&mut self, faces: Vec<DetectionBox>, confidence: f32) {
        self.script
            .push_back(FaceDetectionResult { faces, confidence });
    }

    /// Queue an empty (no faces) frame.
    pub fn push_empty(&mut self) {
        self.script.push_back(FaceDetectionResult::default());
    }
}

impl Default for StubFaceBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl FaceDetectorBackend for StubFaceBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, _image: &RgbImage) -> Result<FaceDetectionResult> {
        if let Some(next) = self.script.pop_front() {
            self.last = next.clone();
            Ok(next)
        } else {
            Ok(self.last.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_replays_script_then_repeats_last() {
        let mut backend = StubFaceBackend::new();
        backend.push_empty();
        backend.push_faces(vec![DetectionBox::new(0.0, 0.0, 10.0, 10.0)], 0.9);

        let img = RgbImage::new(4, 4);
        assert!(!backend.detect(&img).unwrap().has_faces());
        assert!(backend.detect(&img).unwrap().has_faces());
        // Script exhausted: last result repeats.
        assert!(backend.detect(&img).unwrap().has_faces());
    }
}
