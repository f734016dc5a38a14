use crate::overlay::DetectionBox;

/// Result of running face detection on one frame.
///
/// Boxes are in source-image pixel coordinates; they are produced once per
/// analyzed frame and discarded after the overlay pass that consumes them.
#[derive(Clone, Debug, Default)]
pub struct FaceDetectionResult {
    /// Detected face boxes, strongest first.
    pub faces: Vec<DetectionBox>,
    /// Confidence of the primary detection.
    pub confidence: f32,
}

impl FaceDetectionResult {
    pub fn has_faces(&self) -> bool {
        !self.faces.is_empty()
    }
}
