//! Capture capability: turn "a face is on screen now" into one owned frame.

use std::collections::VecDeque;
use std::sync::Arc;

use anyhow::Result;

use crate::frame::{Frame, LatestFrameSlot};
use crate::overlay::{draw_box, DetectionBox, OverlayBox, DEFAULT_BOX_COLOR, DEFAULT_BOX_THICKNESS};
use crate::CaptureFault;

/// Capture backend trait.
///
/// One capture request is outstanding at a time per session; the session's
/// in-progress flag enforces that. `faces` carries the detection boxes of
/// the frame that triggered the capture, in source-pixel coordinates, for
/// optional overlay compositing. Failures surface as
/// `CaptureFault::CaptureFailed` and are recoverable.
pub trait CaptureBackend: Send {
    fn capture(&mut self, faces: &[DetectionBox]) -> Result<Frame>;
}

/// Captures the freshest frame from the keep-only-latest slot.
///
/// With `composite_overlay` set, the detection boxes are burned into the
/// captured frame the way the preview draws them; otherwise the raw frame is
/// returned.
pub struct ViewCapture {
    slot: Arc<LatestFrameSlot>,
    composite_overlay: bool,
    box_color: [u8; 3],
    box_thickness: u32,
}

impl ViewCapture {
    pub fn new(slot: Arc<LatestFrameSlot>, composite_overlay: bool) -> Self {
        Self {
            slot,
            composite_overlay,
            box_color: DEFAULT_BOX_COLOR,
            box_thickness: DEFAULT_BOX_THICKNESS,
        }
    }

    pub fn with_style(mut self, color: [u8; 3], thickness: u32) -> Self {
        self.box_color = color;
        self.box_thickness = thickness;
        self
    }
}

impl CaptureBackend for ViewCapture {
    fn capture(&mut self, faces: &[DetectionBox]) -> Result<Frame> {
        let frame = self.slot.snapshot().ok_or_else(|| {
            anyhow::Error::from(CaptureFault::CaptureFailed(
                "no frame available in latest slot".into(),
            ))
        })?;

        if !self.composite_overlay || faces.is_empty() {
            return Ok(frame);
        }

        let rotation = frame.rotation();
        let seq = frame.seq();
        let mut image = frame.into_image();
        for face in faces {
            // Detection boxes are already in frame pixel coordinates.
            let border = OverlayBox {
                left: face.left,
                top: face.top,
                right: face.right,
                bottom: face.bottom,
            };
            draw_box(&mut image, &border, self.box_color, self.box_thickness);
        }
        Ok(Frame::new(image, rotation, seq))
    }
}

/// Scripted capture backend for tests: replays queued frames or failures,
/// then fails once the script is exhausted.
pub struct ScriptedCapture {
    script: VecDeque<Result<Frame, String>>,
}

impl ScriptedCapture {
    pub fn new() -> Self {
        Self {
            script: VecDeque::new(),
        }
    }

    pub fn push_frame(&mut self, frame: Frame) {
        self.script.push_back(Ok(frame));
    }

    pub fn push_failure(&mut self, detail: &str) {
        self.script.push_back(Err(detail.to_string()));
    }
}

impl Default for ScriptedCapture {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureBackend for ScriptedCapture {
    fn capture(&mut self, _faces: &[DetectionBox]) -> Result<Frame> {
        match self.script.pop_front() {
            Some(Ok(frame)) => Ok(frame),
            Some(Err(detail)) => Err(CaptureFault::CaptureFailed(detail).into()),
            None => Err(CaptureFault::CaptureFailed("capture script exhausted".into()).into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Rotation;
    use image::{Rgb, RgbImage};

    fn dark_frame(seq: u64) -> Frame {
        Frame::new(
            RgbImage::from_pixel(32, 32, Rgb([10, 10, 10])),
            Rotation::Deg0,
            seq,
        )
    }

    #[test]
    fn view_capture_snapshots_latest_frame() {
        let slot = Arc::new(LatestFrameSlot::new());
        slot.publish(dark_frame(1));
        slot.publish(dark_frame(2));

        let mut capture = ViewCapture::new(slot.clone(), false);
        let frame = capture.capture(&[]).unwrap();
        assert_eq!(frame.seq(), 2);
        // Snapshot, not take: the slot still serves the analysis path.
        assert!(slot.snapshot().is_some());
    }

    #[test]
    fn view_capture_fails_without_a_frame() {
        let slot = Arc::new(LatestFrameSlot::new());
        let mut capture = ViewCapture::new(slot, false);
        let err = capture.capture(&[]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CaptureFault>(),
            Some(CaptureFault::CaptureFailed(_))
        ));
    }

    #[test]
    fn composite_overlay_burns_boxes_in() {
        let slot = Arc::new(LatestFrameSlot::new());
        slot.publish(dark_frame(1));

        let mut capture = ViewCapture::new(slot, true).with_style([0, 255, 0], 1);
        let face = DetectionBox::new(4.0, 4.0, 12.0, 12.0);
        let frame = capture.capture(&[face]).unwrap();

        assert_eq!(frame.image().get_pixel(4, 4).0, [0, 255, 0]);
        assert_eq!(frame.image().get_pixel(8, 8).0, [10, 10, 10]);
    }

    #[test]
    fn scripted_capture_replays_then_fails() {
        let mut capture = ScriptedCapture::new();
        capture.push_frame(dark_frame(1));
        capture.push_failure("shutter jam");

        assert!(capture.capture(&[]).is_ok());
        assert!(capture.capture(&[]).is_err());
        assert!(capture.capture(&[]).is_err());
    }
}
