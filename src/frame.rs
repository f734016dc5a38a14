//! Frame container and stream plumbing.
//!
//! - `Frame`: owned RGB frame plus rotation metadata and a sequence number.
//! - `LatestFrameSlot`: keep-only-latest handoff between the ingest thread and
//!   the analysis callback. Stale frames are dropped, never queued.
//! - `FrameStride`: analysis decimation (forward every Nth frame).
//!
//! The ingest layer stamps rotation and sequence at capture time; everything
//! downstream treats a `Frame` as immutable.

use anyhow::{anyhow, Result};
use image::RgbImage;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Sensor rotation metadata carried with each frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    pub fn from_degrees(degrees: u32) -> Result<Self> {
        match degrees % 360 {
            0 => Ok(Rotation::Deg0),
            90 => Ok(Rotation::Deg90),
            180 => Ok(Rotation::Deg180),
            270 => Ok(Rotation::Deg270),
            other => Err(anyhow!("unsupported rotation: {} degrees", other)),
        }
    }

    pub fn degrees(self) -> u32 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }
}

/// One captured frame. Pixels are RGB8; dimensions come from the buffer.
#[derive(Clone, Debug)]
pub struct Frame {
    image: RgbImage,
    rotation: Rotation,
    /// Monotonic per-source sequence number, stamped at capture time.
    seq: u64,
}

impl Frame {
    pub fn new(image: RgbImage, rotation: Rotation, seq: u64) -> Self {
        Self {
            image,
            rotation,
            seq,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn into_image(self) -> RgbImage {
        self.image
    }

    /// Raw byte length, used for cache budget accounting.
    pub fn byte_len(&self) -> usize {
        self.image.as_raw().len()
    }

    /// Crop a centered `width` x `height` region.
    ///
    /// Fails when the requested region does not fit inside the frame, rather
    /// than silently clamping.
    pub fn center_crop(&self, width: u32, height: u32) -> Result<Frame> {
        if width == 0 || height == 0 || width > self.width() || height > self.height() {
            return Err(anyhow!(
                "center crop {}x{} does not fit frame {}x{}",
                width,
                height,
                self.width(),
                self.height()
            ));
        }
        let x = (self.width() - width) / 2;
        let y = (self.height() - height) / 2;
        let cropped = image::imageops::crop_imm(&self.image, x, y, width, height).to_image();
        Ok(Frame::new(cropped, self.rotation, self.seq))
    }
}

// ----------------------------------------------------------------------------
// LatestFrameSlot: keep-only-latest backpressure
// ----------------------------------------------------------------------------

/// Single-slot frame handoff with keep-only-latest semantics.
///
/// `publish` replaces any unconsumed frame; `take` consumes the current one.
/// Older unconsumed frames are dropped, never queued, so a slow consumer
/// always sees the freshest frame.
#[derive(Debug, Default)]
pub struct LatestFrameSlot {
    slot: Mutex<Option<Frame>>,
    dropped: AtomicU64,
    published: AtomicU64,
}

impl LatestFrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a frame, dropping any unconsumed predecessor.
    pub fn publish(&self, frame: Frame) {
        let mut slot = self.slot.lock().expect("frame slot lock poisoned");
        if slot.replace(frame).is_some() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        self.published.fetch_add(1, Ordering::Relaxed);
    }

    /// Consume the current frame, if any.
    pub fn take(&self) -> Option<Frame> {
        self.slot.lock().expect("frame slot lock poisoned").take()
    }

    /// Peek at the current frame without consuming it.
    pub fn snapshot(&self) -> Option<Frame> {
        self.slot.lock().expect("frame slot lock poisoned").clone()
    }

    /// Frames overwritten before being consumed.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Total frames published.
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}

// ----------------------------------------------------------------------------
// FrameStride: analysis decimation
// ----------------------------------------------------------------------------

/// Forwards every Nth frame to the analysis path.
///
/// A stride of 1 forwards everything. The first frame always passes, so a
/// fresh session does not wait a full stride before its first detection.
#[derive(Debug)]
pub struct FrameStride {
    stride: u64,
    counter: u64,
}

impl FrameStride {
    pub fn new(stride: u64) -> Self {
        Self {
            stride: stride.max(1),
            counter: 0,
        }
    }

    /// Returns true when the current frame should be analyzed.
    pub fn admit(&mut self) -> bool {
        let admit = self.counter % self.stride == 0;
        self.counter += 1;
        admit
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
