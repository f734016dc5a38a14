//! facegate capture kernel
//!
//! This crate implements the core kernel for face-gated sharp-frame capture.
//!
//! # Architecture
//!
//! A capture session runs as a chain of callbacks over a live frame stream:
//!
//! 1. **Ingest**: a frame source produces RGB frames; a keep-only-latest slot
//!    drops stale frames instead of queueing them.
//! 2. **Detect**: a face detector backend reports bounding boxes in source
//!    pixel coordinates.
//! 3. **Overlay**: detection boxes are remapped into view space (crop-to-fill
//!    scaling, optional front-camera mirroring) for drawing.
//! 4. **Capture**: when a face is present and no attempt is in flight, the
//!    current view is captured and parked in a byte-bounded frame cache.
//! 5. **Gate**: the cache's added notification triggers the blur gate; sharp
//!    frames are persisted and journaled, soft frames evict the slot and the
//!    session waits for the next detected frame.
//!
//! # Module Structure
//!
//! - `frame`: frame container, keep-only-latest slot, analysis decimation
//! - `ingest`: frame sources (synthetic scenes, local still directories)
//! - `overlay`: detector-space to view-space box mapping and compositing
//! - `cache`: byte-bounded LRU frame cache with added notifications
//! - `detect` / `classify`: face detector and blur classifier backends
//! - `gate`: accept/retry decision over classifier score pairs
//! - `session`: the capture orchestrator state machine
//! - `storage` / `journal`: photo sink and durable capture log

use anyhow::{anyhow, Result};
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

pub mod cache;
pub mod capture;
pub mod classify;
pub mod config;
pub mod detect;
pub mod frame;
pub mod gate;
pub mod ingest;
pub mod journal;
pub mod overlay;
pub mod session;
pub mod storage;

pub use cache::{CacheObserver, CacheStats, FrameCache};
pub use capture::{CaptureBackend, ScriptedCapture, ViewCapture};
pub use classify::{BlurClassifierBackend, BlurScorePair, LaplacianBackend, StubClassifier};
pub use detect::{
    DetectionBox, FaceBackendRegistry, FaceDetectionResult, FaceDetectorBackend, LumaBlobBackend,
    StubFaceBackend,
};
pub use frame::{Frame, FrameStride, LatestFrameSlot, Rotation};
pub use gate::{BlurGate, Decision};
pub use ingest::{CameraSource, SourceConfig};
pub use journal::{CaptureLogStore, CaptureOutcome, CaptureRecord, InMemoryCaptureLog, SqliteCaptureLog};
pub use overlay::{map_to_view, OverlayBox, Viewport};
pub use session::{CaptureSession, Phase, SessionConfig, SessionStatus};
pub use storage::{FilenamePolicy, FilesystemSink, MemorySink, PhotoFormat, PhotoSink};

/// Fixed logical cache slot for the frame pending blur evaluation.
/// One session parks at most one candidate frame here at a time.
pub const PENDING_SLOT_KEY: &str = "slot:pending_capture";

pub fn now_ms() -> Result<u64> {
    let now = SystemTime::now().duration_since(UNIX_EPOCH)?;
    Ok(now.as_millis() as u64)
}

// -------------------- Key Discipline --------------------

/// A conforming cache slot key MUST be a local identifier, not a path or URL.
/// We enforce a positive allowlist pattern to avoid trivial bypasses.
///
/// Allowed: "slot:pending_capture", "slot:preview-2"
/// Disallowed: anything with whitespace, slashes, or punctuation outside [_-].
pub fn validate_slot_key(key: &str) -> Result<()> {
    // Compile once for hot paths.
    static SLOT_KEY_RE: OnceLock<regex::Regex> = OnceLock::new();
    let re = SLOT_KEY_RE.get_or_init(|| regex::Regex::new(r"^slot:[a-z0-9_-]{1,64}$").unwrap());

    if !re.is_match(key) {
        return Err(anyhow!(
            "cache slot key must match ^slot:[a-z0-9_-]{{1,64}}$"
        ));
    }
    Ok(())
}

/// Photo filename prefixes share the same discipline: they end up in
/// user-visible paths and must not smuggle separators in.
pub fn validate_photo_prefix(prefix: &str) -> Result<()> {
    static PREFIX_RE: OnceLock<regex::Regex> = OnceLock::new();
    let re = PREFIX_RE.get_or_init(|| regex::Regex::new(r"^[a-z0-9_-]{1,32}$").unwrap());

    if !re.is_match(prefix) {
        return Err(anyhow!("photo prefix must match ^[a-z0-9_-]{{1,32}}$"));
    }
    Ok(())
}

// -------------------- Fault Taxonomy --------------------

/// Recoverable faults raised inside a capture session.
///
/// None of these crash the session: mapping faults skip one box, capture and
/// classification faults re-enter face-detection wait, and eviction races are
/// treated as no-ops by the cache itself.
#[derive(Clone, Debug, PartialEq)]
pub enum CaptureFault {
    /// Zero or negative source/view extents handed to the coordinate mapper.
    InvalidDimensions { width: u32, height: u32 },
    /// Blur classifier unavailable or handed malformed input.
    Classification(String),
    /// Platform capture operation failed to produce a frame.
    CaptureFailed(String),
    /// A get/evict observed no entry where one was expected.
    EvictionRace { key: String },
}

impl std::fmt::Display for CaptureFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptureFault::InvalidDimensions { width, height } => {
                write!(f, "INVALID_DIMENSIONS: {}x{}", width, height)
            }
            CaptureFault::Classification(msg) => write!(f, "CLASSIFICATION_ERROR: {}", msg),
            CaptureFault::CaptureFailed(msg) => write!(f, "CAPTURE_FAILED: {}", msg),
            CaptureFault::EvictionRace { key } => write!(f, "CACHE_EVICTION_RACE: {}", key),
        }
    }
}

impl std::error::Error for CaptureFault {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_keys_follow_allowlist() {
        assert!(validate_slot_key("slot:pending_capture").is_ok());
        assert!(validate_slot_key("slot:preview-2").is_ok());
        assert!(validate_slot_key(PENDING_SLOT_KEY).is_ok());

        assert!(validate_slot_key("pending").is_err());
        assert!(validate_slot_key("slot:").is_err());
        assert!(validate_slot_key("slot:Pending").is_err());
        assert!(validate_slot_key("slot:a/b").is_err());
        assert!(validate_slot_key("slot:has space").is_err());
    }

    #[test]
    fn photo_prefixes_follow_allowlist() {
        assert!(validate_photo_prefix("face").is_ok());
        assert!(validate_photo_prefix("front_cam-1").is_ok());

        assert!(validate_photo_prefix("").is_err());
        assert!(validate_photo_prefix("../escape").is_err());
        assert!(validate_photo_prefix("UPPER").is_err());
    }

    #[test]
    fn faults_render_their_code() {
        let fault = CaptureFault::CaptureFailed("no frame".into());
        assert!(fault.to_string().starts_with("CAPTURE_FAILED"));

        let err: anyhow::Error = CaptureFault::EvictionRace {
            key: "slot:pending_capture".into(),
        }
        .into();
        assert!(err.downcast_ref::<CaptureFault>().is_some());
    }
}
