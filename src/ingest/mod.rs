//! Frame ingestion sources.
//!
//! This module provides sources for live frames:
//! - Synthetic scenes (`stub://` URLs, testing and demos)
//! - Local still directories (`dir://` paths)
//!
//! All sources produce `Frame` instances that flow into the keep-only-latest
//! slot. The ingestion layer is responsible for:
//! - Stamping rotation metadata and sequence numbers at capture time
//! - Rate limiting / frame decimation (via the caller's `FrameStride`)
//!
//! Sources never queue frames: backpressure is keep-only-latest, enforced by
//! the slot the daemon publishes into.

mod camera;
mod dir;
mod synthetic;

pub use camera::{CameraSource, SourceConfig, SourceStats};
