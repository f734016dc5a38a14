use anyhow::{anyhow, Result};

use super::dir::DirectorySource;
use super::synthetic::SyntheticSource;
use crate::frame::Frame;

/// Configuration for a camera source.
#[derive(Clone, Debug)]
pub struct SourceConfig {
    /// Source URL: `stub://<scene>` or `dir://<local path>`.
    pub url: String,
    /// Target frame rate (frames per second). The daemon paces to this rate.
    pub target_fps: u32,
    /// Frame width (synthetic scenes).
    pub width: u32,
    /// Frame height (synthetic scenes).
    pub height: u32,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: "stub://front_camera".to_string(),
            target_fps: 10,
            width: 640,
            height: 480,
        }
    }
}

/// Camera frame source.
///
/// Backend is selected by URL scheme: `stub://` yields a synthetic scene,
/// `dir://` iterates local stills. Remote schemes are rejected; ingestion is
/// local-only.
pub struct CameraSource {
    backend: CameraBackend,
}

enum CameraBackend {
    Synthetic(SyntheticSource),
    Directory(DirectorySource),
}

impl CameraSource {
    pub fn new(config: SourceConfig) -> Result<Self> {
        if let Some(path) = config.url.strip_prefix("dir://") {
            Ok(Self {
                backend: CameraBackend::Directory(DirectorySource::new(path)),
            })
        } else if config.url.starts_with("stub://") {
            Ok(Self {
                backend: CameraBackend::Synthetic(SyntheticSource::new(config)),
            })
        } else {
            Err(anyhow!(
                "unsupported source url '{}' (expected stub:// or dir://)",
                config.url
            ))
        }
    }

    /// Connect to the source.
    pub fn connect(&mut self) -> Result<()> {
        match &mut self.backend {
            CameraBackend::Synthetic(source) => source.connect(),
            CameraBackend::Directory(source) => source.connect(),
        }
    }

    /// Capture the next frame.
    pub fn next_frame(&mut self) -> Result<Frame> {
        match &mut self.backend {
            CameraBackend::Synthetic(source) => source.next_frame(),
            CameraBackend::Directory(source) => source.next_frame(),
        }
    }

    /// Check if the source is healthy.
    pub fn is_healthy(&self) -> bool {
        match &self.backend {
            CameraBackend::Synthetic(source) => source.is_healthy(),
            CameraBackend::Directory(source) => source.is_healthy(),
        }
    }

    /// Get frame statistics.
    pub fn stats(&self) -> SourceStats {
        match &self.backend {
            CameraBackend::Synthetic(source) => source.stats(),
            CameraBackend::Directory(source) => source.stats(),
        }
    }
}

/// Statistics for a camera source.
#[derive(Clone, Debug)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub url: String,
}
