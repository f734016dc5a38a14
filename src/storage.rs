//! Photo persistence.
//!
//! The storage sink is the session's terminal collaborator: it takes the
//! accepted in-memory image plus a filename and durably writes it. Encoding
//! uses the host's standard bitmap compression (PNG or JPEG), no custom
//! header.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use image::RgbImage;

use crate::{now_ms, validate_photo_prefix};

/// Output encoding for persisted photos.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PhotoFormat {
    Png,
    Jpeg,
}

impl PhotoFormat {
    pub fn from_str(value: &str) -> Result<Self> {
        match value.to_lowercase().as_str() {
            "png" => Ok(PhotoFormat::Png),
            "jpeg" | "jpg" => Ok(PhotoFormat::Jpeg),
            other => Err(anyhow!("unsupported photo format: {}", other)),
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            PhotoFormat::Png => "png",
            PhotoFormat::Jpeg => "jpg",
        }
    }
}

/// Produces `<prefix>_<epoch_millis>.<ext>` filenames.
#[derive(Clone, Debug)]
pub struct FilenamePolicy {
    prefix: String,
    format: PhotoFormat,
}

impl FilenamePolicy {
    pub fn new(prefix: &str, format: PhotoFormat) -> Result<Self> {
        validate_photo_prefix(prefix)?;
        Ok(Self {
            prefix: prefix.to_string(),
            format,
        })
    }

    pub fn format(&self) -> PhotoFormat {
        self.format
    }

    pub fn next_name(&self) -> Result<String> {
        Ok(format!(
            "{}_{}.{}",
            self.prefix,
            now_ms()?,
            self.format.extension()
        ))
    }
}

impl Default for FilenamePolicy {
    fn default() -> Self {
        Self {
            prefix: "face".to_string(),
            format: PhotoFormat::Png,
        }
    }
}

/// Persistent storage sink for accepted photos.
pub trait PhotoSink: Send {
    /// Durably write `image` under `filename`, returning the stored handle.
    fn store(&mut self, image: &RgbImage, filename: &str) -> Result<PathBuf>;
}

/// Writes encoded photos into a directory on the local filesystem.
pub struct FilesystemSink {
    dir: PathBuf,
}

impl FilesystemSink {
    /// Open a sink rooted at `dir`, creating the directory if needed.
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .map_err(|e| anyhow!("failed to create photo dir {}: {}", dir.display(), e))?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }
}

impl PhotoSink for FilesystemSink {
    fn store(&mut self, image: &RgbImage, filename: &str) -> Result<PathBuf> {
        // Filenames come from FilenamePolicy, but stay defensive about
        // separators in case a caller hands us one directly.
        if filename.is_empty() || filename.contains(['/', '\\']) || filename.contains("..") {
            return Err(anyhow!("invalid photo filename: {}", filename));
        }
        let path = self.dir.join(filename);
        image
            .save(&path)
            .map_err(|e| anyhow!("failed to write photo {}: {}", path.display(), e))?;
        Ok(path)
    }
}

/// In-memory sink for tests: records each stored image and name.
#[derive(Default)]
pub struct MemorySink {
    stored: Mutex<Vec<(String, RgbImage)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stored_count(&self) -> usize {
        self.stored.lock().expect("memory sink lock poisoned").len()
    }

    pub fn stored_names(&self) -> Vec<String> {
        self.stored
            .lock()
            .expect("memory sink lock poisoned")
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }
}

impl MemorySink {
    fn store_entry(&self, image: &RgbImage, filename: &str) -> PathBuf {
        self.stored
            .lock()
            .expect("memory sink lock poisoned")
            .push((filename.to_string(), image.clone()));
        PathBuf::from(format!("mem://{}", filename))
    }
}

impl PhotoSink for MemorySink {
    fn store(&mut self, image: &RgbImage, filename: &str) -> Result<PathBuf> {
        Ok(self.store_entry(image, filename))
    }
}

/// Shared-handle form, so a test can inspect the sink it handed to a session.
impl PhotoSink for std::sync::Arc<MemorySink> {
    fn store(&mut self, image: &RgbImage, filename: &str) -> Result<PathBuf> {
        Ok(self.store_entry(image, filename))
    }
}
