use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::storage::PhotoFormat;

const DEFAULT_DB_PATH: &str = "facegate.db";
const DEFAULT_SOURCE_URL: &str = "stub://front_camera";
const DEFAULT_SOURCE_FPS: u32 = 10;
const DEFAULT_SOURCE_WIDTH: u32 = 640;
const DEFAULT_SOURCE_HEIGHT: u32 = 480;
const DEFAULT_VIEW_WIDTH: u32 = 720;
const DEFAULT_VIEW_HEIGHT: u32 = 1280;
const DEFAULT_VIEW_MIRROR: bool = true;
const DEFAULT_OUTPUT_DIR: &str = "photos";
const DEFAULT_PHOTO_PREFIX: &str = "face";
const DEFAULT_PHOTO_FORMAT: &str = "png";
const DEFAULT_MAX_ATTEMPTS: u32 = 10;
const DEFAULT_FRAME_STRIDE: u64 = 1;
const DEFAULT_CACHE_CAPACITY_BYTES: u64 = 16 * 1024 * 1024;
const DEFAULT_DETECTOR_BACKEND: &str = "luma-blob";
const DEFAULT_RETENTION_SECS: u64 = 60 * 60 * 24 * 7;

#[derive(Debug, Deserialize, Default)]
struct FacegateConfigFile {
    db_path: Option<String>,
    source: Option<SourceConfigFile>,
    view: Option<ViewConfigFile>,
    capture: Option<CaptureConfigFile>,
    storage: Option<StorageConfigFile>,
    cache: Option<CacheConfigFile>,
    detector: Option<DetectorConfigFile>,
    retention: Option<RetentionConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceConfigFile {
    url: Option<String>,
    target_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct ViewConfigFile {
    width: Option<u32>,
    height: Option<u32>,
    mirror: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct CaptureConfigFile {
    composite_overlay: Option<bool>,
    max_attempts: Option<u32>,
    frame_stride: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct StorageConfigFile {
    dir: Option<PathBuf>,
    format: Option<String>,
    prefix: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct CacheConfigFile {
    capacity_bytes: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    backend: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct RetentionConfigFile {
    seconds: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct FacegateConfig {
    pub db_path: String,
    pub source: SourceSettings,
    pub view: ViewSettings,
    pub capture: CaptureSettings,
    pub storage: StorageSettings,
    pub cache_capacity_bytes: u64,
    pub detector_backend: String,
    pub retention: Duration,
}

#[derive(Debug, Clone)]
pub struct SourceSettings {
    pub url: String,
    pub target_fps: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone)]
pub struct ViewSettings {
    pub width: u32,
    pub height: u32,
    pub mirror: bool,
}

#[derive(Debug, Clone)]
pub struct CaptureSettings {
    pub composite_overlay: bool,
    pub max_attempts: u32,
    pub frame_stride: u64,
}

#[derive(Debug, Clone)]
pub struct StorageSettings {
    pub dir: PathBuf,
    pub format: PhotoFormat,
    pub prefix: String,
}

impl FacegateConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("FACEGATE_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: FacegateConfigFile) -> Result<Self> {
        let db_path = file.db_path.unwrap_or_else(|| DEFAULT_DB_PATH.to_string());
        let source = SourceSettings {
            url: file
                .source
                .as_ref()
                .and_then(|source| source.url.clone())
                .unwrap_or_else(|| DEFAULT_SOURCE_URL.to_string()),
            target_fps: file
                .source
                .as_ref()
                .and_then(|source| source.target_fps)
                .unwrap_or(DEFAULT_SOURCE_FPS),
            width: file
                .source
                .as_ref()
                .and_then(|source| source.width)
                .unwrap_or(DEFAULT_SOURCE_WIDTH),
            height: file
                .source
                .as_ref()
                .and_then(|source| source.height)
                .unwrap_or(DEFAULT_SOURCE_HEIGHT),
        };
        let view = ViewSettings {
            width: file
                .view
                .as_ref()
                .and_then(|view| view.width)
                .unwrap_or(DEFAULT_VIEW_WIDTH),
            height: file
                .view
                .as_ref()
                .and_then(|view| view.height)
                .unwrap_or(DEFAULT_VIEW_HEIGHT),
            mirror: file
                .view
                .as_ref()
                .and_then(|view| view.mirror)
                .unwrap_or(DEFAULT_VIEW_MIRROR),
        };
        let capture = CaptureSettings {
            composite_overlay: file
                .capture
                .as_ref()
                .and_then(|capture| capture.composite_overlay)
                .unwrap_or(true),
            max_attempts: file
                .capture
                .as_ref()
                .and_then(|capture| capture.max_attempts)
                .unwrap_or(DEFAULT_MAX_ATTEMPTS),
            frame_stride: file
                .capture
                .as_ref()
                .and_then(|capture| capture.frame_stride)
                .unwrap_or(DEFAULT_FRAME_STRIDE),
        };
        let storage = StorageSettings {
            dir: file
                .storage
                .as_ref()
                .and_then(|storage| storage.dir.clone())
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
            format: PhotoFormat::from_str(
                file.storage
                    .as_ref()
                    .and_then(|storage| storage.format.as_deref())
                    .unwrap_or(DEFAULT_PHOTO_FORMAT),
            )?,
            prefix: file
                .storage
                .and_then(|storage| storage.prefix)
                .unwrap_or_else(|| DEFAULT_PHOTO_PREFIX.to_string()),
        };
        let cache_capacity_bytes = file
            .cache
            .and_then(|cache| cache.capacity_bytes)
            .unwrap_or(DEFAULT_CACHE_CAPACITY_BYTES);
        let detector_backend = file
            .detector
            .and_then(|detector| detector.backend)
            .unwrap_or_else(|| DEFAULT_DETECTOR_BACKEND.to_string());
        let retention = Duration::from_secs(
            file.retention
                .and_then(|retention| retention.seconds)
                .unwrap_or(DEFAULT_RETENTION_SECS),
        );
        Ok(Self {
            db_path,
            source,
            view,
            capture,
            storage,
            cache_capacity_bytes,
            detector_backend,
            retention,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(db_path) = std::env::var("FACEGATE_DB_PATH") {
            if !db_path.trim().is_empty() {
                self.db_path = db_path;
            }
        }
        if let Ok(url) = std::env::var("FACEGATE_SOURCE_URL") {
            if !url.trim().is_empty() {
                self.source.url = url;
            }
        }
        if let Ok(dir) = std::env::var("FACEGATE_OUTPUT_DIR") {
            if !dir.trim().is_empty() {
                self.storage.dir = PathBuf::from(dir);
            }
        }
        if let Ok(backend) = std::env::var("FACEGATE_DETECTOR") {
            if !backend.trim().is_empty() {
                self.detector_backend = backend;
            }
        }
        if let Ok(mirror) = std::env::var("FACEGATE_MIRROR") {
            self.view.mirror = parse_bool(&mirror)
                .ok_or_else(|| anyhow!("FACEGATE_MIRROR must be true/false"))?;
        }
        if let Ok(attempts) = std::env::var("FACEGATE_MAX_ATTEMPTS") {
            let attempts: u32 = attempts
                .parse()
                .map_err(|_| anyhow!("FACEGATE_MAX_ATTEMPTS must be an integer"))?;
            self.capture.max_attempts = attempts;
        }
        if let Ok(retention) = std::env::var("FACEGATE_RETENTION_SECS") {
            let seconds: u64 = retention.parse().map_err(|_| {
                anyhow!("FACEGATE_RETENTION_SECS must be an integer number of seconds")
            })?;
            self.retention = Duration::from_secs(seconds);
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        crate::validate_photo_prefix(&self.storage.prefix)?;

        if self.source.target_fps == 0 {
            return Err(anyhow!("source target_fps must be greater than zero"));
        }
        if self.source.width == 0 || self.source.height == 0 {
            return Err(anyhow!("source dimensions must be greater than zero"));
        }
        if self.view.width == 0 || self.view.height == 0 {
            return Err(anyhow!("view dimensions must be greater than zero"));
        }
        if self.capture.max_attempts == 0 {
            return Err(anyhow!("capture max_attempts must be greater than zero"));
        }
        if self.capture.frame_stride == 0 {
            return Err(anyhow!("capture frame_stride must be greater than zero"));
        }
        if self.cache_capacity_bytes == 0 {
            return Err(anyhow!("cache capacity must be greater than zero"));
        }
        if self.retention.as_secs() == 0 {
            return Err(anyhow!("retention must be greater than zero"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<FacegateConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}
