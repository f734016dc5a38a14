use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use image::RgbImage;

use super::backend::FaceDetectorBackend;
use super::result::FaceDetectionResult;

/// Thread-safe registry of face detector backends.
///
/// Backends are wrapped in `Mutex` because `FaceDetectorBackend::detect`
/// takes `&mut self`.
pub struct FaceBackendRegistry {
    backends: HashMap<String, Arc<Mutex<dyn FaceDetectorBackend>>>,
    default_name: Option<String>,
}

impl FaceBackendRegistry {
    pub fn new() -> Self {
        Self {
            backends: HashMap::new(),
            default_name: None,
        }
    }

    /// Register a backend. The first registered backend becomes the default.
    pub fn register<B: FaceDetectorBackend + 'static>(&mut self, backend: B) {
        let name = backend.name().to_string();
        if self.default_name.is_none() {
            self.default_name = Some(name.clone());
        }
        self.backends.insert(name, Arc::new(Mutex::new(backend)));
    }

    /// Set default backend by name.
    pub fn set_default(&mut self, name: &str) -> Result<()> {
        if !self.backends.contains_key(name) {
            return Err(anyhow!("face backend '{}' not registered", name));
        }
        self.default_name = Some(name.to_string());
        Ok(())
    }

    /// Get backend by name.
    pub fn get(&self, name: &str) -> Option<Arc<Mutex<dyn FaceDetectorBackend>>> {
        self.backends.get(name).cloned()
    }

    /// Get default backend.
    pub fn default_backend(&self) -> Option<Arc<Mutex<dyn FaceDetectorBackend>>> {
        self.default_name.as_ref().and_then(|name| self.get(name))
    }

    /// List registered backends.
    pub fn list(&self) -> Vec<String> {
        self.backends.keys().cloned().collect()
    }

    /// Run detection with the default backend.
    pub fn detect(&self, image: &RgbImage) -> Result<FaceDetectionResult> {
        let backend = self
            .default_backend()
            .ok_or_else(|| anyhow!("no face backend registered"))?;
        let mut guard = backend
            .lock()
            .map_err(|_| anyhow!("face backend lock poisoned"))?;
        guard.detect(image)
    }
}

impl Default for FaceBackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}
