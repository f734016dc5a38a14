use std::path::PathBuf;

use anyhow::{anyhow, Result};

use super::camera::SourceStats;
use crate::frame::{Frame, Rotation};

/// Local still-directory source for `dir://` URLs.
///
/// Iterates PNG/JPEG files in sorted order, looping at the end. Decoding is
/// in-memory via the `image` crate; the source never fetches remote URLs.
pub struct DirectorySource {
    dir: PathBuf,
    files: Vec<PathBuf>,
    cursor: usize,
    frame_count: u64,
    connected: bool,
}

impl DirectorySource {
    pub fn new(path: &str) -> Self {
        Self {
            dir: PathBuf::from(path),
            files: Vec::new(),
            cursor: 0,
            frame_count: 0,
            connected: false,
        }
    }

    pub fn connect(&mut self) -> Result<()> {
        let entries = std::fs::read_dir(&self.dir)
            .map_err(|e| anyhow!("failed to read frame dir {}: {}", self.dir.display(), e))?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                matches!(
                    path.extension().and_then(|ext| ext.to_str()),
                    Some("png") | Some("jpg") | Some("jpeg")
                )
            })
            .collect();
        files.sort();

        if files.is_empty() {
            return Err(anyhow!(
                "frame dir {} contains no png/jpeg stills",
                self.dir.display()
            ));
        }

        log::info!(
            "camera source: connected to {} ({} stills)",
            self.dir.display(),
            files.len()
        );
        self.files = files;
        self.cursor = 0;
        self.connected = true;
        Ok(())
    }

    pub fn next_frame(&mut self) -> Result<Frame> {
        if !self.connected {
            return Err(anyhow!("directory source not connected"));
        }
        let path = &self.files[self.cursor];
        self.cursor = (self.cursor + 1) % self.files.len();

        let image = image::open(path)
            .map_err(|e| anyhow!("failed to decode still {}: {}", path.display(), e))?
            .to_rgb8();

        let seq = self.frame_count;
        self.frame_count += 1;
        Ok(Frame::new(image, Rotation::Deg0, seq))
    }

    pub fn is_healthy(&self) -> bool {
        self.connected && !self.files.is_empty()
    }

    pub fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            url: format!("dir://{}", self.dir.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn iterates_stills_in_sorted_order_and_loops() {
        let dir = tempfile::tempdir().expect("temp dir");
        for (name, value) in [("b.png", 60u8), ("a.png", 30u8)] {
            let img = RgbImage::from_pixel(4, 4, Rgb([value, value, value]));
            img.save(dir.path().join(name)).expect("write still");
        }
        // Non-image files are ignored.
        std::fs::write(dir.path().join("notes.txt"), b"skip me").unwrap();

        let mut source = DirectorySource::new(&dir.path().display().to_string());
        source.connect().unwrap();

        let f1 = source.next_frame().unwrap();
        let f2 = source.next_frame().unwrap();
        let f3 = source.next_frame().unwrap();
        assert_eq!(f1.image().get_pixel(0, 0).0, [30, 30, 30]);
        assert_eq!(f2.image().get_pixel(0, 0).0, [60, 60, 60]);
        // Looped back to the first still.
        assert_eq!(f3.image().get_pixel(0, 0).0, [30, 30, 30]);
        assert_eq!(source.stats().frames_captured, 3);
    }

    #[test]
    fn empty_directory_fails_to_connect() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut source = DirectorySource::new(&dir.path().display().to_string());
        assert!(source.connect().is_err());
        assert!(!source.is_healthy());
        assert!(source.next_frame().is_err());
    }
}
