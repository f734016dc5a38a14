use anyhow::Result;
use image::RgbImage;

use crate::detect::backend::FaceDetectorBackend;
use crate::detect::result::FaceDetectionResult;
use crate::overlay::DetectionBox;

/// Luma offset above the frame mean for a pixel to count as foreground.
const FOREGROUND_OFFSET: f32 = 30.0;

/// CPU face stand-in: bounding box of the above-mean-luma blob.
///
/// Synthetic scenes and well-lit indoor frames render the subject brighter
/// than the background, so the bounding box of pixels well above the mean
/// luma is a workable face proxy. The minimum-area gate suppresses specular
/// noise. This is a stand-in behind the detector seam, not a face model.
pub struct LumaBlobBackend {
    /// Minimum blob area as a fraction of the frame, below which no face is
    /// reported.
    min_area_fraction: f32,
}

impl LumaBlobBackend {
    pub fn new(min_area_fraction: f32) -> Self {
        Self { min_area_fraction }
    }
}

impl Default for LumaBlobBackend {
    fn default() -> Self {
        // 0.5% of the frame: small enough for a distant face, large enough
        // to ignore single hot pixels.
        Self::new(0.005)
    }
}

fn luma(px: &image::Rgb<u8>) -> f32 {
    let [r, g, b] = px.0;
    0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32
}

impl FaceDetectorBackend for LumaBlobBackend {
    fn name(&self) -> &'static str {
        "luma-blob"
    }

    fn detect(&mut self, image: &RgbImage) -> Result<FaceDetectionResult> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Ok(FaceDetectionResult::default());
        }

        let pixel_count = (width * height) as f32;
        let mean = image.pixels().map(luma).sum::<f32>() / pixel_count;
        let threshold = mean + FOREGROUND_OFFSET;

        let mut min_x = u32::MAX;
        let mut min_y = u32::MAX;
        let mut max_x = 0u32;
        let mut max_y = 0u32;
        let mut foreground = 0u32;

        for (x, y, px) in image.enumerate_pixels() {
            if luma(px) > threshold {
                foreground += 1;
                min_x = min_x.min(x);
                min_y = min_y.min(y);
                max_x = max_x.max(x);
                max_y = max_y.max(y);
            }
        }

        if foreground == 0 || (foreground as f32) / pixel_count < self.min_area_fraction {
            return Ok(FaceDetectionResult::default());
        }

        let face = DetectionBox::new(min_x as f32, min_y as f32, max_x as f32, max_y as f32);
        // Confidence tracks how much of the blob's bounding box is actually
        // foreground: a filled ellipse scores high, scattered noise low.
        let confidence = (foreground as f32 / face.area().max(1.0)).min(1.0);

        Ok(FaceDetectionResult {
            faces: vec![face],
            confidence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn frame_with_bright_block(x0: u32, y0: u32, w: u32, h: u32) -> RgbImage {
        let mut img = RgbImage::from_pixel(64, 64, Rgb([20, 20, 20]));
        for y in y0..y0 + h {
            for x in x0..x0 + w {
                img.put_pixel(x, y, Rgb([220, 210, 200]));
            }
        }
        img
    }

    #[test]
    fn bright_block_yields_tight_box() {
        let mut backend = LumaBlobBackend::default();
        let img = frame_with_bright_block(10, 20, 16, 12);

        let result = backend.detect(&img).unwrap();
        assert!(result.has_faces());
        let face = &result.faces[0];
        assert_eq!(face.left, 10.0);
        assert_eq!(face.top, 20.0);
        assert_eq!(face.right, 25.0);
        assert_eq!(face.bottom, 31.0);
        assert!(result.confidence > 0.8);
    }

    #[test]
    fn flat_frame_yields_no_faces() {
        let mut backend = LumaBlobBackend::default();
        let img = RgbImage::from_pixel(64, 64, Rgb([128, 128, 128]));
        assert!(!backend.detect(&img).unwrap().has_faces());
    }

    #[test]
    fn tiny_blob_is_suppressed() {
        let mut backend = LumaBlobBackend::new(0.01);
        // 4 pixels out of 4096 is well under 1%.
        let img = frame_with_bright_block(30, 30, 2, 2);
        assert!(!backend.detect(&img).unwrap().has_faces());
    }

    #[test]
    fn empty_image_is_handled() {
        let mut backend = LumaBlobBackend::default();
        let img = RgbImage::new(0, 0);
        assert!(!backend.detect(&img).unwrap().has_faces());
    }
}
