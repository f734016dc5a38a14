use anyhow::Result;
use image::imageops::FilterType;
use image::{GrayImage, RgbImage};

use crate::classify::backend::{BlurClassifierBackend, BlurScorePair};
use crate::CaptureFault;

/// Model input edge length. Inputs are resized to this square before scoring.
const INPUT_EDGE: u32 = 512;

/// Laplacian variance at or above this maps to a fully sharp score.
const SHARP_VARIANCE: f64 = 100.0;

/// CPU blur classifier: Laplacian variance over a 512x512 luma plane.
///
/// Sharpness measurement follows the classic focus metric: convolve with the
/// 4-neighbour Laplacian kernel and take the response variance. Variance is
/// mapped linearly against `sharp_variance` into [0, 1] and emitted as the
/// score pair (first channel rises with focus, matching the pretrained
/// model's ordering).
pub struct LaplacianBackend {
    sharp_variance: f64,
}

impl LaplacianBackend {
    pub fn new(sharp_variance: f64) -> Self {
        Self { sharp_variance }
    }
}

impl Default for LaplacianBackend {
    fn default() -> Self {
        Self::new(SHARP_VARIANCE)
    }
}

/// Variance of the Laplacian response. Higher means sharper.
fn laplacian_variance(image: &GrayImage) -> f64 {
    let (width, height) = image.dimensions();
    if width < 3 || height < 3 {
        return 0.0;
    }

    // Laplacian kernel: [[0, 1, 0], [1, -4, 1], [0, 1, 0]]
    let mut sum = 0i64;
    let mut sum_sq = 0i64;
    let mut count = 0u64;

    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let center = i32::from(image.get_pixel(x, y).0[0]);
            let top = i32::from(image.get_pixel(x, y - 1).0[0]);
            let bottom = i32::from(image.get_pixel(x, y + 1).0[0]);
            let left = i32::from(image.get_pixel(x - 1, y).0[0]);
            let right = i32::from(image.get_pixel(x + 1, y).0[0]);

            let lap = top + bottom + left + right - 4 * center;
            sum += i64::from(lap);
            sum_sq += i64::from(lap) * i64::from(lap);
            count += 1;
        }
    }

    if count == 0 {
        return 0.0;
    }

    let mean = sum as f64 / count as f64;
    let mean_sq = sum_sq as f64 / count as f64;
    mean_sq - mean * mean
}

impl BlurClassifierBackend for LaplacianBackend {
    fn name(&self) -> &'static str {
        "laplacian"
    }

    fn classify(&mut self, image: &RgbImage) -> Result<BlurScorePair> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(CaptureFault::Classification(format!(
                "zero-dimension input: {}x{}",
                width, height
            ))
            .into());
        }

        let resized = image::imageops::resize(image, INPUT_EDGE, INPUT_EDGE, FilterType::Triangle);
        let luma = image::DynamicImage::ImageRgb8(resized).to_luma8();

        let variance = laplacian_variance(&luma);
        let sharp = (variance / self.sharp_variance).clamp(0.0, 1.0) as f32;

        Ok(BlurScorePair {
            blur_strength: sharp,
            non_blur_strength: 1.0 - sharp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CaptureFault;
    use image::Rgb;

    fn checkerboard(edge: u32, cell: u32) -> RgbImage {
        RgbImage::from_fn(edge, edge, |x, y| {
            if (x / cell + y / cell) % 2 == 0 {
                Rgb([255, 255, 255])
            } else {
                Rgb([0, 0, 0])
            }
        })
    }

    #[test]
    fn checkerboard_scores_sharp() {
        let mut backend = LaplacianBackend::default();
        let pair = backend.classify(&checkerboard(128, 8)).unwrap();
        assert!(pair.blur_strength > pair.non_blur_strength);
        assert!(pair.blur_strength > 0.9);
    }

    #[test]
    fn uniform_frame_scores_soft() {
        let mut backend = LaplacianBackend::default();
        let img = RgbImage::from_pixel(128, 128, Rgb([128, 128, 128]));
        let pair = backend.classify(&img).unwrap();
        assert!(pair.blur_strength < pair.non_blur_strength);
        assert!(pair.non_blur_strength > 0.9);
    }

    #[test]
    fn smooth_gradient_scores_soft() {
        let mut backend = LaplacianBackend::default();
        let img = RgbImage::from_fn(128, 128, |x, _| {
            let v = ((x * 255) / 128) as u8;
            Rgb([v, v, v])
        });
        let pair = backend.classify(&img).unwrap();
        assert!(pair.blur_strength < pair.non_blur_strength);
    }

    #[test]
    fn scores_sum_to_one() {
        let mut backend = LaplacianBackend::default();
        let pair = backend.classify(&checkerboard(64, 4)).unwrap();
        assert!((pair.blur_strength + pair.non_blur_strength - 1.0).abs() < 1e-6);
    }

    #[test]
    fn zero_dimension_input_is_a_classification_fault() {
        let mut backend = LaplacianBackend::default();
        let err = backend.classify(&RgbImage::new(0, 0)).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CaptureFault>(),
            Some(CaptureFault::Classification(_))
        ));
    }

    #[test]
    fn variance_metric_orders_sharp_above_soft() {
        let sharp = image::DynamicImage::ImageRgb8(checkerboard(64, 4)).to_luma8();
        let soft = GrayImage::from_pixel(64, 64, image::Luma([100]));
        assert!(laplacian_variance(&sharp) > laplacian_variance(&soft));
        assert!(laplacian_variance(&soft) < 1.0);
    }
}
