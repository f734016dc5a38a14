//! Detector-space to view-space box mapping.
//!
//! The face detector reports boxes in source-image pixel coordinates. The
//! preview view has its own pixel space, a different aspect ratio, and may be
//! horizontally mirrored (front camera). This module owns that remapping and
//! the border compositing used when an overlay is burned into a captured
//! photo.
//!
//! Scaling policy is crop-to-fill: scale by the larger of the width/height
//! ratios so the view is fully covered, cropping the excess. The width/height
//! swap in the scale factors accounts for the 90-degree sensor rotation of a
//! portrait preview.

use anyhow::Result;
use image::{Rgb, RgbImage};

use crate::CaptureFault;

/// Axis-aligned face box in source-image pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DetectionBox {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl DetectionBox {
    pub fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    pub fn area(&self) -> f32 {
        self.width().max(0.0) * self.height().max(0.0)
    }
}

/// Axis-aligned face box in destination view pixels, valid for one draw pass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OverlayBox {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl OverlayBox {
    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }
}

/// Destination view geometry.
#[derive(Clone, Copy, Debug)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
    /// Front-camera preview: reflect boxes around the vertical center line.
    pub mirrored: bool,
}

impl Viewport {
    pub fn new(width: u32, height: u32, mirrored: bool) -> Self {
        Self {
            width,
            height,
            mirrored,
        }
    }
}

/// Map a detector-space box into view space.
///
/// Fails with `CaptureFault::InvalidDimensions` on zero source or view
/// extents; the caller skips drawing that box.
pub fn map_to_view(
    view: &Viewport,
    source_width: u32,
    source_height: u32,
    face: &DetectionBox,
) -> Result<OverlayBox> {
    if source_width == 0 || source_height == 0 {
        return Err(CaptureFault::InvalidDimensions {
            width: source_width,
            height: source_height,
        }
        .into());
    }
    if view.width == 0 || view.height == 0 {
        return Err(CaptureFault::InvalidDimensions {
            width: view.width,
            height: view.height,
        }
        .into());
    }

    let view_w = view.width as f32;
    let view_h = view.height as f32;
    let src_w = source_width as f32;
    let src_h = source_height as f32;

    // Width/height swapped: the sensor delivers landscape buffers into a
    // portrait view.
    let scale_x = view_w / src_h;
    let scale_y = view_h / src_w;
    let scale = scale_x.max(scale_y);

    let offset_x = (view_w - src_h * scale) / 2.0;
    let offset_y = (view_h - src_w * scale) / 2.0;

    let mut mapped = OverlayBox {
        left: face.left * scale + offset_x,
        top: face.top * scale + offset_y,
        right: face.right * scale + offset_x,
        bottom: face.bottom * scale + offset_y,
    };

    if view.mirrored {
        // Pure reflection around the vertical center line: width and
        // left < right ordering are preserved.
        let center_x = view_w / 2.0;
        let (left, right) = (mapped.left, mapped.right);
        mapped.left = 2.0 * center_x - right;
        mapped.right = 2.0 * center_x - left;
    }

    Ok(mapped)
}

// ----------------------------------------------------------------------------
// Border compositing
// ----------------------------------------------------------------------------

/// Default overlay stroke: green, 6 px.
pub const DEFAULT_BOX_COLOR: [u8; 3] = [0, 255, 0];
pub const DEFAULT_BOX_THICKNESS: u32 = 6;

/// Draw a box border into an RGB image, clamped to image bounds.
///
/// Boxes that collapse to nothing inside the image are skipped silently; a
/// partially off-screen box draws its visible portion.
pub fn draw_box(img: &mut RgbImage, overlay: &OverlayBox, color: [u8; 3], thickness: u32) {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return;
    }

    let clamp = |v: f32, max: u32| -> u32 { v.max(0.0).min((max - 1) as f32) as u32 };
    let x0 = clamp(overlay.left, w);
    let y0 = clamp(overlay.top, h);
    let x1 = clamp(overlay.right, w);
    let y1 = clamp(overlay.bottom, h);
    if x0 > x1 || y0 > y1 {
        return;
    }

    let px = Rgb(color);
    for t in 0..thickness {
        let xx0 = x0.saturating_add(t);
        let yy0 = y0.saturating_add(t);
        let xx1 = x1.saturating_sub(t);
        let yy1 = y1.saturating_sub(t);
        if xx0 > xx1 || yy0 > yy1 {
            break;
        }
        for x in xx0..=xx1 {
            img.put_pixel(x, yy0, px);
            img.put_pixel(x, yy1, px);
        }
        for y in yy0..=yy1 {
            img.put_pixel(xx0, y, px);
            img.put_pixel(xx1, y, px);
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CaptureFault;

    #[test]
    fn square_source_doubles_into_square_view() {
        let view = Viewport::new(400, 400, false);
        let face = DetectionBox::new(10.0, 10.0, 100.0, 100.0);

        let mapped = map_to_view(&view, 200, 200, &face).unwrap();
        assert_eq!(mapped.left, 20.0);
        assert_eq!(mapped.top, 20.0);
        assert_eq!(mapped.right, 200.0);
        assert_eq!(mapped.bottom, 200.0);
    }

    #[test]
    fn mapped_box_stays_inside_view() {
        // Source boxes inside [0, src_h] x [0, src_w] land inside the view
        // after crop-to-fill scaling.
        let view = Viewport::new(1080, 1920, false);
        let (src_w, src_h) = (640u32, 480u32);

        for &(l, t, r, b) in &[
            (0.0, 0.0, 480.0, 640.0),
            (10.0, 20.0, 200.0, 300.0),
            (400.0, 500.0, 480.0, 640.0),
        ] {
            let face = DetectionBox::new(l, t, r, b);
            let mapped = map_to_view(&view, src_w, src_h, &face).unwrap();
            let scale = (1080.0f32 / 480.0).max(1920.0 / 640.0);
            let span_x = 480.0 * scale;
            // Crop-to-fill pushes the cropped axis outside [0, view]; the
            // covered axis stays within bounds.
            assert!(mapped.left >= (1080.0 - span_x) / 2.0 - 0.01);
            assert!(mapped.top >= -0.01);
            assert!(mapped.bottom <= 1920.0 + 0.01);
        }
    }

    #[test]
    fn mirroring_reflects_and_preserves_width() {
        let plain = Viewport::new(400, 400, false);
        let mirrored = Viewport::new(400, 400, true);
        let face = DetectionBox::new(10.0, 10.0, 100.0, 100.0);

        let mapped = map_to_view(&plain, 200, 200, &face).unwrap();
        let flipped = map_to_view(&mirrored, 200, 200, &face).unwrap();

        assert_eq!(flipped.left, 400.0 - mapped.right);
        assert_eq!(flipped.right, 400.0 - mapped.left);
        assert!(flipped.left < flipped.right);
        assert_eq!(flipped.width(), mapped.width());
        assert_eq!(flipped.top, mapped.top);
        assert_eq!(flipped.bottom, mapped.bottom);
    }

    #[test]
    fn zero_extents_fail_with_invalid_dimensions() {
        let face = DetectionBox::new(0.0, 0.0, 10.0, 10.0);

        let err = map_to_view(&Viewport::new(400, 400, false), 0, 200, &face).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CaptureFault>(),
            Some(CaptureFault::InvalidDimensions { .. })
        ));

        let err = map_to_view(&Viewport::new(0, 400, false), 200, 200, &face).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CaptureFault>(),
            Some(CaptureFault::InvalidDimensions { .. })
        ));
    }

    #[test]
    fn draw_box_paints_border_and_clamps() {
        let mut img = RgbImage::from_pixel(20, 20, Rgb([0, 0, 0]));
        let overlay = OverlayBox {
            left: 2.0,
            top: 2.0,
            right: 10.0,
            bottom: 10.0,
        };
        draw_box(&mut img, &overlay, [0, 255, 0], 1);

        assert_eq!(img.get_pixel(2, 2).0, [0, 255, 0]);
        assert_eq!(img.get_pixel(10, 2).0, [0, 255, 0]);
        assert_eq!(img.get_pixel(2, 10).0, [0, 255, 0]);
        // Interior untouched.
        assert_eq!(img.get_pixel(5, 5).0, [0, 0, 0]);

        // Partially off-screen box must not panic and draws what is visible.
        let wild = OverlayBox {
            left: -50.0,
            top: -50.0,
            right: 500.0,
            bottom: 500.0,
        };
        draw_box(&mut img, &wild, [255, 0, 0], 2);
        assert_eq!(img.get_pixel(0, 0).0, [255, 0, 0]);
    }
}
