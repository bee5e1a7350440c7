//! Canvas normalizer
//!
//! Places one cut-out object on a fixed-size transparent canvas.
//!
//! # Algorithm
//!
//! 1. Crop to the alpha bounding box and clean faint edge pixels
//! 2. Scale so the object fills `target_fill` of the canvas height
//! 3. If that overflows the canvas width, scale to the width instead
//! 4. Center vertically, place horizontally per policy, alpha-composite

use image::imageops::{self, FilterType};
use image::RgbaImage;
use tracing::debug;

use super::cleanup::{alpha_bounding_box, clean_alpha};
use super::types::{CanvasError, Result};
use super::{CanvasOptions, HorizontalPolicy, OutputRole};

/// Fixed-canvas normalizer
pub struct CanvasNormalizer;

impl CanvasNormalizer {
    /// Normalize `object` onto a fresh canvas
    pub fn normalize(object: &RgbaImage, options: &CanvasOptions) -> Result<RgbaImage> {
        options.validate()?;

        let bbox = alpha_bounding_box(object, options.alpha_threshold).ok_or(
            CanvasError::EmptyObject {
                threshold: options.alpha_threshold,
            },
        )?;

        let mut cropped =
            imageops::crop_imm(object, bbox.x1, bbox.y1, bbox.width(), bbox.height()).to_image();
        clean_alpha(&mut cropped, options.alpha_threshold);

        let (new_w, new_h) = Self::scaled_size(cropped.width(), cropped.height(), options);
        let resized = if (new_w, new_h) == cropped.dimensions() {
            cropped
        } else {
            imageops::resize(&cropped, new_w, new_h, FilterType::Lanczos3)
        };

        let (paste_x, paste_y) = Self::paste_position(new_w, new_h, options);
        debug!(
            "Object {}x{} -> {}x{} at ({}, {}) on {}x{}",
            bbox.width(),
            bbox.height(),
            new_w,
            new_h,
            paste_x,
            paste_y,
            options.width,
            options.height
        );

        let mut canvas = RgbaImage::new(options.width, options.height);
        imageops::overlay(&mut canvas, &resized, paste_x as i64, paste_y as i64);
        clean_alpha(&mut canvas, options.alpha_threshold);

        Ok(canvas)
    }

    /// Target size for an object cropped to `crop_w` x `crop_h`.
    ///
    /// Height fill is a soft target; width never exceeds the canvas.
    pub fn scaled_size(crop_w: u32, crop_h: u32, options: &CanvasOptions) -> (u32, u32) {
        let crop_w = crop_w.max(1) as u64;
        let crop_h = crop_h.max(1) as u64;
        let canvas_w = options.width as u64;

        let target_h = options.target_height() as u64;
        let new_w = (crop_w * target_h / crop_h).max(1);

        if new_w > canvas_w {
            let capped_h = (crop_h * canvas_w / crop_w).max(1);
            (canvas_w as u32, capped_h as u32)
        } else {
            (new_w as u32, target_h as u32)
        }
    }

    /// Top-left paste position for a `new_w` x `new_h` object
    pub fn paste_position(new_w: u32, new_h: u32, options: &CanvasOptions) -> (u32, u32) {
        let free_w = options.width.saturating_sub(new_w);
        let free_h = options.height.saturating_sub(new_h);

        let x = match options.policy {
            HorizontalPolicy::Center => free_w / 2,
            HorizontalPolicy::Left => 0,
            HorizontalPolicy::Right => free_w,
        };

        (x, free_h / 2)
    }

    /// Cut a full canvas at its vertical midline
    pub fn split_halves(canvas: &RgbaImage) -> (RgbaImage, RgbaImage) {
        let (width, height) = canvas.dimensions();
        let mid = width / 2;

        let left = imageops::crop_imm(canvas, 0, 0, mid, height).to_image();
        let right = imageops::crop_imm(canvas, mid, 0, width - mid, height).to_image();
        (left, right)
    }

    /// Cut one half out of a full canvas and re-normalize it against the seam.
    ///
    /// Fails with `EmptyObject` when the object lies entirely on the other side.
    pub fn normalize_half(
        full: &RgbaImage,
        role: OutputRole,
        options: &CanvasOptions,
    ) -> Result<RgbaImage> {
        let (left, right) = Self::split_halves(full);
        let half = match role {
            OutputRole::LeftHalf => left,
            OutputRole::RightHalf => right,
            OutputRole::Full => full.clone(),
        };
        Self::normalize(&half, &options.for_role(role))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::alpha_bounding_box;
    use crate::matte::BoundingBox;
    use image::Rgba;

    fn opaque_object(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_pixel(w, h, Rgba([90, 20, 30, 255]))
    }

    fn padded_object(w: u32, h: u32, pad: u32) -> RgbaImage {
        let mut img = RgbaImage::new(w + 2 * pad, h + 2 * pad);
        for y in pad..pad + h {
            for x in pad..pad + w {
                img.put_pixel(x, y, Rgba([90, 20, 30, 255]));
            }
        }
        img
    }

    #[test]
    fn test_height_fill_576() {
        let options = CanvasOptions::default();
        assert_eq!(CanvasNormalizer::scaled_size(100, 300, &options), (192, 576));
        assert_eq!(CanvasNormalizer::scaled_size(37, 1000, &options), (21, 576));
    }

    #[test]
    fn test_width_capping() {
        let options = CanvasOptions::default();
        let (w, h) = CanvasNormalizer::scaled_size(400, 100, &options);

        assert_eq!(w, 400);
        assert_eq!(h, 100);
        assert!(h as f64 <= 0.72 * 800.0);
    }

    #[test]
    fn test_width_capping_exact_boundary() {
        let options = CanvasOptions::default();
        // 576 * 0.5 = 288 wide: fits without capping
        assert_eq!(CanvasNormalizer::scaled_size(50, 100, &options), (288, 576));
        // 576 * 1.0 = 576 > 400: capped
        assert_eq!(CanvasNormalizer::scaled_size(100, 100, &options), (400, 400));
    }

    #[test]
    fn test_normalize_centers_object() {
        let options = CanvasOptions::default();
        let canvas = CanvasNormalizer::normalize(&padded_object(100, 300, 17), &options).unwrap();

        assert_eq!(canvas.dimensions(), (400, 800));
        let bbox = alpha_bounding_box(&canvas, 10).unwrap();
        assert_eq!(bbox, BoundingBox::new(104, 112, 296, 688));
        assert_eq!(bbox.height(), 576);
    }

    #[test]
    fn test_normalize_policies() {
        let object = opaque_object(100, 300);

        let left = CanvasOptions::builder().policy(HorizontalPolicy::Left).build();
        let canvas = CanvasNormalizer::normalize(&object, &left).unwrap();
        let bbox = alpha_bounding_box(&canvas, 10).unwrap();
        assert_eq!(bbox.x1, 0);

        let right = CanvasOptions::builder().policy(HorizontalPolicy::Right).build();
        let canvas = CanvasNormalizer::normalize(&object, &right).unwrap();
        let bbox = alpha_bounding_box(&canvas, 10).unwrap();
        assert_eq!(bbox.x2, 400);
    }

    #[test]
    fn test_normalize_empty_object() {
        let object = RgbaImage::from_pixel(50, 50, Rgba([255, 255, 255, 4]));
        let result = CanvasNormalizer::normalize(&object, &CanvasOptions::default());
        assert!(matches!(
            result,
            Err(CanvasError::EmptyObject { threshold: 10 })
        ));
    }

    #[test]
    fn test_normalize_cleans_edges() {
        let mut object = padded_object(60, 200, 10);
        for x in 0..80 {
            object.put_pixel(x, 0, Rgba([255, 255, 255, 5]));
        }

        let canvas = CanvasNormalizer::normalize(&object, &CanvasOptions::default()).unwrap();
        for pixel in canvas.pixels() {
            if pixel[3] < 10 {
                assert_eq!(*pixel, Rgba([0, 0, 0, 0]));
            }
        }
    }

    #[test]
    fn test_paste_position() {
        let options = CanvasOptions::default();
        assert_eq!(CanvasNormalizer::paste_position(192, 576, &options), (104, 112));

        let options = CanvasOptions::builder().policy(HorizontalPolicy::Right).build();
        assert_eq!(CanvasNormalizer::paste_position(192, 576, &options), (208, 112));
    }

    #[test]
    fn test_split_halves_dimensions() {
        let canvas = RgbaImage::new(401, 800);
        let (left, right) = CanvasNormalizer::split_halves(&canvas);
        assert_eq!(left.dimensions(), (200, 800));
        assert_eq!(right.dimensions(), (201, 800));
    }

    #[test]
    fn test_normalize_half_aligns_to_seam() {
        let options = CanvasOptions::default();
        let full = CanvasNormalizer::normalize(&opaque_object(100, 300), &options).unwrap();

        let left = CanvasNormalizer::normalize_half(&full, OutputRole::LeftHalf, &options).unwrap();
        let right =
            CanvasNormalizer::normalize_half(&full, OutputRole::RightHalf, &options).unwrap();
        assert_eq!(left.dimensions(), (200, 800));
        assert_eq!(right.dimensions(), (200, 800));

        let left_box = alpha_bounding_box(&left, 10).unwrap();
        let right_box = alpha_bounding_box(&right, 10).unwrap();
        assert_eq!(left_box.x2, 200);
        assert_eq!(right_box.x1, 0);
    }

    #[test]
    fn test_normalize_half_without_object_is_empty() {
        let options = CanvasOptions::default();
        // A one pixel wide object lands left of the seam after centering
        let full = CanvasNormalizer::normalize(&opaque_object(1, 300), &options).unwrap();
        let left_box = alpha_bounding_box(&full, 10).unwrap();
        assert!(left_box.x2 <= 200);

        let right = CanvasNormalizer::normalize_half(&full, OutputRole::RightHalf, &options);
        assert!(matches!(right, Err(CanvasError::EmptyObject { .. })));
    }

    #[test]
    fn test_invalid_canvas() {
        let options = CanvasOptions::builder().width(0).build();
        let result = CanvasNormalizer::normalize(&opaque_object(10, 10), &options);
        assert!(matches!(result, Err(CanvasError::InvalidCanvas(_))));
    }
}
