//! In-process backends: corner keying and passthrough

use image::{DynamicImage, Rgba, RgbaImage};

use super::{BackgroundRemover, Result};

/// Distance from the corner where the background is sampled
const SAMPLE_OFFSET: u32 = 5;

/// Keys out pixels close to the color found near the top-left corner.
///
/// Suited to studio shots on a flat backdrop.
#[derive(Debug, Clone, Copy)]
pub struct CornerKeyRemover {
    tolerance: u8,
}

impl CornerKeyRemover {
    pub fn new(tolerance: u8) -> Self {
        Self { tolerance }
    }

    fn is_background(&self, pixel: &Rgba<u8>, key: &Rgba<u8>) -> bool {
        (0..3).all(|c| pixel[c].abs_diff(key[c]) < self.tolerance)
    }
}

impl BackgroundRemover for CornerKeyRemover {
    fn name(&self) -> &str {
        "corner-key"
    }

    fn remove_background(&self, image: &DynamicImage) -> Result<RgbaImage> {
        let mut rgba = image.to_rgba8();
        let (width, height) = rgba.dimensions();
        if width == 0 || height == 0 {
            return Ok(rgba);
        }

        let key = *rgba.get_pixel(SAMPLE_OFFSET.min(width - 1), SAMPLE_OFFSET.min(height - 1));
        for pixel in rgba.pixels_mut() {
            if self.is_background(pixel, &key) {
                *pixel = Rgba([0, 0, 0, 0]);
            }
        }

        Ok(rgba)
    }
}

/// Keeps the source alpha channel untouched
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

impl BackgroundRemover for Passthrough {
    fn name(&self) -> &str {
        "passthrough"
    }

    fn remove_background(&self, image: &DynamicImage) -> Result<RgbaImage> {
        Ok(image.to_rgba8())
    }
}
