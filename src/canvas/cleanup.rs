//! Alpha edge cleanup and bounding boxes
//!
//! Matting leaves faint, colored fringes around the subject. Pixels below
//! the alpha threshold are zeroed entirely so no halo survives resampling
//! or compositing.

use image::{Rgba, RgbaImage};

use crate::matte::BoundingBox;

/// Zero every pixel whose alpha is below `threshold`.
///
/// Returns the number of pixels cleared.
pub fn clean_alpha(image: &mut RgbaImage, threshold: u8) -> usize {
    let mut cleared = 0;
    for pixel in image.pixels_mut() {
        if pixel[3] < threshold && *pixel != Rgba([0, 0, 0, 0]) {
            *pixel = Rgba([0, 0, 0, 0]);
            cleared += 1;
        }
    }
    cleared
}

/// Tightest box holding every pixel with alpha `>= threshold`.
///
/// A threshold of 0 is treated as 1 so fully transparent pixels never count.
pub fn alpha_bounding_box(image: &RgbaImage, threshold: u8) -> Option<BoundingBox> {
    let threshold = threshold.max(1);
    let (width, height) = image.dimensions();

    let mut min_x = width;
    let mut min_y = height;
    let mut max_x = 0;
    let mut max_y = 0;
    let mut found = false;

    for (x, y, pixel) in image.enumerate_pixels() {
        if pixel[3] >= threshold {
            found = true;
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
    }

    found.then(|| BoundingBox::new(min_x, min_y, max_x + 1, max_y + 1))
}
