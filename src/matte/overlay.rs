//! Debug overlay for split results

use image::{Rgba, RgbaImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

use super::types::SplitOutcome;

/// Outline color for final crop rectangles
const CROP_COLOR: Rgba<u8> = Rgba([255, 0, 0, 255]);

/// Outline color for raw detected regions (before reconciliation)
const DETECTED_COLOR: Rgba<u8> = Rgba([0, 160, 255, 255]);

/// Draw detected regions and final crops onto a copy of the matte.
///
/// Transparent pixels are flattened onto mid grey so the outlines stay
/// visible in any viewer.
pub fn render_overlay(matte: &RgbaImage, outcome: &SplitOutcome) -> RgbaImage {
    let mut canvas = RgbaImage::from_pixel(matte.width(), matte.height(), Rgba([128, 128, 128, 255]));
    image::imageops::overlay(&mut canvas, matte, 0, 0);

    let height = matte.height().max(1);
    for region in &outcome.detected {
        if region.width() == 0 {
            continue;
        }
        let rect = Rect::at(region.start as i32, 0).of_size(region.width(), height);
        draw_hollow_rect_mut(&mut canvas, rect, DETECTED_COLOR);
    }

    for crop in &outcome.crops {
        if crop.bounds.is_empty() {
            continue;
        }
        let rect = Rect::at(crop.bounds.x1 as i32, crop.bounds.y1 as i32)
            .of_size(crop.bounds.width(), crop.bounds.height());
        draw_hollow_rect_mut(&mut canvas, rect, CROP_COLOR);
    }

    canvas
}
