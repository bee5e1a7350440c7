//! Opacity profiles
//!
//! Column and row sums of the alpha channel. Summation is split across
//! rows with rayon; the reductions are integer and therefore deterministic.

use image::RgbaImage;
use rayon::prelude::*;

/// Sum of alpha per column over all rows
pub fn column_profile(matte: &RgbaImage) -> Vec<u64> {
    let width = matte.width() as usize;
    if width == 0 || matte.height() == 0 {
        return vec![0; width];
    }

    matte
        .as_raw()
        .par_chunks(width * 4)
        .fold(
            || vec![0u64; width],
            |mut acc, row| {
                for (x, px) in row.chunks_exact(4).enumerate() {
                    acc[x] += px[3] as u64;
                }
                acc
            },
        )
        .reduce(
            || vec![0u64; width],
            |mut a, b| {
                for (x, v) in b.into_iter().enumerate() {
                    a[x] += v;
                }
                a
            },
        )
}

/// Sum of alpha per row, restricted to columns `[x_start, x_end)`
pub fn row_profile(matte: &RgbaImage, x_start: u32, x_end: u32) -> Vec<u64> {
    let width = matte.width() as usize;
    let x_start = (x_start as usize).min(width);
    let x_end = (x_end as usize).clamp(x_start, width);
    if width == 0 {
        return vec![0; matte.height() as usize];
    }

    matte
        .as_raw()
        .par_chunks(width * 4)
        .map(|row| {
            row[x_start * 4..x_end * 4]
                .chunks_exact(4)
                .map(|px| px[3] as u64)
                .sum::<u64>()
        })
        .collect()
}

/// Indices whose value strictly exceeds `ratio * max(profile)`.
///
/// An all-zero profile has no content.
pub fn content_mask(profile: &[u64], ratio: f64) -> Vec<bool> {
    let max = profile.iter().copied().max().unwrap_or(0);
    if max == 0 {
        return vec![false; profile.len()];
    }

    let threshold = max as f64 * ratio;
    profile.iter().map(|&v| v as f64 > threshold).collect()
}
