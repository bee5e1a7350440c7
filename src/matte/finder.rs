//! Region finder
//!
//! Splits a matte holding several side-by-side objects into one crop per
//! object using the column opacity profile.
//!
//! # Algorithm
//!
//! 1. Mark columns whose alpha sum exceeds a fraction of the maximum
//! 2. Collect contiguous content runs at least `min_object_width` wide
//! 3. Reconcile with the expected count (merge smallest gaps / bisect widest)
//! 4. Find each region's vertical extent from its own row profile

use image::RgbaImage;
use tracing::{debug, info, warn};

use super::profile::{column_profile, content_mask, row_profile};
use super::types::{
    BoundingBox, MatteError, ObjectCrop, Region, RegionCountMismatch, Result, SplitOutcome,
};
use super::RegionOptions;

/// Column-density region finder
pub struct RegionFinder;

impl RegionFinder {
    /// Locate `expected_count` regions in left-to-right order
    pub fn find_regions(
        matte: &RgbaImage,
        expected_count: usize,
        options: &RegionOptions,
    ) -> Result<Vec<Region>> {
        Self::validate(matte, expected_count)?;

        let mask = content_mask(&column_profile(matte), options.column_threshold_ratio);
        let detected = Self::detect_regions(&mask, options.min_object_width);
        Ok(Self::reconcile(detected, expected_count))
    }

    /// Locate regions and crop each one to its vertical extent
    pub fn split(
        matte: &RgbaImage,
        expected_count: usize,
        options: &RegionOptions,
    ) -> Result<SplitOutcome> {
        Self::validate(matte, expected_count)?;

        let mask = content_mask(&column_profile(matte), options.column_threshold_ratio);
        let detected = Self::detect_regions(&mask, options.min_object_width);
        info!(
            "Found {} content regions (expected {})",
            detected.len(),
            expected_count
        );

        let regions = Self::reconcile(detected.clone(), expected_count);

        let mut crops = Vec::with_capacity(regions.len());
        for (index, region) in regions.iter().enumerate() {
            match Self::vertical_extent(matte, region, options) {
                Some(bounds) => {
                    debug!(
                        "Region {}: x={}..{} y={}..{}",
                        index, bounds.x1, bounds.x2, bounds.y1, bounds.y2
                    );
                    let image = image::imageops::crop_imm(
                        matte,
                        bounds.x1,
                        bounds.y1,
                        bounds.width(),
                        bounds.height(),
                    )
                    .to_image();
                    crops.push(ObjectCrop {
                        index,
                        region: *region,
                        bounds,
                        image,
                    });
                }
                None => warn!("Region {} has no visible rows, skipping", index),
            }
        }

        let mismatch = if crops.len() < expected_count {
            let missing_indices = (0..expected_count)
                .filter(|i| !crops.iter().any(|c| c.index == *i))
                .collect();
            Some(RegionCountMismatch {
                expected: expected_count,
                produced: crops.len(),
                missing_indices,
            })
        } else {
            None
        };

        Ok(SplitOutcome {
            detected,
            regions,
            crops,
            mismatch,
        })
    }

    /// Contiguous runs of content columns at least `min_width` wide.
    ///
    /// Narrower runs are dropped as noise.
    pub fn detect_regions(content: &[bool], min_width: u32) -> Vec<Region> {
        let mut regions = Vec::new();
        let mut inside = false;
        let mut start = 0u32;

        for (x, &is_content) in content.iter().enumerate() {
            let x = x as u32;
            if is_content && !inside {
                start = x;
                inside = true;
            } else if !is_content && inside {
                if x - start >= min_width {
                    regions.push(Region::new(start, x));
                }
                inside = false;
            }
        }

        let end = content.len() as u32;
        if inside && end - start >= min_width {
            regions.push(Region::new(start, end));
        }

        regions
    }

    /// Merge or bisect until the count matches `expected_count`.
    ///
    /// Purely geometric: no re-analysis of pixels after a merge or a split.
    pub fn reconcile(mut regions: Vec<Region>, expected_count: usize) -> Vec<Region> {
        while regions.len() > expected_count && regions.len() > 1 {
            Self::merge_smallest_gap(&mut regions);
        }

        while !regions.is_empty() && regions.len() < expected_count {
            if !Self::bisect_widest(&mut regions) {
                break;
            }
        }

        regions
    }

    /// Merge the adjacent pair separated by the smallest gap (leftmost on ties)
    pub fn merge_smallest_gap(regions: &mut Vec<Region>) {
        if regions.len() < 2 {
            return;
        }

        let idx = (0..regions.len() - 1)
            .min_by_key(|&i| regions[i].gap_to(&regions[i + 1]))
            .unwrap_or(0);

        let merged = regions[idx].merge(&regions[idx + 1]);
        debug!(
            "Merging regions {} and {} across gap of {}px",
            idx,
            idx + 1,
            regions[idx].gap_to(&regions[idx + 1])
        );
        regions.splice(idx..idx + 2, [merged]);
    }

    /// Bisect the widest region (rightmost on ties).
    ///
    /// Returns `false` when no region is wide enough to split.
    pub fn bisect_widest(regions: &mut Vec<Region>) -> bool {
        let Some((idx, widest)) = regions
            .iter()
            .enumerate()
            .max_by_key(|(i, r)| (r.width(), *i))
            .map(|(i, r)| (i, *r))
        else {
            return false;
        };

        if widest.width() < 2 {
            return false;
        }

        let (left, right) = widest.bisect();
        debug!(
            "Bisecting region {} ({}..{}) at {}",
            idx, widest.start, widest.end, left.end
        );
        regions.splice(idx..idx + 1, [left, right]);
        true
    }

    /// Vertical extent of the content within `region`, padded by the margin
    pub fn vertical_extent(
        matte: &RgbaImage,
        region: &Region,
        options: &RegionOptions,
    ) -> Option<BoundingBox> {
        let rows = content_mask(
            &row_profile(matte, region.start, region.end),
            options.row_threshold_ratio,
        );

        let first = rows.iter().position(|&c| c)? as u32;
        let last = rows.iter().rposition(|&c| c)? as u32;

        let y1 = first.saturating_sub(options.vertical_margin);
        let y2 = (last + 1 + options.vertical_margin).min(matte.height());
        let x2 = region.end.min(matte.width());

        Some(BoundingBox::new(region.start.min(x2), y1, x2, y2))
    }

    fn validate(matte: &RgbaImage, expected_count: usize) -> Result<()> {
        if expected_count == 0 {
            return Err(MatteError::InvalidExpectedCount(expected_count));
        }
        if matte.width() == 0 || matte.height() == 0 {
            return Err(MatteError::InvalidImage(
                "Matte has zero dimensions".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn blank(w: u32, h: u32) -> RgbaImage {
        RgbaImage::new(w, h)
    }

    fn fill(img: &mut RgbaImage, x0: u32, x1: u32, y0: u32, y1: u32) {
        for y in y0..y1 {
            for x in x0..x1 {
                img.put_pixel(x, y, Rgba([120, 30, 40, 255]));
            }
        }
    }

    fn options() -> RegionOptions {
        RegionOptions::default()
    }

    #[test]
    fn test_single_region_tight_bounds() {
        let mut img = blank(200, 100);
        fill(&mut img, 60, 140, 10, 90);

        let regions = RegionFinder::find_regions(&img, 1, &options()).unwrap();
        assert_eq!(regions, vec![Region::new(60, 140)]);
    }

    #[test]
    fn test_separated_blocks_in_order() {
        let mut img = blank(400, 120);
        fill(&mut img, 10, 70, 10, 110);
        fill(&mut img, 120, 200, 20, 100);
        fill(&mut img, 260, 390, 5, 115);

        let regions = RegionFinder::find_regions(&img, 3, &options()).unwrap();
        assert_eq!(
            regions,
            vec![
                Region::new(10, 70),
                Region::new(120, 200),
                Region::new(260, 390)
            ]
        );
    }

    #[test]
    fn test_block_touching_right_edge_closes_at_width() {
        let mut img = blank(100, 20);
        fill(&mut img, 40, 100, 0, 20);

        let regions = RegionFinder::find_regions(&img, 1, &options()).unwrap();
        assert_eq!(regions, vec![Region::new(40, 100)]);
    }

    #[test]
    fn test_narrow_runs_discarded() {
        let mask: Vec<bool> = (0..100).map(|x| (10..15).contains(&x) || (40..80).contains(&x)).collect();
        let regions = RegionFinder::detect_regions(&mask, 30);
        assert_eq!(regions, vec![Region::new(40, 80)]);
    }

    #[test]
    fn test_faint_columns_below_threshold_are_gaps() {
        let mut img = blank(200, 100);
        fill(&mut img, 20, 80, 0, 100);
        // alpha sum 100 per column, well under 2% of 25500
        for x in 80..120 {
            img.put_pixel(x, 0, Rgba([0, 0, 0, 100]));
        }
        fill(&mut img, 120, 180, 0, 100);

        let regions = RegionFinder::find_regions(&img, 2, &options()).unwrap();
        assert_eq!(regions, vec![Region::new(20, 80), Region::new(120, 180)]);
    }

    #[test]
    fn test_merge_smallest_gap() {
        let regions = vec![
            Region::new(0, 40),
            Region::new(100, 140),
            Region::new(150, 190),
        ];

        let result = RegionFinder::reconcile(regions, 2);
        assert_eq!(result, vec![Region::new(0, 40), Region::new(100, 190)]);
    }

    #[test]
    fn test_merge_leftmost_on_equal_gaps() {
        let regions = vec![
            Region::new(0, 40),
            Region::new(50, 90),
            Region::new(100, 140),
        ];

        let result = RegionFinder::reconcile(regions, 2);
        assert_eq!(result, vec![Region::new(0, 90), Region::new(100, 140)]);
    }

    #[test]
    fn test_bisect_single_region() {
        let result = RegionFinder::reconcile(vec![Region::new(0, 100)], 2);
        assert_eq!(result, vec![Region::new(0, 50), Region::new(50, 100)]);

        let offset = RegionFinder::reconcile(vec![Region::new(30, 130)], 2);
        assert_eq!(offset, vec![Region::new(30, 80), Region::new(80, 130)]);
    }

    #[test]
    fn test_bisect_widest_first() {
        let regions = vec![Region::new(0, 40), Region::new(60, 160)];
        let result = RegionFinder::reconcile(regions, 3);
        assert_eq!(
            result,
            vec![Region::new(0, 40), Region::new(60, 110), Region::new(110, 160)]
        );
    }

    #[test]
    fn test_bisect_rightmost_on_ties() {
        let regions = vec![Region::new(0, 40), Region::new(50, 90)];
        let result = RegionFinder::reconcile(regions, 3);
        assert_eq!(
            result,
            vec![Region::new(0, 40), Region::new(50, 70), Region::new(70, 90)]
        );
    }

    #[test]
    fn test_reconcile_stops_on_unsplittable() {
        let result = RegionFinder::reconcile(vec![Region::new(5, 6)], 3);
        assert_eq!(result, vec![Region::new(5, 6)]);
    }

    #[test]
    fn test_reconcile_empty_stays_empty() {
        assert!(RegionFinder::reconcile(vec![], 2).is_empty());
    }

    #[test]
    fn test_vertical_extent_with_margin() {
        let mut img = blank(100, 200);
        fill(&mut img, 10, 60, 50, 120);

        let bounds =
            RegionFinder::vertical_extent(&img, &Region::new(10, 60), &options()).unwrap();
        assert_eq!(bounds, BoundingBox::new(10, 45, 60, 125));
    }

    #[test]
    fn test_vertical_extent_clamped_to_image() {
        let mut img = blank(50, 40);
        fill(&mut img, 0, 50, 0, 40);

        let bounds =
            RegionFinder::vertical_extent(&img, &Region::new(0, 50), &options()).unwrap();
        assert_eq!(bounds, BoundingBox::new(0, 0, 50, 40));
    }

    #[test]
    fn test_vertical_extent_per_region() {
        let mut img = blank(200, 300);
        fill(&mut img, 10, 60, 20, 280);
        fill(&mut img, 120, 170, 200, 260);

        let tall = RegionFinder::vertical_extent(&img, &Region::new(10, 60), &options()).unwrap();
        let short =
            RegionFinder::vertical_extent(&img, &Region::new(120, 170), &options()).unwrap();

        assert_eq!((tall.y1, tall.y2), (15, 285));
        assert_eq!((short.y1, short.y2), (195, 265));
    }

    #[test]
    fn test_vertical_extent_empty_region() {
        let img = blank(100, 100);
        assert!(RegionFinder::vertical_extent(&img, &Region::new(0, 50), &options()).is_none());
    }

    #[test]
    fn test_split_produces_crops() {
        let mut img = blank(300, 150);
        fill(&mut img, 20, 90, 30, 130);
        fill(&mut img, 180, 260, 10, 140);

        let outcome = RegionFinder::split(&img, 2, &options()).unwrap();
        assert_eq!(outcome.crops.len(), 2);
        assert!(outcome.mismatch.is_none());

        let first = &outcome.crops[0];
        assert_eq!(first.index, 0);
        assert_eq!(first.image.dimensions(), (70, 110));

        let second = &outcome.crops[1];
        assert_eq!(second.region, Region::new(180, 260));
        assert_eq!(second.image.dimensions(), (80, 140));
    }

    #[test]
    fn test_split_reports_mismatch_for_empty_matte() {
        let img = blank(100, 100);
        let outcome = RegionFinder::split(&img, 2, &options()).unwrap();

        assert!(outcome.crops.is_empty());
        let mismatch = outcome.mismatch.unwrap();
        assert_eq!(mismatch.expected, 2);
        assert_eq!(mismatch.produced, 0);
        assert_eq!(mismatch.missing_indices, vec![0, 1]);
    }

    #[test]
    fn test_split_assign_reports_missing_identifiers() {
        let mut img = blank(100, 100);
        fill(&mut img, 10, 50, 10, 90);

        // only one region can be found; a 40px run bisects into two, both visible
        let outcome = RegionFinder::split(&img, 2, &options()).unwrap();
        assert_eq!(outcome.crops.len(), 2);

        let ids = ["left", "right", "extra"];
        let (pairs, missing) = outcome.assign(&ids);
        assert_eq!(pairs.len(), 2);
        assert_eq!(*pairs[0].0, "left");
        assert_eq!(missing, vec![&"extra"]);
    }

    #[test]
    fn test_invalid_expected_count() {
        let img = blank(10, 10);
        let result = RegionFinder::find_regions(&img, 0, &options());
        assert!(matches!(result, Err(MatteError::InvalidExpectedCount(0))));
    }

    #[test]
    fn test_zero_size_matte() {
        let img = blank(0, 0);
        let result = RegionFinder::split(&img, 1, &options());
        assert!(matches!(result, Err(MatteError::InvalidImage(_))));
    }
}
