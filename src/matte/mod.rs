//! Matte splitting module
//!
//! Splits a background-removed photograph holding several bottles into
//! one crop per bottle by analyzing the alpha channel column by column.
//!
//! # Features
//!
//! - Adaptive content threshold relative to the densest column
//! - Merge / bisect reconciliation against the expected bottle count
//! - Per-region vertical extents so short bottles get short crops
//! - Debug overlay rendering of detected and final regions
//!
//! # Example
//!
//! ```rust,no_run
//! use bottle_prep::{RegionFinder, RegionOptions};
//!
//! let matte = image::open("case.png").unwrap().to_rgba8();
//! let options = RegionOptions::builder().min_object_width(40).build();
//!
//! let outcome = RegionFinder::split(&matte, 3, &options).unwrap();
//! for crop in &outcome.crops {
//!     println!("bottle {} at x={}..{}", crop.index, crop.region.start, crop.region.end);
//! }
//! ```

mod finder;
mod overlay;
mod profile;
mod types;

// Re-export public API
pub use finder::RegionFinder;
pub use overlay::render_overlay;
pub use profile::{column_profile, content_mask, row_profile};
pub use types::{
    BoundingBox, MatteError, ObjectCrop, Region, RegionCountMismatch, Result, SplitOutcome,
};

use serde::{Deserialize, Serialize};

// ============================================================
// Constants
// ============================================================

/// Column is content when its alpha sum exceeds this fraction of the maximum
pub const DEFAULT_COLUMN_THRESHOLD: f64 = 0.02;

/// Row is content when its alpha sum exceeds this fraction of the region maximum
pub const DEFAULT_ROW_THRESHOLD: f64 = 0.01;

/// Rows of padding added above and below each crop
pub const DEFAULT_VERTICAL_MARGIN: u32 = 5;

/// Narrower content runs are treated as noise
pub const DEFAULT_MIN_OBJECT_WIDTH: u32 = 30;

const MIN_RATIO: f64 = 0.0;
const MAX_RATIO: f64 = 1.0;

// ============================================================
// Options
// ============================================================

/// Region detection options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionOptions {
    /// Column content threshold as a fraction of the maximum column sum
    pub column_threshold_ratio: f64,
    /// Row content threshold as a fraction of the region's maximum row sum
    pub row_threshold_ratio: f64,
    /// Vertical crop margin in pixels
    pub vertical_margin: u32,
    /// Minimum width of a detected region in pixels
    pub min_object_width: u32,
}

impl Default for RegionOptions {
    fn default() -> Self {
        Self {
            column_threshold_ratio: DEFAULT_COLUMN_THRESHOLD,
            row_threshold_ratio: DEFAULT_ROW_THRESHOLD,
            vertical_margin: DEFAULT_VERTICAL_MARGIN,
            min_object_width: DEFAULT_MIN_OBJECT_WIDTH,
        }
    }
}

impl RegionOptions {
    /// Create a new options builder
    pub fn builder() -> RegionOptionsBuilder {
        RegionOptionsBuilder::default()
    }
}

/// Builder for RegionOptions
#[derive(Debug, Default)]
pub struct RegionOptionsBuilder {
    options: RegionOptions,
}

impl RegionOptionsBuilder {
    /// Set column threshold ratio (0.0-1.0)
    #[must_use]
    pub fn column_threshold_ratio(mut self, ratio: f64) -> Self {
        self.options.column_threshold_ratio = ratio.clamp(MIN_RATIO, MAX_RATIO);
        self
    }

    /// Set row threshold ratio (0.0-1.0)
    #[must_use]
    pub fn row_threshold_ratio(mut self, ratio: f64) -> Self {
        self.options.row_threshold_ratio = ratio.clamp(MIN_RATIO, MAX_RATIO);
        self
    }

    /// Set vertical margin in pixels
    #[must_use]
    pub fn vertical_margin(mut self, margin: u32) -> Self {
        self.options.vertical_margin = margin;
        self
    }

    /// Set minimum object width in pixels
    #[must_use]
    pub fn min_object_width(mut self, width: u32) -> Self {
        self.options.min_object_width = width;
        self
    }

    /// Build the options
    #[must_use]
    pub fn build(self) -> RegionOptions {
        self.options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let opts = RegionOptions::default();

        assert_eq!(opts.column_threshold_ratio, 0.02);
        assert_eq!(opts.row_threshold_ratio, 0.01);
        assert_eq!(opts.vertical_margin, 5);
        assert_eq!(opts.min_object_width, 30);
    }

    #[test]
    fn test_builder_pattern() {
        let opts = RegionOptions::builder()
            .column_threshold_ratio(0.05)
            .row_threshold_ratio(0.02)
            .vertical_margin(8)
            .min_object_width(12)
            .build();

        assert_eq!(opts.column_threshold_ratio, 0.05);
        assert_eq!(opts.row_threshold_ratio, 0.02);
        assert_eq!(opts.vertical_margin, 8);
        assert_eq!(opts.min_object_width, 12);
    }

    #[test]
    fn test_builder_clamping() {
        let opts = RegionOptions::builder().column_threshold_ratio(1.5).build();
        assert_eq!(opts.column_threshold_ratio, 1.0);

        let opts = RegionOptions::builder().row_threshold_ratio(-0.5).build();
        assert_eq!(opts.row_threshold_ratio, 0.0);
    }

    #[test]
    fn test_region_geometry() {
        let a = Region::new(10, 50);
        let b = Region::new(70, 90);

        assert_eq!(a.width(), 40);
        assert_eq!(a.gap_to(&b), 20);
        assert_eq!(a.merge(&b), Region::new(10, 90));
        assert_eq!(a.bisect(), (Region::new(10, 30), Region::new(30, 50)));
    }

    #[test]
    fn test_bisect_odd_width() {
        let (left, right) = Region::new(0, 7).bisect();
        assert_eq!(left, Region::new(0, 3));
        assert_eq!(right, Region::new(3, 7));
    }

    #[test]
    fn test_bounding_box_dimensions() {
        let bbox = BoundingBox::new(5, 10, 25, 60);
        assert_eq!(bbox.width(), 20);
        assert_eq!(bbox.height(), 50);
        assert!(!bbox.is_empty());
        assert!(BoundingBox::new(5, 5, 5, 10).is_empty());
    }

    #[test]
    fn test_error_display_messages() {
        let err = MatteError::InvalidImage("zero".to_string());
        assert!(err.to_string().contains("Invalid matte"));

        let err = MatteError::InvalidExpectedCount(0);
        assert!(err.to_string().contains("at least 1"));
    }

    #[test]
    fn test_options_toml_partial() {
        let opts: RegionOptions = toml::from_str("min_object_width = 50").unwrap();
        assert_eq!(opts.min_object_width, 50);
        assert_eq!(opts.column_threshold_ratio, DEFAULT_COLUMN_THRESHOLD);
    }
}
