//! Matte module core types
//!
//! Contains the geometric types shared by region detection and cropping.

use image::RgbaImage;
use thiserror::Error;

// ============================================================
// Error Types
// ============================================================

/// Region detection error types
#[derive(Debug, Error)]
pub enum MatteError {
    #[error("Invalid matte: {0}")]
    InvalidImage(String),

    #[error("Expected object count must be at least 1, got {0}")]
    InvalidExpectedCount(usize),
}

pub type Result<T> = std::result::Result<T, MatteError>;

// ============================================================
// Core Data Structures
// ============================================================

/// Half-open horizontal interval `[start, end)` holding one object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub start: u32,
    pub end: u32,
}

impl Region {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    /// Width in columns
    pub fn width(&self) -> u32 {
        self.end.saturating_sub(self.start)
    }

    /// Gap in columns between this region and the next one to the right
    pub fn gap_to(&self, next: &Region) -> u32 {
        next.start.saturating_sub(self.end)
    }

    /// Region spanning from this region's start to `other`'s end
    pub fn merge(&self, other: &Region) -> Region {
        Region::new(self.start.min(other.start), self.end.max(other.end))
    }

    /// Bisect at the midpoint into `[start, mid)` and `[mid, end)`
    pub fn bisect(&self) -> (Region, Region) {
        let mid = self.start + self.width() / 2;
        (Region::new(self.start, mid), Region::new(mid, self.end))
    }
}

/// Axis-aligned half-open box `(x1, y1, x2, y2)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl BoundingBox {
    pub fn new(x1: u32, y1: u32, x2: u32, y2: u32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> u32 {
        self.x2.saturating_sub(self.x1)
    }

    pub fn height(&self) -> u32 {
        self.y2.saturating_sub(self.y1)
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }
}

/// One object cut out of a multi-object matte
#[derive(Debug, Clone)]
pub struct ObjectCrop {
    /// Position of the source region in left-to-right order
    pub index: usize,
    /// Horizontal extent in the matte
    pub region: Region,
    /// Crop rectangle in matte coordinates (vertical margin applied)
    pub bounds: BoundingBox,
    /// Cropped pixels
    pub image: RgbaImage,
}

/// Fewer crops were produced than identifiers were expected
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionCountMismatch {
    pub expected: usize,
    pub produced: usize,
    /// Region indices (0-based, left to right) that produced no crop
    pub missing_indices: Vec<usize>,
}

/// Result of splitting a matte into per-object crops
#[derive(Debug, Clone)]
pub struct SplitOutcome {
    /// Regions as detected before reconciliation
    pub detected: Vec<Region>,
    /// Regions after merge/bisect reconciliation
    pub regions: Vec<Region>,
    /// Crops in left-to-right order
    pub crops: Vec<ObjectCrop>,
    /// Set when fewer crops than expected were produced
    pub mismatch: Option<RegionCountMismatch>,
}

impl SplitOutcome {
    /// Pair crops with caller-supplied identifiers by region position.
    ///
    /// Returns the pairs and the identifiers that received no image.
    pub fn assign<'a, T>(&'a self, identifiers: &'a [T]) -> (Vec<(&'a T, &'a ObjectCrop)>, Vec<&'a T>) {
        let mut pairs = Vec::with_capacity(self.crops.len());
        let mut missing = Vec::new();

        for (index, id) in identifiers.iter().enumerate() {
            match self.crops.iter().find(|c| c.index == index) {
                Some(crop) => pairs.push((id, crop)),
                None => missing.push(id),
            }
        }

        (pairs, missing)
    }
}
