//! Canvas normalization module
//!
//! Turns one cut-out bottle into a web asset: a fixed-size transparent
//! canvas with the bottle scaled to a target height fill and placed
//! according to its output role.
//!
//! # Features
//!
//! - Alpha bounding box and edge cleanup ([`cleanup`])
//! - Height-fill scaling with width capping ([`CanvasNormalizer`])
//! - Center / left / right placement for full and half canvases
//!
//! # Example
//!
//! ```rust,no_run
//! use bottle_prep::{CanvasNormalizer, CanvasOptions, HorizontalPolicy};
//!
//! let bottle = image::open("bottle.png").unwrap().to_rgba8();
//! let options = CanvasOptions::builder()
//!     .size(400, 800)
//!     .target_fill(0.72)
//!     .policy(HorizontalPolicy::Center)
//!     .build();
//!
//! let canvas = CanvasNormalizer::normalize(&bottle, &options).unwrap();
//! canvas.save("bottle-full.png").unwrap();
//! ```

pub mod cleanup;
mod normalize;
mod types;

// Re-export public API
pub use cleanup::{alpha_bounding_box, clean_alpha};
pub use normalize::CanvasNormalizer;
pub use types::{CanvasError, Result};

use serde::{Deserialize, Serialize};

// ============================================================
// Constants
// ============================================================

/// Default full canvas width
pub const DEFAULT_CANVAS_WIDTH: u32 = 400;

/// Default canvas height
pub const DEFAULT_CANVAS_HEIGHT: u32 = 800;

/// Bottles fill 72% of the canvas height
pub const DEFAULT_TARGET_FILL: f64 = 0.72;

/// Pixels with lower alpha are matting noise
pub const DEFAULT_ALPHA_THRESHOLD: u8 = 10;

// ============================================================
// Options
// ============================================================

/// Horizontal placement of the object on the canvas
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum HorizontalPolicy {
    /// Centered
    #[default]
    Center,
    /// Flush with the left edge
    Left,
    /// Flush with the right edge
    Right,
}

/// Which asset a canvas becomes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputRole {
    /// Whole bottle on a full-width canvas
    Full,
    /// Left half, aligned against the seam on its right edge
    LeftHalf,
    /// Right half, aligned against the seam on its left edge
    RightHalf,
}

impl OutputRole {
    /// File name suffix without extension
    pub fn suffix(&self) -> &'static str {
        match self {
            OutputRole::Full => "full",
            OutputRole::LeftHalf => "left",
            OutputRole::RightHalf => "right",
        }
    }

    /// Placement policy for this role
    pub fn policy(&self) -> HorizontalPolicy {
        match self {
            OutputRole::Full => HorizontalPolicy::Center,
            OutputRole::LeftHalf => HorizontalPolicy::Right,
            OutputRole::RightHalf => HorizontalPolicy::Left,
        }
    }

    /// Output file name for an identifier, e.g. `colheita-full.png`
    pub fn file_name(&self, identifier: &str) -> String {
        format!("{}-{}.png", identifier, self.suffix())
    }

    /// Parse `<identifier>-<full|left|right>.png`
    pub fn from_file_name(name: &str) -> Option<(&str, OutputRole)> {
        let stem = name.strip_suffix(".png")?;
        [OutputRole::Full, OutputRole::LeftHalf, OutputRole::RightHalf]
            .into_iter()
            .find_map(|role| {
                stem.strip_suffix(role.suffix())
                    .and_then(|s| s.strip_suffix('-'))
                    .filter(|id| !id.is_empty())
                    .map(|id| (id, role))
            })
    }
}

/// Canvas normalization options
#[derive(Debug, Clone, PartialEq)]
pub struct CanvasOptions {
    /// Canvas width in pixels
    pub width: u32,
    /// Canvas height in pixels
    pub height: u32,
    /// Fraction of the canvas height the object should occupy
    pub target_fill: f64,
    /// Horizontal placement
    pub policy: HorizontalPolicy,
    /// Alpha below this value is cleared before compositing
    pub alpha_threshold: u8,
}

impl Default for CanvasOptions {
    fn default() -> Self {
        Self {
            width: DEFAULT_CANVAS_WIDTH,
            height: DEFAULT_CANVAS_HEIGHT,
            target_fill: DEFAULT_TARGET_FILL,
            policy: HorizontalPolicy::Center,
            alpha_threshold: DEFAULT_ALPHA_THRESHOLD,
        }
    }
}

impl CanvasOptions {
    /// Create a new options builder
    pub fn builder() -> CanvasOptionsBuilder {
        CanvasOptionsBuilder::default()
    }

    /// Options for a role derived from full-canvas options.
    ///
    /// Half canvases are half as wide.
    pub fn for_role(&self, role: OutputRole) -> Self {
        let width = match role {
            OutputRole::Full => self.width,
            OutputRole::LeftHalf | OutputRole::RightHalf => (self.width / 2).max(1),
        };
        Self {
            width,
            policy: role.policy(),
            ..self.clone()
        }
    }

    /// Object height in pixels when height fill applies
    pub fn target_height(&self) -> u32 {
        ((self.height as f64 * self.target_fill).round() as u32).max(1)
    }

    /// Reject degenerate canvases
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(CanvasError::InvalidCanvas(format!(
                "canvas size must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        if !(self.target_fill > 0.0 && self.target_fill <= 1.0) {
            return Err(CanvasError::InvalidCanvas(format!(
                "target fill must be in (0, 1], got {}",
                self.target_fill
            )));
        }
        Ok(())
    }
}

/// Builder for CanvasOptions
#[derive(Debug, Default)]
pub struct CanvasOptionsBuilder {
    options: CanvasOptions,
}

impl CanvasOptionsBuilder {
    /// Set canvas width and height
    #[must_use]
    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.options.width = width;
        self.options.height = height;
        self
    }

    /// Set canvas width
    #[must_use]
    pub fn width(mut self, width: u32) -> Self {
        self.options.width = width;
        self
    }

    /// Set canvas height
    #[must_use]
    pub fn height(mut self, height: u32) -> Self {
        self.options.height = height;
        self
    }

    /// Set target height fill
    #[must_use]
    pub fn target_fill(mut self, fill: f64) -> Self {
        self.options.target_fill = fill;
        self
    }

    /// Set horizontal placement
    #[must_use]
    pub fn policy(mut self, policy: HorizontalPolicy) -> Self {
        self.options.policy = policy;
        self
    }

    /// Set alpha cleanup threshold
    #[must_use]
    pub fn alpha_threshold(mut self, threshold: u8) -> Self {
        self.options.alpha_threshold = threshold;
        self
    }

    /// Build the options
    #[must_use]
    pub fn build(self) -> CanvasOptions {
        self.options
    }
}
