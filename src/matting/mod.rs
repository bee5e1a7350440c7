//! Background removal backends
//!
//! The matting step is an external collaborator: it turns a photograph into
//! a matte with per-pixel opacity. Its accuracy is not modeled here.
//!
//! Backends:
//!
//! - [`RembgCommand`] - runs the external `rembg` CLI
//! - [`CornerKeyRemover`] - keys out a flat studio background sampled near a corner
//! - [`Passthrough`] - keeps the source alpha (for sources already cut out)

mod key;
mod rembg;

pub use key::{CornerKeyRemover, Passthrough};
pub use rembg::RembgCommand;

use image::{DynamicImage, RgbaImage};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================
// Constants
// ============================================================

/// Default external command name
pub const DEFAULT_REMBG_COMMAND: &str = "rembg";

/// Per-channel tolerance for corner keying
pub const DEFAULT_KEY_TOLERANCE: u8 = 30;

// ============================================================
// Error Types
// ============================================================

/// Matting error types
#[derive(Debug, Error)]
pub enum MattingError {
    #[error("Background removal tool not found: {0}")]
    ToolNotFound(String),

    #[error("Background removal command failed: {0}")]
    CommandFailed(String),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, MattingError>;

// ============================================================
// Trait
// ============================================================

/// Synchronous, best-effort background removal
pub trait BackgroundRemover {
    /// Short backend name for logs
    fn name(&self) -> &str;

    /// Produce an RGBA matte of the same size as `image`
    fn remove_background(&self, image: &DynamicImage) -> Result<RgbaImage>;
}

// ============================================================
// Configuration
// ============================================================

/// Available matting backends
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum MattingBackend {
    /// External `rembg` command
    #[default]
    Rembg,
    /// Flat background keyed from a corner sample
    CornerKey,
    /// Keep the source alpha channel
    Passthrough,
}

impl MattingBackend {
    pub fn name(&self) -> &'static str {
        match self {
            MattingBackend::Rembg => "rembg",
            MattingBackend::CornerKey => "corner-key",
            MattingBackend::Passthrough => "passthrough",
        }
    }
}

/// Matting configuration (`[matting]` in the config file)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MattingConfig {
    /// Backend to use
    pub backend: MattingBackend,
    /// Command name or path for the rembg backend
    pub command: String,
    /// Optional rembg model name (`-m`)
    pub model: Option<String>,
    /// Per-channel tolerance for the corner-key backend
    pub tolerance: u8,
}

impl Default for MattingConfig {
    fn default() -> Self {
        Self {
            backend: MattingBackend::Rembg,
            command: DEFAULT_REMBG_COMMAND.to_string(),
            model: None,
            tolerance: DEFAULT_KEY_TOLERANCE,
        }
    }
}

/// Build the configured backend
pub fn create_remover(config: &MattingConfig) -> Result<Box<dyn BackgroundRemover>> {
    Ok(match config.backend {
        MattingBackend::Rembg => Box::new(RembgCommand::locate(
            &config.command,
            config.model.clone(),
        )?),
        MattingBackend::CornerKey => Box::new(CornerKeyRemover::new(config.tolerance)),
        MattingBackend::Passthrough => Box::new(Passthrough),
    })
}
