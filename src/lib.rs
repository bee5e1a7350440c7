//! bottle-prep - wine bottle photographs to web-ready transparent canvases
//!
//! Processing flow for each source photograph:
//!
//! 1. Background removal through a [`BackgroundRemover`] backend
//! 2. Edge cleanup of low-alpha pixels ([`clean_alpha`])
//! 3. Splitting group shots into per-bottle crops ([`RegionFinder`])
//! 4. Scaling and placement on a fixed canvas ([`CanvasNormalizer`])
//! 5. Catalog export of the written assets ([`Catalog`])
//!
//! [`BottlePipeline`] drives a whole [`Manifest`] through these steps.

pub mod canvas;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod manifest;
pub mod matte;
pub mod matting;
pub mod pipeline;
pub mod progress;

// Canvas
pub use canvas::{
    alpha_bounding_box, clean_alpha, CanvasError, CanvasNormalizer, CanvasOptions,
    HorizontalPolicy, OutputRole,
};

// Catalog
pub use catalog::{Catalog, CatalogEntry, CatalogError, ProcessedAsset};

// CLI
pub use cli::{CanvasArgs, Cli, Commands, MattingArgs, NormalizeArgs, ProcessArgs, SplitArgs};

// Config
pub use config::{CliOverrides, Config, ConfigError, PipelineConfig, TuningOverrides};

// Manifest
pub use manifest::{Bottle, Manifest, ManifestError, MissingSource, SourceEntry};

// Region finder
pub use matte::{
    render_overlay, BoundingBox, MatteError, ObjectCrop, Region, RegionCountMismatch,
    RegionFinder, RegionOptions, SplitOutcome,
};

// Matting
pub use matting::{
    create_remover, BackgroundRemover, CornerKeyRemover, MattingBackend, MattingConfig,
    MattingError, Passthrough, RembgCommand,
};

// Pipeline
pub use pipeline::{
    archive_source, cleanup_sources, output_roles, source_done, BatchReport, BottlePipeline,
    FailedBottle, ItemReport, PipelineError, ProgressCallback, SilentProgress,
};

// Progress tracking
pub use progress::{batch_bar, BatchProgress, BatchSummary, ProcessingStage, Verbosity};

/// Process exit codes
pub mod exit_codes {
    /// Everything succeeded
    pub const SUCCESS: i32 = 0;
    /// Unexpected error (bad config, unreadable manifest, ...)
    pub const GENERAL_ERROR: i32 = 1;
    /// Manifest, input or source files not found
    pub const INPUT_NOT_FOUND: i32 = 2;
    /// Some bottles failed or received no image
    pub const PARTIAL_FAILURE: i32 = 3;
}
