//! Command-line interface definitions

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::canvas::HorizontalPolicy;
use crate::matting::MattingBackend;

/// Cut wine bottles out of photographs and normalize them onto transparent canvases
#[derive(Debug, Parser)]
#[command(name = "bottle-prep", version, about, long_about = None)]
pub struct Cli {
    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress progress output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Process every source listed in a manifest
    Process(ProcessArgs),
    /// Split one group photograph into per-bottle images
    Split(SplitArgs),
    /// Normalize already cut-out images onto canvases
    Normalize(NormalizeArgs),
    /// Show system information and external tool status
    Info,
}

/// Canvas size and fill overrides shared by several commands
#[derive(Debug, Clone, Default, Args)]
pub struct CanvasArgs {
    /// Canvas width in pixels
    #[arg(long)]
    pub width: Option<u32>,

    /// Canvas height in pixels
    #[arg(long)]
    pub height: Option<u32>,

    /// Fraction of the canvas height the bottle fills
    #[arg(long)]
    pub fill: Option<f64>,

    /// Pixels with alpha below this become fully transparent
    #[arg(long)]
    pub alpha_threshold: Option<u8>,
}

/// Matting backend overrides
#[derive(Debug, Clone, Default, Args)]
pub struct MattingArgs {
    /// Background removal backend
    #[arg(long, value_enum)]
    pub backend: Option<MattingBackend>,

    /// rembg command name or path
    #[arg(long)]
    pub rembg_command: Option<String>,

    /// rembg model name
    #[arg(long)]
    pub model: Option<String>,
}

#[derive(Debug, Args)]
pub struct ProcessArgs {
    /// Manifest JSON file
    pub manifest: PathBuf,

    /// Directory holding the raw photographs (default: manifest directory)
    #[arg(short, long)]
    pub source_dir: Option<PathBuf>,

    /// Output directory for normalized PNGs
    #[arg(short, long, default_value = "normalized")]
    pub output: PathBuf,

    /// Config file (default: ./bottle-prep.toml or the user config directory)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Overwrite existing outputs
    #[arg(short, long)]
    pub force: bool,

    /// Abort before processing when any source is missing
    #[arg(long)]
    pub strict: bool,

    /// Also write left/right half canvases
    #[arg(long)]
    pub halves: bool,

    /// Move processed sources into this directory
    #[arg(long)]
    pub archive_dir: Option<PathBuf>,

    /// Delete raw files named by the manifest after a successful run
    #[arg(long)]
    pub cleanup: bool,

    /// Smallest region width kept as a bottle
    #[arg(long)]
    pub min_width: Option<u32>,

    #[command(flatten)]
    pub canvas: CanvasArgs,

    #[command(flatten)]
    pub matting: MattingArgs,

    /// Worker threads (default: all CPUs)
    #[arg(short = 't', long)]
    pub threads: Option<usize>,

    /// Do not update the catalog file
    #[arg(long)]
    pub no_catalog: bool,

    /// Save region overlays for group photographs
    #[arg(long)]
    pub save_debug: bool,

    /// Show the execution plan without processing
    #[arg(long)]
    pub dry_run: bool,
}

impl ProcessArgs {
    /// Source directory, falling back to the manifest's directory
    pub fn effective_source_dir(&self) -> PathBuf {
        match &self.source_dir {
            Some(dir) => dir.clone(),
            None => self
                .manifest
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| PathBuf::from(".")),
        }
    }
}

#[derive(Debug, Args)]
pub struct SplitArgs {
    /// Group photograph
    pub input: PathBuf,

    /// Number of bottles, left to right
    #[arg(short = 'n', long)]
    pub count: usize,

    /// Identifiers, left to right (default: <input stem>-1, -2, ...)
    #[arg(long, value_delimiter = ',')]
    pub names: Vec<String>,

    /// Output directory
    #[arg(short, long, default_value = ".")]
    pub output: PathBuf,

    /// Write normalized canvases instead of raw crops
    #[arg(long)]
    pub normalize: bool,

    /// Save a region overlay next to the outputs
    #[arg(long)]
    pub overlay: bool,

    /// Smallest region width kept as a bottle
    #[arg(long)]
    pub min_width: Option<u32>,

    #[command(flatten)]
    pub canvas: CanvasArgs,

    #[command(flatten)]
    pub matting: MattingArgs,

    /// Config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

impl SplitArgs {
    /// Identifiers for each expected bottle
    pub fn identifiers(&self) -> Vec<String> {
        if !self.names.is_empty() {
            return self.names.clone();
        }
        let stem = self
            .input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "bottle".to_string());
        (1..=self.count).map(|i| format!("{}-{}", stem, i)).collect()
    }
}

#[derive(Debug, Args)]
pub struct NormalizeArgs {
    /// Cut-out PNG or directory of PNGs
    pub input: PathBuf,

    /// Output directory
    #[arg(short, long)]
    pub output: PathBuf,

    /// Placement policy (default: inferred from -left/-right file names)
    #[arg(long, value_enum)]
    pub policy: Option<HorizontalPolicy>,

    /// Overwrite existing outputs
    #[arg(short, long)]
    pub force: bool,

    #[command(flatten)]
    pub canvas: CanvasArgs,

    /// Config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}
