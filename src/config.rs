//! Configuration file support
//!
//! Settings are read from `./bottle-prep.toml`, falling back to
//! `<config_dir>/bottle-prep/config.toml`. Command-line arguments override
//! file values through [`CliOverrides`].
//!
//! ```toml
//! threads = 4
//!
//! [canvas]
//! width = 400
//! height = 800
//! target_fill = 0.72
//! halves = false
//!
//! [split]
//! column_threshold_ratio = 0.02
//! row_threshold_ratio = 0.01
//! vertical_margin = 5
//! min_object_width = 30
//!
//! [cleanup]
//! alpha_threshold = 10
//!
//! [matting]
//! backend = "rembg"
//! command = "rembg"
//!
//! [output]
//! public_base = "/bottles/normalized"
//! catalog = "catalog.json"
//!
//! [categories.sparkling]
//! column_threshold_ratio = 0.03
//! target_fill = 0.75
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::canvas::{
    CanvasOptions, HorizontalPolicy, DEFAULT_ALPHA_THRESHOLD, DEFAULT_CANVAS_HEIGHT,
    DEFAULT_CANVAS_WIDTH, DEFAULT_TARGET_FILL,
};
use crate::matte::RegionOptions;
use crate::matting::{MattingBackend, MattingConfig};

/// Config file name looked up in the working directory
pub const LOCAL_CONFIG_FILE: &str = "bottle-prep.toml";

/// Default web path prefix for catalog entries
pub const DEFAULT_PUBLIC_BASE: &str = "/bottles/normalized";

/// Default catalog file name inside the output directory
pub const DEFAULT_CATALOG_FILE: &str = "catalog.json";

// ============================================================
// Error Types
// ============================================================

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config value: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

// ============================================================
// File Sections
// ============================================================

/// `[canvas]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanvasSection {
    pub width: u32,
    pub height: u32,
    pub target_fill: f64,
    /// Also write left/right half canvases
    pub halves: bool,
}

impl Default for CanvasSection {
    fn default() -> Self {
        Self {
            width: DEFAULT_CANVAS_WIDTH,
            height: DEFAULT_CANVAS_HEIGHT,
            target_fill: DEFAULT_TARGET_FILL,
            halves: false,
        }
    }
}

/// `[cleanup]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupSection {
    pub alpha_threshold: u8,
}

impl Default for CleanupSection {
    fn default() -> Self {
        Self {
            alpha_threshold: DEFAULT_ALPHA_THRESHOLD,
        }
    }
}

/// `[output]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSection {
    /// Web path prefix written into catalog entries
    pub public_base: String,
    /// Catalog file name, relative to the output directory
    pub catalog: String,
    /// Move processed sources here
    pub archive_dir: Option<PathBuf>,
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            public_base: DEFAULT_PUBLIC_BASE.to_string(),
            catalog: DEFAULT_CATALOG_FILE.to_string(),
            archive_dir: None,
        }
    }
}

/// Per-category threshold overrides (`[categories.<name>]`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TuningOverrides {
    pub column_threshold_ratio: Option<f64>,
    pub row_threshold_ratio: Option<f64>,
    pub vertical_margin: Option<u32>,
    pub min_object_width: Option<u32>,
    pub alpha_threshold: Option<u8>,
    pub target_fill: Option<f64>,
}

/// Configuration file contents
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Worker threads for profile computation (None = all CPUs)
    pub threads: Option<usize>,
    pub canvas: CanvasSection,
    pub split: RegionOptions,
    pub cleanup: CleanupSection,
    pub matting: MattingConfig,
    pub output: OutputSection,
    pub categories: BTreeMap<String, TuningOverrides>,
}

impl Config {
    /// Load from the working directory, then the user config directory.
    ///
    /// Returns `Config::default()` when neither file exists.
    pub fn load() -> Result<Self> {
        for path in Self::search_paths() {
            if path.is_file() {
                return Self::load_from_path(&path);
            }
        }
        Ok(Self::default())
    }

    /// Candidate config file locations in priority order
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(LOCAL_CONFIG_FILE)];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("bottle-prep").join("config.toml"));
        }
        paths
    }

    /// Load from an explicit path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse TOML content
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Merge with command-line overrides (CLI wins) into a pipeline config
    pub fn merge_with_cli(&self, cli: &CliOverrides) -> PipelineConfig {
        let canvas = CanvasOptions {
            width: cli.canvas_width.unwrap_or(self.canvas.width),
            height: cli.canvas_height.unwrap_or(self.canvas.height),
            target_fill: cli.target_fill.unwrap_or(self.canvas.target_fill),
            policy: HorizontalPolicy::Center,
            alpha_threshold: cli
                .alpha_threshold
                .unwrap_or(self.cleanup.alpha_threshold),
        };

        let mut regions = self.split.clone();
        if let Some(width) = cli.min_object_width {
            regions.min_object_width = width;
        }

        let mut matting = self.matting.clone();
        if let Some(backend) = cli.matting_backend {
            matting.backend = backend;
        }
        if let Some(command) = &cli.rembg_command {
            matting.command = command.clone();
        }
        if let Some(model) = &cli.rembg_model {
            matting.model = Some(model.clone());
        }

        PipelineConfig {
            canvas,
            regions,
            matting,
            halves: cli.halves.unwrap_or(self.canvas.halves),
            force: cli.force.unwrap_or(false),
            strict: cli.strict.unwrap_or(false),
            save_debug: cli.save_debug.unwrap_or(false),
            threads: cli.threads.or(self.threads),
            public_base: self.output.public_base.clone(),
            catalog_file: self.output.catalog.clone(),
            archive_dir: cli
                .archive_dir
                .clone()
                .or_else(|| self.output.archive_dir.clone()),
            categories: self.categories.clone(),
        }
    }
}

// ============================================================
// CLI Overrides
// ============================================================

/// Values set explicitly on the command line
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub canvas_width: Option<u32>,
    pub canvas_height: Option<u32>,
    pub target_fill: Option<f64>,
    pub alpha_threshold: Option<u8>,
    pub min_object_width: Option<u32>,
    pub matting_backend: Option<MattingBackend>,
    pub rembg_command: Option<String>,
    pub rembg_model: Option<String>,
    pub halves: Option<bool>,
    pub force: Option<bool>,
    pub strict: Option<bool>,
    pub save_debug: Option<bool>,
    pub threads: Option<usize>,
    pub archive_dir: Option<PathBuf>,
}

impl CliOverrides {
    pub fn new() -> Self {
        Self::default()
    }
}

// ============================================================
// Pipeline Config
// ============================================================

/// Fully resolved settings for one run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineConfig {
    #[serde(skip)]
    pub canvas: CanvasOptions,
    pub regions: RegionOptions,
    pub matting: MattingConfig,
    pub halves: bool,
    pub force: bool,
    pub strict: bool,
    pub save_debug: bool,
    pub threads: Option<usize>,
    pub public_base: String,
    pub catalog_file: String,
    pub archive_dir: Option<PathBuf>,
    pub categories: BTreeMap<String, TuningOverrides>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Config::default().merge_with_cli(&CliOverrides::default())
    }
}

impl PipelineConfig {
    /// Region and canvas options with the category's overrides applied
    pub fn tuning_for(&self, category: Option<&str>) -> (RegionOptions, CanvasOptions) {
        let mut regions = self.regions.clone();
        let mut canvas = self.canvas.clone();

        if let Some(o) = category.and_then(|c| self.categories.get(c)) {
            if let Some(v) = o.column_threshold_ratio {
                regions.column_threshold_ratio = v;
            }
            if let Some(v) = o.row_threshold_ratio {
                regions.row_threshold_ratio = v;
            }
            if let Some(v) = o.vertical_margin {
                regions.vertical_margin = v;
            }
            if let Some(v) = o.min_object_width {
                regions.min_object_width = v;
            }
            if let Some(v) = o.alpha_threshold {
                canvas.alpha_threshold = v;
            }
            if let Some(v) = o.target_fill {
                canvas.target_fill = v;
            }
        }

        (regions, canvas)
    }

    /// Check values that would make every item fail
    pub fn validate(&self) -> Result<()> {
        self.canvas
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        check_ratio("split.column_threshold_ratio", self.regions.column_threshold_ratio)?;
        check_ratio("split.row_threshold_ratio", self.regions.row_threshold_ratio)?;

        for (name, o) in &self.categories {
            if let Some(v) = o.column_threshold_ratio {
                check_ratio(&format!("categories.{}.column_threshold_ratio", name), v)?;
            }
            if let Some(v) = o.row_threshold_ratio {
                check_ratio(&format!("categories.{}.row_threshold_ratio", name), v)?;
            }
            if let Some(fill) = o.target_fill {
                if !(fill > 0.0 && fill <= 1.0) {
                    return Err(ConfigError::Invalid(format!(
                        "categories.{}.target_fill must be in (0, 1], got {}",
                        name, fill
                    )));
                }
            }
        }
        if self.threads == Some(0) {
            return Err(ConfigError::Invalid("threads must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Settings as JSON, for dry runs and logs
    pub fn to_json(&self) -> String {
        let mut value = serde_json::to_value(self).unwrap_or_default();
        if let Some(obj) = value.as_object_mut() {
            obj.insert(
                "canvas".to_string(),
                serde_json::json!({
                    "width": self.canvas.width,
                    "height": self.canvas.height,
                    "target_fill": self.canvas.target_fill,
                    "alpha_threshold": self.canvas.alpha_threshold,
                }),
            );
        }
        value.to_string()
    }
}

/// Threshold ratios must lie in [0, 1)
fn check_ratio(key: &str, value: f64) -> Result<()> {
    if (0.0..1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!(
            "{} must be in [0, 1), got {}",
            key, value
        )))
    }
}
