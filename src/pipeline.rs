//! Batch processing pipeline
//!
//! Drives each manifest source through matting, edge cleanup, splitting and
//! canvas normalization, one source at a time. Failures stay local to their
//! source; the batch always continues.

use image::RgbaImage;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::canvas::{clean_alpha, CanvasError, CanvasNormalizer, CanvasOptions, OutputRole};
use crate::catalog::{Catalog, CatalogError, ProcessedAsset};
use crate::config::{ConfigError, PipelineConfig};
use crate::manifest::{Bottle, Manifest, ManifestError, MissingSource, SourceEntry};
use crate::matte::{render_overlay, MatteError, RegionCountMismatch, RegionFinder};
use crate::matting::{create_remover, BackgroundRemover, MattingError};
use crate::progress::ProcessingStage;

/// Sub-directory of the output directory for debug overlays
pub const DEBUG_DIR: &str = "debug";

// ============================================================
// Error Types
// ============================================================

/// Pipeline error types
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Source not found: {0}")]
    SourceNotFound(PathBuf),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Matting(#[from] MattingError),

    #[error(transparent)]
    Matte(#[from] MatteError),

    #[error(transparent)]
    Canvas(#[from] CanvasError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

// ============================================================
// Progress Callback
// ============================================================

/// Progress notifications from the pipeline
pub trait ProgressCallback {
    /// A source photograph is about to be processed
    fn on_source_start(&self, _index: usize, _total: usize, _file: &str) {}

    /// Entered a processing stage for the current source
    fn on_stage(&self, _stage: ProcessingStage) {}

    /// A bottle of the current source is being normalized
    fn on_bottle(&self, _current: usize, _total: usize, _identifier: &str) {}

    /// The current source is finished
    fn on_source_complete(&self, _file: &str, _message: &str) {}

    /// Debug detail
    fn on_debug(&self, _message: &str) {}
}

/// Callback that ignores every notification
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentProgress;

impl ProgressCallback for SilentProgress {}

// ============================================================
// Reports
// ============================================================

/// A bottle that could not be produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedBottle {
    pub identifier: String,
    pub reason: String,
}

/// Outcome of one manifest source
#[derive(Debug, Clone, Default)]
pub struct ItemReport {
    /// Source file name as written in the manifest
    pub source: String,
    /// Bottles whose outputs were written in this run
    pub written: Vec<ProcessedAsset>,
    /// Bottles whose outputs already existed
    pub skipped: Vec<ProcessedAsset>,
    /// Bottles that failed
    pub failed: Vec<FailedBottle>,
    /// Identifiers that received no image from the split
    pub missing: Vec<String>,
    /// Set when the split produced fewer crops than identifiers
    pub mismatch: Option<RegionCountMismatch>,
    /// Where the source was archived to, if it was
    pub archived: Option<PathBuf>,
}

impl ItemReport {
    fn new(source: &str) -> Self {
        Self {
            source: source.to_string(),
            ..Default::default()
        }
    }

    /// Report for a source that failed before any bottle was produced
    fn failed_entry(entry: &SourceEntry, error: &PipelineError) -> Self {
        let mut report = Self::new(entry.file());
        report.failed = entry
            .bottles()
            .into_iter()
            .map(|b| FailedBottle {
                identifier: b.identifier,
                reason: error.to_string(),
            })
            .collect();
        report
    }

    /// True when nothing failed and no identifier is missing
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.missing.is_empty()
    }
}

/// Outcome of a whole manifest run
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub items: Vec<ItemReport>,
    /// Sources not found in the source directory
    pub missing_sources: Vec<MissingSource>,
    /// Identifiers belonging to missing sources
    pub unprocessed: Vec<String>,
}

impl BatchReport {
    pub fn written_count(&self) -> usize {
        self.items.iter().map(|i| i.written.len()).sum()
    }

    pub fn skipped_count(&self) -> usize {
        self.items.iter().map(|i| i.skipped.len()).sum()
    }

    pub fn failed_count(&self) -> usize {
        self.items.iter().map(|i| i.failed.len()).sum()
    }

    /// Identifiers without an output: split shortfalls and missing sources
    pub fn missing_identifiers(&self) -> Vec<&str> {
        self.items
            .iter()
            .flat_map(|i| i.missing.iter())
            .chain(self.unprocessed.iter())
            .map(String::as_str)
            .collect()
    }

    /// Whether any bottle failed or came out of a split without an image
    pub fn has_failures(&self) -> bool {
        self.items.iter().any(|i| !i.is_success())
    }

    /// Written and already-present assets, in manifest order
    pub fn assets(&self) -> Vec<ProcessedAsset> {
        self.items
            .iter()
            .flat_map(|i| i.written.iter().chain(i.skipped.iter()))
            .cloned()
            .collect()
    }
}

/// Roles written for one bottle, and halves that could not be cut
#[derive(Debug, Default)]
struct RoleWrites {
    written: Vec<OutputRole>,
    failed: Vec<(OutputRole, CanvasError)>,
}

// ============================================================
// Pipeline
// ============================================================

/// Bottle processing pipeline
pub struct BottlePipeline {
    config: PipelineConfig,
    remover: Box<dyn BackgroundRemover>,
}

impl BottlePipeline {
    /// Create a pipeline with the configured matting backend
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let remover = create_remover(&config.matting)?;
        Ok(Self { config, remover })
    }

    /// Create a pipeline with an explicit matting backend
    pub fn with_remover(config: PipelineConfig, remover: Box<dyn BackgroundRemover>) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, remover })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Roles written for every bottle
    pub fn roles(&self) -> Vec<OutputRole> {
        output_roles(&self.config)
    }

    /// Output path for one role of an identifier
    pub fn output_path(&self, output_dir: &Path, identifier: &str, role: OutputRole) -> PathBuf {
        output_dir.join(role.file_name(identifier))
    }

    /// Whether every output of an identifier is already on disk
    pub fn outputs_exist(&self, output_dir: &Path, identifier: &str) -> bool {
        outputs_exist(&self.config, output_dir, identifier)
    }

    /// Whether a source can be skipped
    pub fn is_done(&self, entry: &SourceEntry, output_dir: &Path) -> bool {
        source_done(&self.config, entry, output_dir)
    }

    fn skipped_entry(&self, entry: &SourceEntry, output_dir: &Path) -> ItemReport {
        let mut report = ItemReport::new(entry.file());
        report.skipped = entry
            .bottles()
            .iter()
            .map(|b| self.asset(output_dir, b))
            .collect();
        report
    }

    /// Process every manifest source.
    ///
    /// Missing sources abort in strict mode and are skipped otherwise.
    pub fn run(
        &self,
        manifest: &Manifest,
        source_dir: &Path,
        output_dir: &Path,
        progress: &dyn ProgressCallback,
    ) -> Result<BatchReport> {
        let check = manifest.check_sources(source_dir);
        // Sources moved away after an earlier run still count when their outputs exist
        let missing: Vec<MissingSource> = check
            .missing
            .iter()
            .filter(|m| {
                !manifest
                    .bottles
                    .iter()
                    .filter(|e| e.file() == m.file)
                    .all(|e| self.is_done(e, output_dir))
            })
            .cloned()
            .collect();

        if !missing.is_empty() {
            for m in &missing {
                match &m.suggestion {
                    Some(s) => warn!("Source not found: {} (did you mean {}?)", m.file, s),
                    None => warn!("Source not found: {}", m.file),
                }
            }
            if self.config.strict {
                return Err(ManifestError::MissingSources(
                    missing.iter().map(|m| m.file.clone()).collect(),
                )
                .into());
            }
        }

        std::fs::create_dir_all(output_dir)?;

        let mut report = BatchReport {
            missing_sources: missing,
            ..Default::default()
        };

        let total = manifest.bottles.len();
        for (idx, entry) in manifest.bottles.iter().enumerate() {
            if check.is_missing(entry.file()) {
                if self.is_done(entry, output_dir) {
                    debug!("{} is gone but its outputs exist", entry.file());
                    progress.on_source_start(idx + 1, total, entry.file());
                    progress.on_source_complete(entry.file(), "outputs exist");
                    report.items.push(self.skipped_entry(entry, output_dir));
                } else {
                    report
                        .unprocessed
                        .extend(entry.bottles().into_iter().map(|b| b.identifier));
                }
                continue;
            }

            progress.on_source_start(idx + 1, total, entry.file());
            let item = match self.process_entry(entry, source_dir, output_dir, progress) {
                Ok(item) => item,
                Err(e) => {
                    warn!("Failed to process {}: {}", entry.file(), e);
                    ItemReport::failed_entry(entry, &e)
                }
            };
            progress.on_source_complete(
                entry.file(),
                &format!(
                    "{} written, {} skipped, {} failed",
                    item.written.len(),
                    item.skipped.len(),
                    item.failed.len() + item.missing.len()
                ),
            );
            report.items.push(item);
        }

        Ok(report)
    }

    /// Process one source photograph.
    ///
    /// Returns an error only when nothing could be produced from the source.
    pub fn process_entry(
        &self,
        entry: &SourceEntry,
        source_dir: &Path,
        output_dir: &Path,
        progress: &dyn ProgressCallback,
    ) -> Result<ItemReport> {
        if self.is_done(entry, output_dir) {
            info!("Skipping {} (outputs exist)", entry.file());
            return Ok(self.skipped_entry(entry, output_dir));
        }

        let bottles = entry.bottles();
        let mut report = ItemReport::new(entry.file());

        let source = source_dir.join(entry.file());
        if !source.is_file() {
            return Err(PipelineError::SourceNotFound(source));
        }

        let (region_options, canvas_options) = self.config.tuning_for(entry.category());

        progress.on_stage(ProcessingStage::Loading);
        let image = image::open(&source)?;

        progress.on_stage(ProcessingStage::RemovingBackground);
        debug!("Removing background with {}", self.remover.name());
        let mut matte = self.remover.remove_background(&image)?;

        progress.on_stage(ProcessingStage::CleaningEdges);
        let cleared = clean_alpha(&mut matte, canvas_options.alpha_threshold);
        progress.on_debug(&format!("Cleared {} low-alpha pixels", cleared));

        if entry.is_multi() {
            progress.on_stage(ProcessingStage::Splitting);
            let outcome = RegionFinder::split(&matte, bottles.len(), &region_options)?;

            if self.config.save_debug {
                self.save_overlay(entry.file(), &matte, &outcome, output_dir)?;
            }

            let (pairs, missing) = outcome.assign(&bottles);
            if !missing.is_empty() {
                warn!(
                    "{}: no image for {}",
                    entry.file(),
                    missing
                        .iter()
                        .map(|b| b.identifier.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                );
            }
            report.missing = missing.iter().map(|b| b.identifier.clone()).collect();
            report.mismatch = outcome.mismatch.clone();

            progress.on_stage(ProcessingStage::Normalizing);
            for (i, (bottle, crop)) in pairs.into_iter().enumerate() {
                progress.on_bottle(i + 1, bottles.len(), &bottle.identifier);
                self.emit(bottle, &crop.image, &canvas_options, output_dir, &mut report);
            }
        } else {
            progress.on_stage(ProcessingStage::Normalizing);
            for bottle in &bottles {
                progress.on_bottle(1, 1, &bottle.identifier);
                self.emit(bottle, &matte, &canvas_options, output_dir, &mut report);
            }
        }

        if let Some(archive_dir) = &self.config.archive_dir {
            if report.is_success() && !report.written.is_empty() {
                match archive_source(&source, archive_dir) {
                    Ok(archived) => report.archived = archived,
                    Err(e) => warn!("Could not archive {}: {}", source.display(), e),
                }
            }
        }

        Ok(report)
    }

    /// Normalize and write one bottle, recording the result in the report
    fn emit(
        &self,
        bottle: &Bottle,
        object: &RgbaImage,
        canvas: &CanvasOptions,
        output_dir: &Path,
        report: &mut ItemReport,
    ) {
        match self.write_outputs(bottle, object, canvas, output_dir) {
            Ok(writes) => {
                for (role, e) in &writes.failed {
                    warn!("{} {} half: {}", bottle.identifier, role.suffix(), e);
                    report.failed.push(FailedBottle {
                        identifier: bottle.identifier.clone(),
                        reason: format!("{} half: {}", role.suffix(), e),
                    });
                }
                // The full canvas is on disk either way
                if writes.written.is_empty() {
                    report.skipped.push(self.asset(output_dir, bottle));
                } else {
                    report.written.push(self.asset(output_dir, bottle));
                }
            }
            Err(e) => {
                warn!("{}: {}", bottle.identifier, e);
                report.failed.push(FailedBottle {
                    identifier: bottle.identifier.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }

    /// Write every role not yet on disk (all roles with `force`).
    ///
    /// The full canvas is saved before any half is cut from it; a half
    /// that fails is recorded without undoing the others.
    fn write_outputs(
        &self,
        bottle: &Bottle,
        object: &RgbaImage,
        canvas: &CanvasOptions,
        output_dir: &Path,
    ) -> Result<RoleWrites> {
        let mut writes = RoleWrites::default();
        let pending: Vec<OutputRole> = self
            .roles()
            .into_iter()
            .filter(|role| {
                self.config.force
                    || !self.output_path(output_dir, &bottle.identifier, *role).exists()
            })
            .collect();
        if pending.is_empty() {
            return Ok(writes);
        }

        let full = CanvasNormalizer::normalize(object, &canvas.for_role(OutputRole::Full))?;

        for role in pending {
            let image = if role == OutputRole::Full {
                full.clone()
            } else {
                match CanvasNormalizer::normalize_half(&full, role, canvas) {
                    Ok(half) => half,
                    Err(e) => {
                        writes.failed.push((role, e));
                        continue;
                    }
                }
            };
            let path = self.output_path(output_dir, &bottle.identifier, role);
            image.save(&path)?;
            debug!("Wrote {}", path.display());
            writes.written.push(role);
        }
        Ok(writes)
    }

    fn save_overlay(
        &self,
        file: &str,
        matte: &RgbaImage,
        outcome: &crate::matte::SplitOutcome,
        output_dir: &Path,
    ) -> Result<()> {
        let dir = output_dir.join(DEBUG_DIR);
        std::fs::create_dir_all(&dir)?;
        let stem = Path::new(file)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| file.to_string());
        let path = dir.join(format!("{}-regions.png", stem));
        render_overlay(matte, outcome).save(&path)?;
        debug!("Saved region overlay {}", path.display());
        Ok(())
    }

    /// Append the batch's assets to the catalog file.
    ///
    /// A relative catalog path is resolved against the output directory.
    /// Returns the catalog path and the number of new entries.
    pub fn export_catalog(&self, report: &BatchReport, output_dir: &Path) -> Result<(PathBuf, usize)> {
        let path = output_dir.join(&self.config.catalog_file);
        let mut catalog = Catalog::load_or_default(&path)?;
        let added = catalog.append(&report.assets(), &self.config.public_base);
        catalog.save(&path)?;
        info!("Catalog {}: {} new entries", path.display(), added);
        Ok((path, added))
    }

    fn asset(&self, output_dir: &Path, bottle: &Bottle) -> ProcessedAsset {
        ProcessedAsset {
            identifier: bottle.identifier.clone(),
            name: bottle.name.clone(),
            category: bottle.category.clone(),
            output_path: self.output_path(output_dir, &bottle.identifier, OutputRole::Full),
        }
    }
}

// ============================================================
// Output Checks
// ============================================================

/// Roles written for every bottle
pub fn output_roles(config: &PipelineConfig) -> Vec<OutputRole> {
    if config.halves {
        vec![OutputRole::Full, OutputRole::LeftHalf, OutputRole::RightHalf]
    } else {
        vec![OutputRole::Full]
    }
}

fn outputs_exist(config: &PipelineConfig, output_dir: &Path, identifier: &str) -> bool {
    output_roles(config)
        .into_iter()
        .all(|role| output_dir.join(role.file_name(identifier)).exists())
}

/// Whether every output of every bottle of `entry` exists and `force` is off.
///
/// Such a source needs no work, even when the source file itself is gone.
pub fn source_done(config: &PipelineConfig, entry: &SourceEntry, output_dir: &Path) -> bool {
    !config.force
        && entry
            .bottles()
            .iter()
            .all(|b| outputs_exist(config, output_dir, &b.identifier))
}

// ============================================================
// Source Housekeeping
// ============================================================

/// Move a processed source into `archive_dir`.
///
/// Returns `None` when a file of the same name is already archived.
pub fn archive_source(source: &Path, archive_dir: &Path) -> Result<Option<PathBuf>> {
    let name = source
        .file_name()
        .ok_or_else(|| PipelineError::SourceNotFound(source.to_path_buf()))?;
    std::fs::create_dir_all(archive_dir)?;

    let target = archive_dir.join(name);
    if target.exists() {
        warn!("Not archiving {}: {} exists", source.display(), target.display());
        return Ok(None);
    }

    if std::fs::rename(source, &target).is_err() {
        // Cross-device moves
        std::fs::copy(source, &target)?;
        std::fs::remove_file(source)?;
    }
    info!("Archived {} to {}", source.display(), target.display());
    Ok(Some(target))
}

/// Delete the raw files the manifest names (entries and skip list).
///
/// Returns the paths that were removed.
pub fn cleanup_sources(manifest: &Manifest, source_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut removed = Vec::new();
    for file in manifest.raw_files() {
        let path = source_dir.join(file);
        if path.is_file() {
            std::fs::remove_file(&path)?;
            debug!("Removed {}", path.display());
            removed.push(path);
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CliOverrides, Config};
    use crate::matting::Passthrough;
    use image::{DynamicImage, Rgba};
    use std::cell::RefCell;

    fn bottles_image(blocks: &[(u32, u32)], width: u32, height: u32) -> RgbaImage {
        let mut img = RgbaImage::new(width, height);
        for &(x1, x2) in blocks {
            for y in 20..height - 20 {
                for x in x1..x2 {
                    img.put_pixel(x, y, Rgba([120, 20, 40, 255]));
                }
            }
        }
        img
    }

    fn config(cli: CliOverrides) -> PipelineConfig {
        Config::default().merge_with_cli(&cli)
    }

    fn pipeline(cli: CliOverrides) -> BottlePipeline {
        BottlePipeline::with_remover(config(cli), Box::new(Passthrough)).unwrap()
    }

    struct Workspace {
        _dir: tempfile::TempDir,
        source: PathBuf,
        output: PathBuf,
    }

    fn workspace() -> Workspace {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("raw");
        let output = dir.path().join("out");
        std::fs::create_dir_all(&source).unwrap();
        Workspace {
            _dir: dir,
            source,
            output,
        }
    }

    fn manifest(json: &str) -> Manifest {
        Manifest::from_json(json).unwrap()
    }

    const SINGLE: &str = r#"{ "bottles": [
        { "file": "colheita.png", "slug": "colheita", "name": "Colheita", "type": "red" }
    ] }"#;

    const GROUP: &str = r#"{ "bottles": [
        { "file": "case.png", "type": "white", "bottles": [
            { "slug": "a" }, { "slug": "b" }, { "slug": "c" } ] }
    ] }"#;

    #[test]
    fn test_single_source_writes_full_canvas() {
        let ws = workspace();
        bottles_image(&[(40, 100)], 140, 300)
            .save(ws.source.join("colheita.png"))
            .unwrap();

        let report = pipeline(CliOverrides::default())
            .run(&manifest(SINGLE), &ws.source, &ws.output, &SilentProgress)
            .unwrap();

        assert_eq!(report.written_count(), 1);
        assert!(!report.has_failures());

        let out = image::open(ws.output.join("colheita-full.png")).unwrap().to_rgba8();
        assert_eq!(out.dimensions(), (400, 800));

        let assets = report.assets();
        assert_eq!(assets[0].name, "Colheita");
        assert_eq!(assets[0].category.as_deref(), Some("red"));
    }

    #[test]
    fn test_group_source_writes_each_bottle() {
        let ws = workspace();
        bottles_image(&[(20, 80), (120, 180), (220, 280)], 300, 200)
            .save(ws.source.join("case.png"))
            .unwrap();

        let report = pipeline(CliOverrides::default())
            .run(&manifest(GROUP), &ws.source, &ws.output, &SilentProgress)
            .unwrap();

        assert_eq!(report.written_count(), 3);
        for id in ["a", "b", "c"] {
            assert!(ws.output.join(format!("{}-full.png", id)).exists());
        }
        assert!(report.items[0].mismatch.is_none());
        assert_eq!(report.assets()[1].category.as_deref(), Some("white"));
    }

    #[test]
    fn test_existing_output_is_not_overwritten() {
        let ws = workspace();
        bottles_image(&[(40, 100)], 140, 300)
            .save(ws.source.join("colheita.png"))
            .unwrap();
        std::fs::create_dir_all(&ws.output).unwrap();
        let existing = ws.output.join("colheita-full.png");
        std::fs::write(&existing, b"keep").unwrap();

        let report = pipeline(CliOverrides::default())
            .run(&manifest(SINGLE), &ws.source, &ws.output, &SilentProgress)
            .unwrap();

        assert_eq!(report.skipped_count(), 1);
        assert_eq!(report.written_count(), 0);
        assert_eq!(std::fs::read(&existing).unwrap(), b"keep");
        // Skipped bottles still reach the catalog
        assert_eq!(report.assets().len(), 1);
    }

    #[test]
    fn test_force_overwrites() {
        let ws = workspace();
        bottles_image(&[(40, 100)], 140, 300)
            .save(ws.source.join("colheita.png"))
            .unwrap();
        std::fs::create_dir_all(&ws.output).unwrap();
        let existing = ws.output.join("colheita-full.png");
        std::fs::write(&existing, b"stale").unwrap();

        let report = pipeline(CliOverrides {
            force: Some(true),
            ..Default::default()
        })
        .run(&manifest(SINGLE), &ws.source, &ws.output, &SilentProgress)
        .unwrap();

        assert_eq!(report.written_count(), 1);
        assert!(image::open(&existing).is_ok());
    }

    #[test]
    fn test_halves_written_at_half_width() {
        let ws = workspace();
        bottles_image(&[(40, 100)], 140, 300)
            .save(ws.source.join("colheita.png"))
            .unwrap();

        pipeline(CliOverrides {
            halves: Some(true),
            ..Default::default()
        })
        .run(&manifest(SINGLE), &ws.source, &ws.output, &SilentProgress)
        .unwrap();

        for suffix in ["left", "right"] {
            let half = image::open(ws.output.join(format!("colheita-{}.png", suffix)))
                .unwrap()
                .to_rgba8();
            assert_eq!(half.dimensions(), (200, 800));
        }
    }

    #[test]
    fn test_missing_source_skipped_with_report() {
        let ws = workspace();
        std::fs::write(ws.source.join("colheita.jpg"), b"x").unwrap();

        let report = pipeline(CliOverrides::default())
            .run(&manifest(SINGLE), &ws.source, &ws.output, &SilentProgress)
            .unwrap();

        assert!(report.items.is_empty());
        assert_eq!(report.unprocessed, vec!["colheita".to_string()]);
        assert_eq!(
            report.missing_sources[0].suggestion.as_deref(),
            Some("colheita.jpg")
        );
        assert_eq!(report.missing_identifiers(), vec!["colheita"]);
    }

    #[test]
    fn test_missing_source_strict_aborts() {
        let ws = workspace();
        let result = pipeline(CliOverrides {
            strict: Some(true),
            ..Default::default()
        })
        .run(&manifest(SINGLE), &ws.source, &ws.output, &SilentProgress);

        assert!(matches!(
            result,
            Err(PipelineError::Manifest(ManifestError::MissingSources(_)))
        ));
        assert!(!ws.output.exists());
    }

    #[test]
    fn test_empty_matte_reports_missing_identifiers() {
        let ws = workspace();
        RgbaImage::new(300, 200).save(ws.source.join("case.png")).unwrap();

        let report = pipeline(CliOverrides::default())
            .run(&manifest(GROUP), &ws.source, &ws.output, &SilentProgress)
            .unwrap();

        let item = &report.items[0];
        assert_eq!(item.missing, vec!["a", "b", "c"]);
        assert_eq!(item.mismatch.as_ref().map(|m| m.produced), Some(0));
        assert!(report.has_failures());
    }

    #[test]
    fn test_empty_single_fails_locally() {
        let ws = workspace();
        RgbaImage::new(50, 50).save(ws.source.join("blank.png")).unwrap();
        bottles_image(&[(40, 100)], 140, 300)
            .save(ws.source.join("colheita.png"))
            .unwrap();

        let report = pipeline(CliOverrides::default())
            .run(
                &manifest(
                    r#"{ "bottles": [
                        { "file": "blank.png", "slug": "blank" },
                        { "file": "colheita.png", "slug": "colheita" } ] }"#,
                ),
                &ws.source,
                &ws.output,
                &SilentProgress,
            )
            .unwrap();

        assert_eq!(report.failed_count(), 1);
        assert_eq!(report.items[0].failed[0].identifier, "blank");
        assert_eq!(report.written_count(), 1);
    }

    struct FailingRemover;

    impl BackgroundRemover for FailingRemover {
        fn name(&self) -> &str {
            "failing"
        }

        fn remove_background(&self, _image: &DynamicImage) -> crate::matting::Result<RgbaImage> {
            Err(MattingError::CommandFailed("boom".to_string()))
        }
    }

    #[test]
    fn test_matting_failure_marks_every_bottle() {
        let ws = workspace();
        bottles_image(&[(20, 80), (120, 180), (220, 280)], 300, 200)
            .save(ws.source.join("case.png"))
            .unwrap();

        let pipeline = BottlePipeline::with_remover(
            config(CliOverrides::default()),
            Box::new(FailingRemover),
        )
        .unwrap();
        let report = pipeline
            .run(&manifest(GROUP), &ws.source, &ws.output, &SilentProgress)
            .unwrap();

        assert_eq!(report.failed_count(), 3);
        assert!(report.items[0].failed[0].reason.contains("boom"));
    }

    #[test]
    fn test_archive_after_success() {
        let ws = workspace();
        let archive = ws.source.join("processed");
        bottles_image(&[(40, 100)], 140, 300)
            .save(ws.source.join("colheita.png"))
            .unwrap();

        let report = pipeline(CliOverrides {
            archive_dir: Some(archive.clone()),
            ..Default::default()
        })
        .run(&manifest(SINGLE), &ws.source, &ws.output, &SilentProgress)
        .unwrap();

        assert_eq!(report.items[0].archived, Some(archive.join("colheita.png")));
        assert!(!ws.source.join("colheita.png").exists());
    }

    #[test]
    fn test_rerun_after_archive_skips_archived_sources() {
        let ws = workspace();
        let archive = ws.source.join("processed");
        bottles_image(&[(40, 100)], 140, 300)
            .save(ws.source.join("colheita.png"))
            .unwrap();
        let p = pipeline(CliOverrides {
            archive_dir: Some(archive.clone()),
            ..Default::default()
        });

        let first = p
            .run(&manifest(SINGLE), &ws.source, &ws.output, &SilentProgress)
            .unwrap();
        assert_eq!(first.written_count(), 1);
        assert!(!ws.source.join("colheita.png").exists());

        let second = p
            .run(&manifest(SINGLE), &ws.source, &ws.output, &SilentProgress)
            .unwrap();
        assert_eq!(second.skipped_count(), 1);
        assert!(second.missing_sources.is_empty());
        assert!(second.missing_identifiers().is_empty());
        assert!(!second.has_failures());
        assert_eq!(second.assets()[0].identifier, "colheita");
    }

    #[test]
    fn test_strict_accepts_gone_source_with_outputs() {
        let ws = workspace();
        let p = pipeline(CliOverrides {
            strict: Some(true),
            ..Default::default()
        });
        std::fs::create_dir_all(&ws.output).unwrap();
        std::fs::write(ws.output.join("colheita-full.png"), b"x").unwrap();

        // Outputs exist, so strict mode has nothing to complain about
        let report = p
            .run(&manifest(SINGLE), &ws.source, &ws.output, &SilentProgress)
            .unwrap();
        assert_eq!(report.skipped_count(), 1);

        std::fs::remove_file(ws.output.join("colheita-full.png")).unwrap();
        let result = p.run(&manifest(SINGLE), &ws.source, &ws.output, &SilentProgress);
        assert!(matches!(
            result,
            Err(PipelineError::Manifest(ManifestError::MissingSources(_)))
        ));
    }

    #[test]
    fn test_archive_failure_keeps_written_outputs() {
        let ws = workspace();
        // A plain file where the archive directory should go
        let archive = ws.source.join("processed");
        std::fs::write(&archive, b"not a directory").unwrap();
        bottles_image(&[(40, 100)], 140, 300)
            .save(ws.source.join("colheita.png"))
            .unwrap();

        let report = pipeline(CliOverrides {
            archive_dir: Some(archive),
            ..Default::default()
        })
        .run(&manifest(SINGLE), &ws.source, &ws.output, &SilentProgress)
        .unwrap();

        assert_eq!(report.written_count(), 1);
        assert_eq!(report.failed_count(), 0);
        assert!(!report.has_failures());
        assert!(report.items[0].archived.is_none());
        assert!(ws.source.join("colheita.png").exists());
        assert_eq!(report.assets().len(), 1);
    }

    #[test]
    fn test_empty_half_keeps_full_canvas() {
        let ws = workspace();
        // Taller than the fill target, so it stays one pixel wide and lands
        // entirely left of the seam
        bottles_image(&[(70, 71)], 140, 700)
            .save(ws.source.join("colheita.png"))
            .unwrap();

        let report = pipeline(CliOverrides {
            halves: Some(true),
            ..Default::default()
        })
        .run(&manifest(SINGLE), &ws.source, &ws.output, &SilentProgress)
        .unwrap();

        assert!(ws.output.join("colheita-full.png").exists());
        assert!(ws.output.join("colheita-left.png").exists());
        assert!(!ws.output.join("colheita-right.png").exists());

        assert_eq!(report.written_count(), 1);
        let failed = &report.items[0].failed;
        assert_eq!(failed.len(), 1);
        assert!(failed[0].reason.starts_with("right half"));
        assert!(report.has_failures());
    }

    #[test]
    fn test_archive_never_overwrites() {
        let ws = workspace();
        let archive = ws.source.join("processed");
        std::fs::create_dir_all(&archive).unwrap();
        std::fs::write(archive.join("x.png"), b"old").unwrap();
        std::fs::write(ws.source.join("x.png"), b"new").unwrap();

        let result = archive_source(&ws.source.join("x.png"), &archive).unwrap();
        assert!(result.is_none());
        assert_eq!(std::fs::read(archive.join("x.png")).unwrap(), b"old");
        assert!(ws.source.join("x.png").exists());
    }

    #[test]
    fn test_debug_overlay_saved() {
        let ws = workspace();
        bottles_image(&[(20, 80), (120, 180), (220, 280)], 300, 200)
            .save(ws.source.join("case.png"))
            .unwrap();

        pipeline(CliOverrides {
            save_debug: Some(true),
            ..Default::default()
        })
        .run(&manifest(GROUP), &ws.source, &ws.output, &SilentProgress)
        .unwrap();

        assert!(ws.output.join(DEBUG_DIR).join("case-regions.png").exists());
    }

    #[test]
    fn test_cleanup_removes_listed_files_only() {
        let ws = workspace();
        std::fs::write(ws.source.join("colheita.png"), b"x").unwrap();
        std::fs::write(ws.source.join("duplicate.png"), b"x").unwrap();
        std::fs::write(ws.source.join("other.png"), b"x").unwrap();

        let m = manifest(
            r#"{ "bottles": [ { "file": "colheita.png", "slug": "colheita" } ],
                 "skip": ["duplicate.png", "gone.png"] }"#,
        );
        let removed = cleanup_sources(&m, &ws.source).unwrap();

        assert_eq!(removed.len(), 2);
        assert!(ws.source.join("other.png").exists());
    }

    #[test]
    fn test_export_catalog_includes_skipped() {
        let ws = workspace();
        bottles_image(&[(20, 80), (120, 180), (220, 280)], 300, 200)
            .save(ws.source.join("case.png"))
            .unwrap();
        let p = pipeline(CliOverrides::default());

        let first = p
            .run(&manifest(GROUP), &ws.source, &ws.output, &SilentProgress)
            .unwrap();
        let (path, added) = p.export_catalog(&first, &ws.output).unwrap();
        assert_eq!(added, 3);
        assert_eq!(path, ws.output.join("catalog.json"));

        // Second run skips everything and adds nothing new
        let second = p
            .run(&manifest(GROUP), &ws.source, &ws.output, &SilentProgress)
            .unwrap();
        assert_eq!(second.skipped_count(), 3);
        let (_, added) = p.export_catalog(&second, &ws.output).unwrap();
        assert_eq!(added, 0);

        let catalog = Catalog::load_or_default(&path).unwrap();
        assert_eq!(catalog.entries[0].src, "/bottles/normalized/a-full.png");
    }

    #[derive(Default)]
    struct Recorder {
        stages: RefCell<Vec<ProcessingStage>>,
        bottles: RefCell<Vec<String>>,
    }

    impl ProgressCallback for Recorder {
        fn on_stage(&self, stage: ProcessingStage) {
            self.stages.borrow_mut().push(stage);
        }

        fn on_bottle(&self, _current: usize, _total: usize, identifier: &str) {
            self.bottles.borrow_mut().push(identifier.to_string());
        }
    }

    #[test]
    fn test_progress_reports_stages_in_order() {
        let ws = workspace();
        bottles_image(&[(20, 80), (120, 180), (220, 280)], 300, 200)
            .save(ws.source.join("case.png"))
            .unwrap();

        let recorder = Recorder::default();
        pipeline(CliOverrides::default())
            .run(&manifest(GROUP), &ws.source, &ws.output, &recorder)
            .unwrap();

        assert_eq!(
            *recorder.stages.borrow(),
            vec![
                ProcessingStage::Loading,
                ProcessingStage::RemovingBackground,
                ProcessingStage::CleaningEdges,
                ProcessingStage::Splitting,
                ProcessingStage::Normalizing,
            ]
        );
        assert_eq!(*recorder.bottles.borrow(), vec!["a", "b", "c"]);
    }
}
