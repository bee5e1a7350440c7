//! bottle-prep - wine bottle photographs to web-ready transparent canvases
//!
//! CLI entry point

use anyhow::{bail, Context};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, warn};

use bottle_prep::{
    exit_codes,
    // CLI
    CanvasArgs, Cli, Commands, MattingArgs, NormalizeArgs, ProcessArgs, SplitArgs,
    // Config
    CliOverrides, Config, PipelineConfig,
    // Core
    clean_alpha, create_remover, render_overlay, CanvasNormalizer, OutputRole, RegionFinder,
    // Manifest
    manifest::is_valid_identifier, Manifest, ManifestError, SourceEntry,
    // Pipeline
    cleanup_sources, source_done, BottlePipeline, PipelineError,
    // Progress tracking
    batch_bar, BatchProgress, BatchSummary, Verbosity,
};

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let result = match &cli.command {
        Commands::Process(args) => run_process(args, cli.verbose, cli.quiet),
        Commands::Split(args) => run_split(args, cli.quiet),
        Commands::Normalize(args) => run_normalize(args, cli.quiet),
        Commands::Info => run_info(),
    };

    std::process::exit(match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            exit_codes::GENERAL_ERROR
        }
    });
}

/// Install the fmt subscriber; library logs go to stderr
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        tracing::Level::ERROR
    } else {
        match verbose {
            0 => tracing::Level::WARN,
            1 => tracing::Level::INFO,
            2 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        }
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

// ============ Process Command ============

fn run_process(args: &ProcessArgs, verbose: u8, quiet: bool) -> anyhow::Result<i32> {
    let start_time = Instant::now();

    if !args.manifest.is_file() {
        eprintln!("Error: Manifest not found: {}", args.manifest.display());
        return Ok(exit_codes::INPUT_NOT_FOUND);
    }
    let manifest = Manifest::load(&args.manifest)
        .with_context(|| format!("Failed to load manifest {}", args.manifest.display()))?;

    let source_dir = args.effective_source_dir();
    if !source_dir.is_dir() {
        eprintln!("Error: Source directory not found: {}", source_dir.display());
        return Ok(exit_codes::INPUT_NOT_FOUND);
    }

    let file_config = load_config(args.config.as_deref())?;
    let pipeline_config = file_config.merge_with_cli(&create_cli_overrides(args));
    pipeline_config.validate()?;
    configure_threads(pipeline_config.threads);

    if args.dry_run {
        print_execution_plan(args, &manifest, &source_dir, &pipeline_config);
        return Ok(exit_codes::SUCCESS);
    }

    debug!("Pipeline config: {}", pipeline_config.to_json());
    let pipeline = BottlePipeline::new(pipeline_config).context("Failed to set up matting")?;

    let progress = BatchProgress::new(
        manifest.bottles.len(),
        Verbosity::from_flags(quiet, verbose),
    );
    let result = pipeline.run(&manifest, &source_dir, &args.output, &progress);
    progress.finish();

    let report = match result {
        Ok(report) => report,
        Err(PipelineError::Manifest(ManifestError::MissingSources(files))) => {
            eprintln!("Error: Missing source files (strict mode):");
            for file in files {
                eprintln!("  {}", file);
            }
            return Ok(exit_codes::INPUT_NOT_FOUND);
        }
        Err(e) => return Err(e.into()),
    };

    if !args.no_catalog {
        let (path, added) = pipeline.export_catalog(&report, &args.output)?;
        if !quiet {
            println!("Catalog: {} ({} new entries)", path.display(), added);
        }
    }

    if args.cleanup {
        if report.has_failures() {
            warn!("Skipping cleanup: some bottles failed");
        } else {
            let removed = cleanup_sources(&manifest, &source_dir)?;
            if !quiet {
                println!("Removed {} raw files", removed.len());
            }
        }
    }

    if !quiet {
        for item in &report.items {
            for failed in &item.failed {
                eprintln!("  FAILED {}: {}", failed.identifier, failed.reason);
            }
        }
        let missing = report.missing_identifiers();
        if !missing.is_empty() {
            eprintln!("  Missing images: {}", missing.join(", "));
        }

        let summary = BatchSummary {
            total: manifest.identifier_count(),
            written: report.written_count(),
            skipped: report.skipped_count(),
            failed: report.failed_count(),
            missing: missing.len(),
            elapsed_secs: start_time.elapsed().as_secs_f64(),
        };
        println!();
        println!("{}", summary);
    }

    Ok(if report.has_failures() {
        exit_codes::PARTIAL_FAILURE
    } else {
        exit_codes::SUCCESS
    })
}

// ============ Split Command ============

fn run_split(args: &SplitArgs, quiet: bool) -> anyhow::Result<i32> {
    if !args.input.is_file() {
        eprintln!("Error: Input not found: {}", args.input.display());
        return Ok(exit_codes::INPUT_NOT_FOUND);
    }

    let identifiers = args.identifiers();
    if identifiers.len() != args.count {
        bail!(
            "--names lists {} identifiers but --count is {}",
            identifiers.len(),
            args.count
        );
    }
    if let Some(bad) = identifiers.iter().find(|id| !is_valid_identifier(id)) {
        bail!("Invalid identifier {:?}", bad);
    }

    let mut overrides = CliOverrides::new();
    apply_canvas_args(&mut overrides, &args.canvas);
    apply_matting_args(&mut overrides, &args.matting);
    overrides.min_object_width = args.min_width;
    let config = load_config(args.config.as_deref())?.merge_with_cli(&overrides);
    config.validate()?;
    configure_threads(config.threads);

    let remover = create_remover(&config.matting)?;
    let image = image::open(&args.input)
        .with_context(|| format!("Failed to open {}", args.input.display()))?;
    let mut matte = remover.remove_background(&image)?;
    clean_alpha(&mut matte, config.canvas.alpha_threshold);

    let outcome = RegionFinder::split(&matte, args.count, &config.regions)?;
    std::fs::create_dir_all(&args.output)?;

    if args.overlay {
        let stem = args
            .input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "split".to_string());
        let path = args.output.join(format!("{}-regions.png", stem));
        render_overlay(&matte, &outcome).save(&path)?;
        if !quiet {
            println!("Overlay: {}", path.display());
        }
    }

    let (pairs, missing) = outcome.assign(&identifiers);
    for (id, crop) in pairs {
        let path = if args.normalize {
            let canvas = CanvasNormalizer::normalize(&crop.image, &config.canvas)?;
            let path = args.output.join(OutputRole::Full.file_name(id));
            canvas.save(&path)?;
            path
        } else {
            let path = args.output.join(format!("{}.png", id));
            crop.image.save(&path)?;
            path
        };
        if !quiet {
            println!(
                "  {} x={}..{} -> {}",
                id,
                crop.bounds.x1,
                crop.bounds.x2,
                path.display()
            );
        }
    }

    if let Some(mismatch) = &outcome.mismatch {
        let names: Vec<&str> = missing.iter().map(|s| s.as_str()).collect();
        eprintln!(
            "Warning: expected {} bottles, produced {} (no image for {})",
            mismatch.expected,
            mismatch.produced,
            names.join(", ")
        );
        return Ok(exit_codes::PARTIAL_FAILURE);
    }

    Ok(exit_codes::SUCCESS)
}

// ============ Normalize Command ============

fn run_normalize(args: &NormalizeArgs, quiet: bool) -> anyhow::Result<i32> {
    if !args.input.exists() {
        eprintln!("Error: Input path does not exist: {}", args.input.display());
        return Ok(exit_codes::INPUT_NOT_FOUND);
    }

    let files = collect_png_files(&args.input)?;
    if files.is_empty() {
        eprintln!("Error: No PNG files found in input path");
        return Ok(exit_codes::INPUT_NOT_FOUND);
    }

    let mut overrides = CliOverrides::new();
    apply_canvas_args(&mut overrides, &args.canvas);
    let config = load_config(args.config.as_deref())?.merge_with_cli(&overrides);
    config.validate()?;

    std::fs::create_dir_all(&args.output)?;

    let start_time = Instant::now();
    let bar = batch_bar(files.len(), Verbosity::from_flags(quiet, 0));

    let mut ok_count = 0usize;
    let mut skip_count = 0usize;
    let mut error_count = 0usize;

    for path in &files {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        bar.set_message(name.clone());

        let output = args.output.join(&name);
        if output.exists() && !args.force {
            skip_count += 1;
            bar.inc(1);
            continue;
        }

        let mut options = match OutputRole::from_file_name(&name) {
            Some((_, role)) => config.canvas.for_role(role),
            None => config.canvas.clone(),
        };
        if let Some(policy) = args.policy {
            options.policy = policy;
        }

        let result = image::open(path)
            .map_err(anyhow::Error::from)
            .and_then(|img| Ok(CanvasNormalizer::normalize(&img.to_rgba8(), &options)?))
            .and_then(|canvas| Ok(canvas.save(&output)?));

        match result {
            Ok(()) => ok_count += 1,
            Err(e) => {
                bar.suspend(|| eprintln!("Error normalizing {}: {:#}", path.display(), e));
                error_count += 1;
            }
        }
        bar.inc(1);
    }
    bar.finish_and_clear();

    let summary = BatchSummary {
        total: files.len(),
        written: ok_count,
        skipped: skip_count,
        failed: error_count,
        missing: 0,
        elapsed_secs: start_time.elapsed().as_secs_f64(),
    };
    if !quiet {
        println!("{}", summary);
    }

    Ok(if summary.has_errors() {
        exit_codes::PARTIAL_FAILURE
    } else {
        exit_codes::SUCCESS
    })
}

// ============ Helper Functions ============

/// Load an explicit config file, or search the default locations
fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    match path {
        Some(path) => Config::load_from_path(path)
            .with_context(|| format!("Failed to load config file {}", path.display())),
        None => Ok(Config::load().unwrap_or_else(|e| {
            warn!("Ignoring config file: {}", e);
            Config::default()
        })),
    }
}

fn apply_canvas_args(overrides: &mut CliOverrides, canvas: &CanvasArgs) {
    overrides.canvas_width = canvas.width;
    overrides.canvas_height = canvas.height;
    overrides.target_fill = canvas.fill;
    overrides.alpha_threshold = canvas.alpha_threshold;
}

fn apply_matting_args(overrides: &mut CliOverrides, matting: &MattingArgs) {
    overrides.matting_backend = matting.backend;
    overrides.rembg_command = matting.rembg_command.clone();
    overrides.rembg_model = matting.model.clone();
}

/// Create CLI overrides from ProcessArgs
///
/// Flags only override config values when set, so the config file keeps
/// control of everything the user did not pass.
fn create_cli_overrides(args: &ProcessArgs) -> CliOverrides {
    let mut overrides = CliOverrides::new();

    apply_canvas_args(&mut overrides, &args.canvas);
    apply_matting_args(&mut overrides, &args.matting);
    overrides.min_object_width = args.min_width;
    overrides.threads = args.threads;
    overrides.archive_dir = args.archive_dir.clone();

    if args.halves {
        overrides.halves = Some(true);
    }
    if args.force {
        overrides.force = Some(true);
    }
    if args.strict {
        overrides.strict = Some(true);
    }
    if args.save_debug {
        overrides.save_debug = Some(true);
    }

    overrides
}

/// Size the global rayon pool used for profile computation
fn configure_threads(threads: Option<usize>) {
    let threads = threads.unwrap_or_else(num_cpus::get);
    if let Err(e) = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
    {
        debug!("Thread pool already configured: {}", e);
    }
}

/// Collect PNG files from input path (file or directory)
fn collect_png_files(input: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let is_png = |p: &Path| {
        p.extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("png"))
    };
    let mut files = Vec::new();

    if input.is_file() {
        if is_png(input) {
            files.push(input.to_path_buf());
        }
    } else if input.is_dir() {
        for entry in std::fs::read_dir(input)? {
            let path = entry?.path();
            if path.is_file() && is_png(&path) {
                files.push(path);
            }
        }
        files.sort();
    }

    Ok(files)
}

/// Print execution plan for dry-run mode
fn print_execution_plan(
    args: &ProcessArgs,
    manifest: &Manifest,
    source_dir: &Path,
    config: &PipelineConfig,
) {
    println!("=== Dry Run - Execution Plan ===");
    println!();
    println!("Manifest: {}", args.manifest.display());
    println!("Sources:  {}", source_dir.display());
    println!("Output:   {}", args.output.display());
    println!(
        "Entries:  {} ({} bottles)",
        manifest.bottles.len(),
        manifest.identifier_count()
    );
    println!();
    println!("Pipeline Configuration:");
    println!("  1. Background removal: {}", config.matting.backend.name());
    println!(
        "  2. Edge cleanup (alpha < {})",
        config.canvas.alpha_threshold
    );
    println!(
        "  3. Region finder (column {:.1}%, row {:.1}%, margin {}px, min width {}px)",
        config.regions.column_threshold_ratio * 100.0,
        config.regions.row_threshold_ratio * 100.0,
        config.regions.vertical_margin,
        config.regions.min_object_width
    );
    println!(
        "  4. Canvas {}x{} at {:.0}% height",
        config.canvas.width,
        config.canvas.height,
        config.canvas.target_fill * 100.0
    );
    if config.halves {
        println!("  5. Half canvases: ENABLED");
    }
    if !config.categories.is_empty() {
        let names: Vec<&str> = config.categories.keys().map(String::as_str).collect();
        println!("  Category overrides: {}", names.join(", "));
    }
    println!();
    println!("Processing Options:");
    println!("  Threads: {}", config.threads.unwrap_or_else(num_cpus::get));
    println!("  Force re-process: {}", if config.force { "YES" } else { "NO" });
    println!("  Strict sources: {}", if config.strict { "YES" } else { "NO" });
    if let Some(dir) = &config.archive_dir {
        println!("  Archive to: {}", dir.display());
    }
    println!("  Cleanup raw files: {}", if args.cleanup { "YES" } else { "NO" });
    if !args.no_catalog {
        println!(
            "  Catalog: {} (base {})",
            args.output.join(&config.catalog_file).display(),
            config.public_base
        );
    }
    println!();

    let check = manifest.check_sources(source_dir);
    println!("Sources:");
    for (i, entry) in manifest.bottles.iter().enumerate() {
        let status = match check.missing.iter().find(|m| m.file == entry.file()) {
            _ if source_done(config, entry, &args.output) => "done".to_string(),
            None => "ok".to_string(),
            Some(m) => match &m.suggestion {
                Some(s) => format!("MISSING (did you mean {}?)", s),
                None => "MISSING".to_string(),
            },
        };
        println!("  {}. {} [{}] {}", i + 1, entry.file(), describe_entry(entry), status);
    }
}

fn describe_entry(entry: &SourceEntry) -> String {
    entry
        .bottles()
        .iter()
        .map(|b| b.identifier.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

// ============ Info Command ============

fn run_info() -> anyhow::Result<i32> {
    println!("bottle-prep v{}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("System Information:");
    println!("  Platform: {}", std::env::consts::OS);
    println!("  Arch: {}", std::env::consts::ARCH);
    println!("  CPUs: {}", num_cpus::get());

    println!();
    println!("Background Removal:");
    check_tool("rembg", "rembg");
    check_python_module("rembg");

    println!();
    println!("Config File Locations:");
    for path in Config::search_paths() {
        let status = if path.is_file() { "found" } else { "not found" };
        println!("  {} ({})", path.display(), status);
    }

    Ok(exit_codes::SUCCESS)
}

fn check_tool(cmd: &str, name: &str) {
    match which::which(cmd) {
        Ok(path) => println!("  {}: {} (found)", name, path.display()),
        Err(_) => println!("  {}: Not found", name),
    }
}

fn check_python_module(module: &str) {
    let python_cmd = if which::which("python3").is_ok() {
        "python3"
    } else if which::which("python").is_ok() {
        "python"
    } else {
        println!("  Python: Not found");
        return;
    };

    let import = format!("import {}", module);
    match std::process::Command::new(python_cmd)
        .args(["-c", &import])
        .output()
    {
        Ok(output) if output.status.success() => {
            println!("  Python module {}: Available", module)
        }
        _ => println!("  Python module {}: Not installed", module),
    }
}
