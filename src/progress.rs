//! Terminal progress for batch commands
//!
//! One indicatif bar over the manifest's sources. The prefix holds the file
//! being worked on and the message the step it is in.

use indicatif::{ProgressBar, ProgressStyle};
use std::fmt;
use tracing::debug;

use crate::pipeline::ProgressCallback;

/// Steps a source goes through, in pipeline order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStage {
    Loading,
    RemovingBackground,
    CleaningEdges,
    /// Group shots only
    Splitting,
    Normalizing,
}

impl ProcessingStage {
    pub fn label(&self) -> &'static str {
        match self {
            ProcessingStage::Loading => "loading",
            ProcessingStage::RemovingBackground => "removing background",
            ProcessingStage::CleaningEdges => "cleaning edges",
            ProcessingStage::Splitting => "finding bottles",
            ProcessingStage::Normalizing => "normalizing",
        }
    }
}

impl fmt::Display for ProcessingStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// How chatty a batch command is on stdout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    Quiet,
    #[default]
    Normal,
    /// One line per finished source
    Detailed,
}

impl Verbosity {
    pub fn from_flags(quiet: bool, verbose: u8) -> Self {
        match (quiet, verbose) {
            (true, _) => Verbosity::Quiet,
            (false, 0) => Verbosity::Normal,
            _ => Verbosity::Detailed,
        }
    }
}

/// Bar style shared by `process` and `normalize`
pub fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template("{bar:40} {pos}/{len} {prefix} {wide_msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
}

/// Bar sized for `len` items; hidden when quiet
pub fn batch_bar(len: usize, verbosity: Verbosity) -> ProgressBar {
    let bar = match verbosity {
        Verbosity::Quiet => ProgressBar::hidden(),
        _ => ProgressBar::new(len as u64),
    };
    bar.set_style(bar_style());
    bar
}

/// Progress over the sources of a `process` run
pub struct BatchProgress {
    bar: ProgressBar,
    verbosity: Verbosity,
}

impl BatchProgress {
    pub fn new(total_sources: usize, verbosity: Verbosity) -> Self {
        Self {
            bar: batch_bar(total_sources, verbosity),
            verbosity,
        }
    }

    /// Sources finished so far
    pub fn finished(&self) -> u64 {
        self.bar.position()
    }

    /// Current prefix and message, e.g. `("case.png", "finding bottles")`
    pub fn status(&self) -> (String, String) {
        (self.bar.prefix(), self.bar.message())
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProgressCallback for BatchProgress {
    fn on_source_start(&self, _index: usize, _total: usize, file: &str) {
        self.bar.set_prefix(file.to_string());
        self.bar.set_message("");
    }

    fn on_stage(&self, stage: ProcessingStage) {
        self.bar.set_message(stage.label());
    }

    fn on_bottle(&self, current: usize, total: usize, identifier: &str) {
        self.bar
            .set_message(format!("{} ({}/{})", identifier, current, total));
    }

    fn on_source_complete(&self, file: &str, message: &str) {
        if self.verbosity == Verbosity::Detailed {
            self.bar.suspend(|| println!("  {}: {}", file, message));
        }
        self.bar.inc(1);
    }

    fn on_debug(&self, message: &str) {
        debug!("{}", message);
    }
}

/// Counts printed when a batch command ends
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BatchSummary {
    pub total: usize,
    pub written: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Identifiers that never got an image
    pub missing: usize,
    pub elapsed_secs: f64,
}

impl BatchSummary {
    pub fn has_errors(&self) -> bool {
        self.failed + self.missing > 0
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} bottles in {:.2}s", self.total, self.elapsed_secs)?;
        writeln!(f, "  Written: {}", self.written)?;
        writeln!(f, "  Skipped: {}", self.skipped)?;
        write!(f, "  Failed:  {}", self.failed)?;
        if self.missing > 0 {
            write!(f, "\n  Missing: {}", self.missing)?;
        }
        Ok(())
    }
}
