//! Source manifest
//!
//! Declares which source photographs exist and which bottle identifiers
//! they produce. A source with a `bottles` list holds several bottles,
//! listed left to right.
//!
//! ```json
//! {
//!   "bottles": [
//!     { "file": "Colheita.png", "slug": "colheita", "name": "Colheita", "type": "red" },
//!     { "file": "case.jpg", "type": "white", "bottles": [
//!         { "slug": "telegraph-road", "name": "Telegraph Road" },
//!         { "slug": "joey-brown" } ] }
//!   ],
//!   "skip": ["duplicate.png"]
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Suggestions below this similarity are not shown
const MIN_SUGGESTION_SIMILARITY: f64 = 0.5;

// ============================================================
// Error Types
// ============================================================

/// Manifest error types
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("Manifest not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to parse manifest: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Duplicate identifier: {0}")]
    DuplicateIdentifier(String),

    #[error("Invalid identifier {0:?}: use letters, digits, '-', '_' or '.'")]
    InvalidIdentifier(String),

    #[error("Manifest entry {0} lists no bottles")]
    EmptyEntry(String),

    #[error("Missing source files: {}", .0.join(", "))]
    MissingSources(Vec<String>),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ManifestError>;

// ============================================================
// Data Structures
// ============================================================

/// One bottle as written in the manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BottleSpec {
    /// Identifier, used as the output file stem
    pub slug: String,
    /// Display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Category (red, white, sparkling, ...)
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

/// One source photograph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SourceEntry {
    /// Several bottles side by side, listed left to right
    Multi {
        file: String,
        #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
        category: Option<String>,
        bottles: Vec<BottleSpec>,
    },
    /// One bottle
    Single {
        file: String,
        #[serde(flatten)]
        bottle: BottleSpec,
    },
}

/// A bottle with defaults resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bottle {
    pub identifier: String,
    pub name: String,
    pub category: Option<String>,
}

impl SourceEntry {
    /// Source file name
    pub fn file(&self) -> &str {
        match self {
            SourceEntry::Multi { file, .. } | SourceEntry::Single { file, .. } => file,
        }
    }

    pub fn is_multi(&self) -> bool {
        matches!(self, SourceEntry::Multi { .. })
    }

    /// Category used to pick tuning for the whole source
    pub fn category(&self) -> Option<&str> {
        match self {
            SourceEntry::Multi {
                category, bottles, ..
            } => category
                .as_deref()
                .or_else(|| bottles.iter().find_map(|b| b.category.as_deref())),
            SourceEntry::Single { bottle, .. } => bottle.category.as_deref(),
        }
    }

    /// Bottles in left-to-right order with name and category resolved
    pub fn bottles(&self) -> Vec<Bottle> {
        match self {
            SourceEntry::Multi {
                category, bottles, ..
            } => bottles
                .iter()
                .map(|b| Self::resolve(b, category.as_deref()))
                .collect(),
            SourceEntry::Single { bottle, .. } => vec![Self::resolve(bottle, None)],
        }
    }

    fn resolve(declared: &BottleSpec, inherited: Option<&str>) -> Bottle {
        Bottle {
            identifier: declared.slug.clone(),
            name: declared.name.clone().unwrap_or_else(|| declared.slug.clone()),
            category: declared
                .category
                .clone()
                .or_else(|| inherited.map(str::to_string)),
        }
    }
}

/// A manifest source that was not found, with a close match if any
#[derive(Debug, Clone, PartialEq)]
pub struct MissingSource {
    pub file: String,
    pub suggestion: Option<String>,
}

/// Result of checking manifest sources against a directory
#[derive(Debug, Clone, Default)]
pub struct SourceCheck {
    pub present: Vec<String>,
    pub missing: Vec<MissingSource>,
}

impl SourceCheck {
    pub fn all_present(&self) -> bool {
        self.missing.is_empty()
    }

    pub fn is_missing(&self, file: &str) -> bool {
        self.missing.iter().any(|m| m.file == file)
    }
}

/// Source manifest
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Source entries, processed in order
    #[serde(default)]
    pub bottles: Vec<SourceEntry>,
    /// Raw files to leave alone (removed by cleanup only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skip: Vec<String>,
}

impl Manifest {
    /// Load and validate a manifest file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ManifestError::NotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Parse and validate manifest JSON
    pub fn from_json(json: &str) -> Result<Self> {
        let manifest: Manifest = serde_json::from_str(json)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Check identifiers: non-empty entries, filename-safe, unique
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();

        for entry in &self.bottles {
            let bottles = entry.bottles();
            if bottles.is_empty() {
                return Err(ManifestError::EmptyEntry(entry.file().to_string()));
            }

            for bottle in bottles {
                if !is_valid_identifier(&bottle.identifier) {
                    return Err(ManifestError::InvalidIdentifier(bottle.identifier));
                }
                if !seen.insert(bottle.identifier.clone()) {
                    return Err(ManifestError::DuplicateIdentifier(bottle.identifier));
                }
            }
        }

        Ok(())
    }

    /// Total number of bottle identifiers
    pub fn identifier_count(&self) -> usize {
        self.bottles.iter().map(|e| e.bottles().len()).sum()
    }

    /// Check every source file exists in `dir`, suggesting near matches
    pub fn check_sources(&self, dir: &Path) -> SourceCheck {
        let listing: Vec<String> = std::fs::read_dir(dir)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .filter(|e| e.path().is_file())
                    .filter_map(|e| e.file_name().into_string().ok())
                    .collect()
            })
            .unwrap_or_default();

        let mut check = SourceCheck::default();
        for entry in &self.bottles {
            let file = entry.file();
            if dir.join(file).is_file() {
                check.present.push(file.to_string());
            } else {
                check.missing.push(MissingSource {
                    file: file.to_string(),
                    suggestion: suggest(file, &listing),
                });
            }
        }
        check
    }

    /// All raw file names the manifest mentions (entries and skip list)
    pub fn raw_files(&self) -> Vec<&str> {
        self.bottles
            .iter()
            .map(|e| e.file())
            .chain(self.skip.iter().map(String::as_str))
            .collect()
    }
}

/// Identifiers become file stems
pub fn is_valid_identifier(id: &str) -> bool {
    !id.is_empty()
        && !id.starts_with('.')
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// Closest file name in `candidates`, if similar enough
fn suggest(file: &str, candidates: &[String]) -> Option<String> {
    let target = file.to_lowercase();
    candidates
        .iter()
        .map(|c| (strsim::normalized_levenshtein(&target, &c.to_lowercase()), c))
        .filter(|(score, _)| *score >= MIN_SUGGESTION_SIMILARITY)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, c)| c.clone())
}
