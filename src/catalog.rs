//! Catalog export for the web frontend
//!
//! A JSON document listing every normalized bottle with the public path of
//! its full canvas. Entries are keyed by identifier; appending an asset that
//! is already listed leaves the existing entry in place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::canvas::OutputRole;

/// Catalog error types
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CatalogError>;

/// One processed bottle, as produced by the pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedAsset {
    pub identifier: String,
    pub name: String,
    pub category: Option<String>,
    /// Path of the full canvas on disk
    pub output_path: PathBuf,
}

/// Catalog entry as seen by the frontend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub identifier: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Public URL path of the full canvas
    pub src: String,
}

/// Catalog document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Catalog {
    pub generated_at: DateTime<Utc>,
    #[serde(default)]
    pub entries: Vec<CatalogEntry>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self {
            generated_at: Utc::now(),
            entries: Vec::new(),
        }
    }
}

impl Catalog {
    /// Load an existing catalog, or start an empty one if the file is absent
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Whether an identifier is already listed
    pub fn contains(&self, identifier: &str) -> bool {
        self.entries.iter().any(|e| e.identifier == identifier)
    }

    /// Append assets not yet listed. Returns the number of entries added.
    pub fn append(&mut self, assets: &[ProcessedAsset], public_base: &str) -> usize {
        let base = public_base.trim_end_matches('/');
        let mut added = 0;

        for asset in assets {
            if self.contains(&asset.identifier) {
                continue;
            }
            self.entries.push(CatalogEntry {
                identifier: asset.identifier.clone(),
                name: asset.name.clone(),
                category: asset.category.clone(),
                src: format!("{}/{}", base, OutputRole::Full.file_name(&asset.identifier)),
            });
            added += 1;
        }

        if added > 0 {
            self.generated_at = Utc::now();
        }
        added
    }

    /// Write the catalog as pretty JSON, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
