//! Common types for the canvas module

use thiserror::Error;

/// Canvas normalization error types
#[derive(Debug, Error)]
pub enum CanvasError {
    #[error("Object is empty: no pixel reaches alpha {threshold}")]
    EmptyObject { threshold: u8 },

    #[error("Invalid canvas: {0}")]
    InvalidCanvas(String),
}

pub type Result<T> = std::result::Result<T, CanvasError>;
