//! Error types shared by the library.

use thiserror::Error;

/// Errors surfaced by generation, editing, persistence and export.
///
/// Numerical drift in the water grid is never an error; it is clamped in place.
#[derive(Error, Debug)]
pub enum TerrainError {
    #[error("invalid grid size {size}: {reason}")]
    InvalidSize { size: usize, reason: &'static str },

    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("coordinate ({x}, {y}) is outside a {size}x{size} grid")]
    OutOfBounds { x: usize, y: usize, size: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("premature end of grid data: expected {expected} values, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("corrupt grid data: {0}")]
    CorruptData(String),

    #[error("config error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("no GPU adapter available")]
    GpuUnavailable,

    #[error("GPU readback failed: {0}")]
    Gpu(String),

    #[error("image export failed: {0}")]
    Image(#[from] image::ImageError),
}

pub type Result<T> = std::result::Result<T, TerrainError>;
