//! Error types for vrm-viewer

use thiserror::Error;

/// Main error type for vrm-viewer
#[derive(Error, Debug)]
pub enum ViewerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Model load error: {0}")]
    Load(#[from] LoadError),

    #[error("Normalization error: {0}")]
    Degenerate(#[from] DegenerateModelError),

    #[error("Render error: {0}")]
    Render(#[from] RenderError),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadFile(String),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid configuration value: {field} - {message}")]
    InvalidValue { field: String, message: String },
}

/// Model loading errors, delivered on the loader's failure channel
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Failed to read model file {path}: {message}")]
    Io { path: String, message: String },

    #[error("Failed to parse model: {0}")]
    Parse(String),

    #[error("Unsupported model format: {0}")]
    UnsupportedFormat(String),

    #[error("{0}")]
    Degenerate(#[from] DegenerateModelError),

    #[error("Load cancelled")]
    Cancelled,
}

/// The model's bounding box has no extent, so it cannot be scaled to unit size.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Degenerate model geometry: bounding box size {size:?} has no extent")]
pub struct DegenerateModelError {
    /// Bounding box size at the time of failure (zero or non-finite)
    pub size: [f32; 3],
}

/// Rendering backend errors. These are not handled by the render loop.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Render backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Frame submission failed: {0}")]
    Submit(String),
}

/// Result type alias for vrm-viewer operations
pub type Result<T> = std::result::Result<T, ViewerError>;
