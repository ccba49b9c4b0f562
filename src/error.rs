//! Error types for the erosivity crate.
//!
//! This module defines a single error enum covering input-shape problems,
//! numerical degeneracy, raster access, and calibration sequencing.

use thiserror::Error;

/// The main error type for erosivity operations.
#[derive(Error, Debug)]
pub enum ErosivityError {
    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV reading/writing errors
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// TIFF decoding/encoding errors
    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),

    /// NetCDF file operation errors
    #[cfg(feature = "netcdf")]
    #[error("NetCDF error: {0}")]
    NetCdf(#[from] netcdf::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Two sequences that must be row-aligned have different lengths
    #[error("Length mismatch: {left} values vs {right} values")]
    LengthMismatch { left: usize, right: usize },

    /// A column required by a computation is absent
    #[error("Missing column: {name}")]
    MissingColumn { name: String },

    /// A computation received no rows
    #[error("Empty input: {context}")]
    EmptyInput { context: String },

    /// Invalid parameter errors
    #[error("Invalid parameter: {param} - {message}")]
    InvalidParameter { param: String, message: String },

    /// A statistic is mathematically undefined for the given input
    #[error("Degenerate {metric}: {message}")]
    Degenerate {
        metric: &'static str,
        message: String,
    },

    /// Kernel matrix could not be factorised
    #[error("Singular matrix: {message}")]
    SingularMatrix { message: String },

    /// Raster access or georeferencing errors
    #[error("Raster error: {message}")]
    Raster { message: String },

    /// Too few rows to build the requested number of folds
    #[error("Insufficient data: {rows} training rows for {folds} folds")]
    InsufficientData { rows: usize, folds: usize },

    /// A model was asked to predict before it was fitted
    #[error("Model used before fit")]
    NotFitted,

    /// A calibration stage was invoked out of order
    #[error("Calibration stage out of order: expected {expected}, found {found}")]
    Sequencing {
        expected: &'static str,
        found: &'static str,
    },

    /// The hyperparameter search was cancelled from outside
    #[error("Search cancelled after {completed} evaluations")]
    Cancelled { completed: usize },
}

/// Convenience type alias for Results with ErosivityError
pub type Result<T> = std::result::Result<T, ErosivityError>;
