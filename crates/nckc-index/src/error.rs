//! Error types for the nckc-index crate.

use thiserror::Error;

use netcdf_refs::NetCdfError;
use smos_common::SmosError;

/// Errors that can occur while maintaining an index.
#[derive(Error, Debug)]
pub enum NcKcError {
    #[error("Missing configuration parameter '{0}'")]
    MissingParameter(String),

    #[error("Configuration parameter '{param}' must be of type {expected}, but was {actual}")]
    InvalidParameterType {
        param: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Storage(#[from] SmosError),

    #[error("Failed to translate NetCDF file: {0}")]
    Translate(#[from] NetCdfError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Worker task failed: {0}")]
    Task(String),
}

/// Result type for index operations.
pub type Result<T> = std::result::Result<T, NcKcError>;

impl From<NcKcError> for SmosError {
    fn from(err: NcKcError) -> Self {
        match err {
            NcKcError::Storage(e) => e,
            NcKcError::MissingParameter(_)
            | NcKcError::InvalidParameterType { .. }
            | NcKcError::InvalidConfig(_) => SmosError::ConfigError(err.to_string()),
            other => SmosError::IndexError(other.to_string()),
        }
    }
}
