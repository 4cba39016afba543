//! Error types for SMOS cube operations.

use thiserror::Error;

/// Result type alias using SmosError.
pub type SmosResult<T> = Result<T, SmosError>;

/// Primary error type shared by the SMOS crates.
#[derive(Debug, Error)]
pub enum SmosError {
    // === Parameter Errors ===
    #[error("Missing required parameter: {0}")]
    MissingParameter(String),

    #[error("Invalid parameter value for '{param}': {message}")]
    InvalidParameter { param: String, message: String },

    #[error("Unknown dataset identifier '{0}'")]
    UnknownDataId(String),

    #[error("Invalid opener identifier '{0}'")]
    InvalidOpenerId(String),

    #[error("Invalid dataset type '{0}'")]
    InvalidDataType(String),

    #[error("Invalid time specification: {0}")]
    InvalidTime(String),

    #[error("Invalid bounding box: {0}")]
    InvalidBbox(String),

    // === Data Errors ===
    #[error("{0}")]
    EmptyDataset(String),

    #[error("Failed to read data: {0}")]
    DataReadError(String),

    #[error("Invalid NetCDF data: {0}")]
    NetCdfError(String),

    // === Storage Errors ===
    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Index error: {0}")]
    IndexError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl SmosError {
    pub fn invalid_parameter(param: impl Into<String>, message: impl Into<String>) -> Self {
        SmosError::InvalidParameter {
            param: param.into(),
            message: message.into(),
        }
    }

    /// True for errors caused by the caller's input rather than by data or storage.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            SmosError::MissingParameter(_)
                | SmosError::InvalidParameter { .. }
                | SmosError::UnknownDataId(_)
                | SmosError::InvalidOpenerId(_)
                | SmosError::InvalidDataType(_)
                | SmosError::InvalidTime(_)
                | SmosError::InvalidBbox(_)
        )
    }
}

impl From<std::io::Error> for SmosError {
    fn from(err: std::io::Error) -> Self {
        SmosError::StorageError(err.to_string())
    }
}

impl From<serde_json::Error> for SmosError {
    fn from(err: serde_json::Error) -> Self {
        SmosError::InternalError(format!("JSON error: {}", err))
    }
}
