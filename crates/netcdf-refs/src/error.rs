//! Error types for chunk-reference operations.

use thiserror::Error;

/// Result type for chunk-reference operations.
pub type NetCdfResult<T> = Result<T, NetCdfError>;

/// Error types for NetCDF translation and chunk decoding.
#[derive(Error, Debug)]
pub enum NetCdfError {
    /// File I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Missing required variable or attribute
    #[error("Missing required data: {0}")]
    MissingData(String),

    /// Invalid data format
    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    /// Failure reported by the HDF5 library
    #[error("HDF5 error: {0}")]
    Hdf5(String),

    /// Compressor or filter we cannot decode
    #[error("Unsupported codec: {0}")]
    UnsupportedCodec(String),

    /// Malformed reference document or chunk reference
    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl NetCdfError {
    pub fn invalid_format(msg: impl Into<String>) -> Self {
        Self::InvalidFormat(msg.into())
    }

    pub fn invalid_reference(msg: impl Into<String>) -> Self {
        Self::InvalidReference(msg.into())
    }
}
