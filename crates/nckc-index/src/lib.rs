//! NetCDF Kerchunk index.
//!
//! Keeps one chunk-reference document per NetCDF file of a (local or S3)
//! archive, so that variables can later be read with ranged requests
//! instead of downloading whole files.
//!
//! # Example
//!
//! ```ignore
//! use nckc_index::{NcKcIndex, SyncOptions};
//!
//! let index = NcKcIndex::create(path, Some("s3://EODATA"), None, None, false)?;
//! let report = index.sync(&SyncOptions::default()).await?;
//! println!("{} files indexed", report.num_indexed);
//! ```

pub mod config;
pub mod error;
pub mod index;

pub use config::{IndexConfig, INDEX_CONFIG_FILENAME, INDEX_CONFIG_VERSION};
pub use error::{NcKcError, Result};
pub use index::{
    entry_name, FileOutcome, IndexDescription, NcKcIndex, SyncOptions, SyncReport,
    DEFAULT_BLOCK_SIZE,
};
