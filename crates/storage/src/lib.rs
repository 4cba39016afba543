//! Storage abstractions for the SMOS crates.
//!
//! Provides unified interfaces for:
//! - Source filesystems (local, S3, in-memory) holding NetCDF archives
//! - Index stores (directory or Zip) holding chunk-reference documents

pub mod index_store;
pub mod source;

pub use index_store::{open_index_store, DirIndexStore, IndexMode, IndexStore, ZipIndexStore};
pub use source::{split_protocol, SourceFs, SourceProtocol, DEFAULT_MAX_RETRIES};
