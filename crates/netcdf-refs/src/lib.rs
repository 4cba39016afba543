//! Kerchunk chunk references for NetCDF-4/HDF5 files.
//!
//! This crate translates NetCDF-4 files into Kerchunk version 1 reference
//! sets, which describe each variable as a Zarr v2 array whose chunks are byte
//! ranges of the original file, and decodes chunk data read back through such
//! references.
//!
//! # Example
//!
//! ```ignore
//! use netcdf_refs::{translate_file, TranslateOptions};
//!
//! let refs = translate_file(path, "s3://bucket/SM_OPER_....nc", &TranslateOptions::default())?;
//! let meta = refs.array_meta("Soil_Moisture")?;
//! ```

pub mod codec;
pub mod dtype;
pub mod error;
pub mod layout;
pub mod native;
pub mod refs;
pub mod translate;

pub use codec::{assemble_chunks, decode_chunk, decode_variable};
pub use dtype::{ArrayData, ByteOrder, DType, Element, FillValue, ScalarKind};
pub use error::{NetCdfError, NetCdfResult};
pub use native::silence_hdf5_errors;
pub use refs::{chunk_key, CodecConfig, RefValue, ReferenceSet, ZarrArrayMeta, ARRAY_DIMENSIONS_ATTR};
pub use translate::{translate_bytes, translate_file, TranslateOptions, DEFAULT_INLINE_THRESHOLD};
