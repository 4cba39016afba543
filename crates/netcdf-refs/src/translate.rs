//! Translation of NetCDF-4 files into Kerchunk reference sets.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use serde_json::{Map, Value};
use tracing::{debug, instrument, warn};

use crate::dtype::FillValue;
use crate::error::{NetCdfError, NetCdfResult};
use crate::layout::{DatasetLayout, Filter, Hdf5File, StorageKind};
use crate::native::{attributes_to_json, hdf5_lock, silence_hdf5_errors, TempNcFile};
use crate::refs::{CodecConfig, RefValue, ReferenceSet, ZarrArrayMeta};

/// Chunks smaller than this many bytes are stored inline.
pub const DEFAULT_INLINE_THRESHOLD: usize = 100;

const FILL_VALUE_ATTR: &str = "_FillValue";

#[derive(Debug, Clone)]
pub struct TranslateOptions {
    pub inline_threshold: usize,
}

impl Default for TranslateOptions {
    fn default() -> Self {
        Self {
            inline_threshold: DEFAULT_INLINE_THRESHOLD,
        }
    }
}

/// Variable metadata gathered through the netcdf library.
struct VariableInfo {
    name: String,
    dims: Vec<String>,
    attrs: Map<String, Value>,
}

/// Translate a local NetCDF-4 file.
///
/// Byte ranges in the result point at `url`, which is where readers will
/// fetch chunk data from.
#[instrument(skip(options), fields(path = %path.display()))]
pub fn translate_file(
    path: &Path,
    url: &str,
    options: &TranslateOptions,
) -> NetCdfResult<ReferenceSet> {
    silence_hdf5_errors();
    let _guard = hdf5_lock();

    let (global_attrs, variables) = read_netcdf_metadata(path)?;

    let mut refs = ReferenceSet::new();
    refs.set_global_attrs(global_attrs)?;

    let h5 = Hdf5File::open(path)?;
    let mut source = File::open(path)?;
    let mut num_chunks = 0usize;

    for var in variables {
        let layout = match h5.dataset_layout(&var.name) {
            Ok(layout) => layout,
            Err(NetCdfError::InvalidFormat(msg)) => {
                warn!(variable = %var.name, reason = %msg, "Skipping variable");
                continue;
            }
            Err(e) => return Err(e),
        };
        let meta = array_meta(&var, &layout)?;
        refs.set_array(&var.name, &meta, &var.dims, var.attrs)?;

        match &layout.kind {
            StorageKind::Compact { raw } => {
                if !raw.is_empty() {
                    let index = vec![0; layout.shape.len()];
                    refs.add_chunk(&var.name, &index, RefValue::inline_bytes(raw));
                    num_chunks += 1;
                }
            }
            StorageKind::Chunked | StorageKind::Contiguous => {
                for chunk in &layout.chunks {
                    let value = if (chunk.size as usize) < options.inline_threshold {
                        let bytes = read_range(&mut source, chunk.offset, chunk.size)?;
                        RefValue::inline_bytes(&bytes)
                    } else {
                        RefValue::Range(url.to_string(), chunk.offset, chunk.size)
                    };
                    refs.add_chunk(&var.name, &chunk.index, value);
                    num_chunks += 1;
                }
            }
        }
    }

    debug!(num_chunks, "Translated NetCDF file");
    Ok(refs)
}

/// Translate NetCDF-4 file content held in memory.
pub fn translate_bytes(
    data: &[u8],
    url: &str,
    options: &TranslateOptions,
) -> NetCdfResult<ReferenceSet> {
    let temp = TempNcFile::create(data)?;
    translate_file(temp.path(), url, options)
}

fn read_netcdf_metadata(path: &Path) -> NetCdfResult<(Map<String, Value>, Vec<VariableInfo>)> {
    let file = netcdf::open(path)
        .map_err(|e| NetCdfError::InvalidFormat(format!("Failed to open NetCDF: {}", e)))?;

    let global_attrs = attributes_to_json(file.attributes());
    let variables = file
        .variables()
        .map(|var| VariableInfo {
            name: var.name().to_string(),
            dims: var.dimensions().iter().map(|d| d.name().to_string()).collect(),
            attrs: attributes_to_json(var.attributes()),
        })
        .collect();
    Ok((global_attrs, variables))
}

fn array_meta(var: &VariableInfo, layout: &DatasetLayout) -> NetCdfResult<ZarrArrayMeta> {
    let mut meta = ZarrArrayMeta::new(layout.shape.clone(), layout.chunk_shape.clone(), layout.dtype);
    meta.fill_value = var
        .attrs
        .get(FILL_VALUE_ATTR)
        .and_then(FillValue::from_json);

    if matches!(layout.kind, StorageKind::Compact { .. }) {
        return Ok(meta);
    }

    let mut filters = Vec::new();
    let mut checksummed = false;
    for filter in &layout.filters {
        if checksummed {
            return Err(NetCdfError::UnsupportedCodec(format!(
                "filter after fletcher32 in '{}'",
                var.name
            )));
        }
        match filter {
            Filter::Shuffle => {
                if meta.compressor.is_some() {
                    return Err(NetCdfError::UnsupportedCodec(format!(
                        "shuffle after deflate in '{}'",
                        var.name
                    )));
                }
                filters.push(CodecConfig::Shuffle {
                    elementsize: layout.dtype.size,
                });
            }
            Filter::Deflate { level } => {
                meta.compressor = Some(CodecConfig::Zlib { level: *level });
            }
            Filter::Fletcher32 => {
                checksummed = true;
                filters.push(CodecConfig::Fletcher32);
            }
            Filter::Other { id } => {
                return Err(NetCdfError::UnsupportedCodec(format!(
                    "HDF5 filter {} in '{}'",
                    id, var.name
                )))
            }
        }
    }
    if !filters.is_empty() {
        meta.filters = Some(filters);
    }
    Ok(meta)
}

fn read_range(file: &mut File, offset: u64, size: u64) -> NetCdfResult<Vec<u8>> {
    let mut buf = vec![0u8; size as usize];
    file.seek(SeekFrom::Start(offset))?;
    file.read_exact(&mut buf)?;
    Ok(buf)
}
