//! Chunk decoding and array assembly.

use std::collections::HashMap;
use std::io::Read;

use bytes::Bytes;
use flate2::read::ZlibDecoder;

use crate::dtype::{ArrayData, FillValue};
use crate::error::{NetCdfError, NetCdfResult};
use crate::refs::{CodecConfig, ZarrArrayMeta};

/// Size of the HDF5 Fletcher-32 checksum trailing a stored chunk.
pub const FLETCHER32_SIZE: usize = 4;

/// Decode one stored chunk into raw element bytes in the array's byte order.
///
/// A Fletcher-32 checksum is the last stage of the HDF5 pipeline, so it is
/// stripped before decompression. Other filters are undone in reverse order
/// after the compressor.
pub fn decode_chunk(meta: &ZarrArrayMeta, raw: &[u8]) -> NetCdfResult<Vec<u8>> {
    let dtype = meta.data_type()?;
    let expected = meta.chunk_elements() * dtype.size;

    let checksummed = meta
        .filters
        .iter()
        .flatten()
        .any(|f| matches!(f, CodecConfig::Fletcher32));
    let raw = if checksummed {
        let len = raw.len().checked_sub(FLETCHER32_SIZE).ok_or_else(|| {
            NetCdfError::invalid_format("chunk is too short for its fletcher32 checksum")
        })?;
        &raw[..len]
    } else {
        raw
    };

    let mut bytes = match &meta.compressor {
        None => raw.to_vec(),
        Some(CodecConfig::Zlib { .. }) => inflate(raw, expected)?,
        Some(other) => return Err(NetCdfError::UnsupportedCodec(format!("{:?}", other))),
    };

    if let Some(filters) = &meta.filters {
        for filter in filters.iter().rev() {
            bytes = match filter {
                CodecConfig::Shuffle { elementsize } => unshuffle(&bytes, *elementsize),
                CodecConfig::Fletcher32 => bytes,
                other => return Err(NetCdfError::UnsupportedCodec(format!("{:?}", other))),
            };
        }
    }

    if bytes.len() != expected {
        return Err(NetCdfError::invalid_format(format!(
            "decoded chunk has {} bytes, expected {}",
            bytes.len(),
            expected
        )));
    }
    Ok(bytes)
}

fn inflate(raw: &[u8], capacity: usize) -> NetCdfResult<Vec<u8>> {
    let mut out = Vec::with_capacity(capacity);
    ZlibDecoder::new(raw)
        .read_to_end(&mut out)
        .map_err(|e| NetCdfError::invalid_format(format!("zlib decompression failed: {}", e)))?;
    Ok(out)
}

/// Reverse the HDF5 byte shuffle filter.
pub fn unshuffle(bytes: &[u8], elementsize: usize) -> Vec<u8> {
    if elementsize <= 1 || bytes.len() < elementsize {
        return bytes.to_vec();
    }
    let count = bytes.len() / elementsize;
    let mut out = vec![0u8; bytes.len()];
    for byte in 0..elementsize {
        let plane = &bytes[byte * count..(byte + 1) * count];
        for (i, &b) in plane.iter().enumerate() {
            out[i * elementsize + byte] = b;
        }
    }
    // Leftover bytes are stored unshuffled
    let tail = count * elementsize;
    out[tail..].copy_from_slice(&bytes[tail..]);
    out
}

/// Apply the HDF5 byte shuffle filter.
pub fn shuffle(bytes: &[u8], elementsize: usize) -> Vec<u8> {
    if elementsize <= 1 || bytes.len() < elementsize {
        return bytes.to_vec();
    }
    let count = bytes.len() / elementsize;
    let mut out = vec![0u8; bytes.len()];
    for i in 0..count {
        for byte in 0..elementsize {
            out[byte * count + i] = bytes[i * elementsize + byte];
        }
    }
    let tail = count * elementsize;
    out[tail..].copy_from_slice(&bytes[tail..]);
    out
}

/// Assemble decoded chunks into one C-ordered array.
///
/// `chunks` maps chunk grid indices to raw element bytes as returned by
/// [`decode_chunk`]. Missing chunks are filled with `fill`.
pub fn assemble_chunks(
    meta: &ZarrArrayMeta,
    fill: FillValue,
    chunks: &HashMap<Vec<usize>, Vec<u8>>,
) -> NetCdfResult<ArrayData> {
    let dtype = meta.data_type()?;
    let total = meta.num_elements();
    let elem = dtype.size;

    let fill_bytes = ArrayData::full(&dtype, 1, fill).to_bytes(dtype.is_big_endian());
    let mut out = Vec::with_capacity(total * elem);
    for _ in 0..total {
        out.extend_from_slice(&fill_bytes);
    }

    if meta.shape.is_empty() {
        if let Some(bytes) = chunks.get(&Vec::new()).or_else(|| chunks.get(&vec![0])) {
            if bytes.len() < elem {
                return Err(NetCdfError::invalid_format("scalar chunk is too short"));
            }
            out.copy_from_slice(&bytes[..elem]);
        }
        return ArrayData::from_bytes(&dtype, &out);
    }

    let ndim = meta.shape.len();
    let strides = c_strides(&meta.shape);
    let chunk_strides = c_strides(&meta.chunks);

    for (index, bytes) in chunks {
        if index.len() != ndim {
            return Err(NetCdfError::invalid_reference(format!(
                "chunk index {:?} does not match {} dimensions",
                index, ndim
            )));
        }
        if bytes.len() < meta.chunk_elements() * elem {
            return Err(NetCdfError::invalid_format(format!(
                "chunk {:?} has {} bytes, expected {}",
                index,
                bytes.len(),
                meta.chunk_elements() * elem
            )));
        }
        let origin: Vec<usize> = index.iter().zip(&meta.chunks).map(|(i, c)| i * c).collect();
        if origin.iter().zip(&meta.shape).any(|(o, n)| o >= n) {
            continue;
        }
        // Extent of this chunk clipped to the array bounds
        let extent: Vec<usize> = origin
            .iter()
            .zip(&meta.chunks)
            .zip(&meta.shape)
            .map(|((o, c), n)| (*c).min(n - o))
            .collect();
        let run = extent[ndim - 1];

        for_each_prefix(&extent[..ndim - 1], |prefix| {
            let mut src = 0;
            let mut dst = origin[ndim - 1] * strides[ndim - 1];
            for d in 0..ndim - 1 {
                src += prefix[d] * chunk_strides[d];
                dst += (origin[d] + prefix[d]) * strides[d];
            }
            let src = src * elem;
            let dst = dst * elem;
            out[dst..dst + run * elem].copy_from_slice(&bytes[src..src + run * elem]);
        });
    }

    ArrayData::from_bytes(&dtype, &out)
}

/// Decode raw stored chunks and assemble the full array.
///
/// Uses the array's fill value, or the type default, for missing chunks.
pub fn decode_variable(
    meta: &ZarrArrayMeta,
    raw_chunks: impl IntoIterator<Item = (Vec<usize>, Bytes)>,
) -> NetCdfResult<ArrayData> {
    let dtype = meta.data_type()?;
    let fill = meta.fill_value.unwrap_or_else(|| FillValue::default_for(&dtype));
    let mut decoded = HashMap::new();
    for (index, raw) in raw_chunks {
        decoded.insert(index, decode_chunk(meta, &raw)?);
    }
    assemble_chunks(meta, fill, &decoded)
}

fn c_strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![1; shape.len()];
    for d in (0..shape.len().saturating_sub(1)).rev() {
        strides[d] = strides[d + 1] * shape[d + 1];
    }
    strides
}

/// Visit every multi-index within `extent` in C order.
fn for_each_prefix(extent: &[usize], mut f: impl FnMut(&[usize])) {
    if extent.iter().any(|&n| n == 0) {
        return;
    }
    let mut index = vec![0; extent.len()];
    loop {
        f(&index);
        let mut d = extent.len();
        loop {
            if d == 0 {
                return;
            }
            d -= 1;
            index[d] += 1;
            if index[d] < extent[d] {
                break;
            }
            index[d] = 0;
        }
    }
}
