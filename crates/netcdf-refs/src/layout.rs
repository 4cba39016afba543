//! Storage layout of HDF5 datasets: type, filters and chunk byte ranges.
//!
//! These are read through the low-level HDF5 API because the netcdf library
//! does not expose chunk addresses. Requires HDF5 >= 1.10.5 for
//! `H5Dget_chunk_info`.

use std::ffi::CString;
use std::os::raw::{c_int, c_uint};
use std::path::Path;

use hdf5_metno_sys::h5::{haddr_t, herr_t, hsize_t};
use hdf5_metno_sys::h5d::{
    H5D_layout_t, H5Dclose, H5Dget_chunk_info, H5Dget_create_plist, H5Dget_num_chunks,
    H5Dget_offset, H5Dget_space, H5Dget_storage_size, H5Dget_type, H5Dopen2, H5Dread,
};
use hdf5_metno_sys::h5f::{H5Fclose, H5Fopen, H5F_ACC_RDONLY};
use hdf5_metno_sys::h5i::hid_t;
use hdf5_metno_sys::h5p::{
    H5Pclose, H5Pget_chunk, H5Pget_filter2, H5Pget_layout, H5Pget_nfilters, H5P_DEFAULT,
};
use hdf5_metno_sys::h5s::{H5Sclose, H5Sget_simple_extent_dims, H5Sget_simple_extent_ndims, H5S_ALL};
use hdf5_metno_sys::h5t::{
    H5T_class_t, H5T_order_t, H5T_sign_t, H5Tclose, H5Tget_class, H5Tget_order, H5Tget_sign,
    H5Tget_size,
};

use crate::dtype::{ByteOrder, DType, ScalarKind};
use crate::error::{NetCdfError, NetCdfResult};
use crate::native::silence_hdf5_errors;

const HADDR_UNDEF: haddr_t = haddr_t::MAX;

const FILTER_DEFLATE: i32 = 1;
const FILTER_SHUFFLE: i32 = 2;
const FILTER_FLETCHER32: i32 = 3;

/// A filter in a dataset's pipeline, in application order.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Deflate { level: u32 },
    Shuffle,
    Fletcher32,
    Other { id: i32 },
}

/// Byte range of one stored chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkLocation {
    /// Chunk grid index
    pub index: Vec<usize>,
    pub offset: u64,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StorageKind {
    Chunked,
    Contiguous,
    /// Data lives in the object header; `raw` holds it in file byte order.
    Compact { raw: Vec<u8> },
}

/// Storage description of one dataset.
#[derive(Debug, Clone)]
pub struct DatasetLayout {
    pub dtype: DType,
    pub shape: Vec<usize>,
    pub chunk_shape: Vec<usize>,
    pub filters: Vec<Filter>,
    pub kind: StorageKind,
    pub chunks: Vec<ChunkLocation>,
}

/// Owned HDF5 identifier closed on drop.
struct Handle {
    id: hid_t,
    close: unsafe extern "C" fn(hid_t) -> herr_t,
}

impl Handle {
    fn new(
        id: hid_t,
        close: unsafe extern "C" fn(hid_t) -> herr_t,
        what: impl FnOnce() -> String,
    ) -> NetCdfResult<Self> {
        if id < 0 {
            return Err(NetCdfError::Hdf5(format!("failed to open {}", what())));
        }
        Ok(Self { id, close })
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        // SAFETY: id was returned valid by the matching open call
        unsafe {
            (self.close)(self.id);
        }
    }
}

fn check(status: herr_t, what: &str) -> NetCdfResult<()> {
    if status < 0 {
        return Err(NetCdfError::Hdf5(format!("{} failed", what)));
    }
    Ok(())
}

/// An HDF5 file opened read-only for layout inspection.
///
/// Callers must hold [`crate::native::hdf5_lock`] for the lifetime of this value.
pub struct Hdf5File {
    file: Handle,
}

impl Hdf5File {
    pub fn open(path: &Path) -> NetCdfResult<Self> {
        silence_hdf5_errors();
        let c_path = CString::new(path.to_string_lossy().as_bytes())
            .map_err(|_| NetCdfError::invalid_format("path contains NUL byte"))?;
        // SAFETY: c_path outlives the call
        let id = unsafe { H5Fopen(c_path.as_ptr(), H5F_ACC_RDONLY, H5P_DEFAULT) };
        let file = Handle::new(id, H5Fclose, || format!("HDF5 file {}", path.display()))?;
        Ok(Self { file })
    }

    /// Inspect the dataset at `name` (relative to the root group).
    pub fn dataset_layout(&self, name: &str) -> NetCdfResult<DatasetLayout> {
        let c_name = CString::new(name)
            .map_err(|_| NetCdfError::invalid_format("dataset name contains NUL byte"))?;
        // SAFETY: all handles are checked before use and closed by Handle
        unsafe {
            let dset = Handle::new(
                H5Dopen2(self.file.id, c_name.as_ptr(), H5P_DEFAULT),
                H5Dclose,
                || format!("dataset '{}'", name),
            )?;
            let dtype = read_dtype(dset.id, name)?;
            let shape = read_shape(dset.id)?;
            let plist = Handle::new(H5Dget_create_plist(dset.id), H5Pclose, || {
                format!("creation properties of '{}'", name)
            })?;
            let filters = read_filters(plist.id)?;

            match H5Pget_layout(plist.id) {
                H5D_layout_t::H5D_CHUNKED => {
                    let chunk_shape = read_chunk_shape(plist.id, shape.len())?;
                    let chunks = read_chunk_locations(dset.id, &chunk_shape)?;
                    Ok(DatasetLayout {
                        dtype,
                        shape,
                        chunk_shape,
                        filters,
                        kind: StorageKind::Chunked,
                        chunks,
                    })
                }
                H5D_layout_t::H5D_CONTIGUOUS => {
                    let offset = H5Dget_offset(dset.id);
                    let size = H5Dget_storage_size(dset.id);
                    let chunks = if offset == HADDR_UNDEF || size == 0 {
                        Vec::new()
                    } else {
                        vec![ChunkLocation {
                            index: vec![0; shape.len()],
                            offset,
                            size,
                        }]
                    };
                    Ok(DatasetLayout {
                        dtype,
                        chunk_shape: shape.clone(),
                        shape,
                        filters,
                        kind: StorageKind::Contiguous,
                        chunks,
                    })
                }
                H5D_layout_t::H5D_COMPACT => {
                    let raw = read_raw(dset.id, &dtype, &shape)?;
                    Ok(DatasetLayout {
                        dtype,
                        chunk_shape: shape.clone(),
                        shape,
                        filters,
                        kind: StorageKind::Compact { raw },
                        chunks: Vec::new(),
                    })
                }
                other => Err(NetCdfError::invalid_format(format!(
                    "unsupported storage layout {:?} for '{}'",
                    other, name
                ))),
            }
        }
    }
}

unsafe fn read_dtype(dset: hid_t, name: &str) -> NetCdfResult<DType> {
    let tid = Handle::new(H5Dget_type(dset), H5Tclose, || format!("type of '{}'", name))?;
    let size = H5Tget_size(tid.id);
    let kind = match H5Tget_class(tid.id) {
        H5T_class_t::H5T_INTEGER => match H5Tget_sign(tid.id) {
            H5T_sign_t::H5T_SGN_NONE => ScalarKind::UInt,
            _ => ScalarKind::Int,
        },
        H5T_class_t::H5T_FLOAT => ScalarKind::Float,
        other => {
            return Err(NetCdfError::invalid_format(format!(
                "unsupported type class {:?} for '{}'",
                other, name
            )))
        }
    };
    let order = match H5Tget_order(tid.id) {
        H5T_order_t::H5T_ORDER_BE => ByteOrder::Big,
        _ => ByteOrder::Little,
    };
    DType::new(kind, size, order)
}

unsafe fn read_shape(dset: hid_t) -> NetCdfResult<Vec<usize>> {
    let space = Handle::new(H5Dget_space(dset), H5Sclose, || "dataspace".to_string())?;
    let ndims = H5Sget_simple_extent_ndims(space.id);
    if ndims < 0 {
        return Err(NetCdfError::Hdf5("H5Sget_simple_extent_ndims failed".into()));
    }
    let mut dims = vec![0 as hsize_t; ndims as usize];
    if ndims > 0 {
        let n = H5Sget_simple_extent_dims(space.id, dims.as_mut_ptr(), std::ptr::null_mut());
        if n < 0 {
            return Err(NetCdfError::Hdf5("H5Sget_simple_extent_dims failed".into()));
        }
    }
    Ok(dims.into_iter().map(|d| d as usize).collect())
}

unsafe fn read_chunk_shape(plist: hid_t, ndims: usize) -> NetCdfResult<Vec<usize>> {
    let mut dims = vec![0 as hsize_t; ndims.max(1)];
    let n = H5Pget_chunk(plist, ndims as c_int, dims.as_mut_ptr());
    if n < 0 {
        return Err(NetCdfError::Hdf5("H5Pget_chunk failed".into()));
    }
    dims.truncate(ndims);
    Ok(dims.into_iter().map(|d| d as usize).collect())
}

unsafe fn read_filters(plist: hid_t) -> NetCdfResult<Vec<Filter>> {
    let n = H5Pget_nfilters(plist);
    if n < 0 {
        return Err(NetCdfError::Hdf5("H5Pget_nfilters failed".into()));
    }
    let mut filters = Vec::with_capacity(n as usize);
    for idx in 0..n as c_uint {
        let mut flags: c_uint = 0;
        let mut cd_nelmts: usize = 8;
        let mut cd_values = [0 as c_uint; 8];
        let mut config: c_uint = 0;
        let id = H5Pget_filter2(
            plist,
            idx,
            &mut flags,
            &mut cd_nelmts,
            cd_values.as_mut_ptr(),
            0,
            std::ptr::null_mut(),
            &mut config,
        );
        let filter = match id {
            FILTER_DEFLATE => Filter::Deflate {
                level: if cd_nelmts > 0 { cd_values[0] } else { 6 },
            },
            FILTER_SHUFFLE => Filter::Shuffle,
            FILTER_FLETCHER32 => Filter::Fletcher32,
            id if id < 0 => return Err(NetCdfError::Hdf5("H5Pget_filter2 failed".into())),
            id => Filter::Other { id },
        };
        filters.push(filter);
    }
    Ok(filters)
}

unsafe fn read_chunk_locations(
    dset: hid_t,
    chunk_shape: &[usize],
) -> NetCdfResult<Vec<ChunkLocation>> {
    let space = Handle::new(H5Dget_space(dset), H5Sclose, || "dataspace".to_string())?;
    let mut count: hsize_t = 0;
    check(H5Dget_num_chunks(dset, space.id, &mut count), "H5Dget_num_chunks")?;

    let ndims = chunk_shape.len();
    let mut chunks = Vec::with_capacity(count as usize);
    for i in 0..count {
        let mut origin = vec![0 as hsize_t; ndims.max(1)];
        let mut filter_mask: c_uint = 0;
        let mut addr: haddr_t = 0;
        let mut size: hsize_t = 0;
        check(
            H5Dget_chunk_info(
                dset,
                space.id,
                i,
                origin.as_mut_ptr(),
                &mut filter_mask,
                &mut addr,
                &mut size,
            ),
            "H5Dget_chunk_info",
        )?;
        if filter_mask != 0 {
            return Err(NetCdfError::UnsupportedCodec(format!(
                "chunk {} skips filters (mask {:#x})",
                i, filter_mask
            )));
        }
        if addr == HADDR_UNDEF {
            continue;
        }
        let index = origin
            .iter()
            .take(ndims)
            .zip(chunk_shape)
            .map(|(&o, &c)| o as usize / c.max(1))
            .collect();
        chunks.push(ChunkLocation {
            index,
            offset: addr,
            size,
        });
    }
    chunks.sort_by(|a, b| a.index.cmp(&b.index));
    Ok(chunks)
}

/// Read compact data in file byte order.
unsafe fn read_raw(dset: hid_t, dtype: &DType, shape: &[usize]) -> NetCdfResult<Vec<u8>> {
    let tid = Handle::new(H5Dget_type(dset), H5Tclose, || "dataset type".to_string())?;
    let len: usize = shape.iter().product();
    let mut buf = vec![0u8; len * dtype.size];
    check(
        H5Dread(
            dset,
            tid.id,
            H5S_ALL,
            H5S_ALL,
            H5P_DEFAULT,
            buf.as_mut_ptr().cast(),
        ),
        "H5Dread",
    )?;
    Ok(buf)
}
