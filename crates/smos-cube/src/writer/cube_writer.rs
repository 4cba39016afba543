//! Zarr V3 writer for cube datasets.
//!
//! Variables are written one time step at a time, so memory use is bounded
//! by a single `(1, lat, lon)` image per variable.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info, instrument};
use zarrs::array::{Array, ArrayBuilder, DataType, Element, FillValue};
use zarrs::array_subset::ArraySubset;
use zarrs::group::GroupBuilder;
use zarrs_filesystem::FilesystemStore;

use netcdf_refs::{with_array_data, ArrayData};
use smos_common::{SmosError, SmosResult};

use crate::cube::{coordinate_attrs, CubeDataset, CubeVariable, CUBE_DIMS};

/// Units of the time coordinates written to a cube.
pub const TIME_UNITS: &str = "seconds since 1970-01-01T00:00:00Z";

/// Summary of a completed write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteReport {
    pub path: PathBuf,
    pub shape: [usize; 3],
    pub variables: Vec<String>,
    pub images_written: usize,
}

/// Writes cube datasets to a Zarr V3 group on the local filesystem.
pub struct CubeWriter {
    path: PathBuf,
    store: Arc<FilesystemStore>,
}

impl std::fmt::Debug for CubeWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CubeWriter").field("path", &self.path).finish()
    }
}

fn storage_err(e: impl std::fmt::Display) -> SmosError {
    SmosError::StorageError(e.to_string())
}

impl CubeWriter {
    /// Create a writer for a new Zarr group at `path`.
    pub fn create(path: &Path) -> SmosResult<Self> {
        std::fs::create_dir_all(path)?;
        let store = FilesystemStore::new(path).map_err(storage_err)?;
        Ok(Self {
            path: path.to_path_buf(),
            store: Arc::new(store),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write coordinates, then every variable time step by time step.
    #[instrument(skip(self, dataset), fields(path = %self.path.display(), level = dataset.level()))]
    pub async fn write(&self, dataset: &CubeDataset) -> SmosResult<WriteReport> {
        let shape = dataset.shape();
        let [num_times, height, width] = shape;

        GroupBuilder::new()
            .attributes(dataset.attrs().clone())
            .build(Arc::clone(&self.store), "/")
            .map_err(storage_err)?
            .store_metadata()
            .map_err(storage_err)?;

        self.write_coordinate("lon", &["lon"], &[width as u64], dataset.lon())?;
        self.write_coordinate("lat", &["lat"], &[height as u64], dataset.lat())?;

        let time: Vec<i64> = dataset.time().iter().map(|t| t.timestamp()).collect();
        self.write_coordinate("time", &["time"], &[num_times as u64], &time)?;

        let time_bnds: Vec<i64> = dataset
            .time_bnds()
            .iter()
            .flat_map(|b| [b[0].timestamp(), b[1].timestamp()])
            .collect();
        self.write_coordinate("time_bnds", &["time", "bnds"], &[num_times as u64, 2], &time_bnds)?;

        let arrays = dataset
            .variables()
            .iter()
            .map(|var| self.create_variable(var, shape, dataset.chunks()))
            .collect::<SmosResult<Vec<_>>>()?;

        let mut images_written = 0;
        for t in 0..num_times {
            let images = dataset.load_images(t).await?;
            for ((var, array), data) in dataset.variables().iter().zip(&arrays).zip(&images) {
                if data.len() != height * width {
                    return Err(SmosError::InternalError(format!(
                        "{} time step {} has {} values, expected {}",
                        var.name,
                        t,
                        data.len(),
                        height * width
                    )));
                }
                with_array_data!(data, v => store_image(array, t as u64, v))?;
                images_written += 1;
            }
            debug!(time_index = t, images = images.len(), "Wrote time step");
        }

        info!(
            variables = dataset.variables().len(),
            images = images_written,
            "Wrote cube"
        );
        Ok(WriteReport {
            path: self.path.clone(),
            shape,
            variables: dataset.var_names().iter().map(|s| s.to_string()).collect(),
            images_written,
        })
    }

    fn write_coordinate<T: Element + CoordinateElement>(
        &self,
        name: &str,
        dims: &[&str],
        shape: &[u64],
        values: &[T],
    ) -> SmosResult<()> {
        let mut attrs = coordinate_attrs(name);
        if name.starts_with("time") {
            attrs.insert("units".to_string(), json!(TIME_UNITS));
            attrs.insert("calendar".to_string(), json!("proleptic_gregorian"));
        }
        let chunk_grid: zarrs::array::ChunkGrid = shape
            .to_vec()
            .try_into()
            .map_err(|e| SmosError::InternalError(format!("{:?}", e)))?;

        let array = ArrayBuilder::new(shape.to_vec(), T::data_type(), chunk_grid, T::fill_value())
            .dimension_names(Some(dims.to_vec()))
            .attributes(attrs)
            .build(Arc::clone(&self.store), &format!("/{}", name))
            .map_err(storage_err)?;
        array.store_metadata().map_err(storage_err)?;

        let subset = ArraySubset::new_with_start_shape(vec![0; shape.len()], shape.to_vec())
            .map_err(storage_err)?;
        array
            .store_array_subset_elements(&subset, values)
            .map_err(storage_err)
    }

    fn create_variable(
        &self,
        var: &CubeVariable,
        shape: [usize; 3],
        chunks: [usize; 3],
    ) -> SmosResult<Array<FilesystemStore>> {
        let (data_type, fill_value) = zarr_type(var);
        let chunk_grid: zarrs::array::ChunkGrid = chunks
            .iter()
            .map(|&c| c as u64)
            .collect::<Vec<_>>()
            .try_into()
            .map_err(|e| SmosError::InternalError(format!("{:?}", e)))?;

        let array = ArrayBuilder::new(
            shape.iter().map(|&n| n as u64).collect::<Vec<_>>(),
            data_type,
            chunk_grid,
            fill_value,
        )
        .dimension_names(Some(CUBE_DIMS.to_vec()))
        .attributes(without_fill_value(var.cube_attrs()))
        .build(Arc::clone(&self.store), &format!("/{}", var.name))
        .map_err(storage_err)?;
        array.store_metadata().map_err(storage_err)?;
        Ok(array)
    }
}

/// Zarr V3 carries the fill value in the array metadata.
fn without_fill_value(mut attrs: Map<String, Value>) -> Map<String, Value> {
    attrs.remove("_FillValue");
    attrs
}

fn store_image<T: Element>(array: &Array<FilesystemStore>, t: u64, values: &[T]) -> SmosResult<()> {
    array
        .store_chunk_elements(&[t, 0, 0], values)
        .map_err(storage_err)
}

/// Zarr data type and fill value of a variable.
fn zarr_type(var: &CubeVariable) -> (DataType, FillValue) {
    match ArrayData::full(&var.dtype, 1, var.fill_value) {
        ArrayData::I8(v) => (DataType::Int8, FillValue::from(v[0])),
        ArrayData::U8(v) => (DataType::UInt8, FillValue::from(v[0])),
        ArrayData::I16(v) => (DataType::Int16, FillValue::from(v[0])),
        ArrayData::U16(v) => (DataType::UInt16, FillValue::from(v[0])),
        ArrayData::I32(v) => (DataType::Int32, FillValue::from(v[0])),
        ArrayData::U32(v) => (DataType::UInt32, FillValue::from(v[0])),
        ArrayData::I64(v) => (DataType::Int64, FillValue::from(v[0])),
        ArrayData::U64(v) => (DataType::UInt64, FillValue::from(v[0])),
        ArrayData::F32(v) => (DataType::Float32, FillValue::from(v[0])),
        ArrayData::F64(v) => (DataType::Float64, FillValue::from(v[0])),
    }
}

/// Element types of coordinate arrays.
trait CoordinateElement {
    fn data_type() -> DataType;
    fn fill_value() -> FillValue;
}

impl CoordinateElement for f64 {
    fn data_type() -> DataType {
        DataType::Float64
    }
    fn fill_value() -> FillValue {
        FillValue::from(f64::NAN)
    }
}

impl CoordinateElement for i64 {
    fn data_type() -> DataType {
        DataType::Int64
    }
    fn fill_value() -> FillValue {
        FillValue::from(0i64)
    }
}
