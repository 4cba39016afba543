//! The SMOS data store: data ids, openers and their descriptions.

mod params;
mod registry;

pub use params::{open_params_schema, OpenParams};
pub use registry::{register_plugin, DataStoreRegistry, OpenerInfo, StoreFactory, StoreParams};

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{info, instrument};

use smos_common::time::MISSION_START;
use smos_common::{DatasetId, SmosError, SmosResult};

use crate::catalog::{Catalog, IndexCatalog};
use crate::config::{CubeConfig, DGG_PATH_ENV};
use crate::cube::{CubeDataset, L2Cube, TimeStepLoader, CUBE_DIMS};
use crate::dgg::{DggGeometry, SeqnumGrid, TiledDgg};
use crate::dsiter::DatasetIterator;

/// Identifier of the SMOS data store.
pub const SMOS_DATA_STORE_ID: &str = "smos";

/// Kinds of data the store can open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    /// A single resolution cube
    Dataset,
    /// A multi-resolution cube
    MlDataset,
    /// An iterator over the L2 products, one dataset each
    #[serde(rename = "smosdsiter")]
    DsIter,
}

impl DataType {
    pub fn all() -> &'static [DataType] {
        &[DataType::Dataset, DataType::MlDataset, DataType::DsIter]
    }

    pub fn alias(&self) -> &'static str {
        match self {
            DataType::Dataset => "dataset",
            DataType::MlDataset => "mldataset",
            DataType::DsIter => "smosdsiter",
        }
    }

    /// Opener id, e.g. `dataset:zarr:smos`.
    pub fn opener_id(&self) -> String {
        format!("{}:zarr:{}", self.alias(), SMOS_DATA_STORE_ID)
    }

    pub fn parse(s: &str) -> SmosResult<Self> {
        Self::all()
            .iter()
            .copied()
            .find(|t| t.alias() == s)
            .ok_or_else(|| SmosError::InvalidDataType(s.to_string()))
    }

    pub fn from_opener_id(opener_id: &str) -> SmosResult<Self> {
        Self::all()
            .iter()
            .copied()
            .find(|t| t.opener_id() == opener_id)
            .ok_or_else(|| SmosError::InvalidOpenerId(opener_id.to_string()))
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.alias())
    }
}

/// Description of a variable in a [`DataDescriptor`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariableDescriptor {
    pub name: String,
    pub dims: Vec<String>,
}

/// Description of a data resource, as returned by `describe_data`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataDescriptor {
    pub data_id: String,
    pub data_type: DataType,
    pub crs: String,
    pub bbox: [f64; 4],
    pub spatial_res: f64,
    pub time_range: (String, Option<String>),
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_levels: Option<usize>,
    pub data_vars: Vec<VariableDescriptor>,
}

/// Result of [`SmosDataStore::open_data`].
#[derive(Debug)]
pub enum OpenedData {
    Dataset(CubeDataset),
    MultiLevel(L2Cube),
    Iterator(DatasetIterator),
}

impl OpenedData {
    pub fn data_type(&self) -> DataType {
        match self {
            OpenedData::Dataset(_) => DataType::Dataset,
            OpenedData::MultiLevel(_) => DataType::MlDataset,
            OpenedData::Iterator(_) => DataType::DsIter,
        }
    }
}

/// Opens SMOS L2 products as data cubes.
pub struct SmosDataStore {
    catalog: Arc<dyn Catalog>,
    dgg: Arc<dyn SeqnumGrid>,
    default_cache_size: usize,
}

impl std::fmt::Debug for SmosDataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmosDataStore")
            .field("geometry", &self.dgg.geometry())
            .field("default_cache_size", &self.default_cache_size)
            .finish()
    }
}

impl SmosDataStore {
    pub fn new(catalog: Arc<dyn Catalog>, dgg: Arc<dyn SeqnumGrid>) -> Self {
        Self {
            catalog,
            dgg,
            default_cache_size: 0,
        }
    }

    /// Create a store reading the index and DGG named by `config`.
    pub fn from_config(config: &CubeConfig) -> SmosResult<Self> {
        config.validate().map_err(SmosError::ConfigError)?;
        let dgg_path = config
            .dgg_path
            .as_deref()
            .ok_or_else(|| SmosError::MissingParameter(DGG_PATH_ENV.to_string()))?;
        let catalog = IndexCatalog::open(config.index_path.as_deref(), config.storage_max_retries)?;
        let dgg = TiledDgg::open(dgg_path)?;
        info!(?catalog, ?dgg, "Created SMOS data store");
        Ok(Self::new(Arc::new(catalog), Arc::new(dgg))
            .with_default_cache_size(config.l2_product_cache_size))
    }

    /// Cache size used when open parameters do not give one.
    pub fn with_default_cache_size(mut self, size: usize) -> Self {
        self.default_cache_size = size;
        self
    }

    pub fn catalog(&self) -> &Arc<dyn Catalog> {
        &self.catalog
    }

    pub fn geometry(&self) -> DggGeometry {
        self.dgg.geometry()
    }

    pub fn get_data_types() -> Vec<&'static str> {
        DataType::all().iter().map(|t| t.alias()).collect()
    }

    /// Data types available for a data id.
    pub fn get_data_types_for_data(data_id: &str) -> SmosResult<Vec<&'static str>> {
        DatasetId::parse(data_id)?;
        Ok(Self::get_data_types())
    }

    /// All data ids. Every id is available as every data type.
    pub fn get_data_ids(data_type: Option<&str>) -> SmosResult<Vec<&'static str>> {
        if let Some(data_type) = data_type {
            DataType::parse(data_type)?;
        }
        Ok(DatasetId::all().iter().map(|id| id.as_str()).collect())
    }

    pub fn has_data(data_id: &str, data_type: Option<&str>) -> bool {
        DatasetId::parse(data_id).is_ok()
            && data_type.map_or(true, |t| DataType::parse(t).is_ok())
    }

    /// Opener ids for a data type, or all of them.
    pub fn get_data_opener_ids(
        data_id: Option<&str>,
        data_type: Option<&str>,
    ) -> SmosResult<Vec<String>> {
        if let Some(data_id) = data_id {
            DatasetId::parse(data_id)?;
        }
        match data_type {
            Some(data_type) => Ok(vec![DataType::parse(data_type)?.opener_id()]),
            None => Ok(DataType::all().iter().map(|t| t.opener_id()).collect()),
        }
    }

    /// Describe a data resource without opening any product.
    ///
    /// `data_type` defaults to `mldataset`, so the description carries
    /// the number of pyramid levels.
    pub fn describe_data(&self, data_id: &str, data_type: Option<&str>) -> SmosResult<DataDescriptor> {
        let id = DatasetId::parse(data_id)?;
        let data_type = data_type
            .map(DataType::parse)
            .transpose()?
            .unwrap_or(DataType::MlDataset);
        let geometry = self.dgg.geometry();
        let lat_max = geometry.lat_max();
        let dims: Vec<String> = CUBE_DIMS.iter().map(|d| d.to_string()).collect();

        Ok(DataDescriptor {
            data_id: id.as_str().to_string(),
            data_type,
            crs: "EPSG:4326".to_string(),
            bbox: [-180.0, -lat_max, 180.0, lat_max],
            spatial_res: geometry.pixel_size(0),
            time_range: (MISSION_START.to_string(), None),
            num_levels: (data_type == DataType::MlDataset).then_some(geometry.num_levels),
            data_vars: id
                .var_names()
                .iter()
                .map(|name| VariableDescriptor {
                    name: name.to_string(),
                    dims: dims.clone(),
                })
                .collect(),
        })
    }

    pub fn get_open_data_params_schema(
        data_id: Option<&str>,
        opener_id: Option<&str>,
    ) -> SmosResult<Value> {
        let data_id = data_id.map(DatasetId::parse).transpose()?;
        let data_type = opener_id
            .map(DataType::from_opener_id)
            .transpose()?
            .unwrap_or(DataType::Dataset);
        Ok(open_params_schema(data_id, data_type))
    }

    /// Open a data resource.
    ///
    /// `opener_id` defaults to `dataset:zarr:smos`. Fails with
    /// [`SmosError::EmptyDataset`] if no product matches.
    #[instrument(skip(self, params))]
    pub async fn open_data(
        &self,
        data_id: &str,
        opener_id: Option<&str>,
        params: Value,
    ) -> SmosResult<OpenedData> {
        let id = DatasetId::parse(data_id)?;
        let data_type = opener_id
            .map(DataType::from_opener_id)
            .transpose()?
            .unwrap_or(DataType::Dataset);
        let params = OpenParams::from_value(params)?;
        params.validate(id, data_type)?;

        let time_range = params.time_range()?;
        let bbox = params.bbox()?;
        let product_type = id.product_type();

        let records = self.catalog.find_datasets(product_type, &time_range).await?;
        if records.is_empty() {
            let bbox = bbox.map_or_else(|| "None".to_string(), |b| b.to_string());
            return Err(SmosError::EmptyDataset(format!(
                "No SMOS datasets of type '{}' found for time range {} and bbox {}",
                product_type, time_range, bbox
            )));
        }
        info!(
            data_id,
            opener = %data_type.opener_id(),
            time_steps = records.len(),
            "Opening SMOS data"
        );

        let cache_size = params.l2_product_cache_size.unwrap_or(self.default_cache_size);
        let loader = Arc::new(TimeStepLoader::new(
            Arc::clone(&self.catalog),
            Arc::clone(&self.dgg),
            records,
            cache_size,
        ));

        match data_type {
            DataType::Dataset => {
                let cube =
                    L2Cube::open(id, loader, bbox, params.variable_names.as_deref()).await?;
                Ok(OpenedData::Dataset(cube.level(params.res_level.unwrap_or(0))?))
            }
            DataType::MlDataset => {
                let cube =
                    L2Cube::open(id, loader, bbox, params.variable_names.as_deref()).await?;
                Ok(OpenedData::MultiLevel(cube))
            }
            DataType::DsIter => Ok(OpenedData::Iterator(DatasetIterator::new(
                loader,
                bbox.as_ref(),
                params.variable_names,
            )?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opener_ids() {
        assert_eq!(DataType::Dataset.opener_id(), "dataset:zarr:smos");
        assert_eq!(
            DataType::from_opener_id("smosdsiter:zarr:smos").unwrap(),
            DataType::DsIter
        );
        assert!(matches!(
            DataType::from_opener_id("dataset:netcdf:smos"),
            Err(SmosError::InvalidOpenerId(_))
        ));
        assert_eq!(
            SmosDataStore::get_data_opener_ids(None, Some("mldataset")).unwrap(),
            vec!["mldataset:zarr:smos"]
        );
        assert_eq!(
            SmosDataStore::get_data_opener_ids(Some("SMOS-L2C-OS"), None).unwrap(),
            vec!["dataset:zarr:smos", "mldataset:zarr:smos", "smosdsiter:zarr:smos"]
        );
        assert!(matches!(
            SmosDataStore::get_data_opener_ids(None, Some("geodataframe")),
            Err(SmosError::InvalidDataType(_))
        ));
    }

    #[test]
    fn test_data_ids() {
        assert_eq!(
            SmosDataStore::get_data_ids(None).unwrap(),
            vec!["SMOS-L2C-SM", "SMOS-L2C-OS"]
        );
        assert!(SmosDataStore::get_data_ids(Some("vectordatacube")).is_err());
        assert!(SmosDataStore::has_data("SMOS-L2C-SM", None));
        assert!(SmosDataStore::has_data("SMOS-L2C-OS", Some("mldataset")));
        assert!(!SmosDataStore::has_data("SMOS-L2C-XX", None));
        assert!(!SmosDataStore::has_data("SMOS-L2C-SM", Some("cube")));
        assert_eq!(
            SmosDataStore::get_data_types(),
            vec!["dataset", "mldataset", "smosdsiter"]
        );
    }

    #[test]
    fn test_data_type_serialization() {
        assert_eq!(serde_json::to_value(DataType::DsIter).unwrap(), "smosdsiter");
        assert_eq!(serde_json::to_value(DataType::MlDataset).unwrap(), "mldataset");
    }
}
