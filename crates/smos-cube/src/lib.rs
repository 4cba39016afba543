//! SMOS Level-2 Data Cubes
//!
//! This crate exposes SMOS L2 soil moisture and ocean salinity products as
//! `(time, lat, lon)` data cubes. Products are located through a NetCDF
//! Kerchunk index and read with byte-range requests; their grid points are
//! mapped onto a geographic grid through the SMOS Discrete Global Grid.
//!
//! # Architecture
//!
//! ```text
//! SmosDataStore::open_data(data_id, opener_id, params)
//!      │
//!      ├─► Catalog::find_datasets(product_type, time_range)
//!      │
//!      ├─► TimeStepLoader (optional LRU of opened L2 products)
//!      │
//!      └─► dataset:zarr:smos     ─► CubeDataset (one level)
//!          mldataset:zarr:smos   ─► L2Cube (levels 0-4)
//!          smosdsiter:zarr:smos  ─► DatasetIterator
//!               │
//!               ▼
//!          load_time_step(var, t)
//!               │
//!               ├─► L2Product::mapped(level)  (seqnum → row index)
//!               │
//!               └─► MappedL2Product::map_variable(var)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use smos_cube::{CubeConfig, OpenedData, SmosDataStore};
//!
//! let store = SmosDataStore::from_config(&CubeConfig::from_env())?;
//! let opened = store
//!     .open_data(
//!         "SMOS-L2C-SM",
//!         Some("dataset:zarr:smos"),
//!         serde_json::json!({"time_range": ["2022-05-10", "2022-05-12"], "res_level": 2}),
//!     )
//!     .await?;
//! if let OpenedData::Dataset(dataset) = opened {
//!     let image = dataset.load_time_step("Soil_Moisture", 0).await?;
//! }
//! ```

pub mod cache;
pub mod catalog;
pub mod config;
pub mod cube;
pub mod dgg;
pub mod dsiter;
pub mod l2product;
pub mod store;
pub mod writer;

pub use cache::{CacheStats, ProductCache};
pub use catalog::{Catalog, DatasetRecord, IndexCatalog, MemoryCatalog};
pub use config::{CubeConfig, DGG_PATH_ENV, INDEX_PATH_ENV};
pub use cube::{CubeDataset, CubeVariable, GridSubset, L2Cube, TimeStepLoader};
pub use dgg::{DggGeometry, InMemoryDgg, SeqnumGrid, TiledDgg};
pub use dsiter::{DatasetIterator, TimeStep};
pub use l2product::{L2Dataset, L2Product, L2Variable, MappedL2Product};
pub use store::{
    register_plugin, DataDescriptor, DataStoreRegistry, DataType, OpenParams, OpenedData,
    SmosDataStore, StoreParams, SMOS_DATA_STORE_ID,
};
pub use writer::{CubeWriter, WriteReport};
