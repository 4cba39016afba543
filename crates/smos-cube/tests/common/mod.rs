//! Shared fixtures for the smos-cube integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use netcdf_refs::{ArrayData, FillValue};
use smos_common::{ProductType, SmosResult, TimeRange};
use smos_cube::{
    Catalog, DatasetRecord, InMemoryDgg, L2Dataset, L2Variable, MemoryCatalog, SeqnumGrid,
    SmosDataStore,
};
use test_utils::products::sm_product_key;
use test_utils::seqnum_grid;

/// Grid width: 8 pixels of 45 degrees.
pub const WIDTH: usize = 8;

/// Grid height: 4 pixels of 45 degrees.
pub const HEIGHT: usize = 4;

pub const NUM_LEVELS: usize = 2;

/// First product, 2023-04-01 00:00:00 to 00:50:00.
pub const FIRST: (&str, &str) = ("20230401000000", "20230401005000");

/// Second product, 2023-04-02 12:00:00 to 12:50:00.
pub const SECOND: (&str, &str) = ("20230402120000", "20230402125000");

/// A grid whose pixel `i` carries seqnum `i + 1`.
pub fn dgg() -> Arc<dyn SeqnumGrid> {
    Arc::new(InMemoryDgg::new(seqnum_grid(WIDTH, HEIGHT), WIDTH, HEIGHT, NUM_LEVELS).unwrap())
}

fn attrs(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn variable(name: &str, data: ArrayData, fill_value: Option<FillValue>) -> L2Variable {
    L2Variable {
        name: name.to_string(),
        dims: vec!["n_grid_points".to_string()],
        data,
        attrs: attrs(json!({"units": "1"})),
        fill_value,
    }
}

/// A soil moisture product; `Chi_2` holds `10 * (i + 1)` when present.
pub fn sm_dataset(grid_point_ids: Vec<u32>, values: Vec<f32>, with_chi_2: bool) -> L2Dataset {
    let n = grid_point_ids.len();
    let mut variables = vec![
        variable(GRID_POINT_ID, ArrayData::U32(grid_point_ids), None),
        variable(
            "Soil_Moisture",
            ArrayData::F32(values),
            Some(FillValue::Float(-999.0)),
        ),
    ];
    if with_chi_2 {
        variables.push(variable(
            "Chi_2",
            ArrayData::U8((0..n).map(|i| 10 * (i as u8 + 1)).collect()),
            Some(FillValue::UInt(255)),
        ));
    }
    L2Dataset {
        attrs: attrs(json!({"Product_Name": "SM_TEST"})),
        variables,
    }
}

const GRID_POINT_ID: &str = "Grid_Point_ID";

/// Two soil moisture products; only the first has `Chi_2`.
pub fn memory_catalog() -> MemoryCatalog {
    let mut catalog = MemoryCatalog::new();
    catalog
        .insert(
            &sm_product_key(FIRST.0, FIRST.1),
            sm_dataset(vec![1, 10, 11, 32], vec![0.1, 0.2, 0.3, 0.4], true),
        )
        .unwrap();
    catalog
        .insert(
            &sm_product_key(SECOND.0, SECOND.1),
            sm_dataset(vec![2, 3], vec![0.5, 0.6], false),
        )
        .unwrap();
    catalog
}

/// Like [`memory_catalog`], but the second product stores
/// `Soil_Moisture` as f64 with fill value -9999.
pub fn mixed_dtype_catalog() -> MemoryCatalog {
    let mut second = sm_dataset(vec![2, 3], vec![0.5, 0.6], false);
    second.variables[1].data = ArrayData::F64(vec![0.5, -9999.0]);
    second.variables[1].fill_value = Some(FillValue::Float(-9999.0));

    let mut catalog = MemoryCatalog::new();
    catalog
        .insert(
            &sm_product_key(FIRST.0, FIRST.1),
            sm_dataset(vec![1, 10, 11, 32], vec![0.1, 0.2, 0.3, 0.4], true),
        )
        .unwrap();
    catalog
        .insert(&sm_product_key(SECOND.0, SECOND.1), second)
        .unwrap();
    catalog
}

/// Counts the products opened through it.
pub struct CountingCatalog {
    inner: MemoryCatalog,
    opens: AtomicUsize,
}

impl CountingCatalog {
    pub fn new(inner: MemoryCatalog) -> Self {
        Self {
            inner,
            opens: AtomicUsize::new(0),
        }
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.opens.store(0, Ordering::SeqCst);
    }
}

#[async_trait]
impl Catalog for CountingCatalog {
    async fn find_datasets(
        &self,
        product_type: ProductType,
        time_range: &TimeRange,
    ) -> SmosResult<Vec<DatasetRecord>> {
        self.inner.find_datasets(product_type, time_range).await
    }

    async fn open_dataset(&self, path: &str) -> SmosResult<L2Dataset> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.inner.open_dataset(path).await
    }

    async fn dataset_attrs(&self, path: &str) -> SmosResult<Map<String, Value>> {
        self.inner.dataset_attrs(path).await
    }
}

pub fn store() -> SmosDataStore {
    SmosDataStore::new(Arc::new(memory_catalog()), dgg())
}

/// Image with `fill` everywhere except at `(index, value)` pairs.
pub fn image(fill: f32, len: usize, values: &[(usize, f32)]) -> Vec<f32> {
    let mut image = vec![fill; len];
    for &(i, v) in values {
        image[i] = v;
    }
    image
}
