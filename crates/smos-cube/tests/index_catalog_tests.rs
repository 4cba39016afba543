//! Reading L2 products through a NetCDF Kerchunk index.

mod common;

use std::path::Path;
use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;

use nckc_index::{NcKcIndex, SyncOptions};
use netcdf_refs::{ArrayData, FillValue};
use smos_common::{ProductType, TimeRange};
use smos_cube::{Catalog, IndexCatalog, OpenedData, SmosDataStore};
use test_utils::{products, write_l2_product, L2Fixture};

use common::{dgg, image};

const DAY_1: (&str, &str) = ("20230401120000", "20230401125000");
const OVERNIGHT: (&str, &str) = ("20230401233000", "20230402002000");
const DAY_2: (&str, &str) = ("20230402060000", "20230402065000");
const SALINITY: (&str, &str) = ("20230401130000", "20230401135000");

fn write_product(root: &Path, key: &str, fixture: &L2Fixture) {
    let path = root.join(key);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    write_l2_product(&path, fixture).unwrap();
}

/// Index a source archive of three soil moisture products and one salinity product.
async fn build_catalog(source: &Path, index_dir: &Path) -> IndexCatalog {
    write_product(
        source,
        &products::sm_product_key(DAY_1.0, DAY_1.1),
        &L2Fixture::soil_moisture(vec![1, 10, 11, 32], vec![0.1, 0.2, 0.3, 0.4]),
    );
    write_product(
        source,
        &products::sm_product_key(OVERNIGHT.0, OVERNIGHT.1),
        &L2Fixture::soil_moisture(vec![5, 6], vec![0.5, 0.6]),
    );
    write_product(
        source,
        &products::sm_product_key(DAY_2.0, DAY_2.1),
        &L2Fixture::soil_moisture(vec![7], vec![0.7]),
    );
    write_product(
        source,
        &products::os_product_key(SALINITY.0, SALINITY.1),
        &L2Fixture::ocean_salinity(vec![1, 2], vec![35.0, 36.0]),
    );

    let index_path = index_dir.join("index");
    let index = NcKcIndex::create(&index_path, Some(source.to_str().unwrap()), None, None, false)
        .unwrap();
    let report = index.sync(&SyncOptions::default()).await.unwrap();
    assert_eq!(report.num_indexed, 4);
    index.close().unwrap();
    drop(index);

    IndexCatalog::open(Some(&index_path), 2).unwrap()
}

fn range(start: &str, end: &str) -> TimeRange {
    TimeRange::normalize(Some(start), Some(end)).unwrap()
}

#[tokio::test]
async fn test_find_datasets() {
    let source = TempDir::new().unwrap();
    let index_dir = TempDir::new().unwrap();
    let catalog = build_catalog(source.path(), index_dir.path()).await;

    let records = catalog
        .find_datasets(ProductType::SoilMoisture, &range("2023-04-01", "2023-04-02"))
        .await
        .unwrap();
    assert_eq!(records.len(), 3);
    assert!(records.windows(2).all(|w| w[0].start <= w[1].start));
    assert_eq!(records[0].path, products::sm_product_key(DAY_1.0, DAY_1.1));

    // The overnight product is filed under the day it starts
    let records = catalog
        .find_datasets(ProductType::SoilMoisture, &range("2023-04-02", "2023-04-02"))
        .await
        .unwrap();
    let paths: Vec<&str> = records.iter().map(|r| r.path.as_str()).collect();
    assert_eq!(
        paths,
        vec![
            products::sm_product_key(OVERNIGHT.0, OVERNIGHT.1),
            products::sm_product_key(DAY_2.0, DAY_2.1),
        ]
    );

    let records = catalog
        .find_datasets(ProductType::OceanSalinity, &range("2023-04-01", "2023-04-01"))
        .await
        .unwrap();
    assert_eq!(records.len(), 1);

    let records = catalog
        .find_datasets(ProductType::SoilMoisture, &range("2023-04-05", "2023-04-06"))
        .await
        .unwrap();
    assert!(records.is_empty());
}

#[tokio::test]
async fn test_open_dataset() {
    let source = TempDir::new().unwrap();
    let index_dir = TempDir::new().unwrap();
    let catalog = build_catalog(source.path(), index_dir.path()).await;

    let path = products::sm_product_key(DAY_1.0, DAY_1.1);
    let dataset = catalog.open_dataset(&path).await.unwrap();
    assert_eq!(
        dataset.variable("Grid_Point_ID").unwrap().data,
        ArrayData::U32(vec![1, 10, 11, 32])
    );
    let sm = dataset.variable("Soil_Moisture").unwrap();
    assert_eq!(sm.data, ArrayData::F32(vec![0.1, 0.2, 0.3, 0.4]));
    assert_eq!(sm.fill_value, Some(FillValue::Float(-999.0)));
    assert_eq!(sm.attrs["units"], "1");
    assert_eq!(sm.dims, vec!["n_grid_points"]);
    assert_eq!(
        dataset.variable("Chi_2").unwrap().data,
        ArrayData::U8(vec![0, 1, 2, 3])
    );
    assert_eq!(dataset.attrs["Product_Name"], "SM_OPER_MIR_SMUDP2_TEST");

    let attrs = catalog.dataset_attrs(&path).await.unwrap();
    assert_eq!(attrs, dataset.attrs);

    assert!(catalog.open_dataset("SMOS/nope.nc").await.is_err());
}

#[tokio::test]
async fn test_store_over_index() {
    let source = TempDir::new().unwrap();
    let index_dir = TempDir::new().unwrap();
    let catalog = build_catalog(source.path(), index_dir.path()).await;
    let store = SmosDataStore::new(Arc::new(catalog), dgg());

    let OpenedData::Dataset(dataset) = store
        .open_data(
            "SMOS-L2C-SM",
            None,
            json!({"time_range": ["2023-04-01T00:00:00Z", "2023-04-01T18:00:00Z"]}),
        )
        .await
        .unwrap()
    else {
        panic!("expected a dataset");
    };
    assert_eq!(dataset.shape()[0], 1);
    let sm = dataset.load_time_step("Soil_Moisture", 0).await.unwrap();
    assert_eq!(
        sm,
        ArrayData::F32(image(-999.0, 32, &[(0, 0.1), (9, 0.2), (10, 0.3), (31, 0.4)]))
    );

    let OpenedData::Iterator(mut iter) = store
        .open_data(
            "SMOS-L2C-OS",
            Some("smosdsiter:zarr:smos"),
            json!({"time_range": ["2023-04-01", null]}),
        )
        .await
        .unwrap()
    else {
        panic!("expected an iterator");
    };
    assert_eq!(iter.len(), 1);
    let step = iter.next_time_step().await.unwrap().unwrap();
    assert_eq!(step.var_names(), vec!["SSS_corr"]);
    assert_eq!(
        step.variable("SSS_corr").unwrap(),
        &ArrayData::F32(image(-999.0, 32, &[(0, 35.0), (1, 36.0)]))
    );
}
