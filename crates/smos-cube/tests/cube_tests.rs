//! Opening cubes through the data store.

mod common;

use std::sync::Arc;

use futures::StreamExt;
use serde_json::json;

use netcdf_refs::ArrayData;
use smos_common::SmosError;
use smos_cube::{DataType, OpenedData, SmosDataStore};

use common::{dgg, image, mixed_dtype_catalog, store, HEIGHT, NUM_LEVELS, WIDTH};

const TWO_DAYS: &str = r#"{"time_range": ["2023-04-01", "2023-04-02"]}"#;

fn params(extra: serde_json::Value) -> serde_json::Value {
    let mut params: serde_json::Value = serde_json::from_str(TWO_DAYS).unwrap();
    if let (Some(params), Some(extra)) = (params.as_object_mut(), extra.as_object()) {
        params.extend(extra.clone());
    }
    params
}

// ============================================================================
// dataset:zarr:smos
// ============================================================================

#[tokio::test]
async fn test_open_dataset() {
    let store = store();
    let opened = store
        .open_data("SMOS-L2C-SM", None, params(json!({})))
        .await
        .unwrap();
    assert_eq!(opened.data_type(), DataType::Dataset);
    let OpenedData::Dataset(dataset) = opened else {
        panic!("expected a dataset");
    };

    assert_eq!(dataset.shape(), [2, HEIGHT, WIDTH]);
    assert_eq!(dataset.chunks(), [1, HEIGHT, WIDTH]);
    assert_eq!(dataset.var_names(), vec!["Soil_Moisture", "Chi_2"]);
    assert_eq!(dataset.lon()[0], -157.5);
    assert_eq!(dataset.lat()[0], 67.5);
    assert_eq!(
        dataset.time()[0].to_rfc3339(),
        "2023-04-01T00:25:00+00:00"
    );
    assert_eq!(
        dataset.time_bnds()[1][1].to_rfc3339(),
        "2023-04-02T12:50:00+00:00"
    );
    assert_eq!(dataset.attrs()["title"], "SMOS Level-2C Soil Moisture");

    let sm = dataset.load_time_step("Soil_Moisture", 0).await.unwrap();
    assert_eq!(
        sm,
        ArrayData::F32(image(-999.0, 32, &[(0, 0.1), (9, 0.2), (10, 0.3), (31, 0.4)]))
    );

    let sm = dataset.load_time_step("Soil_Moisture", 1).await.unwrap();
    assert_eq!(sm, ArrayData::F32(image(-999.0, 32, &[(1, 0.5), (2, 0.6)])));
}

#[tokio::test]
async fn test_variable_missing_in_later_product() {
    let store = store();
    let OpenedData::Dataset(dataset) = store
        .open_data("SMOS-L2C-SM", Some("dataset:zarr:smos"), params(json!({})))
        .await
        .unwrap()
    else {
        panic!("expected a dataset");
    };

    let chi_2 = dataset.load_time_step("Chi_2", 0).await.unwrap();
    let ArrayData::U8(values) = &chi_2 else {
        panic!("expected u8 data");
    };
    assert_eq!(values[0], 10);
    assert_eq!(values[9], 20);
    assert_eq!(values[1], 255);

    // The second product has no Chi_2
    assert_eq!(
        dataset.load_time_step("Chi_2", 1).await.unwrap(),
        ArrayData::U8(vec![255; 32])
    );
}

#[tokio::test]
async fn test_later_product_with_other_dtype() {
    let store = SmosDataStore::new(Arc::new(mixed_dtype_catalog()), dgg());
    let OpenedData::Dataset(dataset) = store
        .open_data("SMOS-L2C-SM", None, params(json!({})))
        .await
        .unwrap()
    else {
        panic!("expected a dataset");
    };
    assert_eq!(dataset.variable("Soil_Moisture").unwrap().dtype.to_string(), "<f4");

    let sm = dataset.load_time_step("Soil_Moisture", 1).await.unwrap();
    assert_eq!(sm, ArrayData::F32(image(-999.0, 32, &[(1, 0.5)])));

    let images = dataset.load_images(1).await.unwrap();
    assert_eq!(images.len(), 2);
    assert_eq!(images[0], sm);
    assert_eq!(images[1], ArrayData::U8(vec![255; 32]));
}

#[tokio::test]
async fn test_open_dataset_res_level() {
    let store = store();
    let OpenedData::Dataset(dataset) = store
        .open_data("SMOS-L2C-SM", None, params(json!({"res_level": 1})))
        .await
        .unwrap()
    else {
        panic!("expected a dataset");
    };
    assert_eq!(dataset.level(), 1);
    assert_eq!(dataset.shape(), [2, HEIGHT / 2, WIDTH / 2]);
    assert_eq!(dataset.lon(), &[-135.0, -45.0, 45.0, 135.0]);

    // Level 1 keeps seqnums 1, 3, 5, 7, 17, 19, 21, 23
    let sm = dataset.load_time_step("Soil_Moisture", 1).await.unwrap();
    assert_eq!(sm, ArrayData::F32(image(-999.0, 8, &[(1, 0.6)])));
}

#[tokio::test]
async fn test_open_dataset_bbox() {
    let store = store();
    let OpenedData::Dataset(dataset) = store
        .open_data(
            "SMOS-L2C-SM",
            None,
            params(json!({"bbox": [-100.0, 0.0, 30.0, 70.0]})),
        )
        .await
        .unwrap()
    else {
        panic!("expected a dataset");
    };
    assert_eq!(dataset.shape(), [2, 2, 3]);
    assert_eq!(dataset.lon(), &[-67.5, -22.5, 22.5]);
    assert_eq!(dataset.lat(), &[67.5, 22.5]);

    let sm = dataset.load_time_step("Soil_Moisture", 0).await.unwrap();
    assert_eq!(sm, ArrayData::F32(image(-999.0, 6, &[(3, 0.3)])));
}

#[tokio::test]
async fn test_open_dataset_variable_names() {
    let store = store();
    let OpenedData::Dataset(dataset) = store
        .open_data(
            "SMOS-L2C-SM",
            None,
            params(json!({"variable_names": ["Chi_2"]})),
        )
        .await
        .unwrap()
    else {
        panic!("expected a dataset");
    };
    assert_eq!(dataset.var_names(), vec!["Chi_2"]);
    assert!(dataset.load_time_step("Soil_Moisture", 0).await.is_err());
}

#[tokio::test]
async fn test_product_cache() {
    let store = store();
    let OpenedData::Dataset(dataset) = store
        .open_data(
            "SMOS-L2C-SM",
            None,
            params(json!({"l2_product_cache_size": 2})),
        )
        .await
        .unwrap()
    else {
        panic!("expected a dataset");
    };
    // Opening the cube already loaded time step 0
    dataset.load_time_step("Soil_Moisture", 0).await.unwrap();
    dataset.load_time_step("Chi_2", 0).await.unwrap();
    let stats = dataset.loader().cache_stats();
    assert_eq!(stats.hits, 2);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.entries, 1);
}

// ============================================================================
// mldataset:zarr:smos
// ============================================================================

#[tokio::test]
async fn test_open_multi_level() {
    let store = store();
    let OpenedData::MultiLevel(cube) = store
        .open_data("SMOS-L2C-SM", Some("mldataset:zarr:smos"), params(json!({})))
        .await
        .unwrap()
    else {
        panic!("expected a multi-level dataset");
    };
    assert_eq!(cube.num_levels(), NUM_LEVELS);
    assert_eq!(cube.level(0).unwrap().shape(), [2, HEIGHT, WIDTH]);
    assert_eq!(cube.level(1).unwrap().shape(), [2, HEIGHT / 2, WIDTH / 2]);
    assert!(cube.level(NUM_LEVELS).is_err());
}

// ============================================================================
// smosdsiter:zarr:smos
// ============================================================================

#[tokio::test]
async fn test_dataset_iterator() {
    let store = store();
    let OpenedData::Iterator(mut iter) = store
        .open_data("SMOS-L2C-SM", Some("smosdsiter:zarr:smos"), params(json!({})))
        .await
        .unwrap()
    else {
        panic!("expected an iterator");
    };
    assert_eq!(iter.len(), 2);
    assert_eq!(iter.current_index(), 0);

    let first = iter.next_time_step().await.unwrap().unwrap();
    assert_eq!(iter.current_index(), 1);
    assert_eq!(first.var_names(), vec!["Soil_Moisture", "Chi_2"]);
    assert_eq!(first.shape(), (HEIGHT, WIDTH));
    assert_eq!(first.attrs["Product_Name"], "SM_TEST");
    // 2023-04-01T00:25:00 is 4838 days and 25 minutes after 2010-01-01
    assert_eq!(first.time_value(), (4838 * 86_400 + 25 * 60) * 1000);

    let second = iter.next_time_step().await.unwrap().unwrap();
    assert_eq!(second.var_names(), vec!["Soil_Moisture"]);
    assert!(iter.next_time_step().await.is_none());
    assert_eq!(iter.current_index(), 2);
}

#[tokio::test]
async fn test_dataset_iterator_stream() {
    let store = store();
    let OpenedData::Iterator(iter) = store
        .open_data("SMOS-L2C-SM", Some("smosdsiter:zarr:smos"), params(json!({})))
        .await
        .unwrap()
    else {
        panic!("expected an iterator");
    };
    let steps: Vec<_> = iter.into_stream().collect().await;
    assert_eq!(steps.len(), 2);
    assert!(steps.iter().all(|s| s.is_ok()));
}

// ============================================================================
// Errors
// ============================================================================

#[tokio::test]
async fn test_no_products_found() {
    let store = store();
    let err = store
        .open_data(
            "SMOS-L2C-SM",
            None,
            json!({"time_range": ["2023-05-01", "2023-05-02"]}),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SmosError::EmptyDataset(_)));
    let message = err.to_string();
    assert!(message.starts_with("No SMOS datasets of type 'MIR_SMUDP2' found for time range"));
    assert!(message.ends_with("and bbox None"));

    // No ocean salinity products at all
    let err = store
        .open_data("SMOS-L2C-OS", None, params(json!({})))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("MIR_OSUDP2"));
}

#[tokio::test]
async fn test_invalid_open_requests() {
    let store = store();
    assert!(matches!(
        store.open_data("SMOS-L2C-XX", None, params(json!({}))).await,
        Err(SmosError::UnknownDataId(_))
    ));
    assert!(matches!(
        store
            .open_data("SMOS-L2C-SM", Some("dataset:netcdf:smos"), params(json!({})))
            .await,
        Err(SmosError::InvalidOpenerId(_))
    ));
    assert!(matches!(
        store
            .open_data("SMOS-L2C-SM", None, params(json!({"res_level": 5})))
            .await,
        Err(SmosError::InvalidParameter { .. })
    ));
    assert!(matches!(
        store
            .open_data("SMOS-L2C-SM", None, params(json!({"bbox": [10, 10, 5, 5]})))
            .await,
        Err(SmosError::InvalidBbox(_))
    ));
    assert!(matches!(
        store
            .open_data("SMOS-L2C-SM", None, json!({"time_range": ["2023-04-02", "2023-04-01"]}))
            .await,
        Err(SmosError::InvalidTime(_))
    ));
    assert!(matches!(
        store.open_data("SMOS-L2C-SM", None, json!({})).await,
        Err(SmosError::MissingParameter(_))
    ));
}

// ============================================================================
// Descriptions
// ============================================================================

#[test]
fn test_describe_data() {
    let store = store();
    let descriptor = store.describe_data("SMOS-L2C-SM", Some("dataset")).unwrap();
    assert_eq!(descriptor.data_type, DataType::Dataset);
    assert_eq!(descriptor.bbox, [-180.0, -90.0, 180.0, 90.0]);
    assert_eq!(descriptor.spatial_res, 45.0);
    assert_eq!(descriptor.time_range, ("2010-01-01".to_string(), None));
    assert_eq!(descriptor.num_levels, None);
    assert!(descriptor.data_vars.iter().any(|v| v.name == "Soil_Moisture"));

    let descriptor = store.describe_data("SMOS-L2C-OS", Some("mldataset")).unwrap();
    assert_eq!(descriptor.num_levels, Some(NUM_LEVELS));
    let value = serde_json::to_value(&descriptor).unwrap();
    assert_eq!(value["data_type"], "mldataset");

    assert!(store.describe_data("SMOS-L2C-SM", Some("cube")).is_err());
    assert!(store.describe_data("SMOS", None).is_err());
}

#[test]
fn test_describe_data_defaults_to_multi_level() {
    let store = store();
    let descriptor = store.describe_data("SMOS-L2C-SM", None).unwrap();
    assert_eq!(descriptor.data_type, DataType::MlDataset);
    assert_eq!(descriptor.num_levels, Some(NUM_LEVELS));
    assert_eq!(descriptor.spatial_res, 45.0);
    assert!(store.describe_data("SMOS", None).is_err());
}
