//! Integration tests for creating, syncing and describing an index.

use std::path::Path;

use nckc_index::{
    FileOutcome, NcKcError, NcKcIndex, SyncOptions, INDEX_CONFIG_FILENAME,
};
use netcdf_refs::RefValue;
use storage::IndexMode;
use tempfile::TempDir;
use test_utils::{products, write_l2_product, L2Fixture};

const SM_1: (&str, &str) = ("20230401150613", "20230401155931");
const SM_2: (&str, &str) = ("20230402044210", "20230402053529");
const OS_1: (&str, &str) = ("20230401160001", "20230401165320");

/// A source archive with two soil moisture products, one salinity product
/// and one corrupt file.
fn build_source(root: &Path) -> Vec<String> {
    let keys = vec![
        products::sm_product_key(SM_1.0, SM_1.1),
        products::sm_product_key(SM_2.0, SM_2.1),
        products::os_product_key(OS_1.0, OS_1.1),
    ];
    for (i, key) in keys.iter().enumerate() {
        let path = root.join(key);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let ids: Vec<u32> = (1..=20).collect();
        let values: Vec<f32> = (0..20).map(|v| (v + i) as f32 * 0.01).collect();
        let fixture = if key.contains("OSUDP2") {
            L2Fixture::ocean_salinity(ids, values)
        } else {
            L2Fixture::soil_moisture(ids, values)
        };
        write_l2_product(&path, &fixture).unwrap();
    }
    keys
}

fn add_corrupt_file(root: &Path) -> String {
    let key = "SMOS/L2SM/MIR_SMUDP2/2023/04/03/broken.nc".to_string();
    let path = root.join(&key);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, b"\x89HDF\r\n\x1a\ntruncated").unwrap();
    key
}

fn create_index(index_path: &Path, source: &Path) -> NcKcIndex {
    NcKcIndex::create(
        index_path,
        Some(source.to_str().unwrap()),
        None,
        None,
        false,
    )
    .unwrap()
}

// ============================================================================
// Create / open
// ============================================================================

#[test]
fn test_create_writes_config() {
    let source = TempDir::new().unwrap();
    let dir = TempDir::new().unwrap();
    let index_path = dir.path().join("index");

    let index = create_index(&index_path, source.path());
    assert_eq!(index.config().protocol_name(), "file");
    drop(index);

    let config: serde_json::Value =
        serde_json::from_slice(&std::fs::read(index_path.join(INDEX_CONFIG_FILENAME)).unwrap())
            .unwrap();
    assert_eq!(config["version"], 2);
    assert_eq!(config["source_protocol"], "file");
    assert!(config["source_storage_options"].as_object().unwrap().is_empty());
}

#[test]
fn test_create_requires_source_path() {
    let dir = TempDir::new().unwrap();
    let err = NcKcIndex::create(&dir.path().join("index"), None, None, None, false).unwrap_err();
    assert!(matches!(err, NcKcError::InvalidConfig(_)));
    assert!(err.to_string().contains("Missing source_path"));
}

#[test]
fn test_create_existing_requires_replace() {
    let source = TempDir::new().unwrap();
    let dir = TempDir::new().unwrap();
    let index_path = dir.path().join("index");
    drop(create_index(&index_path, source.path()));

    let err = NcKcIndex::create(
        &index_path,
        Some(source.path().to_str().unwrap()),
        None,
        None,
        false,
    )
    .unwrap_err();
    assert!(err.to_string().contains("Index exists"));

    NcKcIndex::create(
        &index_path,
        Some(source.path().to_str().unwrap()),
        None,
        None,
        true,
    )
    .unwrap();
}

#[test]
fn test_create_with_missing_source_writes_nothing() {
    let source = TempDir::new().unwrap();
    let dir = TempDir::new().unwrap();
    let index_path = dir.path().join("index.zip");
    let missing = source.path().join("not-yet");

    let err = NcKcIndex::create(&index_path, Some(missing.to_str().unwrap()), None, None, false)
        .unwrap_err();
    assert!(err.to_string().contains("not accessible"));
    assert!(!index_path.exists());

    std::fs::create_dir(&missing).unwrap();
    let index =
        NcKcIndex::create(&index_path, Some(missing.to_str().unwrap()), None, None, false)
            .unwrap();
    assert_eq!(index.config().protocol_name(), "file");
}

#[test]
fn test_open_missing_index() {
    let dir = TempDir::new().unwrap();
    let err = NcKcIndex::open(&dir.path().join("nope")).unwrap_err();
    assert!(err.to_string().contains("Index not found"));
}

#[test]
fn test_open_substitutes_environment() {
    let source = TempDir::new().unwrap();
    let dir = TempDir::new().unwrap();
    let index_path = dir.path().join("index");
    std::fs::create_dir_all(&index_path).unwrap();

    std::env::set_var("NCKC_TEST_SOURCE_DIR", source.path());
    let config = serde_json::json!({
        "version": 2,
        "source_path": "${NCKC_TEST_SOURCE_DIR}",
        "source_protocol": "file",
        "source_storage_options": {"token": "$NCKC_TEST_UNSET_TOKEN"}
    });
    std::fs::write(
        index_path.join(INDEX_CONFIG_FILENAME),
        serde_json::to_vec_pretty(&config).unwrap(),
    )
    .unwrap();

    let index = NcKcIndex::open(&index_path).unwrap();
    assert_eq!(index.config().source_path, source.path().to_str().unwrap());
    assert_eq!(
        index.config().source_storage_options["token"],
        "$NCKC_TEST_UNSET_TOKEN"
    );
}

// ============================================================================
// Sync
// ============================================================================

#[tokio::test]
async fn test_sync_indexes_all_files() {
    let source = TempDir::new().unwrap();
    let keys = build_source(source.path());
    let dir = TempDir::new().unwrap();
    let index = create_index(&dir.path().join("index"), source.path());

    let report = index.sync(&SyncOptions::default()).await.unwrap();
    assert_eq!(report.num_indexed, 3);
    assert_eq!(report.num_skipped, 0);
    assert!(report.problems.is_empty());

    let entries = index.list_entries(None).unwrap();
    assert_eq!(entries.len(), 3);
    for key in &keys {
        assert!(entries.contains(&format!("{}.json", key)));
    }

    let refs = index.read_entry(&keys[0]).unwrap();
    assert!(refs.variable_names().contains(&"Soil_Moisture".to_string()));
    let source_root = std::fs::canonicalize(source.path()).unwrap();
    for url in refs.source_urls() {
        assert!(Path::new(&url).starts_with(&source_root));
    }
}

#[tokio::test]
async fn test_sync_skips_existing_unless_forced() {
    let source = TempDir::new().unwrap();
    build_source(source.path());
    let dir = TempDir::new().unwrap();
    let index = create_index(&dir.path().join("index"), source.path());

    index.sync(&SyncOptions::default()).await.unwrap();
    let report = index.sync(&SyncOptions::default()).await.unwrap();
    assert_eq!(report.num_indexed, 0);
    assert_eq!(report.num_skipped, 3);

    let forced = SyncOptions {
        force: true,
        ..Default::default()
    };
    let report = index.sync(&forced).await.unwrap();
    assert_eq!(report.num_indexed, 3);
    assert_eq!(report.num_skipped, 0);
}

#[tokio::test]
async fn test_sync_collects_problems_and_continues() {
    let source = TempDir::new().unwrap();
    build_source(source.path());
    let broken = add_corrupt_file(source.path());
    let dir = TempDir::new().unwrap();
    let index = create_index(&dir.path().join("index"), source.path());

    let report = index.sync(&SyncOptions::default()).await.unwrap();
    assert_eq!(report.num_indexed, 3);
    assert_eq!(report.problems.len(), 1);
    assert!(report.problems[0].starts_with(&format!("Error indexing {}", broken)));
}

#[tokio::test]
async fn test_sync_dry_run_writes_nothing() {
    let source = TempDir::new().unwrap();
    build_source(source.path());
    let dir = TempDir::new().unwrap();
    let index = create_index(&dir.path().join("index"), source.path());

    let options = SyncOptions {
        dry_run: true,
        ..Default::default()
    };
    let report = index.sync(&options).await.unwrap();
    assert_eq!(report.num_indexed, 3);
    assert!(index.list_entries(None).unwrap().is_empty());
}

#[tokio::test]
async fn test_sync_with_prefix() {
    let source = TempDir::new().unwrap();
    build_source(source.path());
    let dir = TempDir::new().unwrap();
    let index = create_index(&dir.path().join("index"), source.path());

    let options = SyncOptions {
        prefix: Some("SMOS/L2OS/".to_string()),
        ..Default::default()
    };
    let report = index.sync(&options).await.unwrap();
    assert_eq!(report.num_indexed, 1);
    assert_eq!(index.list_entries(Some("SMOS/L2SM/")).unwrap().len(), 0);
    assert_eq!(index.list_entries(Some("SMOS/L2OS/")).unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_sync_with_workers_in_blocks() {
    let source = TempDir::new().unwrap();
    build_source(source.path());
    add_corrupt_file(source.path());
    let dir = TempDir::new().unwrap();
    let index = create_index(&dir.path().join("index"), source.path());

    let blocks = index.get_nc_file_blocks(None, 2).await;
    assert_eq!(blocks.iter().map(Vec::len).collect::<Vec<_>>(), vec![2, 2]);

    let options = SyncOptions {
        num_workers: 3,
        block_size: 2,
        ..Default::default()
    };
    let report = index.sync(&options).await.unwrap();
    assert_eq!(report.num_indexed, 3);
    assert_eq!(report.problems.len(), 1);
    assert_eq!(index.list_entries(None).unwrap().len(), 3);
}

#[tokio::test]
async fn test_read_only_index_rejects_sync() {
    let source = TempDir::new().unwrap();
    build_source(source.path());
    let dir = TempDir::new().unwrap();
    let index_path = dir.path().join("index");
    drop(create_index(&index_path, source.path()));

    let index = NcKcIndex::open(&index_path).unwrap();
    assert!(index.sync(&SyncOptions::default()).await.is_err());
}

#[tokio::test]
async fn test_index_single_file() {
    let source = TempDir::new().unwrap();
    let keys = build_source(source.path());
    let dir = TempDir::new().unwrap();
    let index = create_index(&dir.path().join("index"), source.path());

    assert_eq!(index.index_nc_file(&keys[1], false, false).await, FileOutcome::Indexed);
    assert_eq!(index.index_nc_file(&keys[1], false, false).await, FileOutcome::Skipped);
}

// ============================================================================
// Zip index
// ============================================================================

#[tokio::test]
async fn test_zip_index_sync_and_read() {
    let source = TempDir::new().unwrap();
    let keys = build_source(source.path());
    let dir = TempDir::new().unwrap();
    let index_path = dir.path().join("index.zip");

    let index = create_index(&index_path, source.path());
    let report = index.sync(&SyncOptions::default()).await.unwrap();
    assert_eq!(report.num_indexed, 3);
    index.close().unwrap();
    drop(index);

    let index = NcKcIndex::open(&index_path).unwrap();
    assert_eq!(index.list_entries(None).unwrap().len(), 3);
    let refs = index.read_entry(&keys[2]).unwrap();
    let chunk_refs = refs.chunk_refs("SSS_corr").unwrap();
    assert!(!chunk_refs.is_empty());
    assert!(chunk_refs
        .iter()
        .all(|(_, v)| matches!(v, RefValue::Range(..) | RefValue::Inline(_))));

    // Appending keeps existing entries and skips them.
    let index = NcKcIndex::open_with_mode(&index_path, IndexMode::Append).unwrap();
    let report = index.sync(&SyncOptions::default()).await.unwrap();
    assert_eq!(report.num_skipped, 3);
}

// ============================================================================
// Describe
// ============================================================================

#[tokio::test]
async fn test_describe() {
    let source = TempDir::new().unwrap();
    build_source(source.path());
    let dir = TempDir::new().unwrap();
    let index_path = dir.path().join("index");

    let mut options = serde_json::Map::new();
    options.insert("key".into(), "AKIA".into());
    options.insert("secret".into(), "s3cr3t".into());
    let index = NcKcIndex::create(
        &index_path,
        Some(source.path().to_str().unwrap()),
        Some("file"),
        Some(options),
        false,
    )
    .unwrap();
    index.sync(&SyncOptions::default()).await.unwrap();

    let description = index.describe().unwrap();
    assert_eq!(description.num_entries, 3);
    assert_eq!(description.source_protocol, "file");
    assert_eq!(description.source_storage_options["key"], "AKIA");
    assert_eq!(description.source_storage_options["secret"], "*****");
    assert_eq!(
        description.entries_per_product_type,
        vec![("MIR_SMUDP2".to_string(), 2), ("MIR_OSUDP2".to_string(), 1)]
    );
}
