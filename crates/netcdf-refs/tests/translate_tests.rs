//! Tests translating real NetCDF-4 files and reading data back through the references.

use std::collections::HashMap;
use std::path::Path;

use bytes::Bytes;
use netcdf_refs::{
    decode_variable, translate_bytes, translate_file, ArrayData, CodecConfig, FillValue, RefValue,
    ReferenceSet, TranslateOptions,
};
use tempfile::TempDir;

const N: usize = 10;

fn soil_moisture() -> Vec<f32> {
    (0..N).map(|i| i as f32 * 0.05).collect()
}

fn write_l2_like_file(path: &Path) {
    let mut file = netcdf::create(path).unwrap();
    file.add_attribute("Product_Name", "SM_OPER_MIR_SMUDP2_TEST").unwrap();
    file.add_dimension("n_grid_points", N).unwrap();

    {
        let mut var = file
            .add_variable::<f32>("Soil_Moisture", &["n_grid_points"])
            .unwrap();
        var.set_chunking(&[4]).unwrap();
        var.set_compression(4, true).unwrap();
        var.set_fill_value(-999.0f32).unwrap();
        var.put_attribute("units", "m3 m-3").unwrap();
        var.put_values(&soil_moisture(), ..).unwrap();
    }
    {
        let mut var = file
            .add_variable::<u32>("Grid_Point_ID", &["n_grid_points"])
            .unwrap();
        let ids: Vec<u32> = (1..=N as u32).collect();
        var.put_values(&ids, ..).unwrap();
    }
}

/// Fetch every referenced chunk from the local file.
fn read_variable(refs: &ReferenceSet, name: &str, path: &Path) -> ArrayData {
    let content = std::fs::read(path).unwrap();
    let meta = refs.array_meta(name).unwrap();
    let mut raw = HashMap::new();
    for (index, value) in refs.chunk_refs(name).unwrap() {
        let bytes = match value {
            RefValue::Range(_, offset, size) => {
                content[*offset as usize..(*offset + *size) as usize].to_vec()
            }
            inline => inline.inline_content().unwrap().unwrap(),
        };
        raw.insert(index, Bytes::from(bytes));
    }
    decode_variable(&meta, raw).unwrap()
}

// ============================================================================
// Metadata tests
// ============================================================================

#[test]
fn test_translate_metadata() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("product.nc");
    write_l2_like_file(&path);

    let refs = translate_file(&path, "s3://bucket/product.nc", &TranslateOptions::default()).unwrap();

    assert_eq!(refs.version, 1);
    assert_eq!(
        refs.global_attrs().unwrap()["Product_Name"],
        "SM_OPER_MIR_SMUDP2_TEST"
    );
    assert_eq!(refs.variable_names(), vec!["Grid_Point_ID", "Soil_Moisture"]);

    let meta = refs.array_meta("Soil_Moisture").unwrap();
    assert_eq!(meta.shape, vec![N]);
    assert_eq!(meta.chunks, vec![4]);
    assert_eq!(meta.dtype, "<f4");
    assert_eq!(meta.fill_value, Some(FillValue::Float(-999.0)));
    assert!(matches!(meta.compressor, Some(CodecConfig::Zlib { level: 4 })));
    assert_eq!(
        meta.filters,
        Some(vec![CodecConfig::Shuffle { elementsize: 4 }])
    );
    assert_eq!(refs.variable_dims("Soil_Moisture").unwrap(), vec!["n_grid_points"]);
    assert_eq!(refs.variable_attrs("Soil_Moisture").unwrap()["units"], "m3 m-3");
}

#[test]
fn test_small_chunks_are_inlined() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("product.nc");
    write_l2_like_file(&path);

    let refs = translate_file(&path, "product.nc", &TranslateOptions::default()).unwrap();
    for (_, value) in refs.chunk_refs("Grid_Point_ID").unwrap() {
        assert!(matches!(value, RefValue::Inline(s) if s.starts_with("base64:")));
    }

    let options = TranslateOptions { inline_threshold: 0 };
    let refs = translate_file(&path, "product.nc", &options).unwrap();
    for (_, value) in refs.chunk_refs("Grid_Point_ID").unwrap() {
        assert!(matches!(value, RefValue::Range(url, _, 40) if url == "product.nc"));
    }
}

// ============================================================================
// Data round trip through references
// ============================================================================

#[test]
fn test_read_back_through_references() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("product.nc");
    write_l2_like_file(&path);

    let options = TranslateOptions { inline_threshold: 0 };
    let refs = translate_file(&path, "product.nc", &options).unwrap();

    assert_eq!(
        read_variable(&refs, "Soil_Moisture", &path),
        ArrayData::F32(soil_moisture())
    );
    assert_eq!(
        read_variable(&refs, "Grid_Point_ID", &path),
        ArrayData::U32((1..=N as u32).collect())
    );
}

#[test]
fn test_translate_bytes_matches_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("product.nc");
    write_l2_like_file(&path);

    let options = TranslateOptions::default();
    let from_file = translate_file(&path, "u", &options).unwrap();
    let from_bytes = translate_bytes(&std::fs::read(&path).unwrap(), "u", &options).unwrap();
    assert_eq!(from_file, from_bytes);
}

#[test]
fn test_corrupt_file_is_an_error() {
    let result = translate_bytes(b"CDF\x01 definitely not netcdf", "u", &TranslateOptions::default());
    assert!(result.is_err());
}
