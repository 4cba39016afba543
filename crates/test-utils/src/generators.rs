//! Generators for synthetic SMOS test data.
//!
//! Provides small discrete global grids and Level-2 products with known
//! content, so tests can check mapped values exactly.

use std::io::Write;
use std::path::Path;

/// Largest valid DGG sequence number.
pub const MAX_SEQNUM: u32 = 2_621_442;

/// Fill value written for float variables.
pub const FLOAT_FILL: f32 = -999.0;

/// Fill value written for `Chi_2`.
pub const CHI_2_FILL: u8 = 255;

/// Create a row-major seqnum grid where pixel `(row, col)` has seqnum
/// `row * width + col + 1`, wrapping at [`MAX_SEQNUM`].
pub fn seqnum_grid(width: usize, height: usize) -> Vec<u32> {
    (0..width * height)
        .map(|i| (i as u32 % MAX_SEQNUM) + 1)
        .collect()
}

/// Write a seqnum grid as zipped big-endian tiles `<root>/<level_dir>/<x>-<y>.raw.zip`.
///
/// Edge tiles hold only the pixels inside the grid.
pub fn write_dgg_tiles(
    root: &Path,
    level_dir: usize,
    grid: &[u32],
    width: usize,
    height: usize,
    tile_width: usize,
    tile_height: usize,
) -> std::io::Result<()> {
    let dir = root.join(level_dir.to_string());
    std::fs::create_dir_all(&dir)?;

    for ty in 0..height.div_ceil(tile_height) {
        for tx in 0..width.div_ceil(tile_width) {
            let x0 = tx * tile_width;
            let y0 = ty * tile_height;
            let x1 = (x0 + tile_width).min(width);
            let y1 = (y0 + tile_height).min(height);

            let mut raw = Vec::with_capacity((x1 - x0) * (y1 - y0) * 4);
            for row in y0..y1 {
                for col in x0..x1 {
                    raw.extend_from_slice(&grid[row * width + col].to_be_bytes());
                }
            }

            let file = std::fs::File::create(dir.join(format!("{}-{}.raw.zip", tx, ty)))?;
            let mut zip = zip::ZipWriter::new(file);
            zip.start_file(
                format!("{}-{}.raw", tx, ty),
                zip::write::SimpleFileOptions::default(),
            )
            .map_err(std::io::Error::other)?;
            zip.write_all(&raw)?;
            zip.finish().map_err(std::io::Error::other)?;
        }
    }
    Ok(())
}

/// Content of a synthetic Level-2 product.
#[derive(Debug, Clone)]
pub struct L2Fixture {
    pub grid_point_ids: Vec<u32>,
    /// Float variables with one value per grid point
    pub float_vars: Vec<(String, Vec<f32>)>,
    /// Whether to add a `Chi_2` byte variable
    pub with_chi_2: bool,
    pub global_attrs: Vec<(String, String)>,
}

impl L2Fixture {
    /// A soil moisture product with the given grid point ids and values.
    pub fn soil_moisture(grid_point_ids: Vec<u32>, values: Vec<f32>) -> Self {
        Self {
            grid_point_ids,
            float_vars: vec![("Soil_Moisture".to_string(), values)],
            with_chi_2: true,
            global_attrs: vec![(
                "Product_Name".to_string(),
                "SM_OPER_MIR_SMUDP2_TEST".to_string(),
            )],
        }
    }

    /// An ocean salinity product with the given grid point ids and values.
    pub fn ocean_salinity(grid_point_ids: Vec<u32>, values: Vec<f32>) -> Self {
        Self {
            grid_point_ids,
            float_vars: vec![("SSS_corr".to_string(), values)],
            with_chi_2: false,
            global_attrs: vec![(
                "Product_Name".to_string(),
                "SM_OPER_MIR_OSUDP2_TEST".to_string(),
            )],
        }
    }
}

/// Write a NetCDF-4 file shaped like a SMOS L2 user data product.
///
/// Float variables are chunked and compressed with a `_FillValue` of
/// [`FLOAT_FILL`]; `Chi_2` holds `i % 255`.
pub fn write_l2_product(path: &Path, fixture: &L2Fixture) -> Result<(), netcdf::Error> {
    let n = fixture.grid_point_ids.len();
    let chunk = n.clamp(1, 1024);

    let mut file = netcdf::create(path)?;
    for (name, value) in &fixture.global_attrs {
        file.add_attribute(name, value.as_str())?;
    }
    file.add_dimension("n_grid_points", n)?;

    {
        let mut var = file.add_variable::<u32>("Grid_Point_ID", &["n_grid_points"])?;
        var.put_values(&fixture.grid_point_ids, ..)?;
    }
    for (name, values) in &fixture.float_vars {
        let mut var = file.add_variable::<f32>(name, &["n_grid_points"])?;
        var.set_chunking(&[chunk])?;
        var.set_compression(4, true)?;
        var.set_fill_value(FLOAT_FILL)?;
        var.put_attribute("units", "1")?;
        var.put_values(values, ..)?;
    }
    if fixture.with_chi_2 {
        let mut var = file.add_variable::<u8>("Chi_2", &["n_grid_points"])?;
        var.set_fill_value(CHI_2_FILL)?;
        let values: Vec<u8> = (0..n).map(|i| (i % 255) as u8).collect();
        var.put_values(&values, ..)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seqnum_grid() {
        let grid = seqnum_grid(4, 2);
        assert_eq!(grid, vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_write_dgg_tiles() {
        let dir = tempfile::tempdir().unwrap();
        let grid = seqnum_grid(5, 3);
        write_dgg_tiles(dir.path(), 1, &grid, 5, 3, 2, 2).unwrap();
        assert!(dir.path().join("1/0-0.raw.zip").exists());
        assert!(dir.path().join("1/2-1.raw.zip").exists());
        assert!(!dir.path().join("1/3-0.raw.zip").exists());
    }

    #[test]
    fn test_write_l2_product() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("product.nc");
        let fixture = L2Fixture::soil_moisture(vec![1, 2, 3], vec![0.1, 0.2, 0.3]);
        write_l2_product(&path, &fixture).unwrap();

        let file = netcdf::open(&path).unwrap();
        assert!(file.variable("Grid_Point_ID").is_some());
        assert!(file.variable("Soil_Moisture").is_some());
        assert!(file.variable("Chi_2").is_some());
    }
}
