//! The SMOS discrete global grid (DGG) in geographic projection.
//!
//! The DGG is a raster of "seqnum" values. A pixel's seqnum identifies the
//! grid point of an L2 product that covers it; seqnum 0 means no grid point.
//!
//! On disk the grid is a tile pyramid of 7 levels, level 0 being
//! 16384 x 8064 pixels. Every tile is a Zip archive holding one raw
//! big-endian `u32` image of at most 512 x 504 pixels:
//!
//! ```text
//! <root>/<pyramid level>/<x index>-<y index>.raw.zip
//! ```
//!
//! Cubes start at pyramid level 1 (8192 x 4032 pixels) and use five levels.

use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::{debug, info, instrument, warn};

use smos_common::{BoundingBox, SmosError, SmosResult};

/// Smallest valid seqnum.
pub const MIN_SEQNUM: u32 = 1;

/// Greatest valid seqnum.
pub const MAX_SEQNUM: u32 = 2_621_442;

/// Levels of the tile pyramid.
pub const PYRAMID_NUM_LEVELS: usize = 7;

/// Width of pyramid level 0 in pixels.
pub const PYRAMID_WIDTH: usize = 16384;

/// Height of pyramid level 0 in pixels.
pub const PYRAMID_HEIGHT: usize = 8064;

/// Tile width in pixels, constant across levels.
pub const TILE_WIDTH: usize = 512;

/// Tile height in pixels, constant across levels.
pub const TILE_HEIGHT: usize = 504;

/// Pyramid level that becomes cube level 0.
pub const DEFAULT_LEVEL0: usize = 1;

/// Number of cube resolution levels.
pub const NUM_LEVELS: usize = 5;

/// Width of cube level 0 in pixels.
pub const MAX_WIDTH: usize = PYRAMID_WIDTH >> DEFAULT_LEVEL0;

/// Height of cube level 0 in pixels.
pub const MAX_HEIGHT: usize = PYRAMID_HEIGHT >> DEFAULT_LEVEL0;

/// Pixel size of cube level 0 in degrees.
pub const MIN_PIXEL_SIZE: f64 = 360.0 / MAX_WIDTH as f64;

/// Convert an L2 `Grid_Point_ID` into a DGG seqnum.
pub fn grid_point_id_to_seqnum(grid_point_id: u32) -> u32 {
    if grid_point_id < 1_000_000 {
        grid_point_id
    } else {
        grid_point_id - 737_856 * ((grid_point_id - 1) / 1_000_000) + 1
    }
}

/// Size and levels of a global geographic grid.
///
/// Level `L` has `width >> L` by `height >> L` pixels, each `2^L` times
/// the level-0 pixel size. The grid spans 360 degrees of longitude and is
/// centred on the equator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DggGeometry {
    pub width: usize,
    pub height: usize,
    pub num_levels: usize,
}

impl DggGeometry {
    /// Geometry of the SMOS cubes.
    pub const SMOS: DggGeometry = DggGeometry {
        width: MAX_WIDTH,
        height: MAX_HEIGHT,
        num_levels: NUM_LEVELS,
    };

    pub fn new(width: usize, height: usize, num_levels: usize) -> Self {
        Self {
            width,
            height,
            num_levels,
        }
    }

    fn check_level(&self, level: usize) -> SmosResult<()> {
        if level >= self.num_levels {
            return Err(SmosError::invalid_parameter(
                "res_level",
                format!("level {} out of range 0..{}", level, self.num_levels),
            ));
        }
        Ok(())
    }

    /// `(height, width)` of a level.
    pub fn shape(&self, level: usize) -> (usize, usize) {
        (self.height >> level, self.width >> level)
    }

    /// Pixel size of a level in degrees.
    pub fn pixel_size(&self, level: usize) -> f64 {
        (1usize << level) as f64 * 360.0 / self.width as f64
    }

    /// Pixel-centre longitudes of a level, west to east.
    pub fn lon(&self, level: usize) -> Vec<f64> {
        let (_, width) = self.shape(level);
        let res = self.pixel_size(level);
        (0..width)
            .map(|i| -180.0 + res / 2.0 + i as f64 * res)
            .collect()
    }

    /// Pixel-centre latitudes of a level, north to south.
    pub fn lat(&self, level: usize) -> Vec<f64> {
        let (height, _) = self.shape(level);
        let res = self.pixel_size(level);
        let top = height as f64 * res / 2.0 - res / 2.0;
        (0..height).map(|i| top - i as f64 * res).collect()
    }

    /// Northern edge of the grid in degrees.
    pub fn lat_max(&self) -> f64 {
        self.height as f64 * self.pixel_size(0) / 2.0
    }

    /// Outer bounds of the grid.
    pub fn bbox(&self) -> BoundingBox {
        let lat_max = self.lat_max();
        BoundingBox::new(-180.0, -lat_max, 180.0, lat_max)
    }
}

/// A multi-level seqnum raster.
pub trait SeqnumGrid: Send + Sync {
    fn geometry(&self) -> DggGeometry;

    fn num_levels(&self) -> usize {
        self.geometry().num_levels
    }

    /// `(height, width)` of a level.
    fn shape(&self, level: usize) -> (usize, usize) {
        self.geometry().shape(level)
    }

    /// Row-major seqnums of a level.
    fn seqnum(&self, level: usize) -> SmosResult<Arc<Vec<u32>>>;
}

/// Take every second pixel of every second row.
fn decimate(data: &[u32], width: usize, height: usize) -> Vec<u32> {
    let (out_w, out_h) = (width / 2, height / 2);
    let mut out = Vec::with_capacity(out_w * out_h);
    for row in 0..out_h {
        let start = 2 * row * width;
        out.extend((0..out_w).map(|col| data[start + 2 * col]));
    }
    out
}

// =============================================================================
// Tiled DGG
// =============================================================================

/// The DGG tile pyramid on the local filesystem.
///
/// Levels are loaded on first use and kept in memory. A level without
/// a tile directory is derived from the next finer level.
pub struct TiledDgg {
    root: PathBuf,
    level0: usize,
    geometry: DggGeometry,
    levels: Mutex<HashMap<usize, Arc<Vec<u32>>>>,
}

impl std::fmt::Debug for TiledDgg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TiledDgg")
            .field("root", &self.root)
            .field("level0", &self.level0)
            .field("geometry", &self.geometry)
            .finish()
    }
}

impl TiledDgg {
    /// Open the pyramid at `root` with pyramid level 1 as cube level 0.
    pub fn open(root: &Path) -> SmosResult<Self> {
        Self::open_with_level0(root, DEFAULT_LEVEL0)
    }

    /// Open the pyramid at `root`, using pyramid level `level0` as level 0.
    pub fn open_with_level0(root: &Path, level0: usize) -> SmosResult<Self> {
        if !root.is_dir() {
            return Err(SmosError::ConfigError(format!(
                "SMOS DGG not found: {}",
                root.display()
            )));
        }
        if level0 >= PYRAMID_NUM_LEVELS {
            return Err(SmosError::ConfigError(format!(
                "Invalid level0: {}",
                level0
            )));
        }
        let geometry = DggGeometry::new(
            PYRAMID_WIDTH >> level0,
            PYRAMID_HEIGHT >> level0,
            (PYRAMID_NUM_LEVELS - level0).min(NUM_LEVELS),
        );
        info!(root = %root.display(), level0, "Opened SMOS DGG");
        Ok(Self {
            root: root.to_path_buf(),
            level0,
            geometry,
            levels: Mutex::new(HashMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn cached(&self, level: usize) -> Option<Arc<Vec<u32>>> {
        self.levels
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&level)
            .cloned()
    }

    #[instrument(skip(self), fields(root = %self.root.display()))]
    fn load_level(&self, level: usize) -> SmosResult<Vec<u32>> {
        let pyramid_level = level + self.level0;
        let (height, width) = self.geometry.shape(level);
        let level_dir = self.root.join(pyramid_level.to_string());

        if !level_dir.is_dir() {
            if level == 0 {
                return Err(SmosError::DataReadError(format!(
                    "DGG level directory missing: {}",
                    level_dir.display()
                )));
            }
            warn!(level, "DGG level missing, decimating finer level");
            let finer = self.seqnum(level - 1)?;
            let (finer_h, finer_w) = self.geometry.shape(level - 1);
            return Ok(decimate(&finer, finer_w, finer_h));
        }

        let mut data = vec![0u32; width * height];
        for ty in 0..height.div_ceil(TILE_HEIGHT) {
            for tx in 0..width.div_ceil(TILE_WIDTH) {
                let path = level_dir.join(format!("{}-{}.raw.zip", tx, ty));
                let tile = read_tile(&path)?;

                let x0 = tx * TILE_WIDTH;
                let y0 = ty * TILE_HEIGHT;
                let tile_w = (width - x0).min(TILE_WIDTH);
                let tile_h = (height - y0).min(TILE_HEIGHT);
                // Edge tiles may be stored clipped or padded to full size.
                let stride = if tile.len() == TILE_WIDTH * TILE_HEIGHT {
                    TILE_WIDTH
                } else if tile.len() == tile_w * tile_h {
                    tile_w
                } else {
                    return Err(SmosError::DataReadError(format!(
                        "DGG tile {} has {} pixels, expected {}x{}",
                        path.display(),
                        tile.len(),
                        tile_w,
                        tile_h
                    )));
                };

                for row in 0..tile_h {
                    let dst = (y0 + row) * width + x0;
                    data[dst..dst + tile_w]
                        .copy_from_slice(&tile[row * stride..row * stride + tile_w]);
                }
            }
        }
        debug!(level, width, height, "Loaded DGG level");
        Ok(data)
    }
}

/// Read the first entry of a zipped big-endian `u32` tile.
fn read_tile(path: &Path) -> SmosResult<Vec<u32>> {
    let file = std::fs::File::open(path).map_err(|e| {
        SmosError::DataReadError(format!("Failed to open DGG tile {}: {}", path.display(), e))
    })?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| {
        SmosError::DataReadError(format!("Invalid DGG tile {}: {}", path.display(), e))
    })?;
    let mut entry = archive.by_index(0).map_err(|e| {
        SmosError::DataReadError(format!("Empty DGG tile {}: {}", path.display(), e))
    })?;
    let mut raw = Vec::with_capacity(entry.size() as usize);
    entry.read_to_end(&mut raw)?;
    if raw.len() % 4 != 0 {
        return Err(SmosError::DataReadError(format!(
            "DGG tile {} is truncated",
            path.display()
        )));
    }
    Ok(raw
        .chunks_exact(4)
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

impl SeqnumGrid for TiledDgg {
    fn geometry(&self) -> DggGeometry {
        self.geometry
    }

    fn seqnum(&self, level: usize) -> SmosResult<Arc<Vec<u32>>> {
        self.geometry.check_level(level)?;
        if let Some(data) = self.cached(level) {
            return Ok(data);
        }
        let data = Arc::new(self.load_level(level)?);
        self.levels
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(level, Arc::clone(&data));
        Ok(data)
    }
}

// =============================================================================
// In-memory DGG
// =============================================================================

/// A DGG held in memory, coarser levels derived by decimation.
#[derive(Debug, Clone)]
pub struct InMemoryDgg {
    geometry: DggGeometry,
    levels: Vec<Arc<Vec<u32>>>,
}

impl InMemoryDgg {
    /// Build from the row-major level-0 seqnums of a `width` x `height` grid.
    pub fn new(level0: Vec<u32>, width: usize, height: usize, num_levels: usize) -> SmosResult<Self> {
        if level0.len() != width * height {
            return Err(SmosError::invalid_parameter(
                "seqnum",
                format!("expected {} values, got {}", width * height, level0.len()),
            ));
        }
        if num_levels == 0 || (width >> (num_levels - 1)) == 0 || (height >> (num_levels - 1)) == 0
        {
            return Err(SmosError::invalid_parameter(
                "num_levels",
                format!("{} levels do not fit a {}x{} grid", num_levels, width, height),
            ));
        }

        let geometry = DggGeometry::new(width, height, num_levels);
        let mut levels = vec![Arc::new(level0)];
        for level in 1..num_levels {
            let (h, w) = geometry.shape(level - 1);
            let finer = &levels[level - 1];
            levels.push(Arc::new(decimate(finer, w, h)));
        }
        Ok(Self { geometry, levels })
    }
}

impl SeqnumGrid for InMemoryDgg {
    fn geometry(&self) -> DggGeometry {
        self.geometry
    }

    fn seqnum(&self, level: usize) -> SmosResult<Arc<Vec<u32>>> {
        self.geometry.check_level(level)?;
        Ok(Arc::clone(&self.levels[level]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_utils::{seqnum_grid, write_dgg_tiles};

    #[test]
    fn test_grid_point_id_to_seqnum() {
        assert_eq!(grid_point_id_to_seqnum(1), 1);
        assert_eq!(grid_point_id_to_seqnum(999_999), 999_999);
        assert_eq!(grid_point_id_to_seqnum(1_000_001), 262_146);
        assert_eq!(grid_point_id_to_seqnum(3_000_001), 786_434);
        assert_eq!(grid_point_id_to_seqnum(9_262_145), MAX_SEQNUM);
    }

    #[test]
    fn test_smos_geometry() {
        let g = DggGeometry::SMOS;
        assert_eq!(g.shape(0), (4032, 8192));
        assert_eq!(g.shape(4), (252, 512));
        assert!((g.pixel_size(0) - 0.0439453125).abs() < 1e-12);
        assert!((g.pixel_size(2) - 4.0 * 0.0439453125).abs() < 1e-12);

        let lon = g.lon(0);
        assert_eq!(lon.len(), 8192);
        assert!((lon[0] + 180.0 - MIN_PIXEL_SIZE / 2.0).abs() < 1e-9);
        assert!((lon[8191] - 180.0 + MIN_PIXEL_SIZE / 2.0).abs() < 1e-9);

        let lat = g.lat(0);
        assert!((lat[0] - (g.lat_max() - MIN_PIXEL_SIZE / 2.0)).abs() < 1e-9);
        assert!((lat[0] + lat[4031]).abs() < 1e-9);
        assert!((g.lat_max() - 88.59375).abs() < 1e-9);
    }

    #[test]
    fn test_in_memory_levels() {
        let dgg = InMemoryDgg::new(seqnum_grid(8, 4), 8, 4, 3).unwrap();
        assert_eq!(dgg.shape(1), (2, 4));
        assert_eq!(*dgg.seqnum(1).unwrap(), vec![1, 3, 5, 7, 17, 19, 21, 23]);
        assert_eq!(*dgg.seqnum(2).unwrap(), vec![1, 5]);
        assert!(dgg.seqnum(3).is_err());
        assert!(InMemoryDgg::new(vec![1, 2], 8, 4, 1).is_err());
        assert!(InMemoryDgg::new(seqnum_grid(8, 4), 8, 4, 4).is_err());
    }

    #[test]
    fn test_tiled_dgg_clipped_tiles() {
        let dir = tempfile::tempdir().unwrap();
        // Pyramid level 6 with level0 = 6 is 256 x 126: one clipped tile.
        let (w, h) = (PYRAMID_WIDTH >> 6, PYRAMID_HEIGHT >> 6);
        let grid = seqnum_grid(w, h);
        write_dgg_tiles(dir.path(), 6, &grid, w, h, TILE_WIDTH, TILE_HEIGHT).unwrap();

        let dgg = TiledDgg::open_with_level0(dir.path(), 6).unwrap();
        assert_eq!(dgg.num_levels(), 1);
        assert_eq!(dgg.shape(0), (h, w));
        assert_eq!(*dgg.seqnum(0).unwrap(), grid);
    }

    #[test]
    fn test_tiled_dgg_multiple_tiles_and_fallback() {
        let dir = tempfile::tempdir().unwrap();
        // Pyramid level 4 is 1024 x 504: two full tiles side by side.
        let (w, h) = (PYRAMID_WIDTH >> 4, PYRAMID_HEIGHT >> 4);
        let grid = seqnum_grid(w, h);
        write_dgg_tiles(dir.path(), 4, &grid, w, h, TILE_WIDTH, TILE_HEIGHT).unwrap();

        let dgg = TiledDgg::open_with_level0(dir.path(), 4).unwrap();
        assert_eq!(dgg.num_levels(), 3);
        assert_eq!(*dgg.seqnum(0).unwrap(), grid);

        // Levels 5 and 6 are missing and get decimated.
        let level1 = dgg.seqnum(1).unwrap();
        assert_eq!(level1.len(), (w / 2) * (h / 2));
        assert_eq!(level1[0], grid[0]);
        assert_eq!(level1[1], grid[2]);
        assert_eq!(level1[w / 2], grid[2 * w]);
        assert_eq!(dgg.seqnum(2).unwrap().len(), (w / 4) * (h / 4));
    }

    #[test]
    fn test_tiled_dgg_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(TiledDgg::open(&dir.path().join("missing")).is_err());
        assert!(TiledDgg::open_with_level0(dir.path(), 7).is_err());

        let dgg = TiledDgg::open_with_level0(dir.path(), 6).unwrap();
        assert!(dgg.seqnum(0).is_err());
    }
}
