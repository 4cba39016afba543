//! Data cubes assembled from L2 products mapped onto the DGG.

mod dataset;
mod l2cube;
mod loader;

pub use dataset::CubeDataset;
pub use l2cube::L2Cube;
pub use loader::TimeStepLoader;

use std::ops::Range;

use serde_json::{json, Map, Value};

use netcdf_refs::{DType, FillValue};
use smos_common::{BoundingBox, SmosError, SmosResult};

use crate::dgg::DggGeometry;

/// Dimension names of cube variables.
pub const CUBE_DIMS: [&str; 3] = ["time", "lat", "lon"];

/// `coordinates` attribute carried by every cube variable.
pub const COORDINATES: &str = "lon lat time time_bnds";

/// A data variable of a cube.
#[derive(Debug, Clone, PartialEq)]
pub struct CubeVariable {
    pub name: String,
    pub dtype: DType,
    pub fill_value: FillValue,
    pub attrs: Map<String, Value>,
}

impl CubeVariable {
    /// Attributes as written to a cube, including `_FillValue` and `coordinates`.
    pub fn cube_attrs(&self) -> Map<String, Value> {
        let mut attrs = self.attrs.clone();
        attrs.insert("_FillValue".to_string(), self.fill_value.to_json());
        attrs.insert("coordinates".to_string(), Value::from(COORDINATES));
        attrs
    }
}

/// Attributes of the coordinate variables.
pub fn coordinate_attrs(name: &str) -> Map<String, Value> {
    let value = match name {
        "lon" => json!({
            "long_name": "longitude",
            "standard_name": "longitude",
            "units": "degrees_east",
        }),
        "lat" => json!({
            "long_name": "latitude",
            "standard_name": "latitude",
            "units": "degrees_north",
        }),
        "time" => json!({
            "long_name": "time",
            "standard_name": "time",
            "bounds": "time_bnds",
        }),
        "time_bnds" => json!({
            "long_name": "time bounds",
        }),
        _ => json!({}),
    };
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// The pixels of a DGG level selected by a bounding box.
#[derive(Debug, Clone, PartialEq)]
pub struct GridSubset {
    pub level: usize,
    /// `(height, width)` of the whole level
    pub full_shape: (usize, usize),
    pub rows: Range<usize>,
    pub cols: Range<usize>,
    pub lon: Vec<f64>,
    pub lat: Vec<f64>,
}

impl GridSubset {
    /// Compute the subset of `level` selected by `bbox`.
    ///
    /// Pixel centres on the bbox edges are included. No subset is made if
    /// the bbox covers the whole grid within one level-0 pixel.
    pub fn new(geometry: &DggGeometry, level: usize, bbox: Option<&BoundingBox>) -> SmosResult<Self> {
        let full_shape = geometry.shape(level);
        let lon = geometry.lon(level);
        let lat = geometry.lat(level);

        let bbox = bbox.filter(|b| !b.covers(&geometry.bbox(), geometry.pixel_size(0)));
        let Some(bbox) = bbox else {
            return Ok(Self {
                level,
                full_shape,
                rows: 0..full_shape.0,
                cols: 0..full_shape.1,
                lon,
                lat,
            });
        };

        let cols = index_range(&lon, |x| x >= bbox.min_x && x <= bbox.max_x);
        let rows = index_range(&lat, |y| y >= bbox.min_y && y <= bbox.max_y);
        if cols.is_empty() || rows.is_empty() {
            return Err(SmosError::InvalidBbox(format!(
                "{} selects no pixels at resolution level {}",
                bbox, level
            )));
        }

        Ok(Self {
            level,
            full_shape,
            lon: lon[cols.clone()].to_vec(),
            lat: lat[rows.clone()].to_vec(),
            rows,
            cols,
        })
    }

    /// `(height, width)` of the subset.
    pub fn shape(&self) -> (usize, usize) {
        (self.rows.len(), self.cols.len())
    }

    pub fn is_full(&self) -> bool {
        self.shape() == self.full_shape
    }
}

/// Range of indices of a monotonic coordinate whose values satisfy `pred`.
fn index_range(values: &[f64], pred: impl Fn(f64) -> bool) -> Range<usize> {
    let start = values.iter().position(|&v| pred(v));
    let end = values.iter().rposition(|&v| pred(v));
    match (start, end) {
        (Some(start), Some(end)) => start..end + 1,
        _ => 0..0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry() -> DggGeometry {
        // 8 x 4 pixels of 45 degrees
        DggGeometry::new(8, 4, 2)
    }

    #[test]
    fn test_full_grid() {
        let subset = GridSubset::new(&geometry(), 0, None).unwrap();
        assert!(subset.is_full());
        assert_eq!(subset.lon[0], -157.5);
        assert_eq!(subset.lat, vec![67.5, 22.5, -22.5, -67.5]);
    }

    #[test]
    fn test_covering_bbox_is_not_subset() {
        let bbox = BoundingBox::global();
        let subset = GridSubset::new(&geometry(), 1, Some(&bbox)).unwrap();
        assert!(subset.is_full());
        assert_eq!(subset.shape(), (2, 4));
    }

    #[test]
    fn test_bbox_subset() {
        let bbox = BoundingBox::new(-100.0, 0.0, 30.0, 70.0);
        let subset = GridSubset::new(&geometry(), 0, Some(&bbox)).unwrap();
        assert_eq!(subset.cols, 2..5);
        assert_eq!(subset.rows, 0..2);
        assert_eq!(subset.lon, vec![-67.5, -22.5, 22.5]);
        assert_eq!(subset.lat, vec![67.5, 22.5]);
        assert!(!subset.is_full());
    }

    #[test]
    fn test_empty_subset() {
        let bbox = BoundingBox::new(1.0, 1.0, 2.0, 2.0);
        assert!(matches!(
            GridSubset::new(&geometry(), 0, Some(&bbox)),
            Err(SmosError::InvalidBbox(_))
        ));
    }

    #[test]
    fn test_variable_attrs() {
        let var = CubeVariable {
            name: "Soil_Moisture".to_string(),
            dtype: DType::parse("<f4").unwrap(),
            fill_value: FillValue::Float(-999.0),
            attrs: Map::new(),
        };
        let attrs = var.cube_attrs();
        assert_eq!(attrs["coordinates"], COORDINATES);
        assert_eq!(attrs["_FillValue"], json!(-999.0));
        assert_eq!(coordinate_attrs("time")["bounds"], "time_bnds");
    }
}
