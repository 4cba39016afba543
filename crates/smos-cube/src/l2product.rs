//! Mapping of SMOS L2 products onto the DGG.
//!
//! An L2 product is a list of grid points (rows) identified by
//! `Grid_Point_ID`. Mapping it onto a DGG level yields, for every pixel,
//! the row whose seqnum the pixel carries, or a "missing" marker. Each
//! per-row variable can then be gathered into a `(1, height, width)` image.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use lru::LruCache;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use netcdf_refs::{ArrayData, DType, FillValue};
use smos_common::{SmosError, SmosResult};

use crate::dgg::{grid_point_id_to_seqnum, SeqnumGrid, MAX_SEQNUM, MIN_SEQNUM};

/// Variable holding the grid point id of every row.
pub const GRID_POINT_ID_VAR: &str = "Grid_Point_ID";

/// A decoded variable of an L2 product.
#[derive(Debug, Clone, PartialEq)]
pub struct L2Variable {
    pub name: String,
    pub dims: Vec<String>,
    pub data: ArrayData,
    pub attrs: Map<String, Value>,
    /// `_FillValue` as stored in the product, if any
    pub fill_value: Option<FillValue>,
}

/// A decoded L2 product: global attributes and variables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct L2Dataset {
    pub attrs: Map<String, Value>,
    pub variables: Vec<L2Variable>,
}

impl L2Dataset {
    pub fn variable(&self, name: &str) -> Option<&L2Variable> {
        self.variables.iter().find(|v| v.name == name)
    }

    pub fn variable_names(&self) -> Vec<&str> {
        self.variables.iter().map(|v| v.name.as_str()).collect()
    }
}

/// An L2 product prepared for mapping onto a DGG.
pub struct L2Product {
    dgg: Arc<dyn SeqnumGrid>,
    dataset: Arc<L2Dataset>,
    fill_values: Arc<HashMap<String, FillValue>>,
    /// Row index per seqnum; `missing_index` where no row has the seqnum
    seqnum_to_index: Vec<u32>,
    missing_index: u32,
    mapped: Mutex<LruCache<usize, Arc<MappedL2Product>>>,
}

impl std::fmt::Debug for L2Product {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("L2Product")
            .field("num_rows", &self.missing_index)
            .field("variables", &self.dataset.variable_names())
            .finish()
    }
}

impl L2Product {
    pub fn new(dgg: Arc<dyn SeqnumGrid>, dataset: L2Dataset) -> SmosResult<Self> {
        let grid_point_id = dataset.variable(GRID_POINT_ID_VAR).ok_or_else(|| {
            SmosError::DataReadError(format!("L2 product has no {} variable", GRID_POINT_ID_VAR))
        })?;
        let ids = grid_point_id
            .data
            .to_u64_vec()
            .map_err(|e| SmosError::NetCdfError(e.to_string()))?;

        let num_rows = ids.len();
        let missing_index = u32::try_from(num_rows)
            .map_err(|_| SmosError::DataReadError(format!("{} grid points", num_rows)))?;

        let mut seqnum_to_index = vec![missing_index; MAX_SEQNUM as usize + 1];
        for (row, &id) in ids.iter().enumerate() {
            let seqnum = u32::try_from(id)
                .ok()
                .filter(|&id| id >= MIN_SEQNUM)
                .map(grid_point_id_to_seqnum)
                .filter(|s| (MIN_SEQNUM..=MAX_SEQNUM).contains(s))
                .ok_or_else(|| {
                    SmosError::DataReadError(format!(
                        "Grid point id {} maps outside the valid seqnum range",
                        id
                    ))
                })?;
            seqnum_to_index[seqnum as usize] = row as u32;
        }

        let mut fill_values = HashMap::new();
        for var in &dataset.variables {
            let fill = match var.fill_value {
                Some(fill) => fill,
                None => {
                    let fill = FillValue::default_for(&var.data.dtype());
                    warn!(
                        variable = %var.name,
                        fill = fill.as_f64(),
                        "Variable is missing a fill value, using default"
                    );
                    fill
                }
            };
            fill_values.insert(var.name.clone(), fill);
        }

        let capacity = NonZeroUsize::new(dgg.num_levels()).unwrap_or(NonZeroUsize::MIN);
        Ok(Self {
            dgg,
            dataset: Arc::new(dataset),
            fill_values: Arc::new(fill_values),
            seqnum_to_index,
            missing_index,
            mapped: Mutex::new(LruCache::new(capacity)),
        })
    }

    pub fn dataset(&self) -> &L2Dataset {
        &self.dataset
    }

    pub fn num_rows(&self) -> usize {
        self.missing_index as usize
    }

    /// Fill value used for `name` in mapped images.
    pub fn fill_value(&self, name: &str) -> Option<FillValue> {
        self.fill_values.get(name).copied()
    }

    /// The product mapped onto a DGG level, cached per level.
    pub fn mapped(&self, level: usize) -> SmosResult<Arc<MappedL2Product>> {
        if let Some(mapped) = self
            .mapped
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&level)
        {
            return Ok(Arc::clone(mapped));
        }

        let seqnum = self.dgg.seqnum(level)?;
        let index: Vec<u32> = seqnum
            .iter()
            .map(|&s| {
                self.seqnum_to_index
                    .get(s as usize)
                    .copied()
                    .unwrap_or(self.missing_index)
            })
            .collect();
        debug!(level, pixels = index.len(), "Mapped L2 product");

        let mapped = Arc::new(MappedL2Product {
            dataset: Arc::clone(&self.dataset),
            fill_values: Arc::clone(&self.fill_values),
            index,
            missing_index: self.missing_index,
            shape: self.dgg.shape(level),
        });
        self.mapped
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .put(level, Arc::clone(&mapped));
        Ok(mapped)
    }
}

/// An L2 product mapped onto one DGG level.
#[derive(Debug)]
pub struct MappedL2Product {
    dataset: Arc<L2Dataset>,
    fill_values: Arc<HashMap<String, FillValue>>,
    index: Vec<u32>,
    missing_index: u32,
    shape: (usize, usize),
}

impl MappedL2Product {
    /// `(height, width)` of the mapped images.
    pub fn shape(&self) -> (usize, usize) {
        self.shape
    }

    /// Row index per pixel, `num_rows` where no row maps.
    pub fn index(&self) -> &[u32] {
        &self.index
    }

    /// Reproject an L2 variable to the grid.
    ///
    /// Returns the row-major data of a `(1, height, width)` array.
    pub fn map_variable(&self, name: &str) -> SmosResult<ArrayData> {
        let var = self
            .dataset
            .variable(name)
            .ok_or_else(|| SmosError::DataReadError(format!("Variable '{}' not found", name)))?;
        if var.data.len() != self.missing_index as usize {
            return Err(SmosError::DataReadError(format!(
                "Variable '{}' has {} values for {} grid points",
                name,
                var.data.len(),
                self.missing_index
            )));
        }
        let fill = self
            .fill_values
            .get(name)
            .copied()
            .unwrap_or_else(|| FillValue::default_for(&var.data.dtype()));
        Ok(var.data.gather(&self.index, self.missing_index, fill))
    }

    /// Like [`Self::map_variable`], converted to `dtype` with `fill` as
    /// the fill value when the product stores the variable differently.
    pub fn map_variable_as(
        &self,
        name: &str,
        dtype: &DType,
        fill: FillValue,
    ) -> SmosResult<ArrayData> {
        let data = self.map_variable(name)?;
        let own = data.dtype();
        if own.kind == dtype.kind && own.size == dtype.size {
            return Ok(data);
        }
        let own_fill = self
            .fill_values
            .get(name)
            .copied()
            .unwrap_or_else(|| FillValue::default_for(&own));
        warn!(variable = name, from = %own, to = %dtype, "Converting L2 variable");
        Ok(data.cast(dtype, own_fill, fill))
    }
}
