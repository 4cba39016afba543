//! A single resolution level of a cube.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::{instrument, warn};

use netcdf_refs::ArrayData;
use smos_common::{DatasetId, SmosError, SmosResult};

use super::{CubeVariable, GridSubset, TimeStepLoader, CUBE_DIMS};
use crate::l2product::L2Product;

/// A `(time, lat, lon)` dataset whose images are mapped on demand.
#[derive(Debug, Clone)]
pub struct CubeDataset {
    pub(super) dataset_id: DatasetId,
    pub(super) loader: Arc<TimeStepLoader>,
    pub(super) variables: Arc<Vec<CubeVariable>>,
    pub(super) subset: GridSubset,
    pub(super) time: Vec<DateTime<Utc>>,
    pub(super) time_bnds: Vec<[DateTime<Utc>; 2]>,
    pub(super) attrs: Map<String, Value>,
}

impl CubeDataset {
    pub fn dataset_id(&self) -> DatasetId {
        self.dataset_id
    }

    pub fn level(&self) -> usize {
        self.subset.level
    }

    pub fn dims(&self) -> [&'static str; 3] {
        CUBE_DIMS
    }

    /// `[time, lat, lon]` sizes.
    pub fn shape(&self) -> [usize; 3] {
        let (height, width) = self.subset.shape();
        [self.time.len(), height, width]
    }

    /// Chunk shape of every variable: one full image per time step.
    pub fn chunks(&self) -> [usize; 3] {
        let (height, width) = self.subset.shape();
        [1, height, width]
    }

    pub fn lon(&self) -> &[f64] {
        &self.subset.lon
    }

    pub fn lat(&self) -> &[f64] {
        &self.subset.lat
    }

    /// Midpoints of the observation periods.
    pub fn time(&self) -> &[DateTime<Utc>] {
        &self.time
    }

    pub fn time_bnds(&self) -> &[[DateTime<Utc>; 2]] {
        &self.time_bnds
    }

    pub fn subset(&self) -> &GridSubset {
        &self.subset
    }

    pub fn variables(&self) -> &[CubeVariable] {
        &self.variables
    }

    pub fn variable(&self, name: &str) -> Option<&CubeVariable> {
        self.variables.iter().find(|v| v.name == name)
    }

    pub fn var_names(&self) -> Vec<&str> {
        self.variables.iter().map(|v| v.name.as_str()).collect()
    }

    pub fn attrs(&self) -> &Map<String, Value> {
        &self.attrs
    }

    pub fn loader(&self) -> &Arc<TimeStepLoader> {
        &self.loader
    }

    /// Map variable `name` of time step `time_index` onto this level.
    ///
    /// Returns the row-major data of a `(1, height, width)` image. Products
    /// lacking the variable yield an image of fill values.
    #[instrument(skip(self), fields(level = self.subset.level))]
    pub async fn load_time_step(&self, name: &str, time_index: usize) -> SmosResult<ArrayData> {
        let var = self.variable(name).ok_or_else(|| {
            SmosError::invalid_parameter("variable_names", format!("unknown variable '{}'", name))
        })?;
        let product = self.loader.product(time_index).await?;
        self.map_image(&product, var, time_index)
    }

    /// Map every variable of time step `time_index`, in variable order.
    ///
    /// The product is loaded once for all variables.
    #[instrument(skip(self), fields(level = self.subset.level))]
    pub async fn load_images(&self, time_index: usize) -> SmosResult<Vec<ArrayData>> {
        let product = self.loader.product(time_index).await?;
        self.variables
            .iter()
            .map(|var| self.map_image(&product, var, time_index))
            .collect()
    }

    fn map_image(
        &self,
        product: &L2Product,
        var: &CubeVariable,
        time_index: usize,
    ) -> SmosResult<ArrayData> {
        let (height, width) = self.subset.shape();
        if product.dataset().variable(&var.name).is_none() {
            warn!(
                variable = %var.name,
                path = %self.loader.record(time_index)?.path,
                "L2 product lacks variable, using fill value"
            );
            return Ok(ArrayData::full(&var.dtype, height * width, var.fill_value));
        }

        // Later products may store a variable with another dtype than the first.
        let data = product
            .mapped(self.subset.level)?
            .map_variable_as(&var.name, &var.dtype, var.fill_value)?;
        if self.subset.is_full() {
            return Ok(data);
        }
        let full_width = self.subset.full_shape.1;
        Ok(data.window_2d(full_width, self.subset.rows.clone(), self.subset.cols.clone()))
    }
}
