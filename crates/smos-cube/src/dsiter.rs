//! Iteration over the L2 products of a time range, one dataset per product.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use futures::stream::{self, Stream};
use serde_json::{json, Map, Value};
use tracing::debug;

use netcdf_refs::{ArrayData, FillValue};
use smos_common::time::MISSION_START;
use smos_common::{BoundingBox, SmosError, SmosResult};

use crate::catalog::DatasetRecord;
use crate::cube::{CubeVariable, GridSubset, TimeStepLoader};
use crate::l2product::GRID_POINT_ID_VAR;

/// Units of the time coordinate of iterated datasets.
pub const TIME_UNITS: &str = "milliseconds since 2010-01-01";

/// One L2 product mapped onto the full resolution grid.
#[derive(Debug, Clone)]
pub struct TimeStep {
    pub record: DatasetRecord,
    pub time: DateTime<Utc>,
    pub time_bnds: [DateTime<Utc>; 2],
    pub lon: Vec<f64>,
    pub lat: Vec<f64>,
    /// Global attributes of the L2 product
    pub attrs: Map<String, Value>,
    /// Mapped `(1, height, width)` images
    pub variables: Vec<(CubeVariable, ArrayData)>,
}

impl TimeStep {
    pub fn variable(&self, name: &str) -> Option<&ArrayData> {
        self.variables
            .iter()
            .find(|(var, _)| var.name == name)
            .map(|(_, data)| data)
    }

    pub fn var_names(&self) -> Vec<&str> {
        self.variables.iter().map(|(var, _)| var.name.as_str()).collect()
    }

    /// `(height, width)` of the images.
    pub fn shape(&self) -> (usize, usize) {
        (self.lat.len(), self.lon.len())
    }

    /// Encoding of the time coordinate.
    pub fn time_encoding() -> Map<String, Value> {
        let mut encoding = Map::new();
        encoding.insert("units".into(), json!(TIME_UNITS));
        encoding.insert("calendar".into(), json!("proleptic_gregorian"));
        encoding
    }

    /// Encoded value of `time`, in [`TIME_UNITS`].
    pub fn time_value(&self) -> i64 {
        (self.time - time_origin()).num_milliseconds()
    }
}

fn time_origin() -> DateTime<Utc> {
    NaiveDate::parse_from_str(MISSION_START, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .unwrap_or_default()
}

/// Iterates over the products of a loader, mapping all their variables.
#[derive(Debug)]
pub struct DatasetIterator {
    loader: Arc<TimeStepLoader>,
    subset: GridSubset,
    variable_names: Option<Vec<String>>,
    index: usize,
}

impl DatasetIterator {
    /// Iterate at full resolution, optionally restricted to `bbox`.
    pub fn new(
        loader: Arc<TimeStepLoader>,
        bbox: Option<&BoundingBox>,
        variable_names: Option<Vec<String>>,
    ) -> SmosResult<Self> {
        let geometry = loader.dgg().geometry();
        let subset = GridSubset::new(&geometry, 0, bbox)?;
        Ok(Self {
            loader,
            subset,
            variable_names,
            index: 0,
        })
    }

    /// Number of time steps.
    pub fn len(&self) -> usize {
        self.loader.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loader.is_empty()
    }

    /// Index of the next time step to be yielded.
    pub fn current_index(&self) -> usize {
        self.index
    }

    pub fn records(&self) -> &[DatasetRecord] {
        self.loader.records()
    }

    /// The next time step, or `None` when exhausted.
    pub async fn next_time_step(&mut self) -> Option<SmosResult<TimeStep>> {
        if self.index >= self.len() {
            return None;
        }
        let result = self.time_step(self.index).await;
        self.index += 1;
        Some(result)
    }

    /// Map the product of time step `index`.
    pub async fn time_step(&self, index: usize) -> SmosResult<TimeStep> {
        let record = self.loader.record(index)?.clone();
        let product = self.loader.product(index).await?;
        let mapped = product.mapped(0)?;

        let mut variables = Vec::new();
        for var in &product.dataset().variables {
            if var.name == GRID_POINT_ID_VAR || var.data.len() != product.num_rows() {
                continue;
            }
            if let Some(names) = &self.variable_names {
                if !names.iter().any(|n| n == &var.name) {
                    continue;
                }
            }
            let dtype = var.data.dtype();
            let fill_value = product
                .fill_value(&var.name)
                .unwrap_or_else(|| FillValue::default_for(&dtype));
            let mut data = mapped.map_variable(&var.name)?;
            if !self.subset.is_full() {
                data = data.window_2d(
                    self.subset.full_shape.1,
                    self.subset.rows.clone(),
                    self.subset.cols.clone(),
                );
            }
            variables.push((
                CubeVariable {
                    name: var.name.clone(),
                    dtype,
                    fill_value,
                    attrs: var.attrs.clone(),
                },
                data,
            ));
        }
        if variables.is_empty() {
            return Err(SmosError::DataReadError(format!(
                "No mappable variables in {}",
                record.path
            )));
        }
        debug!(index, path = %record.path, variables = variables.len(), "Mapped time step");

        Ok(TimeStep {
            time: record.mid_time(),
            time_bnds: [record.start, record.stop],
            lon: self.subset.lon.clone(),
            lat: self.subset.lat.clone(),
            attrs: product.dataset().attrs.clone(),
            variables,
            record,
        })
    }

    /// Consume the iterator as a stream of time steps.
    pub fn into_stream(self) -> impl Stream<Item = SmosResult<TimeStep>> {
        stream::unfold(self, |mut iter| async move {
            let item = iter.next_time_step().await?;
            Some((item, iter))
        })
    }
}
