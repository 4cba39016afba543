//! Multi-resolution SMOS L2 cubes.

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};
use tracing::{debug, info, instrument};

use netcdf_refs::FillValue;
use smos_common::{BoundingBox, DatasetId, SmosError, SmosResult};

use super::{CubeDataset, CubeVariable, GridSubset, TimeStepLoader};
use crate::dgg::DggGeometry;

/// A multi-resolution cube over the time steps of a loader.
#[derive(Debug, Clone)]
pub struct L2Cube {
    dataset_id: DatasetId,
    loader: Arc<TimeStepLoader>,
    geometry: DggGeometry,
    bbox: Option<BoundingBox>,
    variables: Arc<Vec<CubeVariable>>,
    time: Vec<DateTime<Utc>>,
    time_bnds: Vec<[DateTime<Utc>; 2]>,
}

impl L2Cube {
    /// Open a cube.
    ///
    /// Variables are those of `dataset_id` (or `variable_names`) present in
    /// the first product, which also provides their types and attributes.
    #[instrument(skip(loader, variable_names), fields(time_steps = loader.len()))]
    pub async fn open(
        dataset_id: DatasetId,
        loader: Arc<TimeStepLoader>,
        bbox: Option<BoundingBox>,
        variable_names: Option<&[String]>,
    ) -> SmosResult<Self> {
        if loader.is_empty() {
            return Err(SmosError::EmptyDataset(format!(
                "No SMOS datasets for {}",
                dataset_id.as_str()
            )));
        }
        if let Some(names) = variable_names {
            if let Some(unknown) = names.iter().find(|n| !dataset_id.has_var(n)) {
                return Err(SmosError::invalid_parameter(
                    "variable_names",
                    format!("'{}' is not a variable of {}", unknown, dataset_id.as_str()),
                ));
            }
        }

        let first = loader.product(0).await?;
        let mut variables = Vec::new();
        for &name in dataset_id.var_names() {
            if variable_names.is_some_and(|names| !names.iter().any(|n| n == name)) {
                continue;
            }
            let Some(var) = first.dataset().variable(name) else {
                debug!(variable = name, "Variable not in first product, skipping");
                continue;
            };
            let dtype = var.data.dtype();
            variables.push(CubeVariable {
                name: name.to_string(),
                dtype,
                fill_value: first
                    .fill_value(name)
                    .unwrap_or_else(|| FillValue::default_for(&dtype)),
                attrs: var.attrs.clone(),
            });
        }

        let time = loader.records().iter().map(|r| r.mid_time()).collect();
        let time_bnds = loader.records().iter().map(|r| [r.start, r.stop]).collect();
        let geometry = loader.dgg().geometry();

        info!(
            dataset_id = dataset_id.as_str(),
            variables = variables.len(),
            num_levels = geometry.num_levels,
            "Opened L2 cube"
        );
        Ok(Self {
            dataset_id,
            loader,
            geometry,
            bbox,
            variables: Arc::new(variables),
            time,
            time_bnds,
        })
    }

    pub fn dataset_id(&self) -> DatasetId {
        self.dataset_id
    }

    pub fn num_levels(&self) -> usize {
        self.geometry.num_levels
    }

    pub fn geometry(&self) -> &DggGeometry {
        &self.geometry
    }

    pub fn bbox(&self) -> Option<&BoundingBox> {
        self.bbox.as_ref()
    }

    pub fn variables(&self) -> &[CubeVariable] {
        &self.variables
    }

    pub fn loader(&self) -> &Arc<TimeStepLoader> {
        &self.loader
    }

    /// The dataset of one resolution level, 0 being the finest.
    pub fn level(&self, level: usize) -> SmosResult<CubeDataset> {
        if level >= self.num_levels() {
            return Err(SmosError::invalid_parameter(
                "res_level",
                format!("level {} out of range 0..{}", level, self.num_levels()),
            ));
        }
        let subset = GridSubset::new(&self.geometry, level, self.bbox.as_ref())?;
        let attrs = self.level_attrs(&subset);
        Ok(CubeDataset {
            dataset_id: self.dataset_id,
            loader: Arc::clone(&self.loader),
            variables: Arc::clone(&self.variables),
            subset,
            time: self.time.clone(),
            time_bnds: self.time_bnds.clone(),
            attrs,
        })
    }

    /// The full resolution dataset.
    pub fn base_dataset(&self) -> SmosResult<CubeDataset> {
        self.level(0)
    }

    fn level_attrs(&self, subset: &GridSubset) -> Map<String, Value> {
        let half = self.geometry.pixel_size(subset.level) / 2.0;
        let mut attrs = Map::new();
        attrs.insert("title".into(), Value::from(self.dataset_id.title()));
        attrs.insert(
            "product_type".into(),
            Value::from(self.dataset_id.product_type().type_id()),
        );
        attrs.insert("Conventions".into(), Value::from("CF-1.9"));
        if let (Some(start), Some(end)) = (
            self.time_bnds.first().map(|b| b[0]),
            self.time_bnds.iter().map(|b| b[1]).max(),
        ) {
            attrs.insert(
                "time_coverage_start".into(),
                Value::from(start.to_rfc3339_opts(SecondsFormat::Secs, true)),
            );
            attrs.insert(
                "time_coverage_end".into(),
                Value::from(end.to_rfc3339_opts(SecondsFormat::Secs, true)),
            );
        }
        let bounds = [
            ("geospatial_lon_min", subset.lon.first().map(|x| x - half)),
            ("geospatial_lon_max", subset.lon.last().map(|x| x + half)),
            ("geospatial_lat_min", subset.lat.last().map(|y| y - half)),
            ("geospatial_lat_max", subset.lat.first().map(|y| y + half)),
        ];
        for (key, value) in bounds {
            if let Some(value) = value {
                attrs.insert(key.into(), Value::from(value));
            }
        }
        attrs
    }
}
