//! Open parameters of the SMOS data openers.

use serde::Deserialize;
use serde_json::{json, Value};

use smos_common::{BoundingBox, DatasetId, SmosError, SmosResult, TimeRange};

use super::DataType;
use crate::dgg::NUM_LEVELS;

/// Parameters accepted by [`super::SmosDataStore::open_data`].
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OpenParams {
    /// `[start, end]`, either bound may be null
    pub time_range: Option<(Option<String>, Option<String>)>,
    #[serde(default)]
    pub bbox: Option<[f64; 4]>,
    #[serde(default)]
    pub res_level: Option<usize>,
    #[serde(default)]
    pub l2_product_cache_size: Option<usize>,
    #[serde(default)]
    pub variable_names: Option<Vec<String>>,
}

impl OpenParams {
    pub fn from_value(value: Value) -> SmosResult<Self> {
        let value = match value {
            Value::Null => Value::Object(Default::default()),
            other => other,
        };
        serde_json::from_value(value)
            .map_err(|e| SmosError::invalid_parameter("open_params", e.to_string()))
    }

    /// The time range, with open bounds resolved.
    pub fn time_range(&self) -> SmosResult<TimeRange> {
        let (start, end) = self
            .time_range
            .as_ref()
            .ok_or_else(|| SmosError::MissingParameter("time_range".to_string()))?;
        TimeRange::normalize(start.as_deref(), end.as_deref())
            .map_err(|e| SmosError::InvalidTime(e.to_string()))
    }

    pub fn bbox(&self) -> SmosResult<Option<BoundingBox>> {
        self.bbox
            .map(BoundingBox::from_array)
            .transpose()
            .map_err(|e| SmosError::InvalidBbox(e.to_string()))
    }

    /// Check parameters against a dataset and opener.
    pub fn validate(&self, data_id: DatasetId, data_type: DataType) -> SmosResult<()> {
        if let Some(level) = self.res_level {
            if data_type != DataType::Dataset {
                return Err(SmosError::invalid_parameter(
                    "res_level",
                    format!("not supported by opener '{}'", data_type.opener_id()),
                ));
            }
            if level >= NUM_LEVELS {
                return Err(SmosError::invalid_parameter(
                    "res_level",
                    format!("{} out of range 0..{}", level, NUM_LEVELS),
                ));
            }
        }
        if let Some(names) = &self.variable_names {
            if let Some(unknown) = names.iter().find(|n| !data_id.has_var(n)) {
                return Err(SmosError::invalid_parameter(
                    "variable_names",
                    format!("'{}' is not a variable of {}", unknown, data_id.as_str()),
                ));
            }
        }
        self.time_range()?;
        self.bbox()?;
        Ok(())
    }
}

/// JSON schema of the open parameters of an opener.
pub fn open_params_schema(data_id: Option<DatasetId>, data_type: DataType) -> Value {
    let var_names: Vec<&str> = match data_id {
        Some(id) => id.var_names().to_vec(),
        None => {
            let mut names: Vec<&str> = DatasetId::all()
                .iter()
                .flat_map(|id| id.var_names().iter().copied())
                .collect();
            names.sort_unstable();
            names.dedup();
            names
        }
    };

    let mut properties = json!({
        "time_range": {
            "type": "array",
            "items": [
                {"type": ["string", "null"], "format": "date"},
                {"type": ["string", "null"], "format": "date"},
            ],
            "minItems": 2,
            "maxItems": 2,
            "title": "Time range [from, to]",
        },
        "bbox": {
            "type": "array",
            "items": {"type": "number"},
            "minItems": 4,
            "maxItems": 4,
            "title": "Bounding box [x1, y1, x2, y2]",
        },
        "l2_product_cache_size": {
            "type": "integer",
            "minimum": 0,
            "default": 0,
            "title": "Number of L2 products kept open",
        },
        "variable_names": {
            "type": "array",
            "items": {"type": "string", "enum": var_names},
            "title": "Names of variables to include",
        },
    });
    if data_type == DataType::Dataset {
        properties["res_level"] = json!({
            "type": "integer",
            "minimum": 0,
            "maximum": NUM_LEVELS - 1,
            "default": 0,
            "title": "Spatial resolution level",
        });
    }

    json!({
        "type": "object",
        "properties": properties,
        "required": ["time_range"],
        "additionalProperties": false,
    })
}
