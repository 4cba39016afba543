//! Kerchunk version 1 reference sets.
//!
//! A reference set maps Zarr v2 keys to either inline content or a byte range
//! `[url, offset, length]` inside a source file:
//!
//! ```json
//! {"version": 1, "refs": {
//!     ".zgroup": "{\"zarr_format\":2}",
//!     "Soil_Moisture/.zarray": "{...}",
//!     "Soil_Moisture/0": ["s3://bucket/SM_OPER_....nc", 30000, 4096]
//! }}
//! ```

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::dtype::{DType, FillValue};
use crate::error::{NetCdfError, NetCdfResult};

pub const REFS_VERSION: u32 = 1;

const ZGROUP_KEY: &str = ".zgroup";
const ZATTRS_KEY: &str = ".zattrs";
const ZARRAY_SUFFIX: &str = "/.zarray";
const ZATTRS_SUFFIX: &str = "/.zattrs";
const BASE64_PREFIX: &str = "base64:";

/// Attribute holding the dimension names of a variable.
pub const ARRAY_DIMENSIONS_ATTR: &str = "_ARRAY_DIMENSIONS";

/// One entry of a reference set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RefValue {
    /// Inline content: a JSON document, plain text, or `base64:`-prefixed bytes.
    Inline(String),
    /// A byte range of a source file.
    Range(String, u64, u64),
}

impl RefValue {
    pub fn inline_bytes(bytes: &[u8]) -> Self {
        RefValue::Inline(format!("{}{}", BASE64_PREFIX, STANDARD.encode(bytes)))
    }

    /// Decoded content of an inline entry.
    pub fn inline_content(&self) -> NetCdfResult<Option<Vec<u8>>> {
        match self {
            RefValue::Inline(s) => match s.strip_prefix(BASE64_PREFIX) {
                Some(b64) => STANDARD
                    .decode(b64)
                    .map(Some)
                    .map_err(|e| NetCdfError::invalid_reference(format!("bad base64: {}", e))),
                None => Ok(Some(s.as_bytes().to_vec())),
            },
            RefValue::Range(..) => Ok(None),
        }
    }
}

/// Zarr v2 compressor or filter configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "id", rename_all = "lowercase")]
pub enum CodecConfig {
    Zlib { level: u32 },
    Shuffle { elementsize: usize },
    /// HDF5 Fletcher-32 checksum, 4 bytes appended to every stored chunk
    Fletcher32,
    #[serde(other)]
    Unsupported,
}

/// Zarr v2 `.zarray` metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZarrArrayMeta {
    pub chunks: Vec<usize>,
    pub compressor: Option<CodecConfig>,
    pub dtype: String,
    pub fill_value: Option<FillValue>,
    pub filters: Option<Vec<CodecConfig>>,
    pub order: String,
    pub shape: Vec<usize>,
    pub zarr_format: u32,
}

impl ZarrArrayMeta {
    pub fn new(shape: Vec<usize>, chunks: Vec<usize>, dtype: DType) -> Self {
        Self {
            chunks,
            compressor: None,
            dtype: dtype.to_string(),
            fill_value: None,
            filters: None,
            order: "C".to_string(),
            shape,
            zarr_format: 2,
        }
    }

    pub fn data_type(&self) -> NetCdfResult<DType> {
        DType::parse(&self.dtype)
    }

    pub fn num_elements(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn chunk_elements(&self) -> usize {
        self.chunks.iter().product()
    }

    /// Number of chunks along each dimension.
    pub fn chunk_grid(&self) -> Vec<usize> {
        self.shape
            .iter()
            .zip(&self.chunks)
            .map(|(&n, &c)| if c == 0 { 0 } else { n.div_ceil(c) })
            .collect()
    }
}

/// A Kerchunk reference set describing one NetCDF file as a Zarr v2 store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceSet {
    pub version: u32,
    pub refs: BTreeMap<String, RefValue>,
}

impl Default for ReferenceSet {
    fn default() -> Self {
        Self::new()
    }
}

impl ReferenceSet {
    pub fn new() -> Self {
        let mut refs = BTreeMap::new();
        refs.insert(
            ZGROUP_KEY.to_string(),
            RefValue::Inline(r#"{"zarr_format":2}"#.to_string()),
        );
        Self {
            version: REFS_VERSION,
            refs,
        }
    }

    pub fn from_json_bytes(bytes: &[u8]) -> NetCdfResult<Self> {
        let set: ReferenceSet = serde_json::from_slice(bytes)?;
        if set.version != REFS_VERSION {
            return Err(NetCdfError::invalid_reference(format!(
                "unsupported reference version {}",
                set.version
            )));
        }
        Ok(set)
    }

    pub fn to_json_bytes(&self) -> NetCdfResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn set_global_attrs(&mut self, attrs: Map<String, Value>) -> NetCdfResult<()> {
        let doc = serde_json::to_string(&Value::Object(attrs))?;
        self.refs.insert(ZATTRS_KEY.to_string(), RefValue::Inline(doc));
        Ok(())
    }

    /// Declare an array; `dims` become its `_ARRAY_DIMENSIONS` attribute.
    pub fn set_array(
        &mut self,
        name: &str,
        meta: &ZarrArrayMeta,
        dims: &[String],
        mut attrs: Map<String, Value>,
    ) -> NetCdfResult<()> {
        attrs.insert(
            ARRAY_DIMENSIONS_ATTR.to_string(),
            Value::Array(dims.iter().cloned().map(Value::String).collect()),
        );
        self.refs.insert(
            format!("{}{}", name, ZARRAY_SUFFIX),
            RefValue::Inline(serde_json::to_string(meta)?),
        );
        self.refs.insert(
            format!("{}{}", name, ZATTRS_SUFFIX),
            RefValue::Inline(serde_json::to_string(&Value::Object(attrs))?),
        );
        Ok(())
    }

    pub fn add_chunk(&mut self, name: &str, index: &[usize], value: RefValue) {
        self.refs.insert(chunk_key(name, index), value);
    }

    pub fn global_attrs(&self) -> NetCdfResult<Map<String, Value>> {
        self.json_object(ZATTRS_KEY)
            .map(|attrs| attrs.unwrap_or_default())
    }

    /// Names of all arrays, sorted.
    pub fn variable_names(&self) -> Vec<String> {
        self.refs
            .keys()
            .filter_map(|k| k.strip_suffix(ZARRAY_SUFFIX))
            .map(str::to_string)
            .collect()
    }

    pub fn array_meta(&self, name: &str) -> NetCdfResult<ZarrArrayMeta> {
        let key = format!("{}{}", name, ZARRAY_SUFFIX);
        let value = self
            .refs
            .get(&key)
            .ok_or_else(|| NetCdfError::MissingData(format!("variable '{}'", name)))?;
        let bytes = value
            .inline_content()?
            .ok_or_else(|| NetCdfError::invalid_reference(format!("'{}' is not inline", key)))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Variable attributes, without `_ARRAY_DIMENSIONS`.
    pub fn variable_attrs(&self, name: &str) -> NetCdfResult<Map<String, Value>> {
        let mut attrs = self
            .json_object(&format!("{}{}", name, ZATTRS_SUFFIX))?
            .unwrap_or_default();
        attrs.remove(ARRAY_DIMENSIONS_ATTR);
        Ok(attrs)
    }

    pub fn variable_dims(&self, name: &str) -> NetCdfResult<Vec<String>> {
        let attrs = self
            .json_object(&format!("{}{}", name, ZATTRS_SUFFIX))?
            .unwrap_or_default();
        Ok(match attrs.get(ARRAY_DIMENSIONS_ATTR) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        })
    }

    /// All chunk references of an array with their parsed chunk indices.
    pub fn chunk_refs(&self, name: &str) -> NetCdfResult<Vec<(Vec<usize>, &RefValue)>> {
        let prefix = format!("{}/", name);
        let mut chunks = Vec::new();
        for (key, value) in self.refs.range(prefix.clone()..) {
            let Some(rest) = key.strip_prefix(&prefix) else {
                break;
            };
            if rest.starts_with('.') || rest.contains('/') {
                continue;
            }
            let index = rest
                .split('.')
                .map(|s| s.parse::<usize>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|_| NetCdfError::invalid_reference(format!("bad chunk key '{}'", key)))?;
            chunks.push((index, value));
        }
        Ok(chunks)
    }

    /// Distinct source URLs referenced by byte ranges.
    pub fn source_urls(&self) -> Vec<&str> {
        let mut urls: Vec<&str> = self
            .refs
            .values()
            .filter_map(|v| match v {
                RefValue::Range(url, _, _) => Some(url.as_str()),
                RefValue::Inline(_) => None,
            })
            .collect();
        urls.sort_unstable();
        urls.dedup();
        urls
    }

    fn json_object(&self, key: &str) -> NetCdfResult<Option<Map<String, Value>>> {
        let Some(value) = self.refs.get(key) else {
            return Ok(None);
        };
        let bytes = value
            .inline_content()?
            .ok_or_else(|| NetCdfError::invalid_reference(format!("'{}' is not inline", key)))?;
        match serde_json::from_slice(&bytes)? {
            Value::Object(map) => Ok(Some(map)),
            other => Err(NetCdfError::invalid_reference(format!(
                "'{}' is not a JSON object: {}",
                key, other
            ))),
        }
    }
}

/// Zarr v2 chunk key, e.g. `var/0.3`; scalars use `var/0`.
pub fn chunk_key(name: &str, index: &[usize]) -> String {
    if index.is_empty() {
        return format!("{}/0", name);
    }
    let parts: Vec<String> = index.iter().map(|i| i.to_string()).collect();
    format!("{}/{}", name, parts.join("."))
}
