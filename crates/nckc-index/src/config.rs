//! Index configuration file with environment variable substitution.
//!
//! The configuration lives in `nckc-index.json` at the index root:
//!
//! ```json
//! {
//!   "version": 2,
//!   "source_path": "EODATA",
//!   "source_protocol": "s3",
//!   "source_storage_options": {
//!     "endpoint_url": "https://eodata.dataspace.copernicus.eu",
//!     "key": "${S3_KEY}",
//!     "secret": "${S3_SECRET}"
//!   }
//! }
//! ```
//!
//! Every string in the file, object keys included, may reference environment
//! variables as `$VAR` or `${VAR}`. `$$` is a literal `$`. References to
//! unset variables are left as they are.

use serde_json::{Map, Value};

use storage::{split_protocol, SourceProtocol};

use crate::error::{NcKcError, Result};

pub const INDEX_CONFIG_FILENAME: &str = "nckc-index.json";
pub const INDEX_CONFIG_VERSION: u64 = 2;

/// Parsed index configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexConfig {
    pub version: u64,
    pub source_path: String,
    pub source_protocol: Option<String>,
    pub source_storage_options: Map<String, Value>,
}

impl IndexConfig {
    pub fn new(
        source_path: String,
        source_protocol: String,
        source_storage_options: Map<String, Value>,
    ) -> Self {
        Self {
            version: INDEX_CONFIG_VERSION,
            source_path,
            source_protocol: Some(source_protocol),
            source_storage_options,
        }
    }

    /// Parse a configuration document, substituting environment variables first.
    pub fn from_json(value: Value) -> Result<Self> {
        Self::from_json_with(value, &|name| std::env::var(name).ok())
    }

    /// Like [`IndexConfig::from_json`] with a custom variable lookup.
    pub fn from_json_with(value: Value, lookup: &dyn Fn(&str) -> Option<String>) -> Result<Self> {
        let Value::Object(config) = substitute_json(value, lookup) else {
            return Err(NcKcError::InvalidConfig(
                "index configuration must be a JSON object".to_string(),
            ));
        };

        let version = match config.get("version") {
            None => INDEX_CONFIG_VERSION,
            Some(v) => v.as_u64().ok_or_else(|| type_error("version", "integer", v))?,
        };
        let source_path = match config.get("source_path") {
            None => return Err(NcKcError::MissingParameter("source_path".to_string())),
            Some(Value::String(s)) => s.clone(),
            Some(v) => return Err(type_error("source_path", "string", v)),
        };
        let source_protocol = match config.get("source_protocol") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(v) => return Err(type_error("source_protocol", "string", v)),
        };
        let source_storage_options = match config.get("source_storage_options") {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(m)) => m.clone(),
            Some(v) => return Err(type_error("source_storage_options", "object", v)),
        };

        Ok(Self {
            version,
            source_path,
            source_protocol,
            source_storage_options,
        })
    }

    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        map.insert("version".into(), Value::from(self.version));
        map.insert("source_path".into(), Value::from(self.source_path.clone()));
        map.insert(
            "source_protocol".into(),
            self.source_protocol
                .clone()
                .map(Value::String)
                .unwrap_or(Value::Null),
        );
        map.insert(
            "source_storage_options".into(),
            Value::Object(self.source_storage_options.clone()),
        );
        Value::Object(map)
    }

    /// Protocol name: explicit, else taken from `source_path`, else `file`.
    pub fn protocol_name(&self) -> String {
        if let Some(protocol) = self.source_protocol.as_deref().filter(|p| !p.is_empty()) {
            return protocol.to_string();
        }
        split_protocol(&self.source_path)
            .0
            .unwrap_or("file")
            .to_string()
    }

    pub fn protocol(&self) -> Result<SourceProtocol> {
        Ok(self.protocol_name().parse()?)
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn type_error(param: &str, expected: &'static str, actual: &Value) -> NcKcError {
    NcKcError::InvalidParameterType {
        param: param.to_string(),
        expected,
        actual: json_type_name(actual),
    }
}

/// Split a protocol off `path` and normalise Windows separators for local paths.
///
/// Returns `(path, protocol)`; an explicit `protocol` wins over the one in `path`.
pub fn normalize_path_protocol(path: &str, protocol: Option<&str>) -> (String, String) {
    let (path_protocol, rest) = split_protocol(path);
    let protocol = protocol
        .filter(|p| !p.is_empty())
        .or(path_protocol)
        .unwrap_or("file")
        .to_string();
    let path = if matches!(protocol.as_str(), "file" | "local") {
        rest.replace('\\', "/")
    } else {
        rest.to_string()
    };
    (path, protocol)
}

/// Substitute environment variables in every string of a JSON value, keys included.
pub fn substitute_json(value: Value, lookup: &dyn Fn(&str) -> Option<String>) -> Value {
    match value {
        Value::String(s) => Value::String(substitute_text(&s, lookup)),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|v| substitute_json(v, lookup))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (substitute_text(&k, lookup), substitute_json(v, lookup)))
                .collect(),
        ),
        other => other,
    }
}

/// Safe `$VAR` / `${VAR}` substitution.
///
/// `$$` yields `$`. Unknown variables and malformed references are copied
/// unchanged.
pub fn substitute_text(text: &str, lookup: &dyn Fn(&str) -> Option<String>) -> String {
    text.split("$$")
        .map(|part| shellexpand::env_with_context_no_errors(part, |name| lookup(name)).into_owned())
        .collect::<Vec<_>>()
        .join("$")
}
