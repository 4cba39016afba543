//! Registration of the SMOS store and its openers with a host registry.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use smos_common::{SmosError, SmosResult};

use super::{DataType, SmosDataStore, SMOS_DATA_STORE_ID};
use crate::config::CubeConfig;

/// Parameters for creating a store through the registry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreParams {
    /// Index path; `$SMOS_INDEX_PATH` if not given
    #[serde(default)]
    pub index_path: Option<PathBuf>,
    /// DGG path; `$SMOS_DGG_PATH` if not given
    #[serde(default)]
    pub dgg_path: Option<PathBuf>,
}

impl StoreParams {
    /// Merge with the environment configuration.
    pub fn to_config(&self) -> CubeConfig {
        let mut config = CubeConfig::from_env();
        if let Some(path) = &self.index_path {
            config.index_path = Some(path.clone());
        }
        if let Some(path) = &self.dgg_path {
            config.dgg_path = Some(path.clone());
        }
        config
    }
}

/// Creates a data store from store parameters.
pub type StoreFactory = Arc<dyn Fn(&StoreParams) -> SmosResult<SmosDataStore> + Send + Sync>;

struct StoreEntry {
    description: String,
    factory: StoreFactory,
}

/// A registered data opener.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpenerInfo {
    pub opener_id: String,
    pub data_store_id: String,
    pub description: String,
}

/// Registry of data stores and data openers offered by plugins.
#[derive(Default)]
pub struct DataStoreRegistry {
    stores: BTreeMap<String, StoreEntry>,
    openers: BTreeMap<String, OpenerInfo>,
}

impl std::fmt::Debug for DataStoreRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataStoreRegistry")
            .field("stores", &self.stores.keys().collect::<Vec<_>>())
            .field("openers", &self.openers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl DataStoreRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_store(&mut self, store_id: &str, description: &str, factory: StoreFactory) {
        debug!(store_id, "Registered data store");
        self.stores.insert(
            store_id.to_string(),
            StoreEntry {
                description: description.to_string(),
                factory,
            },
        );
    }

    pub fn register_opener(&mut self, opener_id: &str, data_store_id: &str, description: &str) {
        debug!(opener_id, "Registered data opener");
        self.openers.insert(
            opener_id.to_string(),
            OpenerInfo {
                opener_id: opener_id.to_string(),
                data_store_id: data_store_id.to_string(),
                description: description.to_string(),
            },
        );
    }

    pub fn store_ids(&self) -> Vec<&str> {
        self.stores.keys().map(String::as_str).collect()
    }

    pub fn store_description(&self, store_id: &str) -> Option<&str> {
        self.stores.get(store_id).map(|e| e.description.as_str())
    }

    pub fn opener_ids(&self) -> Vec<&str> {
        self.openers.keys().map(String::as_str).collect()
    }

    pub fn opener(&self, opener_id: &str) -> Option<&OpenerInfo> {
        self.openers.get(opener_id)
    }

    /// Create a store by id.
    pub fn new_data_store(&self, store_id: &str, params: &StoreParams) -> SmosResult<SmosDataStore> {
        let entry = self.stores.get(store_id).ok_or_else(|| {
            SmosError::invalid_parameter("data_store_id", format!("unknown data store '{}'", store_id))
        })?;
        (entry.factory)(params)
    }
}

/// Register the SMOS store and its three openers.
pub fn register_plugin(registry: &mut DataStoreRegistry) {
    registry.register_store(
        SMOS_DATA_STORE_ID,
        "SMOS L2 data store",
        Arc::new(|params: &StoreParams| SmosDataStore::from_config(&params.to_config())),
    );
    for data_type in DataType::all() {
        let description = match data_type {
            DataType::Dataset => "SMOS L2 dataset opener",
            DataType::MlDataset => "SMOS L2 multi-level dataset opener",
            DataType::DsIter => "SMOS L2 dataset iterator opener",
        };
        registry.register_opener(&data_type.opener_id(), SMOS_DATA_STORE_ID, description);
    }
}
