//! Configuration for opening SMOS cubes.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use storage::DEFAULT_MAX_RETRIES;

/// Environment variable naming the NetCDF Kerchunk index.
pub const INDEX_PATH_ENV: &str = "SMOS_INDEX_PATH";

/// Environment variable naming the DGG tile pyramid.
pub const DGG_PATH_ENV: &str = "SMOS_DGG_PATH";

/// Configuration for the SMOS data store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CubeConfig {
    /// Path of the NetCDF Kerchunk index (directory or `.zip`).
    pub index_path: Option<PathBuf>,

    /// Root directory of the DGG tile pyramid.
    pub dgg_path: Option<PathBuf>,

    /// Default number of L2 products kept open per cube; 0 disables caching.
    pub l2_product_cache_size: usize,

    /// Retries for reads from the source archive.
    pub storage_max_retries: u32,
}

impl Default for CubeConfig {
    fn default() -> Self {
        Self {
            index_path: None,
            dgg_path: None,
            l2_product_cache_size: 0,
            storage_max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl CubeConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var(INDEX_PATH_ENV) {
            if !val.is_empty() {
                config.index_path = Some(PathBuf::from(val));
            }
        }

        if let Ok(val) = std::env::var(DGG_PATH_ENV) {
            if !val.is_empty() {
                config.dgg_path = Some(PathBuf::from(val));
            }
        }

        if let Ok(val) = std::env::var("SMOS_L2_PRODUCT_CACHE_SIZE") {
            if let Ok(size) = val.parse() {
                config.l2_product_cache_size = size;
            }
        }

        if let Ok(val) = std::env::var("SMOS_STORAGE_MAX_RETRIES") {
            if let Ok(retries) = val.parse() {
                config.storage_max_retries = retries;
            }
        }

        config
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(path) = &self.dgg_path {
            if !path.is_dir() {
                return Err(format!("SMOS DGG not found: {}", path.display()));
            }
        }
        Ok(())
    }
}
