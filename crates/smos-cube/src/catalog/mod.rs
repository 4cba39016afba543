//! Catalogs of SMOS L2 products.

mod index;
mod memory;

pub use index::IndexCatalog;
pub use memory::MemoryCatalog;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use smos_common::{ProductFile, ProductType, SmosResult, TimeRange};

use crate::l2product::L2Dataset;

/// An L2 product found in a catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatasetRecord {
    /// Archive path of the product, e.g. `SMOS/L2SM/MIR_SMUDP2/2023/04/01/SM_...nc`
    pub path: String,
    pub start: DateTime<Utc>,
    pub stop: DateTime<Utc>,
}

impl DatasetRecord {
    /// Midpoint of the observation period.
    pub fn mid_time(&self) -> DateTime<Utc> {
        self.start + (self.stop - self.start) / 2
    }
}

impl From<ProductFile> for DatasetRecord {
    fn from(file: ProductFile) -> Self {
        Self {
            path: file.path,
            start: file.start,
            stop: file.stop,
        }
    }
}

/// Trait for finding and opening L2 products.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Products of `product_type` whose observation period overlaps
    /// `time_range`, sorted by start time.
    async fn find_datasets(
        &self,
        product_type: ProductType,
        time_range: &TimeRange,
    ) -> SmosResult<Vec<DatasetRecord>>;

    /// Open and decode a product.
    async fn open_dataset(&self, path: &str) -> SmosResult<L2Dataset>;

    /// Global attributes of a product without decoding its variables.
    async fn dataset_attrs(&self, path: &str) -> SmosResult<Map<String, Value>>;
}

/// Sort records by start time and drop duplicate paths.
pub(crate) fn sort_records(records: &mut Vec<DatasetRecord>) {
    records.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.path.cmp(&b.path)));
    records.dedup_by(|a, b| a.path == b.path);
}
