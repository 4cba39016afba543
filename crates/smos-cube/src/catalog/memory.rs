//! In-memory catalog.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{Map, Value};

use smos_common::{ProductType, SmosError, SmosResult, TimeRange};

use super::{sort_records, Catalog, DatasetRecord};
use crate::l2product::L2Dataset;

/// A catalog of already decoded products, keyed by archive path.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    products: HashMap<String, (ProductType, DatasetRecord, L2Dataset)>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a product; its period is parsed from the filename in `path`.
    pub fn insert(&mut self, path: &str, dataset: L2Dataset) -> SmosResult<()> {
        let file = ProductType::all()
            .iter()
            .find_map(|pt| pt.parse_filename(path))
            .ok_or_else(|| {
                SmosError::invalid_parameter("path", format!("not an L2 product: {}", path))
            })?;
        self.products.insert(
            path.to_string(),
            (file.product_type, DatasetRecord::from(file), dataset),
        );
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    fn get(&self, path: &str) -> SmosResult<&L2Dataset> {
        self.products
            .get(path)
            .map(|(_, _, dataset)| dataset)
            .ok_or_else(|| SmosError::DataReadError(format!("Dataset not found: {}", path)))
    }
}

#[async_trait]
impl Catalog for MemoryCatalog {
    async fn find_datasets(
        &self,
        product_type: ProductType,
        time_range: &TimeRange,
    ) -> SmosResult<Vec<DatasetRecord>> {
        let mut records: Vec<DatasetRecord> = self
            .products
            .values()
            .filter(|(pt, record, _)| {
                *pt == product_type && time_range.overlaps(&record.start, &record.stop)
            })
            .map(|(_, record, _)| record.clone())
            .collect();
        sort_records(&mut records);
        Ok(records)
    }

    async fn open_dataset(&self, path: &str) -> SmosResult<L2Dataset> {
        self.get(path).cloned()
    }

    async fn dataset_attrs(&self, path: &str) -> SmosResult<Map<String, Value>> {
        Ok(self.get(path)?.attrs.clone())
    }
}
