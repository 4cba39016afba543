//! Loading of L2 products per time step.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, instrument};

use smos_common::{SmosError, SmosResult};

use crate::cache::{CacheStats, ProductCache};
use crate::catalog::{Catalog, DatasetRecord};
use crate::dgg::SeqnumGrid;
use crate::l2product::L2Product;

/// Opens the L2 product of each time step of a cube.
pub struct TimeStepLoader {
    catalog: Arc<dyn Catalog>,
    dgg: Arc<dyn SeqnumGrid>,
    records: Vec<DatasetRecord>,
    cache: Mutex<ProductCache>,
}

impl std::fmt::Debug for TimeStepLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeStepLoader")
            .field("num_time_steps", &self.records.len())
            .field("cache_capacity", &self.lock_cache().capacity())
            .finish()
    }
}

impl TimeStepLoader {
    /// Create a loader keeping up to `cache_size` products open.
    pub fn new(
        catalog: Arc<dyn Catalog>,
        dgg: Arc<dyn SeqnumGrid>,
        records: Vec<DatasetRecord>,
        cache_size: usize,
    ) -> Self {
        Self {
            catalog,
            dgg,
            records,
            cache: Mutex::new(ProductCache::new(cache_size)),
        }
    }

    pub fn records(&self) -> &[DatasetRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn catalog(&self) -> &Arc<dyn Catalog> {
        &self.catalog
    }

    pub fn dgg(&self) -> &Arc<dyn SeqnumGrid> {
        &self.dgg
    }

    pub fn record(&self, time_index: usize) -> SmosResult<&DatasetRecord> {
        self.records.get(time_index).ok_or_else(|| {
            SmosError::invalid_parameter(
                "time_index",
                format!("{} out of range 0..{}", time_index, self.records.len()),
            )
        })
    }

    /// The L2 product of a time step, from the cache if possible.
    #[instrument(skip(self))]
    pub async fn product(&self, time_index: usize) -> SmosResult<Arc<L2Product>> {
        let record = self.record(time_index)?;
        let cached = self.lock_cache().get(time_index);
        if let Some(product) = cached {
            return Ok(product);
        }

        let dataset = self.catalog.open_dataset(&record.path).await?;
        let product = Arc::new(L2Product::new(Arc::clone(&self.dgg), dataset)?);
        debug!(path = %record.path, rows = product.num_rows(), "Opened L2 product");
        self.lock_cache().insert(time_index, Arc::clone(&product));
        Ok(product)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.lock_cache().stats()
    }

    fn lock_cache(&self) -> MutexGuard<'_, ProductCache> {
        self.cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
