//! LRU cache for opened L2 products, keyed by time index.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use lru::LruCache;
use serde::Serialize;

use crate::l2product::L2Product;

/// Cache statistics for monitoring.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub evictions: u64,
}

/// LRU cache of L2 products. A capacity of 0 disables caching.
pub struct ProductCache {
    cache: Option<LruCache<usize, Arc<L2Product>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl ProductCache {
    /// Create a cache holding at most `capacity` products.
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: NonZeroUsize::new(capacity).map(LruCache::new),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Try to get a product from the cache.
    pub fn get(&mut self, time_index: usize) -> Option<Arc<L2Product>> {
        match self.cache.as_mut().and_then(|c| c.get(&time_index)) {
            Some(product) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(Arc::clone(product))
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Insert a product, evicting the least recently used one when full.
    pub fn insert(&mut self, time_index: usize, product: Arc<L2Product>) {
        if let Some(cache) = self.cache.as_mut() {
            if let Some((evicted, _)) = cache.push(time_index, product) {
                if evicted != time_index {
                    self.evictions.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.len(),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    pub fn clear(&mut self) {
        if let Some(cache) = self.cache.as_mut() {
            cache.clear();
        }
    }

    pub fn capacity(&self) -> usize {
        self.cache.as_ref().map_or(0, |c| c.cap().get())
    }

    pub fn len(&self) -> usize {
        self.cache.as_ref().map_or(0, |c| c.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dgg::{InMemoryDgg, SeqnumGrid};
    use crate::l2product::{L2Dataset, L2Variable, GRID_POINT_ID_VAR};
    use netcdf_refs::ArrayData;

    fn product() -> Arc<L2Product> {
        let dgg: Arc<dyn SeqnumGrid> = Arc::new(InMemoryDgg::new(vec![1, 2], 2, 1, 1).unwrap());
        let dataset = L2Dataset {
            attrs: Default::default(),
            variables: vec![L2Variable {
                name: GRID_POINT_ID_VAR.to_string(),
                dims: vec!["n_grid_points".to_string()],
                data: ArrayData::U32(vec![1]),
                attrs: Default::default(),
                fill_value: None,
            }],
        };
        Arc::new(L2Product::new(dgg, dataset).unwrap())
    }

    #[test]
    fn test_cache_insert_and_get() {
        let mut cache = ProductCache::new(2);
        assert!(cache.get(0).is_none());
        let p = product();
        cache.insert(0, Arc::clone(&p));
        assert!(Arc::ptr_eq(&cache.get(0).unwrap(), &p));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
    }

    #[test]
    fn test_cache_lru_eviction() {
        let mut cache = ProductCache::new(2);
        for i in 0..3 {
            cache.insert(i, product());
        }
        assert!(cache.get(0).is_none());
        assert!(cache.get(2).is_some());
        assert_eq!(cache.stats().evictions, 1);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_disabled_cache() {
        let mut cache = ProductCache::new(0);
        cache.insert(0, product());
        assert!(cache.get(0).is_none());
        assert!(cache.is_empty());
        assert_eq!(cache.capacity(), 0);
    }

    #[test]
    fn test_cache_clear() {
        let mut cache = ProductCache::new(4);
        cache.insert(0, product());
        assert!(!cache.is_empty());
        cache.clear();
        assert!(cache.is_empty());
    }
}
