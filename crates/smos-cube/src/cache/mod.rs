//! Caching for opened L2 products.

mod product_cache;

pub use product_cache::{CacheStats, ProductCache};
