//! Common types and utilities shared across the SMOS cube crates.

pub mod bbox;
pub mod dataset;
pub mod error;
pub mod product;
pub mod time;

pub use bbox::BoundingBox;
pub use dataset::DatasetId;
pub use error::{SmosError, SmosResult};
pub use product::{ProductFile, ProductType};
pub use time::{CompactTime, TimeRange};
