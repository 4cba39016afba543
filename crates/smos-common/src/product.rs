//! SMOS Level-2 product types and their archive naming conventions.

use std::sync::OnceLock;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{SmosError, SmosResult};
use crate::time::CompactTime;

pub const TYPE_ID_SM: &str = "MIR_SMUDP2";
pub const TYPE_ID_OS: &str = "MIR_OSUDP2";

/// Time and orbit part shared by all L2 product filenames.
const COMMON_NAME_PATTERN: &str =
    r"(?P<sd>\d{8})T(?P<st>\d{6})_(?P<ed>\d{8})T(?P<et>\d{6})_\d{3}_\d{3}_\d{1}";

/// A SMOS L2 user data product type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProductType {
    /// Soil moisture (`MIR_SMUDP2`)
    #[serde(rename = "MIR_SMUDP2")]
    SoilMoisture,
    /// Ocean salinity (`MIR_OSUDP2`)
    #[serde(rename = "MIR_OSUDP2")]
    OceanSalinity,
}

impl ProductType {
    pub fn all() -> &'static [ProductType] {
        &[ProductType::SoilMoisture, ProductType::OceanSalinity]
    }

    /// Accepts `SM`, `L2SM`, `MIR_SMUDP2` and the `OS` equivalents, ignoring case.
    pub fn normalize(s: &str) -> SmosResult<Self> {
        match s.to_uppercase().as_str() {
            "SM" | "L2SM" | TYPE_ID_SM => Ok(ProductType::SoilMoisture),
            "OS" | "L2OS" | TYPE_ID_OS => Ok(ProductType::OceanSalinity),
            _ => Err(SmosError::invalid_parameter(
                "product_type",
                format!("invalid product_type '{}'", s),
            )),
        }
    }

    pub fn type_id(&self) -> &'static str {
        match self {
            ProductType::SoilMoisture => TYPE_ID_SM,
            ProductType::OceanSalinity => TYPE_ID_OS,
        }
    }

    /// Short id, `SM` or `OS`.
    pub fn short_id(&self) -> &'static str {
        match self {
            ProductType::SoilMoisture => "SM",
            ProductType::OceanSalinity => "OS",
        }
    }

    /// Archive path prefix, always ending with `/`.
    pub fn path_prefix(&self) -> &'static str {
        match self {
            ProductType::SoilMoisture => "SMOS/L2SM/MIR_SMUDP2/",
            ProductType::OceanSalinity => "SMOS/L2OS/MIR_OSUDP2/",
        }
    }

    /// Path of the archive directory holding the products of one day.
    pub fn day_path(&self, date: NaiveDate) -> String {
        format!(
            "{}{:04}/{:02}/{:02}",
            self.path_prefix(),
            date.year(),
            date.month(),
            date.day()
        )
    }

    fn name_regex(&self) -> &'static Regex {
        static SM: OnceLock<Regex> = OnceLock::new();
        static OS: OnceLock<Regex> = OnceLock::new();
        let (cell, type_id) = match self {
            ProductType::SoilMoisture => (&SM, TYPE_ID_SM),
            ProductType::OceanSalinity => (&OS, TYPE_ID_OS),
        };
        cell.get_or_init(|| {
            Regex::new(&format!(
                r"^SM_(OPER|REPR)_{}_{}",
                type_id, COMMON_NAME_PATTERN
            ))
            .expect("static product name pattern")
        })
    }

    /// Parse a product filename (or a path ending in one).
    ///
    /// Returns `None` if the name does not belong to this product type.
    pub fn parse_filename(&self, path: &str) -> Option<ProductFile> {
        let name = path.rsplit('/').next().unwrap_or(path);
        let caps = self.name_regex().captures(name)?;
        let start = format!("{}{}", &caps["sd"], &caps["st"]);
        let stop = format!("{}{}", &caps["ed"], &caps["et"]);
        let start = CompactTime::parse(&start).ok()?;
        let stop = CompactTime::parse(&stop).ok()?;
        Some(ProductFile {
            product_type: *self,
            path: path.to_string(),
            start,
            stop,
        })
    }
}

impl std::fmt::Display for ProductType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.type_id())
    }
}

/// A product file path together with the observation period from its name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductFile {
    pub product_type: ProductType,
    pub path: String,
    pub start: DateTime<Utc>,
    pub stop: DateTime<Utc>,
}
