//! Identifiers of the published SMOS L2C data cubes.

use serde::{Deserialize, Serialize};

use crate::error::{SmosError, SmosResult};
use crate::product::ProductType;

/// Variables of the ocean salinity cube.
pub const OS_VAR_NAMES: &[&str] = &[
    "Mean_acq_time",
    "SSS_corr",
    "Sigma_SSS_corr",
    "SSS_anom",
    "Sigma_SSS_anom",
    "Dg_chi2_corr",
    "Dg_quality_SSS_corr",
    "Dg_quality_SSS_anom",
    "Coast_distance",
    "Dg_RFI_X",
    "Dg_RFI_Y",
    "X_swath",
];

/// Variables of the soil moisture cube.
pub const SM_VAR_NAMES: &[&str] = &[
    "Mean_acq_time",
    "Soil_Moisture",
    "Soil_Moisture_DQX",
    "Chi_2",
    "Chi_2_P",
    "N_RFI_X",
    "N_RFI_Y",
    "RFI_Prob",
    "X_swath",
];

/// A data cube offered by the SMOS store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DatasetId {
    #[serde(rename = "SMOS-L2C-SM")]
    L2cSm,
    #[serde(rename = "SMOS-L2C-OS")]
    L2cOs,
}

impl DatasetId {
    pub fn all() -> &'static [DatasetId] {
        &[DatasetId::L2cSm, DatasetId::L2cOs]
    }

    pub fn parse(s: &str) -> SmosResult<Self> {
        Self::all()
            .iter()
            .copied()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| SmosError::UnknownDataId(s.to_string()))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetId::L2cSm => "SMOS-L2C-SM",
            DatasetId::L2cOs => "SMOS-L2C-OS",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            DatasetId::L2cSm => "SMOS Level-2C Soil Moisture",
            DatasetId::L2cOs => "SMOS Level-2C Ocean Salinity",
        }
    }

    pub fn product_type(&self) -> ProductType {
        match self {
            DatasetId::L2cSm => ProductType::SoilMoisture,
            DatasetId::L2cOs => ProductType::OceanSalinity,
        }
    }

    pub fn var_names(&self) -> &'static [&'static str] {
        match self {
            DatasetId::L2cSm => SM_VAR_NAMES,
            DatasetId::L2cOs => OS_VAR_NAMES,
        }
    }

    pub fn has_var(&self, name: &str) -> bool {
        self.var_names().contains(&name)
    }
}

impl std::fmt::Display for DatasetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_product_type() {
        let id = DatasetId::parse("SMOS-L2C-OS").unwrap();
        assert_eq!(id.product_type(), ProductType::OceanSalinity);
        assert!(id.has_var("SSS_corr"));
        assert!(!id.has_var("Soil_Moisture"));
    }

    #[test]
    fn test_unknown_id() {
        let err = DatasetId::parse("SMOS-L3-OS").unwrap_err();
        assert_eq!(err.to_string(), "Unknown dataset identifier 'SMOS-L3-OS'");
    }
}
