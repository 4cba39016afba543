//! Common test fixtures for SMOS tests.

/// Common bounding box definitions for testing, as `[min_lon, min_lat, max_lon, max_lat]`.
pub mod bbox {
    /// Global bounding box
    pub const GLOBAL: [f64; 4] = [-180.0, -90.0, 180.0, 90.0];

    /// Europe
    pub const EUROPE: [f64; 4] = [-15.0, 35.0, 45.0, 72.0];

    /// Invalid bbox (min > max)
    pub const INVALID: [f64; 4] = [10.0, 10.0, 5.0, 5.0];
}

/// Product filenames as found in the SMOS archive.
pub mod products {
    /// `20230401150613` becomes `20230401T150613`.
    fn name_time(compact: &str) -> String {
        format!("{}T{}", &compact[0..8], &compact[8..])
    }

    /// Filename of a soil moisture product for the given compact start/stop times.
    pub fn sm_product_name(start: &str, stop: &str) -> String {
        format!(
            "SM_OPER_MIR_SMUDP2_{}_{}_700_001_1.nc",
            name_time(start),
            name_time(stop)
        )
    }

    /// Filename of an ocean salinity product for the given compact start/stop times.
    pub fn os_product_name(start: &str, stop: &str) -> String {
        format!(
            "SM_OPER_MIR_OSUDP2_{}_{}_662_001_1.nc",
            name_time(start),
            name_time(stop)
        )
    }

    /// Archive key of a soil moisture product, e.g. `SMOS/L2SM/MIR_SMUDP2/2023/04/01/...`.
    pub fn sm_product_key(start: &str, stop: &str) -> String {
        format!(
            "SMOS/L2SM/MIR_SMUDP2/{}/{}/{}/{}",
            &start[0..4],
            &start[4..6],
            &start[6..8],
            sm_product_name(start, stop)
        )
    }

    /// Archive key of an ocean salinity product.
    pub fn os_product_key(start: &str, stop: &str) -> String {
        format!(
            "SMOS/L2OS/MIR_OSUDP2/{}/{}/{}/{}",
            &start[0..4],
            &start[4..6],
            &start[6..8],
            os_product_name(start, stop)
        )
    }
}
