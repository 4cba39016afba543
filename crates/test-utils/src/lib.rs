//! Shared test utilities for the SMOS cube workspace.
//!
//! Generators write synthetic inputs to disk: DGG tile pyramids whose
//! pixels carry known seqnums, and small Level-2 NetCDF products. The
//! fixtures hold archive filenames and bounding boxes used across tests.
//!
//! ```ignore
//! use test_utils::{fixtures, write_l2_product, L2Fixture};
//!
//! let key = fixtures::products::sm_product_key("20230401000000", "20230401005000");
//! write_l2_product(&root.join(&key), &L2Fixture::soil_moisture(ids, values))?;
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::*;
pub use generators::*;

/// Assert that two numbers differ by at most `tolerance`.
///
/// Operands are compared as `f64`, so `f32` values and integers work too.
#[macro_export]
macro_rules! assert_approx_eq {
    ($actual:expr, $expected:expr, $tolerance:expr $(,)?) => {{
        let (actual, expected, tolerance) = ($actual as f64, $expected as f64, $tolerance as f64);
        assert!(
            (actual - expected).abs() <= tolerance,
            "{} = {} is not within {} of {}",
            stringify!($actual),
            actual,
            tolerance,
            expected
        );
    }};
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_assert_approx_eq() {
        assert_approx_eq!(0.1_f32 + 0.2_f32, 0.3, 1e-6);
        assert_approx_eq!(-5.5, -5.500001, 1e-4);
    }

    #[test]
    #[should_panic(expected = "is not within")]
    fn test_assert_approx_eq_fails() {
        assert_approx_eq!(1.1, 1.0, 0.001);
    }
}
