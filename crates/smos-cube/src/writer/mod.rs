//! Zarr V3 output of SMOS cubes.

mod cube_writer;

pub use cube_writer::{CubeWriter, WriteReport};
