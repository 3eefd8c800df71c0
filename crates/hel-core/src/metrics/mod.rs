//! Terrain derivatives computed on the extracted DEM.
mod gradient;
pub mod focal;
pub mod slope;

pub use focal::{focal_max, focal_mean};
pub use slope::compute_slope;
