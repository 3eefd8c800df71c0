//! Highly Erodible Land (HEL) determination.
//!
//! Fields and soil delineations are overlaid and screened from their vector
//! categories; when that is not decisive, a DEM is turned into slope, flow
//! length and RKLS erosion rasters that are tabulated back onto delineations
//! and fields. [`pipeline::HelDetermination`] runs the whole sequence.
pub mod classify;
pub mod config;
pub mod erosion;
pub mod error;
pub mod geometry;
pub mod gridfile;
pub mod hydraulic;
pub mod ingest;
pub mod metrics;
pub mod model;
pub mod overlay;
pub mod pipeline;
pub mod raster;
pub mod report;
pub mod scratch;
pub mod sink;
pub mod terrain;
pub mod units;
pub mod zonal;

pub use error::{ErrorKind, HelError, Result};
pub use pipeline::{HelDetermination, RunOutcome, RunPath};
