//! Error taxonomy for a determination run.
//!
//! Every variant is fatal for the run it occurs in; the orchestrator logs it
//! at error severity, releases scratch resources and returns it unchanged.
use std::path::PathBuf;

use thiserror::Error;

/// Coarse classification used by callers to decide how to report a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Input geometry, DEM or selection violates a processing precondition.
    Precondition,
    /// Attribute data is missing or outside its domain.
    DataQuality,
    /// A capability or resource needed to run at all is unavailable.
    Environment,
    /// Units or settings cannot be resolved.
    Configuration,
    /// Reading or writing an artifact failed.
    Io,
}

#[derive(Debug, Error)]
pub enum HelError {
    #[error("DEM {name} must be in a projected coordinate system")]
    NotProjected { name: String },

    #[error("cell size of {name} is {cell_size} {unit}; it must be {target} {unit} or finer")]
    CellTooCoarse {
        name: String,
        cell_size: f64,
        target: f64,
        unit: String,
    },

    #[error("could not determine {what} of DEM {name}")]
    UndeterminedDem { name: String, what: &'static str },

    #[error("DEM {name} is in {dem}, fields are in {fields}; local DEMs are never reprojected")]
    CoordinateMismatch {
        name: String,
        dem: String,
        fields: String,
    },

    #[error("selected fields span {count} different {what} numbers: {values:?}")]
    MultipleOwners {
        what: &'static str,
        count: usize,
        values: Vec<String>,
    },

    #[error("no fields selected")]
    EmptySelection,

    #[error("there is no overlap between the soils layer and the selected fields")]
    NoOverlap,

    #[error("DEM does not cover the buffered field extent")]
    DemOutsideExtent,

    #[error("soil layer {layer} is missing attribute {attribute}")]
    MissingAttribute { layer: String, attribute: String },

    #[error("{null_count} soil polygon(s) have no HEL value; invalid HEL values: {invalid:?}")]
    InvalidHelCategory {
        null_count: usize,
        invalid: Vec<String>,
    },

    #[error("soil polygon {soil} ({musym}) has invalid {factor} factor {value}")]
    InvalidFactor {
        soil: usize,
        musym: String,
        factor: &'static str,
        value: f64,
    },

    #[error("unknown linear unit {0:?}")]
    UnknownUnit(String),

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("{0} is unavailable")]
    Unavailable(String),

    #[error("scratch workspace {path} is not usable: {source}")]
    Scratch {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported input: {0}")]
    Unsupported(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    GeoJson(#[from] Box<geojson::Error>),

    #[error(transparent)]
    Tiff(#[from] tiff::TiffError),
}

impl From<geojson::Error> for HelError {
    fn from(e: geojson::Error) -> Self {
        HelError::GeoJson(Box::new(e))
    }
}

impl HelError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            HelError::NotProjected { .. }
            | HelError::CellTooCoarse { .. }
            | HelError::UndeterminedDem { .. }
            | HelError::CoordinateMismatch { .. }
            | HelError::MultipleOwners { .. }
            | HelError::EmptySelection
            | HelError::NoOverlap
            | HelError::DemOutsideExtent
            | HelError::MissingAttribute { .. }
            | HelError::Unsupported(_) => ErrorKind::Precondition,
            HelError::InvalidHelCategory { .. } | HelError::InvalidFactor { .. } => {
                ErrorKind::DataQuality
            }
            HelError::UnknownUnit(_) | HelError::Configuration(_) => ErrorKind::Configuration,
            HelError::Unavailable(_) | HelError::Scratch { .. } => ErrorKind::Environment,
            HelError::Io(_)
            | HelError::Json(_)
            | HelError::GeoJson(_)
            | HelError::Tiff(_) => ErrorKind::Io,
        }
    }
}

pub type Result<T> = std::result::Result<T, HelError>;
