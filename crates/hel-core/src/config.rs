use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{HelError, Result};
use crate::units::LinearUnit;

/// Attribute names of the field (CLU) layer. Lookups ignore case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldSchema {
    pub field_id: String,
    pub tract: String,
    pub farm: String,
    pub county: String,
}

impl Default for FieldSchema {
    fn default() -> Self {
        Self {
            field_id: "CLUNBR".into(),
            tract: "TRACTNBR".into(),
            farm: "FARMNBR".into(),
            county: "COUNTYCD".into(),
        }
    }
}

/// Attribute names of the soils layer. Lookups ignore case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoilSchema {
    pub hel: String,
    pub k: String,
    pub t: String,
    pub r: String,
    pub musym: String,
}

impl Default for SoilSchema {
    fn default() -> Self {
        Self {
            hel: "MUHELCL".into(),
            k: "K".into(),
            t: "T".into(),
            r: "R".into(),
            musym: "MUSYM".into(),
        }
    }
}

/// Settings for one determination run.
///
/// `scratch_dir` has no default: the caller always names a writable
/// directory for intermediates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub scratch_dir: PathBuf,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default)]
    pub fields: Option<PathBuf>,
    #[serde(default)]
    pub soils: Vec<PathBuf>,
    #[serde(default)]
    pub dem: Option<PathBuf>,
    /// Linear unit of the field and soil coordinates.
    #[serde(default = "default_field_units")]
    pub field_units: LinearUnit,
    #[serde(default)]
    pub field_epsg: Option<u16>,
    /// Elevation unit of the DEM; defaults to its horizontal unit.
    #[serde(default)]
    pub z_units: Option<String>,
    /// Field ids to process; `None` keeps every field in the layer.
    #[serde(default)]
    pub selected_fields: Option<Vec<String>>,
    #[serde(default)]
    pub field_schema: FieldSchema,
    #[serde(default)]
    pub soil_schema: SoilSchema,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("hel_output")
}

fn default_field_units() -> LinearUnit {
    LinearUnit::Meter
}

impl RunConfig {
    /// Minimal configuration for in-memory runs.
    pub fn new(scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            scratch_dir: scratch_dir.into(),
            output_dir: default_output_dir(),
            fields: None,
            soils: Vec::new(),
            dem: None,
            field_units: default_field_units(),
            field_epsg: None,
            z_units: None,
            selected_fields: None,
            field_schema: FieldSchema::default(),
            soil_schema: SoilSchema::default(),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let cfg: RunConfig = serde_json::from_str(&text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.scratch_dir.as_os_str().is_empty() {
            return Err(HelError::Configuration("scratch_dir must name a directory".into()));
        }
        if let Some(z) = &self.z_units {
            if !z.trim().is_empty() {
                z.parse::<LinearUnit>()?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_keys() {
        let cfg: RunConfig = serde_json::from_str(r#"{ "scratch_dir": "/tmp/hel" }"#).unwrap();
        assert_eq!(cfg.output_dir, PathBuf::from("hel_output"));
        assert_eq!(cfg.field_units, LinearUnit::Meter);
        assert_eq!(cfg.field_schema.field_id, "CLUNBR");
        assert_eq!(cfg.soil_schema.hel, "MUHELCL");
        assert!(cfg.selected_fields.is_none());
    }

    #[test]
    fn scratch_dir_is_required() {
        assert!(serde_json::from_str::<RunConfig>(r#"{ "output_dir": "out" }"#).is_err());
        let blank = RunConfig::new("");
        assert!(blank.validate().is_err());
    }

    #[test]
    fn bad_z_unit_rejected() {
        let mut cfg = RunConfig::new("/tmp/hel");
        cfg.z_units = Some("Fathom".into());
        assert!(cfg.validate().is_err());
    }
}
