//! Linear unit resolution: Z-factor and acre conversion constants.
//!
//! Everything here is a pure function of unit names.
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{HelError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LinearUnit {
    Meter,
    Foot,
    Centimeter,
    Inch,
}

impl LinearUnit {
    pub const ALL: [LinearUnit; 4] = [
        LinearUnit::Meter,
        LinearUnit::Foot,
        LinearUnit::Centimeter,
        LinearUnit::Inch,
    ];

    fn index(self) -> usize {
        match self {
            LinearUnit::Meter => 0,
            LinearUnit::Foot => 1,
            LinearUnit::Centimeter => 2,
            LinearUnit::Inch => 3,
        }
    }

    /// Length of one unit in metres.
    pub fn meters(self) -> f64 {
        match self {
            LinearUnit::Meter => 1.0,
            LinearUnit::Foot => 0.3048,
            LinearUnit::Centimeter => 0.01,
            LinearUnit::Inch => 0.0254,
        }
    }

    /// Factor converting a length in this unit to feet.
    pub fn feet(self) -> f64 {
        match self {
            LinearUnit::Meter => 3.280839896,
            LinearUnit::Foot => 1.0,
            LinearUnit::Centimeter => 0.03280839896,
            LinearUnit::Inch => 1.0 / 12.0,
        }
    }

    /// Square units in one acre.
    pub fn square_units_per_acre(self) -> f64 {
        match self {
            LinearUnit::Meter => 4046.8564224,
            LinearUnit::Foot => 43560.0,
            LinearUnit::Centimeter => 40_468_564.224,
            LinearUnit::Inch => 6_272_640.0,
        }
    }

    /// Express a length given in metres in this unit.
    pub fn from_meters(self, meters: f64) -> f64 {
        meters / self.meters()
    }

    /// Parse a unit name, falling back to a `Configuration` error.
    pub fn parse(name: &str) -> Result<Self> {
        name.parse()
    }
}

impl FromStr for LinearUnit {
    type Err = HelError;

    fn from_str(s: &str) -> Result<Self> {
        let key = s.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        match key.as_str() {
            "meter" | "meters" | "metre" | "metres" | "m" => Ok(LinearUnit::Meter),
            "foot" | "feet" | "foot_us" | "us_survey_foot" | "ft" | "us_ft" => Ok(LinearUnit::Foot),
            "centimeter" | "centimeters" | "centimetre" | "cm" => Ok(LinearUnit::Centimeter),
            "inch" | "inches" | "in" => Ok(LinearUnit::Inch),
            _ => Err(HelError::UnknownUnit(s.to_string())),
        }
    }
}

impl fmt::Display for LinearUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LinearUnit::Meter => "Meter",
            LinearUnit::Foot => "Foot",
            LinearUnit::Centimeter => "Centimeter",
            LinearUnit::Inch => "Inch",
        };
        f.write_str(name)
    }
}

// ── Z-factor matrix ───────────────────────────────────────────────────────────

/// Rows: horizontal (XY) unit. Columns: elevation (Z) unit.
///
/// ```text
///                 Meter    Foot     Centimeter  Inch
///   Meter         1        0.3048   0.01        0.0254
///   Foot          3.28084  1        0.0328084   0.083333
///   Centimeter    100      30.48    1           2.54
///   Inch          39.3701  12       0.393701    1
/// ```
const Z_FACTOR: [[f64; 4]; 4] = [
    [1.0, 0.3048, 0.01, 0.0254],
    [3.28084, 1.0, 0.0328084, 0.083333],
    [100.0, 30.48, 1.0, 2.54],
    [39.3701, 12.0, 0.393701, 1.0],
];

/// Multiplier that expresses an elevation in `z` units in `xy` units, so that
/// rise/run is dimensionless.
pub fn z_factor(xy: LinearUnit, z: LinearUnit) -> f64 {
    Z_FACTOR[xy.index()][z.index()]
}

/// Resolved unit constants for one DEM.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct UnitResolution {
    pub xy: LinearUnit,
    pub z: LinearUnit,
    /// True when no elevation unit was supplied and the XY unit was used.
    pub z_defaulted: bool,
    pub z_factor: f64,
    pub square_units_per_acre: f64,
}

/// Resolve the XY unit name and optional Z unit name of a DEM.
///
/// Unknown names are a fatal configuration error.
pub fn resolve(xy: &str, z: Option<&str>) -> Result<UnitResolution> {
    let xy_unit: LinearUnit = xy.parse()?;
    let (z_unit, z_defaulted) = match z.map(str::trim).filter(|s| !s.is_empty()) {
        Some(name) => (name.parse()?, false),
        None => (xy_unit, true),
    };
    Ok(UnitResolution::new(xy_unit, z_unit, z_defaulted))
}

impl UnitResolution {
    pub fn new(xy: LinearUnit, z: LinearUnit, z_defaulted: bool) -> Self {
        Self {
            xy,
            z,
            z_defaulted,
            z_factor: z_factor(xy, z),
            square_units_per_acre: xy.square_units_per_acre(),
        }
    }

    /// Convert an area in square XY units to acres.
    pub fn acres(&self, area: f64) -> f64 {
        area / self.square_units_per_acre
    }
}
