//! Named records shared by every stage of a determination run.
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{HelError, Result};
use crate::geometry::Polygon;

/// Soil-delineation label carried by the soils layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum HelCategory {
    #[serde(rename = "HEL")]
    Hel,
    #[serde(rename = "NHEL")]
    Nhel,
    #[serde(rename = "PHEL")]
    Phel,
}

impl HelCategory {
    pub const ALL: [HelCategory; 3] = [HelCategory::Hel, HelCategory::Nhel, HelCategory::Phel];

    /// Cell value used when the category is rasterized. `0` is no-data.
    pub fn raster_code(self) -> u8 {
        match self {
            HelCategory::Hel => 1,
            HelCategory::Nhel => 2,
            HelCategory::Phel => 3,
        }
    }

    pub fn from_raster_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(HelCategory::Hel),
            2 => Some(HelCategory::Nhel),
            3 => Some(HelCategory::Phel),
            _ => None,
        }
    }

    /// Parse an attribute value. Surrounding whitespace and case are ignored.
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_uppercase().as_str() {
            "HEL" => Some(HelCategory::Hel),
            "NHEL" => Some(HelCategory::Nhel),
            "PHEL" => Some(HelCategory::Phel),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HelCategory::Hel => "HEL",
            HelCategory::Nhel => "NHEL",
            HelCategory::Phel => "PHEL",
        }
    }
}

impl fmt::Display for HelCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Binary outcome for a delineation or field; also the reclassified raster
/// class (`Nhel = 1`, `Hel = 2`, `0` = no-data).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Determination {
    #[serde(rename = "HEL")]
    Hel,
    #[serde(rename = "NHEL")]
    Nhel,
}

impl Determination {
    pub fn class_code(self) -> u8 {
        match self {
            Determination::Nhel => 1,
            Determination::Hel => 2,
        }
    }

    pub fn from_class_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Determination::Nhel),
            2 => Some(Determination::Hel),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Determination::Hel => "HEL",
            Determination::Nhel => "NHEL",
        }
    }
}

impl fmt::Display for Determination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// One Common Land Unit after dissolving all of its input features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub id: String,
    pub tract: String,
    pub farm: String,
    pub county: String,
    pub geometry: Vec<Polygon>,
    /// `CALCACRES`: planar area converted with the field layer's unit.
    pub acres: f64,
}

impl Field {
    pub fn area(&self) -> f64 {
        self.geometry.iter().map(Polygon::area).sum()
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        self.geometry.iter().any(|p| p.contains(x, y))
    }
}

/// Single-part soil polygon with a validated category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoilPolygon {
    pub layer: String,
    pub musym: String,
    pub category: HelCategory,
    pub k: f64,
    pub t: f64,
    pub r: f64,
    pub geometry: Polygon,
}

impl SoilPolygon {
    /// Ensure the factors the erosion formula needs are usable.
    ///
    /// Only PHEL delineations ever reach the formula; HEL and NHEL carry
    /// whatever the layer holds.
    pub fn check_factors(&self, index: usize) -> Result<()> {
        if self.category != HelCategory::Phel {
            return Ok(());
        }
        for (factor, value) in [("K", self.k), ("T", self.t), ("R", self.r)] {
            if !value.is_finite() || value <= 0.0 {
                return Err(HelError::InvalidFactor {
                    soil: index,
                    musym: self.musym.clone(),
                    factor,
                    value,
                });
            }
        }
        Ok(())
    }
}

/// Single-part piece of a field × soil intersection. `id` is the zone id
/// used for rasterization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delineation {
    pub id: u32,
    pub field_id: String,
    pub soil_index: usize,
    pub musym: String,
    pub category: HelCategory,
    pub k: f64,
    pub t: f64,
    pub r: f64,
    pub acres: f64,
    /// Disjoint pieces covering the delineation.
    #[serde(skip)]
    pub geometry: Vec<Polygon>,
}

/// Initial HEL Summary row: a field's input acres for one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitialSummaryRow {
    pub field_id: String,
    pub category: HelCategory,
    pub acres: f64,
    pub percent: f64,
}

/// Final HEL Summary row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelineationResult {
    pub id: u32,
    pub field_id: String,
    pub musym: String,
    pub category: HelCategory,
    pub polygon_acres: f64,
    pub final_hel_acres: f64,
    pub final_hel_percent: f64,
    pub final_value: Determination,
}

/// How a field's acres were obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeterminationSource {
    /// Input soil categories alone.
    Vector,
    /// Zonal tabulation of the LiDAR HEL raster.
    Terrain,
}

/// Field Determination row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDetermination {
    pub field_id: String,
    pub tract: String,
    pub farm: String,
    pub county: String,
    pub acres: f64,
    pub hel_acres: f64,
    pub hel_percent: f64,
    pub nhel_acres: f64,
    pub nhel_percent: f64,
    pub determination: Determination,
    pub source: DeterminationSource,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_parse_is_lenient_on_case_only() {
        assert_eq!(HelCategory::parse(" phel "), Some(HelCategory::Phel));
        assert_eq!(HelCategory::parse("Nhel"), Some(HelCategory::Nhel));
        assert_eq!(HelCategory::parse("N HEL"), None);
        assert_eq!(HelCategory::parse(""), None);
    }

    #[test]
    fn raster_codes_round_trip_and_reserve_zero() {
        for c in HelCategory::ALL {
            assert_ne!(c.raster_code(), 0);
            assert_eq!(HelCategory::from_raster_code(c.raster_code()), Some(c));
        }
        assert_eq!(Determination::from_class_code(0), None);
    }

    #[test]
    fn phel_requires_positive_factors() {
        let mut soil = SoilPolygon {
            layer: "soils".into(),
            musym: "CaB".into(),
            category: HelCategory::Phel,
            k: 0.3,
            t: 0.0,
            r: 150.0,
            geometry: Polygon::rect(0.0, 0.0, 1.0, 1.0),
        };
        let err = soil.check_factors(4).unwrap_err();
        assert!(matches!(err, HelError::InvalidFactor { factor: "T", soil: 4, .. }));

        soil.category = HelCategory::Hel;
        assert!(soil.check_factors(4).is_ok());
    }
}
