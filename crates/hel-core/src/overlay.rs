//! Field × soil overlay and the per-field category acreage it implies.
use tracing::{debug, info};

use crate::classify::clamp_percent;
use crate::error::{HelError, Result};
use crate::geometry::overlap_parts;
use crate::model::{Delineation, Field, HelCategory, InitialSummaryRow, SoilPolygon};
use crate::units::LinearUnit;

/// Intersect every selected field with every soil polygon and explode the
/// result into single parts.
///
/// A soil polygon that crosses a field more than once yields one delineation
/// per connected piece. Zone ids run from 1 in field order, then soil order,
/// then west to east.
pub fn intersect(
    fields: &[Field],
    soils: &[SoilPolygon],
    units: LinearUnit,
) -> Result<Vec<Delineation>> {
    let per_acre = units.square_units_per_acre();
    let mut delineations = Vec::new();
    let mut next_id = 1u32;

    for field in fields {
        let field_extent = field.geometry.iter().map(|p| p.extent()).reduce(|a, b| a.union(&b));
        for (soil_index, soil) in soils.iter().enumerate() {
            if !field_extent.is_some_and(|e| e.intersects(&soil.geometry.extent())) {
                continue;
            }
            let parts = overlap_parts(&field.geometry, std::slice::from_ref(&soil.geometry));
            if parts.len() > 1 {
                debug!(field = %field.id, soil = soil_index, parts = parts.len(), "soil polygon split by field");
            }
            for part in parts {
                delineations.push(Delineation {
                    id: next_id,
                    field_id: field.id.clone(),
                    soil_index,
                    musym: soil.musym.clone(),
                    category: soil.category,
                    k: soil.k,
                    t: soil.t,
                    r: soil.r,
                    acres: part.area / per_acre,
                    geometry: part.pieces,
                });
                next_id += 1;
            }
        }
    }

    if delineations.is_empty() {
        return Err(HelError::NoOverlap);
    }
    info!(count = delineations.len(), "field × soil delineations");
    Ok(delineations)
}

/// Input acres of one field broken down by soil category.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CategoryAcres {
    pub hel: f64,
    pub nhel: f64,
    pub phel: f64,
}

impl CategoryAcres {
    pub fn of_field(field_id: &str, delineations: &[Delineation]) -> Self {
        let mut acres = Self::default();
        for d in delineations.iter().filter(|d| d.field_id == field_id) {
            match d.category {
                HelCategory::Hel => acres.hel += d.acres,
                HelCategory::Nhel => acres.nhel += d.acres,
                HelCategory::Phel => acres.phel += d.acres,
            }
        }
        acres
    }

    pub fn get(&self, category: HelCategory) -> f64 {
        match category {
            HelCategory::Hel => self.hel,
            HelCategory::Nhel => self.nhel,
            HelCategory::Phel => self.phel,
        }
    }

    pub fn total(&self) -> f64 {
        self.hel + self.nhel + self.phel
    }

    pub fn percent(&self, category: HelCategory) -> f64 {
        let total = self.total();
        if total <= 0.0 {
            return 0.0;
        }
        clamp_percent(self.get(category) / total * 100.0)
    }
}

/// Initial HEL Summary: delineations dissolved by field and category.
pub fn initial_summary(fields: &[Field], delineations: &[Delineation]) -> Vec<InitialSummaryRow> {
    let mut rows = Vec::new();
    for field in fields {
        let acres = CategoryAcres::of_field(&field.id, delineations);
        for category in HelCategory::ALL {
            let value = acres.get(category);
            if value <= 0.0 {
                continue;
            }
            rows.push(InitialSummaryRow {
                field_id: field.id.clone(),
                category,
                acres: value,
                percent: acres.percent(category),
            });
        }
        debug!(field = %field.id, hel = acres.hel, nhel = acres.nhel, phel = acres.phel, "input acres");
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Polygon;

    fn field(id: &str, poly: Polygon) -> Field {
        Field {
            id: id.into(),
            tract: "1".into(),
            farm: "2".into(),
            county: "003".into(),
            acres: poly.area() / 4046.8564224,
            geometry: vec![poly],
        }
    }

    fn soil(category: HelCategory, poly: Polygon) -> SoilPolygon {
        SoilPolygon {
            layer: "soils".into(),
            musym: category.to_string(),
            category,
            k: 0.3,
            t: 5.0,
            r: 150.0,
            geometry: poly,
        }
    }

    #[test]
    fn one_delineation_per_overlapping_pair() {
        let fields = vec![
            field("1", Polygon::rect(0.0, 0.0, 100.0, 100.0)),
            field("2", Polygon::rect(100.0, 0.0, 200.0, 100.0)),
        ];
        let soils = vec![
            soil(HelCategory::Hel, Polygon::rect(0.0, 0.0, 150.0, 40.0)),
            soil(HelCategory::Phel, Polygon::rect(0.0, 40.0, 150.0, 100.0)),
            soil(HelCategory::Nhel, Polygon::rect(150.0, 0.0, 200.0, 100.0)),
        ];
        let d = intersect(&fields, &soils, LinearUnit::Meter).unwrap();
        let ids: Vec<(u32, &str, usize)> =
            d.iter().map(|d| (d.id, d.field_id.as_str(), d.soil_index)).collect();
        assert_eq!(ids, vec![(1, "1", 0), (2, "1", 1), (3, "2", 0), (4, "2", 1), (5, "2", 2)]);

        let f1 = CategoryAcres::of_field("1", &d);
        assert!((f1.percent(HelCategory::Hel) - 40.0).abs() < 1e-9);
        assert!((f1.total() - fields[0].acres).abs() < 1e-9);

        let summary = initial_summary(&fields, &d);
        assert_eq!(summary.len(), 5);
        assert!(summary.iter().all(|r| (0.0..=100.0).contains(&r.percent)));
    }

    #[test]
    fn soil_crossing_both_arms_of_a_field_splits() {
        let u = Polygon::new(
            vec![
                (0.0, 0.0),
                (300.0, 0.0),
                (300.0, 300.0),
                (200.0, 300.0),
                (200.0, 100.0),
                (100.0, 100.0),
                (100.0, 300.0),
                (0.0, 300.0),
            ],
            vec![],
        );
        let fields = vec![field("9", u)];
        let soils = vec![
            soil(HelCategory::Nhel, Polygon::rect(0.0, 0.0, 300.0, 150.0)),
            soil(HelCategory::Phel, Polygon::rect(0.0, 150.0, 300.0, 300.0)),
        ];
        let d = intersect(&fields, &soils, LinearUnit::Meter).unwrap();
        let ids: Vec<(u32, usize)> = d.iter().map(|d| (d.id, d.soil_index)).collect();
        assert_eq!(ids, vec![(1, 0), (2, 1), (3, 1)]);
        let per_acre = LinearUnit::Meter.square_units_per_acre();
        assert!((d[0].acres - 40_000.0 / per_acre).abs() < 1e-9);
        assert!((d[1].acres - 15_000.0 / per_acre).abs() < 1e-9);
        assert!((d[2].acres - 15_000.0 / per_acre).abs() < 1e-9);
        assert!(d[1].geometry.iter().all(|p| p.extent().max_x <= 100.0 + 1e-6));

        let acres = CategoryAcres::of_field("9", &d);
        assert!((acres.total() - fields[0].acres).abs() < 1e-9);
    }

    #[test]
    fn disjoint_inputs_are_fatal() {
        let fields = vec![field("1", Polygon::rect(0.0, 0.0, 10.0, 10.0))];
        let soils = vec![soil(HelCategory::Hel, Polygon::rect(20.0, 20.0, 30.0, 30.0))];
        assert!(matches!(intersect(&fields, &soils, LinearUnit::Meter), Err(HelError::NoOverlap)));
    }
}
