//! Cell-centre rasterization of vector zones and attributes, and zonal
//! tabulation of the binary HEL raster.
use std::collections::BTreeMap;

use serde::Serialize;

use crate::geometry::Polygon;
use crate::model::{Delineation, Determination, Field};
use crate::raster::Grid;

// ── Rasterization ─────────────────────────────────────────────────────────────

/// Visit every cell whose centre lies inside `poly` (even-odd rule), one
/// scanline per row.
pub fn for_each_cell_in<T, F: FnMut(usize, usize)>(grid: &Grid<T>, poly: &Polygon, mut visit: F) {
    let Some((r0, r1, _, _)) = grid.window(&poly.extent()) else {
        return;
    };
    let cs = grid.cell_size();
    let mut crossings: Vec<f64> = Vec::new();
    for row in r0..=r1 {
        let y = grid.max_y - (row as f64 + 0.5) * cs;
        crossings.clear();
        for ring in poly.rings() {
            let n = ring.len();
            for i in 0..n {
                let (xi, yi) = ring[i];
                let (xj, yj) = ring[(i + n - 1) % n];
                if (yi > y) != (yj > y) {
                    crossings.push((xj - xi) * (y - yi) / (yj - yi) + xi);
                }
            }
        }
        crossings.sort_by(f64::total_cmp);
        for span in crossings.chunks_exact(2) {
            let start = ((span[0] - grid.min_x) / cs - 0.5).ceil().max(0.0) as usize;
            let end = (((span[1] - grid.min_x) / cs - 0.5).ceil().max(0.0) as usize).min(grid.width);
            for col in start..end {
                visit(row, col);
            }
        }
    }
}

/// Field zones (`index + 1`) and delineation zones (delineation id) on the
/// lattice of `template`. `0` marks cells outside every zone.
///
/// A delineation only claims cells that also belong to its field's zone.
pub fn rasterize_zones<T>(
    template: &Grid<T>,
    fields: &[Field],
    delineations: &[Delineation],
) -> (Grid<u32>, Grid<u32>) {
    let blank = Grid {
        data: vec![0u32; template.width * template.height],
        width: template.width,
        height: template.height,
        min_x: template.min_x,
        max_x: template.max_x,
        min_y: template.min_y,
        max_y: template.max_y,
    };
    let mut field_zones = blank.clone();
    for (i, field) in fields.iter().enumerate() {
        let zone = i as u32 + 1;
        for part in &field.geometry {
            for_each_cell_in(&blank, part, |r, c| field_zones.set(r, c, zone));
        }
    }

    let mut delineation_zones = blank;
    for d in delineations {
        let Some(fi) = fields.iter().position(|f| f.id == d.field_id) else {
            continue;
        };
        let field_zone = fi as u32 + 1;
        let zones = &mut delineation_zones;
        for piece in &d.geometry {
            for_each_cell_in(&field_zones, piece, |r, c| {
                if field_zones.get(r, c) == field_zone {
                    zones.set(r, c, d.id);
                }
            });
        }
    }
    (field_zones, delineation_zones)
}

/// Per-cell soil attributes looked up from the delineation zone grid.
pub struct SoilRasters {
    pub category: Grid<u8>,
    pub k: Grid<f32>,
    pub t: Grid<f32>,
    pub r: Grid<f32>,
}

pub fn rasterize_attributes(zones: &Grid<u32>, delineations: &[Delineation]) -> SoilRasters {
    let by_id: BTreeMap<u32, &Delineation> = delineations.iter().map(|d| (d.id, d)).collect();
    let lookup = |zone: u32| by_id.get(&zone).copied();
    SoilRasters {
        category: zones.map(|z| lookup(z).map_or(0, |d| d.category.raster_code())),
        k: zones.map(|z| lookup(z).map_or(f32::NAN, |d| d.k as f32)),
        t: zones.map(|z| lookup(z).map_or(f32::NAN, |d| d.t as f32)),
        r: zones.map(|z| lookup(z).map_or(f32::NAN, |d| d.r as f32)),
    }
}

// ── Tabulation ────────────────────────────────────────────────────────────────

/// Area per reclassified class inside one zone, in square map units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ZoneAreas {
    pub nhel: f64,
    pub hel: f64,
}

impl ZoneAreas {
    pub fn total(&self) -> f64 {
        self.nhel + self.hel
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ZonalTable<K: Ord> {
    pub zones: BTreeMap<K, ZoneAreas>,
}

impl<K: Ord> ZonalTable<K> {
    /// Areas of `zone`; zero for zones that never received a cell.
    pub fn get(&self, zone: &K) -> ZoneAreas {
        self.zones.get(zone).copied().unwrap_or_default()
    }

    pub fn insert(&mut self, zone: K, areas: ZoneAreas) {
        self.zones.insert(zone, areas);
    }

    /// Summed (HEL, NHEL) area across every zone.
    pub fn class_totals(&self) -> (f64, f64) {
        self.zones
            .values()
            .fold((0.0, 0.0), |(h, n), a| (h + a.hel, n + a.nhel))
    }
}

impl ZonalTable<u32> {
    /// Re-key zones `1..=n` with `labels[zone - 1]`; unknown zones are dropped.
    pub fn with_labels(self, labels: &[String]) -> ZonalTable<String> {
        let zones = self
            .zones
            .into_iter()
            .filter_map(|(z, a)| {
                let label = labels.get((z as usize).checked_sub(1)?)?;
                Some((label.clone(), a))
            })
            .collect();
        ZonalTable { zones }
    }
}

/// Sum `cell_size²` per (zone, class) over cells with a zone and a class.
pub fn tabulate_area(zones: &Grid<u32>, classes: &Grid<u8>) -> ZonalTable<u32> {
    debug_assert!(zones.same_lattice(classes));
    let cell_area = classes.cell_area();
    let mut table = ZonalTable::default();
    for (&zone, &class) in zones.data.iter().zip(&classes.data) {
        if zone == 0 {
            continue;
        }
        let Some(det) = Determination::from_class_code(class) else {
            continue;
        };
        let entry = table.zones.entry(zone).or_insert_with(ZoneAreas::default);
        match det {
            Determination::Hel => entry.hel += cell_area,
            Determination::Nhel => entry.nhel += cell_area,
        }
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::HelCategory;

    fn field(id: &str, poly: Polygon) -> Field {
        Field {
            id: id.into(),
            tract: "1".into(),
            farm: "1".into(),
            county: "1".into(),
            geometry: vec![poly],
            acres: 0.0,
        }
    }

    fn delineation(
        id: u32,
        field_id: &str,
        soil_index: usize,
        category: HelCategory,
        geometry: Polygon,
    ) -> Delineation {
        Delineation {
            id,
            field_id: field_id.into(),
            soil_index,
            musym: String::new(),
            category,
            k: 0.3,
            t: 5.0,
            r: 150.0,
            acres: geometry.area() / 4046.8564224,
            geometry: vec![geometry],
        }
    }

    #[test]
    fn scanline_matches_point_in_polygon() {
        let grid: Grid<u8> = Grid::new(20, 20, 0.0, 20.0, 1.0, 0);
        let l = Polygon::new(
            vec![(0.0, 0.0), (10.0, 0.0), (10.0, 4.0), (4.0, 4.0), (4.0, 10.0), (0.0, 10.0)],
            vec![vec![(1.0, 1.0), (2.0, 1.0), (2.0, 2.0), (1.0, 2.0)]],
        );
        let mut hits = Vec::new();
        for_each_cell_in(&grid, &l, |r, c| hits.push((r, c)));
        let mut expected = Vec::new();
        for r in 0..20 {
            for c in 0..20 {
                let (x, y) = grid.cell_center(r, c);
                if l.contains(x, y) {
                    expected.push((r, c));
                }
            }
        }
        hits.sort();
        assert_eq!(hits, expected);
        // 40 + 24 cells minus the one-cell hole.
        assert_eq!(hits.len(), 63);
    }

    #[test]
    fn tabulation_sums_cell_area_per_zone() {
        let template: Grid<f32> = Grid::new(4, 2, 0.0, 6.0, 3.0, 0.0);
        let fields = vec![field("A", Polygon::rect(0.0, 0.0, 12.0, 6.0))];
        let delineations = vec![
            delineation(1, "A", 0, HelCategory::Phel, Polygon::rect(0.0, 0.0, 6.0, 6.0)),
            delineation(2, "A", 1, HelCategory::Hel, Polygon::rect(6.0, 0.0, 12.0, 6.0)),
        ];
        let (field_zones, zones) = rasterize_zones(&template, &fields, &delineations);
        assert!(field_zones.data.iter().all(|&z| z == 1));
        assert_eq!(zones.data, vec![1, 1, 2, 2, 1, 1, 2, 2]);

        let attrs = rasterize_attributes(&zones, &delineations);
        assert_eq!(attrs.category.get(0, 3), HelCategory::Hel.raster_code());
        assert_eq!(attrs.k.get(1, 0), 0.3);

        let mut classes: Grid<u8> = zones.like(1);
        classes.set(0, 0, 2);
        classes.set(0, 2, 2);
        classes.set(1, 2, 2);
        classes.set(1, 3, 0);
        let table = tabulate_area(&zones, &classes);
        assert_eq!(table.get(&1), ZoneAreas { nhel: 27.0, hel: 9.0 });
        assert_eq!(table.get(&2), ZoneAreas { nhel: 9.0, hel: 18.0 });
        assert_eq!(table.get(&9), ZoneAreas::default());

        let by_field = tabulate_area(&field_zones, &classes).with_labels(&["A".to_string()]);
        assert_eq!(by_field.get(&"A".to_string()).total(), 63.0);
        assert_eq!(by_field.class_totals(), (27.0, 36.0));
    }

    #[test]
    fn split_delineations_get_their_own_zones() {
        use crate::model::SoilPolygon;
        use crate::overlay::intersect;
        use crate::units::LinearUnit;

        let u = Polygon::new(
            vec![
                (0.0, 0.0),
                (30.0, 0.0),
                (30.0, 30.0),
                (20.0, 30.0),
                (20.0, 10.0),
                (10.0, 10.0),
                (10.0, 30.0),
                (0.0, 30.0),
            ],
            vec![],
        );
        let fields = vec![field("U", u)];
        let band = SoilPolygon {
            layer: "s".into(),
            musym: "b".into(),
            category: HelCategory::Phel,
            k: 0.3,
            t: 5.0,
            r: 150.0,
            geometry: Polygon::rect(0.0, 15.0, 30.0, 25.0),
        };
        let delineations = intersect(&fields, &[band], LinearUnit::Meter).unwrap();
        assert_eq!(delineations.len(), 2);

        let template: Grid<f32> = Grid::new(30, 30, 0.0, 30.0, 1.0, 0.0);
        let (_, zones) = rasterize_zones(&template, &fields, &delineations);
        for id in [1, 2] {
            assert_eq!(zones.data.iter().filter(|&&z| z == id).count(), 100);
        }
        for r in 0..30 {
            for c in 0..30 {
                match zones.get(r, c) {
                    1 => assert!(c < 10),
                    2 => assert!(c >= 20),
                    _ => {}
                }
            }
        }
    }
}
