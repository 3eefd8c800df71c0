//! Threshold rules for delineations and fields, and the vector-only
//! screening that decides whether terrain processing is needed at all.
use tracing::{info, warn};

use crate::model::{
    Delineation, DelineationResult, Determination, DeterminationSource, Field,
    FieldDetermination,
};
use crate::overlay::CategoryAcres;
use crate::zonal::ZonalTable;

// ── Fixed regulatory thresholds ───────────────────────────────────────────────

/// Field rule: HEL share at or above this percent.
pub const FIELD_HEL_PERCENT: f64 = 33.33;
/// Field rule: HEL acreage at or above this many acres.
pub const FIELD_HEL_ACRES: f64 = 50.0;
/// Delineation rule: HEL share strictly above this percent.
pub const DELINEATION_HEL_PERCENT: f64 = 50.0;
/// Vector screening: an NHEL share strictly above this percent is decisive.
pub const SCREEN_NHEL_PERCENT: f64 = 66.66;

pub fn clamp_percent(p: f64) -> f64 {
    if p.is_nan() {
        0.0
    } else {
        p.clamp(0.0, 100.0)
    }
}

/// `part / whole` as a clamped percentage; `0` for an empty whole.
pub fn percent(part: f64, whole: f64) -> f64 {
    if whole <= 0.0 {
        0.0
    } else {
        clamp_percent(part / whole * 100.0)
    }
}

pub fn field_rule(hel_acres: f64, hel_percent: f64) -> bool {
    hel_percent >= FIELD_HEL_PERCENT || hel_acres >= FIELD_HEL_ACRES
}

pub fn classify_field(hel_acres: f64, total_acres: f64) -> Determination {
    if field_rule(hel_acres, percent(hel_acres, total_acres)) {
        Determination::Hel
    } else {
        Determination::Nhel
    }
}

pub fn classify_delineation(hel_area: f64, total_area: f64) -> Determination {
    if percent(hel_area, total_area) > DELINEATION_HEL_PERCENT {
        Determination::Hel
    } else {
        Determination::Nhel
    }
}

// ── Vector screening ──────────────────────────────────────────────────────────

/// Vector-only view of one field.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorRating {
    pub field_id: String,
    pub acres: CategoryAcres,
    /// `Some` when the input categories alone settle the field.
    pub decisive: Option<Determination>,
}

impl VectorRating {
    pub fn new(field_id: &str, acres: CategoryAcres) -> Self {
        let hel_pct = percent(acres.hel, acres.total());
        let nhel_pct = percent(acres.nhel, acres.total());
        let decisive = if field_rule(acres.hel, hel_pct) {
            Some(Determination::Hel)
        } else if nhel_pct > SCREEN_NHEL_PERCENT {
            Some(Determination::Nhel)
        } else {
            None
        };
        Self { field_id: field_id.to_string(), acres, decisive }
    }

    /// Rating used when terrain processing is skipped. A field that fails the
    /// HEL test is NHEL whether or not it was decisive.
    pub fn determination(&self) -> Determination {
        self.decisive.unwrap_or(Determination::Nhel)
    }
}

/// Outcome of screening: either every field is settled from vector data, or
/// the whole selection needs terrain processing.
#[derive(Debug, Clone, PartialEq)]
pub enum Screening {
    Decided(Vec<FieldDetermination>),
    RequiresTerrain {
        /// Fields without a vector-only answer.
        undecided: Vec<String>,
    },
}

pub fn rate_fields(fields: &[Field], delineations: &[Delineation]) -> Vec<VectorRating> {
    fields
        .iter()
        .map(|f| VectorRating::new(&f.id, CategoryAcres::of_field(&f.id, delineations)))
        .collect()
}

/// Decide whether terrain processing can be skipped for the whole run.
pub fn screen(fields: &[Field], ratings: &[VectorRating]) -> Screening {
    let any_phel = ratings.iter().any(|r| r.acres.phel > 0.0);
    let undecided: Vec<String> = ratings
        .iter()
        .filter(|r| r.decisive.is_none())
        .map(|r| r.field_id.clone())
        .collect();

    if any_phel && !undecided.is_empty() {
        info!(undecided = ?undecided, "terrain processing required");
        return Screening::RequiresTerrain { undecided };
    }
    if !any_phel {
        info!("no PHEL delineations; classifying from soil categories");
    } else {
        info!("every field is decisive from soil categories; skipping terrain processing");
    }

    let determinations = fields
        .iter()
        .zip(ratings)
        .map(|(field, rating)| {
            let total = rating.acres.total();
            FieldDetermination {
                field_id: field.id.clone(),
                tract: field.tract.clone(),
                farm: field.farm.clone(),
                county: field.county.clone(),
                acres: field.acres,
                hel_acres: rating.acres.hel,
                hel_percent: percent(rating.acres.hel, total),
                nhel_acres: rating.acres.nhel,
                nhel_percent: percent(rating.acres.nhel, total),
                determination: rating.determination(),
                source: DeterminationSource::Vector,
            }
        })
        .collect();
    Screening::Decided(determinations)
}

// ── Terrain-based classification ──────────────────────────────────────────────

/// Final HEL Summary rows from the delineation tabulation.
///
/// The HEL share is tabulated HEL acres over the delineation's polygon acres,
/// so cells lost or gained by rasterization do not shift the majority.
/// Slivers missing from the table get zero area for the absent class.
pub fn classify_delineations(
    delineations: &[Delineation],
    table: &ZonalTable<u32>,
    square_units_per_acre: f64,
) -> Vec<DelineationResult> {
    delineations
        .iter()
        .map(|d| {
            let hel_acres = table.get(&d.id).hel / square_units_per_acre;
            DelineationResult {
                id: d.id,
                field_id: d.field_id.clone(),
                musym: d.musym.clone(),
                category: d.category,
                polygon_acres: d.acres,
                final_hel_acres: hel_acres,
                final_hel_percent: percent(hel_acres, d.acres),
                final_value: classify_delineation(hel_acres, d.acres),
            }
        })
        .collect()
}

/// Field Determination rows from the field tabulation.
///
/// When the raster holds a single class, acres come from the field's vector
/// acreage at 100 % instead of pixel counts. A field without tabulated cells
/// is NHEL with zero acres either way.
pub fn classify_fields(
    fields: &[Field],
    table: &ZonalTable<String>,
    square_units_per_acre: f64,
) -> Vec<FieldDetermination> {
    let (hel_total, nhel_total) = table.class_totals();
    let only_hel = hel_total > 0.0 && nhel_total <= 0.0;
    let only_nhel = nhel_total > 0.0 && hel_total <= 0.0;
    if only_hel {
        warn!("entire area is HEL; using field acres instead of tabulated acres");
    } else if only_nhel {
        warn!("entire area is NHEL; using field acres instead of tabulated acres");
    }

    fields
        .iter()
        .map(|field| {
            let areas = table.get(&field.id);
            let (hel_acres, nhel_acres, hel_percent, nhel_percent) = if areas.total() <= 0.0 {
                warn!(field = %field.id, "no tabulated area; field rated NHEL");
                (0.0, 0.0, 0.0, 0.0)
            } else if only_hel {
                (field.acres, 0.0, 100.0, 0.0)
            } else if only_nhel {
                (0.0, field.acres, 0.0, 100.0)
            } else {
                (
                    areas.hel / square_units_per_acre,
                    areas.nhel / square_units_per_acre,
                    percent(areas.hel, areas.total()),
                    percent(areas.nhel, areas.total()),
                )
            };
            let determination = if field_rule(hel_acres, hel_percent) {
                Determination::Hel
            } else {
                Determination::Nhel
            };
            FieldDetermination {
                field_id: field.id.clone(),
                tract: field.tract.clone(),
                farm: field.farm.clone(),
                county: field.county.clone(),
                acres: field.acres,
                hel_acres,
                hel_percent,
                nhel_acres,
                nhel_percent,
                determination,
                source: DeterminationSource::Terrain,
            }
        })
        .collect()
}
