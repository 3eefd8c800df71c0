//! Run orchestrator: sequences ingestion, screening and (when needed) the
//! terrain and erosion rasters, then publishes the results.
//!
//! A run either settles every field from soil categories alone or runs the
//! full terrain path for the whole selection. Any failure aborts the run;
//! the scratch workspace is released exactly once on both paths and nothing
//! reaches the sink unless the run succeeded.
use tracing::{error, info, warn};

use crate::classify::{
    classify_delineations, classify_fields, rate_fields, screen, Screening,
};
use crate::config::RunConfig;
use crate::erosion::{combine_grid, ei_grid, ls_grid, reclassify_grid};
use crate::error::{HelError, Result};
use crate::geometry::Extent;
use crate::gridfile::GridReference;
use crate::hydraulic::{compute_d8_flow, upstream_flow_length};
use crate::ingest::{self, SoilLayer};
use crate::metrics::{compute_slope, focal_max, focal_mean};
use crate::model::{Delineation, DelineationResult, Field, FieldDetermination, InitialSummaryRow};
use crate::overlay::{initial_summary, intersect};
use crate::raster::Grid;
use crate::report::{self, Report};
use crate::scratch::ScratchSpace;
use crate::sink::DeterminationSink;
use crate::terrain::{extract_terrain, FieldReference, TerrainSource};
use crate::units::UnitResolution;
use crate::zonal::{rasterize_attributes, rasterize_zones, tabulate_area};

/// Which processing path produced the determinations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPath {
    /// Settled from input soil categories; no DEM was touched.
    VectorOnly,
    /// Full terrain, erosion and zonal tabulation path.
    Terrain,
}

/// Vector inputs of a run, before selection.
#[derive(Debug, Clone, Default)]
pub struct RunInputs {
    pub fields: Vec<Field>,
    pub soil_layers: Vec<SoilLayer>,
}

impl RunInputs {
    /// Read the field and soil GeoJSON files named by `config`.
    pub fn load(config: &RunConfig) -> Result<Self> {
        let fields_path = config
            .fields
            .as_deref()
            .ok_or_else(|| HelError::Configuration("no field layer configured".into()))?;
        if config.soils.is_empty() {
            return Err(HelError::Configuration("no soil layer configured".into()));
        }
        let fc = ingest::read_feature_collection(fields_path)?;
        let fields = ingest::load_fields(&fc, &config.field_schema, config.field_units)?;

        let mut soil_layers = Vec::with_capacity(config.soils.len());
        for path in &config.soils {
            let name = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            let fc = ingest::read_feature_collection(path)?;
            soil_layers.push(ingest::load_soil_layer(&name, &fc, &config.soil_schema)?);
        }
        info!(fields = fields.len(), soil_layers = soil_layers.len(), "inputs loaded");
        Ok(Self { fields, soil_layers })
    }
}

/// Rasters produced by the terrain path that outlive the run.
#[derive(Debug, Clone)]
pub struct TerrainProducts {
    pub units: UnitResolution,
    pub reference: GridReference,
    /// Binary HEL/NHEL classes inside the selected fields (`0` elsewhere).
    pub lidar: Grid<u8>,
    pub resampled: bool,
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub path: RunPath,
    pub tract: String,
    pub farm: String,
    pub initial_summary: Vec<InitialSummaryRow>,
    pub delineations: Vec<Delineation>,
    pub final_summary: Option<Vec<DelineationResult>>,
    pub fields: Vec<FieldDetermination>,
    pub terrain: Option<TerrainProducts>,
}

/// Per-run state threaded through every stage.
struct RunContext<'a> {
    config: &'a RunConfig,
    scratch: ScratchSpace,
}

/// Vector stages up to and including screening.
struct Overlay {
    fields: Vec<Field>,
    delineations: Vec<Delineation>,
    initial: Vec<InitialSummaryRow>,
    tract: String,
    farm: String,
}

pub struct HelDetermination<'a> {
    config: &'a RunConfig,
}

impl<'a> HelDetermination<'a> {
    pub fn new(config: &'a RunConfig) -> Self {
        Self { config }
    }

    /// Run one determination and publish it to `sink`.
    ///
    /// `dem` is only consulted when soil categories alone cannot settle the
    /// selection.
    pub fn run(
        &self,
        inputs: &RunInputs,
        dem: Option<&dyn TerrainSource>,
        sink: &mut dyn DeterminationSink,
    ) -> Result<RunOutcome> {
        let result = self.config.validate().and_then(|()| {
            let scratch = ScratchSpace::create(&self.config.scratch_dir, "hel")?;
            let mut ctx = RunContext { config: self.config, scratch };
            let outcome = execute(&mut ctx, inputs, dem);
            ctx.scratch.release();
            outcome
        });

        let published = result.and_then(|outcome| {
            publish(&outcome, sink)?;
            Ok(outcome)
        });
        match published {
            Ok(outcome) => {
                info!(path = ?outcome.path, fields = outcome.fields.len(), "HEL determination complete");
                Ok(outcome)
            }
            Err(e) => {
                error!(kind = ?e.kind(), "HEL determination aborted: {e}");
                Err(e)
            }
        }
    }
}

fn execute(ctx: &mut RunContext<'_>, inputs: &RunInputs, dem: Option<&dyn TerrainSource>) -> Result<RunOutcome> {
    let overlay = overlay(ctx.config, inputs)?;
    let ratings = rate_fields(&overlay.fields, &overlay.delineations);

    match screen(&overlay.fields, &ratings) {
        Screening::Decided(fields) => Ok(RunOutcome {
            path: RunPath::VectorOnly,
            tract: overlay.tract,
            farm: overlay.farm,
            initial_summary: overlay.initial,
            delineations: overlay.delineations,
            final_summary: None,
            fields,
            terrain: None,
        }),
        Screening::RequiresTerrain { undecided } => {
            let source = dem.ok_or_else(|| {
                HelError::Configuration(format!(
                    "fields {undecided:?} need terrain processing but no DEM was supplied"
                ))
            })?;
            terrain_path(ctx, overlay, source)
        }
    }
}

fn overlay(config: &RunConfig, inputs: &RunInputs) -> Result<Overlay> {
    let fields = ingest::select_fields(inputs.fields.clone(), config.selected_fields.as_deref())?;
    let (tract, farm) = ingest::single_owner(&fields)?;
    info!(fields = fields.len(), %tract, %farm, "fields selected");

    let soils = ingest::prepare_soils(&inputs.soil_layers, &fields)?;
    let delineations = intersect(&fields, &soils, config.field_units)?;
    let initial = initial_summary(&fields, &delineations);
    Ok(Overlay { fields, delineations, initial, tract, farm })
}

fn field_envelope(fields: &[Field]) -> Result<Extent> {
    fields
        .iter()
        .flat_map(|f| f.geometry.iter().map(|p| p.extent()))
        .reduce(|a, b| a.union(&b))
        .ok_or(HelError::EmptySelection)
}

fn terrain_path(ctx: &mut RunContext<'_>, overlay: Overlay, source: &dyn TerrainSource) -> Result<RunOutcome> {
    let config = ctx.config;
    let aoi = field_envelope(&overlay.fields)?;
    let extracted = extract_terrain(
        source,
        &aoi,
        FieldReference {
            unit: config.field_units,
            epsg: config.field_epsg,
            z_units: config.z_units.as_deref(),
        },
    )?;
    let units = extracted.units;
    let dem = extracted.dem;
    info!(xy = %units.xy, z = %units.z, z_factor = units.z_factor, z_defaulted = units.z_defaulted, "units resolved");

    let reference = GridReference {
        projected: true,
        epsg: config.field_epsg,
        linear_unit: Some(units.xy),
        z_unit: Some(units.z),
    };
    let scratch = &mut ctx.scratch;
    scratch.persist_grid("dem", &dem, &reference)?;

    info!("computing slope");
    let slope = focal_mean(&compute_slope(&dem, units.z_factor));
    scratch.persist_grid("slope_pct", &slope, &reference)?;

    info!("computing flow direction and flow length");
    let flow = compute_d8_flow(&dem);
    scratch.persist_grid("flow_direction", &flow.direction, &reference)?;
    let feet = units.xy.feet() as f32;
    let flow_length_ft = focal_max(&upstream_flow_length(&dem, &flow)).map(|v| v * feet);
    scratch.persist_grid("flow_length_ft", &flow_length_ft, &reference)?;

    info!("computing LS and EI factors");
    let ls = ls_grid(&slope, &flow_length_ft);
    scratch.persist_grid("ls_factor", &ls, &reference)?;

    let (field_zones, delineation_zones) =
        rasterize_zones(&dem, &overlay.fields, &overlay.delineations);
    scratch.persist_grid("field_zones", &field_zones, &reference)?;
    scratch.persist_grid("delineation_zones", &delineation_zones, &reference)?;
    let attributes = rasterize_attributes(&delineation_zones, &overlay.delineations);
    scratch.persist_grid("hel_category", &attributes.category, &reference)?;

    let ei = ei_grid(&ls, &attributes.k, &attributes.t, &attributes.r);
    scratch.persist_grid("ei_factor", &ei, &reference)?;
    let combined = combine_grid(&attributes.category, &ei);
    scratch.persist_grid("hel_factor", &combined, &reference)?;
    let classes = reclassify_grid(&combined);
    scratch.persist_grid("hel_classes", &classes, &reference)?;

    info!("tabulating HEL area");
    let per_acre = units.square_units_per_acre;
    let delineation_table = tabulate_area(&delineation_zones, &classes);
    let final_summary = classify_delineations(&overlay.delineations, &delineation_table, per_acre);

    let labels: Vec<String> = overlay.fields.iter().map(|f| f.id.clone()).collect();
    let field_table = tabulate_area(&field_zones, &classes).with_labels(&labels);
    let fields = classify_fields(&overlay.fields, &field_table, per_acre);

    let mut lidar = classes;
    for (class, &zone) in lidar.data.iter_mut().zip(&field_zones.data) {
        if zone == 0 {
            *class = 0;
        }
    }

    Ok(RunOutcome {
        path: RunPath::Terrain,
        tract: overlay.tract,
        farm: overlay.farm,
        initial_summary: overlay.initial,
        delineations: overlay.delineations,
        final_summary: Some(final_summary),
        fields,
        terrain: Some(TerrainProducts { units, reference, lidar, resampled: extracted.resampled }),
    })
}

/// Hands every artifact to the sink and commits them together.
fn publish(outcome: &RunOutcome, sink: &mut dyn DeterminationSink) -> Result<()> {
    match hand_over(outcome, sink).and_then(|()| sink.commit()) {
        Ok(()) => Ok(()),
        Err(e) => {
            warn!(error = %e, "publishing failed; staged outputs discarded");
            sink.rollback();
            Err(e)
        }
    }
}

fn hand_over(outcome: &RunOutcome, sink: &mut dyn DeterminationSink) -> Result<()> {
    for f in &outcome.fields {
        info!(field = %f.field_id, determination = %f.determination, hel_acres = f.hel_acres, hel_percent = f.hel_percent, "field determination");
    }
    sink.initial_summary(&outcome.initial_summary)?;
    if let Some(rows) = &outcome.final_summary {
        sink.final_summary(rows)?;
    }
    if let Some(terrain) = &outcome.terrain {
        sink.lidar_summary(&terrain.lidar, &terrain.reference)?;
    }
    sink.field_determination(&outcome.fields)?;

    let ids: Vec<String> = outcome.fields.iter().map(|f| f.field_id.clone()).collect();
    let text = Report {
        tract: &outcome.tract,
        farm: &outcome.farm,
        initial: &outcome.initial_summary,
        delineations: outcome.final_summary.as_deref(),
        fields: &outcome.fields,
    }
    .render();
    sink.report(&report::file_name(&outcome.tract, &outcome.farm, &ids), &text)
}
