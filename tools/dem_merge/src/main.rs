/// Mosaic several local DEM tiles into one grid file covering the buffered
/// field set, ready to be passed to `hel-determination --dem`.
///
/// Every input must be projected, in meters or feet, at 3 m or finer, and
/// share its unit and pixel type with the others. Each tile is clipped to the
/// buffered field envelope first; the mosaic keeps the first tile's lattice.
use std::path::{Path, PathBuf};

use anyhow::{bail, ensure, Context, Result};
use clap::Parser;
use hel_core::config::FieldSchema;
use hel_core::geometry::Extent;
use hel_core::gridfile::{self, GridReference};
use hel_core::ingest;
use hel_core::raster::Raster;
use hel_core::terrain::geotiff::{read_geotiff, GeoTiffInfo};
use hel_core::terrain::resample::{clip, mosaic};
use hel_core::terrain::{BUFFER_METERS, CELL_SIZE_TOLERANCE, TARGET_CELL_METERS};
use hel_core::units::LinearUnit;
use tracing::{info, warn, Level};

// ── CLI ──────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "dem_merge", about = "Clip and mosaic local DEM tiles around a set of fields")]
struct Args {
    /// Field (CLU) GeoJSON defining the area of interest.
    #[arg(long)]
    fields: PathBuf,

    /// Input GeoTIFF DEMs, in priority order (at least two).
    #[arg(required = true, num_args = 2..)]
    dems: Vec<PathBuf>,

    /// Output grid stem; `<stem>.json` and `<stem>.bin` are written.
    #[arg(short, long, default_value = "merged_dem")]
    output: PathBuf,

    /// Field id attribute.
    #[arg(long, default_value = "CLUNBR")]
    field_id: String,

    #[arg(short, long)]
    verbose: bool,
}

// ── Validation ───────────────────────────────────────────────────────────────

struct Tile {
    path: PathBuf,
    info: GeoTiffInfo,
    unit: LinearUnit,
    grid: Raster,
}

fn load_tile(path: &Path) -> Result<Tile> {
    let (info, grid) = read_geotiff(path).with_context(|| format!("Cannot read {}", path.display()))?;
    let reference = info.reference();
    ensure!(reference.projected, "{} is not in a projected coordinate system", path.display());
    let unit = reference
        .linear_unit
        .with_context(|| format!("Cannot determine the linear unit of {}", path.display()))?;
    ensure!(
        matches!(unit, LinearUnit::Meter | LinearUnit::Foot),
        "{} uses {unit}; only meters and feet are supported",
        path.display()
    );
    let limit = unit.from_meters(TARGET_CELL_METERS) * (1.0 + CELL_SIZE_TOLERANCE);
    ensure!(
        info.cell_size <= limit,
        "{} has {} {unit} cells; 3 m or finer is required",
        path.display(),
        info.cell_size
    );
    Ok(Tile { path: path.to_path_buf(), info, unit, grid })
}

fn check_consistent(tiles: &[Tile]) -> Result<()> {
    let Some(first) = tiles.first() else {
        bail!("no DEMs given");
    };
    for t in &tiles[1..] {
        ensure!(
            t.unit == first.unit,
            "{} is in {} but {} is in {}",
            t.path.display(),
            t.unit,
            first.path.display(),
            first.unit
        );
        ensure!(
            t.info.sample_type == first.info.sample_type,
            "{} has pixel type {:?} but {} has {:?}",
            t.path.display(),
            t.info.sample_type,
            first.path.display(),
            first.info.sample_type
        );
        if t.info.keys.projected_epsg != first.info.keys.projected_epsg {
            warn!(
                a = %first.path.display(),
                b = %t.path.display(),
                "DEMs report different projected EPSG codes"
            );
        }
    }
    Ok(())
}

// ── Main ──────────────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(if args.verbose { Level::DEBUG } else { Level::INFO })
        .init();

    ensure!(args.dems.len() >= 2, "at least two DEMs are required to merge");

    let tiles = args
        .dems
        .iter()
        .map(|p| load_tile(p))
        .collect::<Result<Vec<_>>>()?;
    check_consistent(&tiles)?;
    let unit = tiles[0].unit;

    let schema = FieldSchema { field_id: args.field_id.clone(), ..FieldSchema::default() };
    let fc = ingest::read_feature_collection(&args.fields)
        .with_context(|| format!("Cannot read {}", args.fields.display()))?;
    let fields = ingest::load_fields(&fc, &schema, unit)?;
    let envelope = fields
        .iter()
        .flat_map(|f| f.geometry.iter().map(|p| p.extent()))
        .reduce(|a, b| a.union(&b))
        .context("field layer has no polygons")?;
    let window: Extent = envelope.buffered(unit.from_meters(BUFFER_METERS));
    info!(fields = fields.len(), "area of interest buffered by {BUFFER_METERS} m");

    let mut clipped = Vec::new();
    for tile in &tiles {
        match clip(&tile.grid, &window) {
            Some(part) => {
                info!(dem = %tile.path.display(), width = part.width, height = part.height, "clipped");
                clipped.push(part);
            }
            None => warn!(dem = %tile.path.display(), "does not overlap the fields; skipped"),
        }
    }
    ensure!(!clipped.is_empty(), "none of the DEMs overlaps the buffered fields");

    let merged = mosaic(&clipped, Some(&window)).context("mosaic is empty")?;
    let first = tiles[0].info.reference();
    let reference = GridReference { linear_unit: Some(unit), ..first };
    gridfile::write(&args.output, &merged, &reference)
        .with_context(|| format!("Cannot write {}", args.output.display()))?;
    info!(
        width = merged.width,
        height = merged.height,
        valid = merged.valid_count(),
        "merged DEM written to {}",
        args.output.display()
    );
    Ok(())
}
