/// Command-line runner for one HEL determination.
///
/// Settings come from an optional JSON config file; flags override it.
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use hel_core::config::RunConfig;
use hel_core::pipeline::{HelDetermination, RunInputs};
use hel_core::sink::JsonDirectorySink;
use hel_core::terrain::open_dem;
use hel_core::units::LinearUnit;
use tracing::Level;

#[derive(Parser, Debug)]
#[command(name = "hel-determination", about = "Highly Erodible Land determination for a set of fields")]
struct Args {
    /// JSON run configuration.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Writable directory for intermediate rasters.
    #[arg(long)]
    scratch: Option<PathBuf>,

    /// Directory receiving the output tables, raster and report.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Field (CLU) GeoJSON.
    #[arg(long)]
    fields: Option<PathBuf>,

    /// Soil GeoJSON layer; repeat for several layers.
    #[arg(long = "soils")]
    soils: Vec<PathBuf>,

    /// DEM as GeoTIFF (.tif) or grid file (.json).
    #[arg(long)]
    dem: Option<PathBuf>,

    /// Linear unit of the field coordinates.
    #[arg(long)]
    units: Option<LinearUnit>,

    /// EPSG code of the field coordinates.
    #[arg(long)]
    epsg: Option<u16>,

    /// Elevation unit of the DEM when it does not say.
    #[arg(long)]
    z_units: Option<String>,

    /// Field id to process; repeat to select several. Default: all fields.
    #[arg(long = "field")]
    selected: Vec<String>,

    /// Debug-level logging.
    #[arg(short, long)]
    verbose: bool,
}

fn build_config(args: &Args) -> Result<RunConfig> {
    let mut cfg = match &args.config {
        Some(path) => RunConfig::load(path)
            .with_context(|| format!("Cannot load config {}", path.display()))?,
        None => match &args.scratch {
            Some(dir) => RunConfig::new(dir),
            None => bail!("a scratch directory is required (--scratch or scratch_dir in --config)"),
        },
    };
    if let Some(dir) = &args.scratch {
        cfg.scratch_dir = dir.clone();
    }
    if let Some(dir) = &args.output {
        cfg.output_dir = dir.clone();
    }
    if let Some(path) = &args.fields {
        cfg.fields = Some(path.clone());
    }
    if !args.soils.is_empty() {
        cfg.soils = args.soils.clone();
    }
    if let Some(path) = &args.dem {
        cfg.dem = Some(path.clone());
    }
    if let Some(unit) = args.units {
        cfg.field_units = unit;
    }
    if let Some(code) = args.epsg {
        cfg.field_epsg = Some(code);
    }
    if let Some(z) = &args.z_units {
        cfg.z_units = Some(z.clone());
    }
    if !args.selected.is_empty() {
        cfg.selected_fields = Some(args.selected.clone());
    }
    cfg.validate()?;
    Ok(cfg)
}

fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(if args.verbose { Level::DEBUG } else { Level::INFO })
        .with_target(false)
        .init();

    let cfg = build_config(&args)?;
    let inputs = RunInputs::load(&cfg).context("Cannot load field and soil layers")?;
    let dem = cfg.dem.as_deref().map(open_dem);
    let mut sink = JsonDirectorySink::create(&cfg.output_dir)
        .with_context(|| format!("Cannot create output directory {}", cfg.output_dir.display()))?;

    let outcome = HelDetermination::new(&cfg).run(&inputs, dem.as_deref(), &mut sink)?;

    println!("{}", serde_json::to_string_pretty(&outcome.fields)?);
    eprintln!(
        "{} field(s) determined via {:?}; {} file(s) written to {}",
        outcome.fields.len(),
        outcome.path,
        sink.written().len(),
        cfg.output_dir.display()
    );
    Ok(())
}
