//! Terrain extraction: clip (and if needed resample) a DEM source to the
//! buffered field extent at the 3 m analysis resolution.
pub mod geotiff;
pub mod resample;

use std::cell::Cell;
use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{HelError, Result};
use crate::geometry::Extent;
use crate::gridfile::{self, GridReference};
use crate::raster::Raster;
use crate::units::{LinearUnit, UnitResolution};

pub use geotiff::GeoTiffSource;

/// Margin around the field envelope, in metres.
pub const BUFFER_METERS: f64 = 410.0;
/// Analysis cell size, in metres.
pub const TARGET_CELL_METERS: f64 = 3.0;
/// Relative tolerance when comparing cell sizes.
pub const CELL_SIZE_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinateSystem {
    Projected { epsg: Option<u16> },
    Geographic { epsg: Option<u16> },
    Unknown,
}

impl CoordinateSystem {
    pub fn epsg(&self) -> Option<u16> {
        match self {
            CoordinateSystem::Projected { epsg } | CoordinateSystem::Geographic { epsg } => *epsg,
            CoordinateSystem::Unknown => None,
        }
    }
}

impl fmt::Display for CoordinateSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoordinateSystem::Projected { epsg: Some(code) } => write!(f, "projected EPSG:{code}"),
            CoordinateSystem::Projected { epsg: None } => f.write_str("projected (unknown EPSG)"),
            CoordinateSystem::Geographic { epsg: Some(code) } => write!(f, "geographic EPSG:{code}"),
            CoordinateSystem::Geographic { epsg: None } => f.write_str("geographic"),
            CoordinateSystem::Unknown => f.write_str("unknown"),
        }
    }
}

/// What a source knows about its DEM before any cells are read.
#[derive(Debug, Clone, PartialEq)]
pub struct DemDescription {
    pub name: String,
    pub coordinate_system: CoordinateSystem,
    pub linear_unit: Option<LinearUnit>,
    pub z_unit: Option<LinearUnit>,
    pub cell_size: Option<f64>,
    pub extent: Extent,
    /// Streamed coverage that can clip and reproject on request.
    pub remote: bool,
}

/// Output lattice requested from a remote coverage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetGrid {
    pub unit: LinearUnit,
    pub epsg: Option<u16>,
    pub cell_size: f64,
}

pub trait TerrainSource {
    fn describe(&self) -> Result<DemDescription>;

    /// Native-resolution cells covering `window`, snapped outward.
    fn read_window(&self, window: &Extent) -> Result<Raster>;

    /// Clip `window` (in the target system) and reproject it onto `target`.
    fn reproject(&self, _window: &Extent, _target: &TargetGrid) -> Result<Raster> {
        Err(HelError::Unavailable("DEM reprojection".into()))
    }
}

/// DEM clipped to the buffered area of interest.
#[derive(Debug, Clone)]
pub struct ExtractedTerrain {
    pub dem: Raster,
    pub units: UnitResolution,
    pub resampled: bool,
}

/// Where the fields live and how elevations are measured.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldReference<'a> {
    pub unit: LinearUnit,
    pub epsg: Option<u16>,
    pub z_units: Option<&'a str>,
}

fn z_unit(configured: Option<&str>, described: Option<LinearUnit>, xy: LinearUnit) -> Result<(LinearUnit, bool)> {
    match configured.map(str::trim).filter(|s| !s.is_empty()) {
        Some(name) => Ok((name.parse()?, false)),
        None => match described {
            Some(z) => Ok((z, false)),
            None => Ok((xy, true)),
        },
    }
}

/// Produce the analysis DEM for `aoi` (the field envelope).
///
/// Local sources must already share the fields' projected system. Their
/// native cell size decides the path: finer cells are clipped then
/// resampled, equal cells are only clipped, coarser cells are fatal.
pub fn extract_terrain(
    source: &dyn TerrainSource,
    aoi: &Extent,
    fields: FieldReference<'_>,
) -> Result<ExtractedTerrain> {
    let desc = source.describe()?;
    info!(dem = %desc.name, crs = %desc.coordinate_system, "extracting terrain");

    if desc.remote {
        let unit = fields.unit;
        let (z, z_defaulted) = z_unit(fields.z_units, desc.z_unit, unit)?;
        let target = TargetGrid {
            unit,
            epsg: fields.epsg,
            cell_size: unit.from_meters(TARGET_CELL_METERS),
        };
        let window = aoi.buffered(unit.from_meters(BUFFER_METERS));
        let dem = source.reproject(&window, &target)?;
        info!(width = dem.width, height = dem.height, "remote terrain reprojected");
        return Ok(ExtractedTerrain {
            dem,
            units: UnitResolution::new(unit, z, z_defaulted),
            resampled: true,
        });
    }

    match desc.coordinate_system {
        CoordinateSystem::Projected { .. } => {}
        CoordinateSystem::Geographic { .. } => {
            return Err(HelError::NotProjected { name: desc.name });
        }
        CoordinateSystem::Unknown => {
            return Err(HelError::UndeterminedDem { name: desc.name, what: "coordinate system" });
        }
    }
    let unit = desc.linear_unit.ok_or_else(|| HelError::UndeterminedDem {
        name: desc.name.clone(),
        what: "linear unit",
    })?;
    let cell = desc
        .cell_size
        .filter(|c| c.is_finite() && *c > 0.0)
        .ok_or_else(|| HelError::UndeterminedDem { name: desc.name.clone(), what: "cell size" })?;

    let epsg_mismatch = matches!(
        (desc.coordinate_system.epsg(), fields.epsg),
        (Some(a), Some(b)) if a != b
    );
    if unit != fields.unit || epsg_mismatch {
        return Err(HelError::CoordinateMismatch {
            name: desc.name,
            dem: format!("{} ({unit})", desc.coordinate_system),
            fields: match fields.epsg {
                Some(code) => format!("EPSG:{code} ({})", fields.unit),
                None => fields.unit.to_string(),
            },
        });
    }

    let (z, z_defaulted) = z_unit(fields.z_units, desc.z_unit, unit)?;
    let units = UnitResolution::new(unit, z, z_defaulted);
    let target = unit.from_meters(TARGET_CELL_METERS);
    let relative = (cell - target) / target;
    if relative > CELL_SIZE_TOLERANCE {
        return Err(HelError::CellTooCoarse {
            name: desc.name,
            cell_size: cell,
            target,
            unit: unit.to_string(),
        });
    }

    let window = aoi.buffered(unit.from_meters(BUFFER_METERS));
    if !desc.extent.intersects(&window) {
        return Err(HelError::DemOutsideExtent);
    }
    let clipped = source.read_window(&window)?;
    debug!(width = clipped.width, height = clipped.height, cell, "DEM clipped");

    if relative < -CELL_SIZE_TOLERANCE {
        let dem = resample::resample_bilinear(&clipped, target);
        info!(from = cell, to = target, unit = %unit, "DEM resampled");
        Ok(ExtractedTerrain { dem, units, resampled: true })
    } else {
        info!(cell, unit = %unit, "DEM at analysis resolution; clip only");
        Ok(ExtractedTerrain { dem: clipped, units, resampled: false })
    }
}

/// Local source for `path`: GeoTIFF for `.tif`/`.tiff`, grid file otherwise.
pub fn open_dem(path: &Path) -> Box<dyn TerrainSource> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("tif") | Some("tiff") => Box::new(GeoTiffSource::new(path)),
        _ => Box::new(GridFileSource::new(path)),
    }
}

// ── In-memory and grid-file sources ───────────────────────────────────────────

/// DEM held in memory. Counts requests so callers can tell whether terrain
/// extraction ran.
pub struct MemorySource {
    pub name: String,
    pub grid: Raster,
    pub reference: GridReference,
    describes: Cell<usize>,
    reads: Cell<usize>,
}

impl MemorySource {
    pub fn new(name: &str, grid: Raster, reference: GridReference) -> Self {
        Self {
            name: name.to_string(),
            grid,
            reference,
            describes: Cell::new(0),
            reads: Cell::new(0),
        }
    }

    /// Projected DEM in `unit`.
    pub fn projected(name: &str, grid: Raster, unit: LinearUnit) -> Self {
        let reference = GridReference {
            projected: true,
            epsg: None,
            linear_unit: Some(unit),
            z_unit: None,
        };
        Self::new(name, grid, reference)
    }

    pub fn reads(&self) -> usize {
        self.reads.get()
    }

    pub fn describes(&self) -> usize {
        self.describes.get()
    }
}

fn describe_reference(name: &str, extent: Extent, cell_size: f64, reference: &GridReference) -> DemDescription {
    let coordinate_system = if reference.projected {
        CoordinateSystem::Projected { epsg: reference.epsg }
    } else if reference.epsg.is_some() {
        CoordinateSystem::Geographic { epsg: reference.epsg }
    } else {
        CoordinateSystem::Unknown
    };
    DemDescription {
        name: name.to_string(),
        coordinate_system,
        linear_unit: reference.linear_unit,
        z_unit: reference.z_unit,
        cell_size: Some(cell_size),
        extent,
        remote: false,
    }
}

impl TerrainSource for MemorySource {
    fn describe(&self) -> Result<DemDescription> {
        self.describes.set(self.describes.get() + 1);
        Ok(describe_reference(&self.name, self.grid.extent(), self.grid.cell_size(), &self.reference))
    }

    fn read_window(&self, window: &Extent) -> Result<Raster> {
        self.reads.set(self.reads.get() + 1);
        resample::clip(&self.grid, window).ok_or(HelError::DemOutsideExtent)
    }
}

/// DEM stored in the crate's grid-file format (as written by `dem_merge`).
pub struct GridFileSource {
    stem: PathBuf,
}

impl GridFileSource {
    pub fn new(path: &Path) -> Self {
        Self { stem: path.to_path_buf() }
    }

    fn name(&self) -> String {
        self.stem.display().to_string()
    }
}

impl TerrainSource for GridFileSource {
    fn describe(&self) -> Result<DemDescription> {
        let header = gridfile::read_header(&self.stem)?;
        let extent = Extent::new(
            header.min_x,
            header.max_y - header.height as f64 * header.cell_size,
            header.min_x + header.width as f64 * header.cell_size,
            header.max_y,
        );
        Ok(describe_reference(&self.name(), extent, header.cell_size, &header.reference))
    }

    fn read_window(&self, window: &Extent) -> Result<Raster> {
        let (_, grid) = gridfile::read::<f32>(&self.stem)?;
        resample::clip(&grid, window).ok_or(HelError::DemOutsideExtent)
    }
}
