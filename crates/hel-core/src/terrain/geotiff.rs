//! Local GeoTIFF DEMs.
//!
//! Only the north-up subset of GeoTIFF is understood: a single tiepoint plus
//! pixel scale. Spatial reference comes from the GeoKey directory.
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use tiff::decoder::{Decoder, DecodingResult};
use tiff::tags::Tag;
use tracing::debug;

use crate::error::{HelError, Result};
use crate::geometry::Extent;
use crate::gridfile::GridReference;
use crate::raster::Raster;
use crate::units::LinearUnit;

use super::{describe_reference, resample, DemDescription, TerrainSource};

// GeoKey ids.
const GT_MODEL_TYPE: u16 = 1024;
const GT_RASTER_TYPE: u16 = 1025;
const GEOGRAPHIC_TYPE: u16 = 2048;
const PROJECTED_CS_TYPE: u16 = 3072;
const PROJ_LINEAR_UNITS: u16 = 3076;
const VERTICAL_UNITS: u16 = 4099;

const MODEL_TYPE_PROJECTED: u16 = 1;
const MODEL_TYPE_GEOGRAPHIC: u16 = 2;
const RASTER_PIXEL_IS_POINT: u16 = 2;
/// Codes at or above this are "user defined" or "undefined".
const USER_DEFINED: u16 = 32767;

/// Spatial-reference keys read from a GeoKey directory. Absent keys are `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GeoKeys {
    pub model_type: Option<u16>,
    pub raster_type: Option<u16>,
    pub projected_epsg: Option<u16>,
    pub geographic_epsg: Option<u16>,
    pub linear_units: Option<u16>,
    pub vertical_units: Option<u16>,
}

impl GeoKeys {
    /// Parse the `GeoKeyDirectoryTag` payload. Keys whose value lives in
    /// another tag (doubles, ASCII) are skipped.
    pub fn parse(directory: &[u16]) -> Self {
        let mut keys = GeoKeys::default();
        let Some(header) = directory.get(..4) else {
            return keys;
        };
        let count = header[3] as usize;
        for entry in directory[4..].chunks_exact(4).take(count) {
            let (id, location, value) = (entry[0], entry[1], entry[3]);
            if location != 0 {
                continue;
            }
            let slot = match id {
                GT_MODEL_TYPE => &mut keys.model_type,
                GT_RASTER_TYPE => &mut keys.raster_type,
                GEOGRAPHIC_TYPE => &mut keys.geographic_epsg,
                PROJECTED_CS_TYPE => &mut keys.projected_epsg,
                PROJ_LINEAR_UNITS => &mut keys.linear_units,
                VERTICAL_UNITS => &mut keys.vertical_units,
                _ => continue,
            };
            if value > 0 && value < USER_DEFINED {
                *slot = Some(value);
            }
        }
        keys
    }

    pub fn reference(&self) -> GridReference {
        let projected = self.model_type == Some(MODEL_TYPE_PROJECTED)
            || (self.model_type.is_none() && self.projected_epsg.is_some());
        let epsg = if projected {
            self.projected_epsg
        } else if self.model_type == Some(MODEL_TYPE_GEOGRAPHIC) || self.geographic_epsg.is_some() {
            self.geographic_epsg.or(Some(4326))
        } else {
            None
        };
        GridReference {
            projected,
            epsg,
            linear_unit: self.linear_units.and_then(unit_from_code),
            z_unit: self.vertical_units.and_then(unit_from_code),
        }
    }
}

/// EPSG unit-of-measure code to a linear unit.
pub fn unit_from_code(code: u16) -> Option<LinearUnit> {
    match code {
        9001 => Some(LinearUnit::Meter),
        9002 | 9003 => Some(LinearUnit::Foot),
        _ => None,
    }
}

/// Georeferencing of one GeoTIFF, read without decoding pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoTiffInfo {
    pub width: usize,
    pub height: usize,
    pub cell_size: f64,
    pub min_x: f64,
    pub max_y: f64,
    pub keys: GeoKeys,
    pub nodata: Option<f64>,
    /// Name of the decoded sample type, e.g. `f32`.
    pub sample_type: Option<&'static str>,
}

impl GeoTiffInfo {
    pub fn extent(&self) -> Extent {
        Extent::new(
            self.min_x,
            self.max_y - self.height as f64 * self.cell_size,
            self.min_x + self.width as f64 * self.cell_size,
            self.max_y,
        )
    }

    pub fn reference(&self) -> GridReference {
        self.keys.reference()
    }
}

fn open(path: &Path) -> Result<Decoder<BufReader<File>>> {
    Ok(Decoder::new(BufReader::new(File::open(path)?))?)
}

fn read_georeferencing<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
    path: &Path,
) -> Result<GeoTiffInfo> {
    let (width, height) = decoder.dimensions()?;
    let scale = decoder.get_tag_f64_vec(Tag::ModelPixelScaleTag)?;
    let tiepoint = decoder.get_tag_f64_vec(Tag::ModelTiepointTag)?;
    if scale.len() < 2 || tiepoint.len() < 6 {
        return Err(HelError::Unsupported(format!("{} has no usable geotransform", path.display())));
    }
    let (sx, sy) = (scale[0], scale[1]);
    if (sx - sy).abs() > sx.abs() * 1e-9 {
        return Err(HelError::Unsupported(format!(
            "{} has non-square cells ({sx} x {sy})",
            path.display()
        )));
    }

    let keys = match decoder.find_tag(Tag::GeoKeyDirectoryTag)? {
        Some(value) => GeoKeys::parse(&value.into_u16_vec()?),
        None => GeoKeys::default(),
    };
    let nodata = match decoder.find_tag(Tag::GdalNodata)? {
        Some(value) => value.into_string()?.trim_matches(char::from(0)).trim().parse().ok(),
        None => None,
    };

    // Tiepoint maps raster (i, j) to model (x, y).
    let (i, j, x, y) = (tiepoint[0], tiepoint[1], tiepoint[3], tiepoint[4]);
    let mut min_x = x - i * sx;
    let mut max_y = y + j * sy;
    if keys.raster_type == Some(RASTER_PIXEL_IS_POINT) {
        min_x -= sx / 2.0;
        max_y += sy / 2.0;
    }

    Ok(GeoTiffInfo {
        width: width as usize,
        height: height as usize,
        cell_size: sx,
        min_x,
        max_y,
        keys,
        nodata,
        sample_type: None,
    })
}

/// Georeferencing of `path` without reading the image.
pub fn read_info(path: &Path) -> Result<GeoTiffInfo> {
    let mut decoder = open(path)?;
    read_georeferencing(&mut decoder, path)
}

fn to_f32(image: DecodingResult) -> (&'static str, Vec<f32>) {
    match image {
        DecodingResult::U8(v) => ("u8", v.into_iter().map(f32::from).collect()),
        DecodingResult::U16(v) => ("u16", v.into_iter().map(f32::from).collect()),
        DecodingResult::U32(v) => ("u32", v.into_iter().map(|x| x as f32).collect()),
        DecodingResult::U64(v) => ("u64", v.into_iter().map(|x| x as f32).collect()),
        DecodingResult::I8(v) => ("i8", v.into_iter().map(f32::from).collect()),
        DecodingResult::I16(v) => ("i16", v.into_iter().map(f32::from).collect()),
        DecodingResult::I32(v) => ("i32", v.into_iter().map(|x| x as f32).collect()),
        DecodingResult::I64(v) => ("i64", v.into_iter().map(|x| x as f32).collect()),
        DecodingResult::F32(v) => ("f32", v),
        DecodingResult::F64(v) => ("f64", v.into_iter().map(|x| x as f32).collect()),
    }
}

/// Decode the whole first band of `path` as `f32`, with no-data as `NaN`.
pub fn read_geotiff(path: &Path) -> Result<(GeoTiffInfo, Raster)> {
    let mut decoder = open(path)?;
    let mut info = read_georeferencing(&mut decoder, path)?;
    let (sample_type, mut data) = to_f32(decoder.read_image()?);
    info.sample_type = Some(sample_type);

    let n = info.width * info.height;
    if data.len() < n {
        return Err(HelError::Unsupported(format!(
            "{} decoded {} samples for {} cells",
            path.display(),
            data.len(),
            n
        )));
    }
    // Multi-band images are interleaved; keep band 1.
    let bands = data.len() / n;
    if bands > 1 {
        data = data.into_iter().step_by(bands).take(n).collect();
    }
    if let Some(nodata) = info.nodata {
        let nodata = nodata as f32;
        for v in &mut data {
            if *v == nodata {
                *v = f32::NAN;
            }
        }
    }

    let raster = Raster {
        data,
        width: info.width,
        height: info.height,
        min_x: info.min_x,
        max_x: info.min_x + info.width as f64 * info.cell_size,
        min_y: info.max_y - info.height as f64 * info.cell_size,
        max_y: info.max_y,
    };
    debug!(path = %path.display(), width = raster.width, height = raster.height, sample_type, "GeoTIFF decoded");
    Ok((info, raster))
}

/// DEM stored as a GeoTIFF on local disk.
pub struct GeoTiffSource {
    path: PathBuf,
}

impl GeoTiffSource {
    pub fn new(path: &Path) -> Self {
        Self { path: path.to_path_buf() }
    }
}

impl TerrainSource for GeoTiffSource {
    fn describe(&self) -> Result<DemDescription> {
        let info = read_info(&self.path)?;
        Ok(describe_reference(
            &self.path.display().to_string(),
            info.extent(),
            info.cell_size,
            &info.reference(),
        ))
    }

    fn read_window(&self, window: &Extent) -> Result<Raster> {
        let (_, grid) = read_geotiff(&self.path)?;
        resample::clip(&grid, window).ok_or(HelError::DemOutsideExtent)
    }
}
