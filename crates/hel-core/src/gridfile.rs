//! On-disk grid format: a JSON header next to a little-endian binary body.
//!
//! `<stem>.json` holds the lattice and optional spatial reference,
//! `<stem>.bin` holds `width × height` cells row by row from the north edge.
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{HelError, Result};
use crate::raster::Grid;
use crate::units::LinearUnit;

/// Cell types that can be stored in a grid file.
pub trait CellValue: Copy {
    const KIND: &'static str;
    const SIZE: usize;
    fn write_le(self, out: &mut Vec<u8>);
    fn read_le(bytes: &[u8]) -> Self;
}

impl CellValue for f32 {
    const KIND: &'static str = "f32";
    const SIZE: usize = 4;
    fn write_le(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }
    fn read_le(bytes: &[u8]) -> Self {
        f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
    }
}

impl CellValue for u32 {
    const KIND: &'static str = "u32";
    const SIZE: usize = 4;
    fn write_le(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }
    fn read_le(bytes: &[u8]) -> Self {
        u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
    }
}

impl CellValue for u8 {
    const KIND: &'static str = "u8";
    const SIZE: usize = 1;
    fn write_le(self, out: &mut Vec<u8>) {
        out.push(self);
    }
    fn read_le(bytes: &[u8]) -> Self {
        bytes[0]
    }
}

/// Spatial reference carried alongside a grid.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GridReference {
    pub projected: bool,
    pub epsg: Option<u16>,
    pub linear_unit: Option<LinearUnit>,
    pub z_unit: Option<LinearUnit>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridHeader {
    pub cell_type: String,
    pub width: usize,
    pub height: usize,
    pub min_x: f64,
    pub max_y: f64,
    pub cell_size: f64,
    #[serde(default)]
    pub reference: GridReference,
}

/// Paths of the header and body for `stem` (extension ignored).
pub fn paths(stem: &Path) -> (PathBuf, PathBuf) {
    (stem.with_extension("json"), stem.with_extension("bin"))
}

/// Write `grid`, returning the two files created.
pub fn write<T: CellValue>(stem: &Path, grid: &Grid<T>, reference: &GridReference) -> Result<Vec<PathBuf>> {
    let (header_path, body_path) = paths(stem);
    let header = GridHeader {
        cell_type: T::KIND.to_string(),
        width: grid.width,
        height: grid.height,
        min_x: grid.min_x,
        max_y: grid.max_y,
        cell_size: grid.cell_size(),
        reference: reference.clone(),
    };
    let mut body = Vec::with_capacity(grid.data.len() * T::SIZE);
    for &v in &grid.data {
        v.write_le(&mut body);
    }
    fs::write(&header_path, serde_json::to_string_pretty(&header)?)?;
    fs::write(&body_path, body)?;
    Ok(vec![header_path, body_path])
}

pub fn read_header(stem: &Path) -> Result<GridHeader> {
    let (header_path, _) = paths(stem);
    Ok(serde_json::from_str(&fs::read_to_string(header_path)?)?)
}

pub fn read<T: CellValue>(stem: &Path) -> Result<(GridHeader, Grid<T>)> {
    let header = read_header(stem)?;
    if header.cell_type != T::KIND {
        return Err(HelError::Unsupported(format!(
            "grid {} holds {} cells, expected {}",
            stem.display(),
            header.cell_type,
            T::KIND
        )));
    }
    let (_, body_path) = paths(stem);
    let body = fs::read(body_path)?;
    let n = header.width * header.height;
    if body.len() != n * T::SIZE {
        return Err(HelError::Unsupported(format!(
            "grid {} body has {} bytes, expected {}",
            stem.display(),
            body.len(),
            n * T::SIZE
        )));
    }
    let data = body.chunks_exact(T::SIZE).map(T::read_le).collect();
    let grid = Grid {
        data,
        width: header.width,
        height: header.height,
        min_x: header.min_x,
        max_x: header.min_x + header.width as f64 * header.cell_size,
        min_y: header.max_y - header.height as f64 * header.cell_size,
        max_y: header.max_y,
    };
    Ok((header, grid))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nan_cells_survive_a_write_read_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let stem = dir.path().join("dem");

        let mut g: Grid<f32> = Grid::new(3, 2, 500.0, 900.0, 3.0, 12.5);
        g.set(1, 2, f32::NAN);
        let reference = GridReference {
            projected: true,
            epsg: Some(26915),
            linear_unit: Some(LinearUnit::Meter),
            z_unit: None,
        };
        let files = write(&stem, &g, &reference).unwrap();
        assert_eq!(files.len(), 2);

        let (header, back) = read::<f32>(&stem).unwrap();
        assert_eq!(header.reference, reference);
        assert_eq!(back.min_y, 894.0);
        assert_eq!(back.get(0, 0), 12.5);
        assert!(back.get(1, 2).is_nan());
        assert!(read::<u8>(&stem).is_err());
    }
}
