use serde::{Deserialize, Serialize};

use crate::geometry::Extent;

/// A regular, square-celled grid in projected map units, row-major.
///
/// Row 0 is the northern edge (`max_y`), matching GeoTIFF storage order.
/// Float grids mark no-data with `NaN`; class and zone grids use `0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grid<T> {
    pub data: Vec<T>,
    pub width: usize,
    pub height: usize,
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

/// Elevation and every derived float surface.
pub type Raster = Grid<f32>;

impl<T: Copy> Grid<T> {
    /// Create a grid of `width × height` cells of `cell_size` whose north-west
    /// corner is `(min_x, max_y)`.
    pub fn new(width: usize, height: usize, min_x: f64, max_y: f64, cell_size: f64, fill: T) -> Self {
        Self {
            data: vec![fill; width * height],
            width,
            height,
            min_x,
            max_x: min_x + width as f64 * cell_size,
            min_y: max_y - height as f64 * cell_size,
            max_y,
        }
    }

    /// A grid with the same lattice as `self`, filled with `fill`.
    pub fn like<U: Copy>(&self, fill: U) -> Grid<U> {
        Grid {
            data: vec![fill; self.width * self.height],
            width: self.width,
            height: self.height,
            min_x: self.min_x,
            max_x: self.max_x,
            min_y: self.min_y,
            max_y: self.max_y,
        }
    }

    /// Apply `f` to every cell, keeping the lattice.
    pub fn map<U, F: FnMut(T) -> U>(&self, f: F) -> Grid<U> {
        Grid {
            data: self.data.iter().copied().map(f).collect(),
            width: self.width,
            height: self.height,
            min_x: self.min_x,
            max_x: self.max_x,
            min_y: self.min_y,
            max_y: self.max_y,
        }
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> T {
        self.data[row * self.width + col]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, val: T) {
        self.data[row * self.width + col] = val;
    }

    /// Value at `(row + dr, col + dc)`, or `None` off the grid.
    #[inline]
    pub fn neighbor(&self, row: usize, col: usize, dr: isize, dc: isize) -> Option<T> {
        let r = row as isize + dr;
        let c = col as isize + dc;
        if r < 0 || c < 0 || r >= self.height as isize || c >= self.width as isize {
            return None;
        }
        Some(self.get(r as usize, c as usize))
    }
}

impl<T> Grid<T> {
    pub fn cell_size(&self) -> f64 {
        if self.width == 0 {
            return 0.0;
        }
        (self.max_x - self.min_x) / self.width as f64
    }

    pub fn cell_area(&self) -> f64 {
        let cs = self.cell_size();
        cs * cs
    }

    pub fn extent(&self) -> Extent {
        Extent::new(self.min_x, self.min_y, self.max_x, self.max_y)
    }

    /// Map coordinates of the centre of cell `(row, col)`.
    #[inline]
    pub fn cell_center(&self, row: usize, col: usize) -> (f64, f64) {
        let cs = self.cell_size();
        (
            self.min_x + (col as f64 + 0.5) * cs,
            self.max_y - (row as f64 + 0.5) * cs,
        )
    }

    /// Cell containing `(x, y)`, or `None` outside the grid.
    pub fn cell_of(&self, x: f64, y: f64) -> Option<(usize, usize)> {
        if x < self.min_x || x >= self.max_x || y <= self.min_y || y > self.max_y {
            return None;
        }
        let cs = self.cell_size();
        let col = ((x - self.min_x) / cs).floor() as usize;
        let row = ((self.max_y - y) / cs).floor() as usize;
        Some((row.min(self.height - 1), col.min(self.width - 1)))
    }

    /// Inclusive row/column window whose cell centres may fall inside `extent`.
    pub fn window(&self, extent: &Extent) -> Option<(usize, usize, usize, usize)> {
        let cs = self.cell_size();
        if cs <= 0.0 || !self.extent().intersects(extent) {
            return None;
        }
        let c0 = ((extent.min_x - self.min_x) / cs - 0.5).floor().max(0.0) as usize;
        let c1 = ((extent.max_x - self.min_x) / cs - 0.5).ceil().max(0.0) as usize;
        let r0 = ((self.max_y - extent.max_y) / cs - 0.5).floor().max(0.0) as usize;
        let r1 = ((self.max_y - extent.min_y) / cs - 0.5).ceil().max(0.0) as usize;
        Some((
            r0.min(self.height - 1),
            r1.min(self.height - 1),
            c0.min(self.width - 1),
            c1.min(self.width - 1),
        ))
    }

    pub fn same_lattice<U>(&self, other: &Grid<U>) -> bool {
        self.width == other.width
            && self.height == other.height
            && (self.min_x - other.min_x).abs() < 1e-9
            && (self.max_y - other.max_y).abs() < 1e-9
            && (self.cell_size() - other.cell_size()).abs() < 1e-9
    }
}

impl Grid<f32> {
    /// Sample the grid at `(x, y)` using bilinear interpolation between the
    /// four nearest cell centres. Returns `None` outside the grid or when any
    /// contributing cell is no-data.
    pub fn sample(&self, x: f64, y: f64) -> Option<f32> {
        if self.width == 0 || self.height == 0 {
            return None;
        }
        if x < self.min_x || x > self.max_x || y < self.min_y || y > self.max_y {
            return None;
        }
        let cs = self.cell_size();
        let fx = ((x - self.min_x) / cs - 0.5).clamp(0.0, (self.width - 1) as f64);
        let fy = ((self.max_y - y) / cs - 0.5).clamp(0.0, (self.height - 1) as f64);

        let x0 = fx.floor() as usize;
        let y0 = fy.floor() as usize;
        let x1 = (x0 + 1).min(self.width - 1);
        let y1 = (y0 + 1).min(self.height - 1);

        let tx = (fx - x0 as f64) as f32;
        let ty = (fy - y0 as f64) as f32;

        let v00 = self.get(y0, x0);
        let v10 = self.get(y0, x1);
        let v01 = self.get(y1, x0);
        let v11 = self.get(y1, x1);

        let v = v00 * (1.0 - tx) * (1.0 - ty)
            + v10 * tx * (1.0 - ty)
            + v01 * (1.0 - tx) * ty
            + v11 * tx * ty;

        if v.is_nan() {
            None
        } else {
            Some(v)
        }
    }

    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|v| !v.is_nan()).count()
    }
}
