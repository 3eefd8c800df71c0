//! 3×3 focal statistics that skip no-data ("DATA" mode): a cell gets a value
//! whenever at least one cell of its neighbourhood is valid.
use crate::raster::Raster;

fn focal<F: Fn(f32, f32) -> f32>(grid: &Raster, init: f32, fold: F, finish: impl Fn(f32, u32) -> f32) -> Raster {
    let mut out = grid.like(f32::NAN);
    for r in 0..grid.height {
        for c in 0..grid.width {
            let mut acc = init;
            let mut n = 0u32;
            for dr in -1..=1 {
                for dc in -1..=1 {
                    if let Some(v) = grid.neighbor(r, c, dr, dc) {
                        if !v.is_nan() {
                            acc = fold(acc, v);
                            n += 1;
                        }
                    }
                }
            }
            if n > 0 {
                out.set(r, c, finish(acc, n));
            }
        }
    }
    out
}

/// Neighbourhood mean; used to smooth slope.
pub fn focal_mean(grid: &Raster) -> Raster {
    focal(grid, 0.0, |a, v| a + v, |sum, n| sum / n as f32)
}

/// Neighbourhood maximum; used to smooth flow length.
pub fn focal_max(grid: &Raster) -> Raster {
    focal(grid, f32::NEG_INFINITY, f32::max, |m, _| m)
}
