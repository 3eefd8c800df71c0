//! Percent-rise slope surface (Horn method).
//!
//! `slope = 100 · √(dz_dx² + dz_dy²)` with elevations scaled by the
//! Z-factor, so rise and run share the horizontal unit.
use crate::raster::Raster;
use super::gradient::horn_gradient;

/// Percent slope at every cell of `dem`. No-data cells stay `NaN`.
pub fn compute_slope(dem: &Raster, z_factor: f64) -> Raster {
    let mut out = dem.like(f32::NAN);
    let cellsize = dem.cell_size();
    if cellsize <= 0.0 {
        return out;
    }
    for r in 0..dem.height {
        for c in 0..dem.width {
            if let Some((dz_dx, dz_dy)) = horn_gradient(dem, r, c, cellsize) {
                let rise = (dz_dx * dz_dx + dz_dy * dz_dy).sqrt() * z_factor;
                out.set(r, c, (rise * 100.0) as f32);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Planar ramp rising eastward by `pct` percent on 3 m cells.
    fn make_ramp(n: usize, pct: f64) -> Raster {
        let mut dem = Raster::new(n, n, 0.0, n as f64 * 3.0, 3.0, 0.0);
        for r in 0..n {
            for c in 0..n {
                dem.set(r, c, (c as f64 * 3.0 * pct / 100.0) as f32);
            }
        }
        dem
    }

    #[test]
    fn ramp_interior_matches_gradient() {
        let slope = compute_slope(&make_ramp(16, 4.0), 1.0);
        for r in 1..15 {
            for c in 1..15 {
                assert_relative_eq!(slope.get(r, c), 4.0, epsilon = 1e-3);
            }
        }
    }

    #[test]
    fn z_factor_scales_rise() {
        // Feet of elevation on a metre grid.
        let slope = compute_slope(&make_ramp(8, 10.0), 0.3048);
        assert_relative_eq!(slope.get(4, 4), 3.048, epsilon = 1e-3);
    }

    #[test]
    fn nodata_border_equals_grid_border() {
        let inner = make_ramp(6, 5.0);
        let mut padded = Raster::new(8, 8, -3.0, 21.0, 3.0, f32::NAN);
        for r in 0..6 {
            for c in 0..6 {
                padded.set(r + 1, c + 1, inner.get(r, c));
            }
        }
        let a = compute_slope(&inner, 1.0);
        let b = compute_slope(&padded, 1.0);
        for r in 0..6 {
            for c in 0..6 {
                assert_eq!(a.get(r, c), b.get(r + 1, c + 1));
            }
        }
        assert!(b.get(0, 0).is_nan());
    }

    #[test]
    fn flat_field_has_zero_slope() {
        let dem = Raster::new(5, 5, 0.0, 15.0, 3.0, 100.0);
        assert!(compute_slope(&dem, 1.0).data.iter().all(|&s| s == 0.0));
    }
}
