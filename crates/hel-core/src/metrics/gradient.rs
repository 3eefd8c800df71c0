//! Shared Horn (1981) 3×3 gradient used by the slope surface.
//! `pub(crate)` only; not re-exported from metrics/mod.rs.

use crate::raster::Raster;

/// Horn (1981) weighted 3×3 gradient at cell `(r, c)`.
///
/// Returns `(dz_dx, dz_dy)` in elevation units per map unit. Neighbours that
/// are off the grid or no-data take the centre value, so a grid border and a
/// no-data border produce the same result. Returns `None` for a no-data
/// centre.
///
/// 3×3 neighbourhood layout (row 0 is north):
/// ```text
///   NW(-1,-1)  N(-1, 0)  NE(-1,+1)
///   W ( 0,-1)  *         E ( 0,+1)
///   SW(+1,-1)  S(+1, 0)  SE(+1,+1)
/// ```
///
/// `dz/dx = ((NE + 2E + SE) − (NW + 2W + SW)) / (8 · cellsize)`
/// `dz/dy = ((NW + 2N + NE) − (SW + 2S + SE)) / (8 · cellsize)`
pub(crate) fn horn_gradient(dem: &Raster, r: usize, c: usize, cellsize: f64) -> Option<(f64, f64)> {
    let z = dem.get(r, c);
    if z.is_nan() {
        return None;
    }
    let at = |dr: isize, dc: isize| -> f64 {
        match dem.neighbor(r, c, dr, dc) {
            Some(v) if !v.is_nan() => v as f64,
            _ => z as f64,
        }
    };
    let nw = at(-1, -1);
    let n  = at(-1,  0);
    let ne = at(-1,  1);
    let w  = at( 0, -1);
    let e  = at( 0,  1);
    let sw = at( 1, -1);
    let s  = at( 1,  0);
    let se = at( 1,  1);

    let dz_dx = ((ne + 2.0 * e + se) - (nw + 2.0 * w + sw)) / (8.0 * cellsize);
    let dz_dy = ((nw + 2.0 * n + ne) - (sw + 2.0 * s + se)) / (8.0 * cellsize);
    Some((dz_dx, dz_dy))
}
