//! D8 flow direction with ESRI direction codes.
//!
//! ```text
//!   32  64  128
//!   16   *    1
//!    8   4    2
//! ```
//! `0` marks a sink or flat cell; no-data cells are `0` too.
use crate::raster::{Grid, Raster};

/// (code, row offset, column offset) in the fixed search order.
pub const D8: [(u8, isize, isize); 8] = [
    (1, 0, 1),
    (2, 1, 1),
    (4, 1, 0),
    (8, 1, -1),
    (16, 0, -1),
    (32, -1, -1),
    (64, -1, 0),
    (128, -1, 1),
];

pub struct FlowField {
    pub direction: Grid<u8>,
}

impl FlowField {
    /// Downstream cell of `(r, c)`, or `None` for sinks and cells that drain
    /// off the valid surface.
    pub fn downstream(&self, r: usize, c: usize) -> Option<(usize, usize)> {
        let code = self.direction.get(r, c);
        let &(_, dr, dc) = D8.iter().find(|(k, _, _)| *k == code)?;
        let nr = r as isize + dr;
        let nc = c as isize + dc;
        if nr < 0 || nc < 0 || nr >= self.direction.height as isize || nc >= self.direction.width as isize {
            return None;
        }
        Some((nr as usize, nc as usize))
    }
}

/// Distance to the neighbour in direction `code`, in map units.
pub fn step_length(code: u8, cellsize: f64) -> f64 {
    match code {
        2 | 8 | 32 | 128 => cellsize * std::f64::consts::SQRT_2,
        _ => cellsize,
    }
}

/// Steepest-descent direction for every valid cell.
///
/// Edge cells (on the grid border or touching no-data) are forced to flow
/// outward, toward the first missing neighbour in `D8` order. Interior cells
/// take the strictly steepest drop; the first direction wins a tie.
pub fn compute_d8_flow(dem: &Raster) -> FlowField {
    let mut direction = dem.like(0u8);
    let cellsize = dem.cell_size();

    for r in 0..dem.height {
        for c in 0..dem.width {
            let z = dem.get(r, c);
            if z.is_nan() {
                continue;
            }
            let outward = D8.iter().find(|&&(_, dr, dc)| {
                dem.neighbor(r, c, dr, dc).map_or(true, f32::is_nan)
            });
            if let Some(&(code, _, _)) = outward {
                direction.set(r, c, code);
                continue;
            }

            let mut best = 0u8;
            let mut best_drop = 0.0f64;
            for &(code, dr, dc) in &D8 {
                let Some(zn) = dem.neighbor(r, c, dr, dc) else {
                    continue;
                };
                let drop = (z as f64 - zn as f64) / step_length(code, cellsize);
                if drop > best_drop {
                    best_drop = drop;
                    best = code;
                }
            }
            direction.set(r, c, best);
        }
    }
    FlowField { direction }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bowl_drains_to_centre_and_edges_flow_out() {
        let mut dem = Raster::new(5, 5, 0.0, 15.0, 3.0, 0.0);
        for r in 0..5 {
            for c in 0..5 {
                let d = (r as f32 - 2.0).abs().max((c as f32 - 2.0).abs());
                dem.set(r, c, d * 10.0);
            }
        }
        let flow = compute_d8_flow(&dem);
        // Centre is a sink.
        assert_eq!(flow.direction.get(2, 2), 0);
        // Inner ring points at the centre.
        assert_eq!(flow.direction.get(1, 2), 4);
        assert_eq!(flow.direction.get(2, 1), 1);
        assert_eq!(flow.direction.get(1, 1), 2);
        assert_eq!(flow.downstream(1, 1), Some((2, 2)));
        // Border cells are forced outward in search order.
        assert_eq!(flow.direction.get(0, 2), 32);
        assert_eq!(flow.direction.get(4, 4), 1);
        assert_eq!(flow.downstream(4, 4), None);
    }

    #[test]
    fn nodata_neighbour_forces_outward_flow() {
        let mut dem = Raster::new(5, 5, 0.0, 15.0, 3.0, 5.0);
        dem.set(2, 3, f32::NAN);
        dem.set(2, 1, 1.0);
        let flow = compute_d8_flow(&dem);
        // (2, 2) would drain west but touches no-data to the east.
        assert_eq!(flow.direction.get(2, 2), 1);
        assert_eq!(flow.direction.get(2, 3), 0);
    }
}
