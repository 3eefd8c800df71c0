//! Upstream flow length: the longest flow path reaching each cell.
use std::collections::VecDeque;

use super::flow_routing::{step_length, FlowField};
use crate::raster::Raster;

/// Longest upstream path per cell in map units, over valid cells of `dem`.
///
/// Cells are visited in topological order of the flow graph, so every donor
/// is final before its receiver: `len[d] = max(len[d], len[c] + step)`.
pub fn upstream_flow_length(dem: &Raster, flow: &FlowField) -> Raster {
    let (w, h) = (dem.width, dem.height);
    let cellsize = dem.cell_size();
    let mut length = dem.map(|z| if z.is_nan() { f32::NAN } else { 0.0 });

    let receiver: Vec<Option<usize>> = (0..w * h)
        .map(|i| {
            let (r, c) = (i / w, i % w);
            if dem.data[i].is_nan() {
                return None;
            }
            flow.downstream(r, c)
                .map(|(nr, nc)| nr * w + nc)
                .filter(|&j| !dem.data[j].is_nan())
        })
        .collect();

    let mut donors = vec![0u32; w * h];
    for &j in receiver.iter().flatten() {
        donors[j] += 1;
    }

    let mut queue: VecDeque<usize> = (0..w * h)
        .filter(|&i| donors[i] == 0 && !dem.data[i].is_nan())
        .collect();
    let mut acc = vec![0.0f64; w * h];
    while let Some(i) = queue.pop_front() {
        length.data[i] = acc[i] as f32;
        let Some(j) = receiver[i] else {
            continue;
        };
        let step = step_length(flow.direction.data[i], cellsize);
        acc[j] = acc[j].max(acc[i] + step);
        donors[j] -= 1;
        if donors[j] == 0 {
            queue.push_back(j);
        }
    }
    length
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hydraulic::flow_routing::compute_d8_flow;
    use approx::assert_relative_eq;

    #[test]
    fn straight_channel_accumulates_cell_steps() {
        // Valley along row 2 falling east; side rows drain into it.
        let mut dem = Raster::new(6, 5, 0.0, 15.0, 3.0, 0.0);
        for r in 0..5 {
            for c in 0..6 {
                let side = (r as f32 - 2.0).abs() * 5.0;
                dem.set(r, c, 100.0 - c as f32 + side);
            }
        }
        let flow = compute_d8_flow(&dem);
        let len = upstream_flow_length(&dem, &flow);
        // Border cells drain off the grid and have no donors.
        assert_eq!(len.get(0, 3), 0.0);
        // (2, 1) is fed only by the side cells straight north and south.
        assert_relative_eq!(len.get(2, 1), 3.0, epsilon = 1e-4);
        // Down the channel the path grows by one cell per step.
        assert_relative_eq!(len.get(2, 4), 12.0, epsilon = 1e-4);
        assert_relative_eq!(len.get(2, 5), 15.0, epsilon = 1e-4);
        assert_eq!(flow.direction.get(1, 3), 4);
    }

    #[test]
    fn nodata_stays_nodata() {
        let mut dem = Raster::new(3, 3, 0.0, 9.0, 3.0, 1.0);
        dem.set(1, 1, f32::NAN);
        let len = upstream_flow_length(&dem, &compute_d8_flow(&dem));
        assert!(len.get(1, 1).is_nan());
        assert_eq!(len.get(0, 0), 0.0);
    }

    #[test]
    fn nodata_padding_leaves_routing_unchanged() {
        let n = 12;
        let pad = 2;
        let mut inner = Raster::new(n, n, 0.0, n as f64 * 3.0, 3.0, 0.0);
        for r in 0..n {
            for c in 0..n {
                let bump = ((r * 7 + c * 13) % 11) as f32;
                inner.set(r, c, bump + 0.3 * r as f32 + 0.1 * (c * c) as f32);
            }
        }
        let size = n + 2 * pad;
        let offset = pad as f64 * 3.0;
        let mut padded = Raster::new(size, size, -offset, n as f64 * 3.0 + offset, 3.0, f32::NAN);
        for r in 0..n {
            for c in 0..n {
                padded.set(r + pad, c + pad, inner.get(r, c));
            }
        }

        let (fa, fb) = (compute_d8_flow(&inner), compute_d8_flow(&padded));
        let (la, lb) = (upstream_flow_length(&inner, &fa), upstream_flow_length(&padded, &fb));
        for r in 0..n {
            for c in 0..n {
                assert_eq!(fa.direction.get(r, c), fb.direction.get(r + pad, c + pad));
                assert_eq!(la.get(r, c), lb.get(r + pad, c + pad));
            }
        }
        assert_eq!(fb.direction.get(0, 0), 0);
        assert!(lb.get(0, 0).is_nan());
    }
}
