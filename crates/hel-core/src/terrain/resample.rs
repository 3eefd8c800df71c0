//! Clip, bilinear resample and mosaic on regular grids.
use crate::geometry::Extent;
use crate::raster::Raster;

/// Cells of `grid` covering `window`, snapped outward to the grid lattice and
/// limited to the grid itself. `None` when they do not overlap.
pub fn clip(grid: &Raster, window: &Extent) -> Option<Raster> {
    let cs = grid.cell_size();
    let snapped = window.snap(grid.min_x, grid.max_y, cs);
    let area = snapped.intersection(&grid.extent())?;
    let c0 = ((area.min_x - grid.min_x) / cs).round() as usize;
    let c1 = ((area.max_x - grid.min_x) / cs).round() as usize;
    let r0 = ((grid.max_y - area.max_y) / cs).round() as usize;
    let r1 = ((grid.max_y - area.min_y) / cs).round() as usize;
    let (c1, r1) = (c1.min(grid.width), r1.min(grid.height));
    if c1 <= c0 || r1 <= r0 {
        return None;
    }
    let mut out = Raster::new(c1 - c0, r1 - r0, grid.min_x + c0 as f64 * cs, grid.max_y - r0 as f64 * cs, cs, f32::NAN);
    for r in r0..r1 {
        for c in c0..c1 {
            out.set(r - r0, c - c0, grid.get(r, c));
        }
    }
    Some(out)
}

/// Resample `grid` to square cells of `cell_size` over its own extent, with
/// bilinear interpolation at each target cell centre.
pub fn resample_bilinear(grid: &Raster, cell_size: f64) -> Raster {
    let extent = grid.extent();
    let width = (extent.width() / cell_size - 1e-9).ceil().max(1.0) as usize;
    let height = (extent.height() / cell_size - 1e-9).ceil().max(1.0) as usize;
    let mut out = Raster::new(width, height, extent.min_x, extent.max_y, cell_size, f32::NAN);
    for r in 0..height {
        for c in 0..width {
            let (x, y) = out.cell_center(r, c);
            if let Some(v) = grid.sample(x, y) {
                out.set(r, c, v);
            }
        }
    }
    out
}

/// Mosaic on the lattice of the first input over the union of all inputs
/// (limited to `window` when given). The first valid value wins; later
/// inputs are sampled bilinearly at the cell centres.
pub fn mosaic(inputs: &[Raster], window: Option<&Extent>) -> Option<Raster> {
    let first = inputs.first()?;
    let cs = first.cell_size();
    let mut extent = inputs
        .iter()
        .map(Raster::extent)
        .reduce(|a, b| a.union(&b))?
        .snap(first.min_x, first.max_y, cs);
    if let Some(w) = window {
        extent = extent.intersection(&w.snap(first.min_x, first.max_y, cs))?;
    }
    let width = (extent.width() / cs).round() as usize;
    let height = (extent.height() / cs).round() as usize;
    if width == 0 || height == 0 {
        return None;
    }
    let mut out = Raster::new(width, height, extent.min_x, extent.max_y, cs, f32::NAN);
    for r in 0..height {
        for c in 0..width {
            let (x, y) = out.cell_center(r, c);
            let value = inputs.iter().enumerate().find_map(|(i, g)| {
                if i == 0 {
                    let (gr, gc) = g.cell_of(x, y)?;
                    let v = g.get(gr, gc);
                    (!v.is_nan()).then_some(v)
                } else {
                    g.sample(x, y)
                }
            });
            if let Some(v) = value {
                out.set(r, c, v);
            }
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(width: usize, height: usize, min_x: f64, max_y: f64, cs: f64) -> Raster {
        let mut g = Raster::new(width, height, min_x, max_y, cs, 0.0);
        for r in 0..height {
            for c in 0..width {
                let (x, _) = g.cell_center(r, c);
                g.set(r, c, x as f32);
            }
        }
        g
    }

    #[test]
    fn clip_snaps_outward() {
        let g = ramp(10, 10, 0.0, 10.0, 1.0);
        let c = clip(&g, &Extent::new(2.4, 3.6, 5.1, 7.2)).unwrap();
        assert_eq!((c.width, c.height), (4, 5));
        assert_eq!((c.min_x, c.max_y), (2.0, 8.0));
        assert_eq!(c.get(0, 0), 2.5);
        assert!(clip(&g, &Extent::new(20.0, 20.0, 30.0, 30.0)).is_none());
    }

    #[test]
    fn bilinear_resample_preserves_linear_surface() {
        let g = ramp(12, 12, 0.0, 12.0, 1.0);
        let r = resample_bilinear(&g, 3.0);
        assert_eq!((r.width, r.height), (4, 4));
        for c in 0..4 {
            let (x, _) = r.cell_center(1, c);
            assert!((r.get(1, c) - x as f32).abs() < 1e-5);
        }
    }

    #[test]
    fn mosaic_first_valid_wins() {
        let mut a = Raster::new(2, 2, 0.0, 2.0, 1.0, 1.0);
        a.set(0, 1, f32::NAN);
        let b = Raster::new(4, 2, 0.0, 2.0, 1.0, 7.0);
        let m = mosaic(&[a, b], None).unwrap();
        assert_eq!((m.width, m.height), (4, 2));
        assert_eq!(m.get(0, 0), 1.0);
        assert_eq!(m.get(0, 1), 7.0);
        assert_eq!(m.get(1, 3), 7.0);
    }
}
