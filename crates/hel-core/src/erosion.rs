//! RKLS erosion factors and the per-cell HEL score.
//!
//! Slope is in percent rise, flow length in feet. Every grid operation keeps
//! the lattice of its inputs and propagates `NaN` as no-data.
use crate::model::{Determination, HelCategory};
use crate::raster::Grid;

/// Reference slope length of the USLE unit plot, in feet.
pub const UNIT_PLOT_LENGTH_FT: f64 = 72.5;
/// Combined score forced onto HEL delineations.
pub const HEL_FORCED_VALUE: f32 = 9.0;
/// Combined score forced onto NHEL delineations.
pub const NHEL_FORCED_VALUE: f32 = 2.0;
/// Scores at or below this value are NHEL.
pub const HEL_THRESHOLD: f32 = 8.0;

/// Slope-steepness factor `S = 0.006541·s² + 0.0456·s + 0.065`.
pub fn s_factor(slope_pct: f64) -> f64 {
    0.006541 * slope_pct * slope_pct + 0.0456 * slope_pct + 0.065
}

/// Slope-length exponent by slope band. The four bands partition `[0, ∞)`.
pub fn l_exponent(slope_pct: f64) -> f64 {
    if slope_pct < 1.0 {
        0.2
    } else if slope_pct < 3.0 {
        0.3
    } else if slope_pct < 5.0 {
        0.4
    } else {
        0.5
    }
}

/// Slope-length factor `L = (f / 72.5)^p`.
pub fn l_factor(slope_pct: f64, flow_length_ft: f64) -> f64 {
    (flow_length_ft / UNIT_PLOT_LENGTH_FT).powf(l_exponent(slope_pct))
}

pub fn ls_factor(slope_pct: f64, flow_length_ft: f64) -> f64 {
    l_factor(slope_pct, flow_length_ft) * s_factor(slope_pct)
}

/// Erosion index `EI = LS·K·R / T`. `T` must be positive; that is enforced
/// when soils are validated.
pub fn ei_factor(ls: f64, k: f64, t: f64, r: f64) -> f64 {
    ls * k * r / t
}

/// Combined HEL score for one cell.
pub fn combine(category: HelCategory, ei: f32) -> f32 {
    match category {
        HelCategory::Hel => HEL_FORCED_VALUE,
        HelCategory::Nhel => NHEL_FORCED_VALUE,
        HelCategory::Phel => ei,
    }
}

/// Binary reclassification; the threshold value itself is NHEL.
pub fn reclassify(value: f32) -> Determination {
    if value <= HEL_THRESHOLD {
        Determination::Nhel
    } else {
        Determination::Hel
    }
}

// ── Grid versions ─────────────────────────────────────────────────────────────

fn zip_map<F: Fn(f32, f32) -> f32>(a: &Grid<f32>, b: &Grid<f32>, f: F) -> Grid<f32> {
    let mut out = a.like(f32::NAN);
    for (o, (&x, &y)) in out.data.iter_mut().zip(a.data.iter().zip(&b.data)) {
        if !x.is_nan() && !y.is_nan() {
            *o = f(x, y);
        }
    }
    out
}

/// LS grid from percent slope and flow length in feet.
pub fn ls_grid(slope_pct: &Grid<f32>, flow_length_ft: &Grid<f32>) -> Grid<f32> {
    zip_map(slope_pct, flow_length_ft, |s, f| ls_factor(s as f64, f as f64) as f32)
}

/// EI grid. Cells without a positive `T` are no-data.
pub fn ei_grid(ls: &Grid<f32>, k: &Grid<f32>, t: &Grid<f32>, r: &Grid<f32>) -> Grid<f32> {
    let mut out = ls.like(f32::NAN);
    for i in 0..out.data.len() {
        let (l, kv, tv, rv) = (ls.data[i], k.data[i], t.data[i], r.data[i]);
        if l.is_nan() || kv.is_nan() || rv.is_nan() || tv.is_nan() || tv <= 0.0 {
            continue;
        }
        out.data[i] = ei_factor(l as f64, kv as f64, tv as f64, rv as f64) as f32;
    }
    out
}

/// Combined HEL score grid keyed on rasterized soil categories.
///
/// HEL and NHEL cells get their forced value even where EI is no-data.
pub fn combine_grid(categories: &Grid<u8>, ei: &Grid<f32>) -> Grid<f32> {
    let mut out = ei.like(f32::NAN);
    for (o, (&code, &e)) in out.data.iter_mut().zip(categories.data.iter().zip(&ei.data)) {
        if let Some(category) = HelCategory::from_raster_code(code) {
            let v = combine(category, e);
            if !v.is_nan() {
                *o = v;
            }
        }
    }
    out
}

/// Binary HEL/NHEL class grid (`1` NHEL, `2` HEL, `0` no-data).
pub fn reclassify_grid(combined: &Grid<f32>) -> Grid<u8> {
    combined.map(|v| if v.is_nan() { 0 } else { reclassify(v).class_code() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn exponent_bands_partition_slope() {
        let cases = [
            (0.0, 0.2),
            (0.999, 0.2),
            (1.0, 0.3),
            (2.999, 0.3),
            (3.0, 0.4),
            (4.999, 0.4),
            (5.0, 0.5),
            (250.0, 0.5),
        ];
        for (s, p) in cases {
            assert_eq!(l_exponent(s), p, "slope {s}");
        }
        // Every non-negative slope falls in exactly one band.
        let mut s = 0.0;
        while s < 20.0 {
            let p = l_exponent(s);
            let hits = [(0.0, 1.0), (1.0, 3.0), (3.0, 5.0), (5.0, f64::INFINITY)]
                .iter()
                .filter(|(lo, hi)| s >= *lo && s < *hi)
                .count();
            assert_eq!(hits, 1);
            assert!([0.2, 0.3, 0.4, 0.5].contains(&p));
            s += 0.125;
        }
    }

    #[test]
    fn phel_field_end_to_end_values() {
        // 2 % slope, 300 ft flow length, K 0.3, T 5, R 150.
        let s = s_factor(2.0);
        assert_relative_eq!(s, 0.182364, epsilon = 1e-9);
        let l = l_factor(2.0, 300.0);
        assert_relative_eq!(l, (300.0f64 / 72.5).powf(0.3), epsilon = 1e-12);
        assert_relative_eq!(l, 1.531211, epsilon = 1e-5);
        let ls = ls_factor(2.0, 300.0);
        assert_relative_eq!(ls, 0.279238, epsilon = 1e-5);
        let ei = ei_factor(ls, 0.3, 5.0, 150.0);
        assert_relative_eq!(ei, 2.513139, epsilon = 1e-4);
        let combined = combine(HelCategory::Phel, ei as f32);
        assert_eq!(reclassify(combined), Determination::Nhel);
    }

    #[test]
    fn threshold_value_is_nhel() {
        assert_eq!(reclassify(8.0), Determination::Nhel);
        assert_eq!(reclassify(8.0001), Determination::Hel);
        assert_eq!(reclassify(combine(HelCategory::Hel, f32::NAN)), Determination::Hel);
        assert_eq!(reclassify(combine(HelCategory::Nhel, 99.0)), Determination::Nhel);
    }

    #[test]
    fn grids_propagate_nodata() {
        let mut slope: Grid<f32> = Grid::new(2, 1, 0.0, 3.0, 3.0, 2.0);
        slope.set(0, 1, f32::NAN);
        let flow = slope.like(300.0f32);
        let ls = ls_grid(&slope, &flow);
        assert!(ls.get(0, 1).is_nan());

        let k = ls.like(0.3f32);
        let t = ls.like(5.0f32);
        let r = ls.like(150.0f32);
        let ei = ei_grid(&ls, &k, &t, &r);
        assert_relative_eq!(ei.get(0, 0), 2.513139, epsilon = 1e-3);

        let mut cats = ls.like(HelCategory::Phel.raster_code());
        cats.set(0, 1, HelCategory::Hel.raster_code());
        let combined = combine_grid(&cats, &ei);
        assert_eq!(combined.get(0, 1), HEL_FORCED_VALUE);
        assert_eq!(reclassify_grid(&combined).data, vec![1, 2]);
    }
}
