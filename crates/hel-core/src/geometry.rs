//! Planar vector primitives: envelopes and simple polygons with holes.
//!
//! Coordinates are projected map units. Polygon rings are stored open (the
//! closing vertex is dropped) with the exterior counter-clockwise and holes
//! clockwise, so the signed ring areas sum to the polygon area.
use serde::{Deserialize, Serialize};

pub type Point = (f64, f64);

// ── Extent ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Extent {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self { min_x, min_y, max_x, max_y }
    }

    /// Envelope of a point set; `None` when empty.
    pub fn of_points<'a, I: IntoIterator<Item = &'a Point>>(points: I) -> Option<Self> {
        let mut it = points.into_iter();
        let &(x0, y0) = it.next()?;
        let mut e = Self::new(x0, y0, x0, y0);
        for &(x, y) in it {
            e.min_x = e.min_x.min(x);
            e.min_y = e.min_y.min(y);
            e.max_x = e.max_x.max(x);
            e.max_y = e.max_y.max(y);
        }
        Some(e)
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Envelope of a round buffer of distance `d` around this envelope.
    pub fn buffered(&self, d: f64) -> Self {
        Self::new(self.min_x - d, self.min_y - d, self.max_x + d, self.max_y + d)
    }

    pub fn union(&self, other: &Extent) -> Self {
        Self::new(
            self.min_x.min(other.min_x),
            self.min_y.min(other.min_y),
            self.max_x.max(other.max_x),
            self.max_y.max(other.max_y),
        )
    }

    pub fn intersects(&self, other: &Extent) -> bool {
        self.min_x <= other.max_x
            && other.min_x <= self.max_x
            && self.min_y <= other.max_y
            && other.min_y <= self.max_y
    }

    pub fn intersection(&self, other: &Extent) -> Option<Self> {
        if !self.intersects(other) {
            return None;
        }
        Some(Self::new(
            self.min_x.max(other.min_x),
            self.min_y.max(other.min_y),
            self.max_x.min(other.max_x),
            self.max_y.min(other.max_y),
        ))
    }

    /// Grow outward to the lattice with the given origin and cell size.
    pub fn snap(&self, origin_x: f64, origin_y: f64, cell: f64) -> Self {
        // Small slack keeps edges already on the lattice from growing a cell.
        let eps = 1e-9;
        Self::new(
            origin_x + ((self.min_x - origin_x) / cell + eps).floor() * cell,
            origin_y + ((self.min_y - origin_y) / cell + eps).floor() * cell,
            origin_x + ((self.max_x - origin_x) / cell - eps).ceil() * cell,
            origin_y + ((self.max_y - origin_y) / cell - eps).ceil() * cell,
        )
    }
}

// ── Polygon ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    pub exterior: Vec<Point>,
    pub holes: Vec<Vec<Point>>,
}

fn open_ring(mut ring: Vec<Point>) -> Vec<Point> {
    if ring.len() > 1 && ring.first() == ring.last() {
        ring.pop();
    }
    ring
}

/// Shoelace signed area; positive for counter-clockwise rings.
pub fn ring_signed_area(ring: &[Point]) -> f64 {
    let n = ring.len();
    if n < 3 {
        return 0.0;
    }
    let mut sum = 0.0;
    for i in 0..n {
        let (x0, y0) = ring[i];
        let (x1, y1) = ring[(i + 1) % n];
        sum += x0 * y1 - x1 * y0;
    }
    sum / 2.0
}

impl Polygon {
    /// Build a polygon from rings that may be closed or open and in any
    /// orientation.
    pub fn new(exterior: Vec<Point>, holes: Vec<Vec<Point>>) -> Self {
        let mut exterior = open_ring(exterior);
        if ring_signed_area(&exterior) < 0.0 {
            exterior.reverse();
        }
        let holes = holes
            .into_iter()
            .map(open_ring)
            .filter(|h| h.len() >= 3)
            .map(|mut h| {
                if ring_signed_area(&h) > 0.0 {
                    h.reverse();
                }
                h
            })
            .collect();
        Self { exterior, holes }
    }

    pub fn rect(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self::new(
            vec![(min_x, min_y), (max_x, min_y), (max_x, max_y), (min_x, max_y)],
            Vec::new(),
        )
    }

    pub fn rings(&self) -> impl Iterator<Item = &[Point]> {
        std::iter::once(self.exterior.as_slice()).chain(self.holes.iter().map(Vec::as_slice))
    }

    pub fn area(&self) -> f64 {
        self.rings().map(ring_signed_area).sum::<f64>().max(0.0)
    }

    pub fn extent(&self) -> Extent {
        Extent::of_points(&self.exterior).unwrap_or(Extent::new(0.0, 0.0, 0.0, 0.0))
    }

    /// Even-odd point-in-polygon over every ring.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        let mut inside = false;
        for ring in self.rings() {
            let n = ring.len();
            let mut j = n.wrapping_sub(1);
            for i in 0..n {
                let (xi, yi) = ring[i];
                let (xj, yj) = ring[j];
                if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
                    inside = !inside;
                }
                j = i;
            }
        }
        inside
    }

    /// Exact area of `self ∩ other`.
    ///
    /// Each ring edge `(a, b)` spans a signed triangle with a shared origin;
    /// the signed triangles of a polygon sum to its indicator function, so the
    /// intersection area is `Σ sᵢ·sⱼ·|Tᵢ ∩ Tⱼ|` over all triangle pairs.
    pub fn intersection_area(&self, other: &Polygon) -> f64 {
        let (a, b) = (self.extent(), other.extent());
        if !a.intersects(&b) {
            return 0.0;
        }
        // Shift to a local origin to keep the products well conditioned.
        let ox = (a.min_x.max(b.min_x) + a.max_x.min(b.max_x)) / 2.0;
        let oy = (a.min_y.max(b.min_y) + a.max_y.min(b.max_y)) / 2.0;
        let ta = signed_triangles(self, ox, oy);
        let tb = signed_triangles(other, ox, oy);

        let mut total = 0.0;
        for (sa, tri_a, ea) in &ta {
            for (sb, tri_b, eb) in &tb {
                if !ea.intersects(eb) {
                    continue;
                }
                let clipped = clip_convex(tri_a, tri_b);
                total += sa * sb * ring_signed_area(&clipped).abs();
            }
        }
        total.max(0.0)
    }
}

type SignedTriangle = (f64, [Point; 3], Extent);

/// Fan triangles from the local origin, each stored counter-clockwise with
/// the orientation sign kept separately. Degenerate edges are skipped.
fn signed_triangles(poly: &Polygon, ox: f64, oy: f64) -> Vec<SignedTriangle> {
    let mut out = Vec::new();
    for ring in poly.rings() {
        let n = ring.len();
        for i in 0..n {
            let p = (ring[i].0 - ox, ring[i].1 - oy);
            let q = (ring[(i + 1) % n].0 - ox, ring[(i + 1) % n].1 - oy);
            let cross = p.0 * q.1 - q.0 * p.1;
            if cross.abs() < 1e-12 {
                continue;
            }
            let (sign, tri) = if cross > 0.0 {
                (1.0, [(0.0, 0.0), p, q])
            } else {
                (-1.0, [(0.0, 0.0), q, p])
            };
            if let Some(e) = Extent::of_points(&tri) {
                out.push((sign, tri, e));
            }
        }
    }
    out
}

/// Sutherland–Hodgman clip of a convex CCW subject by a convex CCW clip
/// polygon.
fn clip_convex(subject: &[Point], clip: &[Point]) -> Vec<Point> {
    let mut output: Vec<Point> = subject.to_vec();
    let n = clip.len();
    for i in 0..n {
        if output.is_empty() {
            break;
        }
        let a = clip[i];
        let b = clip[(i + 1) % n];
        let side = |p: Point| (b.0 - a.0) * (p.1 - a.1) - (b.1 - a.1) * (p.0 - a.0);
        let input = std::mem::take(&mut output);
        let m = input.len();
        for j in 0..m {
            let cur = input[j];
            let prev = input[(j + m - 1) % m];
            let (sc, sp) = (side(cur), side(prev));
            if sc >= 0.0 {
                if sp < 0.0 {
                    output.push(segment_cross(prev, cur, sp, sc));
                }
                output.push(cur);
            } else if sp >= 0.0 {
                output.push(segment_cross(prev, cur, sp, sc));
            }
        }
    }
    output
}

fn segment_cross(p: Point, q: Point, sp: f64, sq: f64) -> Point {
    let t = sp / (sp - sq);
    (p.0 + t * (q.0 - p.0), p.1 + t * (q.1 - p.1))
}

// ── Overlay parts ─────────────────────────────────────────────────────────────

/// One connected piece of the overlap of two polygon sets.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlapPart {
    pub area: f64,
    /// Disjoint trapezoids whose union is the part.
    pub pieces: Vec<Polygon>,
}

/// Non-vertical ring edge stored west to east.
#[derive(Debug, Clone, Copy)]
struct SlabEdge {
    x0: f64,
    y0: f64,
    x1: f64,
    y1: f64,
    from_a: bool,
}

impl SlabEdge {
    fn y_at(&self, x: f64) -> f64 {
        self.y0 + (self.y1 - self.y0) * (x - self.x0) / (self.x1 - self.x0)
    }

    fn crossing_x(&self, other: &SlabEdge) -> Option<f64> {
        let (dx, dy) = (self.x1 - self.x0, self.y1 - self.y0);
        let (ex, ey) = (other.x1 - other.x0, other.y1 - other.y0);
        let denom = dx * ey - dy * ex;
        if denom.abs() < 1e-15 {
            return None;
        }
        let (wx, wy) = (other.x0 - self.x0, other.y0 - self.y0);
        let t = (wx * ey - wy * ex) / denom;
        let u = (wx * dy - wy * dx) / denom;
        ((0.0..=1.0).contains(&t) && (0.0..=1.0).contains(&u)).then(|| self.x0 + t * dx)
    }
}

/// Region between two edges inside one vertical slab.
#[derive(Debug, Clone, Copy)]
struct Trapezoid {
    slab: usize,
    xl: f64,
    xr: f64,
    bottom: (f64, f64),
    top: (f64, f64),
}

impl Trapezoid {
    fn area(&self) -> f64 {
        (self.xr - self.xl) * ((self.top.0 - self.bottom.0) + (self.top.1 - self.bottom.1)) / 2.0
    }
}

fn collect_edges(polys: &[Polygon], from_a: bool, ox: f64, oy: f64, out: &mut Vec<SlabEdge>) {
    for ring in polys.iter().flat_map(|p| p.rings()) {
        let n = ring.len();
        for i in 0..n {
            let p = (ring[i].0 - ox, ring[i].1 - oy);
            let q = (ring[(i + 1) % n].0 - ox, ring[(i + 1) % n].1 - oy);
            if p.0 == q.0 {
                continue;
            }
            let (l, r) = if p.0 < q.0 { (p, q) } else { (q, p) };
            out.push(SlabEdge { x0: l.0, y0: l.1, x1: r.0, y1: r.1, from_a });
        }
    }
}

fn find(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

fn union(parent: &mut [usize], a: usize, b: usize) {
    let (ra, rb) = (find(parent, a), find(parent, b));
    if ra != rb {
        parent[ra.max(rb)] = ra.min(rb);
    }
}

/// Split `a ∩ b` (even-odd over all rings of each set) into its connected
/// parts, ordered west to east by their first piece.
///
/// The plane is cut into vertical slabs at every vertex and edge crossing;
/// inside a slab no edges cross, so the overlap is a stack of trapezoids.
/// Trapezoids touching along a segment of positive length share a part.
pub fn overlap_parts(a: &[Polygon], b: &[Polygon]) -> Vec<OverlapPart> {
    let extent_of = |polys: &[Polygon]| polys.iter().map(Polygon::extent).reduce(|p, q| p.union(&q));
    let (Some(ea), Some(eb)) = (extent_of(a), extent_of(b)) else {
        return Vec::new();
    };
    let Some(window) = ea.intersection(&eb) else {
        return Vec::new();
    };
    let (ox, oy) = (window.min_x, window.min_y);
    let eps = 1e-9 * ea.union(&eb).width().max(ea.union(&eb).height()).max(1.0);

    let mut edges = Vec::new();
    collect_edges(a, true, ox, oy, &mut edges);
    collect_edges(b, false, ox, oy, &mut edges);

    let (lo, hi) = (0.0, window.max_x - ox);
    let mut xs: Vec<f64> = edges.iter().flat_map(|e| [e.x0, e.x1]).collect();
    for ei in edges.iter().filter(|e| e.from_a) {
        for ej in edges.iter().filter(|e| !e.from_a) {
            if ei.x1 < ej.x0 || ej.x1 < ei.x0 {
                continue;
            }
            xs.extend(ei.crossing_x(ej));
        }
    }
    xs.retain(|&x| x >= lo && x <= hi);
    xs.push(lo);
    xs.push(hi);
    xs.sort_by(f64::total_cmp);
    xs.dedup_by(|x, prev| *x - *prev <= eps);

    let mut traps: Vec<Trapezoid> = Vec::new();
    let mut slab_start = Vec::with_capacity(xs.len());
    for (slab, w) in xs.windows(2).enumerate() {
        slab_start.push(traps.len());
        let (xl, xr) = (w[0], w[1]);
        let xm = (xl + xr) / 2.0;
        let mut stack: Vec<(f64, &SlabEdge)> = edges
            .iter()
            .filter(|e| e.x0 < xm && xm < e.x1)
            .map(|e| (e.y_at(xm), e))
            .collect();
        stack.sort_by(|p, q| p.0.total_cmp(&q.0));

        let (mut in_a, mut in_b) = (false, false);
        for (k, &(ym, e)) in stack.iter().enumerate() {
            if e.from_a {
                in_a = !in_a;
            } else {
                in_b = !in_b;
            }
            let Some(&(next_ym, next)) = stack.get(k + 1) else {
                continue;
            };
            if in_a && in_b && next_ym - ym > eps {
                traps.push(Trapezoid {
                    slab,
                    xl,
                    xr,
                    bottom: (e.y_at(xl), e.y_at(xr)),
                    top: (next.y_at(xl), next.y_at(xr)),
                });
            }
        }
    }
    slab_start.push(traps.len());

    let mut parent: Vec<usize> = (0..traps.len()).collect();
    for i in 0..traps.len() {
        let t = traps[i];
        // Stacked in the same slab with no gap between them.
        if i > 0 && traps[i - 1].slab == t.slab {
            let below = traps[i - 1];
            if (t.bottom.0 - below.top.0).abs() <= eps && (t.bottom.1 - below.top.1).abs() <= eps {
                union(&mut parent, i - 1, i);
            }
        }
        // Sharing part of the slab boundary with the next slab.
        for j in slab_start[t.slab + 1]..slab_start[(t.slab + 2).min(slab_start.len() - 1)] {
            let u = traps[j];
            let low = t.bottom.1.max(u.bottom.0);
            let high = t.top.1.min(u.top.0);
            if high - low > eps {
                union(&mut parent, i, j);
            }
        }
    }

    let mut parts: Vec<(usize, OverlapPart)> = Vec::new();
    for (i, t) in traps.iter().enumerate() {
        let root = find(&mut parent, i);
        let piece = Polygon::new(
            vec![
                (t.xl + ox, t.bottom.0 + oy),
                (t.xr + ox, t.bottom.1 + oy),
                (t.xr + ox, t.top.1 + oy),
                (t.xl + ox, t.top.0 + oy),
            ],
            Vec::new(),
        );
        match parts.iter_mut().find(|(r, _)| *r == root) {
            Some((_, part)) => {
                part.area += t.area();
                part.pieces.push(piece);
            }
            None => parts.push((root, OverlapPart { area: t.area(), pieces: vec![piece] })),
        }
    }
    parts.into_iter().map(|(_, part)| part).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn orientation_is_normalised() {
        let cw = Polygon::new(
            vec![(0.0, 0.0), (0.0, 10.0), (10.0, 10.0), (10.0, 0.0), (0.0, 0.0)],
            vec![vec![(2.0, 2.0), (4.0, 2.0), (4.0, 4.0), (2.0, 4.0)]],
        );
        assert_eq!(cw.exterior.len(), 4);
        assert!(ring_signed_area(&cw.exterior) > 0.0);
        assert!(ring_signed_area(&cw.holes[0]) < 0.0);
        assert_relative_eq!(cw.area(), 96.0);
    }

    #[test]
    fn contains_respects_holes() {
        let p = Polygon::new(
            vec![(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)],
            vec![vec![(2.0, 2.0), (4.0, 2.0), (4.0, 4.0), (2.0, 4.0)]],
        );
        assert!(p.contains(1.0, 1.0));
        assert!(!p.contains(3.0, 3.0));
        assert!(!p.contains(11.0, 5.0));
    }

    #[test]
    fn half_overlapping_squares() {
        let a = Polygon::rect(0.0, 0.0, 10.0, 10.0);
        let b = Polygon::rect(5.0, 0.0, 15.0, 10.0);
        assert_relative_eq!(a.intersection_area(&b), 50.0, epsilon = 1e-9);
        assert_relative_eq!(b.intersection_area(&a), 50.0, epsilon = 1e-9);
    }

    #[test]
    fn disjoint_and_contained() {
        let a = Polygon::rect(0.0, 0.0, 10.0, 10.0);
        let far = Polygon::rect(20.0, 20.0, 30.0, 30.0);
        let inner = Polygon::rect(2.0, 2.0, 3.0, 5.0);
        assert_eq!(a.intersection_area(&far), 0.0);
        assert_relative_eq!(a.intersection_area(&inner), 3.0, epsilon = 1e-9);
    }

    #[test]
    fn concave_l_shape_against_square() {
        // L covering [0,10]x[0,4] plus [0,4]x[4,10]: area 64.
        let l = Polygon::new(
            vec![(0.0, 0.0), (10.0, 0.0), (10.0, 4.0), (4.0, 4.0), (4.0, 10.0), (0.0, 10.0)],
            vec![],
        );
        assert_relative_eq!(l.area(), 64.0);
        let sq = Polygon::rect(2.0, 2.0, 8.0, 8.0);
        // [2,8]x[2,4] = 12, plus [2,4]x[4,8] = 8.
        assert_relative_eq!(l.intersection_area(&sq), 20.0, epsilon = 1e-9);
    }

    #[test]
    fn intersection_excludes_holes() {
        let donut = Polygon::new(
            vec![(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)],
            vec![vec![(2.0, 2.0), (8.0, 2.0), (8.0, 8.0), (2.0, 8.0)]],
        );
        let right = Polygon::rect(5.0, 0.0, 10.0, 10.0);
        // 50 minus the hole's right half (3 x 6 = 18).
        assert_relative_eq!(donut.intersection_area(&right), 32.0, epsilon = 1e-9);
    }

    #[test]
    fn large_projected_coordinates_stay_exact() {
        let x0 = 512_345.0;
        let y0 = 4_321_987.0;
        let a = Polygon::rect(x0, y0, x0 + 400.0, y0 + 400.0);
        let b = Polygon::rect(x0 + 100.0, y0 + 100.0, x0 + 900.0, y0 + 250.0);
        assert_relative_eq!(a.intersection_area(&b), 300.0 * 150.0, epsilon = 1e-6);
    }

    fn u_shape() -> Polygon {
        // Two 10 m arms joined along the bottom.
        Polygon::new(
            vec![
                (0.0, 0.0),
                (30.0, 0.0),
                (30.0, 30.0),
                (20.0, 30.0),
                (20.0, 10.0),
                (10.0, 10.0),
                (10.0, 30.0),
                (0.0, 30.0),
            ],
            vec![],
        )
    }

    #[test]
    fn band_across_both_arms_is_two_parts() {
        let band = Polygon::rect(-5.0, 15.0, 35.0, 25.0);
        let parts = overlap_parts(&[u_shape()], &[band]);
        assert_eq!(parts.len(), 2);
        assert_relative_eq!(parts[0].area, 100.0, epsilon = 1e-9);
        assert_relative_eq!(parts[1].area, 100.0, epsilon = 1e-9);
        assert!(parts[0].pieces.iter().all(|p| p.extent().max_x <= 10.0 + 1e-9));
        assert!(parts[1].pieces.iter().all(|p| p.extent().min_x >= 20.0 - 1e-9));
    }

    #[test]
    fn connected_overlap_is_one_part() {
        let base = Polygon::rect(0.0, 0.0, 30.0, 15.0);
        let parts = overlap_parts(&[u_shape()], &[base.clone()]);
        assert_eq!(parts.len(), 1);
        // Bottom strip plus the lower 5 m of each arm.
        assert_relative_eq!(parts[0].area, 400.0, epsilon = 1e-9);
        assert_relative_eq!(parts[0].area, u_shape().intersection_area(&base), epsilon = 1e-9);

        let donut = Polygon::new(
            vec![(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)],
            vec![vec![(2.0, 2.0), (8.0, 2.0), (8.0, 8.0), (2.0, 8.0)]],
        );
        let right = Polygon::rect(5.0, 0.0, 10.0, 10.0);
        let parts = overlap_parts(&[donut], &[right]);
        assert_eq!(parts.len(), 1);
        assert_relative_eq!(parts[0].area, 32.0, epsilon = 1e-9);
    }

    #[test]
    fn slanted_edges_match_exact_area() {
        let tri = Polygon::new(vec![(0.0, 0.0), (20.0, 0.0), (10.0, 20.0)], vec![]);
        let sq = Polygon::rect(5.0, 5.0, 15.0, 15.0);
        let parts = overlap_parts(&[tri.clone()], &[sq.clone()]);
        assert_eq!(parts.len(), 1);
        assert_relative_eq!(parts[0].area, tri.intersection_area(&sq), epsilon = 1e-9);
        let pieces: f64 = parts[0].pieces.iter().map(Polygon::area).sum();
        assert_relative_eq!(pieces, parts[0].area, epsilon = 1e-9);
    }

    #[test]
    fn touching_field_parts_join() {
        let parts = [Polygon::rect(0.0, 0.0, 10.0, 10.0), Polygon::rect(0.0, 10.0, 10.0, 20.0)];
        let soil = Polygon::rect(2.0, 5.0, 8.0, 15.0);
        let overlap = overlap_parts(&parts, &[soil]);
        assert_eq!(overlap.len(), 1);
        assert_relative_eq!(overlap[0].area, 60.0, epsilon = 1e-9);

        let far = Polygon::rect(50.0, 50.0, 60.0, 60.0);
        assert!(overlap_parts(&parts, &[far]).is_empty());
    }

    #[test]
    fn extent_snap_grows_outward() {
        let e = Extent::new(1.2, 3.0, 7.9, 8.1).snap(0.0, 0.0, 3.0);
        assert_eq!(e, Extent::new(0.0, 3.0, 9.0, 9.0));
        assert_eq!(e.buffered(1.0).width(), 11.0);
    }
}
