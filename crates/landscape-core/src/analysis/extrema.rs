//! Extremum detection.
//!
//! Two feature levels:
//! - [`detect_minima`] / [`detect_maxima`]: a cell must be strictly below
//!   (above) every other cell in its window. Plateaus never qualify.
//! - [`detect_minima_detailed`] / [`detect_maxima_detailed`]: plateau-aware.
//!   Each near-flat connected region is one candidate, tested against its
//!   expanded neighbourhood, given a quantile depth and optionally validated
//!   by the local Laplacian.
use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use super::grid_walk::{resolve_index, BoundaryPolicy, Connectivity, GridBfs};
use super::rational::RationalApprox;
use super::smooth::box_blur;
use crate::field::ScalarField;

/// Absolute floor of the plateau tolerance.
const PLATEAU_EPS_FLOOR: f64 = 1e-12;

// ── Simple extrema ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Extremum {
    pub ix: usize,
    pub iy: usize,
    pub x: f64,
    pub y: f64,
    pub value: f64,
}

/// Strict minima within a `(2·radius+1)²` window, after `smooth_iterations`
/// passes of mirrored box blur. Sorted by value, lowest first.
pub fn detect_minima(field: &ScalarField, radius: usize, smooth_iterations: usize) -> Vec<Extremum> {
    strict_extrema(field, radius, smooth_iterations, Ordering::Less)
}

/// Strict maxima, highest first.
pub fn detect_maxima(field: &ScalarField, radius: usize, smooth_iterations: usize) -> Vec<Extremum> {
    strict_extrema(field, radius, smooth_iterations, Ordering::Greater)
}

fn strict_extrema(field: &ScalarField, radius: usize, smooth_iterations: usize, want: Ordering) -> Vec<Extremum> {
    let smoothed;
    let f = if smooth_iterations > 0 {
        smoothed = box_blur(field, smooth_iterations, BoundaryPolicy::Mirror);
        &smoothed
    } else {
        field
    };
    let (w, h) = (f.width, f.height);
    let r = radius.max(1);
    let mut out = Vec::new();
    for iy in 0..h {
        for ix in 0..w {
            let v = f.get(iy, ix);
            if !v.is_finite() {
                continue;
            }
            let mut strict = true;
            'window: for ny in iy.saturating_sub(r)..=(iy + r).min(h - 1) {
                for nx in ix.saturating_sub(r)..=(ix + r).min(w - 1) {
                    if (nx, ny) == (ix, iy) {
                        continue;
                    }
                    let n = f.get(ny, nx);
                    if n.is_finite() && v.partial_cmp(&n) != Some(want) {
                        strict = false;
                        break 'window;
                    }
                }
            }
            if strict {
                out.push(Extremum { ix, iy, x: f.xs[ix], y: f.ys[iy], value: v });
            }
        }
    }
    out.sort_by(|a, b| {
        let ord = a.value.total_cmp(&b.value);
        let ord = if want == Ordering::Less { ord } else { ord.reverse() };
        ord.then((a.iy, a.ix).cmp(&(b.iy, b.ix)))
    });
    out
}

// ── Plateau-aware extrema ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MinimaOptions {
    /// Neighbourhood radius around the plateau, in cells.
    pub radius: usize,
    pub connectivity: Connectivity,
    /// Relative plateau tolerance, scaled by |seed value|.
    pub plateau_epsilon: f64,
    pub boundary_policy: BoundaryPolicy,
    pub min_depth: f64,
    /// Quantile of the neighbourhood used as the rim height.
    pub depth_quantile: f64,
    pub validate_laplacian: bool,
    pub min_laplacian: f64,
    pub smooth_iterations: usize,
}

impl Default for MinimaOptions {
    fn default() -> Self {
        Self {
            radius: 1,
            connectivity: Connectivity::Eight,
            plateau_epsilon: 1e-9,
            boundary_policy: BoundaryPolicy::Clamp,
            min_depth: 0.0,
            depth_quantile: 0.9,
            validate_laplacian: false,
            min_laplacian: 0.0,
            smooth_iterations: 0,
        }
    }
}

/// An accepted minimum (or, from [`detect_maxima_detailed`], maximum).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MinimaPoint {
    pub x: f64,
    pub y: f64,
    pub ix: usize,
    pub iy: usize,
    /// Field value at the representative cell.
    pub roughness: f64,
    /// Rim quantile minus plateau value (prominence for maxima).
    pub depth: f64,
    pub plateau_size: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub laplacian: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub basin_area: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub basin_radius: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub basin_threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rational_x: Option<RationalApprox>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rational_y: Option<RationalApprox>,
}

struct Candidate {
    point: MinimaPoint,
    /// Plateau value on the detection field; the primary sort key.
    value: f64,
}

/// Plateau-aware minima of `field`, sorted by value ascending, then depth
/// descending, then grid position.
pub fn detect_minima_detailed(field: &ScalarField, opts: &MinimaOptions) -> Vec<MinimaPoint> {
    let smoothed;
    let f = if opts.smooth_iterations > 0 {
        smoothed = box_blur(field, opts.smooth_iterations, opts.boundary_policy);
        &smoothed
    } else {
        field
    };
    let (w, h) = (f.width, f.height);
    let n = w * h;
    if n == 0 {
        return Vec::new();
    }
    let r = opts.radius.max(1);
    let quantile = opts.depth_quantile.clamp(0.0, 1.0);

    let mut assigned = vec![false; n];
    let mut plateau_bfs = GridBfs::new(w, h);
    let mut scan_marks = GridBfs::new(w, h);
    let mut plateau = Vec::new();
    let mut scanned = Vec::new();
    let mut found: Vec<Candidate> = Vec::new();

    for seed in 0..n {
        let seed_value = f.data[seed];
        if assigned[seed] || !seed_value.is_finite() {
            continue;
        }

        // 1. Plateau of near-equal cells around the seed.
        let tol = (opts.plateau_epsilon.abs() * seed_value.abs()).max(PLATEAU_EPS_FLOOR);
        plateau_bfs.flood(
            seed,
            opts.connectivity,
            BoundaryPolicy::Skip,
            |i| !assigned[i] && (f.data[i] - seed_value).abs() <= tol,
            &mut plateau,
        );
        for &i in &plateau {
            assigned[i] = true;
        }

        // 2. Plateaus in the unsafe border band are dropped under `Skip`.
        if opts.boundary_policy == BoundaryPolicy::Skip
            && plateau.iter().any(|&i| in_border_band(i % w, i / w, w, h, r))
        {
            continue;
        }

        let plateau_value = plateau.iter().map(|&i| f.data[i]).fold(f64::INFINITY, f64::min);

        // 3. Neighbourhood scan, each outside cell counted once.
        scanned.clear();
        scan_marks.begin();
        for &i in &plateau {
            let (px, py) = ((i % w) as isize, (i / w) as isize);
            for dy in -(r as isize)..=r as isize {
                let Some(ny) = resolve_index(py + dy, h, opts.boundary_policy) else { continue };
                for dx in -(r as isize)..=r as isize {
                    let Some(nx) = resolve_index(px + dx, w, opts.boundary_policy) else { continue };
                    let j = ny * w + nx;
                    if plateau_bfs.is_marked(j) || scan_marks.is_marked(j) {
                        continue;
                    }
                    scan_marks.mark(j);
                    let v = f.data[j];
                    if v.is_finite() {
                        scanned.push(v);
                    }
                }
            }
        }
        if scanned.iter().any(|&v| v < plateau_value) || !scanned.iter().any(|&v| v > plateau_value) {
            continue;
        }

        // 4. Depth against the rim quantile.
        let depth = quantile_of(&mut scanned, quantile) - plateau_value;
        if depth.is_nan() || depth < opts.min_depth {
            continue;
        }

        // 5. Plateau cell nearest the metric centroid.
        let rep = representative(f, &plateau);
        let (ix, iy) = (rep % w, rep / w);

        // 6. Curvature check.
        let laplacian = if opts.validate_laplacian {
            let lap = laplacian_at(f, ix, iy, opts.boundary_policy);
            if !lap.is_finite() || lap < opts.min_laplacian {
                continue;
            }
            Some(lap)
        } else {
            None
        };

        found.push(Candidate {
            value: plateau_value,
            point: MinimaPoint {
                x: f.xs[ix],
                y: f.ys[iy],
                ix,
                iy,
                roughness: field.get(iy, ix),
                depth,
                plateau_size: plateau.len(),
                laplacian,
                basin_area: None,
                basin_radius: None,
                basin_threshold: None,
                rational_x: None,
                rational_y: None,
            },
        });
    }

    // 7. Deterministic order.
    found.sort_by(|a, b| {
        a.value
            .total_cmp(&b.value)
            .then(b.point.depth.total_cmp(&a.point.depth))
            .then((a.point.iy, a.point.ix).cmp(&(b.point.iy, b.point.ix)))
    });
    found.into_iter().map(|c| c.point).collect()
}

/// Plateau-aware maxima: minima of the negated field, reported with the
/// original values. `depth` is the prominence above the rim quantile, and
/// `min_laplacian` bounds the curvature magnitude.
pub fn detect_maxima_detailed(field: &ScalarField, opts: &MinimaOptions) -> Vec<MinimaPoint> {
    let mut points = detect_minima_detailed(&field.negated(), opts);
    for p in &mut points {
        p.roughness = -p.roughness;
        p.laplacian = p.laplacian.map(|l| -l);
    }
    points
}

fn in_border_band(ix: usize, iy: usize, w: usize, h: usize, band: usize) -> bool {
    ix < band || iy < band || ix + band >= w || iy + band >= h
}

/// Linear-interpolated quantile; sorts `values` in place.
pub(crate) fn quantile_of(values: &mut [f64], q: f64) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.sort_unstable_by(f64::total_cmp);
    let pos = q * (values.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let t = pos - lo as f64;
    values[lo] + (values[hi] - values[lo]) * t
}

fn representative(f: &ScalarField, plateau: &[usize]) -> usize {
    let w = f.width;
    let inv = 1.0 / plateau.len() as f64;
    let cx = plateau.iter().map(|&i| f.metric_x[i % w]).sum::<f64>() * inv;
    let cy = plateau.iter().map(|&i| f.metric_y[i / w]).sum::<f64>() * inv;
    let dist = |i: usize| {
        let dx = f.metric_x[i % w] - cx;
        let dy = f.metric_y[i / w] - cy;
        dx * dx + dy * dy
    };
    plateau
        .iter()
        .copied()
        .min_by(|&a, &b| dist(a).total_cmp(&dist(b)).then(a.cmp(&b)))
        .unwrap_or(plateau[0])
}

/// `∂²z/∂x² + ∂²z/∂y²` at `(ix, iy)` with three-point differences on
/// non-uniform spacing.
pub fn laplacian_at(f: &ScalarField, ix: usize, iy: usize, policy: BoundaryPolicy) -> f64 {
    let d2x = second_difference(f.width, ix, &f.metric_x, policy, |k| f.get(iy, k));
    let d2y = second_difference(f.height, iy, &f.metric_y, policy, |k| f.get(k, ix));
    d2x + d2y
}

fn second_difference(
    n: usize,
    i: usize,
    coords: &[f64],
    policy: BoundaryPolicy,
    z: impl Fn(usize) -> f64,
) -> f64 {
    if n < 2 {
        return 0.0;
    }
    let interior = i > 0 && i + 1 < n;
    let points: [(f64, f64); 3] = if interior {
        [(coords[i - 1], z(i - 1)), (coords[i], z(i)), (coords[i + 1], z(i + 1))]
    } else if policy == BoundaryPolicy::Mirror {
        // Reflect the inner neighbour across the edge sample.
        let j = if i == 0 { 1 } else { i - 1 };
        let mirrored = 2.0 * coords[i] - coords[j];
        [(mirrored, z(j)), (coords[i], z(i)), (coords[j], z(j))]
    } else if n >= 3 {
        // One-sided stencil.
        let (a, b, c) = if i == 0 { (0, 1, 2) } else { (n - 3, n - 2, n - 1) };
        [(coords[a], z(a)), (coords[b], z(b)), (coords[c], z(c))]
    } else {
        return 0.0;
    };
    three_point_second_derivative(points)
}

/// Second derivative of the parabola through three points.
fn three_point_second_derivative(p: [(f64, f64); 3]) -> f64 {
    let [(x0, z0), (x1, z1), (x2, z2)] = p;
    let d01 = x0 - x1;
    let d02 = x0 - x2;
    let d12 = x1 - x2;
    2.0 * (z0 / (d01 * d02) - z1 / (d01 * d12) + z2 / (d02 * d12))
}
