//! Differential geometry of a roughness field: gradients, surface normals
//! and an ambient-occlusion style shade.
//!
//! Derivatives are taken in metric coordinates (`metric_x`/`metric_y`), so a
//! log-sampled grid differentiates in log2 space.
use crate::field::ScalarField;

/// Spacings at or below this count as degenerate and yield a zero derivative.
const SPACING_EPS: f64 = 1e-12;

/// Lowest shade [`ambient_occlusion`] returns.
pub const AO_FLOOR: f64 = 0.3;

#[derive(Debug, Clone, PartialEq)]
pub struct Gradients {
    /// ∂z/∂x, row-major.
    pub dx: Vec<f64>,
    /// ∂z/∂y, row-major.
    pub dy: Vec<f64>,
}

/// Central differences in the interior, one-sided at the edges.
pub fn gradients(field: &ScalarField) -> Gradients {
    let (w, h) = (field.width, field.height);
    let mut dx = vec![0.0; w * h];
    let mut dy = vec![0.0; w * h];
    for r in 0..h {
        for c in 0..w {
            let i = r * w + c;
            dx[i] = derivative(w, c, &field.metric_x, |k| field.get(r, k));
            dy[i] = derivative(h, r, &field.metric_y, |k| field.get(k, c));
        }
    }
    Gradients { dx, dy }
}

fn derivative(n: usize, i: usize, coords: &[f64], z: impl Fn(usize) -> f64) -> f64 {
    if n < 2 {
        return 0.0;
    }
    let (lo, hi) = if i == 0 {
        (0, 1)
    } else if i == n - 1 {
        (n - 2, n - 1)
    } else {
        (i - 1, i + 1)
    };
    let span = coords[hi] - coords[lo];
    if span.abs() <= SPACING_EPS {
        return 0.0;
    }
    let d = (z(hi) - z(lo)) / span;
    if d.is_finite() { d } else { 0.0 }
}

/// Unit normals of the surface `z(x, y)`: `(−∂z/∂x, −∂z/∂y, 1)` normalised.
pub fn normals(field: &ScalarField) -> Vec<[f64; 3]> {
    let g = gradients(field);
    g.dx
        .iter()
        .zip(&g.dy)
        .map(|(&gx, &gy)| {
            let len = (gx * gx + gy * gy + 1.0).sqrt();
            [-gx / len, -gy / len, 1.0 / len]
        })
        .collect()
}

/// Darken cells that sit below the mean of their 3×3 neighbourhood.
///
/// The deficit is scaled by the field's finite value range and `strength`;
/// the result is clamped to `[AO_FLOOR, 1]`. Cells at or above their
/// neighbourhood mean, and non-finite cells, get 1.
pub fn ambient_occlusion(field: &ScalarField, strength: f64) -> Vec<f64> {
    let (w, h) = (field.width, field.height);
    let range = field.max_value() - field.min_value();
    let mut shade = vec![1.0; w * h];
    if !(range.is_finite() && range > SPACING_EPS) {
        return shade;
    }
    for r in 0..h {
        for c in 0..w {
            let v = field.get(r, c);
            if !v.is_finite() {
                continue;
            }
            let (mut sum, mut count) = (0.0, 0usize);
            for nr in r.saturating_sub(1)..=(r + 1).min(h - 1) {
                for nc in c.saturating_sub(1)..=(c + 1).min(w - 1) {
                    let n = field.get(nr, nc);
                    if (nr, nc) != (r, c) && n.is_finite() {
                        sum += n;
                        count += 1;
                    }
                }
            }
            if count == 0 {
                continue;
            }
            let deficit = (sum / count as f64 - v).max(0.0) / range;
            shade[r * w + c] = (1.0 - strength * deficit).clamp(AO_FLOOR, 1.0);
        }
    }
    shade
}
