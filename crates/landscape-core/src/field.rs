use serde::{Deserialize, Serialize};

/// A 2D scalar field over non-uniform axes, row-major (`y` rows, `x` columns).
///
/// `xs`/`ys` are the sampling ratios; `metric_x`/`metric_y` are the coordinates
/// used for distances and derivatives (log2 of the ratios for log-sampled
/// grids, the ratios themselves otherwise).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScalarField {
    pub data: Vec<f64>,
    pub width: usize,
    pub height: usize,
    pub xs: Vec<f64>,
    pub ys: Vec<f64>,
    pub metric_x: Vec<f64>,
    pub metric_y: Vec<f64>,
}

impl ScalarField {
    pub fn new(data: Vec<f64>, xs: Vec<f64>, ys: Vec<f64>, metric_x: Vec<f64>, metric_y: Vec<f64>) -> Self {
        let (width, height) = (xs.len(), ys.len());
        debug_assert_eq!(data.len(), width * height);
        debug_assert_eq!(metric_x.len(), width);
        debug_assert_eq!(metric_y.len(), height);
        Self { data, width, height, xs, ys, metric_x, metric_y }
    }

    /// Unit-spaced field (`xs = metric_x = 0..width`), handy for synthetic tests.
    pub fn uniform(width: usize, height: usize, data: Vec<f64>) -> Self {
        let xs: Vec<f64> = (0..width).map(|i| i as f64).collect();
        let ys: Vec<f64> = (0..height).map(|j| j as f64).collect();
        Self::new(data, xs.clone(), ys.clone(), xs, ys)
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.width + col]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, val: f64) {
        self.data[row * self.width + col] = val;
    }

    /// Same geometry, different values.
    pub fn with_data(&self, data: Vec<f64>) -> Self {
        debug_assert_eq!(data.len(), self.data.len());
        Self { data, ..self.clone() }
    }

    pub fn negated(&self) -> Self {
        self.with_data(self.data.iter().map(|v| -v).collect())
    }

    /// Sample at axis values `(x, y)` with bilinear interpolation between the
    /// bracketing samples. Returns `None` outside the axis bounds.
    pub fn sample(&self, x: f64, y: f64) -> Option<f64> {
        let (c0, c1, tx) = bracket(&self.xs, x)?;
        let (r0, r1, ty) = bracket(&self.ys, y)?;

        let v00 = self.get(r0, c0);
        let v10 = self.get(r0, c1);
        let v01 = self.get(r1, c0);
        let v11 = self.get(r1, c1);

        Some(
            v00 * (1.0 - tx) * (1.0 - ty)
                + v10 * tx * (1.0 - ty)
                + v01 * (1.0 - tx) * ty
                + v11 * tx * ty,
        )
    }

    pub fn min_value(&self) -> f64 {
        self.data.iter().cloned().filter(|v| v.is_finite()).fold(f64::INFINITY, f64::min)
    }

    pub fn max_value(&self) -> f64 {
        self.data.iter().cloned().filter(|v| v.is_finite()).fold(f64::NEG_INFINITY, f64::max)
    }

    /// Per-cell metric area (`cell_sizes(x)[i] · cell_sizes(y)[j]`).
    pub fn cell_areas(&self) -> Vec<f64> {
        cell_areas(&cell_sizes(&self.metric_x), &cell_sizes(&self.metric_y))
    }
}

/// Index pair and interpolation weight for `v` on an ascending axis.
fn bracket(axis: &[f64], v: f64) -> Option<(usize, usize, f64)> {
    let n = axis.len();
    if n == 0 || !v.is_finite() || v < axis[0] || v > axis[n - 1] {
        return None;
    }
    if n == 1 {
        return Some((0, 0, 0.0));
    }
    let hi = axis.partition_point(|&a| a < v).clamp(1, n - 1);
    let lo = hi - 1;
    let span = axis[hi] - axis[lo];
    let t = if span > 1e-15 { (v - axis[lo]) / span } else { 0.0 };
    Some((lo, hi, t.clamp(0.0, 1.0)))
}

/// Width of the cell around each sample: half the distance between its
/// neighbours, one-sided at the ends. Degenerate spacing falls back to 1.
pub fn cell_sizes(coords: &[f64]) -> Vec<f64> {
    let n = coords.len();
    let guard = |w: f64| if w.is_finite() && w > 1e-15 { w } else { 1.0 };
    match n {
        0 => Vec::new(),
        1 => vec![1.0],
        _ => (0..n)
            .map(|i| {
                let w = if i == 0 {
                    coords[1] - coords[0]
                } else if i == n - 1 {
                    coords[n - 1] - coords[n - 2]
                } else {
                    0.5 * (coords[i + 1] - coords[i - 1])
                };
                guard(w)
            })
            .collect(),
    }
}

pub fn cell_areas(widths: &[f64], heights: &[f64]) -> Vec<f64> {
    heights
        .iter()
        .flat_map(|h| widths.iter().map(move |w| w * h))
        .collect()
}
