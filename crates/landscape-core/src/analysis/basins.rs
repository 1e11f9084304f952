//! Basins of consonance: bounded region growing from each accepted minimum.
use serde::{Deserialize, Serialize};

use super::extrema::{quantile_of, MinimaPoint};
use super::grid_walk::{BoundaryPolicy, Connectivity, GridBfs};
use crate::field::ScalarField;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BasinOptions {
    /// Multiplier on the local spread when deriving the admission threshold.
    pub threshold_std: f64,
    /// Cells around the seed sampled for the local spread.
    pub window_radius: usize,
    /// Quantile of above-seed deltas used as the spread.
    pub delta_quantile: f64,
    /// Metric distance cap from the seed.
    pub max_radius: Option<f64>,
    pub connectivity: Connectivity,
}

impl Default for BasinOptions {
    fn default() -> Self {
        Self {
            threshold_std: 1.0,
            window_radius: 3,
            delta_quantile: 0.9,
            max_radius: None,
            connectivity: Connectivity::Eight,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Basin {
    /// Admitted cells, seed included.
    pub cells: usize,
    /// Summed metric cell area.
    pub area: f64,
    /// Radius of the circle with the same area.
    pub radius: f64,
    /// Highest admissible value.
    pub threshold: f64,
}

/// Grow a basin around every minimum and record its area, equivalent radius
/// and threshold on the point. Returns the basins in the same order; points
/// outside the field are skipped.
pub fn estimate_basins(field: &ScalarField, minima: &mut [MinimaPoint], opts: &BasinOptions) -> Vec<Basin> {
    let mut bfs = GridBfs::new(field.width, field.height);
    estimate_basins_with(field, minima, opts, &mut bfs)
}

/// As [`estimate_basins`], reusing the caller's search marks. A search
/// sized for a different grid is replaced by one that fits `field`.
pub fn estimate_basins_with(
    field: &ScalarField,
    minima: &mut [MinimaPoint],
    opts: &BasinOptions,
    bfs: &mut GridBfs,
) -> Vec<Basin> {
    let (w, h) = (field.width, field.height);
    if bfs.dims() != (w, h) {
        log::debug!("basin search sized {:?} does not fit a {w}x{h} field; reallocating", bfs.dims());
        *bfs = GridBfs::new(w, h);
    }
    let areas = field.cell_areas();
    let mut cells = Vec::new();
    let mut basins = Vec::with_capacity(minima.len());

    for m in minima.iter_mut() {
        if m.ix >= w || m.iy >= h {
            continue;
        }
        let seed = m.iy * w + m.ix;
        let seed_value = field.data[seed];
        let threshold = seed_value + local_spread(field, m.ix, m.iy, opts) * opts.threshold_std;
        let (sx, sy) = (field.metric_x[m.ix], field.metric_y[m.iy]);
        let max_r2 = opts.max_radius.map(|r| r * r);

        bfs.flood(
            seed,
            opts.connectivity,
            BoundaryPolicy::Skip,
            |i| {
                let v = field.data[i];
                if !(v.is_finite() && v <= threshold) {
                    return false;
                }
                match max_r2 {
                    Some(r2) => {
                        let dx = field.metric_x[i % w] - sx;
                        let dy = field.metric_y[i / w] - sy;
                        dx * dx + dy * dy <= r2
                    }
                    None => true,
                }
            },
            &mut cells,
        );

        let area: f64 = cells.iter().map(|&i| areas[i]).sum();
        let basin = Basin {
            cells: cells.len(),
            area,
            radius: (area / std::f64::consts::PI).sqrt(),
            threshold,
        };
        m.basin_area = Some(basin.area);
        m.basin_radius = Some(basin.radius);
        m.basin_threshold = Some(basin.threshold);
        basins.push(basin);
    }
    basins
}

/// Quantile of the positive deltas above the seed within the window, or the
/// window's standard deviation when that is not positive.
fn local_spread(field: &ScalarField, ix: usize, iy: usize, opts: &BasinOptions) -> f64 {
    let (w, h) = (field.width, field.height);
    let r = opts.window_radius.max(1);
    let seed = field.get(iy, ix);
    let mut window = Vec::new();
    for ny in iy.saturating_sub(r)..=(iy + r).min(h - 1) {
        for nx in ix.saturating_sub(r)..=(ix + r).min(w - 1) {
            let v = field.get(ny, nx);
            if v.is_finite() {
                window.push(v);
            }
        }
    }
    let mut deltas: Vec<f64> = window.iter().map(|v| v - seed).filter(|d| *d > 0.0).collect();
    let q = quantile_of(&mut deltas, opts.delta_quantile.clamp(0.0, 1.0));
    if q.is_finite() && q > 0.0 {
        return q;
    }
    if window.is_empty() {
        return 0.0;
    }
    let mean = window.iter().sum::<f64>() / window.len() as f64;
    let var = window.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / window.len() as f64;
    var.sqrt()
}
