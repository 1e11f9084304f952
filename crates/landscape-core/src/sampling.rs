//! Sampling axes: the ascending ratio values along x and y plus their log2.
use serde::{Deserialize, Serialize};

use crate::config::{EngineConfig, SamplingConfig};
use crate::error::ConfigError;

/// Just-intonation reference ratios within one octave used for refinement.
pub const JUST_RATIOS: [f64; 14] = [
    1.0,
    16.0 / 15.0,
    9.0 / 8.0,
    6.0 / 5.0,
    5.0 / 4.0,
    4.0 / 3.0,
    7.0 / 5.0,
    3.0 / 2.0,
    8.0 / 5.0,
    5.0 / 3.0,
    7.0 / 4.0,
    9.0 / 5.0,
    15.0 / 8.0,
    2.0,
];

/// Values closer than this (relative) are treated as one sample.
const DEDUP_REL_EPS: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Axis {
    pub values: Vec<f64>,
    pub log2: Vec<f64>,
}

impl Axis {
    pub fn from_values(mut values: Vec<f64>) -> Self {
        values.retain(|v| v.is_finite());
        sort_dedup(&mut values);
        let log2 = values.iter().map(|v| safe_log2(*v)).collect();
        Self { values, log2 }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Refinement {
    pub band_cents: f64,
    pub density: usize,
}

/// Build one axis over `range`.
///
/// `steps < 2` yields `[lo]`. Log spacing with a non-positive bound falls
/// back to linear.
pub fn build_axis(
    range: [f64; 2],
    steps: usize,
    log_spacing: bool,
    refine: Option<Refinement>,
    fold_octave: bool,
) -> Axis {
    let (lo, hi) = if range[0] <= range[1] { (range[0], range[1]) } else { (range[1], range[0]) };
    let steps = steps.max(1);
    let geometric = log_spacing && lo > 0.0;

    let mut values = Vec::with_capacity(steps);
    if steps == 1 || hi == lo {
        values.push(lo);
    } else {
        let last = (steps - 1) as f64;
        for i in 0..steps {
            let t = i as f64 / last;
            let v = if geometric {
                (lo.ln() + (hi.ln() - lo.ln()) * t).exp()
            } else {
                lo + (hi - lo) * t
            };
            values.push(v);
        }
        // Pin endpoints against exp/ln drift.
        values[0] = lo;
        values[steps - 1] = hi;
    }

    if let Some(r) = refine {
        if lo > 0.0 && r.density > 0 && r.band_cents > 0.0 {
            values.extend(refinement_points(lo, hi, r));
        }
    }

    if fold_octave {
        for v in values.iter_mut() {
            *v = fold_into_octave(*v);
        }
    }

    Axis::from_values(values)
}

/// Samples spread evenly in cents across ±band around every reference ratio
/// (and octave multiple) lying inside `[lo, hi]`.
fn refinement_points(lo: f64, hi: f64, r: Refinement) -> Vec<f64> {
    let mut out = Vec::new();
    let min_oct = lo.log2().floor() as i32 - 1;
    let max_oct = hi.log2().ceil() as i32;
    for oct in min_oct..=max_oct {
        let scale = 2f64.powi(oct);
        for &ratio in &JUST_RATIOS {
            let center = ratio * scale;
            if center < lo || center > hi {
                continue;
            }
            for k in 0..r.density {
                let t = if r.density == 1 { 0.5 } else { k as f64 / (r.density - 1) as f64 };
                let cents = -r.band_cents + 2.0 * r.band_cents * t;
                let v = center * 2f64.powf(cents / 1200.0);
                if v >= lo && v <= hi {
                    out.push(v);
                }
            }
        }
    }
    out
}

/// Map a positive ratio into `[1, 2)`.
pub fn fold_into_octave(v: f64) -> f64 {
    if !(v.is_finite() && v > 0.0) {
        return v;
    }
    let mut x = v;
    while x >= 2.0 {
        x *= 0.5;
    }
    while x < 1.0 {
        x *= 2.0;
    }
    x
}

fn sort_dedup(values: &mut Vec<f64>) {
    values.sort_by(|a, b| a.total_cmp(b));
    values.dedup_by(|b, a| (*b - *a).abs() <= DEDUP_REL_EPS * a.abs().max(b.abs()).max(1.0));
}

fn safe_log2(v: f64) -> f64 {
    if v > 0.0 { v.log2() } else { f64::NEG_INFINITY }
}

fn axis_from_sampling(s: &SamplingConfig, range: [f64; 2], steps: usize) -> Axis {
    let refine = s.refine_fixed.then_some(Refinement {
        band_cents: s.refine_band_cents,
        density: s.refine_density,
    });
    build_axis(range, steps, s.log_sampling, refine, s.fold_octave)
}

/// Resolve both axes for a config: supplied `axes` when present, otherwise
/// built from `sampling`.
pub fn resolve_axes(config: &EngineConfig) -> Result<(Axis, Axis), ConfigError> {
    if let Some(axes) = &config.axes {
        let x = Axis::from_values(axes.xs.clone());
        let y = Axis::from_values(axes.ys.clone());
        if x.is_empty() {
            return Err(ConfigError::EmptyAxis("x"));
        }
        if y.is_empty() {
            return Err(ConfigError::EmptyAxis("y"));
        }
        return Ok((x, y));
    }
    let s = &config.sampling;
    Ok((
        axis_from_sampling(s, s.x_range, s.x_steps),
        axis_from_sampling(s, s.y_range, s.y_steps),
    ))
}
