//! Small-integer ratio labels for points of the landscape.
use serde::{Deserialize, Serialize};

use super::extrema::MinimaPoint;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RationalApprox {
    pub num: u64,
    pub den: u64,
    /// `num / den`.
    pub value: f64,
    /// `|target − value|`.
    pub error: f64,
    /// Signed distance from `value` to the target, in cents.
    pub cents_error: f64,
}

impl RationalApprox {
    fn new(target: f64, num: u64, den: u64) -> Self {
        let g = gcd(num, den).max(1);
        let (num, den) = (num / g, den / g);
        let value = num as f64 / den as f64;
        let cents_error = if value > 0.0 { 1200.0 * (target / value).log2() } else { f64::NAN };
        Self { num, den, value, error: (target - value).abs(), cents_error }
    }
}

pub fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// Best fraction with denominator ≤ `max_den`, by exhaustive search.
///
/// With `prefer_small_denominator`, a larger denominator only wins when its
/// error beats the current best by more than `tie_tolerance`.
pub fn approximate_ratio_by_denominator(
    value: f64,
    max_den: u64,
    tie_tolerance: f64,
    prefer_small_denominator: bool,
) -> Option<RationalApprox> {
    if !value.is_finite() || value <= 0.0 || max_den == 0 {
        return None;
    }
    let tie = if prefer_small_denominator { tie_tolerance.max(0.0) } else { 0.0 };
    let mut best: Option<(u64, u64, f64)> = None;
    for den in 1..=max_den {
        let num = (value * den as f64).round();
        if num < 1.0 {
            continue;
        }
        let err = (value - num / den as f64).abs();
        let better = match best {
            None => true,
            Some((_, _, best_err)) => err < best_err - tie,
        };
        if better {
            best = Some((num as u64, den, err));
        }
    }
    best.map(|(num, den, _)| RationalApprox::new(value, num, den))
}

/// Last continued-fraction convergent of `value` whose denominator fits in
/// `max_den`, after at most `max_iter` terms.
pub fn approximate_ratio_continued(value: f64, max_den: u64, max_iter: usize) -> Option<RationalApprox> {
    if !value.is_finite() || value <= 0.0 || max_den == 0 {
        return None;
    }
    // Convergents h/k with the usual (h₋₁, h₋₂) = (1, 0), (k₋₁, k₋₂) = (0, 1).
    let (mut h_prev, mut h_prev2) = (1u64, 0u64);
    let (mut k_prev, mut k_prev2) = (0u64, 1u64);
    let mut best: Option<(u64, u64)> = None;
    let mut x = value;
    for _ in 0..max_iter.max(1) {
        let a = x.floor();
        if a > u32::MAX as f64 {
            break;
        }
        let a = a as u64;
        let (Some(h), Some(k)) = (
            a.checked_mul(h_prev).and_then(|v| v.checked_add(h_prev2)),
            a.checked_mul(k_prev).and_then(|v| v.checked_add(k_prev2)),
        ) else {
            break;
        };
        if k > max_den {
            break;
        }
        if h > 0 {
            best = Some((h, k));
        }
        (h_prev2, h_prev) = (h_prev, h);
        (k_prev2, k_prev) = (k_prev, k);
        let frac = x - a as f64;
        if frac < 1e-12 {
            break;
        }
        x = 1.0 / frac;
    }
    match best {
        Some((h, k)) => Some(RationalApprox::new(value, h, k)),
        // value < 1 with max_den too small for any convergent: fall back to 1/1.
        None => Some(RationalApprox::new(value, 1, 1)),
    }
}

/// Attach ratio labels for both axes to every minimum.
pub fn label_minima(minima: &mut [MinimaPoint], max_den: u64, tie_tolerance: f64) {
    for m in minima.iter_mut() {
        m.rational_x = approximate_ratio_by_denominator(m.x, max_den, tie_tolerance, true);
        m.rational_y = approximate_ratio_by_denominator(m.y, max_den, tie_tolerance, true);
    }
}
