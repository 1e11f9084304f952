//! Self-test of the landscape's mirror symmetry.
//!
//! Swapping the two moving tones leaves the roughness of a triad unchanged,
//! so a correct grid satisfies `z(x, y) ≈ z(y, x)` wherever both axes overlap.
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::field::ScalarField;

/// Denominator floor for relative errors.
const REL_EPS: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymmetryReport {
    /// Sample pairs that could be compared.
    pub samples: usize,
    pub max_error: f64,
    pub avg_error: f64,
    pub tolerance: f64,
    pub passed: bool,
}

/// Compare `z(x, y)` with `z(y, x)` at `samples` seeded random points of the
/// overlapping axis range, using bilinear interpolation. Errors are relative
/// to the larger magnitude of the two values.
pub fn symmetry_check(field: &ScalarField, samples: usize, seed: u64, tolerance: f64) -> SymmetryReport {
    let mut report = SymmetryReport { samples: 0, max_error: 0.0, avg_error: 0.0, tolerance, passed: false };
    let (Some(&x0), Some(&x1), Some(&y0), Some(&y1)) =
        (field.xs.first(), field.xs.last(), field.ys.first(), field.ys.last())
    else {
        return report;
    };
    let (lo, hi) = (x0.max(y0), x1.min(y1));
    if !(lo.is_finite() && hi.is_finite()) || lo > hi {
        log::debug!("symmetry check skipped: axes do not overlap");
        return report;
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut sum = 0.0;
    for _ in 0..samples {
        let u = rng.gen_range(lo..=hi);
        let v = rng.gen_range(lo..=hi);
        let (Some(a), Some(b)) = (field.sample(u, v), field.sample(v, u)) else { continue };
        if !(a.is_finite() && b.is_finite()) {
            continue;
        }
        let err = (a - b).abs() / a.abs().max(b.abs()).max(REL_EPS);
        report.max_error = report.max_error.max(err);
        sum += err;
        report.samples += 1;
    }
    if report.samples > 0 {
        report.avg_error = sum / report.samples as f64;
        report.passed = report.max_error <= tolerance;
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(f: impl Fn(f64, f64) -> f64) -> ScalarField {
        let axis: Vec<f64> = (0..9).map(|i| 1.0 + i as f64 / 8.0).collect();
        let data = axis.iter().flat_map(|&y| axis.iter().map(move |&x| (x, y))).map(|(x, y)| f(x, y)).collect();
        ScalarField::new(data, axis.clone(), axis.clone(), axis.clone(), axis)
    }

    #[test]
    fn symmetric_field_passes() {
        let r = symmetry_check(&field(|x, y| x * y + (x - y).powi(2)), 200, 7, 1e-9);
        assert_eq!(r.samples, 200);
        assert!(r.passed, "{r:?}");
        assert!(r.max_error < 1e-12);
    }

    #[test]
    fn asymmetric_field_fails() {
        let r = symmetry_check(&field(|x, _| x), 200, 7, 1e-3);
        assert!(!r.passed);
        assert!(r.max_error > 1e-2);
    }

    #[test]
    fn seed_makes_report_repeatable() {
        let f = field(|x, y| x.sin() + y * 0.5);
        assert_eq!(symmetry_check(&f, 50, 42, 0.1), symmetry_check(&f, 50, 42, 0.1));
    }

    #[test]
    fn disjoint_axes_report_no_samples() {
        let f = ScalarField::new(vec![1.0; 4], vec![1.0, 1.5], vec![2.0, 3.0], vec![0.0, 1.0], vec![0.0, 1.0]);
        let r = symmetry_check(&f, 10, 1, 0.1);
        assert_eq!(r.samples, 0);
        assert!(!r.passed);
    }
}
