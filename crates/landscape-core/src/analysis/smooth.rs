//! Iterated 3×3 box blur.
use super::grid_walk::{resolve_index, BoundaryPolicy};
use crate::field::ScalarField;

/// Blur `field` `iterations` times. `Mirror` reflects out-of-range
/// neighbours back into the grid; `Clamp` and `Skip` both leave them out of
/// the average. Non-finite neighbours are ignored.
pub fn box_blur(field: &ScalarField, iterations: usize, policy: BoundaryPolicy) -> ScalarField {
    field.with_data(box_blur_values(&field.data, field.width, field.height, iterations, policy))
}

pub fn box_blur_values(
    data: &[f64],
    width: usize,
    height: usize,
    iterations: usize,
    policy: BoundaryPolicy,
) -> Vec<f64> {
    let policy = match policy {
        BoundaryPolicy::Mirror => BoundaryPolicy::Mirror,
        BoundaryPolicy::Clamp | BoundaryPolicy::Skip => BoundaryPolicy::Skip,
    };
    let mut src = data.to_vec();
    let mut dst = vec![0.0; src.len()];
    for _ in 0..iterations {
        for r in 0..height {
            for c in 0..width {
                let (mut sum, mut count) = (0.0, 0usize);
                for dy in -1..=1isize {
                    let Some(nr) = resolve_index(r as isize + dy, height, policy) else { continue };
                    for dx in -1..=1isize {
                        let Some(nc) = resolve_index(c as isize + dx, width, policy) else { continue };
                        let v = src[nr * width + nc];
                        if v.is_finite() {
                            sum += v;
                            count += 1;
                        }
                    }
                }
                let i = r * width + c;
                dst[i] = if count > 0 { sum / count as f64 } else { src[i] };
            }
        }
        std::mem::swap(&mut src, &mut dst);
    }
    src
}
