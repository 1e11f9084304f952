//! Normalised, merged partial list shared by all three tones.
//!
//! Pipeline:
//!   1. Generate the preset partial list (indices = generation order).
//!   2. Inject a ratio-1 partial if none exists.
//!   3. Sort by ratio and merge near-duplicates.
//!   4. Truncate to `max_partials`.
//!   5. Compress and normalise amplitudes in the configured order.
use serde::{Deserialize, Serialize};

use crate::config::{
    AmpNormalization, BasePartialStrategy, Compression, MergeUnit, PipelineOrder, TimbreConfig,
    TimbrePreset,
};

/// Ratios closer than this always merge, regardless of unit and tolerance.
pub const ABSOLUTE_MERGE_EPS: f64 = 1e-9;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateCounts {
    pub generated: usize,
    pub injected_base: bool,
    pub merged: usize,
    pub truncated: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpectrumTemplate {
    /// Strictly ascending beyond the merge tolerance.
    pub ratios: Vec<f64>,
    pub amps: Vec<f64>,
    pub partial_index: Vec<usize>,
    pub counts: TemplateCounts,
}

impl SpectrumTemplate {
    pub fn len(&self) -> usize {
        self.ratios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ratios.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
struct Partial {
    ratio: f64,
    amp: f64,
    index: usize,
}

/// Build the template for `timbre`. `reference_freq` converts `hz` merge
/// tolerances into ratio space.
pub fn build_spectrum_template(timbre: &TimbreConfig, reference_freq: f64) -> SpectrumTemplate {
    let mut partials = generate_preset(timbre);
    let generated = partials.len();

    let has_base = partials.iter().any(|p| (p.ratio - 1.0).abs() <= ABSOLUTE_MERGE_EPS);
    if !has_base {
        let amp = match timbre.base_partial_strategy {
            BasePartialStrategy::One => 1.0,
            BasePartialStrategy::First => partials.first().map_or(1.0, |p| p.amp),
            BasePartialStrategy::Max => partials
                .iter()
                .map(|p| p.amp)
                .fold(f64::NEG_INFINITY, f64::max)
                .max(0.0),
        };
        let amp = if amp > 0.0 { amp } else { 1.0 };
        partials.insert(0, Partial { ratio: 1.0, amp, index: 0 });
        for (i, p) in partials.iter_mut().enumerate() {
            p.index = i;
        }
    }

    partials.sort_by(|a, b| a.ratio.total_cmp(&b.ratio).then(a.index.cmp(&b.index)));

    let before_merge = partials.len();
    let mut merged: Vec<Partial> = Vec::with_capacity(before_merge);
    for p in partials {
        match merged.last_mut() {
            Some(last) if within_template_tolerance(last.ratio, p.ratio, timbre, reference_freq) => {
                last.amp += p.amp;
                last.index = last.index.min(p.index);
            }
            _ => merged.push(p),
        }
    }
    let merged_count = before_merge - merged.len();

    let cap = timbre.max_partials.max(1);
    let truncated = merged.len().saturating_sub(cap);
    merged.truncate(cap);

    let mut amps: Vec<f64> = merged.iter().map(|p| p.amp).collect();
    match timbre.pipeline_order {
        PipelineOrder::CompressThenNormalize => {
            compress(&mut amps, timbre.compression, timbre.compression_amount);
            normalize(&mut amps, timbre.normalization);
        }
        PipelineOrder::NormalizeThenCompress => {
            normalize(&mut amps, timbre.normalization);
            compress(&mut amps, timbre.compression, timbre.compression_amount);
        }
    }

    SpectrumTemplate {
        ratios: merged.iter().map(|p| p.ratio).collect(),
        amps,
        partial_index: merged.iter().map(|p| p.index).collect(),
        counts: TemplateCounts {
            generated,
            injected_base: !has_base,
            merged: merged_count,
            truncated,
        },
    }
}

fn generate_preset(timbre: &TimbreConfig) -> Vec<Partial> {
    let n = timbre.partial_count.min(timbre.max_partials.max(1));
    let odd = |k: usize| (2 * k + 1) as f64;
    match timbre.preset {
        TimbrePreset::Harmonic => (0..n)
            .map(|k| {
                let h = (k + 1) as f64;
                Partial { ratio: h, amp: 1.0 / h, index: k }
            })
            .collect(),
        TimbrePreset::Square => (0..n)
            .map(|k| Partial { ratio: odd(k), amp: 1.0 / odd(k), index: k })
            .collect(),
        TimbrePreset::Triangle => (0..n)
            .map(|k| Partial { ratio: odd(k), amp: 1.0 / (odd(k) * odd(k)), index: k })
            .collect(),
        TimbrePreset::Custom => timbre
            .custom_partials
            .iter()
            .filter(|p| p.ratio.is_finite() && p.ratio > 0.0 && p.amp.is_finite() && p.amp >= 0.0)
            .enumerate()
            .map(|(k, p)| Partial { ratio: p.ratio, amp: p.amp, index: k })
            .collect(),
    }
}

fn within_template_tolerance(r1: f64, r2: f64, timbre: &TimbreConfig, reference_freq: f64) -> bool {
    let delta = (r2 - r1).abs();
    if delta <= ABSOLUTE_MERGE_EPS {
        return true;
    }
    let tol = timbre.merge_tolerance;
    if tol.is_nan() || tol <= 0.0 {
        return false;
    }
    match timbre.merge_unit {
        MergeUnit::Ratio => delta <= tol,
        MergeUnit::Cents => (1200.0 * (r2 / r1).log2()).abs() <= tol,
        MergeUnit::Hz => delta * reference_freq <= tol,
    }
}

fn compress(amps: &mut [f64], mode: Compression, amount: f64) {
    match mode {
        Compression::None => {}
        Compression::Sqrt => amps.iter_mut().for_each(|a| *a = a.max(0.0).sqrt()),
        Compression::Log => {
            if amount > 0.0 {
                let denom = (1.0 + amount).ln();
                amps.iter_mut().for_each(|a| *a = (1.0 + amount * a.max(0.0)).ln() / denom);
            }
        }
    }
}

fn normalize(amps: &mut [f64], mode: AmpNormalization) {
    let scale = match mode {
        AmpNormalization::None => return,
        AmpNormalization::Max => amps.iter().cloned().fold(0.0, f64::max),
        AmpNormalization::Energy => amps.iter().map(|a| a * a).sum::<f64>().sqrt(),
    };
    if scale > 1e-12 {
        amps.iter_mut().for_each(|a| *a /= scale);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CustomPartial;

    fn timbre() -> TimbreConfig {
        TimbreConfig::default()
    }

    #[test]
    fn harmonic_preset_is_saw() {
        let t = build_spectrum_template(&timbre(), 220.0);
        assert_eq!(t.len(), 8);
        assert_eq!(t.ratios, (1..=8).map(|k| k as f64).collect::<Vec<_>>());
        assert!((t.amps[3] - 0.25).abs() < 1e-15);
        assert!(!t.counts.injected_base);
    }

    #[test]
    fn triangle_uses_odd_inverse_squares() {
        let t = build_spectrum_template(
            &TimbreConfig { preset: TimbrePreset::Triangle, partial_count: 3, ..timbre() },
            220.0,
        );
        assert_eq!(t.ratios, vec![1.0, 3.0, 5.0]);
        assert!((t.amps[2] - 1.0 / 25.0).abs() < 1e-15);
    }

    #[test]
    fn injects_base_with_strategy() {
        let custom = vec![
            CustomPartial { ratio: 2.0, amp: 0.4 },
            CustomPartial { ratio: 3.0, amp: 0.9 },
        ];
        let mk = |s| TimbreConfig {
            preset: TimbrePreset::Custom,
            custom_partials: custom.clone(),
            base_partial_strategy: s,
            ..timbre()
        };
        let one = build_spectrum_template(&mk(BasePartialStrategy::One), 220.0);
        assert!(one.counts.injected_base);
        assert_eq!(one.ratios[0], 1.0);
        assert_eq!(one.amps[0], 1.0);
        assert_eq!(one.partial_index[0], 0);
        assert_eq!(build_spectrum_template(&mk(BasePartialStrategy::First), 220.0).amps[0], 0.4);
        assert_eq!(build_spectrum_template(&mk(BasePartialStrategy::Max), 220.0).amps[0], 0.9);
    }

    #[test]
    fn merges_within_cents_keeping_smaller_index() {
        let t = build_spectrum_template(
            &TimbreConfig {
                preset: TimbrePreset::Custom,
                custom_partials: vec![
                    CustomPartial { ratio: 1.0, amp: 1.0 },
                    CustomPartial { ratio: 2.001, amp: 0.2 },
                    CustomPartial { ratio: 2.0, amp: 0.3 },
                ],
                merge_tolerance: 5.0,
                merge_unit: MergeUnit::Cents,
                ..timbre()
            },
            220.0,
        );
        assert_eq!(t.len(), 2);
        assert_eq!(t.ratios[1], 2.0);
        assert!((t.amps[1] - 0.5).abs() < 1e-15);
        assert_eq!(t.partial_index[1], 1);
        assert_eq!(t.counts.merged, 1);
    }

    #[test]
    fn exact_duplicates_merge_without_tolerance() {
        let t = build_spectrum_template(
            &TimbreConfig {
                preset: TimbrePreset::Custom,
                custom_partials: vec![
                    CustomPartial { ratio: 1.0, amp: 1.0 },
                    CustomPartial { ratio: 1.0, amp: 1.0 },
                ],
                ..timbre()
            },
            220.0,
        );
        assert_eq!(t.len(), 1);
        assert_eq!(t.amps[0], 2.0);
    }

    #[test]
    fn truncates_to_max_partials() {
        let custom = (1..=10).map(|k| CustomPartial { ratio: k as f64, amp: 1.0 }).collect();
        let t = build_spectrum_template(
            &TimbreConfig {
                preset: TimbrePreset::Custom,
                custom_partials: custom,
                max_partials: 4,
                ..timbre()
            },
            220.0,
        );
        assert_eq!(t.len(), 4);
        assert_eq!(t.counts.truncated, 6);
    }

    #[test]
    fn pipeline_order_matters() {
        let base = TimbreConfig {
            partial_count: 4,
            normalization: AmpNormalization::Energy,
            compression: Compression::Sqrt,
            ..timbre()
        };
        let ctn = build_spectrum_template(&base, 220.0);
        let ntc = build_spectrum_template(
            &TimbreConfig { pipeline_order: PipelineOrder::NormalizeThenCompress, ..base },
            220.0,
        );
        let energy: f64 = ctn.amps.iter().map(|a| a * a).sum();
        assert!((energy - 1.0).abs() < 1e-12);
        assert!(ntc.amps.iter().zip(&ctn.amps).any(|(a, b)| (a - b).abs() > 1e-6));
    }

    #[test]
    fn max_normalisation_peaks_at_one() {
        let t = build_spectrum_template(
            &TimbreConfig {
                compression: Compression::Log,
                compression_amount: 4.0,
                normalization: AmpNormalization::Max,
                ..timbre()
            },
            220.0,
        );
        let peak = t.amps.iter().cloned().fold(0.0, f64::max);
        assert!((peak - 1.0).abs() < 1e-15);
    }
}
