//! Pairwise perceptual roughness (Plomp–Levelt curve, Sethares parameterisation)
//! and its O(n²) sum over a partial pool.
use serde::{Deserialize, Serialize};

use crate::config::RoughnessOptions;
use crate::constants::RoughnessConstants;
use crate::spectrum::pool::PartialPool;

/// Roughness between two sinusoidal partials.
///
/// `r = a1·a2 · (e^(−a·s·Δf) − e^(−b·s·Δf))`, `s = d* / (s1·f_min + s2)`.
/// Symmetric under swapping the partials; zero for `Δf = 0`.
#[inline]
pub fn pair_roughness(f1: f64, f2: f64, a1: f64, a2: f64, c: &RoughnessConstants) -> f64 {
    let df = (f2 - f1).abs();
    if df == 0.0 {
        return 0.0;
    }
    let f_min = f1.min(f2);
    let s = c.d_star / (c.s1 * f_min + c.s2);
    let x = s * df;
    let (mut ea, mut eb) = (-c.a * x, -c.b * x);
    if let Some(floor) = c.exp_clamp_min {
        ea = ea.max(floor);
        eb = eb.max(floor);
    }
    a1 * a2 * (ea.exp() - eb.exp())
}

/// Aggregate counters of one pool evaluation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolDiagnostics {
    pub total_pairs: u32,
    pub skipped_pairs: u32,
    pub invalid_pairs: u32,
    pub max_pair: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairContribution {
    pub f1: f64,
    pub f2: f64,
    pub a1: f64,
    pub a2: f64,
    pub value: f64,
}

/// Keeps the `k` largest pair contributions, descending.
#[derive(Debug, Clone, Default)]
pub struct TopPairs {
    k: usize,
    pairs: Vec<PairContribution>,
}

impl TopPairs {
    pub fn new(k: usize) -> Self {
        Self { k, pairs: Vec::with_capacity(k + 1) }
    }

    fn offer(&mut self, p: PairContribution) {
        if self.k == 0 {
            return;
        }
        if self.pairs.len() == self.k && self.pairs.last().is_some_and(|w| w.value >= p.value) {
            return;
        }
        let pos = self.pairs.partition_point(|q| q.value >= p.value);
        self.pairs.insert(pos, p);
        self.pairs.truncate(self.k);
    }

    pub fn pairs(&self) -> &[PairContribution] {
        &self.pairs
    }

    pub fn into_pairs(self) -> Vec<PairContribution> {
        self.pairs
    }
}

/// Sum of [`pair_roughness`] over all unordered pool pairs.
///
/// Pairs whose amplitude product is below `amp_threshold · epsilon_contribution`
/// are skipped. With self-interaction enabled, pairs that share a partial index
/// but come from disjoint tones add `weight · r` on top of `r`. Non-finite pair
/// terms are dropped and counted as invalid.
pub fn pool_roughness(
    pool: &PartialPool,
    c: &RoughnessConstants,
    opts: &RoughnessOptions,
    mut top: Option<&mut TopPairs>,
) -> (f64, PoolDiagnostics) {
    let n = pool.len();
    let floor = opts.pair_amp_floor();
    let self_weight = if opts.enable_self_interaction { opts.self_interaction_weight } else { 0.0 };
    let mut diag = PoolDiagnostics::default();
    let mut total = 0.0;

    for i in 0..n {
        let (fi, ai) = (pool.freqs[i], pool.amps[i]);
        for j in (i + 1)..n {
            diag.total_pairs += 1;
            let aj = pool.amps[j];
            if ai * aj < floor {
                diag.skipped_pairs += 1;
                continue;
            }
            let fj = pool.freqs[j];
            let mut r = pair_roughness(fi, fj, ai, aj, c);
            if self_weight != 0.0
                && pool.partial_index[i] == pool.partial_index[j]
                && pool.tone_mask[i] & pool.tone_mask[j] == 0
            {
                r += self_weight * r;
            }
            if !r.is_finite() {
                diag.invalid_pairs += 1;
                continue;
            }
            total += r;
            if r > diag.max_pair {
                diag.max_pair = r;
            }
            if let Some(t) = top.as_deref_mut() {
                t.offer(PairContribution { f1: fi, f2: fj, a1: ai, a2: aj, value: r });
            }
        }
    }
    (total, diag)
}
