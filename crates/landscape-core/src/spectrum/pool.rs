//! Three-way merge of the base, x and y tone spectra into one partial pool.
//!
//! Runs once per grid cell, so it writes into a caller-owned [`PartialPool`]
//! sized once per call (3 × template length) and never allocates per cell.
use crate::config::{MergeUnit, RoughnessOptions};

use super::template::ABSOLUTE_MERGE_EPS;
use super::tone::ToneSpectrum;

/// Frequency-merge rule for pool entries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MergePolicy {
    pub enabled: bool,
    pub tolerance: f64,
    pub unit: MergeUnit,
}

impl MergePolicy {
    pub fn from_options(opts: &RoughnessOptions) -> Self {
        Self {
            enabled: opts.merge_duplicate_partials,
            tolerance: opts.merge_tolerance,
            unit: opts.merge_unit,
        }
    }

    /// `f1 <= f2` is assumed.
    #[inline]
    pub fn should_merge(&self, f1: f64, f2: f64) -> bool {
        if !self.enabled {
            return false;
        }
        let delta = f2 - f1;
        if delta.abs() <= ABSOLUTE_MERGE_EPS {
            return true;
        }
        if self.tolerance.is_nan() || self.tolerance <= 0.0 {
            return false;
        }
        match self.unit {
            MergeUnit::Ratio => f1 > 0.0 && delta / f1 <= self.tolerance,
            MergeUnit::Cents => f1 > 0.0 && 1200.0 * (f2 / f1).log2() <= self.tolerance,
            MergeUnit::Hz => delta <= self.tolerance,
        }
    }
}

/// Merged multiset of partials. Reused as scratch across the cells of one call.
#[derive(Debug, Clone, Default)]
pub struct PartialPool {
    /// Non-decreasing.
    pub freqs: Vec<f64>,
    pub amps: Vec<f64>,
    /// Bitwise OR of contributing tone masks.
    pub tone_mask: Vec<u8>,
    /// Minimum partial index among contributors.
    pub partial_index: Vec<usize>,
    /// Per-tone amplitude contributions, indexed by tone.
    pub tone_amps: [Vec<f64>; 3],
    /// Number of partials fed in before merging.
    pub source_len: usize,
}

impl PartialPool {
    /// Pre-size for templates of `template_len` partials.
    pub fn with_template_len(template_len: usize) -> Self {
        let cap = 3 * template_len;
        Self {
            freqs: Vec::with_capacity(cap),
            amps: Vec::with_capacity(cap),
            tone_mask: Vec::with_capacity(cap),
            partial_index: Vec::with_capacity(cap),
            tone_amps: [
                Vec::with_capacity(cap),
                Vec::with_capacity(cap),
                Vec::with_capacity(cap),
            ],
            source_len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.freqs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.freqs.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.freqs.capacity()
    }

    /// Entries removed by merging in the last fill.
    pub fn merged_count(&self) -> usize {
        self.source_len - self.len()
    }

    fn clear(&mut self) {
        self.freqs.clear();
        self.amps.clear();
        self.tone_mask.clear();
        self.partial_index.clear();
        for t in &mut self.tone_amps {
            t.clear();
        }
        self.source_len = 0;
    }

    fn push(&mut self, freq: f64, amp: f64, tone: usize, mask: u8, index: usize) {
        self.freqs.push(freq);
        self.amps.push(amp);
        self.tone_mask.push(mask);
        self.partial_index.push(index);
        for (t, v) in self.tone_amps.iter_mut().enumerate() {
            v.push(if t == tone { amp } else { 0.0 });
        }
    }

    /// Refill from three tone spectra (base, x, y order), always taking the
    /// globally smallest next frequency; ties go to the lower tone.
    pub fn fill(&mut self, tones: [&ToneSpectrum; 3], policy: &MergePolicy) {
        self.clear();
        let mut cursor = [0usize; 3];
        loop {
            let mut pick: Option<usize> = None;
            for (t, tone) in tones.iter().enumerate() {
                if cursor[t] >= tone.len() {
                    continue;
                }
                let f = tone.freqs[cursor[t]];
                match pick {
                    Some(p) if tones[p].freqs[cursor[p]] <= f => {}
                    _ => pick = Some(t),
                }
            }
            let Some(t) = pick else { break };
            let tone = tones[t];
            let k = cursor[t];
            cursor[t] += 1;
            self.source_len += 1;

            let (freq, amp, index) = (tone.freqs[k], tone.amps[k], tone.partial_index[k]);
            let tone_slot = tone.tone_index as usize;
            let merge_into = match self.freqs.last() {
                Some(&last) => policy.should_merge(last, freq),
                None => false,
            };
            if merge_into {
                let i = self.freqs.len() - 1;
                self.amps[i] += amp;
                self.tone_mask[i] |= tone.tone_mask;
                self.partial_index[i] = self.partial_index[i].min(index);
                self.tone_amps[tone_slot][i] += amp;
            } else {
                self.push(freq, amp, tone_slot, tone.tone_mask, index);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TimbreConfig;
    use crate::spectrum::template::build_spectrum_template;
    use crate::spectrum::tone::{build_tone_spectrum, TONE_BASE, TONE_X, TONE_Y};

    fn tones(x: f64, y: f64) -> [ToneSpectrum; 3] {
        let t = build_spectrum_template(&TimbreConfig { partial_count: 4, ..Default::default() }, 100.0);
        [
            build_tone_spectrum(100.0, &t, TONE_BASE, 1.0),
            build_tone_spectrum(100.0 * x, &t, TONE_X, 1.0),
            build_tone_spectrum(100.0 * y, &t, TONE_Y, 1.0),
        ]
    }

    fn policy() -> MergePolicy {
        MergePolicy::from_options(&RoughnessOptions::default())
    }

    #[test]
    fn merged_pool_is_sorted_and_deduplicated() {
        let [b, x, y] = tones(1.5, 2.0);
        let mut pool = PartialPool::with_template_len(4);
        pool.fill([&b, &x, &y], &policy());
        assert!(pool.freqs.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(pool.source_len, 12);
        // 300 Hz appears in base (k=3) and x (k=2); 200/400 shared by base and y.
        let i300 = pool.freqs.iter().position(|&f| f == 300.0).unwrap();
        assert_eq!(pool.tone_mask[i300], 0b011);
        assert_eq!(pool.partial_index[i300], 1);
        assert!((pool.amps[i300] - (1.0 / 3.0 + 0.5)).abs() < 1e-15);
        assert!((pool.tone_amps[0][i300] - 1.0 / 3.0).abs() < 1e-15);
        assert!((pool.tone_amps[1][i300] - 0.5).abs() < 1e-15);
        let i400 = pool.freqs.iter().position(|&f| f == 400.0).unwrap();
        assert_eq!(pool.tone_mask[i400], 0b101);
        assert_eq!(pool.len() + pool.merged_count(), 12);
    }

    #[test]
    fn unison_collapses_to_one_tone_length() {
        let [b, x, y] = tones(1.0, 1.0);
        let mut pool = PartialPool::with_template_len(4);
        pool.fill([&b, &x, &y], &policy());
        assert_eq!(pool.len(), 4);
        assert!(pool.tone_mask.iter().all(|&m| m == 0b111));
        assert!((pool.amps[0] - 3.0).abs() < 1e-15);
    }

    #[test]
    fn disabled_merge_keeps_all_entries() {
        let [b, x, y] = tones(1.0, 1.0);
        let mut pool = PartialPool::with_template_len(4);
        let policy = MergePolicy { enabled: false, ..policy() };
        pool.fill([&b, &x, &y], &policy);
        assert_eq!(pool.len(), 12);
        assert!(pool.freqs.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn scratch_is_reused_without_growth() {
        let mut pool = PartialPool::with_template_len(4);
        let cap = pool.capacity();
        for x in [1.1, 1.3, 1.7] {
            let [b, tx, ty] = tones(x, 1.9);
            pool.fill([&b, &tx, &ty], &policy());
        }
        assert_eq!(pool.capacity(), cap);
    }

    #[test]
    fn hz_tolerance_merges_close_partials() {
        let p = MergePolicy { enabled: true, tolerance: 2.0, unit: MergeUnit::Hz };
        assert!(p.should_merge(440.0, 441.5));
        assert!(!p.should_merge(440.0, 443.0));
        let p = MergePolicy { enabled: true, tolerance: 0.01, unit: MergeUnit::Ratio };
        assert!(p.should_merge(100.0, 100.9));
        assert!(!p.should_merge(100.0, 101.5));
    }
}
