//! Grid engine: roughness over every (x, y) cell of the sampling grid.
//!
//! Data flow per cell:
//!   {base, x[i], y[j]} tone spectra → partial pool → pool roughness → normalisation.
//!
//! Whole grids come from [`compute_grid`]; sub-rectangles from [`compute_tile`]
//! (used by the tile-worker protocol) and are reassembled with [`stitch_tiles`].
mod compute;
mod evaluator;
#[cfg(feature = "threading")]
mod parallel;
mod tile;

pub use compute::{compute_grid, compute_tile, explain_cell, CellExplanation, GridHooks};
pub use evaluator::{CellEvaluator, CellSample, PreparedSpectra};
#[cfg(feature = "threading")]
pub use parallel::compute_grid_parallel;
pub use tile::{plan_tiles, stitch_tiles, TileRect, TileResult};

use serde::{Deserialize, Serialize};

use crate::config::{EngineConfig, NormalizationMode};
use crate::field::{cell_areas, cell_sizes, ScalarField};
use crate::sampling::Axis;

/// Cells between cancellation polls in [`compute_grid`].
pub const GRID_CANCEL_INTERVAL: usize = 256;
/// Cells between progress callbacks in [`compute_grid`].
pub const GRID_PROGRESS_INTERVAL: usize = 128;
/// Cells between cancellation polls in [`compute_tile`].
pub const TILE_CANCEL_INTERVAL: usize = 512;

/// Per-cell diagnostic buffers, row-major like the value buffers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellDiagnostics {
    /// Partials entering the pool merge.
    pub original: Vec<u32>,
    /// Partials removed by merging.
    pub pruned: Vec<u32>,
    /// Non-finite pair terms discarded.
    pub invalid: Vec<u32>,
    /// Pairs below the amplitude floor.
    pub skipped: Vec<u32>,
    /// Pairs considered.
    pub total: Vec<u32>,
    pub max_pair: Vec<f64>,
}

impl CellDiagnostics {
    pub fn with_len(n: usize) -> Self {
        Self {
            original: vec![0; n],
            pruned: vec![0; n],
            invalid: vec![0; n],
            skipped: vec![0; n],
            total: vec![0; n],
            max_pair: vec![0.0; n],
        }
    }

    pub fn len(&self) -> usize {
        self.original.len()
    }

    pub fn is_empty(&self) -> bool {
        self.original.is_empty()
    }

    /// Whether every buffer holds exactly `n` cells.
    pub fn has_len(&self, n: usize) -> bool {
        [
            self.original.len(),
            self.pruned.len(),
            self.invalid.len(),
            self.skipped.len(),
            self.total.len(),
            self.max_pair.len(),
        ]
        .iter()
        .all(|&l| l == n)
    }

    pub fn record(&mut self, idx: usize, s: &CellSample) {
        self.original[idx] = s.source_len as u32;
        self.pruned[idx] = s.merged as u32;
        self.invalid[idx] = s.pool.invalid_pairs;
        self.skipped[idx] = s.pool.skipped_pairs;
        self.total[idx] = s.pool.total_pairs;
        self.max_pair[idx] = s.pool.max_pair;
    }

    /// Copy cell `src_idx` of `src` into cell `dst_idx` of `self`.
    pub fn copy_cell(&mut self, dst_idx: usize, src: &CellDiagnostics, src_idx: usize) {
        self.original[dst_idx] = src.original[src_idx];
        self.pruned[dst_idx] = src.pruned[src_idx];
        self.invalid[dst_idx] = src.invalid[src_idx];
        self.skipped[dst_idx] = src.skipped[src_idx];
        self.total[dst_idx] = src.total[src_idx];
        self.max_pair[dst_idx] = src.max_pair[src_idx];
    }

    pub fn summarize(&self, raw: &[f64]) -> GridDiagnostics {
        let mut s = GridDiagnostics { cells: self.len() as u64, ..Default::default() };
        for i in 0..self.len() {
            s.total_pairs += self.total[i] as u64;
            s.skipped_pairs += self.skipped[i] as u64;
            s.invalid_pairs += self.invalid[i] as u64;
            s.merged_partials += self.pruned[i] as u64;
            s.max_pair = s.max_pair.max(self.max_pair[i]);
        }
        s.non_finite_cells = raw.iter().filter(|v| !v.is_finite()).count() as u64;
        s
    }
}

/// Aggregate of [`CellDiagnostics`] over a grid or tile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridDiagnostics {
    pub cells: u64,
    pub total_pairs: u64,
    pub skipped_pairs: u64,
    pub invalid_pairs: u64,
    pub merged_partials: u64,
    pub max_pair: f64,
    pub non_finite_cells: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridStats {
    pub raw_min: f64,
    pub raw_max: f64,
    pub min: f64,
    pub max: f64,
}

impl GridStats {
    pub fn from_buffers(raw: &[f64], normalized: &[f64]) -> Self {
        let (raw_min, raw_max) = finite_range(raw);
        let (min, max) = finite_range(normalized);
        Self { raw_min, raw_max, min, max }
    }
}

fn finite_range(values: &[f64]) -> (f64, f64) {
    values
        .iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)))
}

/// Which buffer of a [`GridData`] to analyse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FieldSource {
    Raw,
    Normalized,
}

/// Result of one grid computation. Immutable once produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridData {
    pub width: usize,
    pub height: usize,
    pub xs: Vec<f64>,
    pub ys: Vec<f64>,
    pub log_x: Vec<f64>,
    pub log_y: Vec<f64>,
    /// Whether distances/derivatives use `log_x`/`log_y` instead of `xs`/`ys`.
    pub log_metric: bool,
    /// Row-major, `width · height`.
    pub raw: Vec<f64>,
    pub normalized: Vec<f64>,
    pub cell_width: Vec<f64>,
    pub cell_height: Vec<f64>,
    pub cell_area: Vec<f64>,
    pub diagnostics: CellDiagnostics,
    pub summary: GridDiagnostics,
    pub stats: GridStats,
    pub normalization_mode: NormalizationMode,
    pub reference_roughness: Option<f64>,
}

impl GridData {
    pub(crate) fn assemble(
        config: &EngineConfig,
        x_axis: Axis,
        y_axis: Axis,
        raw: Vec<f64>,
        normalized: Vec<f64>,
        diagnostics: CellDiagnostics,
        reference_roughness: Option<f64>,
    ) -> Self {
        let log_metric = config.sampling.log_sampling;
        let (mx, my) = if log_metric {
            (&x_axis.log2, &y_axis.log2)
        } else {
            (&x_axis.values, &y_axis.values)
        };
        let cell_width = cell_sizes(mx);
        let cell_height = cell_sizes(my);
        let cell_area = cell_areas(&cell_width, &cell_height);
        let summary = diagnostics.summarize(&raw);
        let stats = GridStats::from_buffers(&raw, &normalized);
        Self {
            width: x_axis.len(),
            height: y_axis.len(),
            xs: x_axis.values,
            ys: y_axis.values,
            log_x: x_axis.log2,
            log_y: y_axis.log2,
            log_metric,
            raw,
            normalized,
            cell_width,
            cell_height,
            cell_area,
            diagnostics,
            summary,
            stats,
            normalization_mode: config.normalization_mode,
            reference_roughness,
        }
    }

    #[inline]
    pub fn index(&self, ix: usize, iy: usize) -> usize {
        iy * self.width + ix
    }

    pub fn metric_x(&self) -> &[f64] {
        if self.log_metric { &self.log_x } else { &self.xs }
    }

    pub fn metric_y(&self) -> &[f64] {
        if self.log_metric { &self.log_y } else { &self.ys }
    }

    pub fn total_area(&self) -> f64 {
        self.cell_area.iter().sum()
    }

    /// Copy one buffer out as an analysable field.
    pub fn field(&self, source: FieldSource) -> ScalarField {
        let data = match source {
            FieldSource::Raw => self.raw.clone(),
            FieldSource::Normalized => self.normalized.clone(),
        };
        ScalarField::new(
            data,
            self.xs.clone(),
            self.ys.clone(),
            self.metric_x().to_vec(),
            self.metric_y().to_vec(),
        )
    }

    /// FNV-1a over the bit patterns of `raw` then `normalized`.
    pub fn fingerprint(&self) -> u64 {
        const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
        const PRIME: u64 = 0x0000_0100_0000_01b3;
        let mut h = OFFSET;
        for v in self.raw.iter().chain(self.normalized.iter()) {
            for b in v.to_bits().to_le_bytes() {
                h ^= b as u64;
                h = h.wrapping_mul(PRIME);
            }
        }
        h
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finite_range_ignores_nan() {
        let (lo, hi) = finite_range(&[f64::NAN, 2.0, -1.0, f64::INFINITY]);
        assert_eq!((lo, hi), (-1.0, 2.0));
    }

    #[test]
    fn summary_aggregates_cells() {
        let mut d = CellDiagnostics::with_len(2);
        d.total[0] = 10;
        d.total[1] = 5;
        d.skipped[1] = 2;
        d.pruned[0] = 3;
        d.max_pair = vec![0.2, 0.7];
        let s = d.summarize(&[1.0, f64::NAN]);
        assert_eq!(s.cells, 2);
        assert_eq!(s.total_pairs, 15);
        assert_eq!(s.skipped_pairs, 2);
        assert_eq!(s.merged_partials, 3);
        assert_eq!(s.max_pair, 0.7);
        assert_eq!(s.non_finite_cells, 1);
    }

    #[test]
    fn has_len_checks_every_buffer() {
        let mut d = CellDiagnostics::with_len(3);
        assert!(d.has_len(3));
        assert!(!d.has_len(2));
        d.skipped.pop();
        assert!(!d.has_len(3));
    }
}
