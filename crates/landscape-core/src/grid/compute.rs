use serde::{Deserialize, Serialize};

use super::evaluator::{reference_roughness, CellEvaluator, PreparedSpectra};
use super::tile::{TileRect, TileResult};
use super::{
    CellDiagnostics, GridData, GRID_CANCEL_INTERVAL, GRID_PROGRESS_INTERVAL, TILE_CANCEL_INTERVAL,
};
use crate::config::EngineConfig;
use crate::error::{Cancelled, ComputeError};
use crate::roughness::{PairContribution, PoolDiagnostics, TopPairs};
use crate::sampling::resolve_axes;
use crate::spectrum::build_spectrum_template;

/// Optional progress and cancellation callbacks for [`compute_grid`].
#[derive(Default)]
pub struct GridHooks<'a> {
    /// Called with `(cells_done, cells_total)`.
    pub on_progress: Option<&'a mut dyn FnMut(usize, usize)>,
    pub should_cancel: Option<&'a dyn Fn() -> bool>,
}

impl GridHooks<'_> {
    fn cancelled(&self) -> bool {
        self.should_cancel.is_some_and(|f| f())
    }

    fn progress(&mut self, done: usize, total: usize) {
        if let Some(f) = self.on_progress.as_deref_mut() {
            f(done, total);
        }
    }
}

/// Compute the full roughness grid for `config`.
///
/// Pure in `(config, axes)`: repeated calls return bit-identical buffers.
/// Either returns a complete grid or fails/cancels; partial grids are never
/// returned.
pub fn compute_grid(config: &EngineConfig, mut hooks: GridHooks<'_>) -> Result<GridData, ComputeError> {
    config.validate()?;
    let (x_axis, y_axis) = resolve_axes(config)?;
    let template = build_spectrum_template(&config.timbre, config.base_freq);
    let prepared = PreparedSpectra::new(config, &template, &x_axis.values, &y_axis.values);
    let reference = reference_roughness(config, &template);

    let (width, height) = (x_axis.len(), y_axis.len());
    let total = width * height;
    log::debug!(
        "computing {width}x{height} roughness grid ({} partials/tone, {:?} normalisation)",
        template.len(),
        config.normalization_mode
    );

    let mut raw = vec![0.0; total];
    let mut normalized = vec![0.0; total];
    let mut diagnostics = CellDiagnostics::with_len(total);
    let mut eval = CellEvaluator::new(&prepared, config).with_reference(reference);

    for iy in 0..height {
        for ix in 0..width {
            let idx = iy * width + ix;
            if idx % GRID_CANCEL_INTERVAL == 0 && hooks.cancelled() {
                log::debug!("grid computation cancelled at cell {idx}/{total}");
                return Err(Cancelled.into());
            }
            if idx % GRID_PROGRESS_INTERVAL == 0 {
                hooks.progress(idx, total);
            }
            let s = eval.evaluate(ix, iy, None);
            raw[idx] = s.raw;
            normalized[idx] = s.normalized;
            diagnostics.record(idx, &s);
        }
    }
    hooks.progress(total, total);

    let grid = GridData::assemble(config, x_axis, y_axis, raw, normalized, diagnostics, reference);
    if grid.summary.non_finite_cells > 0 {
        log::warn!("{} grid cells are non-finite", grid.summary.non_finite_cells);
    }
    log::debug!(
        "grid done: {} pairs ({} skipped), normalised range [{:.4e}, {:.4e}]",
        grid.summary.total_pairs,
        grid.summary.skipped_pairs,
        grid.stats.min,
        grid.stats.max
    );
    Ok(grid)
}

/// Compute the cells of `tile` (clamped to the grid) with the same per-cell
/// logic as [`compute_grid`].
pub fn compute_tile(
    config: &EngineConfig,
    tile: TileRect,
    should_cancel: Option<&dyn Fn() -> bool>,
) -> Result<TileResult, ComputeError> {
    config.validate()?;
    let (x_axis, y_axis) = resolve_axes(config)?;
    let rect = tile.clamped(x_axis.len(), y_axis.len());
    let template = build_spectrum_template(&config.timbre, config.base_freq);
    let xs = &x_axis.values[rect.x_start..rect.x_start + rect.width];
    let ys = &y_axis.values[rect.y_start..rect.y_start + rect.height];
    let prepared = PreparedSpectra::new(config, &template, xs, ys);
    let reference = reference_roughness(config, &template);

    let total = rect.width * rect.height;
    let mut raw = vec![0.0; total];
    let mut normalized = vec![0.0; total];
    let mut diagnostics = CellDiagnostics::with_len(total);
    let mut eval = CellEvaluator::new(&prepared, config).with_reference(reference);

    for ly in 0..rect.height {
        for lx in 0..rect.width {
            let idx = ly * rect.width + lx;
            if idx % TILE_CANCEL_INTERVAL == 0 && should_cancel.is_some_and(|f| f()) {
                log::debug!("tile {rect:?} cancelled at cell {idx}/{total}");
                return Err(Cancelled.into());
            }
            let s = eval.evaluate(lx, ly, None);
            raw[idx] = s.raw;
            normalized[idx] = s.normalized;
            diagnostics.record(idx, &s);
        }
    }

    let summary = diagnostics.summarize(&raw);
    Ok(TileResult { tile: rect, raw, normalized, diagnostics, summary })
}

/// Breakdown of a single cell, with its `k` largest pair contributions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellExplanation {
    pub ix: usize,
    pub iy: usize,
    pub x: f64,
    pub y: f64,
    pub raw: f64,
    pub normalized: f64,
    pub pool_size: usize,
    pub diagnostics: PoolDiagnostics,
    pub top_pairs: Vec<PairContribution>,
}

/// Re-evaluate cell `(ix, iy)` and report why it is rough. `None` when the
/// indices fall outside the grid.
pub fn explain_cell(
    config: &EngineConfig,
    ix: usize,
    iy: usize,
    k: usize,
) -> Result<Option<CellExplanation>, ComputeError> {
    config.validate()?;
    let (x_axis, y_axis) = resolve_axes(config)?;
    if ix >= x_axis.len() || iy >= y_axis.len() {
        return Ok(None);
    }
    let (x, y) = (x_axis.values[ix], y_axis.values[iy]);
    let template = build_spectrum_template(&config.timbre, config.base_freq);
    let prepared = PreparedSpectra::new(config, &template, &[x], &[y]);
    let reference = reference_roughness(config, &template);
    let mut top = TopPairs::new(k);
    let s = CellEvaluator::new(&prepared, config)
        .with_reference(reference)
        .evaluate(0, 0, Some(&mut top));
    Ok(Some(CellExplanation {
        ix,
        iy,
        x,
        y,
        raw: s.raw,
        normalized: s.normalized,
        pool_size: s.source_len - s.merged,
        diagnostics: s.pool,
        top_pairs: top.into_pairs(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{NormalizationMode, SamplingConfig};
    use crate::constants::RoughnessConstants;
    use crate::error::ConfigError;
    use std::cell::Cell;

    fn small_config() -> EngineConfig {
        EngineConfig {
            sampling: SamplingConfig { x_steps: 9, y_steps: 7, ..SamplingConfig::default() },
            ..EngineConfig::default()
        }
    }

    #[test]
    fn invalid_constants_fail_before_work() {
        let config = EngineConfig {
            constants: RoughnessConstants { b: 1.0, ..RoughnessConstants::default() },
            ..small_config()
        };
        let mut calls = 0;
        let mut progress = |_: usize, _: usize| calls += 1;
        let err = compute_grid(&config, GridHooks { on_progress: Some(&mut progress), should_cancel: None })
            .unwrap_err();
        assert!(matches!(err, ComputeError::Config(ConfigError::RateOrder { .. })));
        assert_eq!(calls, 0);
    }

    #[test]
    fn grid_has_expected_shape_and_diagnostics() {
        let g = compute_grid(&small_config(), GridHooks::default()).unwrap();
        assert_eq!((g.width, g.height), (9, 7));
        assert_eq!(g.raw.len(), 63);
        assert_eq!(g.normalized.len(), 63);
        assert_eq!(g.cell_area.len(), 63);
        assert_eq!(g.diagnostics.len(), 63);
        assert!(g.raw.iter().all(|v| v.is_finite() && *v >= 0.0));
        assert_eq!(g.diagnostics.original[0], 24);
        assert!(g.summary.total_pairs > 0);
        assert!(g.stats.raw_min <= g.stats.raw_max);
    }

    #[test]
    fn progress_reports_every_128_cells_and_completion() {
        let config = EngineConfig {
            sampling: SamplingConfig { x_steps: 20, y_steps: 20, ..SamplingConfig::default() },
            ..EngineConfig::default()
        };
        let mut seen = Vec::new();
        let mut progress = |done: usize, total: usize| seen.push((done, total));
        compute_grid(&config, GridHooks { on_progress: Some(&mut progress), should_cancel: None }).unwrap();
        assert_eq!(seen, vec![(0, 400), (128, 400), (256, 400), (384, 400), (400, 400)]);
    }

    #[test]
    fn cancellation_yields_no_result() {
        let config = EngineConfig {
            sampling: SamplingConfig { x_steps: 32, y_steps: 32, ..SamplingConfig::default() },
            ..EngineConfig::default()
        };
        let polls = Cell::new(0usize);
        let cancel = || {
            polls.set(polls.get() + 1);
            polls.get() > 2
        };
        let err = compute_grid(&config, GridHooks { on_progress: None, should_cancel: Some(&cancel) })
            .unwrap_err();
        assert!(err.is_cancelled());
        // Polled at cells 0, 256 and 512.
        assert_eq!(polls.get(), 3);
    }

    #[test]
    fn tile_matches_grid_cells() {
        let config = small_config();
        let g = compute_grid(&config, GridHooks::default()).unwrap();
        let t = compute_tile(&config, TileRect { x_start: 3, y_start: 2, width: 4, height: 3 }, None).unwrap();
        for ly in 0..3 {
            for lx in 0..4 {
                let gi = g.index(3 + lx, 2 + ly);
                assert_eq!(t.raw[ly * 4 + lx].to_bits(), g.raw[gi].to_bits());
                assert_eq!(t.normalized[ly * 4 + lx].to_bits(), g.normalized[gi].to_bits());
            }
        }
    }

    #[test]
    fn tile_is_clamped_to_grid() {
        let t = compute_tile(
            &small_config(),
            TileRect { x_start: 6, y_start: 5, width: 10, height: 10 },
            None,
        )
        .unwrap();
        assert_eq!(t.tile, TileRect { x_start: 6, y_start: 5, width: 3, height: 2 });
        assert_eq!(t.raw.len(), 6);
    }

    #[test]
    fn tile_cancellation() {
        let cancel = || true;
        let err = compute_tile(
            &small_config(),
            TileRect { x_start: 0, y_start: 0, width: 4, height: 4 },
            Some(&cancel),
        )
        .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[test]
    fn reference_cell_is_one() {
        let config = EngineConfig {
            normalization_mode: NormalizationMode::Reference,
            ..small_config()
        };
        let g = compute_grid(&config, GridHooks::default()).unwrap();
        assert_eq!(g.xs[0], 1.0);
        assert_eq!(g.ys[0], 1.0);
        assert!((g.normalized[g.index(0, 0)] - 1.0).abs() < 1e-12);
        assert!(g.reference_roughness.is_some());
    }

    #[test]
    fn explain_reports_top_pairs() {
        let config = small_config();
        let e = explain_cell(&config, 1, 1, 4).unwrap().unwrap();
        assert_eq!(e.top_pairs.len(), 4);
        assert!(e.top_pairs[0].value >= e.top_pairs[3].value);
        let g = compute_grid(&config, GridHooks::default()).unwrap();
        assert_eq!(e.raw.to_bits(), g.raw[g.index(1, 1)].to_bits());
        assert!(explain_cell(&config, 99, 0, 4).unwrap().is_none());
    }
}
