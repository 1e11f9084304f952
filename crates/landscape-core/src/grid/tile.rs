//! Tile rectangles, tile planning and reassembly of tile results.
use serde::{Deserialize, Serialize};

use super::evaluator::reference_roughness;
use super::{CellDiagnostics, GridData, GridDiagnostics};
use crate::config::EngineConfig;
use crate::error::ComputeError;
use crate::sampling::resolve_axes;
use crate::spectrum::build_spectrum_template;

/// Rectangle of grid cells, in column/row indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TileRect {
    pub x_start: usize,
    pub y_start: usize,
    pub width: usize,
    pub height: usize,
}

impl TileRect {
    /// Clamp to a `grid_width × grid_height` grid. May come back empty.
    pub fn clamped(self, grid_width: usize, grid_height: usize) -> Self {
        let x_start = self.x_start.min(grid_width);
        let y_start = self.y_start.min(grid_height);
        Self {
            x_start,
            y_start,
            width: self.width.min(grid_width - x_start),
            height: self.height.min(grid_height - y_start),
        }
    }

    pub fn area(&self) -> usize {
        self.width * self.height
    }
}

/// Cells of one tile, row-major within the tile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TileResult {
    /// Resolved (clamped) rectangle.
    pub tile: TileRect,
    pub raw: Vec<f64>,
    pub normalized: Vec<f64>,
    pub diagnostics: CellDiagnostics,
    pub summary: GridDiagnostics,
}

/// Cover a `width × height` grid with tiles of at most `tile_w × tile_h`,
/// row-major. Every cell belongs to exactly one tile.
pub fn plan_tiles(width: usize, height: usize, tile_w: usize, tile_h: usize) -> Vec<TileRect> {
    let (tw, th) = (tile_w.max(1), tile_h.max(1));
    let mut tiles = Vec::new();
    let mut y = 0;
    while y < height {
        let mut x = 0;
        while x < width {
            tiles.push(TileRect { x_start: x, y_start: y, width: tw.min(width - x), height: th.min(height - y) });
            x += tw;
        }
        y += th;
    }
    tiles
}

/// Place tile results into a full grid. Arrival order does not matter;
/// overlapping tiles overwrite earlier ones. Fails if any cell is missing.
pub fn stitch_tiles(config: &EngineConfig, tiles: Vec<TileResult>) -> Result<GridData, ComputeError> {
    config.validate()?;
    let (x_axis, y_axis) = resolve_axes(config)?;
    let (width, height) = (x_axis.len(), y_axis.len());
    let total = width * height;

    let mut raw = vec![f64::NAN; total];
    let mut normalized = vec![f64::NAN; total];
    let mut diagnostics = CellDiagnostics::with_len(total);
    let mut covered = vec![false; total];

    for t in &tiles {
        let rect = t.tile.clamped(width, height);
        let area = rect.area();
        if rect != t.tile
            || t.raw.len() != area
            || t.normalized.len() != area
            || !t.diagnostics.has_len(area)
        {
            return Err(ComputeError::Worker(format!("tile {:?} does not fit a {width}x{height} grid", t.tile)));
        }
        for ly in 0..rect.height {
            for lx in 0..rect.width {
                let src = ly * rect.width + lx;
                let dst = (rect.y_start + ly) * width + rect.x_start + lx;
                raw[dst] = t.raw[src];
                normalized[dst] = t.normalized[src];
                diagnostics.copy_cell(dst, &t.diagnostics, src);
                covered[dst] = true;
            }
        }
    }

    let missing = covered.iter().filter(|c| !**c).count();
    if missing > 0 {
        return Err(ComputeError::Worker(format!("incomplete tile coverage: {missing} of {total} cells missing")));
    }

    let template = build_spectrum_template(&config.timbre, config.base_freq);
    let reference = reference_roughness(config, &template);
    Ok(GridData::assemble(config, x_axis, y_axis, raw, normalized, diagnostics, reference))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SamplingConfig;
    use crate::grid::{compute_grid, compute_tile, GridHooks};

    #[test]
    fn clamp_handles_out_of_range_origin() {
        let r = TileRect { x_start: 12, y_start: 3, width: 5, height: 5 }.clamped(10, 6);
        assert_eq!(r, TileRect { x_start: 10, y_start: 3, width: 0, height: 3 });
        assert_eq!(r.area(), 0);
    }

    #[test]
    fn plan_covers_every_cell_once() {
        let tiles = plan_tiles(10, 7, 4, 3);
        assert_eq!(tiles.len(), 3 * 3);
        let mut hits = vec![0u8; 70];
        for t in &tiles {
            for y in t.y_start..t.y_start + t.height {
                for x in t.x_start..t.x_start + t.width {
                    hits[y * 10 + x] += 1;
                }
            }
        }
        assert!(hits.iter().all(|&h| h == 1));
        assert!(plan_tiles(0, 5, 4, 4).is_empty());
    }

    #[test]
    fn stitched_tiles_equal_full_grid() {
        let config = EngineConfig {
            sampling: SamplingConfig { x_steps: 11, y_steps: 9, log_sampling: true, ..SamplingConfig::default() },
            ..EngineConfig::default()
        };
        let full = compute_grid(&config, GridHooks::default()).unwrap();
        let mut tiles: Vec<TileResult> = plan_tiles(11, 9, 4, 4)
            .into_iter()
            .map(|r| compute_tile(&config, r, None).unwrap())
            .collect();
        tiles.reverse();
        let stitched = stitch_tiles(&config, tiles).unwrap();
        assert_eq!(stitched.fingerprint(), full.fingerprint());
        assert_eq!(stitched.diagnostics, full.diagnostics);
        assert_eq!(stitched.summary, full.summary);
    }

    #[test]
    fn missing_tile_is_an_error() {
        let config = EngineConfig {
            sampling: SamplingConfig { x_steps: 6, y_steps: 6, ..SamplingConfig::default() },
            ..EngineConfig::default()
        };
        let mut tiles: Vec<TileResult> = plan_tiles(6, 6, 3, 3)
            .into_iter()
            .map(|r| compute_tile(&config, r, None).unwrap())
            .collect();
        tiles.pop();
        let err = stitch_tiles(&config, tiles).unwrap_err();
        assert!(matches!(err, ComputeError::Worker(ref m) if m.contains("9 of 36")));
    }

    #[test]
    fn short_diagnostic_buffers_are_rejected() {
        let config = EngineConfig {
            sampling: SamplingConfig { x_steps: 6, y_steps: 4, ..SamplingConfig::default() },
            ..EngineConfig::default()
        };
        let tiles = || -> Vec<TileResult> {
            plan_tiles(6, 4, 3, 2)
                .into_iter()
                .map(|r| compute_tile(&config, r, None).unwrap())
                .collect()
        };

        let mut short_max = tiles();
        short_max[0].diagnostics.max_pair.clear();
        let err = stitch_tiles(&config, short_max).unwrap_err();
        assert!(matches!(err, ComputeError::Worker(ref m) if m.contains("does not fit")));

        let mut short_total = tiles();
        short_total[2].diagnostics.total.pop();
        assert!(matches!(stitch_tiles(&config, short_total), Err(ComputeError::Worker(_))));

        assert!(stitch_tiles(&config, tiles()).is_ok());
    }
}
