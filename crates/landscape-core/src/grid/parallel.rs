//! Rayon tile parallelism. Each task computes one tile with its own scratch
//! pool; results are stitched by position.
use rayon::prelude::*;

use super::compute::compute_tile;
use super::tile::{plan_tiles, stitch_tiles, TileResult};
use super::GridData;
use crate::config::EngineConfig;
use crate::error::ComputeError;
use crate::sampling::resolve_axes;

/// Same cells as [`super::compute_grid`], computed as `tile_size × tile_size`
/// tiles on the rayon pool.
pub fn compute_grid_parallel(config: &EngineConfig, tile_size: usize) -> Result<GridData, ComputeError> {
    config.validate()?;
    let (x_axis, y_axis) = resolve_axes(config)?;
    let tiles = plan_tiles(x_axis.len(), y_axis.len(), tile_size, tile_size);
    log::debug!("computing {} tiles on {} rayon threads", tiles.len(), rayon::current_num_threads());

    let results: Vec<TileResult> = tiles
        .par_iter()
        .map(|&rect| compute_tile(config, rect, None))
        .collect::<Result<_, _>>()?;
    stitch_tiles(config, results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SamplingConfig;
    use crate::grid::{compute_grid, GridHooks};

    #[test]
    fn parallel_grid_is_bit_identical() {
        let config = EngineConfig {
            sampling: SamplingConfig { x_steps: 17, y_steps: 13, log_sampling: true, ..SamplingConfig::default() },
            ..EngineConfig::default()
        };
        let serial = compute_grid(&config, GridHooks::default()).unwrap();
        let parallel = compute_grid_parallel(&config, 5).unwrap();
        assert_eq!(parallel.fingerprint(), serial.fingerprint());
        assert_eq!(parallel.summary, serial.summary);
    }
}
