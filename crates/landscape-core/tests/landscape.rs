//! End-to-end checks of the roughness landscape: grid symmetry, determinism,
//! normalisation, the tile-worker wire path and the analysis battery.
use approx::assert_relative_eq;

use landscape_core::analysis::{analyze, AnalysisOptions};
use landscape_core::config::{NormalizationMode, SamplingConfig, TimbreConfig, TimbrePreset, TriadEnergyMode};
use landscape_core::grid::{plan_tiles, stitch_tiles};
use landscape_core::spectrum::{
    build_spectrum_template, build_tone_spectrum, MergePolicy, PartialPool, TONE_BASE, TONE_X, TONE_Y,
};
use landscape_core::{
    compute_grid, pair_roughness, pool_roughness, EngineConfig, GridHooks, TileWorker, WorkerRequest,
    WorkerResponse, STANDARD_CONSTANTS,
};

fn saw_config(steps: usize, log_sampling: bool) -> EngineConfig {
    EngineConfig {
        base_freq: 220.0,
        timbre: TimbreConfig { preset: TimbrePreset::Harmonic, partial_count: 8, ..TimbreConfig::default() },
        sampling: SamplingConfig {
            x_range: [1.0, 2.0],
            y_range: [1.0, 2.0],
            x_steps: steps,
            y_steps: steps,
            log_sampling,
            ..SamplingConfig::default()
        },
        normalization_mode: NormalizationMode::Energy,
        triad_energy: TriadEnergyMode::Energy,
        ..EngineConfig::default()
    }
}

#[test]
fn landscape_is_symmetric_under_tone_swap() {
    let grid = compute_grid(&saw_config(24, true), GridHooks::default()).unwrap();
    assert_eq!((grid.width, grid.height), (24, 24));
    let mut max_diff: f64 = 0.0;
    for iy in 0..grid.height {
        for ix in 0..grid.width {
            let a = grid.normalized[grid.index(ix, iy)];
            let b = grid.normalized[grid.index(iy, ix)];
            max_diff = max_diff.max((a - b).abs());
        }
    }
    assert!(max_diff < 1e-3, "max asymmetry {max_diff}");
}

#[test]
fn repeated_computation_is_bit_identical() {
    let config = saw_config(16, false);
    let a = compute_grid(&config, GridHooks::default()).unwrap();
    let b = compute_grid(&config, GridHooks::default()).unwrap();
    assert_eq!(a.fingerprint(), b.fingerprint());
    assert!(a.raw.iter().zip(&b.raw).all(|(x, y)| x.to_bits() == y.to_bits()));
    assert!(a.normalized.iter().zip(&b.normalized).all(|(x, y)| x.to_bits() == y.to_bits()));
}

/// Fingerprint of the default engine on an 8×8 linear grid: 8-partial saw,
/// energy normalisation, no triad scaling. Any change to axis construction,
/// pool merging, pair ordering or the roughness curve moves it. Update the
/// constant only when such a change is intended.
const GOLDEN_8X8_FINGERPRINT: u64 = 0x4130_27e8_0063_fc11;

#[test]
fn default_8x8_grid_matches_golden_fingerprint() {
    let config = EngineConfig {
        sampling: SamplingConfig { x_steps: 8, y_steps: 8, ..SamplingConfig::default() },
        ..EngineConfig::default()
    };
    let grid = compute_grid(&config, GridHooks::default()).unwrap();
    assert_eq!((grid.width, grid.height), (8, 8));

    // Spot values first, so a drift shows its size before the hash check.
    assert_relative_eq!(grid.raw[0], 0.021041846052422666, max_relative = 1e-12);
    assert_relative_eq!(grid.raw[1], 0.4706596764893695, max_relative = 1e-12);
    assert_relative_eq!(grid.raw[2], 0.2872375271271896, max_relative = 1e-12);
    assert_relative_eq!(grid.normalized[grid.index(1, 1)], 0.10228379070232754, max_relative = 1e-12);

    assert_eq!(grid.fingerprint(), GOLDEN_8X8_FINGERPRINT, "fingerprint {:016x}", grid.fingerprint());
}

#[test]
fn reference_mode_makes_unison_one() {
    let config = EngineConfig {
        normalization_mode: NormalizationMode::Reference,
        ..saw_config(11, false)
    };
    let grid = compute_grid(&config, GridHooks::default()).unwrap();
    assert_eq!(grid.xs[0], 1.0);
    assert_eq!(grid.ys[0], 1.0);
    assert!(grid.reference_roughness.is_some_and(|r| r > 0.0));
    assert_relative_eq!(grid.normalized[grid.index(0, 0)], 1.0, max_relative = 1e-9);
}

#[test]
fn pool_sum_equals_direct_pairwise_sum_without_merging() {
    let config = saw_config(4, false);
    let template = build_spectrum_template(&config.timbre, config.base_freq);
    let scale = config.triad_energy.amp_scale();
    let (x, y) = (1.25, 1.5);
    let tones = [
        build_tone_spectrum(config.base_freq, &template, TONE_BASE, scale),
        build_tone_spectrum(config.base_freq * x, &template, TONE_X, scale),
        build_tone_spectrum(config.base_freq * y, &template, TONE_Y, scale),
    ];

    let mut opts = config.roughness.clone();
    opts.merge_duplicate_partials = false;
    opts.amp_threshold = 0.0;
    let mut pool = PartialPool::with_template_len(template.len());
    pool.fill([&tones[0], &tones[1], &tones[2]], &MergePolicy::from_options(&opts));
    assert_eq!(pool.len(), 3 * template.len());

    let (total, diag) = pool_roughness(&pool, &STANDARD_CONSTANTS, &opts, None);

    let partials: Vec<(f64, f64)> = tones
        .iter()
        .flat_map(|t| t.freqs.iter().copied().zip(t.amps.iter().copied()))
        .collect();
    let mut direct = 0.0;
    for i in 0..partials.len() {
        for j in (i + 1)..partials.len() {
            let (f1, a1) = partials[i];
            let (f2, a2) = partials[j];
            direct += pair_roughness(f1, f2, a1, a2, &STANDARD_CONSTANTS);
        }
    }
    let n = partials.len() as u32;
    assert_eq!(diag.total_pairs, n * (n - 1) / 2);
    assert_eq!(diag.skipped_pairs, 0);
    assert_relative_eq!(total, direct, max_relative = 1e-12);
}

#[test]
fn worker_wire_round_trip_reassembles_the_grid() {
    let config = saw_config(20, true);
    let direct = compute_grid(&config, GridHooks::default()).unwrap();

    let worker = TileWorker::new();
    let mut tiles = Vec::new();
    for (tile_id, tile) in plan_tiles(direct.width, direct.height, 7, 6).into_iter().enumerate() {
        let request = WorkerRequest::Tile { request_id: 1, tile_id: tile_id as u64, config: Box::new(config.clone()), tile };
        let wire = serde_json::to_string(&request).unwrap();
        let response = worker.handle(serde_json::from_str(&wire).unwrap()).unwrap();
        let wire = serde_json::to_string(&response).unwrap();
        let response: WorkerResponse = serde_json::from_str(&wire).unwrap();
        let (id, result) = response.into_tile_result().unwrap();
        assert_eq!(id, tile_id as u64);
        tiles.push(result);
    }
    // Arrival order must not matter.
    tiles.reverse();
    let stitched = stitch_tiles(&config, tiles).unwrap();
    assert_eq!(stitched.fingerprint(), direct.fingerprint());
    assert_eq!(stitched.summary, direct.summary);
}

#[test]
fn analysis_labels_consonant_minima() {
    // Refinement puts the exact just ratios (3/2 among them) on both axes.
    let mut config = saw_config(32, true);
    config.sampling.refine_fixed = true;
    let grid = compute_grid(&config, GridHooks::default()).unwrap();
    assert!(grid.xs.contains(&1.5));
    let report = analyze(&grid, &AnalysisOptions::default());
    assert!(!report.minima.is_empty());
    for m in &report.minima {
        let rx = m.rational_x.as_ref().unwrap();
        assert!(rx.den >= 1 && rx.den <= 16);
        assert!(m.basin_area.unwrap() > 0.0);
    }
    // The doubled fifth (3/2, 3/2) is a valley.
    assert!(
        report
            .minima
            .iter()
            .any(|m| m.rational_x.as_ref().is_some_and(|r| (r.num, r.den) == (3, 2))
                || m.rational_y.as_ref().is_some_and(|r| (r.num, r.den) == (3, 2))),
        "{:?}",
        report.minima.iter().map(|m| (m.x, m.y)).collect::<Vec<_>>()
    );
    assert!(report.symmetry.passed, "{:?}", report.symmetry);
}

#[cfg(not(debug_assertions))]
#[test]
fn grid_64_timing() {
    let config = saw_config(64, true);
    let t = std::time::Instant::now();
    let grid = compute_grid(&config, GridHooks::default()).unwrap();
    let ms = t.elapsed().as_millis();
    assert_eq!(grid.raw.len(), 64 * 64);
    assert!(ms < 2000, "64×64 grid took {ms} ms");
}
