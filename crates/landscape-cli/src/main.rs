//! Offline driver: compute a roughness landscape from a JSON config, run the
//! terrain analysis battery and write a JSON report.
use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::Serialize;

use landscape_core::analysis::{analyze, AnalysisOptions, MinimaPoint, SymmetryReport};
use landscape_core::grid::{CellExplanation, GridDiagnostics, GridStats};
use landscape_core::worker::TileWorkerPool;
use landscape_core::{compute_grid, explain_cell, EngineConfig, FieldSource, GridData, GridHooks};

#[derive(Parser, Debug)]
#[command(name = "landscape", about = "Harmonic roughness landscape calculator")]
struct Args {
    /// EngineConfig JSON. Missing fields take their defaults.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Report destination; stdout when omitted.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Tile-worker threads. 0 computes in-process.
    #[arg(short, long, default_value_t = 0)]
    workers: usize,

    /// Tile edge length for worker and rayon computation.
    #[arg(long, default_value_t = 32)]
    tile_size: usize,

    /// Compute tiles on the rayon pool (needs the `threading` feature).
    #[arg(long)]
    parallel: bool,

    /// Contour levels between the field's min and max.
    #[arg(long, default_value_t = 8)]
    contours: usize,

    /// Neighbourhood radius for minima/maxima detection.
    #[arg(long, default_value_t = 1)]
    minima_radius: usize,

    /// Box-blur passes before extremum detection.
    #[arg(long, default_value_t = 0)]
    smooth: usize,

    /// Seed of the symmetry self-test sampler.
    #[arg(long, default_value_t = 1)]
    seed: u64,

    /// Symmetry self-test sample count.
    #[arg(long, default_value_t = 256)]
    symmetry_samples: usize,

    /// Analyse raw roughness instead of the normalised buffer.
    #[arg(long)]
    raw: bool,

    /// Also explain cell IX IY with its top pair contributions.
    #[arg(long, num_args = 2, value_names = ["IX", "IY"])]
    explain: Option<Vec<usize>>,

    /// Include the full grid buffers in the report.
    #[arg(long)]
    include_grid: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ContourSummary {
    level: f64,
    segments: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Timings {
    compute_ms: f64,
    analysis_ms: f64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Report {
    width: usize,
    height: usize,
    fingerprint: String,
    stats: GridStats,
    summary: GridDiagnostics,
    reference_roughness: Option<f64>,
    minima: Vec<MinimaPoint>,
    maxima: Vec<MinimaPoint>,
    contours: Vec<ContourSummary>,
    symmetry: SymmetryReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    explain: Option<CellExplanation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    grid: Option<GridData>,
    elapsed: Timings,
}

fn load_config(path: Option<&PathBuf>) -> Result<EngineConfig> {
    let Some(path) = path else {
        return Ok(EngineConfig::default());
    };
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let config: EngineConfig =
        serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
    Ok(config)
}

fn compute(args: &Args, config: &EngineConfig) -> Result<GridData> {
    if args.parallel {
        #[cfg(feature = "threading")]
        return Ok(landscape_core::compute_grid_parallel(config, args.tile_size)?);
        #[cfg(not(feature = "threading"))]
        bail!("--parallel needs a build with the `threading` feature");
    }
    if args.workers > 0 {
        let mut pool = TileWorkerPool::new(args.workers).context("starting tile workers")?;
        return Ok(pool.compute_grid(config, args.tile_size, 1)?);
    }
    let mut last_logged = 0usize;
    let mut progress = |done: usize, total: usize| {
        // Roughly every tenth of the grid.
        if total > 0 && (done - last_logged) * 10 >= total {
            log::info!("{done}/{total} cells");
            last_logged = done;
        }
    };
    Ok(compute_grid(config, GridHooks { on_progress: Some(&mut progress), should_cancel: None })?)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = load_config(args.config.as_ref())?;
    config.validate().context("invalid engine config")?;

    let t = Instant::now();
    let grid = compute(&args, &config)?;
    let compute_ms = t.elapsed().as_secs_f64() * 1e3;
    log::info!("computed {}x{} grid in {compute_ms:.1} ms", grid.width, grid.height);

    let mut opts = AnalysisOptions {
        source: if args.raw { FieldSource::Raw } else { FieldSource::Normalized },
        contour_count: args.contours,
        symmetry_seed: args.seed,
        symmetry_samples: args.symmetry_samples,
        ..AnalysisOptions::default()
    };
    opts.minima.radius = args.minima_radius;
    opts.minima.smooth_iterations = args.smooth;

    let t = Instant::now();
    let terrain = analyze(&grid, &opts);
    let analysis_ms = t.elapsed().as_secs_f64() * 1e3;
    if !terrain.symmetry.passed && terrain.symmetry.samples > 0 {
        log::warn!(
            "symmetry self-test failed: max error {:.3e} > {:.1e}",
            terrain.symmetry.max_error,
            terrain.symmetry.tolerance
        );
    }

    let explain = match args.explain.as_deref() {
        Some(&[ix, iy]) => {
            let e = explain_cell(&config, ix, iy, 8)?;
            if e.is_none() {
                bail!("cell ({ix}, {iy}) is outside the {}x{} grid", grid.width, grid.height);
            }
            e
        }
        _ => None,
    };

    let report = Report {
        width: grid.width,
        height: grid.height,
        fingerprint: format!("{:016x}", grid.fingerprint()),
        stats: grid.stats,
        summary: grid.summary,
        reference_roughness: grid.reference_roughness,
        minima: terrain.minima,
        maxima: terrain.maxima,
        contours: terrain
            .contours
            .iter()
            .map(|l| ContourSummary { level: l.level, segments: l.segments.len() })
            .collect(),
        symmetry: terrain.symmetry,
        explain,
        grid: args.include_grid.then_some(grid),
        elapsed: Timings { compute_ms, analysis_ms },
    };

    let json = serde_json::to_string_pretty(&report).context("serialising report")?;
    match &args.output {
        Some(path) => {
            fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
            log::info!("report written to {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}
