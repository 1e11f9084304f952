//! Harmonic roughness landscapes.
//!
//! For a base tone and two frequency-ratio axes, every grid cell holds the
//! summed pairwise roughness of the three-tone chord `{1, x, y}`. The
//! resulting terrain is then searched for minima, basins, contours and
//! rational labels.
pub mod analysis;
pub mod config;
pub mod constants;
pub mod error;
pub mod field;
pub mod grid;
pub mod roughness;
pub mod sampling;
pub mod spectrum;
pub mod worker;

pub use config::EngineConfig;
pub use constants::{RoughnessConstants, STANDARD_CONSTANTS};
pub use error::{Cancelled, ComputeError, ConfigError};
pub use field::ScalarField;
#[cfg(feature = "threading")]
pub use grid::compute_grid_parallel;
pub use grid::{compute_grid, compute_tile, explain_cell, FieldSource, GridData, GridHooks, TileRect, TileResult};
pub use roughness::{pair_roughness, pool_roughness};
pub use worker::{TileWorker, TileWorkerPool, WorkerRequest, WorkerResponse};
