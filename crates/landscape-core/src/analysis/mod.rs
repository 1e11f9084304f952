//! Terrain analysis of a computed roughness grid.
//!
//! Everything here reads a [`ScalarField`] (see [`GridData::field`]) and
//! never mutates grid buffers. [`analyze`] runs the usual battery in one go.
pub mod basins;
pub mod contours;
pub mod extrema;
pub mod geometry;
pub mod grid_walk;
pub mod rational;
pub mod smooth;
pub mod symmetry;

pub use basins::{estimate_basins, estimate_basins_with, Basin, BasinOptions};
pub use contours::{build_contour_levels, build_contours, contour_levels, ContourLevel, ContourSegment};
pub use extrema::{
    detect_maxima, detect_maxima_detailed, detect_minima, detect_minima_detailed, laplacian_at, Extremum,
    MinimaOptions, MinimaPoint,
};
pub use geometry::{ambient_occlusion, gradients, normals, Gradients};
pub use grid_walk::{resolve_index, BoundaryPolicy, Connectivity, GridBfs};
pub use rational::{
    approximate_ratio_by_denominator, approximate_ratio_continued, gcd, label_minima, RationalApprox,
};
pub use smooth::{box_blur, box_blur_values};
pub use symmetry::{symmetry_check, SymmetryReport};

use serde::{Deserialize, Serialize};

use crate::field::ScalarField;
use crate::grid::{FieldSource, GridData};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalysisOptions {
    pub source: FieldSource,
    pub minima: MinimaOptions,
    pub basins: BasinOptions,
    /// Largest denominator for ratio labels.
    pub max_denominator: u64,
    pub tie_tolerance: f64,
    pub contour_count: usize,
    pub symmetry_samples: usize,
    pub symmetry_seed: u64,
    pub symmetry_tolerance: f64,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            source: FieldSource::Normalized,
            minima: MinimaOptions::default(),
            basins: BasinOptions::default(),
            max_denominator: 16,
            tie_tolerance: 1e-3,
            contour_count: 8,
            symmetry_samples: 256,
            symmetry_seed: 1,
            symmetry_tolerance: 1e-3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerrainReport {
    /// Labelled minima with basins.
    pub minima: Vec<MinimaPoint>,
    pub maxima: Vec<MinimaPoint>,
    pub contours: Vec<ContourLevel>,
    pub symmetry: SymmetryReport,
}

/// Minima (with basins and ratio labels), maxima, contours and the
/// symmetry self-test for one buffer of `grid`.
pub fn analyze(grid: &GridData, opts: &AnalysisOptions) -> TerrainReport {
    let field: ScalarField = grid.field(opts.source);

    let mut minima = detect_minima_detailed(&field, &opts.minima);
    estimate_basins(&field, &mut minima, &opts.basins);
    label_minima(&mut minima, opts.max_denominator, opts.tie_tolerance);

    let maxima = detect_maxima_detailed(&field, &opts.minima);
    let levels = contour_levels(field.min_value(), field.max_value(), opts.contour_count);
    let contours = build_contour_levels(&field, &levels);
    let symmetry = symmetry_check(&field, opts.symmetry_samples, opts.symmetry_seed, opts.symmetry_tolerance);

    log::debug!(
        "analysis: {} minima, {} maxima, {} contour levels, symmetry max error {:.3e}",
        minima.len(),
        maxima.len(),
        contours.len(),
        symmetry.max_error
    );
    TerrainReport { minima, maxima, contours, symmetry }
}
