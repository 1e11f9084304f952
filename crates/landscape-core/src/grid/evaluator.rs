//! Per-cell evaluation shared by full-grid, tile and single-cell paths.
use crate::config::{EngineConfig, NormalizationMode, RoughnessOptions};
use crate::constants::RoughnessConstants;
use crate::roughness::{pool_roughness, PoolDiagnostics, TopPairs};
use crate::spectrum::{
    build_tone_spectrum, MergePolicy, PartialPool, SpectrumTemplate, ToneSpectrum, TONE_BASE,
    TONE_X, TONE_Y,
};

/// Normalisation denominators at or below this fall back to the raw value.
const NORM_EPS: f64 = 1e-12;

/// Base tone plus one x/y tone per axis sample, built once per call.
#[derive(Debug, Clone)]
pub struct PreparedSpectra {
    pub base: ToneSpectrum,
    pub x_tones: Vec<ToneSpectrum>,
    pub y_tones: Vec<ToneSpectrum>,
    base_energy: f64,
    base_max: f64,
    x_energy: Vec<f64>,
    x_max: Vec<f64>,
    y_energy: Vec<f64>,
    y_max: Vec<f64>,
    template_len: usize,
}

impl PreparedSpectra {
    pub fn new(config: &EngineConfig, template: &SpectrumTemplate, xs: &[f64], ys: &[f64]) -> Self {
        let scale = config.triad_energy.amp_scale();
        let f0 = config.base_freq;
        let base = build_tone_spectrum(f0, template, TONE_BASE, scale);
        let x_tones: Vec<ToneSpectrum> =
            xs.iter().map(|x| build_tone_spectrum(f0 * x, template, TONE_X, scale)).collect();
        let y_tones: Vec<ToneSpectrum> =
            ys.iter().map(|y| build_tone_spectrum(f0 * y, template, TONE_Y, scale)).collect();
        Self {
            base_energy: base.energy(),
            base_max: base.max_amp(),
            x_energy: x_tones.iter().map(ToneSpectrum::energy).collect(),
            x_max: x_tones.iter().map(ToneSpectrum::max_amp).collect(),
            y_energy: y_tones.iter().map(ToneSpectrum::energy).collect(),
            y_max: y_tones.iter().map(ToneSpectrum::max_amp).collect(),
            base,
            x_tones,
            y_tones,
            template_len: template.len(),
        }
    }

    pub fn width(&self) -> usize {
        self.x_tones.len()
    }

    pub fn height(&self) -> usize {
        self.y_tones.len()
    }

    pub fn template_len(&self) -> usize {
        self.template_len
    }
}

/// One evaluated cell before normalisation bookkeeping.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CellSample {
    pub raw: f64,
    pub normalized: f64,
    pub pool: PoolDiagnostics,
    pub source_len: usize,
    pub merged: usize,
}

/// Owns the pool scratch for one call; never shared across calls or threads.
pub struct CellEvaluator<'a> {
    prepared: &'a PreparedSpectra,
    constants: RoughnessConstants,
    options: &'a RoughnessOptions,
    policy: MergePolicy,
    mode: NormalizationMode,
    reference: Option<f64>,
    pool: PartialPool,
}

impl<'a> CellEvaluator<'a> {
    pub fn new(prepared: &'a PreparedSpectra, config: &'a EngineConfig) -> Self {
        Self {
            prepared,
            constants: config.constants,
            options: &config.roughness,
            policy: MergePolicy::from_options(&config.roughness),
            mode: config.normalization_mode,
            reference: None,
            pool: PartialPool::with_template_len(prepared.template_len),
        }
    }

    /// Denominator for [`NormalizationMode::Reference`].
    pub fn with_reference(mut self, reference: Option<f64>) -> Self {
        self.reference = reference;
        self
    }

    /// Raw pool roughness at local indices `(ix, iy)`.
    pub fn evaluate(&mut self, ix: usize, iy: usize, top: Option<&mut TopPairs>) -> CellSample {
        let p = self.prepared;
        self.pool.fill([&p.base, &p.x_tones[ix], &p.y_tones[iy]], &self.policy);
        let (raw, pool) = pool_roughness(&self.pool, &self.constants, self.options, top);
        CellSample {
            raw,
            normalized: self.normalize(raw, ix, iy),
            pool,
            source_len: self.pool.source_len,
            merged: self.pool.merged_count(),
        }
    }

    fn normalize(&self, raw: f64, ix: usize, iy: usize) -> f64 {
        let p = self.prepared;
        let denom = match self.mode {
            NormalizationMode::Raw => return raw,
            NormalizationMode::Energy => p.base_energy + p.x_energy[ix] + p.y_energy[iy],
            NormalizationMode::Max => {
                let m = p.base_max.max(p.x_max[ix]).max(p.y_max[iy]);
                m * m
            }
            NormalizationMode::Reference => match self.reference {
                Some(r) => r,
                None => return raw,
            },
        };
        if denom.is_finite() && denom > NORM_EPS {
            raw / denom
        } else {
            raw
        }
    }
}

/// Roughness at the configured reference point, evaluated through the same
/// pool/roughness path as grid cells.
pub(crate) fn reference_roughness(config: &EngineConfig, template: &SpectrumTemplate) -> Option<f64> {
    if config.normalization_mode != NormalizationMode::Reference {
        return None;
    }
    let rp = config.reference_point;
    let prepared = PreparedSpectra::new(config, template, &[rp.x], &[rp.y]);
    let raw_config = EngineConfig { normalization_mode: NormalizationMode::Raw, ..config.clone() };
    let mut eval = CellEvaluator::new(&prepared, &raw_config);
    let r = eval.evaluate(0, 0, None).raw;
    log::trace!("reference roughness at ({}, {}) = {r}", rp.x, rp.y);
    Some(r)
}
