//! Engine configuration: the immutable input of every grid and tile call.
//!
//! Every struct accepts partial JSON (`#[serde(default)]`), so hosts only send
//! the fields they change. Field names on the wire are camelCase.
use serde::{Deserialize, Serialize};

use crate::constants::RoughnessConstants;
use crate::error::ConfigError;

// ── Timbre ────────────────────────────────────────────────────────────────────

/// Partial-list generator for the shared timbre.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TimbrePreset {
    /// All harmonics, amplitude 1/k (sawtooth).
    #[serde(alias = "saw")]
    Harmonic,
    /// Odd harmonics, amplitude 1/k.
    Square,
    /// Odd harmonics, amplitude 1/k².
    Triangle,
    /// Explicit `custom_partials` list.
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CustomPartial {
    pub ratio: f64,
    pub amp: f64,
}

/// Unit in which a merge tolerance is expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MergeUnit {
    Ratio,
    Cents,
    Hz,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AmpNormalization {
    None,
    /// Divide by the largest amplitude.
    Max,
    /// Divide by the L2 norm of the amplitudes.
    Energy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Compression {
    None,
    Sqrt,
    /// `ln(1 + amount·a) / ln(1 + amount)`.
    Log,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PipelineOrder {
    CompressThenNormalize,
    NormalizeThenCompress,
}

/// Amplitude given to an injected ratio-1 partial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BasePartialStrategy {
    One,
    First,
    Max,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TimbreConfig {
    pub preset: TimbrePreset,
    pub partial_count: usize,
    pub max_partials: usize,
    pub custom_partials: Vec<CustomPartial>,
    pub merge_tolerance: f64,
    pub merge_unit: MergeUnit,
    pub normalization: AmpNormalization,
    pub compression: Compression,
    pub compression_amount: f64,
    pub pipeline_order: PipelineOrder,
    pub base_partial_strategy: BasePartialStrategy,
}

impl Default for TimbreConfig {
    fn default() -> Self {
        Self {
            preset: TimbrePreset::Harmonic,
            partial_count: 8,
            max_partials: 64,
            custom_partials: Vec::new(),
            merge_tolerance: 0.0,
            merge_unit: MergeUnit::Cents,
            normalization: AmpNormalization::None,
            compression: Compression::None,
            compression_amount: 1.0,
            pipeline_order: PipelineOrder::CompressThenNormalize,
            base_partial_strategy: BasePartialStrategy::One,
        }
    }
}

/// Loudness compensation across the three simultaneous tones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TriadEnergyMode {
    /// Every tone at full amplitude.
    Off,
    /// Amplitudes scaled by 1/3.
    Amplitude,
    /// Amplitudes scaled by 1/√3 so summed energy is unchanged.
    Energy,
}

impl TriadEnergyMode {
    pub fn amp_scale(self) -> f64 {
        match self {
            TriadEnergyMode::Off => 1.0,
            TriadEnergyMode::Amplitude => 1.0 / 3.0,
            TriadEnergyMode::Energy => 1.0 / 3f64.sqrt(),
        }
    }
}

// ── Sampling ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SamplingConfig {
    pub x_range: [f64; 2],
    pub y_range: [f64; 2],
    pub x_steps: usize,
    pub y_steps: usize,
    pub log_sampling: bool,
    pub fold_octave: bool,
    /// Insert extra samples around just-intonation reference ratios.
    pub refine_fixed: bool,
    pub refine_band_cents: f64,
    pub refine_density: usize,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            x_range: [1.0, 2.0],
            y_range: [1.0, 2.0],
            x_steps: 64,
            y_steps: 64,
            log_sampling: false,
            fold_octave: false,
            refine_fixed: false,
            refine_band_cents: 15.0,
            refine_density: 5,
        }
    }
}

/// Axis values supplied directly by the host, bypassing the builder.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Axes {
    pub xs: Vec<f64>,
    pub ys: Vec<f64>,
}

// ── Roughness evaluation ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RoughnessOptions {
    pub amp_threshold: f64,
    /// Pairs whose amplitude product is below `amp_threshold · epsilon_contribution` are skipped.
    pub epsilon_contribution: f64,
    pub enable_self_interaction: bool,
    pub self_interaction_weight: f64,
    pub merge_duplicate_partials: bool,
    pub merge_tolerance: f64,
    pub merge_unit: MergeUnit,
}

impl Default for RoughnessOptions {
    fn default() -> Self {
        Self {
            amp_threshold: 1e-4,
            epsilon_contribution: 1e-2,
            enable_self_interaction: false,
            self_interaction_weight: 0.5,
            merge_duplicate_partials: true,
            merge_tolerance: 0.0,
            merge_unit: MergeUnit::Cents,
        }
    }
}

impl RoughnessOptions {
    pub fn pair_amp_floor(&self) -> f64 {
        self.amp_threshold * self.epsilon_contribution
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NormalizationMode {
    #[serde(alias = "none")]
    Raw,
    /// Divide by Σ amp² over the three tones.
    Energy,
    /// Divide by the square of the largest single-partial amplitude.
    Max,
    /// Divide by the roughness at `reference_point`.
    Reference,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReferencePoint {
    pub x: f64,
    pub y: f64,
}

impl Default for ReferencePoint {
    fn default() -> Self {
        Self { x: 1.0, y: 1.0 }
    }
}

// ── Top level ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    pub base_freq: f64,
    pub timbre: TimbreConfig,
    pub sampling: SamplingConfig,
    pub roughness: RoughnessOptions,
    pub normalization_mode: NormalizationMode,
    pub constants: RoughnessConstants,
    pub reference_point: ReferencePoint,
    pub triad_energy: TriadEnergyMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub axes: Option<Axes>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_freq: 220.0,
            timbre: TimbreConfig::default(),
            sampling: SamplingConfig::default(),
            roughness: RoughnessOptions::default(),
            normalization_mode: NormalizationMode::Energy,
            constants: RoughnessConstants::default(),
            reference_point: ReferencePoint::default(),
            triad_energy: TriadEnergyMode::Off,
            axes: None,
        }
    }
}

impl EngineConfig {
    /// Fail-fast checks run before any axis or spectrum is built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.constants.validate()?;
        if !self.base_freq.is_finite() || self.base_freq <= 0.0 {
            return Err(ConfigError::BaseFreq(self.base_freq));
        }
        Ok(())
    }
}
