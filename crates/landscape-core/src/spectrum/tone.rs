//! Absolute-frequency spectrum of one tone (base, x or y).
use serde::{Deserialize, Serialize};

use super::template::SpectrumTemplate;

pub const TONE_BASE: u8 = 0;
pub const TONE_X: u8 = 1;
pub const TONE_Y: u8 = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToneSpectrum {
    /// Monotone in the template ratios.
    pub freqs: Vec<f64>,
    pub amps: Vec<f64>,
    pub partial_index: Vec<usize>,
    pub tone_index: u8,
    pub tone_mask: u8,
}

impl ToneSpectrum {
    pub fn len(&self) -> usize {
        self.freqs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.freqs.is_empty()
    }

    /// Σ amp².
    pub fn energy(&self) -> f64 {
        self.amps.iter().map(|a| a * a).sum()
    }

    pub fn max_amp(&self) -> f64 {
        self.amps.iter().cloned().fold(0.0, f64::max)
    }
}

/// Scale `template` to `base_freq`: `freq[i] = base_freq · ratio[i]`,
/// `amp[i] = template.amp[i] · amp_scale`.
///
/// For the x and y tones `base_freq` is the engine base frequency times the
/// axis value.
pub fn build_tone_spectrum(
    base_freq: f64,
    template: &SpectrumTemplate,
    tone_index: u8,
    amp_scale: f64,
) -> ToneSpectrum {
    debug_assert!(tone_index < 3);
    ToneSpectrum {
        freqs: template.ratios.iter().map(|r| base_freq * r).collect(),
        amps: template.amps.iter().map(|a| a * amp_scale).collect(),
        partial_index: template.partial_index.clone(),
        tone_index,
        tone_mask: 1 << tone_index,
    }
}
