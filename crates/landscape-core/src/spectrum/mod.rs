//! Timbre → per-tone spectra → per-cell partial pool.
pub mod pool;
pub mod template;
pub mod tone;

pub use pool::{MergePolicy, PartialPool};
pub use template::{build_spectrum_template, SpectrumTemplate, TemplateCounts};
pub use tone::{build_tone_spectrum, ToneSpectrum, TONE_BASE, TONE_X, TONE_Y};
