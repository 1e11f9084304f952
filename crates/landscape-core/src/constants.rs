//! Plomp–Levelt / Sethares roughness-curve constants.
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Shape of the pairwise roughness curve.
///
/// `a` and `b` are the decay rates of the two exponentials, `d_star` the
/// critical-bandwidth fraction at which roughness peaks, and `s1`/`s2` the
/// slope and intercept of the bandwidth line over the lower frequency.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoughnessConstants {
    pub a: f64,
    pub b: f64,
    pub d_star: f64,
    pub s1: f64,
    pub s2: f64,
    /// Lower bound applied to both exponent arguments. Must be negative.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp_clamp_min: Option<f64>,
}

pub const STANDARD_CONSTANTS: RoughnessConstants = RoughnessConstants {
    a: 3.5,
    b: 5.75,
    d_star: 0.24,
    s1: 0.021,
    s2: 19.0,
    exp_clamp_min: None,
};

impl Default for RoughnessConstants {
    fn default() -> Self {
        STANDARD_CONSTANTS
    }
}

impl RoughnessConstants {
    /// Reject constants that would make the curve meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("a", self.a),
            ("b", self.b),
            ("dStar", self.d_star),
            ("s1", self.s1),
            ("s2", self.s2),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::NonPositiveConstant { name, value });
            }
        }
        if self.b <= self.a {
            return Err(ConfigError::RateOrder { a: self.a, b: self.b });
        }
        if let Some(clamp) = self.exp_clamp_min {
            if !clamp.is_finite() || clamp >= 0.0 {
                return Err(ConfigError::ExpClampMin(clamp));
            }
        }
        Ok(())
    }
}
