//! Error and control-flow signal types shared by every stage of the pipeline.
use thiserror::Error;

/// Rejected engine configuration. Raised before any grid work starts.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("roughness constant `{name}` must be finite and positive, got {value}")]
    NonPositiveConstant { name: &'static str, value: f64 },

    #[error("roughness constant b ({b}) must exceed a ({a})")]
    RateOrder { a: f64, b: f64 },

    #[error("expClampMin must be finite and negative, got {0}")]
    ExpClampMin(f64),

    #[error("base frequency must be finite and positive, got {0}")]
    BaseFreq(f64),

    #[error("supplied {0} axis is empty")]
    EmptyAxis(&'static str),
}

/// Cooperative cancellation was observed at a poll point.
///
/// Not a failure: callers treat it as "no result".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("computation cancelled")]
pub struct Cancelled;

/// Anything that stops a grid or tile computation from producing a result.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ComputeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Cancelled(#[from] Cancelled),

    #[error("tile worker failed: {0}")]
    Worker(String),
}

impl ComputeError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ComputeError::Cancelled(_))
    }
}
