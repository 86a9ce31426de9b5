//! # Error Types
//!
//! Errors raised while building or loading authored data. Runtime rule
//! violations are not errors; they flow through `EvaluationResult`.

use std::path::PathBuf;

/// Errors from building a `RuleSet` strictly.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RuleError {
    #[error("Duplicate part rule id: {0}")]
    DuplicatePartId(String),

    #[error("Invalid score weight {weight} on {rule}")]
    InvalidWeight { rule: String, weight: f32 },

    #[error("Invalid hard fail delta {delta} on {rule}")]
    InvalidHardFailDelta { rule: String, delta: f32 },

    #[error("Perfect delta {perfect} exceeds hard fail delta {hard_fail} on {rule}")]
    PerfectExceedsHardFail {
        rule: String,
        perfect: f32,
        hard_fail: f32,
    },
}

/// Errors from validating a `ScoreCurve`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CurveError {
    #[error("Curve has no control points")]
    Empty,

    #[error("Curve point {index} is not finite")]
    NonFinite { index: usize },

    #[error("Curve point {index} has x = {x}, outside [0, 1]")]
    OutOfRange { index: usize, x: f32 },

    #[error("Curve points are not sorted by x at index {index}")]
    Unsorted { index: usize },

    #[error("Curve is not monotonic at index {index}")]
    NotMonotonic { index: usize },
}

/// Errors from loading a `TrimProfile`.
#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("RON parse error: {0}")]
    Parse(#[from] ron::error::SpannedError),

    #[error("RON serialize error: {0}")]
    Serialize(#[from] ron::Error),

    #[error("Invalid rule: {0}")]
    Rule(#[from] RuleError),

    #[error("Invalid outcome curve ({mapping}): {source}")]
    Curve {
        mapping: &'static str,
        #[source]
        source: CurveError,
    },
}
