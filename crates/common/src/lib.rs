//! # Kenzan Common
//!
//! Shared data types for the Kenzan trimming minigame. Everything here is
//! plain, serializable data; behaviour lives in `kenzan-runtime`.
//!
//! ## Modules
//!
//! - `rules`: authored `RuleSet` (stem, angle and per-part rules)
//! - `outcome`: `OutcomeMapping` from normalized score to score and reward
//! - `parts`: live `PartInstance` / `StemInstance` state and angle helpers
//! - `result`: `EvaluationResult`, `EvaluationBreakdown`, `FinalOutcome`
//! - `validation`: authoring checks reported to level designers
//! - `config`: `SessionConfig` and the RON-backed `TrimProfile`
//! - `error`: error types for loading authored data

pub mod config;
pub mod error;
pub mod outcome;
pub mod parts;
pub mod result;
pub mod rules;
pub mod validation;

pub use config::{DramaticFailureConfig, SessionConfig, TrimProfile};
pub use error::{CurveError, ProfileError, RuleError};
pub use outcome::{CurveInterpolation, CurvePoint, OutcomeMapping, ScoreCurve, ValueMapping};
pub use parts::{shortest_angle_delta, wrap_degrees, DetachReason, PartInstance, StemInstance};
pub use result::{
    EvaluationBreakdown, EvaluationResult, FatalCause, FatalSource, FinalOutcome, PartTerm,
    ToleranceTerm,
};
pub use rules::{AngleRule, PartCondition, PartKind, PartRule, RuleSet, RuleSetDef, StemRule, ToleranceRule};
pub use validation::{AuthoringIssue, ValidationReport};

/// Convenient re-exports for common types.
pub mod prelude {
    pub use super::config::{SessionConfig, TrimProfile};
    pub use super::outcome::OutcomeMapping;
    pub use super::parts::{DetachReason, PartInstance, StemInstance};
    pub use super::result::{EvaluationResult, FinalOutcome};
    pub use super::rules::{AngleRule, PartCondition, PartKind, PartRule, RuleSet, StemRule};
}
