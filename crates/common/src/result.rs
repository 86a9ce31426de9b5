//! # Evaluation Results
//!
//! Value types produced by grading: the authoritative `EvaluationResult`,
//! the HUD-oriented `EvaluationBreakdown`, and the committed
//! `FinalOutcome` published once per session.

use serde::{Deserialize, Serialize};

use crate::rules::PartCondition;

/// Result of one evaluation pass. Produced fresh every time.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub is_fatal: bool,
    /// Meaningful only when `is_fatal`
    pub fatal_reason: String,
    /// Always within `[0, 1]`
    pub score_normalized: f32,
}

impl EvaluationResult {
    pub fn passing(score_normalized: f32) -> Self {
        Self {
            is_fatal: false,
            fatal_reason: String::new(),
            score_normalized,
        }
    }

    pub fn fatal(reason: impl Into<String>, score_normalized: f32) -> Self {
        Self {
            is_fatal: true,
            fatal_reason: reason.into(),
            score_normalized,
        }
    }

    /// Same score, no termination.
    pub fn downgraded(&self) -> Self {
        Self::passing(self.score_normalized)
    }
}

// ============================================================================
// Breakdown
// ============================================================================

/// Which rule produced a fatal cause.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FatalSource {
    StemTooShort,
    StemTooLong,
    Angle,
    CrownLost { part_id: String },
    SpecialPartRemoved { part_id: String },
}

/// One fatal cause, in the order it was recorded.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FatalCause {
    pub source: FatalSource,
    pub reason: String,
}

/// Stem or angle term of an evaluation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ToleranceTerm {
    /// Measured value (length, or calibrated angle in degrees)
    pub measured: f32,
    /// Signed deviation for the stem; unsigned shortest arc for the angle
    pub signed_delta: f32,
    pub delta: f32,
    pub partial_score: f32,
    pub weight: f32,
    pub perfect: bool,
}

/// Per-part term of an evaluation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PartTerm {
    pub part_id: String,
    /// Whether a live instance with this id exists
    pub present: bool,
    pub attached: bool,
    pub condition: Option<PartCondition>,
    pub partial_score: f32,
    pub weight: f32,
    pub contributes: bool,
}

/// Full account of one evaluation pass, for HUDs and debugging.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationBreakdown {
    pub stem: Option<ToleranceTerm>,
    pub angle: Option<ToleranceTerm>,
    pub parts: Vec<PartTerm>,
    /// Every fatal cause, in evaluation order; the last one is reported
    pub fatal_causes: Vec<FatalCause>,
    pub weighted_sum: f32,
    pub total_weight: f32,
    pub result: EvaluationResult,
}

impl EvaluationBreakdown {
    pub fn first_fatal_cause(&self) -> Option<&FatalCause> {
        self.fatal_causes.first()
    }
}

// ============================================================================
// Final Outcome
// ============================================================================

/// The committed session result, published exactly once.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FinalOutcome {
    pub score: i32,
    pub reward: i32,
    pub is_fatal: bool,
    pub reason: String,
    pub score_normalized: f32,
    /// The engine said fatal but the soft-fail policy downgraded it
    pub soft_failed: bool,
}
