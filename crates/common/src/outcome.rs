//! # Outcome Mapping
//!
//! Turns a normalized score into the integers a result screen shows: a
//! final score and a "reward" (days the arrangement lasts).
//!
//! ## Types
//! - `OutcomeMapping`: score mapping, reward mapping, soft-fail policy
//! - `ValueMapping`: linear range or authored curve
//! - `ScoreCurve`: sorted, monotonic control points over `[0, 1]`

use serde::{Deserialize, Serialize};

use crate::error::CurveError;

// ============================================================================
// Outcome Mapping
// ============================================================================

/// Authored mapping from a normalized score to final values.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutcomeMapping {
    /// Normalized score -> final score
    pub score: ValueMapping,
    /// Normalized score -> reward (days)
    pub reward: ValueMapping,
    /// Downgrade fatal results to plain bad scores
    pub soft_fail: bool,
}

impl Default for OutcomeMapping {
    fn default() -> Self {
        Self {
            score: ValueMapping::Linear { min: 0.0, max: 100.0 },
            reward: ValueMapping::Linear { min: 1.0, max: 10.0 },
            soft_fail: false,
        }
    }
}

impl OutcomeMapping {
    /// Linear reward between `min_days` and `max_days`, default score range.
    pub fn days(min_days: f32, max_days: f32) -> Self {
        Self {
            reward: ValueMapping::Linear {
                min: min_days,
                max: max_days,
            },
            ..Default::default()
        }
    }

    pub fn with_soft_fail(mut self, soft_fail: bool) -> Self {
        self.soft_fail = soft_fail;
        self
    }

    pub fn final_score(&self, normalized: f32) -> i32 {
        self.score.map_rounded(normalized)
    }

    pub fn reward(&self, normalized: f32) -> i32 {
        self.reward.map_rounded(normalized)
    }

    pub fn validate(&self) -> Result<(), (&'static str, CurveError)> {
        if let ValueMapping::Curve(curve) = &self.score {
            curve.validate().map_err(|e| ("score", e))?;
        }
        if let ValueMapping::Curve(curve) = &self.reward {
            curve.validate().map_err(|e| ("reward", e))?;
        }
        Ok(())
    }
}

// ============================================================================
// Value Mapping
// ============================================================================

/// How a normalized score in `[0, 1]` becomes a value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ValueMapping {
    Linear { min: f32, max: f32 },
    Curve(ScoreCurve),
}

impl ValueMapping {
    pub fn map(&self, normalized: f32) -> f32 {
        let t = clamp_unit(normalized);
        match self {
            ValueMapping::Linear { min, max } => min + (max - min) * t,
            ValueMapping::Curve(curve) => curve.sample(t),
        }
    }

    /// Mapped value rounded to the nearest integer, halves away from zero.
    pub fn map_rounded(&self, normalized: f32) -> i32 {
        self.map(normalized).round() as i32
    }
}

fn clamp_unit(t: f32) -> f32 {
    if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) }
}

// ============================================================================
// Score Curve
// ============================================================================

/// Interpolation between neighbouring control points.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CurveInterpolation {
    #[default]
    Linear,
    /// Smoothstep between keys; stays monotonic
    Smooth,
    /// Hold the left key's value until the next key
    Step,
}

/// Control point of a `ScoreCurve`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CurvePoint {
    pub x: f32,
    pub y: f32,
}

impl CurvePoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Monotonic piecewise function over `[0, 1]`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreCurve {
    pub points: Vec<CurvePoint>,
    #[serde(default)]
    pub interpolation: CurveInterpolation,
}

impl ScoreCurve {
    /// Build and validate a curve.
    pub fn new(points: Vec<CurvePoint>, interpolation: CurveInterpolation) -> Result<Self, CurveError> {
        let curve = Self { points, interpolation };
        curve.validate()?;
        Ok(curve)
    }

    /// Points must be finite, within `[0, 1]` on x, strictly increasing in
    /// x, and either non-decreasing or non-increasing in y throughout.
    pub fn validate(&self) -> Result<(), CurveError> {
        if self.points.is_empty() {
            return Err(CurveError::Empty);
        }

        for (index, p) in self.points.iter().enumerate() {
            if !p.x.is_finite() || !p.y.is_finite() {
                return Err(CurveError::NonFinite { index });
            }
            if !(0.0..=1.0).contains(&p.x) {
                return Err(CurveError::OutOfRange { index, x: p.x });
            }
        }

        let mut direction = 0.0_f32;
        for (index, pair) in self.points.windows(2).enumerate() {
            let (a, b) = (pair[0], pair[1]);
            if b.x <= a.x {
                return Err(CurveError::Unsorted { index: index + 1 });
            }
            let step = b.y - a.y;
            if step == 0.0 {
                continue;
            }
            if direction == 0.0 {
                direction = step.signum();
            } else if step.signum() != direction {
                return Err(CurveError::NotMonotonic { index: index + 1 });
            }
        }

        Ok(())
    }

    /// Evaluate at `t`, clamped to the first and last keys.
    pub fn sample(&self, t: f32) -> f32 {
        let (Some(first), Some(last)) = (self.points.first(), self.points.last()) else {
            return 0.0;
        };
        let t = clamp_unit(t);
        if t <= first.x {
            return first.y;
        }
        if t >= last.x {
            return last.y;
        }

        // First key strictly right of t; guaranteed to exist and be > 0
        let upper = self.points.partition_point(|p| p.x <= t);
        let a = self.points[upper - 1];
        let b = self.points[upper];
        let span = b.x - a.x;
        let local = if span > 0.0 { (t - a.x) / span } else { 0.0 };

        let blend = match self.interpolation {
            CurveInterpolation::Linear => local,
            CurveInterpolation::Smooth => local * local * (3.0 - 2.0 * local),
            CurveInterpolation::Step => 0.0,
        };
        a.y + (b.y - a.y) * blend
    }
}
