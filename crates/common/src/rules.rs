//! # Rule Set
//!
//! Authored "ideal" thresholds and weights the evaluation engine grades
//! against.
//!
//! ## Types
//! - `PartKind` / `PartCondition`: part taxonomy shared with live instances
//! - `ToleranceRule`: stem length and cut angle rules
//! - `PartRule`: one rule per authored part identity
//! - `RuleSet`: the immutable per-session bundle

use std::collections::HashMap;

use bevy::reflect::Reflect;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::RuleError;

// ============================================================================
// Part Taxonomy
// ============================================================================

/// Structural kind of a part.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Reflect, Serialize, Deserialize)]
pub enum PartKind {
    #[default]
    Leaf,
    Petal,
    SecondaryStem,
    MainStem,
    /// Losing this part is always an immediate fatal condition.
    CriticalCrown,
}

impl PartKind {
    pub fn is_critical(self) -> bool {
        matches!(self, PartKind::CriticalCrown)
    }
}

/// Visible condition of a part, set by gameplay.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Reflect, Serialize, Deserialize)]
pub enum PartCondition {
    #[default]
    Normal,
    Withered,
    Perfect,
}

// ============================================================================
// Tolerance Rules (stem length, cut angle)
// ============================================================================

/// Authored tolerance around an ideal measurement.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToleranceRule {
    /// Ideal value (length units for the stem, degrees for the angle)
    pub ideal_value: f32,
    /// Deviation inside which the term is flagged perfect
    pub perfect_delta: f32,
    /// Deviation beyond which the term is fatal (if `can_cause_fatal`)
    pub hard_fail_delta: f32,
    /// Weight in the normalized score
    pub score_weight: f32,
    pub can_cause_fatal: bool,
    pub contributes_to_score: bool,
}

impl Default for ToleranceRule {
    fn default() -> Self {
        Self {
            ideal_value: 0.0,
            perfect_delta: 0.0,
            hard_fail_delta: 1.0,
            score_weight: 1.0,
            can_cause_fatal: false,
            contributes_to_score: true,
        }
    }
}

impl ToleranceRule {
    pub fn new(ideal_value: f32, hard_fail_delta: f32) -> Self {
        Self {
            ideal_value,
            hard_fail_delta,
            ..Default::default()
        }
    }

    pub fn with_weight(mut self, score_weight: f32) -> Self {
        self.score_weight = score_weight;
        self
    }

    pub fn with_perfect_delta(mut self, perfect_delta: f32) -> Self {
        self.perfect_delta = perfect_delta;
        self
    }

    pub fn fatal(mut self, can_cause_fatal: bool) -> Self {
        self.can_cause_fatal = can_cause_fatal;
        self
    }

    pub fn scored(mut self, contributes_to_score: bool) -> Self {
        self.contributes_to_score = contributes_to_score;
        self
    }

    /// Partial score for a deviation: `clamp01(1 - delta / hard_fail_delta)`.
    ///
    /// A non-positive `hard_fail_delta` scores 1 only for an exact hit. A
    /// NaN deviation (a bad physics reading) scores 0.
    pub fn partial_score(&self, delta: f32) -> f32 {
        if delta.is_nan() {
            return 0.0;
        }
        if self.hard_fail_delta <= 0.0 {
            return if delta <= 0.0 { 1.0 } else { 0.0 };
        }
        (1.0 - delta / self.hard_fail_delta).clamp(0.0, 1.0)
    }

    pub fn exceeds_hard_fail(&self, delta: f32) -> bool {
        delta > self.hard_fail_delta
    }

    pub fn is_perfect(&self, delta: f32) -> bool {
        delta <= self.perfect_delta
    }

    fn check(&self, name: &str) -> Result<(), RuleError> {
        if !(self.score_weight >= 0.0) {
            return Err(RuleError::InvalidWeight {
                rule: name.to_string(),
                weight: self.score_weight,
            });
        }
        if !(self.hard_fail_delta > 0.0) {
            return Err(RuleError::InvalidHardFailDelta {
                rule: name.to_string(),
                delta: self.hard_fail_delta,
            });
        }
        if self.perfect_delta > self.hard_fail_delta {
            return Err(RuleError::PerfectExceedsHardFail {
                rule: name.to_string(),
                perfect: self.perfect_delta,
                hard_fail: self.hard_fail_delta,
            });
        }
        Ok(())
    }
}

/// Stem length rule.
pub type StemRule = ToleranceRule;

/// Cut angle rule (degrees).
pub type AngleRule = ToleranceRule;

// ============================================================================
// Part Rule
// ============================================================================

/// Authored scoring and fatal rule for one part identity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartRule {
    /// Stable id, unique within a rule set
    pub part_id: String,
    pub kind: PartKind,
    pub ideal_condition: PartCondition,
    pub can_cause_fatal: bool,
    /// Removal is fatal at grading time even without `can_cause_fatal`
    pub is_special: bool,
    pub contributes_to_score: bool,
    pub allowed_withered: bool,
    pub allowed_missing: bool,
    pub score_weight: f32,
}

impl Default for PartRule {
    fn default() -> Self {
        Self {
            part_id: String::new(),
            kind: PartKind::Leaf,
            ideal_condition: PartCondition::Normal,
            can_cause_fatal: false,
            is_special: false,
            contributes_to_score: true,
            allowed_withered: false,
            allowed_missing: false,
            score_weight: 1.0,
        }
    }
}

impl PartRule {
    pub fn new(part_id: impl Into<String>, kind: PartKind) -> Self {
        Self {
            part_id: part_id.into(),
            kind,
            ..Default::default()
        }
    }

    /// Rule for the critical crown: fatal when lost, ideally untouched.
    pub fn crown(part_id: impl Into<String>) -> Self {
        Self {
            can_cause_fatal: true,
            ..Self::new(part_id, PartKind::CriticalCrown)
        }
    }

    pub fn with_ideal(mut self, condition: PartCondition) -> Self {
        self.ideal_condition = condition;
        self
    }

    pub fn with_weight(mut self, score_weight: f32) -> Self {
        self.score_weight = score_weight;
        self
    }

    pub fn fatal(mut self, can_cause_fatal: bool) -> Self {
        self.can_cause_fatal = can_cause_fatal;
        self
    }

    pub fn special(mut self, is_special: bool) -> Self {
        self.is_special = is_special;
        self
    }

    pub fn scored(mut self, contributes_to_score: bool) -> Self {
        self.contributes_to_score = contributes_to_score;
        self
    }

    pub fn allow_withered(mut self, allowed: bool) -> Self {
        self.allowed_withered = allowed;
        self
    }

    pub fn allow_missing(mut self, allowed: bool) -> Self {
        self.allowed_missing = allowed;
        self
    }
}

// ============================================================================
// Rule Set
// ============================================================================

/// Serialized shape of a rule set: a flat, ordered rule list.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleSetDef {
    pub stem: StemRule,
    pub angle: AngleRule,
    pub parts: Vec<PartRule>,
}

/// Immutable authored rules for one session.
///
/// Part rules keep their authored order, which fixes the order fatal
/// reasons are written in during evaluation. When two rules share a
/// `part_id` the first one wins and the id is remembered in
/// [`RuleSet::duplicate_ids`].
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(from = "RuleSetDef", into = "RuleSetDef")]
pub struct RuleSet {
    stem: StemRule,
    angle: AngleRule,
    parts: Vec<PartRule>,
    index: HashMap<String, usize>,
    duplicate_ids: Vec<String>,
}

impl RuleSet {
    /// Build a rule set, keeping the first rule for each duplicated id.
    pub fn new(stem: StemRule, angle: AngleRule, rules: impl IntoIterator<Item = PartRule>) -> Self {
        let mut parts = Vec::new();
        let mut index = HashMap::new();
        let mut duplicate_ids = Vec::new();

        for rule in rules {
            if index.contains_key(&rule.part_id) {
                warn!(part_id = %rule.part_id, "Duplicate part rule ignored (first rule wins)");
                duplicate_ids.push(rule.part_id);
                continue;
            }
            index.insert(rule.part_id.clone(), parts.len());
            parts.push(rule);
        }

        Self {
            stem,
            angle,
            parts,
            index,
            duplicate_ids,
        }
    }

    /// Build a rule set, rejecting duplicates and malformed tolerances.
    pub fn strict(stem: StemRule, angle: AngleRule, rules: impl IntoIterator<Item = PartRule>) -> Result<Self, RuleError> {
        let set = Self::new(stem, angle, rules);
        if let Some(id) = set.duplicate_ids.first() {
            return Err(RuleError::DuplicatePartId(id.clone()));
        }
        set.check()?;
        Ok(set)
    }

    pub fn stem(&self) -> &StemRule {
        &self.stem
    }

    pub fn angle(&self) -> &AngleRule {
        &self.angle
    }

    /// Part rules in authored order.
    pub fn parts(&self) -> &[PartRule] {
        &self.parts
    }

    pub fn part(&self, part_id: &str) -> Option<&PartRule> {
        self.index.get(part_id).map(|&i| &self.parts[i])
    }

    pub fn contains(&self, part_id: &str) -> bool {
        self.index.contains_key(part_id)
    }

    /// Ids that were authored more than once (later copies were dropped).
    pub fn duplicate_ids(&self) -> &[String] {
        &self.duplicate_ids
    }

    /// Check weights and tolerance deltas.
    pub fn check(&self) -> Result<(), RuleError> {
        if self.stem.contributes_to_score || self.stem.can_cause_fatal {
            self.stem.check("stem")?;
        }
        if self.angle.contributes_to_score || self.angle.can_cause_fatal {
            self.angle.check("angle")?;
        }
        for rule in &self.parts {
            if !(rule.score_weight >= 0.0) {
                return Err(RuleError::InvalidWeight {
                    rule: rule.part_id.clone(),
                    weight: rule.score_weight,
                });
            }
        }
        Ok(())
    }
}

impl From<RuleSetDef> for RuleSet {
    fn from(def: RuleSetDef) -> Self {
        Self::new(def.stem, def.angle, def.parts)
    }
}

impl From<RuleSet> for RuleSetDef {
    fn from(set: RuleSet) -> Self {
        Self {
            stem: set.stem,
            angle: set.angle,
            parts: set.parts,
        }
    }
}
