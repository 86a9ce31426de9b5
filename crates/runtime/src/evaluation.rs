//! # Evaluation Engine
//!
//! Pure, deterministic grading of live part state against a `RuleSet`.
//! Used for live HUD previews and for final grading alike; calling it never
//! changes any state.
//!
//! Table of Contents:
//! 1. Scoring constants and fatal reasons
//! 2. evaluate / evaluate_detailed
//! 3. Stem and angle terms
//! 4. Per-part terms
//!
//! ## Fatal reason ordering
//!
//! Terms run stem -> angle -> parts (authored order) -> deferred
//! special-part check. Every fatal cause overwrites `fatal_reason`, so the
//! reported reason is the last cause recorded, not the first or most
//! severe. `EvaluationBreakdown::fatal_causes` keeps all of them.

use std::collections::HashMap;

use kenzan_common::parts::{shortest_angle_delta, PartInstance, StemInstance};
use kenzan_common::result::{
    EvaluationBreakdown, EvaluationResult, FatalCause, FatalSource, PartTerm, ToleranceTerm,
};
use kenzan_common::rules::{PartCondition, PartKind, PartRule, RuleSet};

// ─────────────────────────────────────────────
// 1. Scoring constants and fatal reasons
// ─────────────────────────────────────────────

/// Score of a missing part whose rule allows it to be missing.
pub const ALLOWED_MISSING_SCORE: f32 = 0.5;

/// Score of a withered part whose rule tolerates withering.
pub const ALLOWED_WITHERED_SCORE: f32 = 0.5;

/// Score of a present part in the wrong condition.
pub const WRONG_CONDITION_SCORE: f32 = 0.2;

pub const REASON_STEM_TOO_SHORT: &str = "Cut too short: the stem was trimmed into the crown";
pub const REASON_STEM_TOO_LONG: &str = "Cut too long: the stem overshoots the arrangement";
pub const REASON_ANGLE: &str = "The cut angle is far off the ideal";
pub const REASON_CROWN_LOST: &str = "The crown was lost";
pub const REASON_SPECIAL_REMOVED: &str = "A special part was removed";

// ─────────────────────────────────────────────
// 2. evaluate / evaluate_detailed
// ─────────────────────────────────────────────

/// Grade the arrangement.
pub fn evaluate(rules: &RuleSet, stem: &StemInstance, parts: &[PartInstance]) -> EvaluationResult {
    evaluate_detailed(rules, stem, parts).result
}

/// Grade the arrangement and keep every intermediate term.
pub fn evaluate_detailed(rules: &RuleSet, stem: &StemInstance, parts: &[PartInstance]) -> EvaluationBreakdown {
    let mut acc = Accumulator::default();

    let stem_term = evaluate_stem(rules, stem, &mut acc);
    let angle_term = evaluate_angle(rules, stem, &mut acc);

    // First live instance wins if gameplay spawned duplicate ids
    let mut live: HashMap<&str, &PartInstance> = HashMap::with_capacity(parts.len());
    for part in parts {
        live.entry(part.part_id.as_str()).or_insert(part);
    }

    let mut special_removed: Option<&str> = None;
    let mut part_terms = Vec::with_capacity(rules.parts().len());

    for rule in rules.parts() {
        let instance = live.get(rule.part_id.as_str()).copied();
        let attached = instance.is_some_and(|p| p.is_attached());

        if rule.kind == PartKind::CriticalCrown && rule.can_cause_fatal && !attached {
            // Keep going so the failure screen still has a score
            acc.fatal(FatalSource::CrownLost { part_id: rule.part_id.clone() }, REASON_CROWN_LOST);
        }

        if rule.is_special && !attached && special_removed.is_none() {
            special_removed = Some(rule.part_id.as_str());
        }

        let score = part_score(rule, instance);
        let weight = rule.score_weight.max(0.0);
        if rule.contributes_to_score {
            acc.add(score, weight);
        }

        part_terms.push(PartTerm {
            part_id: rule.part_id.clone(),
            present: instance.is_some(),
            attached,
            condition: instance.map(|p| p.condition),
            partial_score: score,
            weight,
            contributes: rule.contributes_to_score,
        });
    }

    if !acc.is_fatal {
        if let Some(part_id) = special_removed {
            acc.fatal(
                FatalSource::SpecialPartRemoved { part_id: part_id.to_string() },
                REASON_SPECIAL_REMOVED,
            );
        }
    }

    let ratio = acc.weighted_sum / acc.total_weight;
    let score_normalized = if acc.total_weight > 0.0 && ratio.is_finite() {
        ratio.clamp(0.0, 1.0)
    } else {
        0.0
    };

    EvaluationBreakdown {
        stem: stem_term,
        angle: angle_term,
        parts: part_terms,
        weighted_sum: acc.weighted_sum,
        total_weight: acc.total_weight,
        result: EvaluationResult {
            is_fatal: acc.is_fatal,
            fatal_reason: acc.fatal_reason,
            score_normalized,
        },
        fatal_causes: acc.causes,
    }
}

#[derive(Default)]
struct Accumulator {
    weighted_sum: f32,
    total_weight: f32,
    is_fatal: bool,
    fatal_reason: String,
    causes: Vec<FatalCause>,
}

impl Accumulator {
    fn add(&mut self, score: f32, weight: f32) {
        self.weighted_sum += score * weight;
        self.total_weight += weight;
    }

    /// Last writer wins.
    fn fatal(&mut self, source: FatalSource, reason: &str) {
        self.is_fatal = true;
        self.fatal_reason = reason.to_string();
        self.causes.push(FatalCause {
            source,
            reason: reason.to_string(),
        });
    }
}

// ─────────────────────────────────────────────
// 3. Stem and angle terms
// ─────────────────────────────────────────────

fn evaluate_stem(rules: &RuleSet, stem: &StemInstance, acc: &mut Accumulator) -> Option<ToleranceTerm> {
    let rule = rules.stem();
    if !rule.contributes_to_score {
        return None;
    }

    let measured = stem.current_length();
    let signed_delta = measured - rule.ideal_value;
    let delta = signed_delta.abs();

    if rule.can_cause_fatal && rule.exceeds_hard_fail(delta) {
        if signed_delta < 0.0 {
            acc.fatal(FatalSource::StemTooShort, REASON_STEM_TOO_SHORT);
        } else {
            acc.fatal(FatalSource::StemTooLong, REASON_STEM_TOO_LONG);
        }
    }

    let partial_score = rule.partial_score(delta);
    let weight = rule.score_weight.max(0.0);
    acc.add(partial_score, weight);

    Some(ToleranceTerm {
        measured,
        signed_delta,
        delta,
        partial_score,
        weight,
        perfect: rule.is_perfect(delta),
    })
}

fn evaluate_angle(rules: &RuleSet, stem: &StemInstance, acc: &mut Accumulator) -> Option<ToleranceTerm> {
    let rule = rules.angle();
    if !rule.contributes_to_score {
        return None;
    }

    // Same calibrated value the HUD readout shows
    let measured = stem.calibrated_angle();
    let delta = shortest_angle_delta(measured, rule.ideal_value);

    if rule.can_cause_fatal && rule.exceeds_hard_fail(delta) {
        acc.fatal(FatalSource::Angle, REASON_ANGLE);
    }

    let partial_score = rule.partial_score(delta);
    let weight = rule.score_weight.max(0.0);
    acc.add(partial_score, weight);

    Some(ToleranceTerm {
        measured,
        signed_delta: delta,
        delta,
        partial_score,
        weight,
        perfect: rule.is_perfect(delta),
    })
}

// ─────────────────────────────────────────────
// 4. Per-part terms
// ─────────────────────────────────────────────

/// Score of one part against its rule. Absent instances count as detached.
pub fn part_score(rule: &PartRule, instance: Option<&PartInstance>) -> f32 {
    let Some(part) = instance.filter(|p| p.is_attached()) else {
        return if rule.allowed_missing { ALLOWED_MISSING_SCORE } else { 0.0 };
    };

    if part.condition == rule.ideal_condition {
        1.0
    } else if part.condition == PartCondition::Withered && rule.allowed_withered {
        ALLOWED_WITHERED_SCORE
    } else {
        WRONG_CONDITION_SCORE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bevy::math::Vec3;
    use kenzan_common::parts::DetachReason;
    use kenzan_common::rules::{AngleRule, StemRule};

    fn stem(length: f32, angle: f32) -> StemInstance {
        let mut stem = StemInstance::new(Vec3::ZERO, Vec3::new(0.0, length, 0.0));
        stem.record_raw_angle(angle);
        stem
    }

    fn parts_only(rules: Vec<PartRule>) -> RuleSet {
        RuleSet::new(
            StemRule::default().scored(false),
            AngleRule::default().scored(false),
            rules,
        )
    }

    fn detached(mut part: PartInstance) -> PartInstance {
        part.mark_detached(DetachReason::DeliberateCut, true);
        part
    }

    #[test]
    fn test_perfect_arrangement() {
        let rules = RuleSet::new(
            StemRule::new(10.0, 4.0).fatal(true),
            AngleRule::new(45.0, 30.0).fatal(true),
            vec![PartRule::crown("crown"), PartRule::new("leaf", PartKind::Leaf)],
        );
        let parts = vec![
            PartInstance::new("crown", PartKind::CriticalCrown),
            PartInstance::new("leaf", PartKind::Leaf),
        ];

        let result = evaluate(&rules, &stem(10.0, 45.0), &parts);
        assert!(!result.is_fatal);
        assert!((result.score_normalized - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_stem_direction_reasons() {
        let rules = RuleSet::new(StemRule::new(10.0, 2.0).fatal(true), AngleRule::default().scored(false), Vec::new());

        let short = evaluate(&rules, &stem(7.0, 0.0), &[]);
        assert!(short.is_fatal);
        assert_eq!(short.fatal_reason, REASON_STEM_TOO_SHORT);

        let long = evaluate(&rules, &stem(13.0, 0.0), &[]);
        assert!(long.is_fatal);
        assert_eq!(long.fatal_reason, REASON_STEM_TOO_LONG);

        let edge = evaluate(&rules, &stem(12.0, 0.0), &[]);
        assert!(!edge.is_fatal);
    }

    #[test]
    fn test_angle_wraps_across_zero() {
        let rules = RuleSet::new(
            StemRule::default().scored(false),
            AngleRule::new(350.0, 30.0).fatal(true),
            Vec::new(),
        );

        // 10 degrees vs 350 is a 20 degree error, not 340
        let result = evaluate(&rules, &stem(1.0, 10.0), &[]);
        assert!(!result.is_fatal);
        assert!((result.score_normalized - (1.0 - 20.0 / 30.0)).abs() < 1e-4);
    }

    #[test]
    fn test_angle_uses_calibration() {
        let rules = RuleSet::new(
            StemRule::default().scored(false),
            AngleRule::new(45.0, 10.0).fatal(true),
            Vec::new(),
        );
        let raw = stem(1.0, 30.0);
        assert!(evaluate(&rules, &raw, &[]).is_fatal);

        let calibrated = raw.with_calibration_offset(15.0);
        let result = evaluate(&rules, &calibrated, &[]);
        assert!(!result.is_fatal);
        assert!((result.score_normalized - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_score_bounds_with_extreme_delta() {
        let rules = RuleSet::new(
            StemRule::new(10.0, 1.0),
            AngleRule::new(0.0, 1.0),
            vec![PartRule::new("leaf", PartKind::Leaf)],
        );
        let result = evaluate(&rules, &stem(110.0, 180.0), &[]);
        assert!(result.score_normalized >= 0.0 && result.score_normalized <= 1.0);
        assert_eq!(result.score_normalized, 0.0);
    }

    #[test]
    fn test_missing_part_allowed_scores_half() {
        let rules = parts_only(vec![PartRule::new("leaf", PartKind::Leaf).allow_missing(true).with_weight(2.0)]);

        let breakdown = evaluate_detailed(&rules, &stem(1.0, 0.0), &[]);
        assert!((breakdown.weighted_sum - 0.5 * 2.0).abs() < 1e-6);
        assert!((breakdown.result.score_normalized - 0.5).abs() < 1e-6);
        assert!(!breakdown.parts[0].present);
    }

    #[test]
    fn test_part_condition_scores() {
        let rule = PartRule::new("petal", PartKind::Petal).with_ideal(PartCondition::Perfect);
        let perfect = PartInstance::new("petal", PartKind::Petal).with_condition(PartCondition::Perfect);
        let normal = PartInstance::new("petal", PartKind::Petal);
        let withered = PartInstance::new("petal", PartKind::Petal).with_condition(PartCondition::Withered);

        assert_eq!(part_score(&rule, Some(&perfect)), 1.0);
        assert_eq!(part_score(&rule, Some(&normal)), WRONG_CONDITION_SCORE);
        assert_eq!(part_score(&rule, Some(&withered)), WRONG_CONDITION_SCORE);
        assert_eq!(part_score(&rule, None), 0.0);

        let tolerant = rule.clone().allow_withered(true);
        assert_eq!(part_score(&tolerant, Some(&withered)), ALLOWED_WITHERED_SCORE);
        assert_eq!(part_score(&tolerant, Some(&detached(perfect))), 0.0);
    }

    #[test]
    fn test_condition_away_from_ideal_never_raises_score() {
        let conditions = [PartCondition::Normal, PartCondition::Withered, PartCondition::Perfect];
        for ideal in conditions {
            for allowed_withered in [false, true] {
                let rules = parts_only(vec![
                    PartRule::new("a", PartKind::Leaf).with_ideal(ideal).allow_withered(allowed_withered),
                    PartRule::new("b", PartKind::Leaf),
                ]);
                let at_ideal = vec![
                    PartInstance::new("a", PartKind::Leaf).with_condition(ideal),
                    PartInstance::new("b", PartKind::Leaf),
                ];
                let best = evaluate(&rules, &StemInstance::default(), &at_ideal).score_normalized;

                for other in conditions {
                    let mut parts = at_ideal.clone();
                    parts[0].condition = other;
                    let score = evaluate(&rules, &StemInstance::default(), &parts).score_normalized;
                    assert!(score <= best + 1e-6, "{ideal:?} -> {other:?} raised the score");
                }
            }
        }
    }

    #[test]
    fn test_crown_loss_is_fatal_but_scored() {
        let rules = parts_only(vec![
            PartRule::crown("crown"),
            PartRule::new("leaf", PartKind::Leaf),
        ]);
        let parts = vec![
            detached(PartInstance::new("crown", PartKind::CriticalCrown)),
            PartInstance::new("leaf", PartKind::Leaf),
        ];

        let result = evaluate(&rules, &StemInstance::default(), &parts);
        assert!(result.is_fatal);
        assert_eq!(result.fatal_reason, REASON_CROWN_LOST);
        assert!((result.score_normalized - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_crown_without_fatal_flag_is_just_scored() {
        let rules = parts_only(vec![PartRule::crown("crown").fatal(false)]);
        let result = evaluate(&rules, &StemInstance::default(), &[]);
        assert!(!result.is_fatal);
    }

    #[test]
    fn test_special_part_removed_is_deferred() {
        let rules = parts_only(vec![
            PartRule::new("bud", PartKind::Petal).special(true).scored(false),
            PartRule::new("leaf", PartKind::Leaf),
        ]);
        let parts = vec![PartInstance::new("leaf", PartKind::Leaf)];

        let breakdown = evaluate_detailed(&rules, &StemInstance::default(), &parts);
        assert!(breakdown.result.is_fatal);
        assert_eq!(breakdown.result.fatal_reason, REASON_SPECIAL_REMOVED);
        // Non-contributing parts stay out of the weighted sum
        assert!((breakdown.total_weight - 1.0).abs() < 1e-6);
        assert!((breakdown.result.score_normalized - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_special_check_skipped_when_already_fatal() {
        let rules = parts_only(vec![
            PartRule::crown("crown"),
            PartRule::new("bud", PartKind::Petal).special(true),
        ]);
        let breakdown = evaluate_detailed(&rules, &StemInstance::default(), &[]);
        assert_eq!(breakdown.result.fatal_reason, REASON_CROWN_LOST);
        assert_eq!(breakdown.fatal_causes.len(), 1);
    }

    #[test]
    fn test_last_fatal_reason_wins() {
        let rules = RuleSet::new(
            StemRule::new(10.0, 1.0).fatal(true),
            AngleRule::new(45.0, 5.0).fatal(true),
            Vec::new(),
        );
        let breakdown = evaluate_detailed(&rules, &stem(20.0, 90.0), &[]);

        assert!(breakdown.result.is_fatal);
        assert_eq!(breakdown.result.fatal_reason, REASON_ANGLE);
        assert_eq!(breakdown.first_fatal_cause().unwrap().source, FatalSource::StemTooLong);
        assert_eq!(breakdown.fatal_causes.len(), 2);
    }

    #[test]
    fn test_unmatched_instances_are_invisible() {
        let rules = parts_only(vec![PartRule::new("leaf", PartKind::Leaf)]);
        let parts = vec![
            PartInstance::new("leaf", PartKind::Leaf),
            detached(PartInstance::new("stray", PartKind::CriticalCrown)),
        ];
        let result = evaluate(&rules, &StemInstance::default(), &parts);
        assert!(!result.is_fatal);
        assert!((result.score_normalized - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_zero_weight_scores_zero() {
        let rules = parts_only(Vec::new());
        let result = evaluate(&rules, &StemInstance::default(), &[]);
        assert_eq!(result.score_normalized, 0.0);
        assert!(!result.is_fatal);
    }

    #[test]
    fn test_nan_measurements_score_zero() {
        let rules = RuleSet::new(
            StemRule::new(10.0, 4.0).fatal(true),
            AngleRule::new(45.0, 30.0).fatal(true),
            vec![PartRule::new("leaf", PartKind::Leaf)],
        );
        let parts = vec![PartInstance::new("leaf", PartKind::Leaf)];
        let stem = stem(f32::NAN, f32::NAN);

        let breakdown = evaluate_detailed(&rules, &stem, &parts);
        assert_eq!(breakdown.stem.as_ref().map(|t| t.partial_score), Some(0.0));
        assert_eq!(breakdown.angle.as_ref().map(|t| t.partial_score), Some(0.0));
        assert!((breakdown.result.score_normalized - 1.0 / 3.0).abs() < 1e-5);
    }

    #[test]
    fn test_evaluation_is_repeatable() {
        let rules = RuleSet::new(
            StemRule::new(10.0, 4.0),
            AngleRule::new(45.0, 30.0),
            vec![PartRule::new("leaf", PartKind::Leaf).allow_withered(true)],
        );
        let parts = vec![PartInstance::new("leaf", PartKind::Leaf).with_condition(PartCondition::Withered)];
        let stem = stem(11.0, 50.0);

        let first = evaluate(&rules, &stem, &parts);
        let second = evaluate(&rules, &stem, &parts);
        assert_eq!(first, second);
    }
}
