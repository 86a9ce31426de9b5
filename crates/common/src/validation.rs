//! # Authoring Validation
//!
//! Best-effort checks of authored rules against the live part roster.
//! Issues are surfaced to authors; none of them stop a session.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::parts::PartInstance;
use crate::rules::{PartKind, RuleSet, ToleranceRule};

/// One authoring defect.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum AuthoringIssue {
    DuplicatePartId(String),
    /// Rule with no live instance; it will be judged as missing
    RuleWithoutPart(String),
    /// Live instance with no rule; invisible to scoring
    PartWithoutRule(String),
    PerfectExceedsHardFail { rule: String, perfect: f32, hard_fail: f32 },
    NonPositiveHardFail { rule: String, delta: f32 },
    NegativeWeight { rule: String, weight: f32 },
    MultipleCrowns(Vec<String>),
    /// No scored term has weight, so every score normalizes to 0
    ZeroTotalWeight,
}

impl fmt::Display for AuthoringIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicatePartId(id) => write!(f, "duplicate part rule id '{id}'"),
            Self::RuleWithoutPart(id) => write!(f, "rule '{id}' has no live part"),
            Self::PartWithoutRule(id) => write!(f, "live part '{id}' has no rule"),
            Self::PerfectExceedsHardFail { rule, perfect, hard_fail } => {
                write!(f, "{rule}: perfect delta {perfect} > hard fail delta {hard_fail}")
            }
            Self::NonPositiveHardFail { rule, delta } => {
                write!(f, "{rule}: hard fail delta {delta} must be positive")
            }
            Self::NegativeWeight { rule, weight } => write!(f, "{rule}: negative weight {weight}"),
            Self::MultipleCrowns(ids) => write!(f, "more than one critical crown rule: {ids:?}"),
            Self::ZeroTotalWeight => write!(f, "no scored term carries weight"),
        }
    }
}

/// Collected authoring issues.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub issues: Vec<AuthoringIssue>,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn contains(&self, issue: &AuthoringIssue) -> bool {
        self.issues.contains(issue)
    }

    /// Emit every issue as a warning.
    pub fn log(&self) {
        for issue in &self.issues {
            warn!("Authoring issue: {issue}");
        }
    }
}

impl RuleSet {
    /// Validate the rules alone.
    pub fn validate(&self) -> ValidationReport {
        let mut report = ValidationReport::default();

        for id in self.duplicate_ids() {
            report.issues.push(AuthoringIssue::DuplicatePartId(id.clone()));
        }

        check_tolerance(&mut report, "stem", self.stem());
        check_tolerance(&mut report, "angle", self.angle());

        let mut total_weight = 0.0;
        if self.stem().contributes_to_score {
            total_weight += self.stem().score_weight.max(0.0);
        }
        if self.angle().contributes_to_score {
            total_weight += self.angle().score_weight.max(0.0);
        }

        let mut crowns = Vec::new();
        for rule in self.parts() {
            if rule.score_weight < 0.0 {
                report.issues.push(AuthoringIssue::NegativeWeight {
                    rule: rule.part_id.clone(),
                    weight: rule.score_weight,
                });
            }
            if rule.contributes_to_score {
                total_weight += rule.score_weight.max(0.0);
            }
            if rule.kind == PartKind::CriticalCrown {
                crowns.push(rule.part_id.clone());
            }
        }

        if crowns.len() > 1 {
            report.issues.push(AuthoringIssue::MultipleCrowns(crowns));
        }
        if total_weight <= 0.0 {
            report.issues.push(AuthoringIssue::ZeroTotalWeight);
        }

        report
    }

    /// Validate the rules and cross-check them against live parts.
    pub fn validate_against<'a>(&self, parts: impl IntoIterator<Item = &'a PartInstance>) -> ValidationReport {
        let mut report = self.validate();

        let live: HashSet<&str> = parts.into_iter().map(|p| p.part_id.as_str()).collect();

        for rule in self.parts() {
            if !live.contains(rule.part_id.as_str()) {
                report.issues.push(AuthoringIssue::RuleWithoutPart(rule.part_id.clone()));
            }
        }

        let mut unmatched: Vec<&str> = live.into_iter().filter(|id| !self.contains(id)).collect();
        unmatched.sort_unstable();
        for id in unmatched {
            report.issues.push(AuthoringIssue::PartWithoutRule(id.to_string()));
        }

        report
    }
}

fn check_tolerance(report: &mut ValidationReport, name: &str, rule: &ToleranceRule) {
    if !rule.contributes_to_score && !rule.can_cause_fatal {
        return;
    }
    if rule.hard_fail_delta <= 0.0 {
        report.issues.push(AuthoringIssue::NonPositiveHardFail {
            rule: name.to_string(),
            delta: rule.hard_fail_delta,
        });
    }
    if rule.perfect_delta > rule.hard_fail_delta {
        report.issues.push(AuthoringIssue::PerfectExceedsHardFail {
            rule: name.to_string(),
            perfect: rule.perfect_delta,
            hard_fail: rule.hard_fail_delta,
        });
    }
    if rule.score_weight < 0.0 {
        report.issues.push(AuthoringIssue::NegativeWeight {
            rule: name.to_string(),
            weight: rule.score_weight,
        });
    }
}
