//! # Detachment Authority
//!
//! The single gate through which a part goes from attached to detached.
//!
//! ```text
//! Attached ──try_detach──▶ Detached ──(permanent)──▶ PermanentlyDetached
//!     ▲                                                      │
//!     └──────────────────── never ◀──────────────────────────┘
//! ```
//!
//! Physical event sources (joint breaks, tears, swaps) depend only on the
//! `DetachmentSink` trait. The authority performs the transition and reports
//! whether the part was the critical crown; the session controller turns a
//! crown loss into an immediate fatal end. That check is separate from the
//! evaluation engine's lazy crown rule: one fires the instant the crown
//! goes, the other grades the arrangement afterwards.

use std::collections::HashMap;

use kenzan_common::parts::{DetachReason, PartInstance};
use kenzan_common::rules::PartCondition;
use tracing::{debug, info, warn};

// ============================================================================
// Sink Trait
// ============================================================================

/// Narrow interface for anything that reports physical separation.
pub trait DetachmentSink {
    /// Request the attached -> detached transition.
    ///
    /// Returns `true` only if the transition actually happened.
    fn try_detach(&mut self, part_id: &str, human_reason: &str, reason: DetachReason, permanent: bool) -> bool;
}

// ============================================================================
// Part Roster
// ============================================================================

/// Live parts in spawn order, indexed by id.
#[derive(Clone, Debug, Default)]
pub struct PartRoster {
    parts: Vec<PartInstance>,
    index: HashMap<String, usize>,
}

impl PartRoster {
    pub fn new(parts: impl IntoIterator<Item = PartInstance>) -> Self {
        let mut roster = Self::default();
        for part in parts {
            if let Err(duplicate) = roster.insert(part) {
                warn!(part_id = %duplicate.part_id, "Duplicate live part id ignored");
            }
        }
        roster
    }

    /// Add a part. A part with an id already in the roster is rejected and
    /// handed back.
    pub fn insert(&mut self, part: PartInstance) -> Result<(), PartInstance> {
        if self.index.contains_key(&part.part_id) {
            return Err(part);
        }
        self.index.insert(part.part_id.clone(), self.parts.len());
        self.parts.push(part);
        Ok(())
    }

    /// Remove a fully destroyed part. Its rule will judge it as missing.
    pub fn remove(&mut self, part_id: &str) -> Option<PartInstance> {
        let position = self.index.remove(part_id)?;
        let part = self.parts.remove(position);
        for slot in self.index.values_mut() {
            if *slot > position {
                *slot -= 1;
            }
        }
        Some(part)
    }

    pub fn get(&self, part_id: &str) -> Option<&PartInstance> {
        self.index.get(part_id).map(|&i| &self.parts[i])
    }

    fn get_mut(&mut self, part_id: &str) -> Option<&mut PartInstance> {
        self.index.get(part_id).map(|&i| &mut self.parts[i])
    }

    /// Gameplay-driven condition change. Returns `false` for unknown ids.
    pub fn set_condition(&mut self, part_id: &str, condition: PartCondition) -> bool {
        match self.get_mut(part_id) {
            Some(part) => {
                part.condition = condition;
                true
            }
            None => false,
        }
    }

    pub fn as_slice(&self) -> &[PartInstance] {
        &self.parts
    }

    pub fn iter(&self) -> impl Iterator<Item = &PartInstance> {
        self.parts.iter()
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn attached_count(&self) -> usize {
        self.parts.iter().filter(|p| p.is_attached()).count()
    }
}

// ============================================================================
// Authority
// ============================================================================

/// What a detach request did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DetachOutcome {
    /// Grace window active; nothing changed
    Suppressed,
    /// Already detached; nothing changed
    AlreadyDetached,
    /// No live part with that id
    UnknownPart,
    /// Transition happened
    Detached {
        permanent: bool,
        /// Set when the lost part is the critical crown
        critical_loss: Option<String>,
    },
}

impl DetachOutcome {
    pub fn transitioned(&self) -> bool {
        matches!(self, DetachOutcome::Detached { .. })
    }
}

/// Counters for diagnostics and tests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DetachmentStats {
    pub transitions: u32,
    pub suppressed: u32,
    pub redundant: u32,
    pub critical_losses: u32,
}

/// Owns the live parts and every attached -> detached transition.
#[derive(Clone, Debug, Default)]
pub struct DetachmentAuthority {
    roster: PartRoster,
    stats: DetachmentStats,
}

impl DetachmentAuthority {
    pub fn new(roster: PartRoster) -> Self {
        Self {
            roster,
            stats: DetachmentStats::default(),
        }
    }

    pub fn roster(&self) -> &PartRoster {
        &self.roster
    }

    /// Gameplay mutations other than detaching go through here.
    pub fn roster_mut(&mut self) -> &mut PartRoster {
        &mut self.roster
    }

    pub fn stats(&self) -> DetachmentStats {
        self.stats
    }

    /// Perform the transition if allowed.
    ///
    /// `suppressed` comes from the owning session's grace window.
    pub fn try_detach(
        &mut self,
        part_id: &str,
        human_reason: &str,
        reason: DetachReason,
        permanent: bool,
        suppressed: bool,
    ) -> DetachOutcome {
        if suppressed {
            self.stats.suppressed += 1;
            debug!(part_id, ?reason, "Detach suppressed by grace window");
            return DetachOutcome::Suppressed;
        }

        let Some(part) = self.roster.get_mut(part_id) else {
            debug!(part_id, "Detach requested for unknown part");
            return DetachOutcome::UnknownPart;
        };

        if !part.mark_detached(reason, permanent) {
            self.stats.redundant += 1;
            debug!(part_id, ?reason, "Detach ignored, part already detached");
            return DetachOutcome::AlreadyDetached;
        }

        self.stats.transitions += 1;
        info!(part_id, ?reason, permanent, human_reason, "Part detached");

        // The one hard immediate-fail rule
        let critical_loss = if part.is_critical() {
            self.stats.critical_losses += 1;
            Some(crown_loss_reason(human_reason))
        } else {
            None
        };

        DetachOutcome::Detached {
            permanent,
            critical_loss,
        }
    }
}

fn crown_loss_reason(human_reason: &str) -> String {
    if human_reason.trim().is_empty() {
        crate::evaluation::REASON_CROWN_LOST.to_string()
    } else {
        human_reason.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kenzan_common::rules::PartKind;

    fn authority() -> DetachmentAuthority {
        DetachmentAuthority::new(PartRoster::new(vec![
            PartInstance::new("crown", PartKind::CriticalCrown),
            PartInstance::new("leaf_1", PartKind::Leaf),
            PartInstance::new("leaf_2", PartKind::Leaf),
        ]))
    }

    #[test]
    fn test_detach_once() {
        let mut authority = authority();

        let first = authority.try_detach("leaf_1", "snipped", DetachReason::DeliberateCut, true, false);
        assert_eq!(first, DetachOutcome::Detached { permanent: true, critical_loss: None });

        let second = authority.try_detach("leaf_1", "torn", DetachReason::AccidentalTear, true, false);
        assert_eq!(second, DetachOutcome::AlreadyDetached);

        let part = authority.roster().get("leaf_1").unwrap();
        assert!(!part.is_attached());
        assert!(part.is_permanently_detached());
        assert_eq!(part.last_detach_reason(), DetachReason::DeliberateCut);
        assert_eq!(authority.stats().transitions, 1);
        assert_eq!(authority.stats().redundant, 1);
    }

    #[test]
    fn test_suppressed_changes_nothing() {
        let mut authority = authority();
        let outcome = authority.try_detach("leaf_2", "", DetachReason::PhysicalBreak, true, true);
        assert_eq!(outcome, DetachOutcome::Suppressed);
        assert!(authority.roster().get("leaf_2").unwrap().is_attached());
    }

    #[test]
    fn test_transient_detach_keeps_reattach_possible() {
        let mut authority = authority();
        authority.try_detach("leaf_2", "swap", DetachReason::ComponentSwap, false, false);
        let part = authority.roster().get("leaf_2").unwrap();
        assert!(!part.is_attached());
        assert!(part.can_reattach());
    }

    #[test]
    fn test_crown_loss_reported() {
        let mut authority = authority();
        let outcome = authority.try_detach("crown", "", DetachReason::PhysicalBreak, true, false);
        assert_eq!(
            outcome,
            DetachOutcome::Detached {
                permanent: true,
                critical_loss: Some(crate::evaluation::REASON_CROWN_LOST.to_string()),
            }
        );

        let again = authority.try_detach("crown", "", DetachReason::PhysicalBreak, true, false);
        assert_eq!(again, DetachOutcome::AlreadyDetached);
        assert_eq!(authority.stats().critical_losses, 1);
    }

    #[test]
    fn test_structural_anchor_counts_as_crown() {
        let mut authority = DetachmentAuthority::new(PartRoster::new(vec![
            PartInstance::new("pin", PartKind::MainStem).with_structural_anchor(true),
        ]));
        let outcome = authority.try_detach("pin", "The pin snapped", DetachReason::PhysicalBreak, true, false);
        assert_eq!(
            outcome,
            DetachOutcome::Detached {
                permanent: true,
                critical_loss: Some("The pin snapped".to_string()),
            }
        );
    }

    #[test]
    fn test_roster_remove_reindexes() {
        let mut roster = PartRoster::new(vec![
            PartInstance::new("a", PartKind::Leaf),
            PartInstance::new("b", PartKind::Leaf),
            PartInstance::new("c", PartKind::Leaf),
        ]);
        assert!(roster.remove("a").is_some());
        assert_eq!(roster.get("c").unwrap().part_id, "c");
        assert!(roster.set_condition("b", PartCondition::Withered));
        assert_eq!(roster.get("b").unwrap().condition, PartCondition::Withered);
        assert!(!roster.set_condition("a", PartCondition::Withered));
        assert!(roster.insert(PartInstance::new("b", PartKind::Petal)).is_err());
    }
}
