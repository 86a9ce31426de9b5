//! # Session Controller
//!
//! Owns one bounded trimming attempt from start to a committed result.
//!
//! Table of Contents:
//! 1. SessionPhase — lifecycle state machine
//! 2. SessionBuilder — collaborators and authored data for a new session
//! 3. SessionController — lifecycle entry points
//! 4. Ending — guards, dramatic failure sequencing, result application
//! 5. Detachment — sink wiring and the immediate crown-loss path
//!
//! ## Lifecycle
//!
//! ```text
//! Active ──evaluate_now / force_fatal_end──▶ EndRequested ──apply──▶ ResultApplied
//! ```
//!
//! Both transitions fire once. The end guard and the apply guard are
//! separate because a dramatic failure sequence delays application well
//! after the end was requested. A second end request is a defect: it is
//! logged with both call sites and rejected, and the first result stands.

use std::time::Duration;

use bevy::math::Vec3;
use kenzan_common::config::{SessionConfig, TrimProfile};
use kenzan_common::outcome::OutcomeMapping;
use kenzan_common::parts::{DetachReason, PartInstance, StemInstance};
use kenzan_common::result::{EvaluationBreakdown, EvaluationResult, FinalOutcome};
use kenzan_common::rules::{PartCondition, RuleSet};
use kenzan_common::validation::ValidationReport;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::detachment::{DetachOutcome, DetachmentAuthority, DetachmentSink, DetachmentStats, PartRoster};
use crate::error::{CallSite, SessionError};
use crate::evaluation;
use crate::observer::SessionObserver;
use crate::physics::{NullPhysics, PhysicsBridge};
use crate::registry::SessionLease;
use crate::time_scale::{NullTimeScale, TimePriority, TimeScaleArbiter};
use crate::timers::{FailureSequence, FallWatchdog, GraceWindow, SequenceStage};

// ─────────────────────────────────────────────
// 1. SessionPhase
// ─────────────────────────────────────────────

/// Lifecycle phase. Transitions are one-way.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SessionPhase {
    #[default]
    Active,
    EndRequested,
    ResultApplied,
}

// ─────────────────────────────────────────────
// 2. SessionBuilder
// ─────────────────────────────────────────────

/// Everything a session needs. Opened through `SessionRegistry::open`.
pub struct SessionBuilder {
    rules: RuleSet,
    outcome: OutcomeMapping,
    config: SessionConfig,
    stem: StemInstance,
    parts: Vec<PartInstance>,
    time_scale: Box<dyn TimeScaleArbiter>,
    physics: Box<dyn PhysicsBridge>,
    observers: Vec<Box<dyn SessionObserver>>,
    timed_sequences: bool,
}

impl SessionBuilder {
    pub fn new(rules: RuleSet, stem: StemInstance) -> Self {
        Self {
            rules,
            outcome: OutcomeMapping::default(),
            config: SessionConfig::default(),
            stem,
            parts: Vec::new(),
            time_scale: Box::new(NullTimeScale),
            physics: Box::new(NullPhysics),
            observers: Vec::new(),
            timed_sequences: true,
        }
    }

    /// Rules, outcome mapping and timing from an authored profile.
    pub fn from_profile(profile: &TrimProfile, stem: StemInstance) -> Self {
        Self::new(profile.rules.clone(), stem)
            .outcome(profile.outcome.clone())
            .config(profile.session.clone())
    }

    pub fn outcome(mut self, outcome: OutcomeMapping) -> Self {
        self.outcome = outcome;
        self
    }

    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn part(mut self, part: PartInstance) -> Self {
        self.parts.push(part);
        self
    }

    pub fn parts(mut self, parts: impl IntoIterator<Item = PartInstance>) -> Self {
        self.parts.extend(parts);
        self
    }

    pub fn time_scale(mut self, arbiter: impl TimeScaleArbiter + 'static) -> Self {
        self.time_scale = Box::new(arbiter);
        self
    }

    pub fn physics(mut self, bridge: impl PhysicsBridge + 'static) -> Self {
        self.physics = Box::new(bridge);
        self
    }

    pub fn observer(mut self, observer: impl SessionObserver + 'static) -> Self {
        self.observers.push(Box::new(observer));
        self
    }

    /// Whether something will tick this session. Without ticks, forced
    /// failures apply their result synchronously.
    pub fn timed_sequences(mut self, enabled: bool) -> Self {
        self.timed_sequences = enabled;
        self
    }

    pub(crate) fn build(self, lease: SessionLease) -> SessionController {
        let validation = self.rules.validate_against(&self.parts);
        validation.log();

        let attempt_id = lease.attempt_id();
        info!(
            attempt = %attempt_id,
            parts = self.parts.len(),
            rules = self.rules.parts().len(),
            "Trim session started"
        );

        SessionController {
            attempt_id,
            rules: self.rules,
            outcome: self.outcome,
            config: self.config,
            stem: self.stem,
            authority: DetachmentAuthority::new(PartRoster::new(self.parts)),
            phase: SessionPhase::Active,
            end_requested_at: None,
            applied_at: None,
            grace: GraceWindow::default(),
            sequence: None,
            pending: None,
            watchdog: None,
            final_outcome: None,
            validation,
            time_scale: self.time_scale,
            holds_time_scale: false,
            physics: self.physics,
            observers: self.observers,
            timed_sequences: self.timed_sequences,
            _lease: lease,
        }
    }
}

// ─────────────────────────────────────────────
// 3. SessionController
// ─────────────────────────────────────────────

/// Lifecycle manager for one attempt.
pub struct SessionController {
    attempt_id: Uuid,
    rules: RuleSet,
    outcome: OutcomeMapping,
    config: SessionConfig,
    stem: StemInstance,
    authority: DetachmentAuthority,
    phase: SessionPhase,
    end_requested_at: Option<CallSite>,
    applied_at: Option<CallSite>,
    grace: GraceWindow,
    sequence: Option<FailureSequence>,
    /// Result computed at the end request, waiting on the sequence
    pending: Option<(EvaluationResult, CallSite)>,
    watchdog: Option<FallWatchdog>,
    final_outcome: Option<FinalOutcome>,
    validation: ValidationReport,
    time_scale: Box<dyn TimeScaleArbiter>,
    holds_time_scale: bool,
    physics: Box<dyn PhysicsBridge>,
    observers: Vec<Box<dyn SessionObserver>>,
    timed_sequences: bool,
    _lease: SessionLease,
}

impl SessionController {
    pub fn attempt_id(&self) -> Uuid {
        self.attempt_id
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn is_active(&self) -> bool {
        self.phase == SessionPhase::Active
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn validation_report(&self) -> &ValidationReport {
        &self.validation
    }

    pub fn final_outcome(&self) -> Option<&FinalOutcome> {
        self.final_outcome.as_ref()
    }

    /// Stage of a running failure sequence.
    pub fn failure_stage(&self) -> Option<SequenceStage> {
        self.sequence.as_ref().map(FailureSequence::stage)
    }

    // Live state ------------------------------------------------------------

    pub fn stem(&self) -> &StemInstance {
        &self.stem
    }

    pub fn stem_mut(&mut self) -> &mut StemInstance {
        &mut self.stem
    }

    /// A cut relocates the stem tip and records the new raw angle.
    pub fn record_cut(&mut self, tip_position: Vec3, raw_angle: f32) {
        self.stem.apply_cut(tip_position, raw_angle);
        debug!(
            attempt = %self.attempt_id,
            length = self.stem.current_length(),
            angle = self.stem.calibrated_angle(),
            "Cut recorded"
        );
    }

    pub fn parts(&self) -> &PartRoster {
        self.authority.roster()
    }

    pub fn part(&self, part_id: &str) -> Option<&PartInstance> {
        self.authority.roster().get(part_id)
    }

    pub fn set_part_condition(&mut self, part_id: &str, condition: PartCondition) -> Result<(), SessionError> {
        if self.authority.roster_mut().set_condition(part_id, condition) {
            Ok(())
        } else {
            Err(SessionError::UnknownPart(part_id.to_string()))
        }
    }

    /// Drop a fully destroyed part from the live set. Its rule still
    /// judges it as missing.
    pub fn remove_part(&mut self, part_id: &str) -> Option<PartInstance> {
        let removed = self.authority.roster_mut().remove(part_id);
        if removed.is_some() {
            debug!(attempt = %self.attempt_id, part_id, "Part destroyed and removed");
        }
        removed
    }

    pub fn detachment_stats(&self) -> DetachmentStats {
        self.authority.stats()
    }

    // Grace window ----------------------------------------------------------

    /// Suppress detachment for `duration` of real time. Call right after a
    /// deliberate cut so the physical aftermath cannot fail the session.
    pub fn request_grace_period(&mut self, duration: Duration) {
        self.grace.open(duration);
        debug!(attempt = %self.attempt_id, ?duration, "Grace window opened");
    }

    pub fn request_default_grace_period(&mut self) {
        self.request_grace_period(self.config.grace_period());
    }

    pub fn is_detachment_suppressed(&self) -> bool {
        self.grace.is_active()
    }

    // Evaluation ------------------------------------------------------------

    fn evaluate_current(&self) -> EvaluationResult {
        evaluation::evaluate(&self.rules, &self.stem, self.authority.roster().as_slice())
    }

    pub fn evaluate_detailed(&self) -> EvaluationBreakdown {
        evaluation::evaluate_detailed(&self.rules, &self.stem, self.authority.roster().as_slice())
    }

    /// Non-authoritative live evaluation, published to observers.
    pub fn preview(&mut self) -> EvaluationResult {
        let result = self.evaluate_current();
        for observer in &mut self.observers {
            observer.on_preview(self.attempt_id, &result);
        }
        result
    }

    /// Grade now. The player's "done" button.
    #[track_caller]
    pub fn evaluate_now(&mut self) -> Result<FinalOutcome, SessionError> {
        let site = CallSite::here();
        self.request_end(site)?;
        self.watchdog = None;

        let result = self.evaluate_current();
        info!(
            attempt = %self.attempt_id,
            score = result.score_normalized,
            fatal = result.is_fatal,
            "Session graded"
        );
        self.apply_result(result, site)
    }

    /// The only entry point for an immediate, non-graded failure.
    #[track_caller]
    pub fn force_fatal_end(&mut self, reason: impl Into<String>) -> Result<(), SessionError> {
        self.begin_fatal_end(reason.into(), CallSite::here())
    }

    /// Release a part so it can fall, and arm a watchdog that forces the
    /// fatal end with `reason` if nothing else ends the session within
    /// `timeout` of real time.
    #[track_caller]
    pub fn release_and_await_fall(
        &mut self,
        part_id: &str,
        reason: impl Into<String>,
        timeout: Duration,
    ) -> Result<(), SessionError> {
        let site = CallSite::here();
        if let Some(first) = self.end_requested_at {
            warn!(attempt = %self.attempt_id, part_id, "Release ignored, session already ended");
            return Err(SessionError::AlreadyEnded { first, second: site });
        }
        if self.part(part_id).is_none() {
            return Err(SessionError::UnknownPart(part_id.to_string()));
        }

        if let Some(previous) = &self.watchdog {
            warn!(attempt = %self.attempt_id, previous = %previous.part_id, "Replacing armed fall watchdog");
        }

        self.physics.release_hold(part_id);
        self.watchdog = Some(FallWatchdog::new(part_id, reason, timeout, site.0));
        info!(attempt = %self.attempt_id, part_id, ?timeout, "Part released, awaiting fall");
        Ok(())
    }

    /// Whether a fall watchdog is armed.
    pub fn is_awaiting_fall(&self) -> bool {
        self.watchdog.is_some()
    }

    /// Advance timed behaviour by real (unscaled) time.
    pub fn tick(&mut self, real_delta: Duration) {
        if self.grace.tick(real_delta) {
            debug!(attempt = %self.attempt_id, "Grace window closed");
        }

        self.advance_sequence(real_delta);

        let expired = self.watchdog.as_mut().is_some_and(|w| w.tick(real_delta));
        if expired {
            if let Some(watchdog) = self.watchdog.take() {
                warn!(
                    attempt = %self.attempt_id,
                    part_id = %watchdog.part_id,
                    "Fall trigger never fired, watchdog forcing the end"
                );
                let site = CallSite(watchdog.armed_at());
                let _ = self.begin_fatal_end(watchdog.reason, site);
            }
        }
    }

    /// Release any failure-priority time scale this session holds.
    pub fn release_time_scale(&mut self) {
        if self.holds_time_scale {
            self.time_scale.release(TimePriority::Failure);
            self.holds_time_scale = false;
        }
    }

    // ─────────────────────────────────────────────
    // 4. Ending
    // ─────────────────────────────────────────────

    fn request_end(&mut self, site: CallSite) -> Result<(), SessionError> {
        if let Some(first) = self.end_requested_at {
            error!(
                attempt = %self.attempt_id,
                %first,
                second = %site,
                "Session end requested twice, second request rejected"
            );
            return Err(SessionError::AlreadyEnded { first, second: site });
        }
        self.end_requested_at = Some(site);
        self.phase = SessionPhase::EndRequested;
        self.grace.clear();
        Ok(())
    }

    fn begin_fatal_end(&mut self, reason: String, site: CallSite) -> Result<(), SessionError> {
        self.request_end(site)?;
        self.watchdog = None;

        // Determined now; only the presentation is delayed
        let score = self.evaluate_current().score_normalized;
        let result = EvaluationResult::fatal(reason, score);
        info!(attempt = %self.attempt_id, reason = %result.fatal_reason, score, "Forced fatal end");

        let dramatic = &self.config.dramatic_failure;
        if dramatic.enabled && self.timed_sequences {
            self.time_scale.request(TimePriority::Failure, dramatic.slow_motion_scale);
            self.holds_time_scale = true;
            self.sequence = Some(FailureSequence::new(
                dramatic.slow_motion_duration(),
                dramatic.pause_hold(),
            ));
            self.pending = Some((result, site));
            self.advance_sequence(Duration::ZERO);
            Ok(())
        } else {
            self.apply_result(result, site).map(|_| ())
        }
    }

    fn advance_sequence(&mut self, real_delta: Duration) {
        let Some(sequence) = self.sequence.as_mut() else {
            return;
        };
        let steps = sequence.advance(real_delta);

        if steps.request_pause {
            self.time_scale.request(TimePriority::Failure, 0.0);
            self.holds_time_scale = true;
            debug!(attempt = %self.attempt_id, "Failure sequence paused");
        }

        if steps.apply_result {
            if let Some((result, site)) = self.pending.take() {
                let _ = self.apply_result(result, site);
            }
        }
    }

    fn apply_result(&mut self, result: EvaluationResult, site: CallSite) -> Result<FinalOutcome, SessionError> {
        if let Some(first) = self.applied_at {
            error!(
                attempt = %self.attempt_id,
                %first,
                second = %site,
                "Session result applied twice, second application rejected"
            );
            return Err(SessionError::AlreadyApplied { first, second: site });
        }
        self.applied_at = Some(site);

        let soft_failed = result.is_fatal && self.outcome.soft_fail;
        let result = if soft_failed {
            info!(attempt = %self.attempt_id, reason = %result.fatal_reason, "Soft-fail policy downgraded fatal result");
            result.downgraded()
        } else {
            result
        };

        // Mapped even when fatal so the failure screen has numbers
        let score = result.score_normalized;
        let outcome = FinalOutcome {
            score: self.outcome.final_score(score),
            reward: self.outcome.reward(score),
            is_fatal: result.is_fatal,
            reason: result.fatal_reason,
            score_normalized: score,
            soft_failed,
        };

        if outcome.is_fatal {
            self.physics.freeze_subgraph(self.config.disable_collisions_on_fail);
        } else {
            self.release_time_scale();
        }

        self.phase = SessionPhase::ResultApplied;
        info!(
            attempt = %self.attempt_id,
            score = outcome.score,
            reward = outcome.reward,
            fatal = outcome.is_fatal,
            "Session result applied"
        );

        for observer in &mut self.observers {
            observer.on_outcome(self.attempt_id, &outcome);
        }
        self.final_outcome = Some(outcome.clone());
        Ok(outcome)
    }

    // ─────────────────────────────────────────────
    // 5. Detachment
    // ─────────────────────────────────────────────

    /// Route a detach request through the authority. Losing the critical
    /// crown forces the fatal end right here, before any grading call.
    #[track_caller]
    pub fn detach(&mut self, part_id: &str, human_reason: &str, reason: DetachReason, permanent: bool) -> DetachOutcome {
        let site = CallSite::here();
        let suppressed = self.grace.is_active();
        let outcome = self.authority.try_detach(part_id, human_reason, reason, permanent, suppressed);

        if let DetachOutcome::Detached { critical_loss: Some(fatal_reason), .. } = &outcome {
            let _ = self.begin_fatal_end(fatal_reason.clone(), site);
        }
        outcome
    }
}

impl DetachmentSink for SessionController {
    #[track_caller]
    fn try_detach(&mut self, part_id: &str, human_reason: &str, reason: DetachReason, permanent: bool) -> bool {
        self.detach(part_id, human_reason, reason, permanent).transitioned()
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        if self.sequence.as_ref().is_some_and(|s| !s.is_finished()) {
            warn!(attempt = %self.attempt_id, "Session torn down during its failure sequence");
        }
        self.release_time_scale();
    }
}

impl std::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("attempt_id", &self.attempt_id)
            .field("phase", &self.phase)
            .field("parts", &self.authority.roster().len())
            .field("final_outcome", &self.final_outcome)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::OutcomeMailbox;
    use crate::physics::{PhysicsCommand, PhysicsCommandQueue};
    use crate::registry::SessionRegistry;
    use crate::time_scale::TimeScaleStack;
    use kenzan_common::config::DramaticFailureConfig;
    use kenzan_common::rules::{AngleRule, PartKind, PartRule, StemRule};

    struct Harness {
        registry: SessionRegistry,
        time: TimeScaleStack,
        physics: PhysicsCommandQueue,
        mailbox: OutcomeMailbox,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                registry: SessionRegistry::new(),
                time: TimeScaleStack::new(),
                physics: PhysicsCommandQueue::new(),
                mailbox: OutcomeMailbox::new(),
            }
        }

        fn rules() -> RuleSet {
            RuleSet::new(
                StemRule::new(10.0, 4.0),
                AngleRule::new(45.0, 30.0),
                vec![
                    PartRule::crown("crown"),
                    PartRule::new("leaf_1", PartKind::Leaf),
                    PartRule::new("leaf_2", PartKind::Leaf).allow_missing(true),
                ],
            )
        }

        fn builder(&self, dramatic: DramaticFailureConfig) -> SessionBuilder {
            let mut stem = StemInstance::new(Vec3::ZERO, Vec3::new(0.0, 10.0, 0.0));
            stem.record_raw_angle(45.0);
            SessionBuilder::new(Self::rules(), stem)
                .parts(vec![
                    PartInstance::new("crown", PartKind::CriticalCrown),
                    PartInstance::new("leaf_1", PartKind::Leaf),
                    PartInstance::new("leaf_2", PartKind::Leaf),
                ])
                .outcome(OutcomeMapping::days(1.0, 10.0))
                .config(SessionConfig {
                    dramatic_failure: dramatic,
                    ..Default::default()
                })
                .time_scale(self.time.clone())
                .physics(self.physics.clone())
                .observer(self.mailbox.clone())
        }

        fn open(&self, dramatic: DramaticFailureConfig) -> SessionController {
            self.registry.open(self.builder(dramatic)).unwrap()
        }
    }

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    #[test]
    fn test_evaluate_now_applies_once() {
        let h = Harness::new();
        let mut session = h.open(DramaticFailureConfig::disabled());

        let outcome = session.evaluate_now().unwrap();
        assert!(!outcome.is_fatal);
        assert_eq!(outcome.score, 100);
        assert_eq!(outcome.reward, 10);
        assert_eq!(session.phase(), SessionPhase::ResultApplied);

        let second = session.evaluate_now();
        assert!(matches!(second, Err(SessionError::AlreadyEnded { .. })));
        let late_fatal = session.force_fatal_end("too late");
        assert!(matches!(late_fatal, Err(SessionError::AlreadyEnded { .. })));

        assert_eq!(h.mailbox.outcome_count(), 1);
        assert!(!session.final_outcome().unwrap().is_fatal);
    }

    #[test]
    fn test_double_end_reports_both_sites() {
        let h = Harness::new();
        let mut session = h.open(DramaticFailureConfig::disabled());

        session.force_fatal_end("first").unwrap();
        let Err(SessionError::AlreadyEnded { first, second }) = session.evaluate_now() else {
            panic!("second end should be rejected");
        };
        assert_ne!(first, second);
        assert!(first.to_string().contains("session.rs"));
        assert_eq!(session.final_outcome().unwrap().reason, "first");
    }

    #[test]
    fn test_forced_fatal_keeps_score_and_freezes() {
        let h = Harness::new();
        let mut session = h.open(DramaticFailureConfig::disabled());
        session.set_part_condition("leaf_1", PartCondition::Withered).unwrap();

        session.force_fatal_end("Knocked the vase over").unwrap();

        let outcome = h.mailbox.last_outcome().unwrap();
        assert!(outcome.is_fatal);
        assert_eq!(outcome.reason, "Knocked the vase over");
        // stem 1, angle 1, crown 1, leaf_1 0.2, leaf_2 1 => 4.2 / 5
        assert!((outcome.score_normalized - 0.84).abs() < 1e-5);
        assert_eq!(outcome.score, 84);
        assert_eq!(
            h.physics.snapshot(),
            vec![PhysicsCommand::FreezeSubgraph { disable_collisions: true }]
        );
    }

    #[test]
    fn test_crown_loss_is_immediate() {
        let h = Harness::new();
        let mut session = h.open(DramaticFailureConfig::disabled());

        assert!(session.try_detach("crown", "", DetachReason::PhysicalBreak, true));

        assert_eq!(session.phase(), SessionPhase::ResultApplied);
        let outcome = session.final_outcome().unwrap();
        assert!(outcome.is_fatal);
        assert_eq!(outcome.reason, evaluation::REASON_CROWN_LOST);

        // Redundant physical events change nothing
        assert!(!session.try_detach("crown", "torn", DetachReason::AccidentalTear, true));
        assert_eq!(session.detachment_stats().transitions, 1);
        assert_eq!(h.mailbox.outcome_count(), 1);
    }

    #[test]
    fn test_grace_window_suppresses_detach() {
        let h = Harness::new();
        let mut session = h.open(DramaticFailureConfig::disabled());

        session.request_grace_period(ms(300));
        session.tick(ms(200));
        assert!(!session.try_detach("leaf_1", "", DetachReason::AccidentalTear, true));
        assert!(session.part("leaf_1").unwrap().is_attached());

        session.tick(ms(100));
        assert!(!session.is_detachment_suppressed());
        assert!(session.try_detach("leaf_1", "", DetachReason::AccidentalTear, true));
        assert!(session.part("leaf_1").unwrap().is_permanently_detached());
    }

    #[test]
    fn test_configured_grace_window_ends_exactly() {
        let h = Harness::new();
        let mut session = h
            .registry
            .open(h.builder(DramaticFailureConfig::disabled()).config(SessionConfig {
                grace_period_secs: 0.4,
                dramatic_failure: DramaticFailureConfig::disabled(),
                ..Default::default()
            }))
            .unwrap();

        session.request_default_grace_period();
        session.tick(ms(399));
        assert!(!session.try_detach("leaf_1", "", DetachReason::AccidentalTear, true));
        session.tick(ms(1));
        assert!(session.try_detach("leaf_1", "", DetachReason::AccidentalTear, true));
    }

    #[test]
    fn test_sink_records_event_source_site() {
        let h = Harness::new();
        let mut session = h.open(DramaticFailureConfig::disabled());

        let expected = line!() + 1;
        assert!(session.try_detach("crown", "", DetachReason::PhysicalBreak, true));
        let site = session.end_requested_at.map(|s| (s.0.file(), s.0.line()));
        assert_eq!(site, Some((file!(), expected)));
    }

    #[test]
    fn test_dramatic_sequence() {
        let h = Harness::new();
        let mut session = h.open(DramaticFailureConfig {
            enabled: true,
            slow_motion_scale: 0.25,
            slow_motion_real_secs: 1.0,
            pause_hold_real_secs: 0.5,
        });

        session.force_fatal_end("Snapped the crown").unwrap();
        assert_eq!(session.phase(), SessionPhase::EndRequested);
        assert_eq!(h.time.get(TimePriority::Failure), Some(0.25));
        assert_eq!(session.failure_stage(), Some(SequenceStage::SlowMotion));
        assert_eq!(h.mailbox.outcome_count(), 0);

        session.tick(ms(1000));
        assert!(h.time.is_paused());
        assert_eq!(session.failure_stage(), Some(SequenceStage::Paused));
        assert_eq!(h.mailbox.outcome_count(), 0);

        session.tick(ms(500));
        assert_eq!(session.phase(), SessionPhase::ResultApplied);
        assert_eq!(h.mailbox.outcome_count(), 1);
        assert!(h.time.is_paused());

        drop(session);
        assert_eq!(h.time.effective(), None);
    }

    #[test]
    fn test_teardown_mid_sequence_releases_time_scale() {
        let h = Harness::new();
        let mut session = h.open(DramaticFailureConfig::default());
        session.force_fatal_end("boom").unwrap();
        assert!(h.time.is_held(TimePriority::Failure));

        drop(session);
        assert!(!h.time.is_held(TimePriority::Failure));
        assert_eq!(h.mailbox.outcome_count(), 0);
    }

    #[test]
    fn test_untimed_session_applies_synchronously() {
        let h = Harness::new();
        let mut session = h
            .registry
            .open(h.builder(DramaticFailureConfig::default()).timed_sequences(false))
            .unwrap();

        session.force_fatal_end("boom").unwrap();
        assert_eq!(session.phase(), SessionPhase::ResultApplied);
        assert_eq!(h.time.effective(), None);
    }

    #[test]
    fn test_soft_fail_downgrades() {
        let h = Harness::new();
        let mut session = h
            .registry
            .open(
                h.builder(DramaticFailureConfig::disabled())
                    .outcome(OutcomeMapping::days(1.0, 10.0).with_soft_fail(true)),
            )
            .unwrap();

        assert!(session.try_detach("crown", "", DetachReason::PhysicalBreak, true));

        let outcome = session.final_outcome().unwrap();
        assert!(!outcome.is_fatal);
        assert!(outcome.soft_failed);
        assert!(outcome.reason.is_empty());
        assert!(h.physics.is_empty());
    }

    #[test]
    fn test_fall_watchdog_forces_end_once() {
        let h = Harness::new();
        let mut session = h.open(DramaticFailureConfig::disabled());

        session.release_and_await_fall("crown", "The crown toppled", ms(2000)).unwrap();
        assert_eq!(
            h.physics.drain(),
            vec![PhysicsCommand::ReleaseHold { part_id: "crown".into() }]
        );

        session.tick(ms(1500));
        assert!(session.is_active());

        session.tick(ms(500));
        let outcome = session.final_outcome().unwrap();
        assert!(outcome.is_fatal);
        assert_eq!(outcome.reason, "The crown toppled");

        session.tick(ms(5000));
        assert_eq!(h.mailbox.outcome_count(), 1);
    }

    #[test]
    fn test_physical_trigger_disarms_watchdog() {
        let h = Harness::new();
        let mut session = h.open(DramaticFailureConfig::disabled());

        session.release_and_await_fall("crown", "The crown toppled", ms(2000)).unwrap();
        session.tick(ms(500));
        session.force_fatal_end("Crown hit the floor").unwrap();
        assert!(!session.is_awaiting_fall());

        session.tick(ms(3000));
        assert_eq!(h.mailbox.outcome_count(), 1);
        assert_eq!(session.final_outcome().unwrap().reason, "Crown hit the floor");
    }

    #[test]
    fn test_removed_part_is_judged_missing() {
        let h = Harness::new();
        let mut session = h.open(DramaticFailureConfig::disabled());

        assert!(session.remove_part("leaf_2").is_some());
        let breakdown = session.evaluate_detailed();
        let leaf = breakdown.parts.iter().find(|p| p.part_id == "leaf_2").unwrap();
        assert!(!leaf.present);
        assert_eq!(leaf.partial_score, evaluation::ALLOWED_MISSING_SCORE);
    }

    #[test]
    fn test_preview_does_not_end() {
        let h = Harness::new();
        let mut session = h.open(DramaticFailureConfig::disabled());
        session.record_cut(Vec3::new(0.0, 8.0, 0.0), 45.0);

        let preview = session.preview();
        assert!((preview.score_normalized - 0.9).abs() < 1e-5);
        assert_eq!(h.mailbox.preview_count(), 1);
        assert!(session.is_active());
        assert_eq!(session.preview(), preview);
    }
}
