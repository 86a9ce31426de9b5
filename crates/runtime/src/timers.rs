//! # Cooperative Timers
//!
//! Per-tick state machines driven by the session's `tick`. All of them
//! count real (unscaled) time so a slow-motion or pause request never
//! stretches its own timeout.
//!
//! - `GraceWindow`: suppresses detachment right after a deliberate cut
//! - `FailureSequence`: slow motion, then pause, then apply
//! - `FallWatchdog`: forces the end if a released part never trips its
//!   physical failure trigger

use std::panic::Location;
use std::time::Duration;

// ============================================================================
// Grace Window
// ============================================================================

/// Countdown that suppresses detachment while it is running.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GraceWindow {
    remaining: Duration,
}

impl GraceWindow {
    /// Open (or extend) the window. A shorter request never cuts an
    /// already running window short.
    pub fn open(&mut self, duration: Duration) {
        self.remaining = self.remaining.max(duration);
    }

    pub fn is_active(&self) -> bool {
        !self.remaining.is_zero()
    }

    pub fn remaining(&self) -> Duration {
        self.remaining
    }

    /// Returns `true` on the tick the window closes.
    pub fn tick(&mut self, real_delta: Duration) -> bool {
        if !self.is_active() {
            return false;
        }
        self.remaining = self.remaining.saturating_sub(real_delta);
        !self.is_active()
    }

    pub fn clear(&mut self) {
        self.remaining = Duration::ZERO;
    }
}

// ============================================================================
// Failure Sequence
// ============================================================================

/// Stage of the dramatic failure presentation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SequenceStage {
    SlowMotion,
    Paused,
    Finished,
}

/// What the session must do after advancing the sequence.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SequenceSteps {
    pub request_pause: bool,
    pub apply_result: bool,
}

/// Slow motion for a fixed real duration, then a pause held for a fixed
/// real duration, then the result. Cannot be cancelled once started.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FailureSequence {
    stage: SequenceStage,
    elapsed: Duration,
    slow_motion: Duration,
    pause_hold: Duration,
}

impl FailureSequence {
    pub fn new(slow_motion: Duration, pause_hold: Duration) -> Self {
        Self {
            stage: SequenceStage::SlowMotion,
            elapsed: Duration::ZERO,
            slow_motion,
            pause_hold,
        }
    }

    pub fn stage(&self) -> SequenceStage {
        self.stage
    }

    pub fn is_finished(&self) -> bool {
        self.stage == SequenceStage::Finished
    }

    /// Advance by real time. Several stages can complete in one call.
    pub fn advance(&mut self, real_delta: Duration) -> SequenceSteps {
        let mut steps = SequenceSteps::default();
        self.elapsed += real_delta;

        if self.stage == SequenceStage::SlowMotion && self.elapsed >= self.slow_motion {
            self.elapsed -= self.slow_motion;
            self.stage = SequenceStage::Paused;
            steps.request_pause = true;
        }

        if self.stage == SequenceStage::Paused && self.elapsed >= self.pause_hold {
            self.elapsed = Duration::ZERO;
            self.stage = SequenceStage::Finished;
            steps.apply_result = true;
        }

        steps
    }
}

// ============================================================================
// Fall Watchdog
// ============================================================================

/// Backstop timer for a released part.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FallWatchdog {
    pub part_id: String,
    pub reason: String,
    timeout: Duration,
    elapsed: Duration,
    armed_at: &'static Location<'static>,
}

impl FallWatchdog {
    pub fn new(
        part_id: impl Into<String>,
        reason: impl Into<String>,
        timeout: Duration,
        armed_at: &'static Location<'static>,
    ) -> Self {
        Self {
            part_id: part_id.into(),
            reason: reason.into(),
            timeout,
            elapsed: Duration::ZERO,
            armed_at,
        }
    }

    pub fn armed_at(&self) -> &'static Location<'static> {
        self.armed_at
    }

    pub fn remaining(&self) -> Duration {
        self.timeout.saturating_sub(self.elapsed)
    }

    /// Returns `true` once the timeout has elapsed.
    pub fn tick(&mut self, real_delta: Duration) -> bool {
        self.elapsed += real_delta;
        self.elapsed >= self.timeout
    }
}
