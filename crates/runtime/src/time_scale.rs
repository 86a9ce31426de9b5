//! # Time Scale Arbitration
//!
//! The simulation's time scale is a contended global resource. Sessions
//! only request and release a named priority; an arbiter decides which
//! request wins.
//!
//! `TimeScaleStack` is a shared, priority-ordered table that the Bevy
//! plugin applies to `Time<Virtual>`.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

/// Request priority, lowest first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TimePriority {
    Gameplay,
    Tutorial,
    Failure,
    Debug,
}

/// External service arbitrating time-scale requests.
///
/// A scale of `0.0` is a full pause.
pub trait TimeScaleArbiter: Send + Sync {
    fn request(&mut self, priority: TimePriority, scale: f32);

    fn release(&mut self, priority: TimePriority);
}

/// Arbiter that ignores every request.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullTimeScale;

impl TimeScaleArbiter for NullTimeScale {
    fn request(&mut self, _priority: TimePriority, _scale: f32) {}

    fn release(&mut self, _priority: TimePriority) {}
}

#[derive(Debug, Default)]
struct StackState {
    requests: BTreeMap<TimePriority, f32>,
    dirty: bool,
}

/// Shared priority table; the highest priority request wins.
///
/// Clones share the same table.
#[derive(Clone, Debug, Default)]
pub struct TimeScaleStack {
    state: Arc<Mutex<StackState>>,
}

impl TimeScaleStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Winning scale, or `None` when nothing is requested.
    pub fn effective(&self) -> Option<f32> {
        self.state.lock().requests.values().next_back().copied()
    }

    pub fn effective_or_normal(&self) -> f32 {
        self.effective().unwrap_or(1.0)
    }

    pub fn is_paused(&self) -> bool {
        self.effective() == Some(0.0)
    }

    pub fn get(&self, priority: TimePriority) -> Option<f32> {
        self.state.lock().requests.get(&priority).copied()
    }

    pub fn is_held(&self, priority: TimePriority) -> bool {
        self.state.lock().requests.contains_key(&priority)
    }

    /// Winning scale if the table changed since the last call.
    pub fn take_changed(&self) -> Option<Option<f32>> {
        let mut state = self.state.lock();
        if !state.dirty {
            return None;
        }
        state.dirty = false;
        Some(state.requests.values().next_back().copied())
    }
}

impl TimeScaleArbiter for TimeScaleStack {
    fn request(&mut self, priority: TimePriority, scale: f32) {
        let scale = if scale.is_finite() { scale.max(0.0) } else { 1.0 };
        let mut state = self.state.lock();
        state.requests.insert(priority, scale);
        state.dirty = true;
        debug!(?priority, scale, "Time scale requested");
    }

    fn release(&mut self, priority: TimePriority) {
        let mut state = self.state.lock();
        if state.requests.remove(&priority).is_some() {
            state.dirty = true;
            debug!(?priority, "Time scale released");
        }
    }
}
