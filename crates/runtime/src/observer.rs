//! # Session Observers
//!
//! Presentation subscribes here. Previews are non-authoritative and may
//! arrive any number of times; the final outcome arrives exactly once.

use std::sync::Arc;

use kenzan_common::result::{EvaluationResult, FinalOutcome};
use parking_lot::Mutex;
use uuid::Uuid;

/// Receives session results, tagged with the publishing session's
/// attempt id.
pub trait SessionObserver: Send + Sync {
    /// Live HUD snapshot.
    fn on_preview(&mut self, _attempt_id: Uuid, _result: &EvaluationResult) {}

    /// The committed result. Called once per session.
    fn on_outcome(&mut self, attempt_id: Uuid, outcome: &FinalOutcome);
}

#[derive(Debug, Default)]
struct MailboxState {
    previews: Vec<(Uuid, EvaluationResult)>,
    outcomes: Vec<(Uuid, FinalOutcome)>,
}

/// Shared buffer of published results. Clones share the same buffer.
#[derive(Clone, Debug, Default)]
pub struct OutcomeMailbox {
    state: Arc<Mutex<MailboxState>>,
}

impl OutcomeMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drain_previews(&self) -> Vec<(Uuid, EvaluationResult)> {
        std::mem::take(&mut self.state.lock().previews)
    }

    pub fn drain_outcomes(&self) -> Vec<(Uuid, FinalOutcome)> {
        std::mem::take(&mut self.state.lock().outcomes)
    }

    pub fn outcome_count(&self) -> usize {
        self.state.lock().outcomes.len()
    }

    pub fn last_outcome(&self) -> Option<FinalOutcome> {
        self.state.lock().outcomes.last().map(|(_, outcome)| outcome.clone())
    }

    pub fn preview_count(&self) -> usize {
        self.state.lock().previews.len()
    }
}

impl SessionObserver for OutcomeMailbox {
    fn on_preview(&mut self, attempt_id: Uuid, result: &EvaluationResult) {
        self.state.lock().previews.push((attempt_id, result.clone()));
    }

    fn on_outcome(&mut self, attempt_id: Uuid, outcome: &FinalOutcome) {
        self.state.lock().outcomes.push((attempt_id, outcome.clone()));
    }
}

/// Observer backed by a closure over the final outcome.
pub struct OutcomeCallback<F>(pub F);

impl<F> SessionObserver for OutcomeCallback<F>
where
    F: FnMut(&FinalOutcome) + Send + Sync,
{
    fn on_outcome(&mut self, _attempt_id: Uuid, outcome: &FinalOutcome) {
        (self.0)(outcome)
    }
}
