//! # Kenzan Runtime
//!
//! Session runtime for the Kenzan trimming minigame: grading, the single
//! gate for part detachment, and the lifecycle of one attempt.
//!
//! ## Modules
//!
//! - [`evaluation`]: pure grading of live state against a `RuleSet`
//! - [`detachment`]: `DetachmentSink`, the part roster and its authority
//! - [`session`]: `SessionBuilder` and `SessionController`
//! - [`registry`]: single-active-session enforcement
//! - [`timers`]: grace window, failure sequence, fall watchdog
//! - [`time_scale`], [`physics`], [`observer`]: collaborator seams
//! - [`plugin`]: `KenzanSessionPlugin` for Bevy apps
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       Kenzan Runtime                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  Physical events (joint breaks, tears, swaps)                   │
//! │  └── DetachmentSink::try_detach                                 │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  SessionController                                              │
//! │  ├── DetachmentAuthority  (grace window, crown loss)            │
//! │  ├── Evaluation Engine    (preview / final grading)             │
//! │  ├── FailureSequence      (slow motion -> pause -> result)      │
//! │  └── FallWatchdog         (released part never fell)            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  Collaborators                                                  │
//! │  ├── TimeScaleArbiter  -> Time<Virtual>                         │
//! │  ├── PhysicsBridge     -> PhysicsCommandMessage                 │
//! │  └── SessionObserver   -> SessionOutcomeMessage                 │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod detachment;
pub mod error;
pub mod evaluation;
pub mod observer;
pub mod physics;
pub mod plugin;
pub mod registry;
pub mod session;
pub mod time_scale;
pub mod timers;

pub use detachment::{DetachOutcome, DetachmentAuthority, DetachmentSink, DetachmentStats, PartRoster};
pub use error::{CallSite, SessionError};
pub use evaluation::{evaluate, evaluate_detailed};
pub use observer::{OutcomeCallback, OutcomeMailbox, SessionObserver};
pub use physics::{NullPhysics, PhysicsBridge, PhysicsCommand, PhysicsCommandQueue};
pub use plugin::{
    close_trim_session, open_trim_session, ActiveTrimSession, KenzanSessionPlugin, SessionBridges,
    TrimSessionRegistry,
};
pub use registry::{SessionLease, SessionRegistry};
pub use session::{SessionBuilder, SessionController, SessionPhase};
pub use time_scale::{NullTimeScale, TimePriority, TimeScaleArbiter, TimeScaleStack};
pub use timers::SequenceStage;

/// Convenient re-exports for game code.
pub mod prelude {
    pub use super::detachment::{DetachOutcome, DetachmentSink};
    pub use super::error::SessionError;
    pub use super::plugin::{
        ActiveTrimSession, DetachPartRequest, EvaluateRequest, ForceFatalRequest, GracePeriodRequest,
        KenzanSessionPlugin, PhysicsCommandMessage, PreviewRequest, ReleaseFallRequest, SessionBridges,
        SessionOutcomeMessage, SessionPreviewMessage,
    };
    pub use super::registry::SessionRegistry;
    pub use super::session::{SessionBuilder, SessionController, SessionPhase};
    pub use kenzan_common::prelude::*;
}
