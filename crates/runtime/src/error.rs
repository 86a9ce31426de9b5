//! # Session Errors
//!
//! Protocol violations are programming defects. They are logged loudly with
//! both call sites and returned, but never crash the session or touch an
//! already committed result.

use std::fmt;
use std::panic::Location;

use uuid::Uuid;

/// Source location of a lifecycle call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CallSite(pub &'static Location<'static>);

impl CallSite {
    #[track_caller]
    pub fn here() -> Self {
        Self(Location::caller())
    }
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.0.file(), self.0.line(), self.0.column())
    }
}

/// Errors from the session runtime.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SessionError {
    #[error("Session {active} is still active for this attempt")]
    AlreadyActive { active: Uuid },

    #[error("Session end requested twice: first at {first}, again at {second}")]
    AlreadyEnded { first: CallSite, second: CallSite },

    #[error("Session result applied twice: first at {first}, again at {second}")]
    AlreadyApplied { first: CallSite, second: CallSite },

    #[error("Unknown part: {0}")]
    UnknownPart(String),
}
