//! # Session Registry
//!
//! At most one session may be active per attempt. Opening a session takes
//! a lease; dropping the controller hands it back.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{error, info};
use uuid::Uuid;

use crate::error::SessionError;
use crate::session::{SessionBuilder, SessionController};

/// Factory enforcing a single active session.
///
/// Clones share the same slot.
#[derive(Clone, Debug, Default)]
pub struct SessionRegistry {
    slot: Arc<Mutex<Option<Uuid>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a session, or fail if one is still alive.
    pub fn open(&self, builder: SessionBuilder) -> Result<SessionController, SessionError> {
        let lease = self.acquire()?;
        Ok(builder.build(lease))
    }

    /// Attempt id of the live session, if any.
    pub fn active(&self) -> Option<Uuid> {
        *self.slot.lock()
    }

    fn acquire(&self) -> Result<SessionLease, SessionError> {
        let mut slot = self.slot.lock();
        if let Some(active) = *slot {
            error!(%active, "Refusing to open a second session while one is active");
            return Err(SessionError::AlreadyActive { active });
        }
        let attempt_id = Uuid::new_v4();
        *slot = Some(attempt_id);
        info!(attempt = %attempt_id, "Session opened");
        Ok(SessionLease {
            attempt_id,
            slot: Arc::clone(&self.slot),
        })
    }
}

/// Proof of ownership of the registry slot.
#[derive(Debug)]
pub struct SessionLease {
    attempt_id: Uuid,
    slot: Arc<Mutex<Option<Uuid>>>,
}

impl SessionLease {
    pub fn attempt_id(&self) -> Uuid {
        self.attempt_id
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        let mut slot = self.slot.lock();
        if *slot == Some(self.attempt_id) {
            *slot = None;
            info!(attempt = %self.attempt_id, "Session closed");
        }
    }
}
