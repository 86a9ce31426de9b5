//! # Physics Bridge
//!
//! The only commands a session sends to physics: freeze the arrangement
//! after a failure, and release a part from whatever is holding it.
//!
//! `PhysicsCommandQueue` buffers commands for the Bevy plugin, which turns
//! them into `PhysicsCommandMessage`s for the host's physics systems.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Command for the physics collaborator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PhysicsCommand {
    /// Zero velocity and stop simulating every dynamic body under the
    /// arrangement
    FreezeSubgraph { disable_collisions: bool },
    /// Drop the part's holding constraint so it can fall
    ReleaseHold { part_id: String },
}

/// Physics collaborator.
pub trait PhysicsBridge: Send + Sync {
    fn freeze_subgraph(&mut self, disable_collisions: bool);

    fn release_hold(&mut self, part_id: &str);
}

/// Bridge that ignores every command.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullPhysics;

impl PhysicsBridge for NullPhysics {
    fn freeze_subgraph(&mut self, _disable_collisions: bool) {}

    fn release_hold(&mut self, _part_id: &str) {}
}

/// Shared command buffer. Clones share the same queue.
#[derive(Clone, Debug, Default)]
pub struct PhysicsCommandQueue {
    commands: Arc<Mutex<Vec<PhysicsCommand>>>,
}

impl PhysicsCommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drain(&self) -> Vec<PhysicsCommand> {
        std::mem::take(&mut *self.commands.lock())
    }

    pub fn snapshot(&self) -> Vec<PhysicsCommand> {
        self.commands.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.commands.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.lock().is_empty()
    }
}

impl PhysicsBridge for PhysicsCommandQueue {
    fn freeze_subgraph(&mut self, disable_collisions: bool) {
        self.commands
            .lock()
            .push(PhysicsCommand::FreezeSubgraph { disable_collisions });
    }

    fn release_hold(&mut self, part_id: &str) {
        self.commands.lock().push(PhysicsCommand::ReleaseHold {
            part_id: part_id.to_string(),
        });
    }
}
