//! Resource lifecycle state machine
//!
//! ```text
//! Uncreated -> Creating -> Available <-> Updating
//!                              |
//!                              v
//!                          Deleting -> Deleted
//! ```
//!
//! `Failed` is reachable from every in-flight phase. A `Failed` resource
//! can still be deleted.

use crate::error::ReconcileError;
use converge_common::ResourceHandle;
use serde::Serialize;
use tracing::info;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, strum::Display, strum::AsRefStr,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LifecyclePhase {
    #[default]
    Uncreated,
    Creating,
    Available,
    Updating,
    Deleting,
    Deleted,
    Failed,
}

impl LifecyclePhase {
    /// Check whether moving from `self` to `next` is allowed
    pub fn can_transition_to(self, next: LifecyclePhase) -> bool {
        use LifecyclePhase::*;
        matches!(
            (self, next),
            (Uncreated, Creating)
                | (Creating, Available)
                | (Available, Updating)
                | (Updating, Available)
                | (Available, Deleting)
                | (Failed, Deleting)
                | (Deleting, Deleted)
                | (Creating | Updating | Deleting, Failed)
        )
    }

}

/// Tracks the phase of one resource across reconciler calls
#[derive(Debug, Clone, Default)]
pub struct Lifecycle {
    phase: LifecyclePhase,
    handle: Option<ResourceHandle>,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a resource that already exists remotely
    pub fn existing(handle: ResourceHandle, phase: LifecyclePhase) -> Self {
        Self {
            phase,
            handle: Some(handle),
        }
    }

    pub fn phase(&self) -> LifecyclePhase {
        self.phase
    }

    pub fn handle(&self) -> Option<&ResourceHandle> {
        self.handle.as_ref()
    }

    /// Record the handle issued by a successful create
    pub fn attach(&mut self, handle: ResourceHandle) {
        self.handle = Some(handle);
    }

    /// Move to `next`, rejecting transitions the state machine does not allow.
    pub fn advance(&mut self, next: LifecyclePhase) -> Result<(), ReconcileError> {
        if !self.phase.can_transition_to(next) {
            return Err(ReconcileError::InvalidTransition {
                from: self.phase,
                to: next,
            });
        }
        info!(
            handle = ?self.handle.as_ref().map(ToString::to_string),
            from = %self.phase,
            to = %next,
            "Lifecycle transition"
        );
        self.phase = next;
        Ok(())
    }

    /// Move to `Failed` from any in-flight phase; no-op otherwise
    pub fn fail(&mut self) {
        if self.phase.can_transition_to(LifecyclePhase::Failed) {
            self.phase = LifecyclePhase::Failed;
        }
    }
}
