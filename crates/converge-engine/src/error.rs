//! Reconciliation errors
//!
//! Transient control plane failures never surface here: they are retried
//! with backoff and only escalate to `RemoteRejected` once retries are
//! exhausted. Every other failure propagates to the caller untouched.

use crate::lifecycle::LifecyclePhase;
use converge_common::{ObservedState, RemoteError, ResourceHandle, ResourceKind, ResourceStatus};
use std::time::Duration;
use thiserror::Error;

/// The operation a reconciliation step was performing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Desired spec malformed; no remote call was issued
    #[error("invalid {kind} spec: {}", problems.join("; "))]
    Validation {
        kind: ResourceKind,
        problems: Vec<String>,
    },

    /// The control plane permanently refused the request.
    ///
    /// `handle` is set whenever the object exists, including when a create
    /// was accepted and a later step failed.
    #[error("{operation} of {target} rejected: {source}")]
    RemoteRejected {
        operation: Operation,
        target: String,
        handle: Option<ResourceHandle>,
        #[source]
        source: RemoteError,
    },

    /// The object does not exist remotely
    #[error("{0} not found")]
    NotFound(ResourceHandle),

    /// Update attempted on force-replacement fields; no remote call was issued
    #[error(
        "{handle}: cannot update immutable fields {}; replace the resource instead",
        fields.join(", ")
    )]
    ImmutableFieldChanged {
        handle: ResourceHandle,
        fields: Vec<String>,
    },

    /// Polling deadline elapsed before the target status was reached
    #[error("timed out after {waited:?} waiting for {handle} to converge (last status: {})",
        last.as_ref().map_or_else(|| "never observed".to_string(), |s| s.status.to_string()))]
    ConvergenceTimeout {
        handle: ResourceHandle,
        waited: Duration,
        last: Option<Box<ObservedState>>,
    },

    /// The remote object reached a status it will never recover from
    #[error("{handle} entered {status} status")]
    RemoteOperationFailed {
        handle: ResourceHandle,
        status: ResourceStatus,
        last: Box<ObservedState>,
    },

    /// Caller cancelled while waiting for convergence
    #[error("cancelled while waiting for {handle}")]
    Cancelled { handle: ResourceHandle },

    /// Lifecycle guard rejected a phase change
    #[error("invalid lifecycle transition {from} -> {to}")]
    InvalidTransition {
        from: LifecyclePhase,
        to: LifecyclePhase,
    },

    /// More than one plan targets the same handle in a single run
    #[error("{0} is targeted by more than one concurrent operation")]
    ConcurrentOperation(ResourceHandle),

    /// A plan's task panicked
    #[error("{0} aborted unexpectedly")]
    Aborted(String),
}

impl ReconcileError {
    /// Wrap a control plane error that was not retried away, before any
    /// object exists.
    pub(crate) fn rejected(
        operation: Operation,
        target: impl ToString,
        source: RemoteError,
    ) -> Self {
        ReconcileError::RemoteRejected {
            operation,
            target: target.to_string(),
            handle: None,
            source,
        }
    }

    /// Wrap a control plane error for an existing object
    pub(crate) fn rejected_for(
        operation: Operation,
        handle: &ResourceHandle,
        source: RemoteError,
    ) -> Self {
        ReconcileError::RemoteRejected {
            operation,
            target: handle.to_string(),
            handle: Some(handle.clone()),
            source,
        }
    }

    /// Check if this is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, ReconcileError::NotFound(_))
    }

    /// The handle the error refers to, when one exists
    pub fn handle(&self) -> Option<&ResourceHandle> {
        match self {
            ReconcileError::NotFound(handle)
            | ReconcileError::ConcurrentOperation(handle)
            | ReconcileError::ImmutableFieldChanged { handle, .. }
            | ReconcileError::ConvergenceTimeout { handle, .. }
            | ReconcileError::RemoteOperationFailed { handle, .. }
            | ReconcileError::Cancelled { handle } => Some(handle),
            ReconcileError::RemoteRejected { handle, .. } => handle.as_ref(),
            ReconcileError::Validation { .. }
            | ReconcileError::InvalidTransition { .. }
            | ReconcileError::Aborted(_) => None,
        }
    }

    /// Most recent observed state carried by the error, if any
    pub fn last_observed(&self) -> Option<&ObservedState> {
        match self {
            ReconcileError::ConvergenceTimeout { last, .. } => last.as_deref(),
            ReconcileError::RemoteOperationFailed { last, .. } => Some(last),
            _ => None,
        }
    }
}
