//! Convergence polling with exponential backoff and cancellation support.
//!
//! Repeatedly reads a remote object until its status is accepted by a
//! [`ConvergenceTarget`], a failure status is seen, the deadline passes, or
//! the caller cancels. Transient read errors count as unsuccessful polls.

use crate::error::{Operation, ReconcileError};
use backon::{BackoffBuilder, ExponentialBuilder};
use converge_common::defaults::{
    DEFAULT_POLL_FACTOR, DEFAULT_POLL_INITIAL_DELAY_MS, DEFAULT_POLL_MAX_DELAY_MS,
    DEFAULT_POLL_MIN_DELAY_MS,
};
use converge_common::{ControlPlane, ObservedState, ResourceHandle, ResourceStatus};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Configuration for convergence polling with exponential backoff.
#[derive(Debug, Clone)]
pub struct WaitConfig {
    /// Delay before the second poll
    pub initial_delay: Duration,
    /// Floor applied to every delay
    pub min_delay: Duration,
    /// Cap for exponential growth
    pub max_delay: Duration,
    /// Growth factor between consecutive delays
    pub factor: f32,
    /// Maximum total time to wait before timeout
    pub timeout: Duration,
    /// Randomize delays to spread out concurrent pollers
    pub jitter: bool,
    /// Consecutive not-found reads tolerated while waiting for a new object
    /// to become visible
    pub not_found_tolerance: u32,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(DEFAULT_POLL_INITIAL_DELAY_MS),
            min_delay: Duration::from_millis(DEFAULT_POLL_MIN_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_POLL_MAX_DELAY_MS),
            factor: DEFAULT_POLL_FACTOR,
            timeout: Duration::from_secs(60),
            jitter: true,
            not_found_tolerance: 3,
        }
    }
}

impl WaitConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn delays(&self) -> impl Iterator<Item = Duration> {
        let mut builder = ExponentialBuilder::default()
            .with_min_delay(self.initial_delay)
            .with_max_delay(self.max_delay)
            .with_factor(self.factor)
            .with_max_times(usize::MAX);
        if self.jitter {
            builder = builder.with_jitter();
        }
        builder.build()
    }
}

/// Statuses a poll sequence is waiting for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvergenceTarget {
    pub accept: Vec<ResourceStatus>,
    /// Treat a not-found read as success
    pub not_found_is_done: bool,
    /// Statuses that end polling with `RemoteOperationFailed`
    pub failure: Vec<ResourceStatus>,
}

impl ConvergenceTarget {
    /// Wait for `ready` after a create or an asynchronous update
    pub fn ready(ready: ResourceStatus) -> Self {
        Self {
            accept: vec![ready],
            not_found_is_done: false,
            failure: vec![
                ResourceStatus::Failed,
                ResourceStatus::Deleting,
                ResourceStatus::Deleted,
            ],
        }
    }

    /// Wait for the object to disappear
    pub fn gone() -> Self {
        Self {
            accept: vec![ResourceStatus::Deleted],
            not_found_is_done: true,
            failure: vec![ResourceStatus::Failed],
        }
    }

    pub fn accepts(&self, status: ResourceStatus) -> bool {
        self.accept.contains(&status)
    }

    pub fn is_failure(&self, status: ResourceStatus) -> bool {
        self.failure.contains(&status)
    }
}

/// How a poll sequence ended successfully
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Convergence {
    Reached(ObservedState),
    /// Not found, and the target accepts that
    Gone,
}

/// A status that moved backwards between two consecutive polls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusRegression {
    pub from: ResourceStatus,
    pub to: ResourceStatus,
    pub poll: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollOutcome {
    pub convergence: Convergence,
    /// Number of reads issued
    pub polls: u32,
    pub anomalies: Vec<StatusRegression>,
}

impl PollOutcome {
    /// Observed state on success, None when the object is gone
    pub fn into_observed(self) -> Option<ObservedState> {
        match self.convergence {
            Convergence::Reached(state) => Some(state),
            Convergence::Gone => None,
        }
    }
}

/// Poll `handle` until `target` is reached.
///
/// The first read happens immediately. Delays then follow an exponential
/// sequence clamped to `[min_delay, max_delay]`, and the last sleep is
/// clipped so a final read lands on the deadline.
pub async fn wait_for_convergence(
    client: &dyn ControlPlane,
    handle: &ResourceHandle,
    target: &ConvergenceTarget,
    config: &WaitConfig,
    cancel: &CancellationToken,
) -> Result<PollOutcome, ReconcileError> {
    let start = Instant::now();
    let deadline = start + config.timeout;
    let mut delays = config.delays();
    let mut polls = 0u32;
    let mut not_found_streak = 0u32;
    let mut last: Option<ObservedState> = None;
    let mut anomalies = Vec::new();

    loop {
        if cancel.is_cancelled() {
            return Err(ReconcileError::Cancelled {
                handle: handle.clone(),
            });
        }

        polls += 1;
        match client.read(handle).await {
            Ok(snapshot) => {
                not_found_streak = 0;
                let observed = ObservedState::capture(snapshot);
                let status = observed.status;

                let prev = last.as_ref().map(|s| s.status);
                if let Some(prev) = prev.filter(|p| p.is_regression_to(status)) {
                    warn!(
                        kind = %handle.kind(),
                        id = %handle.id(),
                        from = %prev,
                        to = %status,
                        poll = polls,
                        "Status went backwards while polling"
                    );
                    anomalies.push(StatusRegression {
                        from: prev,
                        to: status,
                        poll: polls,
                    });
                }

                if target.is_failure(status) {
                    warn!(
                        kind = %handle.kind(),
                        id = %handle.id(),
                        status = %status,
                        "Remote operation failed"
                    );
                    return Err(ReconcileError::RemoteOperationFailed {
                        handle: handle.clone(),
                        status,
                        last: Box::new(observed),
                    });
                }

                if target.accepts(status) {
                    debug!(
                        kind = %handle.kind(),
                        id = %handle.id(),
                        status = %status,
                        polls,
                        "Resource converged"
                    );
                    return Ok(PollOutcome {
                        convergence: Convergence::Reached(observed),
                        polls,
                        anomalies,
                    });
                }

                last = Some(observed);
            }
            Err(e) if e.is_not_found() && target.not_found_is_done => {
                debug!(kind = %handle.kind(), id = %handle.id(), polls, "Resource gone");
                return Ok(PollOutcome {
                    convergence: Convergence::Gone,
                    polls,
                    anomalies,
                });
            }
            Err(e) if e.is_not_found() => {
                not_found_streak += 1;
                if not_found_streak > config.not_found_tolerance {
                    return Err(ReconcileError::NotFound(handle.clone()));
                }
                debug!(
                    kind = %handle.kind(),
                    id = %handle.id(),
                    streak = not_found_streak,
                    "Resource not visible yet"
                );
            }
            Err(e) if e.is_transient() => {
                warn!(
                    kind = %handle.kind(),
                    id = %handle.id(),
                    error = %e,
                    "Transient error while polling"
                );
            }
            Err(e) => {
                warn!(kind = %handle.kind(), id = %handle.id(), error = %e, "Poll failed");
                return Err(ReconcileError::rejected_for(Operation::Read, handle, e));
            }
        }

        let now = Instant::now();
        if now >= deadline {
            warn!(
                kind = %handle.kind(),
                id = %handle.id(),
                polls,
                last_status = ?last.as_ref().map(|s| s.status),
                "Timed out waiting for convergence"
            );
            return Err(ReconcileError::ConvergenceTimeout {
                handle: handle.clone(),
                waited: now - start,
                last: last.map(Box::new),
            });
        }

        let delay = delays
            .next()
            .unwrap_or(config.max_delay)
            .max(config.min_delay)
            .min(config.max_delay)
            .min(deadline - now);
        debug!(
            kind = %handle.kind(),
            id = %handle.id(),
            poll = polls,
            status = ?last.as_ref().map(|s| s.status),
            delay_ms = delay.as_millis(),
            "Not converged, polling again"
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(ReconcileError::Cancelled { handle: handle.clone() });
            }
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
