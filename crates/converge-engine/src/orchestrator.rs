//! Parallel execution of reconciliation plans
//!
//! Each plan runs in its own task against one shared reconciler and one
//! cancellation token. Plans that would touch the same handle are refused
//! up front, since operations on a single handle must not overlap.

use crate::error::ReconcileError;
use crate::lifecycle::{Lifecycle, LifecyclePhase};
use crate::reconciler::Reconciler;
use converge_common::{ObservedState, ResourceHandle, ResourceSpec};
use futures::FutureExt;
use std::collections::{BTreeMap, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// One reconciliation step for one resource
#[derive(Debug, Clone)]
pub enum Plan {
    Create(ResourceSpec),
    Update {
        handle: ResourceHandle,
        desired: ResourceSpec,
        observed: ObservedState,
    },
    Delete(ResourceHandle),
    /// Delete then create, for immutable field changes
    Replace {
        handle: ResourceHandle,
        desired: ResourceSpec,
    },
}

impl Plan {
    /// Existing handle the plan operates on
    pub fn target(&self) -> Option<&ResourceHandle> {
        match self {
            Plan::Create(_) => None,
            Plan::Update { handle, .. } | Plan::Replace { handle, .. } | Plan::Delete(handle) => {
                Some(handle)
            }
        }
    }

    pub fn label(&self) -> String {
        match self {
            Plan::Create(spec) => format!("create {}", spec.kind),
            Plan::Update { handle, .. } => format!("update {handle}"),
            Plan::Delete(handle) => format!("delete {handle}"),
            Plan::Replace { handle, .. } => format!("replace {handle}"),
        }
    }
}

/// What a successful plan did
#[derive(Debug, Clone)]
pub enum Applied {
    Created {
        handle: ResourceHandle,
        observed: ObservedState,
    },
    Updated(ObservedState),
    Deleted(ResourceHandle),
    Replaced {
        previous: ResourceHandle,
        handle: ResourceHandle,
        observed: ObservedState,
    },
}

#[derive(Debug)]
pub struct PlanResult {
    /// Position of the plan in the input
    pub index: usize,
    pub label: String,
    /// Lifecycle phase the resource was left in
    pub phase: LifecyclePhase,
    /// Remote object the plan ended on, including one created by a plan
    /// that later failed
    pub handle: Option<ResourceHandle>,
    pub outcome: Result<Applied, ReconcileError>,
}

impl PlanResult {
    fn aborted(index: usize, label: String) -> Self {
        Self {
            index,
            outcome: Err(ReconcileError::Aborted(label.clone())),
            label,
            phase: LifecyclePhase::Failed,
            handle: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Run `plans` concurrently, at most `max_concurrency` at once.
///
/// Results come back in input order, one per plan. A plan whose task
/// panics or cannot be joined is reported as aborted and the others keep
/// running.
pub async fn run_plans(
    reconciler: Arc<Reconciler>,
    plans: Vec<Plan>,
    cancel: CancellationToken,
) -> Vec<PlanResult> {
    let permits = Arc::new(Semaphore::new(reconciler.config().max_concurrency.max(1)));
    let conflicts = conflicting_targets(&plans);
    let mut results: Vec<PlanResult> = Vec::with_capacity(plans.len());
    let mut spawned: BTreeMap<usize, String> = BTreeMap::new();
    let mut tasks = JoinSet::new();

    info!(count = plans.len(), "Running reconciliation plans");

    for (index, plan) in plans.into_iter().enumerate() {
        let label = plan.label();
        if let Some(handle) = plan.target().filter(|h| conflicts.contains_key(*h)) {
            warn!(plan = %label, "Refusing overlapping operations on one handle");
            results.push(PlanResult {
                index,
                label,
                phase: LifecyclePhase::Available,
                handle: Some(handle.clone()),
                outcome: Err(ReconcileError::ConcurrentOperation(handle.clone())),
            });
            continue;
        }

        spawned.insert(index, label.clone());
        let reconciler = reconciler.clone();
        let permits = permits.clone();
        let cancel = cancel.clone();
        tasks.spawn(async move {
            // The semaphore is never closed
            let _permit = permits.acquire_owned().await.ok();
            debug!(plan = %label, "Plan started");
            match AssertUnwindSafe(execute(&reconciler, plan, &cancel))
                .catch_unwind()
                .await
            {
                Ok((lifecycle, outcome)) => PlanResult {
                    index,
                    label,
                    phase: lifecycle.phase(),
                    handle: lifecycle.handle().cloned(),
                    outcome,
                },
                Err(_) => {
                    error!(plan = %label, "Plan panicked");
                    PlanResult::aborted(index, label)
                }
            }
        });
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(result) => {
                match &result.outcome {
                    Ok(_) => info!(plan = %result.label, phase = %result.phase, "Plan succeeded"),
                    Err(e) => warn!(
                        plan = %result.label,
                        phase = %result.phase,
                        error = %e,
                        "Plan failed"
                    ),
                }
                spawned.remove(&result.index);
                results.push(result);
            }
            Err(e) => error!(error = ?e, "Plan task failed to join"),
        }
    }

    settle_unjoined(&mut results, spawned);
    results
}

/// Report plans whose task never handed back a result, then restore input order
fn settle_unjoined(results: &mut Vec<PlanResult>, unjoined: BTreeMap<usize, String>) {
    for (index, label) in unjoined {
        warn!(plan = %label, "No result from plan task, reporting it aborted");
        results.push(PlanResult::aborted(index, label));
    }
    results.sort_by_key(|r| r.index);
}

/// Handles targeted by more than one plan
fn conflicting_targets(plans: &[Plan]) -> HashMap<ResourceHandle, usize> {
    let mut counts: HashMap<ResourceHandle, usize> = HashMap::new();
    for handle in plans.iter().filter_map(Plan::target) {
        *counts.entry(handle.clone()).or_default() += 1;
    }
    counts.retain(|_, n| *n > 1);
    counts
}

/// Run one plan, tracking the resource's lifecycle
async fn execute(
    reconciler: &Reconciler,
    plan: Plan,
    cancel: &CancellationToken,
) -> (Lifecycle, Result<Applied, ReconcileError>) {
    match plan {
        Plan::Create(spec) => {
            let mut lifecycle = Lifecycle::new();
            let outcome = create(reconciler, &mut lifecycle, &spec, cancel)
                .await
                .map(|(handle, observed)| Applied::Created { handle, observed });
            (lifecycle, outcome)
        }
        Plan::Update {
            handle,
            desired,
            observed,
        } => {
            let mut lifecycle = Lifecycle::existing(handle.clone(), LifecyclePhase::Available);
            let outcome = update(reconciler, &mut lifecycle, &handle, &desired, &observed, cancel)
                .await
                .map(Applied::Updated);
            (lifecycle, outcome)
        }
        Plan::Delete(handle) => {
            let mut lifecycle = Lifecycle::existing(handle.clone(), LifecyclePhase::Available);
            let outcome = delete(reconciler, &mut lifecycle, &handle, cancel)
                .await
                .map(|()| Applied::Deleted(handle.clone()));
            (lifecycle, outcome)
        }
        Plan::Replace { handle, desired } => {
            let mut old = Lifecycle::existing(handle.clone(), LifecyclePhase::Available);
            if let Err(e) = reconciler.validate(&desired) {
                return (old, Err(e));
            }
            if let Err(e) = delete(reconciler, &mut old, &handle, cancel).await {
                return (old, Err(e));
            }
            let mut new = Lifecycle::new();
            let outcome = create(reconciler, &mut new, &desired, cancel)
                .await
                .map(|(new_handle, observed)| Applied::Replaced {
                    previous: handle,
                    handle: new_handle,
                    observed,
                });
            (new, outcome)
        }
    }
}

async fn create(
    reconciler: &Reconciler,
    lifecycle: &mut Lifecycle,
    spec: &ResourceSpec,
    cancel: &CancellationToken,
) -> Result<(ResourceHandle, ObservedState), ReconcileError> {
    reconciler.validate(spec)?;
    lifecycle.advance(LifecyclePhase::Creating)?;
    match reconciler.create(spec, cancel).await {
        Ok((handle, observed)) => {
            lifecycle.attach(handle.clone());
            lifecycle.advance(LifecyclePhase::Available)?;
            Ok((handle, observed))
        }
        Err(e) => {
            if let Some(handle) = e.handle() {
                lifecycle.attach(handle.clone());
            }
            settle_failure(lifecycle, &e);
            Err(e)
        }
    }
}

async fn update(
    reconciler: &Reconciler,
    lifecycle: &mut Lifecycle,
    handle: &ResourceHandle,
    desired: &ResourceSpec,
    observed: &ObservedState,
    cancel: &CancellationToken,
) -> Result<ObservedState, ReconcileError> {
    lifecycle.advance(LifecyclePhase::Updating)?;
    match reconciler.update(handle, desired, observed, cancel).await {
        Ok(state) => {
            lifecycle.advance(LifecyclePhase::Available)?;
            Ok(state)
        }
        Err(e) => {
            // Nothing was sent for these; the resource is untouched
            if matches!(
                e,
                ReconcileError::Validation { .. } | ReconcileError::ImmutableFieldChanged { .. }
            ) {
                lifecycle.advance(LifecyclePhase::Available)?;
            }
            settle_failure(lifecycle, &e);
            Err(e)
        }
    }
}

async fn delete(
    reconciler: &Reconciler,
    lifecycle: &mut Lifecycle,
    handle: &ResourceHandle,
    cancel: &CancellationToken,
) -> Result<(), ReconcileError> {
    lifecycle.advance(LifecyclePhase::Deleting)?;
    match reconciler.delete(handle, cancel).await {
        Ok(()) => lifecycle.advance(LifecyclePhase::Deleted),
        Err(e) => {
            settle_failure(lifecycle, &e);
            Err(e)
        }
    }
}

fn settle_failure(lifecycle: &mut Lifecycle, error: &ReconcileError) {
    if matches!(error, ReconcileError::RemoteOperationFailed { .. }) {
        lifecycle.fail();
    }
}
