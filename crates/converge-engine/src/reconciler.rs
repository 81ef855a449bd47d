//! Create, read, update and delete with convergence
//!
//! The reconciler owns no state across calls. Callers must serialize
//! operations on a single handle; distinct handles may be reconciled from
//! as many tasks as needed through a shared `Reconciler`.

use crate::config::ReconcilerConfig;
use crate::differ;
use crate::error::{Operation, ReconcileError};
use crate::resources::SchemaRegistry;
use crate::retry::retry_transient;
use crate::schema::{ResourceSchema, UpdateMode};
use crate::wait::{ConvergenceTarget, PollOutcome, wait_for_convergence};
use converge_common::{
    ControlPlane, FieldValue, Fields, ObservedState, ResourceHandle, ResourceKind, ResourceSpec,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct Reconciler {
    client: Arc<dyn ControlPlane>,
    schemas: SchemaRegistry,
    config: ReconcilerConfig,
}

impl Reconciler {
    pub fn new(client: Arc<dyn ControlPlane>, config: ReconcilerConfig) -> Self {
        Self {
            client,
            schemas: SchemaRegistry::builtin(),
            config,
        }
    }

    /// Replace the schemas used for dispatch
    pub fn with_schemas(mut self, schemas: SchemaRegistry) -> Self {
        self.schemas = schemas;
        self
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    pub fn schema(&self, kind: ResourceKind) -> Result<&ResourceSchema, ReconcileError> {
        self.schemas.get(kind).ok_or_else(|| ReconcileError::Validation {
            kind,
            problems: vec![format!("no schema registered for {kind}")],
        })
    }

    /// Check a spec without touching the remote
    pub fn validate(&self, spec: &ResourceSpec) -> Result<(), ReconcileError> {
        let problems = self.schema(spec.kind)?.check(&spec.fields);
        if problems.is_empty() {
            Ok(())
        } else {
            Err(ReconcileError::Validation {
                kind: spec.kind,
                problems,
            })
        }
    }

    /// Create the object and wait until it is ready.
    ///
    /// Once the create call is accepted, every error carries the new handle
    /// (see [`ReconcileError::handle`]) so the caller still owns the object.
    /// On `ConvergenceTimeout` or `Cancelled` it may still converge remotely.
    pub async fn create(
        &self,
        spec: &ResourceSpec,
        cancel: &CancellationToken,
    ) -> Result<(ResourceHandle, ObservedState), ReconcileError> {
        let schema = self.schema(spec.kind)?;
        self.validate(spec)?;

        let deferred = schema.deferred_fields();
        let (later, submit): (Fields, Fields) = spec
            .fields
            .clone()
            .into_iter()
            .partition(|(name, _)| deferred.contains(name.as_str()));

        info!(kind = %spec.kind, "Creating resource");
        let policy = self.config.retry_policy();
        let handle = retry_transient(&policy, "create", || self.client.create(spec.kind, &submit))
            .await
            .map_err(|e| ReconcileError::rejected(Operation::Create, spec.kind, e))?;
        info!(kind = %spec.kind, id = %handle.id(), "Create submitted, waiting for convergence");

        let outcome = self
            .wait(
                &handle,
                &ConvergenceTarget::ready(schema.ready_status),
                Operation::Create,
                cancel,
            )
            .await?;
        let observed = outcome
            .into_observed()
            .ok_or_else(|| ReconcileError::NotFound(handle.clone()))?;
        info!(kind = %spec.kind, id = %handle.id(), status = %observed.status, "Resource created");

        if later.is_empty() {
            return Ok((handle, observed));
        }

        debug!(
            id = %handle.id(),
            fields = ?later.keys().collect::<Vec<_>>(),
            "Applying fields deferred until convergence"
        );
        let observed = self.apply(&handle, schema, &later, cancel).await?;
        Ok((handle, observed))
    }

    /// Read the current remote state
    pub async fn read(&self, handle: &ResourceHandle) -> Result<ObservedState, ReconcileError> {
        let policy = self.config.retry_policy();
        match retry_transient(&policy, "read", || self.client.read(handle)).await {
            Ok(snapshot) => Ok(ObservedState::capture(snapshot)),
            Err(e) if e.is_not_found() => Err(ReconcileError::NotFound(handle.clone())),
            Err(e) => Err(ReconcileError::rejected_for(Operation::Read, handle, e)),
        }
    }

    /// Bring the object in line with `desired`.
    ///
    /// Issues no remote call when nothing changed, when an immutable field
    /// changed, or when the only change is a scalar dropped from `desired`.
    /// Otherwise sends one update carrying only the changed fields.
    pub async fn update(
        &self,
        handle: &ResourceHandle,
        desired: &ResourceSpec,
        observed: &ObservedState,
        cancel: &CancellationToken,
    ) -> Result<ObservedState, ReconcileError> {
        if desired.kind != handle.kind() {
            return Err(ReconcileError::Validation {
                kind: desired.kind,
                problems: vec![format!(
                    "spec kind {} does not match handle {handle}",
                    desired.kind
                )],
            });
        }
        let schema = self.schema(handle.kind())?;
        self.validate(desired)?;

        let changes = differ::diff(schema, &desired.fields, &observed.fields);
        if !changes.reordered.is_empty() {
            debug!(
                id = %handle.id(),
                fields = ?changes.reordered,
                "Ignoring reordered collections"
            );
        }
        if changes.requires_replacement() {
            warn!(
                id = %handle.id(),
                fields = ?changes.changed_immutable,
                "Immutable fields changed"
            );
            return Err(ReconcileError::ImmutableFieldChanged {
                handle: handle.clone(),
                fields: changes.changed_immutable.into_iter().collect(),
            });
        }
        if changes.is_empty() {
            debug!(kind = %handle.kind(), id = %handle.id(), "No drift");
            return Ok(observed.clone());
        }

        for record in differ::drift(schema, &desired.fields, &observed.fields) {
            info!(
                id = %handle.id(),
                field = %record.field,
                desired = ?record.desired,
                observed = ?record.observed,
                "Drift detected"
            );
        }

        let changed = changed_fields(&changes.changed_mutable, desired, observed);
        if changed.is_empty() {
            debug!(kind = %handle.kind(), id = %handle.id(), "Nothing to send");
            return Ok(observed.clone());
        }
        self.apply(handle, schema, &changed, cancel).await
    }

    /// Delete the object and wait until it is gone.
    ///
    /// Deleting an object that does not exist succeeds.
    pub async fn delete(
        &self,
        handle: &ResourceHandle,
        cancel: &CancellationToken,
    ) -> Result<(), ReconcileError> {
        info!(kind = %handle.kind(), id = %handle.id(), "Deleting resource");
        let policy = self.config.retry_policy();
        match retry_transient(&policy, "delete", || self.client.delete(handle)).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                info!(kind = %handle.kind(), id = %handle.id(), "Resource already gone");
                return Ok(());
            }
            Err(e) => return Err(ReconcileError::rejected_for(Operation::Delete, handle, e)),
        }

        self.wait(handle, &ConvergenceTarget::gone(), Operation::Delete, cancel)
            .await?;
        info!(kind = %handle.kind(), id = %handle.id(), "Resource deleted");
        Ok(())
    }

    /// Delete then create, for changes to immutable fields
    pub async fn replace(
        &self,
        handle: &ResourceHandle,
        desired: &ResourceSpec,
        cancel: &CancellationToken,
    ) -> Result<(ResourceHandle, ObservedState), ReconcileError> {
        self.validate(desired)?;
        self.delete(handle, cancel).await?;
        self.create(desired, cancel).await
    }

    /// Send `changed` and wait the way the kind's update API requires
    async fn apply(
        &self,
        handle: &ResourceHandle,
        schema: &ResourceSchema,
        changed: &Fields,
        cancel: &CancellationToken,
    ) -> Result<ObservedState, ReconcileError> {
        info!(
            kind = %handle.kind(),
            id = %handle.id(),
            fields = ?changed.keys().collect::<Vec<_>>(),
            "Updating resource"
        );
        let policy = self.config.retry_policy();
        retry_transient(&policy, "update", || self.client.update(handle, changed))
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    ReconcileError::NotFound(handle.clone())
                } else {
                    ReconcileError::rejected_for(Operation::Update, handle, e)
                }
            })?;

        match schema.update_mode {
            UpdateMode::Synchronous => self.read(handle).await,
            UpdateMode::Asynchronous => self
                .wait(
                    handle,
                    &ConvergenceTarget::ready(schema.ready_status),
                    Operation::Update,
                    cancel,
                )
                .await?
                .into_observed()
                .ok_or_else(|| ReconcileError::NotFound(handle.clone())),
        }
    }

    async fn wait(
        &self,
        handle: &ResourceHandle,
        target: &ConvergenceTarget,
        operation: Operation,
        cancel: &CancellationToken,
    ) -> Result<PollOutcome, ReconcileError> {
        let config = self.config.wait_config(handle.kind(), operation);
        let outcome =
            wait_for_convergence(self.client.as_ref(), handle, target, &config, cancel).await?;
        if !outcome.anomalies.is_empty() {
            warn!(
                id = %handle.id(),
                operation = %operation,
                regressions = outcome.anomalies.len(),
                "Converged after status regressions"
            );
        }
        Ok(outcome)
    }
}

/// Values to send for the changed fields.
///
/// A field dropped from the desired spec clears a collection; scalars cannot
/// be cleared in place and are left as they are.
fn changed_fields(
    names: &BTreeSet<String>,
    desired: &ResourceSpec,
    observed: &ObservedState,
) -> Fields {
    let mut changed = Fields::new();
    for name in names {
        let value = match (desired.fields.get(name), observed.fields.get(name)) {
            (Some(value), _) => value.clone(),
            (None, Some(FieldValue::List(_))) => FieldValue::List(Vec::new()),
            (None, Some(FieldValue::Map(_))) => FieldValue::Map(Default::default()),
            (None, _) => {
                warn!(field = %name, "Cannot clear a scalar field in place, leaving it unchanged");
                continue;
            }
        };
        changed.insert(name.clone(), value);
    }
    changed
}
