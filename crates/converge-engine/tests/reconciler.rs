//! Reconciler behaviour against a scripted control plane
//!
//! Every test runs with paused time, so polling delays and deadlines of
//! several minutes complete instantly.

use converge_common::{
    FieldValue, Fields, ObservedState, OperationTimeouts, RemoteError, RemoteErrorClass,
    RemoteSnapshot, ResourceHandle, ResourceKind, ResourceSpec, ResourceStatus,
};
use converge_engine::schema::FieldSchema;
use converge_engine::wait::StatusRegression;
use converge_engine::{
    ConvergenceTarget, ReconcileError, Reconciler, ReconcilerConfig, ResourceSchema,
    SchemaRegistry, WaitConfig, wait_for_convergence,
};
use converge_test_utils::fixtures::{
    ce_order, db_snapshot_fields, job_queue_fields, job_queue_with_environments, retriever_fields,
};
use converge_test_utils::{Call, CallKind, ScriptedControlPlane};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn test_config() -> ReconcilerConfig {
    let mut config = ReconcilerConfig::default();
    config.poll.jitter = false;
    config.retry.jitter = false;
    config
}

fn reconciler(cp: &Arc<ScriptedControlPlane>) -> Reconciler {
    Reconciler::new(cp.clone(), test_config())
}

fn job_queue(fields: Fields) -> ResourceSpec {
    ResourceSpec::new(ResourceKind::JobQueue, fields)
}

fn observed(fields: Fields) -> ObservedState {
    ObservedState::capture(RemoteSnapshot::new(fields, ResourceStatus::Available))
}

/// Seed an available job queue and return its handle
fn seed_queue(cp: &ScriptedControlPlane, fields: Fields) -> ResourceHandle {
    let handle = ResourceHandle::new(ResourceKind::JobQueue, "q1");
    cp.insert(handle.clone(), fields, ResourceStatus::Available);
    handle
}

#[tokio::test(start_paused = true)]
async fn create_waits_through_pending() {
    let cp = Arc::new(
        ScriptedControlPlane::new()
            .with_initial_status(ResourceStatus::Pending)
            .with_statuses([
                ResourceStatus::Pending,
                ResourceStatus::Pending,
                ResourceStatus::Available,
            ]),
    );

    let (handle, state) = reconciler(&cp)
        .create(&job_queue(job_queue_fields("q1", 1)), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(state.status, ResourceStatus::Available);
    assert_eq!(handle.kind(), ResourceKind::JobQueue);
    assert_eq!(cp.count(CallKind::Create), 1);
    assert_eq!(cp.count(CallKind::Read), 3);
}

#[tokio::test(start_paused = true)]
async fn create_tolerates_read_after_write_lag() {
    let cp = Arc::new(ScriptedControlPlane::new());
    cp.push_read(Err(RemoteError::not_found("not visible yet")));
    cp.push_read(Err(RemoteError::not_found("not visible yet")));

    let (_, state) = reconciler(&cp)
        .create(&job_queue(job_queue_fields("q1", 1)), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(state.status, ResourceStatus::Available);
    assert_eq!(cp.count(CallKind::Read), 3);
}

#[tokio::test(start_paused = true)]
async fn create_gives_up_when_object_never_appears() {
    let cp = Arc::new(ScriptedControlPlane::new());
    for _ in 0..4 {
        cp.push_read(Err(RemoteError::not_found("missing")));
    }

    let err = reconciler(&cp)
        .create(&job_queue(job_queue_fields("q1", 1)), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(err.is_not_found());
    assert_eq!(cp.count(CallKind::Read), 4);
}

#[tokio::test(start_paused = true)]
async fn transient_read_errors_keep_polling() {
    let cp = Arc::new(ScriptedControlPlane::new());
    cp.push_read(Err(RemoteError::unavailable("connection reset")));
    cp.push_read(Err(RemoteError::throttled("Rate exceeded")));

    let (_, state) = reconciler(&cp)
        .create(&job_queue(job_queue_fields("q1", 1)), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(state.status, ResourceStatus::Available);
    assert_eq!(cp.count(CallKind::Read), 3);
}

#[tokio::test(start_paused = true)]
async fn failed_status_stops_polling() {
    let cp = Arc::new(
        ScriptedControlPlane::new()
            .with_initial_status(ResourceStatus::Pending)
            .with_statuses([
                ResourceStatus::Pending,
                ResourceStatus::Failed,
                ResourceStatus::Available,
            ]),
    );

    let err = reconciler(&cp)
        .create(&job_queue(job_queue_fields("q1", 1)), &CancellationToken::new())
        .await
        .unwrap_err();

    let ReconcileError::RemoteOperationFailed { status, last, .. } = &err else {
        panic!("expected RemoteOperationFailed, got {err:?}");
    };
    assert_eq!(*status, ResourceStatus::Failed);
    assert_eq!(last.status, ResourceStatus::Failed);
    assert_eq!(cp.count(CallKind::Read), 2);
}

#[tokio::test(start_paused = true)]
async fn timeout_reports_last_observed_state() {
    let cp = Arc::new(ScriptedControlPlane::new().with_initial_status(ResourceStatus::Pending));
    let config = test_config().with_timeouts(
        ResourceKind::JobQueue,
        OperationTimeouts {
            create_secs: 30,
            update_secs: 30,
            delete_secs: 30,
        },
    );

    let err = Reconciler::new(cp.clone(), config)
        .create(&job_queue(job_queue_fields("q1", 1)), &CancellationToken::new())
        .await
        .unwrap_err();

    let ReconcileError::ConvergenceTimeout { handle, waited, .. } = &err else {
        panic!("expected ConvergenceTimeout, got {err:?}");
    };
    assert!(*waited >= Duration::from_secs(30));
    assert_eq!(
        err.last_observed().map(|s| s.status),
        Some(ResourceStatus::Pending)
    );
    // The handle stays valid; the object may still converge
    assert!(cp.contains(handle));
}

#[tokio::test(start_paused = true)]
async fn cancellation_interrupts_waiting() {
    let cp = Arc::new(ScriptedControlPlane::new().with_initial_status(ResourceStatus::Pending));
    let cancel = CancellationToken::new();

    let token = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(20)).await;
        token.cancel();
    });

    let err = reconciler(&cp)
        .create(&job_queue(job_queue_fields("q1", 1)), &cancel)
        .await
        .unwrap_err();

    let ReconcileError::Cancelled { handle } = &err else {
        panic!("expected Cancelled, got {err:?}");
    };
    assert!(cp.contains(handle));
    assert_eq!(cp.count(CallKind::Delete), 0);
}

#[tokio::test(start_paused = true)]
async fn create_retries_throttling_then_gives_up() {
    let cp = Arc::new(ScriptedControlPlane::new());
    let mut config = test_config();
    config.retry.max_attempts = 3;
    for _ in 0..3 {
        cp.fail_next_create(RemoteError::throttled("Rate exceeded").with_code("Throttling"));
    }

    let err = Reconciler::new(cp.clone(), config)
        .create(&job_queue(job_queue_fields("q1", 1)), &CancellationToken::new())
        .await
        .unwrap_err();

    let ReconcileError::RemoteRejected { source, .. } = &err else {
        panic!("expected RemoteRejected, got {err:?}");
    };
    assert_eq!(source.class, RemoteErrorClass::Throttled);
    assert_eq!(cp.count(CallKind::Create), 3);
    assert_eq!(cp.count(CallKind::Read), 0);
}

#[tokio::test(start_paused = true)]
async fn permanent_create_error_is_not_retried() {
    let cp = Arc::new(ScriptedControlPlane::new());
    cp.fail_next_create(RemoteError::invalid("priority out of range"));

    let err = reconciler(&cp)
        .create(&job_queue(job_queue_fields("q1", 1)), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ReconcileError::RemoteRejected { .. }));
    assert_eq!(cp.count(CallKind::Create), 1);
}

#[tokio::test(start_paused = true)]
async fn unchanged_spec_issues_no_calls() {
    let cp = Arc::new(ScriptedControlPlane::new());
    let fields = job_queue_fields("q1", 1);
    let handle = seed_queue(&cp, fields.clone());

    let state = observed(fields.clone());
    let result = reconciler(&cp)
        .update(&handle, &job_queue(fields), &state, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result, state);
    assert!(cp.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn reordered_environments_are_not_drift() {
    let cp = Arc::new(ScriptedControlPlane::new());
    let remote = job_queue_with_environments("q1", &[("ce-a", 1), ("ce-b", 2)]);
    let handle = seed_queue(&cp, remote.clone());

    let desired = job_queue_with_environments("q1", &[("ce-b", 2), ("ce-a", 1)]);
    reconciler(&cp)
        .update(&handle, &job_queue(desired), &observed(remote), &CancellationToken::new())
        .await
        .unwrap();

    assert!(cp.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn external_order_renumbering_is_kept() {
    let cp = Arc::new(ScriptedControlPlane::new());
    let remote = job_queue_with_environments("q1", &[("ce-a", 1)]);
    let handle = seed_queue(&cp, remote.clone());

    let desired = job_queue_with_environments("q1", &[("ce-a", 0)]);
    reconciler(&cp)
        .update(&handle, &job_queue(desired), &observed(remote.clone()), &CancellationToken::new())
        .await
        .unwrap();

    assert!(cp.calls().is_empty(), "{:?}", cp.calls());
    assert_eq!(cp.fields_of(&handle), Some(remote));
}

#[tokio::test(start_paused = true)]
async fn changed_order_value_is_drift() {
    let cp = Arc::new(ScriptedControlPlane::new());
    let remote = job_queue_with_environments("q1", &[("ce-a", 1), ("ce-b", 2)]);
    let handle = seed_queue(&cp, remote.clone());

    let desired = job_queue_with_environments("q1", &[("ce-a", 2), ("ce-b", 1)]);
    reconciler(&cp)
        .update(&handle, &job_queue(desired), &observed(remote), &CancellationToken::new())
        .await
        .unwrap();

    let calls = cp.calls();
    let Call::Update { changed, .. } = &calls[0] else {
        panic!("expected an update, got {calls:?}");
    };
    assert_eq!(
        changed["compute_environment_order"],
        FieldValue::List(vec![ce_order("ce-a", 2), ce_order("ce-b", 1)])
    );
}

#[tokio::test(start_paused = true)]
async fn single_changed_field_is_sent_alone() {
    let cp = Arc::new(ScriptedControlPlane::new());
    let schema = ResourceSchema::new(ResourceKind::JobQueue)
        .field(FieldSchema::required("name").immutable())
        .field(FieldSchema::optional("order"));
    let reconciler = Reconciler::new(cp.clone(), test_config())
        .with_schemas(SchemaRegistry::empty().with(schema));

    let mut remote = Fields::new();
    remote.insert("name".into(), "q1".into());
    remote.insert("order".into(), FieldValue::Int(1));
    let handle = seed_queue(&cp, remote.clone());

    let mut desired = remote.clone();
    desired.insert("order".into(), FieldValue::Int(2));

    let state = reconciler
        .update(&handle, &job_queue(desired), &observed(remote), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(cp.count(CallKind::Update), 1);
    let calls = cp.calls();
    let Call::Update { changed, .. } = &calls[0] else {
        panic!("expected an update, got {calls:?}");
    };
    assert_eq!(changed.keys().collect::<Vec<_>>(), vec!["order"]);
    assert_eq!(changed["order"], FieldValue::Int(2));
    assert_eq!(state.fields["order"], FieldValue::Int(2));
}

#[tokio::test(start_paused = true)]
async fn immutable_change_is_refused_without_calls() {
    let cp = Arc::new(ScriptedControlPlane::new());
    let remote = job_queue_fields("q1", 1);
    let handle = seed_queue(&cp, remote.clone());

    let err = reconciler(&cp)
        .update(
            &handle,
            &job_queue(job_queue_fields("q2", 5)),
            &observed(remote),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    let ReconcileError::ImmutableFieldChanged { fields, .. } = &err else {
        panic!("expected ImmutableFieldChanged, got {err:?}");
    };
    assert_eq!(fields, &vec!["name".to_string()]);
    assert!(cp.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn asynchronous_update_polls_until_ready() {
    let cp =
        Arc::new(ScriptedControlPlane::new().with_status_after_update(ResourceStatus::Updating));
    let remote = job_queue_fields("q1", 1);
    let handle = seed_queue(&cp, remote.clone());
    cp.push_status(ResourceStatus::Updating);
    cp.push_status(ResourceStatus::Available);

    let state = reconciler(&cp)
        .update(
            &handle,
            &job_queue(job_queue_fields("q1", 7)),
            &observed(remote),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(state.status, ResourceStatus::Available);
    assert_eq!(state.fields["priority"], FieldValue::Int(7));
    assert_eq!(cp.count(CallKind::Update), 1);
    assert_eq!(cp.count(CallKind::Read), 2);
}

#[tokio::test(start_paused = true)]
async fn synchronous_update_reads_once() {
    let cp = Arc::new(ScriptedControlPlane::new());
    let handle = ResourceHandle::new(ResourceKind::DbSnapshot, "snap-1");
    let remote = db_snapshot_fields("db-1", "snap-1");
    cp.insert(handle.clone(), remote.clone(), ResourceStatus::Available);

    let mut desired = remote.clone();
    desired.insert(
        "shared_accounts".into(),
        FieldValue::string_list(["123456789012"]),
    );

    reconciler(&cp)
        .update(
            &handle,
            &ResourceSpec::new(ResourceKind::DbSnapshot, desired),
            &observed(remote),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(cp.count(CallKind::Update), 1);
    assert_eq!(cp.count(CallKind::Read), 1);
}

#[tokio::test(start_paused = true)]
async fn rejected_deferred_update_keeps_created_handle() {
    let cp = Arc::new(ScriptedControlPlane::new());
    cp.fail_next_update(RemoteError::invalid("SharedSnapshotQuotaExceeded"));
    let mut fields = db_snapshot_fields("db-1", "snap-1");
    fields.insert(
        "shared_accounts".into(),
        FieldValue::string_list(["123456789012"]),
    );

    let err = reconciler(&cp)
        .create(
            &ResourceSpec::new(ResourceKind::DbSnapshot, fields),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ReconcileError::RemoteRejected { .. }), "{err:?}");
    let handle = err.handle().expect("created object should keep its handle");
    assert_eq!(handle.kind(), ResourceKind::DbSnapshot);
    assert!(cp.contains(handle));
}

#[tokio::test(start_paused = true)]
async fn permanent_poll_error_keeps_created_handle() {
    let cp = Arc::new(ScriptedControlPlane::new());
    cp.push_read(Err(RemoteError::invalid("access denied")));

    let err = reconciler(&cp)
        .create(&job_queue(job_queue_fields("q1", 1)), &CancellationToken::new())
        .await
        .unwrap_err();

    let handle = err.handle().expect("created object should keep its handle");
    assert!(cp.contains(handle));
    assert_eq!(cp.count(CallKind::Create), 1);
}

#[tokio::test(start_paused = true)]
async fn dropped_scalar_sends_no_update() {
    let cp = Arc::new(ScriptedControlPlane::new());
    let handle = ResourceHandle::new(ResourceKind::QbusinessRetriever, "r1");
    let mut remote = retriever_fields("docs");
    remote.insert(
        "iam_service_role_arn".into(),
        "arn:aws:iam::123456789012:role/retriever".into(),
    );
    cp.insert(handle.clone(), remote.clone(), ResourceStatus::Available);

    let state = reconciler(&cp)
        .update(
            &handle,
            &ResourceSpec::new(ResourceKind::QbusinessRetriever, retriever_fields("docs")),
            &observed(remote.clone()),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(cp.calls().is_empty(), "{:?}", cp.calls());
    assert_eq!(state.fields, remote);
}

#[tokio::test(start_paused = true)]
async fn delete_is_idempotent() {
    let cp = Arc::new(ScriptedControlPlane::new());
    let handle = seed_queue(&cp, job_queue_fields("q1", 1));
    let reconciler = reconciler(&cp);
    let cancel = CancellationToken::new();

    reconciler.delete(&handle, &cancel).await.unwrap();
    reconciler.delete(&handle, &cancel).await.unwrap();

    assert!(!cp.contains(&handle));
    assert_eq!(cp.count(CallKind::Delete), 2);
}

#[tokio::test(start_paused = true)]
async fn delete_finishes_on_first_not_found_read() {
    let cp = Arc::new(ScriptedControlPlane::new());
    let handle = seed_queue(&cp, job_queue_fields("q1", 1));
    let start = tokio::time::Instant::now();

    reconciler(&cp)
        .delete(&handle, &CancellationToken::new())
        .await
        .unwrap();

    // One read saw NotFound: no status was observed and no backoff slept
    assert_eq!(cp.count(CallKind::Delete), 1);
    assert_eq!(cp.count(CallKind::Read), 1);
    assert_eq!(start.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn delete_waits_for_deleted_status() {
    let cp = Arc::new(ScriptedControlPlane::new().with_soft_delete());
    let handle = seed_queue(&cp, job_queue_fields("q1", 1));
    cp.push_status(ResourceStatus::Deleting);
    cp.push_status(ResourceStatus::Deleted);

    reconciler(&cp)
        .delete(&handle, &CancellationToken::new())
        .await
        .unwrap();

    assert!(!cp.contains(&handle));
    assert_eq!(cp.count(CallKind::Read), 2);
}

#[tokio::test(start_paused = true)]
async fn replace_deletes_then_creates() {
    let cp = Arc::new(ScriptedControlPlane::new());
    let old = seed_queue(&cp, job_queue_fields("q1", 1));

    let (new, state) = reconciler(&cp)
        .replace(&old, &job_queue(job_queue_fields("q2", 1)), &CancellationToken::new())
        .await
        .unwrap();

    assert_ne!(new, old);
    assert!(!cp.contains(&old));
    assert_eq!(state.fields["name"], FieldValue::from("q2"));
    let kinds: Vec<_> = cp
        .calls()
        .iter()
        .filter(|c| c.kind() != CallKind::Read)
        .map(Call::kind)
        .collect();
    assert_eq!(kinds, vec![CallKind::Delete, CallKind::Create]);
}

#[tokio::test(start_paused = true)]
async fn status_regressions_are_reported() {
    let cp = Arc::new(
        ScriptedControlPlane::new()
            .with_initial_status(ResourceStatus::Pending)
            .with_statuses([
                ResourceStatus::Pending,
                ResourceStatus::Updating,
                ResourceStatus::Pending,
                ResourceStatus::Available,
            ]),
    );
    let handle = ResourceHandle::new(ResourceKind::JobQueue, "q1");
    cp.insert(handle.clone(), job_queue_fields("q1", 1), ResourceStatus::Pending);
    let config = WaitConfig {
        jitter: false,
        ..Default::default()
    };

    let outcome = wait_for_convergence(
        cp.as_ref(),
        &handle,
        &ConvergenceTarget::ready(ResourceStatus::Available),
        &config,
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(outcome.polls, 4);
    assert_eq!(
        outcome.anomalies,
        vec![StatusRegression {
            from: ResourceStatus::Updating,
            to: ResourceStatus::Pending,
            poll: 3,
        }]
    );
}
