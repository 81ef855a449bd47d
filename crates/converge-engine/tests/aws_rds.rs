//! RDS snapshot integration tests - actually call AWS APIs
//!
//! These tests are marked `#[ignore]` and need a source DB instance:
//! ```
//! AWS_PROFILE=your_profile CONVERGE_TEST_DB_INSTANCE=my-db \
//!     cargo test --test aws_rds -- --ignored --nocapture
//! ```

use converge_common::{ControlPlane, FieldValue, ResourceHandle, ResourceKind, ResourceStatus};
use converge_engine::aws::{AwsContext, RdsSnapshotControlPlane};
use converge_engine::resources::{DbSnapshot, ResourceDefinition};
use converge_engine::{Reconciler, ReconcilerConfig};
use converge_test_utils::aws::{test_db_instance, test_snapshot_identifier};
use converge_test_utils::get_test_region;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

async fn control_plane() -> RdsSnapshotControlPlane {
    let ctx = AwsContext::new(&get_test_region()).await;
    RdsSnapshotControlPlane::from_context(&ctx)
}

/// Reading a snapshot that never existed is a not-found error
#[tokio::test]
#[ignore]
async fn missing_snapshot_is_not_found() {
    let cp = control_plane().await;
    let handle = ResourceHandle::new(ResourceKind::DbSnapshot, test_snapshot_identifier());

    let err = cp.read(&handle).await.unwrap_err();
    assert!(err.is_not_found(), "unexpected error: {err}");
}

/// Deleting a snapshot that never existed succeeds
#[tokio::test]
#[ignore]
async fn delete_missing_snapshot_is_noop() {
    let cp = Arc::new(control_plane().await);
    let reconciler = Reconciler::new(cp, ReconcilerConfig::default());
    let handle = ResourceHandle::new(ResourceKind::DbSnapshot, test_snapshot_identifier());

    reconciler
        .delete(&handle, &CancellationToken::new())
        .await
        .expect("Deleting a missing snapshot should succeed");
}

/// Create, share, unshare and delete a snapshot
#[tokio::test]
#[ignore]
async fn snapshot_lifecycle() {
    let Some(instance) = test_db_instance() else {
        eprintln!("CONVERGE_TEST_DB_INSTANCE not set, skipping");
        return;
    };
    let cp = Arc::new(control_plane().await);
    let reconciler = Reconciler::new(cp, ReconcilerConfig::default());
    let cancel = CancellationToken::new();

    let snapshot = DbSnapshot {
        db_instance_identifier: instance,
        db_snapshot_identifier: test_snapshot_identifier(),
        shared_accounts: Default::default(),
    };
    let (handle, created) = reconciler
        .create(&snapshot.to_spec(), &cancel)
        .await
        .expect("Should create snapshot");
    assert_eq!(created.status, ResourceStatus::Available);
    assert!(created.fields.contains_key("db_snapshot_arn"));

    let mut desired = snapshot.to_spec();
    desired.fields.insert(
        "shared_accounts".into(),
        FieldValue::string_list(["all"]),
    );
    let shared = reconciler
        .update(&handle, &desired, &created, &cancel)
        .await
        .expect("Should share snapshot");
    assert_eq!(
        shared.fields.get("shared_accounts"),
        Some(&FieldValue::string_list(["all"]))
    );

    let unshared = reconciler
        .update(&handle, &snapshot.to_spec(), &shared, &cancel)
        .await
        .expect("Should unshare snapshot");
    assert!(!unshared.fields.contains_key("shared_accounts"));

    reconciler
        .delete(&handle, &cancel)
        .await
        .expect("Should delete snapshot");
}
