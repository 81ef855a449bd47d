//! RDS DB snapshots as a control plane
//!
//! Sharing is carried by the snapshot's `restore` attribute, which RDS only
//! accepts changes to once the snapshot is available. Everything else about
//! a snapshot is fixed at creation.

use crate::aws::context::AwsContext;
use crate::aws::error::classify_sdk_error;
use crate::resources::{DbSnapshot, ResourceDefinition};
use async_trait::async_trait;
use aws_sdk_rds::Client;
use converge_common::{
    ControlPlane, FieldValue, Fields, RemoteError, RemoteSnapshot, ResourceHandle, ResourceKind,
    ResourceStatus,
};
use std::collections::BTreeSet;
use tracing::{debug, info};

const RESTORE_ATTRIBUTE: &str = "restore";

/// Control plane backed by the RDS API
pub struct RdsSnapshotControlPlane {
    client: Client,
}

impl RdsSnapshotControlPlane {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn from_context(ctx: &AwsContext) -> Self {
        Self::new(ctx.rds_client())
    }

    /// Accounts currently in the snapshot's `restore` attribute
    async fn shared_accounts(&self, snapshot_id: &str) -> Result<BTreeSet<String>, RemoteError> {
        let output = self
            .client
            .describe_db_snapshot_attributes()
            .db_snapshot_identifier(snapshot_id)
            .send()
            .await
            .map_err(|e| classify_sdk_error(&e))?;

        let accounts = output
            .db_snapshot_attributes_result()
            .map(|result| result.db_snapshot_attributes())
            .unwrap_or_default()
            .iter()
            .filter(|attr| attr.attribute_name() == Some(RESTORE_ATTRIBUTE))
            .flat_map(|attr| attr.attribute_values().iter().cloned())
            .collect();
        Ok(accounts)
    }
}

fn ensure_snapshot(kind: ResourceKind) -> Result<(), RemoteError> {
    if kind == ResourceKind::DbSnapshot {
        Ok(())
    } else {
        Err(RemoteError::invalid(format!(
            "RDS snapshot control plane cannot manage {kind}"
        )))
    }
}

fn put_str(fields: &mut Fields, name: &str, value: Option<&str>) {
    if let Some(value) = value {
        fields.insert(name.into(), value.into());
    }
}

/// Accounts to add to and remove from the `restore` attribute
fn sharing_changes(
    current: &BTreeSet<String>,
    desired: &BTreeSet<String>,
) -> (Vec<String>, Vec<String>) {
    let add = desired.difference(current).cloned().collect();
    let remove = current.difference(desired).cloned().collect();
    (add, remove)
}

/// Desired accounts from an update payload. An empty list unshares.
fn desired_accounts(value: &FieldValue) -> Result<BTreeSet<String>, RemoteError> {
    let items = value
        .as_list()
        .ok_or_else(|| RemoteError::invalid("shared_accounts must be a list"))?;
    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_string)
                .ok_or_else(|| RemoteError::invalid("shared_accounts entries must be strings"))
        })
        .collect()
}

#[async_trait]
impl ControlPlane for RdsSnapshotControlPlane {
    async fn create(
        &self,
        kind: ResourceKind,
        fields: &Fields,
    ) -> Result<ResourceHandle, RemoteError> {
        ensure_snapshot(kind)?;
        let snapshot = DbSnapshot::from_fields(fields)
            .map_err(|problems| RemoteError::invalid(problems.join("; ")))?;
        if !snapshot.shared_accounts.is_empty() {
            debug!("shared_accounts ignored on create; apply them once the snapshot is available");
        }

        info!(
            instance = %snapshot.db_instance_identifier,
            snapshot = %snapshot.db_snapshot_identifier,
            "Creating DB snapshot"
        );
        let output = self
            .client
            .create_db_snapshot()
            .db_instance_identifier(&snapshot.db_instance_identifier)
            .db_snapshot_identifier(&snapshot.db_snapshot_identifier)
            .send()
            .await
            .map_err(|e| classify_sdk_error(&e))?;

        let id = output
            .db_snapshot()
            .and_then(|s| s.db_snapshot_identifier())
            .unwrap_or(snapshot.db_snapshot_identifier.as_str());
        Ok(ResourceHandle::new(kind, id))
    }

    async fn read(&self, handle: &ResourceHandle) -> Result<RemoteSnapshot, RemoteError> {
        ensure_snapshot(handle.kind())?;
        let output = self
            .client
            .describe_db_snapshots()
            .db_snapshot_identifier(handle.id())
            .send()
            .await
            .map_err(|e| classify_sdk_error(&e))?;

        let snapshot = output
            .db_snapshots()
            .iter()
            .find(|s| s.db_snapshot_identifier() == Some(handle.id()))
            .ok_or_else(|| {
                RemoteError::not_found(format!("DB snapshot {} not found", handle.id()))
            })?;

        let mut fields = Fields::new();
        put_str(&mut fields, "db_instance_identifier", snapshot.db_instance_identifier());
        put_str(&mut fields, "db_snapshot_identifier", snapshot.db_snapshot_identifier());
        put_str(&mut fields, "db_snapshot_arn", snapshot.db_snapshot_arn());
        put_str(&mut fields, "engine", snapshot.engine());
        put_str(&mut fields, "engine_version", snapshot.engine_version());
        put_str(&mut fields, "availability_zone", snapshot.availability_zone());
        put_str(&mut fields, "snapshot_type", snapshot.snapshot_type());
        if let Some(storage) = snapshot.allocated_storage() {
            fields.insert("allocated_storage".into(), FieldValue::Int(i64::from(storage)));
        }
        if let Some(encrypted) = snapshot.encrypted() {
            fields.insert("encrypted".into(), FieldValue::Bool(encrypted));
        }

        let accounts = self.shared_accounts(handle.id()).await?;
        if !accounts.is_empty() {
            fields.insert(
                "shared_accounts".into(),
                FieldValue::string_list(accounts.iter().map(String::as_str)),
            );
        }

        let status = ResourceStatus::from_remote(snapshot.status().unwrap_or_default());
        Ok(RemoteSnapshot::new(fields, status))
    }

    async fn update(&self, handle: &ResourceHandle, changed: &Fields) -> Result<(), RemoteError> {
        ensure_snapshot(handle.kind())?;
        if let Some(name) = changed.keys().find(|name| *name != "shared_accounts") {
            return Err(RemoteError::invalid(format!(
                "{name} cannot be changed on an existing DB snapshot"
            )));
        }
        let Some(value) = changed.get("shared_accounts") else {
            return Ok(());
        };

        let desired = desired_accounts(value)?;
        let current = self.shared_accounts(handle.id()).await?;
        let (add, remove) = sharing_changes(&current, &desired);
        if add.is_empty() && remove.is_empty() {
            debug!(snapshot = %handle.id(), "Sharing already up to date");
            return Ok(());
        }

        info!(
            snapshot = %handle.id(),
            add = ?add,
            remove = ?remove,
            "Updating DB snapshot sharing"
        );
        self.client
            .modify_db_snapshot_attribute()
            .db_snapshot_identifier(handle.id())
            .attribute_name(RESTORE_ATTRIBUTE)
            .set_values_to_add((!add.is_empty()).then_some(add))
            .set_values_to_remove((!remove.is_empty()).then_some(remove))
            .send()
            .await
            .map_err(|e| classify_sdk_error(&e))?;
        Ok(())
    }

    async fn delete(&self, handle: &ResourceHandle) -> Result<(), RemoteError> {
        ensure_snapshot(handle.kind())?;
        info!(snapshot = %handle.id(), "Deleting DB snapshot");
        self.client
            .delete_db_snapshot()
            .db_snapshot_identifier(handle.id())
            .send()
            .await
            .map_err(|e| classify_sdk_error(&e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn sharing_changes_are_minimal() {
        let current = set(&["111111111111", "222222222222"]);
        let desired = set(&["222222222222", "333333333333"]);
        let (add, remove) = sharing_changes(&current, &desired);
        assert_eq!(add, vec!["333333333333"]);
        assert_eq!(remove, vec!["111111111111"]);

        let (add, remove) = sharing_changes(&desired, &desired);
        assert!(add.is_empty() && remove.is_empty());
    }

    #[test]
    fn empty_list_unshares_everything() {
        let desired = desired_accounts(&FieldValue::List(vec![])).unwrap();
        let (add, remove) = sharing_changes(&set(&["all"]), &desired);
        assert!(add.is_empty());
        assert_eq!(remove, vec!["all"]);
    }

    #[test]
    fn rejects_malformed_accounts() {
        assert!(desired_accounts(&FieldValue::from("111111111111")).is_err());
        assert!(desired_accounts(&FieldValue::List(vec![FieldValue::Int(1)])).is_err());
    }

    #[test]
    fn only_snapshots_are_managed() {
        assert!(ensure_snapshot(ResourceKind::DbSnapshot).is_ok());
        let err = ensure_snapshot(ResourceKind::JobQueue).unwrap_err();
        assert_eq!(err.class, converge_common::RemoteErrorClass::Invalid);
    }
}
