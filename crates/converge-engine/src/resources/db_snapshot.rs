//! RDS DB snapshot

use super::{FieldReader, ResourceDefinition, validate_as};
use crate::schema::{FieldSchema, ResourceSchema, UpdateMode};
use converge_common::validate::{is_account_id, is_db_identifier};
use converge_common::{FieldValue, Fields, ResourceKind};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbSnapshot {
    pub db_instance_identifier: String,
    pub db_snapshot_identifier: String,
    /// Accounts allowed to restore the snapshot (`restore` attribute)
    pub shared_accounts: BTreeSet<String>,
}

impl ResourceDefinition for DbSnapshot {
    const KIND: ResourceKind = ResourceKind::DbSnapshot;

    fn schema() -> ResourceSchema {
        ResourceSchema::new(Self::KIND)
            .field(FieldSchema::required("db_instance_identifier").immutable())
            .field(FieldSchema::required("db_snapshot_identifier").immutable())
            // The restore attribute can only be modified on an available snapshot
            .field(FieldSchema::optional("shared_accounts").unordered().deferred())
            .field(FieldSchema::computed("db_snapshot_arn"))
            .field(FieldSchema::computed("engine"))
            .field(FieldSchema::computed("engine_version"))
            .field(FieldSchema::computed("allocated_storage"))
            .field(FieldSchema::computed("availability_zone"))
            .field(FieldSchema::computed("snapshot_type"))
            .field(FieldSchema::computed("encrypted"))
            .update_mode(UpdateMode::Synchronous)
            .validator(validate_as::<DbSnapshot>)
    }

    fn to_fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert(
            "db_instance_identifier".into(),
            self.db_instance_identifier.as_str().into(),
        );
        fields.insert(
            "db_snapshot_identifier".into(),
            self.db_snapshot_identifier.as_str().into(),
        );
        if !self.shared_accounts.is_empty() {
            fields.insert(
                "shared_accounts".into(),
                FieldValue::string_list(self.shared_accounts.iter().map(String::as_str)),
            );
        }
        fields
    }

    fn from_fields(fields: &Fields) -> Result<Self, Vec<String>> {
        let mut r = FieldReader::new(fields);

        let instance = r.required_str("db_instance_identifier");
        let snapshot = r.required_str("db_snapshot_identifier");
        for (name, value) in [
            ("db_instance_identifier", &instance),
            ("db_snapshot_identifier", &snapshot),
        ] {
            if let Some(value) = value {
                r.check(is_db_identifier(value), || {
                    format!(
                        "{name} {value:?} must start with a letter, contain only letters, digits and single hyphens, and not end with a hyphen"
                    )
                });
            }
        }

        let mut shared_accounts = BTreeSet::new();
        for account in r.string_list("shared_accounts") {
            r.check(is_account_id(&account), || {
                format!(
                    "shared_accounts entry {account:?} must be a 12-digit account ID or \"all\""
                )
            });
            shared_accounts.insert(account);
        }

        r.finish(|| {
            Some(DbSnapshot {
                db_instance_identifier: instance?,
                db_snapshot_identifier: snapshot?,
                shared_accounts,
            })
        })
    }
}
