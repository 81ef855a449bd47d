//! Ready-made field sets for each resource kind

use converge_common::{FieldValue, Fields};

/// A valid QBusiness-style identifier, 36 characters
pub const APPLICATION_ID: &str = "a1b2c3d4-e5f6-a7b8-c9d0-e1f2a3b4c5d6";
pub const INDEX_ID: &str = "b1b2c3d4-e5f6-a7b8-c9d0-e1f2a3b4c5d6";
pub const DATASOURCE_ID: &str = "c1b2c3d4-e5f6-a7b8-c9d0-e1f2a3b4c5d6";

pub fn compute_environment_arn(name: &str) -> String {
    format!("arn:aws:batch:us-east-1:123456789012:compute-environment/{name}")
}

/// One `compute_environment_order` entry
pub fn ce_order(name: &str, order: i64) -> FieldValue {
    FieldValue::map([
        (
            "compute_environment",
            FieldValue::from(compute_environment_arn(name)),
        ),
        ("order", FieldValue::Int(order)),
    ])
}

/// Job queue fields: `{name, priority, state: ENABLED}`
pub fn job_queue_fields(name: &str, priority: i64) -> Fields {
    let mut fields = Fields::new();
    fields.insert("name".into(), name.into());
    fields.insert("priority".into(), FieldValue::Int(priority));
    fields.insert("state".into(), "ENABLED".into());
    fields
}

/// Job queue fields with compute environments attached in the given order
pub fn job_queue_with_environments(name: &str, environments: &[(&str, i64)]) -> Fields {
    let mut fields = job_queue_fields(name, 1);
    fields.insert(
        "compute_environment_order".into(),
        FieldValue::List(
            environments
                .iter()
                .map(|(ce, order)| ce_order(ce, *order))
                .collect(),
        ),
    );
    fields
}

pub fn db_snapshot_fields(instance: &str, snapshot: &str) -> Fields {
    let mut fields = Fields::new();
    fields.insert("db_instance_identifier".into(), instance.into());
    fields.insert("db_snapshot_identifier".into(), snapshot.into());
    fields
}

pub fn retriever_fields(display_name: &str) -> Fields {
    let mut fields = Fields::new();
    fields.insert("application_id".into(), APPLICATION_ID.into());
    fields.insert("display_name".into(), display_name.into());
    fields.insert("native_index_id".into(), INDEX_ID.into());
    fields
}

pub fn user_fields(user_id: &str) -> Fields {
    let mut fields = Fields::new();
    fields.insert("application_id".into(), APPLICATION_ID.into());
    fields.insert("user_id".into(), user_id.into());
    fields
}
