//! Batch job queue

use super::{FieldReader, ResourceDefinition, entry_str, validate_as};
use crate::schema::{FieldSchema, ResourceSchema, UpdateMode};
use converge_common::validate::{is_arn, is_job_queue_name};
use converge_common::{FieldValue, Fields, ResourceKind};
use std::collections::{BTreeMap, BTreeSet};

/// Batch allows at most this many compute environments per queue
const MAX_COMPUTE_ENVIRONMENTS: usize = 3;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[strum(serialize_all = "UPPERCASE")]
pub enum JobQueueState {
    #[default]
    Enabled,
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ComputeEnvironmentOrder {
    pub compute_environment: String,
    pub order: i64,
}

impl ComputeEnvironmentOrder {
    fn to_value(&self) -> FieldValue {
        FieldValue::map([
            (
                "compute_environment",
                FieldValue::from(self.compute_environment.as_str()),
            ),
            ("order", FieldValue::Int(self.order)),
        ])
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobQueue {
    pub name: String,
    pub priority: i64,
    pub state: JobQueueState,
    pub scheduling_policy_arn: Option<String>,
    pub compute_environment_order: Vec<ComputeEnvironmentOrder>,
    pub tags: BTreeMap<String, String>,
}

impl ResourceDefinition for JobQueue {
    const KIND: ResourceKind = ResourceKind::JobQueue;

    fn schema() -> ResourceSchema {
        ResourceSchema::new(Self::KIND)
            .field(FieldSchema::required("name").immutable())
            .field(FieldSchema::required("priority"))
            .field(FieldSchema::required("state"))
            .field(FieldSchema::optional("scheduling_policy_arn").immutable_once_set())
            .field(
                FieldSchema::optional("compute_environment_order")
                    .unordered()
                    .normalized(rank_compute_environments),
            )
            .field(FieldSchema::optional("tags"))
            .field(FieldSchema::computed("arn"))
            .update_mode(UpdateMode::Asynchronous)
            .validator(validate_as::<JobQueue>)
    }

    fn to_fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert("name".into(), self.name.as_str().into());
        fields.insert("priority".into(), FieldValue::Int(self.priority));
        fields.insert("state".into(), self.state.as_ref().into());
        if let Some(arn) = &self.scheduling_policy_arn {
            fields.insert("scheduling_policy_arn".into(), arn.as_str().into());
        }
        if !self.compute_environment_order.is_empty() {
            fields.insert(
                "compute_environment_order".into(),
                FieldValue::List(
                    self.compute_environment_order
                        .iter()
                        .map(ComputeEnvironmentOrder::to_value)
                        .collect(),
                ),
            );
        }
        if !self.tags.is_empty() {
            fields.insert(
                "tags".into(),
                FieldValue::map(
                    self.tags
                        .iter()
                        .map(|(k, v)| (k.as_str(), FieldValue::from(v.as_str()))),
                ),
            );
        }
        fields
    }

    fn from_fields(fields: &Fields) -> Result<Self, Vec<String>> {
        let mut r = FieldReader::new(fields);

        let name = r.required_str("name");
        if let Some(name) = &name {
            r.check(is_job_queue_name(name), || {
                format!("name {name:?} must be 1-128 letters, digits, hyphens or underscores")
            });
        }

        let priority = r.required_int("priority");
        if let Some(priority) = priority {
            r.check(priority >= 0, || {
                format!("priority must be non-negative, got {priority}")
            });
        }

        let state = r.required_str("state").and_then(|s| match s.parse::<JobQueueState>() {
            Ok(state) => Some(state),
            Err(_) => {
                r.problem(format!("state must be ENABLED or DISABLED, got {s:?}"));
                None
            }
        });

        let scheduling_policy_arn = r.optional_str("scheduling_policy_arn");
        if let Some(arn) = &scheduling_policy_arn {
            r.check(is_arn(arn), || {
                format!("scheduling_policy_arn {arn:?} is not an ARN")
            });
        }

        let compute_environment_order = read_compute_environments(&mut r);
        let tags = r.string_map("tags");

        r.finish(|| {
            Some(JobQueue {
                name: name?,
                priority: priority?,
                state: state?,
                scheduling_policy_arn,
                compute_environment_order,
                tags,
            })
        })
    }
}

/// Replace each entry's `order` with its rank among the entries.
///
/// Batch only uses `order` to rank environments, and the console renumbers
/// it freely (a lone environment at 0 becomes 1). Values that are not a list
/// of well-formed entries are returned as they are.
fn rank_compute_environments(value: &FieldValue) -> FieldValue {
    let Some(items) = value.as_list() else {
        return value.clone();
    };
    let mut entries = Vec::with_capacity(items.len());
    for item in items {
        let entry = item.as_map().and_then(|entry| {
            Some(ComputeEnvironmentOrder {
                compute_environment: entry_str(entry, "compute_environment")?.to_string(),
                order: entry.get("order").and_then(FieldValue::as_int)?,
            })
        });
        match entry {
            Some(entry) => entries.push(entry),
            None => return value.clone(),
        }
    }

    entries.sort_by(|a, b| {
        a.order
            .cmp(&b.order)
            .then_with(|| a.compute_environment.cmp(&b.compute_environment))
    });
    FieldValue::List(
        entries
            .into_iter()
            .enumerate()
            .map(|(rank, entry)| {
                ComputeEnvironmentOrder {
                    order: rank as i64,
                    ..entry
                }
                .to_value()
            })
            .collect(),
    )
}

fn read_compute_environments(r: &mut FieldReader<'_>) -> Vec<ComputeEnvironmentOrder> {
    let items = r.list("compute_environment_order");
    r.check(items.len() <= MAX_COMPUTE_ENVIRONMENTS, || {
        format!(
            "compute_environment_order has {} entries, at most {MAX_COMPUTE_ENVIRONMENTS} allowed",
            items.len()
        )
    });

    let mut out = Vec::with_capacity(items.len());
    let mut seen = BTreeSet::new();
    for (i, item) in items.iter().enumerate() {
        let Some(entry) = item.as_map() else {
            r.problem(format!("compute_environment_order[{i}] must be a map"));
            continue;
        };
        let ce = entry_str(entry, "compute_environment");
        let order = entry.get("order").and_then(FieldValue::as_int);
        match (ce, order) {
            (Some(ce), Some(order)) => {
                r.check(is_arn(ce), || {
                    format!(
                        "compute_environment_order[{i}].compute_environment {ce:?} is not an ARN"
                    )
                });
                r.check(order >= 0, || {
                    format!("compute_environment_order[{i}].order must be non-negative")
                });
                r.check(seen.insert(ce.to_string()), || {
                    format!("compute environment {ce:?} listed more than once")
                });
                out.push(ComputeEnvironmentOrder {
                    compute_environment: ce.to_string(),
                    order,
                });
            }
            _ => r.problem(format!(
                "compute_environment_order[{i}] needs a compute_environment string and an order int"
            )),
        }
    }
    out
}
