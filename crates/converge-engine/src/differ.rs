//! Desired vs observed comparison
//!
//! Computed fields never take part. Fields compared `Unordered` are treated
//! as multisets: entries the remote returns in a different order (or with
//! identical entries shuffled) are reported as `reordered` and never count
//! as drift. A field's normalizer runs on both sides first, so values that
//! only differ in a representation the remote may rewrite are reported the
//! same way.

use crate::schema::{Comparison, Mutability, ResourceSchema};
use converge_common::{FieldValue, Fields};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Field names that differ between desired and observed state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Diff {
    pub changed_mutable: BTreeSet<String>,
    pub changed_immutable: BTreeSet<String>,
    /// Same elements, different order. Not drift.
    pub reordered: BTreeSet<String>,
}

impl Diff {
    /// True when nothing needs to be sent to the remote
    pub fn is_empty(&self) -> bool {
        self.changed_mutable.is_empty() && self.changed_immutable.is_empty()
    }

    pub fn requires_replacement(&self) -> bool {
        !self.changed_immutable.is_empty()
    }
}

/// One drifted field, for reporting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriftRecord {
    pub field: String,
    pub desired: Option<FieldValue>,
    pub observed: Option<FieldValue>,
    pub immutable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldChange {
    Same,
    Reordered,
    Changed,
}

/// Compare desired fields against observed fields under `schema`.
pub fn diff(schema: &ResourceSchema, desired: &Fields, observed: &Fields) -> Diff {
    let mut result = Diff::default();

    for field in schema.compared_fields() {
        let want = desired.get(field.name);
        let have = observed.get(field.name);

        let change = match field.normalizer {
            Some(normalize) => {
                let (want_n, have_n) = (want.map(normalize), have.map(normalize));
                match compare(field.comparison, want_n.as_ref(), have_n.as_ref()) {
                    // Equal once normalized but not as given
                    FieldChange::Same if want.is_some() && have.is_some() && want != have => {
                        FieldChange::Reordered
                    }
                    change => change,
                }
            }
            None => compare(field.comparison, want, have),
        };

        match change {
            FieldChange::Same => {}
            FieldChange::Reordered => {
                result.reordered.insert(field.name.to_string());
            }
            FieldChange::Changed => {
                let immutable = match field.mutability {
                    Mutability::Mutable => false,
                    Mutability::Immutable => true,
                    Mutability::ImmutableOnceSet => have.is_some_and(|v| !is_empty_value(v)),
                };
                if immutable {
                    result.changed_immutable.insert(field.name.to_string());
                } else {
                    result.changed_mutable.insert(field.name.to_string());
                }
            }
        }
    }

    result
}

/// Per-field drift records for every changed field.
pub fn drift(schema: &ResourceSchema, desired: &Fields, observed: &Fields) -> Vec<DriftRecord> {
    let changes = diff(schema, desired, observed);
    changes
        .changed_immutable
        .iter()
        .map(|name| (name, true))
        .chain(changes.changed_mutable.iter().map(|name| (name, false)))
        .map(|(name, immutable)| DriftRecord {
            field: name.clone(),
            desired: desired.get(name).cloned(),
            observed: observed.get(name).cloned(),
            immutable,
        })
        .collect()
}

fn compare(
    comparison: Comparison,
    want: Option<&FieldValue>,
    have: Option<&FieldValue>,
) -> FieldChange {
    if want == have {
        return FieldChange::Same;
    }

    match comparison {
        Comparison::Exact => FieldChange::Changed,
        Comparison::Unordered => match (normalized(want), normalized(have)) {
            (Some(a), Some(b)) if a == b => {
                // Absent and empty are the same collection
                if a.is_empty() {
                    FieldChange::Same
                } else {
                    FieldChange::Reordered
                }
            }
            _ => FieldChange::Changed,
        },
    }
}

/// Sorted elements of a collection value, or None for scalars
fn normalized(value: Option<&FieldValue>) -> Option<Vec<&FieldValue>> {
    match value {
        None => Some(Vec::new()),
        Some(FieldValue::List(items)) => {
            let mut sorted: Vec<&FieldValue> = items.iter().collect();
            sorted.sort();
            Some(sorted)
        }
        Some(_) => None,
    }
}

fn is_empty_value(value: &FieldValue) -> bool {
    match value {
        FieldValue::Str(s) => s.is_empty(),
        FieldValue::List(items) => items.is_empty(),
        FieldValue::Map(m) => m.is_empty(),
        FieldValue::Bool(_) | FieldValue::Int(_) => false,
    }
}
