//! Specs, handles and observed state

use crate::fields::Fields;
use crate::kind::ResourceKind;
use crate::status::ResourceStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Desired state of a remote object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSpec {
    pub kind: ResourceKind,
    pub fields: Fields,
}

impl ResourceSpec {
    pub fn new(kind: ResourceKind, fields: Fields) -> Self {
        Self { kind, fields }
    }
}

/// Opaque identifier issued by the control plane on create
///
/// Valid between a successful create and a successful delete. Never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceHandle {
    kind: ResourceKind,
    id: String,
}

impl ResourceHandle {
    pub fn new(kind: ResourceKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}

/// What a single control plane read returns
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteSnapshot {
    pub fields: Fields,
    pub status: ResourceStatus,
}

impl RemoteSnapshot {
    pub fn new(fields: Fields, status: ResourceStatus) -> Self {
        Self { fields, status }
    }
}

/// Immutable snapshot of a remote object, superseded by the next read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedState {
    pub fields: Fields,
    pub status: ResourceStatus,
    pub observed_at: DateTime<Utc>,
}

impl ObservedState {
    /// Stamp a control plane read with the current time
    pub fn capture(snapshot: RemoteSnapshot) -> Self {
        Self {
            fields: snapshot.fields,
            status: snapshot.status,
            observed_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_display() {
        let handle = ResourceHandle::new(ResourceKind::JobQueue, "arn:aws:batch:q1");
        assert_eq!(handle.to_string(), "job_queue/arn:aws:batch:q1");
        assert_eq!(handle.kind(), ResourceKind::JobQueue);
    }

    #[test]
    fn capture_keeps_fields_and_status() {
        let mut fields = Fields::new();
        fields.insert("name".into(), "q1".into());
        let observed =
            ObservedState::capture(RemoteSnapshot::new(fields.clone(), ResourceStatus::Pending));
        assert_eq!(observed.fields, fields);
        assert_eq!(observed.status, ResourceStatus::Pending);
    }
}
