//! Typed resource definitions
//!
//! Each kind has a typed struct that converts to and from the loosely-typed
//! [`Fields`] used at the control plane boundary. `from_fields` doubles as
//! the kind's validator and reports every problem at once.

mod db_snapshot;
mod job_queue;
mod retriever;
mod user;

pub use db_snapshot::DbSnapshot;
pub use job_queue::{ComputeEnvironmentOrder, JobQueue, JobQueueState};
pub use retriever::{Retriever, RetrieverIndex};
pub use user::{User, UserAlias};

use crate::schema::ResourceSchema;
use converge_common::{FieldValue, Fields, ResourceKind, ResourceSpec};
use std::collections::{BTreeMap, HashMap};

/// A resource kind with a typed representation
pub trait ResourceDefinition: Sized {
    const KIND: ResourceKind;

    fn schema() -> ResourceSchema;

    fn to_fields(&self) -> Fields;

    /// Parse and validate, collecting every problem found
    fn from_fields(fields: &Fields) -> Result<Self, Vec<String>>;

    fn to_spec(&self) -> ResourceSpec {
        ResourceSpec::new(Self::KIND, self.to_fields())
    }
}

/// Adapter so `from_fields` can serve as a schema validator
pub(crate) fn validate_as<D: ResourceDefinition>(fields: &Fields) -> Vec<String> {
    D::from_fields(fields).err().unwrap_or_default()
}

/// Built-in schema for a kind
pub fn builtin_schema(kind: ResourceKind) -> ResourceSchema {
    match kind {
        ResourceKind::JobQueue => JobQueue::schema(),
        ResourceKind::DbSnapshot => DbSnapshot::schema(),
        ResourceKind::QbusinessRetriever => Retriever::schema(),
        ResourceKind::QbusinessUser => User::schema(),
    }
}

/// Schemas the reconciler dispatches on
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    schemas: HashMap<ResourceKind, ResourceSchema>,
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl SchemaRegistry {
    /// Registry holding every built-in kind
    pub fn builtin() -> Self {
        use strum::IntoEnumIterator;
        let schemas = ResourceKind::iter()
            .map(|kind| (kind, builtin_schema(kind)))
            .collect();
        Self { schemas }
    }

    pub fn empty() -> Self {
        Self {
            schemas: HashMap::new(),
        }
    }

    /// Register or replace the schema for `schema.kind`
    pub fn with(mut self, schema: ResourceSchema) -> Self {
        self.schemas.insert(schema.kind, schema);
        self
    }

    pub fn get(&self, kind: ResourceKind) -> Option<&ResourceSchema> {
        self.schemas.get(&kind)
    }
}

/// Pulls typed values out of a field set, accumulating problems
pub(crate) struct FieldReader<'a> {
    fields: &'a Fields,
    problems: Vec<String>,
}

impl<'a> FieldReader<'a> {
    pub fn new(fields: &'a Fields) -> Self {
        Self {
            fields,
            problems: Vec::new(),
        }
    }

    pub fn problem(&mut self, message: impl Into<String>) {
        self.problems.push(message.into());
    }

    pub fn optional_str(&mut self, name: &str) -> Option<String> {
        match self.fields.get(name)? {
            FieldValue::Str(s) => Some(s.clone()),
            other => {
                self.wrong_type(name, "string", other);
                None
            }
        }
    }

    pub fn required_str(&mut self, name: &str) -> Option<String> {
        if !self.fields.contains_key(name) {
            self.problem(format!("{name} is required"));
            return None;
        }
        self.optional_str(name)
    }

    pub fn optional_int(&mut self, name: &str) -> Option<i64> {
        match self.fields.get(name)? {
            FieldValue::Int(i) => Some(*i),
            other => {
                self.wrong_type(name, "int", other);
                None
            }
        }
    }

    pub fn required_int(&mut self, name: &str) -> Option<i64> {
        if !self.fields.contains_key(name) {
            self.problem(format!("{name} is required"));
            return None;
        }
        self.optional_int(name)
    }

    /// List field; absent reads as empty
    pub fn list(&mut self, name: &str) -> &'a [FieldValue] {
        match self.fields.get(name) {
            None => &[],
            Some(FieldValue::List(items)) => items,
            Some(other) => {
                self.wrong_type(name, "list", other);
                &[]
            }
        }
    }

    /// List of strings; non-string entries are reported and skipped
    pub fn string_list(&mut self, name: &str) -> Vec<String> {
        let items = self.list(name);
        let mut out = Vec::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            match item.as_str() {
                Some(s) => out.push(s.to_string()),
                None => self.wrong_type(&format!("{name}[{i}]"), "string", item),
            }
        }
        out
    }

    /// Map of strings; absent reads as empty
    pub fn string_map(&mut self, name: &str) -> BTreeMap<String, String> {
        let entries = match self.fields.get(name) {
            None => return BTreeMap::new(),
            Some(FieldValue::Map(entries)) => entries,
            Some(other) => {
                self.wrong_type(name, "map", other);
                return BTreeMap::new();
            }
        };
        let mut out = BTreeMap::new();
        for (key, value) in entries {
            match value.as_str() {
                Some(s) => {
                    out.insert(key.clone(), s.to_string());
                }
                None => self.wrong_type(&format!("{name}.{key}"), "string", value),
            }
        }
        out
    }

    /// Check a condition, recording `message` when it fails
    pub fn check(&mut self, ok: bool, message: impl FnOnce() -> String) {
        if !ok {
            self.problems.push(message());
        }
    }

    /// Finish reading, returning the value only if no problem was recorded
    pub fn finish<T>(self, build: impl FnOnce() -> Option<T>) -> Result<T, Vec<String>> {
        if !self.problems.is_empty() {
            return Err(self.problems);
        }
        build().ok_or_else(|| vec!["incomplete field set".to_string()])
    }

    fn wrong_type(&mut self, name: &str, expected: &str, got: &FieldValue) {
        self.problems
            .push(format!("{name} must be a {expected}, got {}", got.type_name()));
    }
}

/// Read a string key from a sub-object
pub(crate) fn entry_str<'v>(entry: &'v BTreeMap<String, FieldValue>, key: &str) -> Option<&'v str> {
    entry.get(key).and_then(FieldValue::as_str)
}
