//! Per-kind field schemas
//!
//! A schema tells the differ which fields force replacement, which are
//! computed by the remote and never compared, and which hold collections
//! whose order carries no meaning. It also tells the reconciler whether an
//! update is visible on the next read or has to be polled for.

use converge_common::{FieldValue, Fields, ResourceKind, ResourceStatus};
use std::collections::BTreeSet;

/// How a field's desired and observed values are compared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Comparison {
    #[default]
    Exact,
    /// Lists compare as multisets; position is ignored
    Unordered,
}

/// Whether a field can be changed in place
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mutability {
    #[default]
    Mutable,
    /// Any change forces replacement
    Immutable,
    /// May be set once in place; changing or clearing a set value forces replacement
    ImmutableOnceSet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRole {
    Required,
    Optional,
    /// Filled in by the remote; never sent, never compared
    Computed,
}

/// Maps a value to the form it is compared in
pub type Normalizer = fn(&FieldValue) -> FieldValue;

#[derive(Debug, Clone)]
pub struct FieldSchema {
    pub name: &'static str,
    pub role: FieldRole,
    pub mutability: Mutability,
    pub comparison: Comparison,
    /// Applied to both sides before comparing
    pub normalizer: Option<Normalizer>,
    /// Only accepted by the remote once the object has converged
    pub deferred: bool,
}

impl FieldSchema {
    const fn with_role(name: &'static str, role: FieldRole) -> Self {
        Self {
            name,
            role,
            mutability: Mutability::Mutable,
            comparison: Comparison::Exact,
            normalizer: None,
            deferred: false,
        }
    }

    pub const fn required(name: &'static str) -> Self {
        Self::with_role(name, FieldRole::Required)
    }

    pub const fn optional(name: &'static str) -> Self {
        Self::with_role(name, FieldRole::Optional)
    }

    pub const fn computed(name: &'static str) -> Self {
        Self::with_role(name, FieldRole::Computed)
    }

    pub const fn immutable(mut self) -> Self {
        self.mutability = Mutability::Immutable;
        self
    }

    pub const fn immutable_once_set(mut self) -> Self {
        self.mutability = Mutability::ImmutableOnceSet;
        self
    }

    pub const fn unordered(mut self) -> Self {
        self.comparison = Comparison::Unordered;
        self
    }

    /// Compare values after passing them through `normalizer`
    pub const fn normalized(mut self, normalizer: Normalizer) -> Self {
        self.normalizer = Some(normalizer);
        self
    }

    pub const fn deferred(mut self) -> Self {
        self.deferred = true;
        self
    }

    pub fn is_computed(&self) -> bool {
        self.role == FieldRole::Computed
    }
}

/// Whether the remote applies updates before the update call returns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum UpdateMode {
    /// Re-read once after the update call
    #[default]
    Synchronous,
    /// Poll until the object settles again
    Asynchronous,
}

/// Kind-specific validation run after the structural checks
pub type Validator = fn(&Fields) -> Vec<String>;

#[derive(Debug, Clone)]
pub struct ResourceSchema {
    pub kind: ResourceKind,
    pub fields: Vec<FieldSchema>,
    pub update_mode: UpdateMode,
    /// Status that counts as converged after create or update
    pub ready_status: ResourceStatus,
    validator: Option<Validator>,
}

impl ResourceSchema {
    pub fn new(kind: ResourceKind) -> Self {
        Self {
            kind,
            fields: Vec::new(),
            update_mode: UpdateMode::default(),
            ready_status: ResourceStatus::Available,
            validator: None,
        }
    }

    pub fn field(mut self, field: FieldSchema) -> Self {
        self.fields.push(field);
        self
    }

    pub fn update_mode(mut self, mode: UpdateMode) -> Self {
        self.update_mode = mode;
        self
    }

    pub fn validator(mut self, validator: Validator) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Fields the differ compares
    pub fn compared_fields(&self) -> impl Iterator<Item = &FieldSchema> {
        self.fields.iter().filter(|f| !f.is_computed())
    }

    /// Names of fields that must wait for convergence before being sent
    pub fn deferred_fields(&self) -> BTreeSet<&'static str> {
        self.fields
            .iter()
            .filter(|f| f.deferred)
            .map(|f| f.name)
            .collect()
    }

    /// Check a desired field set, returning every problem found.
    ///
    /// Structural checks (required present, no unknown or computed fields)
    /// run first, then the kind's own validator.
    pub fn check(&self, fields: &Fields) -> Vec<String> {
        let mut problems = Vec::new();

        for field in &self.fields {
            if field.role == FieldRole::Required && !fields.contains_key(field.name) {
                problems.push(format!("{} is required", field.name));
            }
        }

        for name in fields.keys() {
            match self.get(name) {
                None => problems.push(format!("{name} is not a {} field", self.kind)),
                Some(field) if field.is_computed() => {
                    problems.push(format!("{name} is computed by the remote and cannot be set"))
                }
                Some(_) => {}
            }
        }

        if let Some(validator) = self.validator {
            for problem in validator(fields) {
                if !problems.contains(&problem) {
                    problems.push(problem);
                }
            }
        }

        problems
    }

    /// Drop computed and unknown fields from an observed field set.
    pub fn project(&self, observed: &Fields) -> Fields {
        observed
            .iter()
            .filter(|(name, _)| self.get(name).is_some_and(|f| !f.is_computed()))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }
}
