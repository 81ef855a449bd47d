//! Q Business retriever

use super::{FieldReader, ResourceDefinition, validate_as};
use crate::schema::{FieldSchema, ResourceSchema, UpdateMode};
use converge_common::validate::{is_arn, is_display_name, is_qbusiness_id};
use converge_common::{FieldValue, Fields, ResourceKind};
use std::collections::BTreeMap;

/// The index a retriever reads from. Exactly one must be configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetrieverIndex {
    Kendra(String),
    Native(String),
}

impl RetrieverIndex {
    fn field_name(&self) -> &'static str {
        match self {
            RetrieverIndex::Kendra(_) => "kendra_index_id",
            RetrieverIndex::Native(_) => "native_index_id",
        }
    }

    pub fn index_id(&self) -> &str {
        match self {
            RetrieverIndex::Kendra(id) | RetrieverIndex::Native(id) => id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Retriever {
    pub application_id: String,
    pub display_name: String,
    pub iam_service_role_arn: Option<String>,
    pub index: RetrieverIndex,
    pub tags: BTreeMap<String, String>,
}

impl ResourceDefinition for Retriever {
    const KIND: ResourceKind = ResourceKind::QbusinessRetriever;

    fn schema() -> ResourceSchema {
        ResourceSchema::new(Self::KIND)
            .field(FieldSchema::required("application_id").immutable())
            .field(FieldSchema::required("display_name"))
            .field(FieldSchema::optional("iam_service_role_arn"))
            .field(FieldSchema::optional("kendra_index_id"))
            .field(FieldSchema::optional("native_index_id"))
            .field(FieldSchema::optional("tags"))
            .field(FieldSchema::computed("retriever_id"))
            .field(FieldSchema::computed("arn"))
            .update_mode(UpdateMode::Synchronous)
            .validator(validate_as::<Retriever>)
    }

    fn to_fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert("application_id".into(), self.application_id.as_str().into());
        fields.insert("display_name".into(), self.display_name.as_str().into());
        if let Some(arn) = &self.iam_service_role_arn {
            fields.insert("iam_service_role_arn".into(), arn.as_str().into());
        }
        fields.insert(self.index.field_name().into(), self.index.index_id().into());
        if !self.tags.is_empty() {
            fields.insert(
                "tags".into(),
                FieldValue::map(
                    self.tags.iter().map(|(k, v)| (k.as_str(), v.as_str().into())),
                ),
            );
        }
        fields
    }

    fn from_fields(fields: &Fields) -> Result<Self, Vec<String>> {
        let mut r = FieldReader::new(fields);

        let application_id = r.required_str("application_id");
        if let Some(id) = &application_id {
            r.check(is_qbusiness_id(id), || {
                format!("application_id {id:?} must be a valid application ID")
            });
        }

        let display_name = r.required_str("display_name");
        if let Some(name) = &display_name {
            r.check(is_display_name(name), || {
                format!(
                    "display_name {name:?} must be 1-1000 characters, begin with a letter or number and contain only alphanumeric, underscore, or hyphen characters"
                )
            });
        }

        let iam_service_role_arn = r.optional_str("iam_service_role_arn");
        if let Some(arn) = &iam_service_role_arn {
            r.check(is_arn(arn), || format!("iam_service_role_arn {arn:?} is not an ARN"));
        }

        let kendra = r.optional_str("kendra_index_id");
        let native = r.optional_str("native_index_id");
        let index = match (kendra, native) {
            (Some(id), None) => Some(RetrieverIndex::Kendra(id)),
            (None, Some(id)) => Some(RetrieverIndex::Native(id)),
            (Some(_), Some(_)) => {
                r.problem("only one of kendra_index_id or native_index_id may be set");
                None
            }
            (None, None) => {
                r.problem("one of kendra_index_id or native_index_id is required");
                None
            }
        };
        if let Some(index) = &index {
            r.check(is_qbusiness_id(index.index_id()), || {
                format!("{} {:?} must be a valid index ID", index.field_name(), index.index_id())
            });
        }

        let tags = r.string_map("tags");

        r.finish(|| {
            Some(Retriever {
                application_id: application_id?,
                display_name: display_name?,
                iam_service_role_arn,
                index: index?,
                tags,
            })
        })
    }
}
