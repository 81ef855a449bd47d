//! Q Business user mapping

use super::{FieldReader, ResourceDefinition, entry_str, validate_as};
use crate::schema::{FieldSchema, ResourceSchema, UpdateMode};
use converge_common::validate::{is_len_between, is_qbusiness_id};
use converge_common::{FieldValue, Fields, ResourceKind};

const MAX_ALIASES: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct UserAlias {
    pub user_id: String,
    pub datasource_id: String,
    pub index_id: String,
}

impl UserAlias {
    fn to_value(&self) -> FieldValue {
        FieldValue::map([
            ("user_id", FieldValue::from(self.user_id.as_str())),
            ("datasource_id", FieldValue::from(self.datasource_id.as_str())),
            ("index_id", FieldValue::from(self.index_id.as_str())),
        ])
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub application_id: String,
    pub user_id: String,
    pub user_aliases: Vec<UserAlias>,
}

impl ResourceDefinition for User {
    const KIND: ResourceKind = ResourceKind::QbusinessUser;

    fn schema() -> ResourceSchema {
        ResourceSchema::new(Self::KIND)
            .field(FieldSchema::required("application_id").immutable())
            .field(FieldSchema::required("user_id").immutable())
            .field(FieldSchema::optional("user_aliases").unordered())
            .update_mode(UpdateMode::Synchronous)
            .validator(validate_as::<User>)
    }

    fn to_fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert("application_id".into(), self.application_id.as_str().into());
        fields.insert("user_id".into(), self.user_id.as_str().into());
        if !self.user_aliases.is_empty() {
            fields.insert(
                "user_aliases".into(),
                FieldValue::List(self.user_aliases.iter().map(UserAlias::to_value).collect()),
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

        let user_id = r.required_str("user_id");
        if let Some(id) = &user_id {
            r.check(is_len_between(id, 1, 2048), || {
                "user_id must be 1-2048 characters".to_string()
            });
        }

        let items = r.list("user_aliases");
        r.check(items.len() <= MAX_ALIASES, || {
            format!("user_aliases has {} entries, at most {MAX_ALIASES} allowed", items.len())
        });

        let mut user_aliases = Vec::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            let Some(entry) = item.as_map() else {
                r.problem(format!("user_aliases[{i}] must be a map"));
                continue;
            };
            let (Some(alias_user), Some(datasource), Some(index)) = (
                entry_str(entry, "user_id"),
                entry_str(entry, "datasource_id"),
                entry_str(entry, "index_id"),
            ) else {
                r.problem(format!(
                    "user_aliases[{i}] needs user_id, datasource_id and index_id strings"
                ));
                continue;
            };
            r.check(is_len_between(alias_user, 1, 2048), || {
                format!("user_aliases[{i}].user_id must be 1-2048 characters")
            });
            r.check(is_qbusiness_id(datasource), || {
                format!(
                    "user_aliases[{i}].datasource_id {datasource:?} must be a valid datasource ID"
                )
            });
            r.check(is_qbusiness_id(index), || {
                format!("user_aliases[{i}].index_id {index:?} must be a valid index ID")
            });
            user_aliases.push(UserAlias {
                user_id: alias_user.to_string(),
                datasource_id: datasource.to_string(),
                index_id: index.to_string(),
            });
        }

        r.finish(|| {
            Some(User {
                application_id: application_id?,
                user_id: user_id?,
                user_aliases,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use converge_test_utils::fixtures::{DATASOURCE_ID, INDEX_ID, user_fields};

    fn alias(user: &str) -> FieldValue {
        UserAlias {
            user_id: user.into(),
            datasource_id: DATASOURCE_ID.into(),
            index_id: INDEX_ID.into(),
        }
        .to_value()
    }

    #[test]
    fn parses_aliases() {
        let mut fields = user_fields("someone@example.com");
        fields.insert(
            "user_aliases".into(),
            FieldValue::List(vec![alias("a"), alias("b")]),
        );

        let user = User::from_fields(&fields).unwrap();
        assert_eq!(user.user_aliases.len(), 2);
        assert_eq!(user.to_fields(), fields);
    }

    #[test]
    fn caps_alias_count() {
        let mut fields = user_fields("someone@example.com");
        let aliases = (0..=MAX_ALIASES).map(|i| alias(&format!("u{i}"))).collect();
        fields.insert("user_aliases".into(), FieldValue::List(aliases));

        let problems = User::from_fields(&fields).unwrap_err();
        assert_eq!(problems, vec!["user_aliases has 101 entries, at most 100 allowed"]);
    }

    #[test]
    fn incomplete_alias_is_reported() {
        let mut fields = user_fields("someone@example.com");
        fields.insert(
            "user_aliases".into(),
            FieldValue::List(vec![FieldValue::map([("user_id", FieldValue::from("a"))])]),
        );

        let problems = User::from_fields(&fields).unwrap_err();
        assert!(problems[0].contains("needs user_id, datasource_id and index_id"));
    }
}
