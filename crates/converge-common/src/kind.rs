//! Resource kinds managed by converge
//!
//! The kind selects the schema, the typed definition and the default
//! timeouts used for a resource at dispatch time.

use serde::{Deserialize, Serialize};

/// Types of remote resources converge knows how to reconcile
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
    strum::EnumIter,
)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Batch job queue (asynchronous create/update/delete)
    JobQueue,
    /// RDS DB snapshot (provisions storage, slow to create)
    DbSnapshot,
    /// Amazon Q Business retriever
    QbusinessRetriever,
    /// Amazon Q Business user mapping
    QbusinessUser,
}

impl ResourceKind {
    /// Human-readable name for logging
    pub fn description(self) -> &'static str {
        match self {
            ResourceKind::JobQueue => "Batch job queue",
            ResourceKind::DbSnapshot => "RDS DB snapshot",
            ResourceKind::QbusinessRetriever => "Q Business retriever",
            ResourceKind::QbusinessUser => "Q Business user",
        }
    }

    /// Parse from string, returning None for unknown values
    pub fn parse(s: &str) -> Option<Self> {
        s.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn parses_snake_case_names() {
        assert_eq!(ResourceKind::parse("job_queue"), Some(ResourceKind::JobQueue));
        assert_eq!(ResourceKind::parse("DB_SNAPSHOT"), Some(ResourceKind::DbSnapshot));
        assert_eq!(
            ResourceKind::parse("qbusiness_retriever"),
            Some(ResourceKind::QbusinessRetriever)
        );
        assert_eq!(ResourceKind::parse("queue"), None);
    }

    #[test]
    fn display_matches_serde_name() {
        for kind in ResourceKind::iter() {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{kind}\""));
        }
    }
}
