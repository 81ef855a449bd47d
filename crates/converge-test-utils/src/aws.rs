//! AWS test utilities
//!
//! Provides region detection and unique identifiers for live AWS tests.

use chrono::Utc;

/// Get the AWS region for tests.
///
/// Checks environment variables in order:
/// 1. AWS_REGION
/// 2. AWS_DEFAULT_REGION
/// 3. Falls back to us-east-2
pub fn get_test_region() -> String {
    std::env::var("AWS_REGION")
        .or_else(|_| std::env::var("AWS_DEFAULT_REGION"))
        .unwrap_or_else(|_| "us-east-2".to_string())
}

/// Generate a unique run ID for test resources.
///
/// Format: `test-{timestamp_ms}-{counter}` so IDs stay unique even when
/// tests start simultaneously.
pub fn test_run_id() -> String {
    use std::sync::atomic::{AtomicU32, Ordering};
    static COUNTER: AtomicU32 = AtomicU32::new(0);

    let ts = Utc::now().timestamp_millis();
    let counter = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("test-{}-{}", ts, counter)
}

/// Generate a DB snapshot identifier for live tests.
///
/// RDS identifiers must start with a letter, which `test_run_id` satisfies.
pub fn test_snapshot_identifier() -> String {
    format!("converge-{}", test_run_id())
}

/// Source DB instance for live snapshot tests, from `CONVERGE_TEST_DB_INSTANCE`.
pub fn test_db_instance() -> Option<String> {
    std::env::var("CONVERGE_TEST_DB_INSTANCE").ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_id_format() {
        let run_id = test_run_id();
        assert!(run_id.starts_with("test-"));
        let parts: Vec<&str> = run_id.strip_prefix("test-").unwrap().split('-').collect();
        assert_eq!(parts.len(), 2);
        parts[0].parse::<i64>().expect("Should be valid timestamp");
        parts[1].parse::<u32>().expect("Should be valid counter");
    }

    #[test]
    fn test_run_ids_are_unique() {
        assert_ne!(test_run_id(), test_run_id());
    }

    #[test]
    fn snapshot_identifier_starts_with_letter() {
        let id = test_snapshot_identifier();
        assert!(id.starts_with("converge-test-"));
    }
}
