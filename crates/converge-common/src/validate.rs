//! Identifier validators shared by resource kinds

use std::sync::LazyLock;

use regex::Regex;

static QBUSINESS_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9-]{35}$").expect("valid regex"));

static DISPLAY_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9_-]*$").expect("valid regex"));

static ARN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^arn:aws[a-zA-Z-]*:[a-zA-Z0-9-]+:[a-z0-9-]*:(\d{12})?:.+$").expect("valid regex")
});

static DB_IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z][a-zA-Z0-9-]*$").expect("valid regex"));

static ACCOUNT_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{12}|all)$").expect("valid regex"));

static JOB_QUEUE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9A-Za-z][0-9A-Za-z_-]{0,127}$").expect("valid regex"));

/// Amazon Q Business application, index, retriever and data source IDs
pub fn is_qbusiness_id(value: &str) -> bool {
    QBUSINESS_ID.is_match(value)
}

/// Display names: 1-1000 chars, alphanumeric start, then `[a-zA-Z0-9_-]`
pub fn is_display_name(value: &str) -> bool {
    is_len_between(value, 1, 1000) && DISPLAY_NAME.is_match(value)
}

pub fn is_arn(value: &str) -> bool {
    ARN.is_match(value)
}

/// RDS identifiers: letter first, no trailing or doubled hyphen, max 255
pub fn is_db_identifier(value: &str) -> bool {
    is_len_between(value, 1, 255)
        && DB_IDENTIFIER.is_match(value)
        && !value.ends_with('-')
        && !value.contains("--")
}

/// A 12-digit AWS account ID or the literal `all`
pub fn is_account_id(value: &str) -> bool {
    ACCOUNT_ID.is_match(value)
}

pub fn is_job_queue_name(value: &str) -> bool {
    JOB_QUEUE_NAME.is_match(value)
}

/// Character-count bounds, inclusive
pub fn is_len_between(value: &str, min: usize, max: usize) -> bool {
    (min..=max).contains(&value.chars().count())
}
