//! Default configuration values shared by the engine and its adapters
//!
//! Provisioning latency differs by resource kind, so timeouts are per kind
//! and per operation. Polling and retry defaults follow what AWS describe
//! APIs tolerate without throttling.

use crate::kind::ResourceKind;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Initial delay between status polls
pub const DEFAULT_POLL_INITIAL_DELAY_MS: u64 = 2_000;

/// Polls never happen more often than this
pub const DEFAULT_POLL_MIN_DELAY_MS: u64 = 1_000;

/// Polls never happen less often than this
pub const DEFAULT_POLL_MAX_DELAY_MS: u64 = 15_000;

/// Growth factor of the poll interval
pub const DEFAULT_POLL_FACTOR: f32 = 2.0;

/// Maximum attempts for a remote call failing with transient errors
pub const DEFAULT_RETRY_MAX_ATTEMPTS: usize = 8;

/// Initial delay before retrying a transient failure
pub const DEFAULT_RETRY_MIN_DELAY_MS: u64 = 2_000;

/// Cap on the delay between retries of a transient failure
pub const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 30_000;

/// Per-operation convergence deadlines for one resource kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationTimeouts {
    pub create_secs: u64,
    pub update_secs: u64,
    pub delete_secs: u64,
}

impl OperationTimeouts {
    pub const fn minutes(create: u64, update: u64, delete: u64) -> Self {
        Self {
            create_secs: create * 60,
            update_secs: update * 60,
            delete_secs: delete * 60,
        }
    }

    pub fn create(&self) -> Duration {
        Duration::from_secs(self.create_secs)
    }

    pub fn update(&self) -> Duration {
        Duration::from_secs(self.update_secs)
    }

    pub fn delete(&self) -> Duration {
        Duration::from_secs(self.delete_secs)
    }
}

/// Default timeouts for a resource kind
pub fn default_timeouts(kind: ResourceKind) -> OperationTimeouts {
    match kind {
        ResourceKind::JobQueue => OperationTimeouts::minutes(10, 10, 10),
        // Snapshots copy storage; creation routinely takes tens of minutes
        ResourceKind::DbSnapshot => OperationTimeouts::minutes(20, 5, 10),
        ResourceKind::QbusinessRetriever => OperationTimeouts::minutes(10, 10, 10),
        ResourceKind::QbusinessUser => OperationTimeouts::minutes(5, 5, 5),
    }
}
