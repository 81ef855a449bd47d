//! Reconciler configuration
//!
//! Every setting has a default, so an empty TOML file (or no file at all)
//! yields a working configuration. Timeouts can be overridden per kind:
//!
//! ```toml
//! max_concurrency = 4
//!
//! [poll]
//! max_delay_ms = 30000
//!
//! [timeouts.db_snapshot]
//! create_secs = 3600
//! update_secs = 300
//! delete_secs = 600
//! ```

use crate::error::Operation;
use crate::retry::RetryPolicy;
use crate::wait::WaitConfig;
use anyhow::{Context, Result};
use converge_common::defaults::{
    self, DEFAULT_POLL_FACTOR, DEFAULT_POLL_INITIAL_DELAY_MS, DEFAULT_POLL_MAX_DELAY_MS,
    DEFAULT_POLL_MIN_DELAY_MS, DEFAULT_RETRY_MAX_ATTEMPTS, DEFAULT_RETRY_MAX_DELAY_MS,
    DEFAULT_RETRY_MIN_DELAY_MS,
};
use converge_common::{OperationTimeouts, ResourceKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollSettings {
    pub initial_delay_ms: u64,
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    pub factor: f32,
    pub jitter: bool,
    /// Consecutive not-found reads tolerated right after a create
    pub not_found_tolerance: u32,
}

impl PollSettings {
    fn check(&self) -> Result<()> {
        if self.min_delay_ms > self.max_delay_ms {
            anyhow::bail!(
                "poll.min_delay_ms ({}) exceeds poll.max_delay_ms ({})",
                self.min_delay_ms,
                self.max_delay_ms
            );
        }
        if !(self.min_delay_ms..=self.max_delay_ms).contains(&self.initial_delay_ms) {
            anyhow::bail!(
                "poll.initial_delay_ms ({}) must lie within [{}, {}]",
                self.initial_delay_ms,
                self.min_delay_ms,
                self.max_delay_ms
            );
        }
        if !self.factor.is_finite() || self.factor < 1.0 {
            anyhow::bail!("poll.factor must be finite and at least 1, got {}", self.factor);
        }
        Ok(())
    }
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            initial_delay_ms: DEFAULT_POLL_INITIAL_DELAY_MS,
            min_delay_ms: DEFAULT_POLL_MIN_DELAY_MS,
            max_delay_ms: DEFAULT_POLL_MAX_DELAY_MS,
            factor: DEFAULT_POLL_FACTOR,
            jitter: true,
            not_found_tolerance: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: usize,
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter: bool,
}

impl RetrySettings {
    fn check(&self) -> Result<()> {
        if self.max_attempts == 0 {
            anyhow::bail!("retry.max_attempts must be at least 1");
        }
        if self.min_delay_ms > self.max_delay_ms {
            anyhow::bail!(
                "retry.min_delay_ms ({}) exceeds retry.max_delay_ms ({})",
                self.min_delay_ms,
                self.max_delay_ms
            );
        }
        Ok(())
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RETRY_MAX_ATTEMPTS,
            min_delay_ms: DEFAULT_RETRY_MIN_DELAY_MS,
            max_delay_ms: DEFAULT_RETRY_MAX_DELAY_MS,
            jitter: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcilerConfig {
    pub poll: PollSettings,
    pub retry: RetrySettings,
    /// Per-kind overrides, keyed by kind name
    pub timeouts: BTreeMap<String, OperationTimeouts>,
    /// Plans run at once by the orchestrator
    pub max_concurrency: usize,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            poll: PollSettings::default(),
            retry: RetrySettings::default(),
            timeouts: BTreeMap::new(),
            max_concurrency: 8,
        }
    }
}

impl ReconcilerConfig {
    /// Load from a TOML file, rejecting unknown kinds in `[timeouts]`.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).context("Failed to parse TOML")?;
        for kind in config.timeouts.keys() {
            if ResourceKind::parse(kind).is_none() {
                anyhow::bail!("Unknown resource kind in [timeouts]: {kind}");
            }
        }
        if config.max_concurrency == 0 {
            anyhow::bail!("max_concurrency must be at least 1");
        }
        config.poll.check()?;
        config.retry.check()?;
        Ok(config)
    }

    /// Override the timeouts of one kind
    pub fn with_timeouts(mut self, kind: ResourceKind, timeouts: OperationTimeouts) -> Self {
        self.timeouts.insert(kind.to_string(), timeouts);
        self
    }

    pub fn timeouts_for(&self, kind: ResourceKind) -> OperationTimeouts {
        self.timeouts
            .iter()
            .find(|(name, _)| ResourceKind::parse(name) == Some(kind))
            .map(|(_, timeouts)| *timeouts)
            .unwrap_or_else(|| defaults::default_timeouts(kind))
    }

    /// Convergence deadline for an operation on a kind
    pub fn timeout(&self, kind: ResourceKind, operation: Operation) -> Duration {
        let timeouts = self.timeouts_for(kind);
        match operation {
            Operation::Create => timeouts.create(),
            Operation::Update => timeouts.update(),
            Operation::Delete => timeouts.delete(),
            // Reads never poll; any positive deadline works
            Operation::Read => timeouts.update(),
        }
    }

    pub fn wait_config(&self, kind: ResourceKind, operation: Operation) -> WaitConfig {
        WaitConfig {
            initial_delay: Duration::from_millis(self.poll.initial_delay_ms),
            min_delay: Duration::from_millis(self.poll.min_delay_ms),
            max_delay: Duration::from_millis(self.poll.max_delay_ms),
            factor: self.poll.factor,
            timeout: self.timeout(kind, operation),
            jitter: self.poll.jitter,
            not_found_tolerance: self.poll.not_found_tolerance,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            min_delay: Duration::from_millis(self.retry.min_delay_ms),
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
            jitter: self.retry.jitter,
        }
    }
}
