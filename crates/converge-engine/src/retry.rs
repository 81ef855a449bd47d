//! Retry of transient control plane failures

use backon::{ExponentialBuilder, Retryable};
use converge_common::RemoteError;
use converge_common::defaults::{
    DEFAULT_RETRY_MAX_ATTEMPTS, DEFAULT_RETRY_MAX_DELAY_MS, DEFAULT_RETRY_MIN_DELAY_MS,
};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Backoff applied to remote calls that fail with throttling or unavailability
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: usize,
    pub min_delay: Duration,
    pub max_delay: Duration,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RETRY_MAX_ATTEMPTS,
            min_delay: Duration::from_millis(DEFAULT_RETRY_MIN_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_RETRY_MAX_DELAY_MS),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    fn backoff(&self) -> ExponentialBuilder {
        let builder = ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_attempts.saturating_sub(1));
        if self.jitter {
            builder.with_jitter()
        } else {
            builder
        }
    }
}

/// Run `call`, retrying while it fails with a transient error.
///
/// Permanent errors return immediately. When attempts run out the last
/// transient error is returned as-is; callers escalate it.
pub async fn retry_transient<T, F, Fut>(
    policy: &RetryPolicy,
    what: &str,
    call: F,
) -> Result<T, RemoteError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RemoteError>>,
{
    call.retry(policy.backoff())
        .when(RemoteError::is_transient)
        .notify(|e: &RemoteError, dur: Duration| {
            warn!(
                call = %what,
                delay_ms = dur.as_millis(),
                error = %e,
                "Transient control plane error, retrying"
            );
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn policy(max_attempts: usize) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            min_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
            jitter: false,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_until_success() {
        let attempts = AtomicUsize::new(0);
        let result = retry_transient(&policy(5), "create", || async {
            match attempts.fetch_add(1, Ordering::SeqCst) {
                0 | 1 => Err(RemoteError::throttled("Rate exceeded")),
                _ => Ok("done"),
            }
        })
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_errors_are_not_retried() {
        let attempts = AtomicUsize::new(0);
        let result: Result<(), _> = retry_transient(&policy(5), "create", || async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(RemoteError::invalid("bad parameter"))
        })
        .await;

        assert!(!result.unwrap_err().is_transient());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let attempts = AtomicUsize::new(0);
        let result: Result<(), _> = retry_transient(&policy(3), "delete", || async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(RemoteError::unavailable("service unavailable"))
        })
        .await;

        assert!(result.unwrap_err().is_transient());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }
}
