//! Retry utilities.
//!
//! Two policies live here:
//! - `retry_async`: in-call exponential backoff for flaky dependencies
//!   (artifact uploads, store writes)
//! - `PostRetryPolicy`: the persisted job-level policy for failed posts,
//!   which requeues a job `2^n` minutes out and gives up after three failures

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use tokpipe_models::{Clock, Job, JobStatus};

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (not including the initial attempt).
    pub max_retries: u32,
    /// Base delay for exponential backoff (doubles each attempt).
    pub base_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Operation name for logging.
    pub operation_name: String,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            operation_name: "operation".to_string(),
        }
    }
}

impl RetryConfig {
    pub fn new(operation_name: impl Into<String>) -> Self {
        Self {
            operation_name: operation_name.into(),
            ..Default::default()
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Result of a retry operation.
#[derive(Debug)]
pub enum RetryResult<T, E> {
    Success(T),
    /// Operation failed after all retries exhausted.
    Failed { error: E, attempts: u32 },
}

impl<T, E> RetryResult<T, E> {
    pub fn is_success(&self) -> bool {
        matches!(self, RetryResult::Success(_))
    }

    pub fn into_result(self) -> Result<T, E> {
        match self {
            RetryResult::Success(v) => Ok(v),
            RetryResult::Failed { error, .. } => Err(error),
        }
    }
}

/// Execute an async operation with retry, sleeping on `clock`.
pub async fn retry_async<F, Fut, T, E>(
    config: &RetryConfig,
    clock: &dyn Clock,
    operation: F,
) -> RetryResult<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0u32;

    loop {
        match operation().await {
            Ok(value) => return RetryResult::Success(value),
            Err(e) if attempt < config.max_retries => {
                let delay = config.delay_for_attempt(attempt);
                attempt += 1;
                debug!(
                    "{} attempt {} failed, retrying in {:?}: {}",
                    config.operation_name, attempt, delay, e
                );
                clock.sleep(delay).await;
            }
            Err(e) => {
                return RetryResult::Failed {
                    error: e,
                    attempts: attempt + 1,
                }
            }
        }
    }
}

/// State tracker for repeated operations that may fail intermittently.
///
/// The sweep loop uses it to stop flooding logs when the store or the
/// platform is down for a while.
#[derive(Debug, Default)]
pub struct FailureTracker {
    consecutive_failures: u32,
    max_logged_failures: u32,
    suppressed: bool,
}

impl FailureTracker {
    pub fn new(max_logged_failures: u32) -> Self {
        Self {
            consecutive_failures: 0,
            max_logged_failures,
            suppressed: false,
        }
    }

    /// Record a successful operation (resets failure count).
    pub fn record_success(&mut self) {
        if self.consecutive_failures > 0 && self.suppressed {
            debug!(
                "Operation recovered after {} consecutive failures",
                self.consecutive_failures
            );
        }
        self.consecutive_failures = 0;
        self.suppressed = false;
    }

    /// Record a failed operation.
    ///
    /// Returns `true` if this failure should be logged (not suppressed).
    pub fn record_failure(&mut self) -> bool {
        self.consecutive_failures += 1;

        if self.consecutive_failures <= self.max_logged_failures {
            true
        } else if self.consecutive_failures == self.max_logged_failures + 1 {
            self.suppressed = true;
            warn!(
                "Suppressing further failure logs after {} consecutive failures",
                self.max_logged_failures
            );
            false
        } else {
            false
        }
    }

    pub fn failure_count(&self) -> u32 {
        self.consecutive_failures
    }
}

/// Failed post attempts tolerated before a job fails permanently.
pub const MAX_POST_RETRIES: u32 = 3;

/// What happened to a job after a failed post attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Requeued { at: DateTime<Utc>, retry_count: u32 },
    GaveUp { retry_count: u32 },
}

impl RetryDecision {
    /// Read the decision back from a job the policy was applied to.
    pub fn of(job: &Job) -> Self {
        match (job.status, job.scheduled_at) {
            (JobStatus::Pending, Some(at)) => RetryDecision::Requeued {
                at,
                retry_count: job.retry_count,
            },
            _ => RetryDecision::GaveUp {
                retry_count: job.retry_count,
            },
        }
    }
}

/// Persisted retry budget for post attempts.
#[derive(Debug, Clone, Copy)]
pub struct PostRetryPolicy {
    pub max_retries: u32,
}

impl Default for PostRetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: MAX_POST_RETRIES,
        }
    }
}

impl PostRetryPolicy {
    /// Delay before the `n`th retry: exactly `2^n` minutes.
    pub fn delay_for(&self, n: u32) -> chrono::Duration {
        chrono::Duration::minutes(2i64.saturating_pow(n))
    }

    /// Count one failed attempt against the job and requeue or fail it.
    pub fn apply(&self, job: &mut Job, error: &str, now: DateTime<Utc>) -> RetryDecision {
        job.retry_count += 1;
        let n = job.retry_count;

        if n < self.max_retries {
            let at = now + self.delay_for(n);
            job.requeue(at, error, now);
            job.set_progress(job.progress, format!("Post failed, retry {} scheduled", n), now);
            RetryDecision::Requeued { at, retry_count: n }
        } else {
            job.fail(format!("max retries exceeded: {}", error), now);
            job.set_progress(job.progress, "Failed", now);
            RetryDecision::GaveUp { retry_count: n }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokpipe_models::{ManualClock, ProductId};

    #[test]
    fn test_retry_config_delay_calculation() {
        let config = RetryConfig::new("test").with_base_delay(Duration::from_millis(100));

        assert_eq!(config.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(config.delay_for_attempt(2), Duration::from_millis(400));
        assert_eq!(config.delay_for_attempt(10), Duration::from_secs(10));
    }

    #[test]
    fn test_failure_tracker_suppression() {
        let mut tracker = FailureTracker::new(3);

        assert!(tracker.record_failure());
        assert!(tracker.record_failure());
        assert!(tracker.record_failure());

        // 4th failure triggers suppression message (returns false)
        assert!(!tracker.record_failure());
        assert!(!tracker.record_failure());

        tracker.record_success();
        assert_eq!(tracker.failure_count(), 0);
        assert!(tracker.record_failure());
    }

    #[tokio::test]
    async fn test_retry_async_eventual_success() {
        let clock = ManualClock::new(Utc::now());
        let config = RetryConfig::new("upload").with_base_delay(Duration::from_millis(100));
        let call_count = AtomicU32::new(0);

        let result = retry_async(&config, &clock, || {
            let count = call_count.fetch_add(1, Ordering::SeqCst);
            async move {
                if count < 2 {
                    Err("transient error")
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.into_result(), Ok(42));
        assert_eq!(call_count.load(Ordering::SeqCst), 3);
        assert_eq!(
            clock.sleeps(),
            vec![Duration::from_millis(100), Duration::from_millis(200)]
        );
    }

    #[tokio::test]
    async fn test_retry_async_gives_up() {
        let clock = ManualClock::new(Utc::now());
        let config = RetryConfig::new("upload").with_max_retries(2);

        let result: RetryResult<(), &str> =
            retry_async(&config, &clock, || async { Err("down") }).await;

        match result {
            RetryResult::Failed { error, attempts } => {
                assert_eq!(error, "down");
                assert_eq!(attempts, 3);
            }
            RetryResult::Success(_) => panic!("expected failure"),
        }
    }

    #[test]
    fn test_post_delays_are_powers_of_two_minutes() {
        let policy = PostRetryPolicy::default();
        assert_eq!(policy.delay_for(1), chrono::Duration::minutes(2));
        assert_eq!(policy.delay_for(2), chrono::Duration::minutes(4));
        assert_eq!(policy.delay_for(3), chrono::Duration::minutes(8));
    }

    #[test]
    fn test_third_failure_is_permanent() {
        let now = Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap();
        let policy = PostRetryPolicy::default();
        let mut job = Job::new(ProductId::from("p"), "Lamp", now);

        assert_eq!(
            policy.apply(&mut job, "HTTP 503", now),
            RetryDecision::Requeued {
                at: now + chrono::Duration::minutes(2),
                retry_count: 1
            }
        );
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(RetryDecision::of(&job), RetryDecision::Requeued {
            at: now + chrono::Duration::minutes(2),
            retry_count: 1
        });

        policy.apply(&mut job, "HTTP 503", now);
        assert_eq!(job.scheduled_at, Some(now + chrono::Duration::minutes(4)));

        assert_eq!(
            policy.apply(&mut job, "HTTP 503", now),
            RetryDecision::GaveUp { retry_count: 3 }
        );
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.as_deref().unwrap().contains("max retries"));
    }
}
