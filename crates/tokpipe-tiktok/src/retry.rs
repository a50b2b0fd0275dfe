//! Retry policy with exponential backoff.
//!
//! - 5xx, 429 and transport errors are retried up to `max_retries` times
//! - The delay doubles every attempt, starting at `base_delay_ms`
//! - A `Retry-After` on 429 is used verbatim instead
//! - Other 4xx responses fail immediately

use std::time::Duration;

use tracing::{info_span, warn, Instrument};

use tokpipe_models::Clock;

use crate::error::{TikTokError, TikTokResult};
use crate::metrics::record_retry;

/// Retry policy configuration.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the first try.
    pub max_retries: u32,
    /// Delay before the first retry (in milliseconds).
    pub base_delay_ms: u64,
    /// Cap on a computed delay (in milliseconds). Retry-After is not capped.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
        }
    }
}

impl RetryConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_retries: std::env::var("TIKTOK_MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_retries),
            base_delay_ms: std::env::var("TIKTOK_RETRY_BASE_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.base_delay_ms),
            max_delay_ms: std::env::var("TIKTOK_RETRY_MAX_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_delay_ms),
        }
    }
}

/// Delay before retry number `attempt + 1` (attempt is zero-based).
pub fn backoff_delay(config: &RetryConfig, attempt: u32, retry_after_ms: Option<u64>) -> Duration {
    if let Some(after) = retry_after_ms {
        return Duration::from_millis(after);
    }
    let factor = 2u64.checked_pow(attempt).unwrap_or(u64::MAX);
    Duration::from_millis(config.base_delay_ms.saturating_mul(factor).min(config.max_delay_ms))
}

/// Execute an async operation with retry, sleeping on `clock`.
pub async fn with_retry<T, F, Fut>(
    config: &RetryConfig,
    clock: &dyn Clock,
    operation: &str,
    op: F,
) -> TikTokResult<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = TikTokResult<T>>,
{
    let mut last_error = None;

    for attempt in 0..=config.max_retries {
        let span = info_span!("tiktok_retry", operation = %operation, attempt = attempt + 1);

        match op().instrument(span).await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < config.max_retries => {
                let delay = backoff_delay(config, attempt, e.retry_after_ms());

                warn!(
                    operation = %operation,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    "TikTok request failed, retrying: {}",
                    e
                );

                record_retry(operation);
                clock.sleep(delay).await;
                last_error = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_error.unwrap_or_else(|| TikTokError::invalid_response("retry loop exhausted")))
}
