//! Request rate limiting.
//!
//! Handlers never see the backend: the middleware asks a `RateLimiter`
//! for a decision per client key and reports the remaining allowance in
//! `X-RateLimit-Remaining`.

use std::num::NonZeroU32;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::middleware::StateInformationMiddleware;
use governor::state::keyed::DefaultKeyedStateStore;
use governor::Quota;
use tracing::warn;

use crate::config::{ApiConfig, RateLimitBackend};

/// Allow/deny plus what is left in the current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub remaining: u32,
}

impl RateDecision {
    pub fn allow(remaining: u32) -> Self {
        Self {
            allowed: true,
            remaining,
        }
    }

    pub fn deny() -> Self {
        Self {
            allowed: false,
            remaining: 0,
        }
    }
}

#[async_trait]
pub trait RateLimiter: Send + Sync {
    async fn check(&self, key: &str) -> RateDecision;
}

/// Limiters tracked before stale keys are dropped.
const MAX_TRACKED_KEYS: usize = 10_000;

type KeyedLimiter = governor::RateLimiter<
    String,
    DefaultKeyedStateStore<String>,
    DefaultClock,
    StateInformationMiddleware,
>;

/// In-process GCRA limiter keyed by client.
pub struct GovernorLimiter {
    limiter: KeyedLimiter,
}

impl GovernorLimiter {
    pub fn new(requests_per_second: u32, burst: u32) -> Self {
        let rps = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(burst).unwrap_or(rps);
        let quota = Quota::per_second(rps).allow_burst(burst);
        Self {
            limiter: governor::RateLimiter::keyed(quota)
                .with_middleware::<StateInformationMiddleware>(),
        }
    }
}

#[async_trait]
impl RateLimiter for GovernorLimiter {
    async fn check(&self, key: &str) -> RateDecision {
        if self.limiter.len() > MAX_TRACKED_KEYS {
            self.limiter.retain_recent();
        }
        match self.limiter.check_key(&key.to_string()) {
            Ok(snapshot) => RateDecision::allow(snapshot.remaining_burst_capacity()),
            Err(_) => RateDecision::deny(),
        }
    }
}

/// Fixed-window counter in Redis, shared across API instances.
///
/// Fails open: a Redis outage logs and lets the request through.
pub struct RedisWindowLimiter {
    client: redis::Client,
    prefix: String,
    limit: u32,
    window: Duration,
}

impl RedisWindowLimiter {
    pub fn new(redis_url: &str, limit: u32, window: Duration) -> redis::RedisResult<Self> {
        Ok(Self {
            client: redis::Client::open(redis_url)?,
            prefix: "tokpipe:ratelimit".to_string(),
            limit: limit.max(1),
            window: window.max(Duration::from_secs(1)),
        })
    }

    fn window_key(&self, key: &str, now: SystemTime) -> String {
        let secs = now.duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
        format!("{}:{}:{}", self.prefix, key, secs / self.window.as_secs())
    }

    async fn increment(&self, key: &str) -> redis::RedisResult<u64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let window_key = self.window_key(key, SystemTime::now());
        let (count,): (u64,) = redis::pipe()
            .atomic()
            .incr(&window_key, 1u64)
            .expire(&window_key, self.window.as_secs() as i64 + 1)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl RateLimiter for RedisWindowLimiter {
    async fn check(&self, key: &str) -> RateDecision {
        match self.increment(key).await {
            Ok(count) if count <= self.limit as u64 => {
                RateDecision::allow(self.limit - count as u32)
            }
            Ok(_) => RateDecision::deny(),
            Err(e) => {
                warn!("Rate limiter unavailable, allowing request: {}", e);
                RateDecision::allow(self.limit)
            }
        }
    }
}

/// Build the configured limiter.
pub fn limiter_from_config(config: &ApiConfig) -> anyhow::Result<std::sync::Arc<dyn RateLimiter>> {
    Ok(match config.rate_limit_backend {
        RateLimitBackend::Memory => std::sync::Arc::new(GovernorLimiter::new(
            config.rate_limit_rps,
            config.rate_limit_burst,
        )),
        RateLimitBackend::Redis => std::sync::Arc::new(RedisWindowLimiter::new(
            &config.redis_url,
            config.rate_limit_burst,
            Duration::from_secs(1),
        )?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_governor_denies_after_burst() {
        let limiter = GovernorLimiter::new(1, 2);

        let first = limiter.check("10.0.0.1").await;
        assert!(first.allowed);
        assert_eq!(first.remaining, 1);

        let second = limiter.check("10.0.0.1").await;
        assert!(second.allowed);
        assert_eq!(second.remaining, 0);

        assert_eq!(limiter.check("10.0.0.1").await, RateDecision::deny());
    }

    #[tokio::test]
    async fn test_governor_keys_are_independent() {
        let limiter = GovernorLimiter::new(1, 1);
        assert!(limiter.check("a").await.allowed);
        assert!(!limiter.check("a").await.allowed);
        assert!(limiter.check("b").await.allowed);
    }

    #[test]
    fn test_redis_window_key() {
        let limiter =
            RedisWindowLimiter::new("redis://localhost:6379", 10, Duration::from_secs(60)).unwrap();
        let at = UNIX_EPOCH + Duration::from_secs(3_600 + 59);
        assert_eq!(limiter.window_key("1.2.3.4", at), "tokpipe:ratelimit:1.2.3.4:60");
        let next = UNIX_EPOCH + Duration::from_secs(3_660);
        assert_eq!(limiter.window_key("1.2.3.4", next), "tokpipe:ratelimit:1.2.3.4:61");
    }

    #[tokio::test]
    async fn test_redis_outage_fails_open() {
        let limiter =
            RedisWindowLimiter::new("redis://127.0.0.1:1", 5, Duration::from_secs(1)).unwrap();
        let decision = limiter.check("k").await;
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 5);
    }
}
