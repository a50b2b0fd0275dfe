//! HTTP API over the content pipeline.
//!
//! This crate provides:
//! - Pipeline runs, pending-batch processing and manual posting sweeps
//! - Job progress polling, retries and seeding from products
//! - Next posting slot lookup
//! - Pluggable rate limiting, security headers and Prometheus metrics

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod rate_limit;
pub mod routes;
pub mod state;

pub use config::{ApiConfig, RateLimitBackend};
pub use error::{ApiError, ApiResult};
pub use rate_limit::{GovernorLimiter, RateDecision, RateLimiter, RedisWindowLimiter};
pub use routes::create_router;
pub use state::AppState;
