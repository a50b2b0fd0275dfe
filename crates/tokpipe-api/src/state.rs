//! Application state.

use std::sync::Arc;

use tokpipe_worker::Orchestrator;

use crate::config::ApiConfig;
use crate::rate_limit::RateLimiter;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub orchestrator: Arc<Orchestrator>,
    pub rate_limiter: Arc<dyn RateLimiter>,
}

impl AppState {
    pub fn new(
        config: ApiConfig,
        orchestrator: Arc<Orchestrator>,
        rate_limiter: Arc<dyn RateLimiter>,
    ) -> Self {
        Self {
            config,
            orchestrator,
            rate_limiter,
        }
    }
}
