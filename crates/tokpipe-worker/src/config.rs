//! Worker configuration.

use std::time::Duration;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// How often the posting sweep runs
    pub sweep_interval: Duration,
    /// Pending pipelines advanced per tick (0 disables)
    pub auto_pipeline_batch: usize,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// Consecutive sweep failures logged before suppression
    pub max_logged_failures: u32,
    /// Attempts for each artifact upload
    pub upload_retries: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(60),
            auto_pipeline_batch: 0,
            shutdown_timeout: Duration::from_secs(30),
            max_logged_failures: 5,
            upload_retries: 3,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            sweep_interval: Duration::from_secs(
                std::env::var("SWEEP_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .filter(|s: &u64| *s > 0)
                    .unwrap_or(60),
            ),
            auto_pipeline_batch: std::env::var("AUTO_PIPELINE_BATCH")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(0),
            shutdown_timeout: Duration::from_secs(
                std::env::var("WORKER_SHUTDOWN_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            max_logged_failures: std::env::var("WORKER_MAX_LOGGED_FAILURES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),
            upload_retries: std::env::var("WORKER_UPLOAD_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(3),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        std::env::remove_var("SWEEP_INTERVAL_SECS");
        std::env::remove_var("AUTO_PIPELINE_BATCH");
        let config = WorkerConfig::from_env();
        assert_eq!(config.sweep_interval, Duration::from_secs(60));
        assert_eq!(config.auto_pipeline_batch, 0);
    }

    #[test]
    #[serial]
    fn test_zero_interval_rejected() {
        std::env::set_var("SWEEP_INTERVAL_SECS", "0");
        std::env::set_var("AUTO_PIPELINE_BATCH", "4");
        let config = WorkerConfig::from_env();
        assert_eq!(config.sweep_interval, Duration::from_secs(60));
        assert_eq!(config.auto_pipeline_batch, 4);
        std::env::remove_var("SWEEP_INTERVAL_SECS");
        std::env::remove_var("AUTO_PIPELINE_BATCH");
    }
}
