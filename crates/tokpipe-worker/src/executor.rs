//! Periodic sweep executor.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use tokpipe_models::{BatchSummary, SweepSummary};

use crate::config::WorkerConfig;
use crate::error::WorkerResult;
use crate::orchestrator::Orchestrator;
use crate::retry::FailureTracker;

/// Runs the posting sweep (and optionally pending pipelines) on an interval.
pub struct SweepExecutor {
    config: WorkerConfig,
    orchestrator: Arc<Orchestrator>,
    shutdown: watch::Sender<bool>,
}

/// What one tick did.
#[derive(Debug, Clone, Copy, Default)]
pub struct TickReport {
    pub pipelines: Option<BatchSummary>,
    pub sweep: SweepSummary,
}

impl SweepExecutor {
    pub fn new(config: WorkerConfig, orchestrator: Arc<Orchestrator>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            config,
            orchestrator,
            shutdown,
        }
    }

    /// Handle that stops `run` when `true` is sent.
    pub fn shutdown_handle(&self) -> watch::Sender<bool> {
        self.shutdown.clone()
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Loop until shutdown. A tick in progress always runs to completion.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            interval_secs = self.config.sweep_interval.as_secs(),
            auto_pipeline_batch = self.config.auto_pipeline_batch,
            "Starting sweep executor"
        );

        let mut shutdown_rx = self.shutdown.subscribe();
        let mut interval = tokio::time::interval(self.config.sweep_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut failures = FailureTracker::new(self.config.max_logged_failures);

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping executor");
                        break;
                    }
                }
                _ = interval.tick() => {
                    match self.tick().await {
                        Ok(report) => {
                            failures.record_success();
                            debug!(?report, "Tick finished");
                        }
                        Err(e) => {
                            if failures.record_failure() {
                                error!("Sweep failed: {}", e);
                            }
                        }
                    }
                }
            }
        }

        info!("Sweep executor stopped");
        Ok(())
    }

    /// One pass: pending pipelines first, then the posting sweep unless
    /// auto-posting is off.
    pub async fn tick(&self) -> WorkerResult<TickReport> {
        let pipelines = if self.config.auto_pipeline_batch > 0 {
            match self
                .orchestrator
                .process_pending_pipelines(self.config.auto_pipeline_batch)
                .await
            {
                Ok(summary) => Some(summary),
                Err(e) => {
                    warn!("Pending pipelines failed: {}", e);
                    None
                }
            }
        } else {
            None
        };

        let sweep = if self.orchestrator.config().auto_post {
            self.orchestrator.process_scheduled_jobs().await?
        } else {
            debug!("Auto-post disabled, skipping posting sweep");
            SweepSummary::default()
        };
        Ok(TickReport { pipelines, sweep })
    }
}
