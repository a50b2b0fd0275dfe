//! Pipeline and sweep metrics.

use std::time::Duration;

use metrics::{counter, histogram};

use tokpipe_models::{PipelineStage, SweepSummary};

pub mod names {
    /// Pipeline runs by final stage and outcome.
    pub const PIPELINE_RUNS_TOTAL: &str = "tokpipe_pipeline_runs_total";

    /// Non-fatal stage degradations by stage.
    pub const DEGRADED_TOTAL: &str = "tokpipe_pipeline_degraded_total";

    /// Sweep job outcomes.
    pub const SWEEP_JOBS_TOTAL: &str = "tokpipe_sweep_jobs_total";

    pub const SWEEP_DURATION_SECONDS: &str = "tokpipe_sweep_duration_seconds";
}

pub fn record_pipeline_run(stage: PipelineStage, success: bool) {
    counter!(
        names::PIPELINE_RUNS_TOTAL,
        "stage" => stage.as_str(),
        "outcome" => if success { "success" } else { "failure" }
    )
    .increment(1);
}

pub fn record_degraded(stage: &'static str) {
    counter!(names::DEGRADED_TOTAL, "stage" => stage).increment(1);
}

pub fn record_sweep(summary: &SweepSummary, elapsed: Duration) {
    for (outcome, count) in [
        ("posted", summary.posted),
        ("retried", summary.retried),
        ("failed", summary.failed),
        ("skipped", summary.skipped),
    ] {
        if count > 0 {
            counter!(names::SWEEP_JOBS_TOTAL, "outcome" => outcome).increment(count as u64);
        }
    }
    histogram!(names::SWEEP_DURATION_SECONDS).record(elapsed.as_secs_f64());
}
