//! Media metrics.

use metrics::{counter, histogram};

/// Metric name constants for consistency.
pub mod names {
    /// Encoder invocations by operation and status.
    pub const ENCODER_RUNS_TOTAL: &str = "tokpipe_encoder_runs_total";

    /// Encoder wall time in seconds by operation.
    pub const ENCODER_DURATION_SECONDS: &str = "tokpipe_encoder_duration_seconds";

    /// Non-fatal render steps that were skipped, by step.
    pub const RENDER_DEGRADED_TOTAL: &str = "tokpipe_render_degraded_total";
}

/// Record a finished encoder invocation.
pub fn record_encoder_run(operation: &str, success: bool, elapsed_secs: f64) {
    counter!(
        names::ENCODER_RUNS_TOTAL,
        "operation" => operation.to_string(),
        "status" => if success { "success" } else { "failure" }
    )
    .increment(1);

    histogram!(
        names::ENCODER_DURATION_SECONDS,
        "operation" => operation.to_string()
    )
    .record(elapsed_secs);
}

/// Record a non-fatal step that fell back.
pub fn record_degraded(step: &str) {
    counter!(names::RENDER_DEGRADED_TOTAL, "step" => step.to_string()).increment(1);
}
