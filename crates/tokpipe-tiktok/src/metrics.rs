//! TikTok client metrics.

use metrics::{counter, histogram};

pub mod names {
    /// Requests by operation and HTTP status.
    pub const REQUESTS_TOTAL: &str = "tokpipe_tiktok_requests_total";

    /// Retry attempts by operation.
    pub const RETRIES_TOTAL: &str = "tokpipe_tiktok_retries_total";

    /// Request latency in seconds by operation.
    pub const LATENCY_SECONDS: &str = "tokpipe_tiktok_latency_seconds";

    /// Publish attempts by outcome.
    pub const POSTS_TOTAL: &str = "tokpipe_tiktok_posts_total";

    /// Token refreshes by outcome.
    pub const TOKEN_REFRESHES_TOTAL: &str = "tokpipe_tiktok_token_refreshes_total";
}

pub fn record_request(operation: &str, status: u16, latency_ms: f64) {
    counter!(
        names::REQUESTS_TOTAL,
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    histogram!(
        names::LATENCY_SECONDS,
        "operation" => operation.to_string()
    )
    .record(latency_ms / 1000.0);
}

pub fn record_retry(operation: &str) {
    counter!(
        names::RETRIES_TOTAL,
        "operation" => operation.to_string()
    )
    .increment(1);
}

pub fn record_post(outcome: &'static str) {
    counter!(names::POSTS_TOTAL, "outcome" => outcome).increment(1);
}

pub fn record_token_refresh(success: bool) {
    counter!(
        names::TOKEN_REFRESHES_TOTAL,
        "outcome" => if success { "success" } else { "failure" }
    )
    .increment(1);
}
