//! Pipeline run options and result DTOs.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::composition::VideoOptions;
use crate::job::{Job, JobId, JobStatus};

/// Pipeline stage reached by a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Created,
    Hooks,
    Video,
    Scheduled,
    Posted,
    Notified,
    Failed,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Created => "created",
            PipelineStage::Hooks => "hooks",
            PipelineStage::Video => "video",
            PipelineStage::Scheduled => "scheduled",
            PipelineStage::Posted => "posted",
            PipelineStage::Notified => "notified",
            PipelineStage::Failed => "failed",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-run switches; unset fields fall back to the pipeline config.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PipelineOptions {
    #[serde(default)]
    pub generate_hooks: Option<bool>,
    #[serde(default)]
    pub generate_video: Option<bool>,
    #[serde(default)]
    pub auto_schedule: Option<bool>,
    #[serde(default)]
    pub video_options: VideoOptions,
}

/// Outcome of one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PipelineResult {
    pub success: bool,
    pub stage: PipelineStage,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PipelineResult {
    pub fn ok(stage: PipelineStage, message: impl Into<String>) -> Self {
        Self {
            success: true,
            stage,
            message: message.into(),
            error: None,
        }
    }

    pub fn failed(stage: PipelineStage, message: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            stage,
            message: message.into(),
            error: Some(error.into()),
        }
    }
}

/// Per-item counts for bulk operations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct BatchSummary {
    pub processed: u32,
    pub success: u32,
    pub failed: u32,
}

impl BatchSummary {
    pub fn record(&mut self, ok: bool) {
        self.processed += 1;
        if ok {
            self.success += 1;
        } else {
            self.failed += 1;
        }
    }
}

/// Outcome of one posting sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SweepSummary {
    /// Due jobs found
    pub due: u32,
    pub posted: u32,
    /// Failed attempts returned to the queue
    pub retried: u32,
    /// Jobs that failed permanently
    pub failed: u32,
    /// Jobs skipped (claimed elsewhere or rescheduled for quota)
    pub skipped: u32,
}

/// Progress snapshot for UI polling.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobProgressView {
    pub id: JobId,
    pub progress: u8,
    pub progress_step: Option<String>,
    pub status: JobStatus,
}

impl From<&Job> for JobProgressView {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id.clone(),
            progress: job.progress,
            progress_step: job.progress_step.clone(),
            status: job.status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_summary_counts() {
        let mut summary = BatchSummary::default();
        for ok in [true, false, true, true, false] {
            summary.record(ok);
        }
        assert_eq!(summary, BatchSummary { processed: 5, success: 3, failed: 2 });
    }

    #[test]
    fn test_pipeline_result_serialization() {
        let result = PipelineResult::ok(PipelineStage::Scheduled, "scheduled");
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["stage"], "scheduled");
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_options_deserialize_camel_case() {
        let opts: PipelineOptions = serde_json::from_str(
            r#"{"generateHooks": false, "videoOptions": {"textOverlay": true, "overlayStyle": "bold"}}"#,
        )
        .unwrap();
        assert_eq!(opts.generate_hooks, Some(false));
        assert_eq!(opts.video_options.text_overlay, Some(true));
        assert!(opts.auto_schedule.is_none());
    }
}
