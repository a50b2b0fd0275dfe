//! Model invariant errors.

use thiserror::Error;

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Violations of record invariants.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("Job {0} cannot be completed without a post id and post time")]
    MissingPostRecord(String),

    #[error("Job {0} cannot be scheduled without a rendered video")]
    MissingVideo(String),

    #[error("Invalid transition for job {job_id}: {from} -> {to}")]
    InvalidTransition {
        job_id: String,
        from: String,
        to: String,
    },

    #[error("Job {0} is already being processed by another pipeline run")]
    PipelineBusy(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ModelError {
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}
