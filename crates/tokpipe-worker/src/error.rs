//! Pipeline error types.

use thiserror::Error;

use tokpipe_models::{ModelError, PipelineStage};

pub type WorkerResult<T> = Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Stage failure carrying the original cause as text
    #[error("{stage} stage failed: {message}")]
    Stage {
        stage: PipelineStage,
        message: String,
    },

    #[error("No active posting account available")]
    NoActiveAccount,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Media error: {0}")]
    Media(#[from] tokpipe_media::MediaError),

    #[error("AI error: {0}")]
    Ai(#[from] tokpipe_ai::AiError),

    #[error("Store error: {0}")]
    Store(#[from] tokpipe_store::StoreError),

    #[error("Storage error: {0}")]
    Storage(#[from] tokpipe_storage::StorageError),

    #[error("{0}")]
    TikTok(#[from] tokpipe_tiktok::TikTokError),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    pub fn stage(stage: PipelineStage, msg: impl Into<String>) -> Self {
        Self::Stage {
            stage,
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether the job record involved does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, PipelineError::Store(e) if e.is_not_found())
    }

    /// Whether the platform refused the post because the account is out of
    /// daily quota.
    pub fn is_daily_limit(&self) -> bool {
        matches!(
            self,
            PipelineError::TikTok(tokpipe_tiktok::TikTokError::DailyLimitReached { .. })
        )
    }
}
