//! Error types for AI service calls.

use thiserror::Error;

use tokpipe_media::MediaError;

pub type AiResult<T> = Result<T, AiError>;

#[derive(Debug, Error)]
pub enum AiError {
    #[error("AI configuration error: {0}")]
    Config(String),

    #[error("AI API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Failed to parse AI response: {0}")]
    Parse(String),

    #[error("AI response contained no content")]
    EmptyResponse,

    #[error("Generation operation failed: {0}")]
    Operation(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AiError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    pub fn operation(msg: impl Into<String>) -> Self {
        Self::Operation(msg.into())
    }

    /// Whether trying a fallback model could help.
    pub fn is_model_specific(&self) -> bool {
        match self {
            AiError::Api { status, .. } => *status == 404 || *status == 429 || *status >= 500,
            AiError::Parse(_) | AiError::EmptyResponse => true,
            _ => false,
        }
    }
}

impl From<AiError> for MediaError {
    fn from(err: AiError) -> Self {
        MediaError::generation_failed(err.to_string())
    }
}
