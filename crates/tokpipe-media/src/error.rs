//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur while producing a video.
///
/// `Fetch`, `Tts`, `Encode` and `Timeout` abort a render. Music mixing,
/// subtitle burn-in, watermarking and thumbnail extraction also surface
/// these errors from their own functions, but the compositor downgrades
/// them to warnings.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFprobe not found in PATH")]
    FfprobeNotFound,

    #[error("Fetch failed for {url}: {message}")]
    Fetch { url: String, message: String },

    #[error("Voice synthesis failed: {0}")]
    Tts(String),

    #[error("Encoding failed: {message}")]
    Encode {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("FFprobe failed: {message}")]
    Probe {
        message: String,
        stderr: Option<String>,
    },

    #[error("{operation} timed out after {secs} seconds")]
    Timeout { operation: String, secs: u64 },

    #[error("Generation failed: {0}")]
    Generation(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl MediaError {
    pub fn fetch_failed(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Fetch {
            url: url.into(),
            message: message.into(),
        }
    }

    pub fn tts_failed(message: impl Into<String>) -> Self {
        Self::Tts(message.into())
    }

    pub fn encode_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::Encode {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    pub fn timeout(operation: impl Into<String>, secs: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            secs,
        }
    }

    pub fn generation_failed(message: impl Into<String>) -> Self {
        Self::Generation(message.into())
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Short label for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            MediaError::FfmpegNotFound | MediaError::FfprobeNotFound => "missing_binary",
            MediaError::Fetch { .. } => "fetch",
            MediaError::Tts(_) => "tts",
            MediaError::Encode { .. } => "encode",
            MediaError::Probe { .. } => "probe",
            MediaError::Timeout { .. } => "timeout",
            MediaError::Generation(_) => "generation",
            MediaError::InvalidInput(_) => "invalid_input",
            MediaError::FileNotFound(_) => "file_not_found",
            MediaError::Io(_) => "io",
            MediaError::Json(_) => "json",
            MediaError::Http(_) => "http",
        }
    }
}
