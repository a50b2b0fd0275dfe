//! TikTok client error types.

use thiserror::Error;

use tokpipe_store::StoreError;

/// Result type for TikTok operations.
pub type TikTokResult<T> = Result<T, TikTokError>;

#[derive(Debug, Error)]
pub enum TikTokError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Rate limited by platform")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("Daily post limit reached for account {account_id} ({limit} per day)")]
    DailyLimitReached { account_id: String, limit: u32 },

    #[error("Server error {status}: {message}")]
    ServerError { status: u16, message: String },

    #[error("Request failed with {status}: {message}")]
    RequestFailed { status: u16, message: String },

    /// Error envelope returned with a success status
    #[error("TikTok API error {code}: {message}")]
    Api { code: String, message: String },

    #[error("Publish failed: {0}")]
    PublishFailed(String),

    #[error("Publish status still pending after {attempts} polls")]
    Timeout { attempts: u32 },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl TikTokError {
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Auth(msg.into())
    }

    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    pub fn publish_failed(msg: impl Into<String>) -> Self {
        Self::PublishFailed(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Classify a non-success HTTP response.
    pub fn from_http_status(status: u16, message: impl Into<String>, retry_after_ms: Option<u64>) -> Self {
        let message = message.into();
        match status {
            401 => Self::Auth(message),
            429 => Self::RateLimited { retry_after_ms },
            500..=599 => Self::ServerError { status, message },
            _ => Self::RequestFailed { status, message },
        }
    }

    /// 5xx, 429 and transport failures are retried; other 4xx never are.
    pub fn is_retryable(&self) -> bool {
        match self {
            TikTokError::ServerError { .. } | TikTokError::RateLimited { .. } => true,
            TikTokError::Network(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            TikTokError::Api { code, .. } => code == "rate_limit_exceeded",
            _ => false,
        }
    }

    /// Delay demanded by a `Retry-After` header.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            TikTokError::RateLimited { retry_after_ms } => *retry_after_ms,
            _ => None,
        }
    }

    pub fn http_status(&self) -> Option<u16> {
        match self {
            TikTokError::Auth(_) => Some(401),
            TikTokError::RateLimited { .. } => Some(429),
            TikTokError::ServerError { status, .. } | TikTokError::RequestFailed { status, .. } => {
                Some(*status)
            }
            TikTokError::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Parse a `Retry-After` header given in seconds.
pub fn parse_retry_after(value: Option<&str>) -> Option<u64> {
    value
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(|secs| secs.saturating_mul(1000))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(TikTokError::from_http_status(503, "down", None).is_retryable());
        assert!(TikTokError::from_http_status(429, "slow", Some(1000)).is_retryable());
        assert!(!TikTokError::from_http_status(400, "bad", None).is_retryable());
        assert!(!TikTokError::from_http_status(403, "no", None).is_retryable());
        assert!(matches!(
            TikTokError::from_http_status(401, "expired", None),
            TikTokError::Auth(_)
        ));
    }

    #[test]
    fn test_retry_after() {
        assert_eq!(parse_retry_after(Some("7")), Some(7000));
        assert_eq!(parse_retry_after(Some("soon")), None);
        assert_eq!(parse_retry_after(None), None);
        assert_eq!(
            TikTokError::from_http_status(429, "", Some(3000)).retry_after_ms(),
            Some(3000)
        );
    }
}
