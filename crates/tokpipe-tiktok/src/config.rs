//! TikTok client configuration.

use std::time::Duration;

use crate::error::{TikTokError, TikTokResult};
use crate::retry::RetryConfig;

pub const DEFAULT_API_BASE: &str = "https://open.tiktokapis.com";
pub const DEFAULT_AUTH_BASE: &str = "https://www.tiktok.com";
pub const DEFAULT_SCOPES: &str = "user.info.basic,video.publish,video.upload";

/// 10 MiB upload chunks.
pub const DEFAULT_CHUNK_SIZE: u64 = 10 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct TikTokConfig {
    pub client_key: String,
    pub client_secret: String,
    pub redirect_uri: Option<String>,
    pub api_base: String,
    pub auth_base: String,
    pub scopes: String,
    /// `SELF_ONLY` until the app passes platform audit
    pub privacy_level: String,
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub chunk_size: u64,
    pub publish_poll_interval: Duration,
    pub publish_max_polls: u32,
    pub retry: RetryConfig,
}

impl TikTokConfig {
    pub fn new(client_key: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_key: client_key.into(),
            client_secret: client_secret.into(),
            redirect_uri: None,
            api_base: DEFAULT_API_BASE.to_string(),
            auth_base: DEFAULT_AUTH_BASE.to_string(),
            scopes: DEFAULT_SCOPES.to_string(),
            privacy_level: "SELF_ONLY".to_string(),
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            chunk_size: DEFAULT_CHUNK_SIZE,
            publish_poll_interval: Duration::from_secs(5),
            publish_max_polls: 60,
            retry: RetryConfig::default(),
        }
    }

    pub fn from_env() -> TikTokResult<Self> {
        let client_key = std::env::var("TIKTOK_CLIENT_KEY")
            .map_err(|_| TikTokError::config("TIKTOK_CLIENT_KEY not set"))?;
        let client_secret = std::env::var("TIKTOK_CLIENT_SECRET")
            .map_err(|_| TikTokError::config("TIKTOK_CLIENT_SECRET not set"))?;
        if client_key.is_empty() || client_secret.is_empty() {
            return Err(TikTokError::config("TikTok client credentials cannot be empty"));
        }

        let defaults = Self::new(client_key, client_secret);
        Ok(Self {
            redirect_uri: std::env::var("TIKTOK_REDIRECT_URI").ok(),
            api_base: std::env::var("TIKTOK_API_BASE").unwrap_or(defaults.api_base.clone()),
            privacy_level: std::env::var("TIKTOK_PRIVACY_LEVEL")
                .unwrap_or(defaults.privacy_level.clone()),
            timeout: Duration::from_secs(
                std::env::var("TIKTOK_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            publish_poll_interval: Duration::from_secs(
                std::env::var("TIKTOK_PUBLISH_POLL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5),
            ),
            publish_max_polls: std::env::var("TIKTOK_PUBLISH_MAX_POLLS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(60),
            retry: RetryConfig::from_env(),
            ..defaults
        })
    }

    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    pub fn with_chunk_size(mut self, size: u64) -> Self {
        self.chunk_size = size.max(1);
        self
    }

    pub fn with_publish_polling(mut self, interval: Duration, max_polls: u32) -> Self {
        self.publish_poll_interval = interval;
        self.publish_max_polls = max_polls;
        self
    }
}
