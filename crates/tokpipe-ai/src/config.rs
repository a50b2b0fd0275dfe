//! AI client configuration.

use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

#[derive(Debug, Clone)]
pub struct AiConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    /// Tried in order until one returns a usable answer
    pub text_models: Vec<String>,
    pub image_model: String,
    pub video_model: String,
    pub request_timeout: Duration,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            text_models: vec![
                "gemini-2.5-flash".to_string(),
                "gemini-2.5-flash-lite".to_string(),
                "gemini-2.5-pro".to_string(),
            ],
            image_model: "imagen-3.0-generate-002".to_string(),
            video_model: "veo-2.0-generate-001".to_string(),
            request_timeout: Duration::from_secs(60),
        }
    }
}

impl AiConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_key: std::env::var("GEMINI_API_KEY").ok().filter(|k| !k.is_empty()),
            base_url: std::env::var("GEMINI_BASE_URL").unwrap_or(defaults.base_url),
            text_models: std::env::var("AI_TEXT_MODELS")
                .ok()
                .map(|s| {
                    s.split(',')
                        .map(|m| m.trim().to_string())
                        .filter(|m| !m.is_empty())
                        .collect::<Vec<_>>()
                })
                .filter(|models| !models.is_empty())
                .unwrap_or(defaults.text_models),
            image_model: std::env::var("AI_IMAGE_MODEL").unwrap_or(defaults.image_model),
            video_model: std::env::var("AI_VIDEO_MODEL").unwrap_or(defaults.video_model),
            request_timeout: Duration::from_secs(
                std::env::var("AI_REQUEST_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(60),
            ),
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_from_env_models() {
        std::env::set_var("AI_TEXT_MODELS", "a, b ,,c");
        std::env::remove_var("GEMINI_API_KEY");
        let config = AiConfig::from_env();
        assert_eq!(config.text_models, vec!["a", "b", "c"]);
        assert!(!config.is_configured());
        std::env::remove_var("AI_TEXT_MODELS");
    }

    #[test]
    #[serial]
    fn test_empty_key_is_unconfigured() {
        std::env::set_var("GEMINI_API_KEY", "");
        assert!(AiConfig::from_env().api_key.is_none());
        std::env::remove_var("GEMINI_API_KEY");
    }
}
