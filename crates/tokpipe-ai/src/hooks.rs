//! Hook, caption and hashtag generation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::client::GeminiClient;
use crate::error::{AiError, AiResult};

const MAX_HOOKS: usize = 3;
const MAX_HASHTAGS: usize = 8;

/// Scripted narrative for one product video.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HookSet {
    pub hooks: Vec<String>,
    pub ending: String,
    pub caption: String,
    pub hashtags: Vec<String>,
}

impl HookSet {
    /// Trim, drop empties, cap hooks at three and strip leading `#`.
    pub fn normalized(self) -> Self {
        let hooks = self
            .hooks
            .into_iter()
            .map(|h| h.trim().to_string())
            .filter(|h| !h.is_empty())
            .take(MAX_HOOKS)
            .collect();

        let mut hashtags: Vec<String> = Vec::new();
        for tag in self.hashtags {
            let tag = tag.trim().trim_start_matches('#').replace(' ', "");
            if !tag.is_empty() && !hashtags.contains(&tag) {
                hashtags.push(tag);
            }
        }
        hashtags.truncate(MAX_HASHTAGS);

        Self {
            hooks,
            ending: self.ending.trim().to_string(),
            caption: self.caption.trim().to_string(),
            hashtags,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty() && self.ending.is_empty()
    }
}

/// Produces hooks for a product.
#[async_trait]
pub trait HookGenerator: Send + Sync {
    async fn generate_hooks(&self, product_name: &str) -> AiResult<HookSet>;
}

pub fn hook_prompt(product_name: &str) -> String {
    format!(
        r#"You write scripts for 15-second TikTok affiliate videos.

Product: "{product_name}"

Return ONLY a JSON object with this schema:
{{
  "hooks": ["line 1", "line 2", "line 3"],
  "ending": "call to action",
  "caption": "post caption without hashtags",
  "hashtags": ["tag1", "tag2"]
}}

Rules:
- Exactly 3 hooks, each under 12 words, spoken aloud in sequence.
- The first hook must stop the scroll.
- The ending tells viewers to tap the link.
- Up to 6 hashtags, without the # symbol.
"#
    )
}

#[async_trait]
impl HookGenerator for GeminiClient {
    async fn generate_hooks(&self, product_name: &str) -> AiResult<HookSet> {
        let raw: HookSet = self.generate_json(&hook_prompt(product_name)).await?;
        let hooks = raw.normalized();
        if hooks.is_empty() {
            return Err(AiError::EmptyResponse);
        }
        info!(product = product_name, hooks = hooks.hooks.len(), "Hooks generated");
        Ok(hooks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AiConfig;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn gemini_body(text: &str) -> serde_json::Value {
        json!({"candidates": [{"content": {"parts": [{"text": text}]}}]})
    }

    fn client(server: &MockServer, models: &[&str]) -> GeminiClient {
        let mut config = AiConfig::default()
            .with_api_key("test-key")
            .with_base_url(server.uri());
        config.text_models = models.iter().map(|m| m.to_string()).collect();
        GeminiClient::new(config).unwrap()
    }

    #[test]
    fn test_normalize_caps_and_cleans() {
        let set = HookSet {
            hooks: vec![" a ".into(), "".into(), "b".into(), "c".into(), "d".into()],
            ending: " buy ".into(),
            caption: "cap".into(),
            hashtags: vec!["#deal".into(), "deal".into(), "tik tok".into()],
        }
        .normalized();
        assert_eq!(set.hooks, vec!["a", "b", "c"]);
        assert_eq!(set.ending, "buy");
        assert_eq!(set.hashtags, vec!["deal", "tiktok"]);
    }

    #[tokio::test]
    async fn test_generate_hooks_parses_fenced_json() {
        let server = MockServer::start().await;
        let text = "```json\n{\"hooks\":[\"One\",\"Two\",\"Three\"],\"ending\":\"Tap the link\",\"caption\":\"Lamp\",\"hashtags\":[\"#lamp\"]}\n```";
        Mock::given(method("POST"))
            .and(path("/v1beta/models/m1:generateContent"))
            .and(header("x-goog-api-key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(gemini_body(text)))
            .expect(1)
            .mount(&server)
            .await;

        let hooks = client(&server, &["m1"]).generate_hooks("Lamp").await.unwrap();
        assert_eq!(hooks.hooks.len(), 3);
        assert_eq!(hooks.ending, "Tap the link");
        assert_eq!(hooks.hashtags, vec!["lamp"]);
    }

    #[tokio::test]
    async fn test_falls_back_to_next_model() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/busy:generateContent"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/ok:generateContent"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(gemini_body("{\"hooks\":[\"x\"],\"ending\":\"y\"}")),
            )
            .mount(&server)
            .await;

        let hooks = client(&server, &["busy", "ok"]).generate_hooks("Lamp").await.unwrap();
        assert_eq!(hooks.hooks, vec!["x"]);
    }

    #[tokio::test]
    async fn test_auth_error_does_not_fall_back() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("bad key"))
            .expect(1)
            .mount(&server)
            .await;

        let err = client(&server, &["a", "b"]).generate_hooks("Lamp").await.unwrap_err();
        assert!(matches!(err, AiError::Api { status: 403, .. }));
    }
}
