//! Gemini API client.
//!
//! One HTTP client serves the three generative endpoints: text
//! (`generateContent`), images (`predict`) and video
//! (`predictLongRunning` plus operation polling).

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::AiConfig;
use crate::error::{AiError, AiResult};

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Gemini API client.
pub struct GeminiClient {
    api_key: String,
    client: Client,
    config: AiConfig,
}

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    #[serde(rename = "responseMimeType")]
    response_mime_type: String,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: ResponseContent,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: String,
}

impl GeminiClient {
    pub fn new(config: AiConfig) -> AiResult<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| AiError::config("GEMINI_API_KEY not set"))?;

        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            api_key,
            client,
            config,
        })
    }

    pub fn config(&self) -> &AiConfig {
        &self.config
    }

    pub(crate) fn api_key(&self) -> &str {
        &self.api_key
    }

    pub(crate) fn model_url(&self, model: &str, method: &str) -> String {
        format!(
            "{}/v1beta/models/{}:{}",
            self.config.base_url.trim_end_matches('/'),
            model,
            method
        )
    }

    pub(crate) fn resource_url(&self, name: &str) -> String {
        format!(
            "{}/v1beta/{}",
            self.config.base_url.trim_end_matches('/'),
            name.trim_start_matches('/')
        )
    }

    async fn decode<R: DeserializeOwned>(response: reqwest::Response) -> AiResult<R> {
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(AiError::Api {
                status: status.as_u16(),
                message,
            });
        }
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| AiError::parse(e.to_string()))
    }

    pub(crate) async fn post_json<B: Serialize, R: DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
    ) -> AiResult<R> {
        let response = self
            .client
            .post(url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(body)
            .send()
            .await?;
        Self::decode(response).await
    }

    pub(crate) async fn get_json<R: DeserializeOwned>(&self, url: &str) -> AiResult<R> {
        let response = self
            .client
            .get(url)
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await?;
        Self::decode(response).await
    }

    /// Ask one model for a JSON answer and return its raw text.
    pub async fn generate_text(&self, model: &str, prompt: &str) -> AiResult<String> {
        let request = GeminiRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
            },
        };

        let response: GeminiResponse = self
            .post_json(&self.model_url(model, "generateContent"), &request)
            .await?;

        let text = response
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or(AiError::EmptyResponse)?;

        debug!(model = model, chars = text.len(), "Gemini text response");
        Ok(text)
    }

    /// Generate and parse JSON, falling back through the configured models.
    pub async fn generate_json<T: DeserializeOwned>(&self, prompt: &str) -> AiResult<T> {
        let mut last_error = None;

        for model in &self.config.text_models {
            info!(model = %model, "Attempting Gemini API");
            let result = match self.generate_text(model, prompt).await {
                Ok(text) => serde_json::from_str::<T>(strip_code_fence(&text))
                    .map_err(|e| AiError::parse(e.to_string())),
                Err(e) => Err(e),
            };

            match result {
                Ok(value) => return Ok(value),
                Err(e) if e.is_model_specific() => {
                    warn!(model = %model, error = %e, "Gemini model failed, trying next");
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| AiError::config("no text models configured")))
    }
}

/// Strip a surrounding markdown code fence, if any.
pub fn strip_code_fence(text: &str) -> &str {
    let text = text.trim();
    let text = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))
        .unwrap_or(text);
    text.strip_suffix("```").unwrap_or(text).trim()
}
