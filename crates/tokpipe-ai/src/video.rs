//! Veo text-to-video generation.
//!
//! `predictLongRunning` returns an operation name; the operation resource is
//! polled until `done`. The finished sample is a file URI that needs the API
//! key to download.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use tokpipe_media::{GeneratedVideo, GenerationStatus, MediaResult, VideoGenerator};

use crate::client::GeminiClient;
use crate::error::{AiError, AiResult};

#[derive(Debug, Deserialize)]
struct Operation {
    name: Option<String>,
    #[serde(default)]
    done: bool,
    error: Option<OperationError>,
    response: Option<OperationResponse>,
}

#[derive(Debug, Deserialize)]
struct OperationError {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OperationResponse {
    generate_video_response: Option<VideoResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoResponse {
    #[serde(default)]
    generated_samples: Vec<Sample>,
}

#[derive(Debug, Deserialize)]
struct Sample {
    video: Option<SampleVideo>,
}

#[derive(Debug, Deserialize)]
struct SampleVideo {
    uri: Option<String>,
}

impl GeminiClient {
    pub async fn start_video(&self, prompt: &str, aspect_ratio: &str) -> AiResult<String> {
        let body = json!({
            "instances": [{ "prompt": prompt }],
            "parameters": { "aspectRatio": aspect_ratio },
        });
        let url = self.model_url(&self.config().video_model, "predictLongRunning");
        let op: Operation = self.post_json(&url, &body).await?;
        op.name
            .filter(|n| !n.is_empty())
            .ok_or_else(|| AiError::parse("operation response has no name"))
    }

    pub async fn video_status(&self, operation: &str) -> AiResult<GenerationStatus> {
        let op: Operation = self.get_json(&self.resource_url(operation)).await?;

        if let Some(err) = op.error {
            return Err(AiError::operation(err.message));
        }
        if !op.done {
            debug!(operation = operation, "Video operation still running");
            return Ok(GenerationStatus::Pending);
        }

        let uri = op
            .response
            .and_then(|r| r.generate_video_response)
            .and_then(|r| r.generated_samples.into_iter().next())
            .and_then(|s| s.video)
            .and_then(|v| v.uri)
            .ok_or_else(|| AiError::operation("operation finished without a video"))?;

        Ok(GenerationStatus::Done(GeneratedVideo::Url(
            self.authorized_download_url(&uri),
        )))
    }

    fn authorized_download_url(&self, uri: &str) -> String {
        let sep = if uri.contains('?') { '&' } else { '?' };
        format!("{}{}key={}", uri, sep, urlencoding::encode(self.api_key()))
    }
}

#[async_trait]
impl VideoGenerator for GeminiClient {
    async fn submit(&self, prompt: &str, aspect_ratio: &str) -> MediaResult<String> {
        Ok(self.start_video(prompt, aspect_ratio).await?)
    }

    async fn poll(&self, operation: &str) -> MediaResult<GenerationStatus> {
        Ok(self.video_status(operation).await?)
    }
}
