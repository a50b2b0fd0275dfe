//! Imagen image generation.

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use tokpipe_media::{GeneratedImage, ImageGenerator, MediaResult};

use crate::client::GeminiClient;
use crate::error::{AiError, AiResult};

#[derive(Debug, Serialize)]
struct PredictRequest {
    instances: Vec<serde_json::Value>,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    #[serde(default)]
    predictions: Vec<ImagePrediction>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImagePrediction {
    bytes_base64_encoded: Option<String>,
    mime_type: Option<String>,
}

pub fn image_prompt(product_name: &str, scene: &str, style: &str) -> String {
    format!(
        "{style} of {product_name}. Scene: {scene}. Vertical 9:16 composition, product centered, \
         clean background, no text or logos."
    )
}

impl GeminiClient {
    pub async fn generate_image_bytes(&self, prompt: &str) -> AiResult<GeneratedImage> {
        let request = PredictRequest {
            instances: vec![json!({ "prompt": prompt })],
            parameters: json!({ "sampleCount": 1, "aspectRatio": "9:16" }),
        };
        let url = self.model_url(&self.config().image_model, "predict");
        let response: PredictResponse = self.post_json(&url, &request).await?;

        let prediction = response
            .predictions
            .into_iter()
            .find(|p| p.bytes_base64_encoded.is_some())
            .ok_or(AiError::EmptyResponse)?;

        let data = base64::engine::general_purpose::STANDARD
            .decode(prediction.bytes_base64_encoded.unwrap_or_default())
            .map_err(|e| AiError::parse(format!("invalid image payload: {}", e)))?;

        debug!(bytes = data.len(), "Imagen image received");
        Ok(GeneratedImage::Bytes {
            data,
            mime_type: prediction.mime_type.unwrap_or_else(|| "image/png".to_string()),
        })
    }
}

#[async_trait]
impl ImageGenerator for GeminiClient {
    async fn generate_image(
        &self,
        product_name: &str,
        scene: &str,
        style: &str,
    ) -> MediaResult<GeneratedImage> {
        Ok(self
            .generate_image_bytes(&image_prompt(product_name, scene, style))
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AiConfig;
    use tokpipe_media::MediaError;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> GeminiClient {
        GeminiClient::new(
            AiConfig::default()
                .with_api_key("k")
                .with_base_url(server.uri()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_decodes_inline_image() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/imagen-3.0-generate-002:predict"))
            .and(body_partial_json(json!({"parameters": {"aspectRatio": "9:16"}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "predictions": [{"bytesBase64Encoded": "aGVsbG8=", "mimeType": "image/jpeg"}]
            })))
            .mount(&server)
            .await;

        let image = client(&server)
            .generate_image("Lamp", "on a desk", "studio photo")
            .await
            .unwrap();
        assert_eq!(
            image,
            GeneratedImage::Bytes {
                data: b"hello".to_vec(),
                mime_type: "image/jpeg".into()
            }
        );
    }

    #[tokio::test]
    async fn test_empty_predictions_is_generation_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"predictions": []})))
            .mount(&server)
            .await;

        let err = client(&server)
            .generate_image("Lamp", "desk", "photo")
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::Generation(_)));
    }

    #[test]
    fn test_image_prompt() {
        let prompt = image_prompt("Lamp", "warm glow", "product photography");
        assert!(prompt.starts_with("product photography of Lamp"));
        assert!(prompt.contains("warm glow"));
    }
}
