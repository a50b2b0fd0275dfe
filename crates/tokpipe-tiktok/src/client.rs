//! TikTok OAuth and Content Posting REST client.
//!
//! Every outbound call goes through [`with_retry`] with the injected clock
//! and records request metrics per attempt.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, RETRY_AFTER};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use tokio::io::{AsyncReadExt, AsyncSeekExt, SeekFrom};
use tracing::{debug, info};

use tokpipe_models::Clock;

use crate::config::TikTokConfig;
use crate::error::{parse_retry_after, TikTokError, TikTokResult};
use crate::metrics::record_request;
use crate::retry::with_retry;
use crate::types::{
    chunk_ranges, ApiEnvelope, InitData, InitRequest, OAuthResponse, PostInfo, PublishStatus,
    SourceInfo, TokenGrant,
};

/// Platform operations the publisher depends on.
#[async_trait]
pub trait TikTokApi: Send + Sync {
    async fn refresh_access_token(&self, refresh_token: &str) -> TikTokResult<TokenGrant>;

    /// Start a post the platform downloads from `video_url`. Returns the publish id.
    async fn init_pull_upload(
        &self,
        access_token: &str,
        post: &PostInfo,
        video_url: &str,
    ) -> TikTokResult<String>;

    /// Start a post and push the local file in chunks. Returns the publish id.
    async fn upload_file(
        &self,
        access_token: &str,
        post: &PostInfo,
        path: &Path,
    ) -> TikTokResult<String>;

    async fn fetch_publish_status(
        &self,
        access_token: &str,
        publish_id: &str,
    ) -> TikTokResult<PublishStatus>;
}

/// TikTok REST client.
#[derive(Clone)]
pub struct TikTokClient {
    http: Client,
    config: TikTokConfig,
    clock: Arc<dyn Clock>,
}

impl TikTokClient {
    pub fn new(config: TikTokConfig, clock: Arc<dyn Clock>) -> TikTokResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .user_agent(concat!("tokpipe-tiktok/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(TikTokError::Network)?;

        Ok(Self { http, config, clock })
    }

    pub fn config(&self) -> &TikTokConfig {
        &self.config
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base.trim_end_matches('/'), path)
    }

    /// Consent page URL for the authorization-code flow.
    pub fn authorize_url(&self, state: &str) -> TikTokResult<String> {
        let redirect_uri = self
            .config
            .redirect_uri
            .as_deref()
            .ok_or_else(|| TikTokError::config("TIKTOK_REDIRECT_URI not set"))?;

        let base = format!(
            "{}/v2/auth/authorize/",
            self.config.auth_base.trim_end_matches('/')
        );
        let url = url::Url::parse_with_params(
            &base,
            &[
                ("client_key", self.config.client_key.as_str()),
                ("scope", self.config.scopes.as_str()),
                ("response_type", "code"),
                ("redirect_uri", redirect_uri),
                ("state", state),
            ],
        )
        .map_err(|e| TikTokError::config(format!("invalid auth base URL: {}", e)))?;

        Ok(url.into())
    }

    /// Exchange an authorization code for the first token pair.
    pub async fn exchange_code(&self, code: &str) -> TikTokResult<TokenGrant> {
        let redirect_uri = self
            .config
            .redirect_uri
            .clone()
            .ok_or_else(|| TikTokError::config("TIKTOK_REDIRECT_URI not set"))?;

        self.token_request(
            "exchange_code",
            vec![
                ("client_key", self.config.client_key.clone()),
                ("client_secret", self.config.client_secret.clone()),
                ("code", code.to_string()),
                ("grant_type", "authorization_code".to_string()),
                ("redirect_uri", redirect_uri),
            ],
        )
        .await
    }

    async fn token_request(
        &self,
        operation: &'static str,
        form: Vec<(&'static str, String)>,
    ) -> TikTokResult<TokenGrant> {
        let url = self.api_url("/v2/oauth/token/");
        let (url, form) = (&url, &form);

        self.call(operation, || async move {
            let response = self.http.post(url).form(form).send().await?;
            let status = response.status();
            let retry_after = retry_after_of(&response);
            let body = response.text().await?;

            if status.is_server_error() || status.as_u16() == 429 {
                return Err(TikTokError::from_http_status(
                    status.as_u16(),
                    body,
                    retry_after,
                ));
            }

            // Failures may arrive with a 200 and an inline `error`.
            match serde_json::from_str::<OAuthResponse>(&body).ok() {
                Some(parsed) if status.is_success() || parsed.error.is_some() => {
                    parsed.into_grant().map_err(TikTokError::Auth)
                }
                _ if !status.is_success() => Err(TikTokError::from_http_status(
                    status.as_u16(),
                    body,
                    retry_after,
                )),
                _ => Err(TikTokError::invalid_response("token response is not JSON")),
            }
        })
        .await
    }

    async fn init_upload(
        &self,
        access_token: &str,
        post: &PostInfo,
        source_info: SourceInfo,
    ) -> TikTokResult<InitData> {
        let url = self.api_url("/v2/post/publish/video/init/");
        let request = InitRequest {
            post_info: post,
            source_info,
        };
        let (url, request) = (&url, &request);

        let data: InitData = self
            .call("init_upload", || async move {
                let response = self
                    .http
                    .post(url)
                    .bearer_auth(access_token)
                    .json(request)
                    .send()
                    .await?;
                read_envelope(response).await
            })
            .await?;

        if data.publish_id.is_empty() {
            return Err(TikTokError::invalid_response("init returned an empty publish_id"));
        }
        Ok(data)
    }

    async fn put_chunk(
        &self,
        upload_url: &str,
        chunk: &[u8],
        content_range: &str,
    ) -> TikTokResult<()> {
        self.call("upload_chunk", || async move {
            let response = self
                .http
                .put(upload_url)
                .header(CONTENT_TYPE, "video/mp4")
                .header(CONTENT_LENGTH, chunk.len())
                .header(CONTENT_RANGE, content_range)
                .body(chunk.to_vec())
                .send()
                .await?;

            let status = response.status();
            if status.is_success() {
                return Ok(());
            }
            let retry_after = retry_after_of(&response);
            let body = response.text().await.unwrap_or_default();
            Err(TikTokError::from_http_status(status.as_u16(), body, retry_after))
        })
        .await
    }

    /// Retry wrapper that records metrics for every attempt.
    async fn call<T, F, Fut>(&self, operation: &'static str, f: F) -> TikTokResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = TikTokResult<T>>,
    {
        with_retry(&self.config.retry, self.clock.as_ref(), operation, || {
            let attempt = f();
            async move {
                let start = Instant::now();
                let result = attempt.await;
                let status = match &result {
                    Ok(_) => 200,
                    Err(e) => e.http_status().unwrap_or(0),
                };
                record_request(operation, status, start.elapsed().as_secs_f64() * 1000.0);
                result
            }
        })
        .await
    }
}

#[async_trait]
impl TikTokApi for TikTokClient {
    async fn refresh_access_token(&self, refresh_token: &str) -> TikTokResult<TokenGrant> {
        self.token_request(
            "refresh_token",
            vec![
                ("client_key", self.config.client_key.clone()),
                ("client_secret", self.config.client_secret.clone()),
                ("grant_type", "refresh_token".to_string()),
                ("refresh_token", refresh_token.to_string()),
            ],
        )
        .await
    }

    async fn init_pull_upload(
        &self,
        access_token: &str,
        post: &PostInfo,
        video_url: &str,
    ) -> TikTokResult<String> {
        let data = self
            .init_upload(
                access_token,
                post,
                SourceInfo::PullFromUrl {
                    video_url: video_url.to_string(),
                },
            )
            .await?;

        info!(publish_id = %data.publish_id, "Pull-from-URL upload initialized");
        Ok(data.publish_id)
    }

    async fn upload_file(
        &self,
        access_token: &str,
        post: &PostInfo,
        path: &Path,
    ) -> TikTokResult<String> {
        let mut file = tokio::fs::File::open(path).await?;
        let total = file.metadata().await?.len();
        let ranges = chunk_ranges(total, self.config.chunk_size);
        if ranges.is_empty() {
            return Err(TikTokError::publish_failed(format!(
                "video file is empty: {}",
                path.display()
            )));
        }

        let data = self
            .init_upload(
                access_token,
                post,
                SourceInfo::FileUpload {
                    video_size: total,
                    chunk_size: ranges[0].size(),
                    total_chunk_count: ranges.len() as u64,
                },
            )
            .await?;
        let upload_url = data
            .upload_url
            .ok_or_else(|| TikTokError::invalid_response("init returned no upload_url"))?;

        for (index, range) in ranges.iter().enumerate() {
            let mut chunk = vec![0u8; range.size() as usize];
            file.seek(SeekFrom::Start(range.start)).await?;
            file.read_exact(&mut chunk).await?;

            self.put_chunk(&upload_url, &chunk, &range.content_range(total))
                .await?;
            debug!(
                publish_id = %data.publish_id,
                chunk = index + 1,
                of = ranges.len(),
                "Uploaded chunk"
            );
        }

        info!(
            publish_id = %data.publish_id,
            bytes = total,
            chunks = ranges.len(),
            "File upload finished"
        );
        Ok(data.publish_id)
    }

    async fn fetch_publish_status(
        &self,
        access_token: &str,
        publish_id: &str,
    ) -> TikTokResult<PublishStatus> {
        let url = self.api_url("/v2/post/publish/status/fetch/");
        let body = serde_json::json!({ "publish_id": publish_id });
        let (url, body) = (&url, &body);

        self.call("fetch_status", || async move {
            let response = self
                .http
                .post(url)
                .bearer_auth(access_token)
                .json(body)
                .send()
                .await?;
            read_envelope(response).await
        })
        .await
    }
}

fn retry_after_of(response: &Response) -> Option<u64> {
    parse_retry_after(
        response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok()),
    )
}

/// Decode a Content Posting API response into its `data` payload.
async fn read_envelope<T: DeserializeOwned>(response: Response) -> TikTokResult<T> {
    let status = response.status();
    let retry_after = retry_after_of(&response);
    let body = response.text().await?;

    if !status.is_success() {
        let message = serde_json::from_str::<ApiEnvelope<serde_json::Value>>(&body)
            .ok()
            .and_then(|e| e.error)
            .map(|e| format!("{}: {}", e.code, e.message))
            .unwrap_or(body);
        return Err(TikTokError::from_http_status(
            status.as_u16(),
            message,
            retry_after,
        ));
    }

    let envelope: ApiEnvelope<T> = serde_json::from_str(&body)?;
    if let Some(err) = envelope.error.filter(|e| !e.is_ok()) {
        debug!(code = %err.code, log_id = ?err.log_id, "TikTok API error envelope");
        return Err(TikTokError::Api {
            code: err.code,
            message: err.message,
        });
    }
    envelope
        .data
        .ok_or_else(|| TikTokError::invalid_response("response has no data"))
}
