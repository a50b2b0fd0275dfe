//! Media asset fetcher.
//!
//! Downloads product images into a render's scratch directory, in order.
//! Any failed download fails the whole set.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use crate::error::{MediaError, MediaResult};

/// Downloads one remote asset to a local path.
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    async fn fetch(&self, url: &str, dest: &Path) -> MediaResult<()>;
}

/// Fetcher configuration.
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl FetcherConfig {
    pub fn from_env() -> Self {
        Self {
            request_timeout: Duration::from_secs(
                std::env::var("FETCH_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(60),
            ),
            ..Default::default()
        }
    }
}

/// HTTP(S) fetcher; `file://` URLs are copied from disk.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    http: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(config: FetcherConfig) -> MediaResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(concat!("tokpipe-media/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http })
    }
}

#[async_trait]
impl AssetFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, dest: &Path) -> MediaResult<()> {
        let parsed = Url::parse(url).map_err(|e| MediaError::fetch_failed(url, e.to_string()))?;

        if parsed.scheme() == "file" {
            let src = parsed
                .to_file_path()
                .map_err(|_| MediaError::fetch_failed(url, "invalid file URL"))?;
            tokio::fs::copy(&src, dest)
                .await
                .map_err(|e| MediaError::fetch_failed(url, e.to_string()))?;
            return Ok(());
        }

        let response = self
            .http
            .get(parsed)
            .send()
            .await
            .map_err(|e| MediaError::fetch_failed(url, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(MediaError::fetch_failed(url, format!("HTTP {}", status.as_u16())));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| MediaError::fetch_failed(url, e.to_string()))?;
        tokio::fs::write(dest, &bytes).await?;

        debug!(url = url, bytes = bytes.len(), dest = %dest.display(), "Fetched asset");
        Ok(())
    }
}

/// Fetch every image into `dir` as `image_00.<ext>`, `image_01.<ext>`, ...
pub async fn fetch_images(
    fetcher: &dyn AssetFetcher,
    urls: &[String],
    dir: &Path,
) -> MediaResult<Vec<PathBuf>> {
    if urls.is_empty() {
        return Err(MediaError::invalid_input("no images to fetch"));
    }

    let mut paths = Vec::with_capacity(urls.len());
    for (i, url) in urls.iter().enumerate() {
        let dest = dir.join(format!("image_{:02}.{}", i, image_extension(url)));
        fetcher.fetch(url, &dest).await?;
        paths.push(dest);
    }

    info!(count = paths.len(), "Fetched images");
    Ok(paths)
}

/// File extension from the URL path, defaulting to jpg.
pub fn image_extension(url: &str) -> &'static str {
    let path = Url::parse(url)
        .map(|u| u.path().to_ascii_lowercase())
        .unwrap_or_else(|_| url.to_ascii_lowercase());
    match Path::new(&path).extension().and_then(|e| e.to_str()) {
        Some("png") => "png",
        Some("webp") => "webp",
        Some("gif") => "gif",
        _ => "jpg",
    }
}
