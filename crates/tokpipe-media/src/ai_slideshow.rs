//! AI-image slideshow backend.
//!
//! One image is generated per narrative segment. Requests are serialized
//! with a fixed gap; a failed image is skipped as long as at least one
//! image comes back.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use tokpipe_models::Clock;

use crate::error::{MediaError, MediaResult};
use crate::fetch::{image_extension, AssetFetcher};
use crate::metrics::record_degraded;

/// Default gap between image-generation requests.
pub const DEFAULT_IMAGE_SPACING: Duration = Duration::from_secs(2);

/// A generated image, either hosted or inline.
#[derive(Debug, Clone, PartialEq)]
pub enum GeneratedImage {
    Url(String),
    Bytes { data: Vec<u8>, mime_type: String },
}

impl GeneratedImage {
    fn extension(&self) -> &'static str {
        match self {
            GeneratedImage::Url(url) => image_extension(url),
            GeneratedImage::Bytes { mime_type, .. } => match mime_type.as_str() {
                "image/png" => "png",
                "image/webp" => "webp",
                _ => "jpg",
            },
        }
    }
}

/// Text-to-image service.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate_image(
        &self,
        product_name: &str,
        scene: &str,
        style: &str,
    ) -> MediaResult<GeneratedImage>;
}

async fn store_image(
    image: GeneratedImage,
    fetcher: &dyn AssetFetcher,
    dest: &Path,
) -> MediaResult<()> {
    match image {
        GeneratedImage::Url(url) => fetcher.fetch(&url, dest).await,
        GeneratedImage::Bytes { data, .. } => {
            if data.is_empty() {
                return Err(MediaError::generation_failed("empty image payload"));
            }
            tokio::fs::write(dest, data).await?;
            Ok(())
        }
    }
}

/// Generate and save one image per scene into `dir`, in scene order.
#[allow(clippy::too_many_arguments)]
pub async fn generate_segment_images(
    generator: &dyn ImageGenerator,
    fetcher: &dyn AssetFetcher,
    clock: &dyn Clock,
    product_name: &str,
    scenes: &[&str],
    style: &str,
    spacing: Duration,
    dir: &Path,
) -> MediaResult<Vec<PathBuf>> {
    // No narrative: a single product shot
    let scenes: Vec<&str> = if scenes.is_empty() {
        vec![product_name]
    } else {
        scenes.to_vec()
    };

    let mut paths = Vec::new();
    for (i, scene) in scenes.iter().enumerate() {
        if i > 0 {
            clock.sleep(spacing).await;
        }

        let outcome = match generator.generate_image(product_name, scene, style).await {
            Ok(image) => {
                let dest = dir.join(format!("ai_{:02}.{}", i, image.extension()));
                store_image(image, fetcher, &dest).await.map(|_| dest)
            }
            Err(e) => Err(e),
        };

        match outcome {
            Ok(path) => paths.push(path),
            Err(e) => {
                record_degraded("ai_image");
                warn!(segment = i, error = %e, "Image generation failed, skipping segment");
            }
        }
    }

    if paths.is_empty() {
        return Err(MediaError::generation_failed(format!(
            "no images generated for {} segments",
            scenes.len()
        )));
    }

    info!(generated = paths.len(), requested = scenes.len(), "AI images ready");
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::Mutex;
    use tempfile::TempDir;
    use tokpipe_models::ManualClock;

    struct ScriptedGenerator {
        fail_on: Vec<usize>,
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl ImageGenerator for ScriptedGenerator {
        async fn generate_image(&self, _p: &str, scene: &str, _s: &str) -> MediaResult<GeneratedImage> {
            let mut calls = self.calls.lock().unwrap();
            let n = *calls;
            *calls += 1;
            if self.fail_on.contains(&n) {
                return Err(MediaError::generation_failed("quota"));
            }
            Ok(GeneratedImage::Bytes {
                data: scene.as_bytes().to_vec(),
                mime_type: "image/png".into(),
            })
        }
    }

    struct NoFetch;

    #[async_trait]
    impl AssetFetcher for NoFetch {
        async fn fetch(&self, url: &str, _dest: &Path) -> MediaResult<()> {
            Err(MediaError::fetch_failed(url, "unexpected fetch"))
        }
    }

    #[tokio::test]
    async fn test_failed_segment_is_skipped_and_spacing_applied() {
        let dir = TempDir::new().unwrap();
        let clock = ManualClock::new(Utc::now());
        let generator = ScriptedGenerator {
            fail_on: vec![1],
            calls: Mutex::new(0),
        };

        let paths = generate_segment_images(
            &generator,
            &NoFetch,
            &clock,
            "Lamp",
            &["warm light", "desk", "night", "buy"],
            "studio",
            DEFAULT_IMAGE_SPACING,
            dir.path(),
        )
        .await
        .unwrap();

        assert_eq!(paths.len(), 3);
        assert!(paths[0].ends_with("ai_00.png"));
        assert!(paths[1].ends_with("ai_02.png"));
        assert_eq!(clock.sleeps(), vec![DEFAULT_IMAGE_SPACING; 3]);
    }

    #[tokio::test]
    async fn test_all_failures_is_error() {
        let dir = TempDir::new().unwrap();
        let clock = ManualClock::new(Utc::now());
        let generator = ScriptedGenerator {
            fail_on: vec![0, 1],
            calls: Mutex::new(0),
        };

        let err = generate_segment_images(
            &generator,
            &NoFetch,
            &clock,
            "Lamp",
            &["a", "b"],
            "studio",
            DEFAULT_IMAGE_SPACING,
            dir.path(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, MediaError::Generation(_)));
    }
}
