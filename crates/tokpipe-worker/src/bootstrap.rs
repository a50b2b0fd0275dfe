//! Production wiring shared by the worker and API binaries.

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use tokpipe_ai::{AiConfig, GeminiClient, HookGenerator};
use tokpipe_media::{
    CompositorConfig, EdgeTtsSynthesizer, FetcherConfig, FfmpegEncoder, HttpFetcher, MusicLibrary,
    TtsConfig, VideoCompositor,
};
use tokpipe_models::{Clock, PipelineConfig, SystemClock};
use tokpipe_storage::{ArtifactStore, LocalArtifactStore, R2Client};
use tokpipe_store::StoreConfig;
use tokpipe_tiktok::{
    PublishSettings, Publisher, QuotaTracker, TikTokApi, TikTokClient, TikTokConfig, TokenManager,
};

use crate::config::WorkerConfig;
use crate::notify::{NotificationHub, NotifierConfig};
use crate::orchestrator::{Orchestrator, PipelineDeps};

/// Build a fully wired orchestrator from environment variables.
pub fn orchestrator_from_env(worker: &WorkerConfig) -> anyhow::Result<Orchestrator> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let config = Arc::new(PipelineConfig::from_env());
    config.validate().context("invalid pipeline configuration")?;

    let store = tokpipe_store::connect(StoreConfig::from_env()).context("failed to connect store")?;

    let ai = gemini_from_env();
    let encoder = Arc::new(FfmpegEncoder::from_path().context("ffmpeg/ffprobe not available")?);
    let fetcher = Arc::new(HttpFetcher::new(FetcherConfig::from_env()).context("failed to build fetcher")?);
    let voice = Arc::new(EdgeTtsSynthesizer::new(TtsConfig::from_env()));

    let mut compositor = VideoCompositor::new(
        encoder,
        fetcher,
        voice,
        Arc::clone(&clock),
        CompositorConfig::from_env(),
    )
    .with_music_library(MusicLibrary::from_env());
    if let Some(gemini) = &ai {
        compositor = compositor
            .with_image_generator(gemini.clone())
            .with_video_generator(gemini.clone());
    }

    let tiktok_config = TikTokConfig::from_env().context("TikTok client is not configured")?;
    let settings = PublishSettings::from(&tiktok_config);
    let api: Arc<dyn TikTokApi> = Arc::new(
        TikTokClient::new(tiktok_config, Arc::clone(&clock)).context("failed to build TikTok client")?,
    );
    let accounts = Arc::clone(&store).account_store();
    let tokens = Arc::new(TokenManager::new(
        Arc::clone(&api),
        Arc::clone(&accounts),
        Arc::clone(&clock),
    ));
    let quota = Arc::new(QuotaTracker::new(accounts, Arc::clone(&clock), config.max_posts_per_day));
    let publisher = Arc::new(Publisher::new(api, tokens, quota, Arc::clone(&clock), settings));

    let notifier = NotificationHub::from_config(&NotifierConfig::from_env());
    if !notifier.is_enabled() {
        info!("No notification channels configured");
    }

    let deps = PipelineDeps {
        store,
        renderer: Arc::new(compositor),
        hooks: ai.map(|gemini| gemini as Arc<dyn HookGenerator>),
        artifacts: artifact_store_from_env()?,
        publisher,
        notifier,
        clock,
    };
    Ok(Orchestrator::new(deps, config, worker)?)
}

fn gemini_from_env() -> Option<Arc<GeminiClient>> {
    let config = AiConfig::from_env();
    if !config.is_configured() {
        warn!("GEMINI_API_KEY not set, hook and AI media generation disabled");
        return None;
    }
    match GeminiClient::new(config) {
        Ok(client) => Some(Arc::new(client)),
        Err(e) => {
            warn!("AI client unavailable: {}", e);
            None
        }
    }
}

/// `ARTIFACT_BACKEND=local|r2`; R2 is the default when `R2_ENDPOINT_URL` is set.
fn artifact_store_from_env() -> anyhow::Result<Arc<dyn ArtifactStore>> {
    let backend = std::env::var("ARTIFACT_BACKEND").unwrap_or_else(|_| {
        if std::env::var("R2_ENDPOINT_URL").is_ok() {
            "r2".to_string()
        } else {
            "local".to_string()
        }
    });

    match backend.as_str() {
        "local" => {
            info!("Using local artifact storage");
            Ok(Arc::new(LocalArtifactStore::from_env()))
        }
        _ => Ok(Arc::new(R2Client::from_env().context("R2 storage is not configured")?)),
    }
}
