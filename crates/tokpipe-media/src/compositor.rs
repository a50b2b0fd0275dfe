//! Video compositor.
//!
//! Turns a `VideoCompositionRequest` into a finished vertical video:
//!
//! 1. Resolve images (download, or generate one per segment)
//! 2. Synthesize the voiceover; its measured length fixes the duration
//! 3. Mix background music (non-fatal)
//! 4. Render the Ken Burns slideshow (fatal)
//! 5. Burn subtitles (non-fatal)
//! 6. Apply a watermark (non-fatal)
//! 7. Extract a thumbnail (non-fatal)
//! 8. Remove the scratch directory, on every path
//!
//! The text-to-video backend replaces steps 1-6 with a single generation
//! request whose output already carries audio.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use tokpipe_models::{
    Clock, ComposedVideo, EncodingConfig, RenderBackend, VideoCompositionRequest,
};

use crate::ai_slideshow::{generate_segment_images, ImageGenerator, DEFAULT_IMAGE_SPACING};
use crate::audio::{mix_music, MusicLibrary};
use crate::command::Encoder;
use crate::error::{MediaError, MediaResult};
use crate::fetch::{fetch_images, AssetFetcher};
use crate::fs_utils::move_file;
use crate::kenburns::render_slideshow;
use crate::metrics::record_degraded;
use crate::progress::{ProgressSink, RenderStage};
use crate::subtitles::{build_cues, burn_subtitles, write_srt};
use crate::text_to_video::{
    build_prompt, generate_video, GeneratedVideo, VideoGenerator, DEFAULT_POLL_CEILING,
    DEFAULT_POLL_INTERVAL,
};
use crate::thumbnail::generate_thumbnail;
use crate::tts::{synthesize_voice, VoiceSynthesizer};
use crate::watermark::apply_watermark;

/// Compositor configuration.
#[derive(Debug, Clone)]
pub struct CompositorConfig {
    /// Parent of per-render scratch directories
    pub work_dir: PathBuf,
    /// Where finished artifacts are moved
    pub output_dir: PathBuf,
    pub encoding: EncodingConfig,
    /// Ceiling for any single encoder invocation
    pub encode_timeout: Duration,
    pub thumbnail_timeout: Duration,
    pub image_spacing: Duration,
    pub generation_poll_interval: Duration,
    pub generation_poll_ceiling: Duration,
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("/tmp/tokpipe/work"),
            output_dir: PathBuf::from("/tmp/tokpipe/output"),
            encoding: EncodingConfig::default(),
            encode_timeout: Duration::from_secs(600),
            thumbnail_timeout: Duration::from_secs(60),
            image_spacing: DEFAULT_IMAGE_SPACING,
            generation_poll_interval: DEFAULT_POLL_INTERVAL,
            generation_poll_ceiling: DEFAULT_POLL_CEILING,
        }
    }
}

impl CompositorConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            work_dir: std::env::var("RENDER_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            output_dir: std::env::var("RENDER_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            encoding: EncodingConfig::default().with_crf(
                std::env::var("RENDER_CRF")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.encoding.crf),
            ),
            encode_timeout: Duration::from_secs(
                std::env::var("RENDER_ENCODE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(600),
            ),
            ..defaults
        }
    }

    pub fn with_dirs(mut self, work_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        self.work_dir = work_dir.into();
        self.output_dir = output_dir.into();
        self
    }
}

/// Renders composition requests.
#[async_trait]
pub trait VideoRenderer: Send + Sync {
    async fn compose(
        &self,
        request: &VideoCompositionRequest,
        progress: &dyn ProgressSink,
    ) -> MediaResult<ComposedVideo>;
}

/// FFmpeg-backed renderer.
pub struct VideoCompositor {
    encoder: Arc<dyn Encoder>,
    fetcher: Arc<dyn AssetFetcher>,
    voice: Arc<dyn VoiceSynthesizer>,
    clock: Arc<dyn Clock>,
    music: Option<MusicLibrary>,
    image_generator: Option<Arc<dyn ImageGenerator>>,
    video_generator: Option<Arc<dyn VideoGenerator>>,
    config: CompositorConfig,
}

impl VideoCompositor {
    pub fn new(
        encoder: Arc<dyn Encoder>,
        fetcher: Arc<dyn AssetFetcher>,
        voice: Arc<dyn VoiceSynthesizer>,
        clock: Arc<dyn Clock>,
        config: CompositorConfig,
    ) -> Self {
        Self {
            encoder,
            fetcher,
            voice,
            clock,
            music: None,
            image_generator: None,
            video_generator: None,
            config,
        }
    }

    pub fn with_music_library(mut self, library: MusicLibrary) -> Self {
        self.music = Some(library);
        self
    }

    pub fn with_image_generator(mut self, generator: Arc<dyn ImageGenerator>) -> Self {
        self.image_generator = Some(generator);
        self
    }

    pub fn with_video_generator(mut self, generator: Arc<dyn VideoGenerator>) -> Self {
        self.video_generator = Some(generator);
        self
    }

    pub fn config(&self) -> &CompositorConfig {
        &self.config
    }

    async fn resolve_images(
        &self,
        request: &VideoCompositionRequest,
        dir: &Path,
    ) -> MediaResult<Vec<PathBuf>> {
        match request.backend {
            RenderBackend::AiImages => {
                let generator = self
                    .image_generator
                    .as_deref()
                    .ok_or_else(|| MediaError::invalid_input("no image generator configured"))?;
                generate_segment_images(
                    generator,
                    self.fetcher.as_ref(),
                    self.clock.as_ref(),
                    &request.product_name,
                    &request.spoken_segments(),
                    &request.image_style,
                    self.config.image_spacing,
                    dir,
                )
                .await
            }
            _ => fetch_images(self.fetcher.as_ref(), &request.image_urls, dir).await,
        }
    }

    async fn compose_slideshow(
        &self,
        request: &VideoCompositionRequest,
        dir: &Path,
        render_id: &str,
        progress: &dyn ProgressSink,
    ) -> MediaResult<ComposedVideo> {
        let encoding = &self.config.encoding;
        let timeout = self.config.encode_timeout;

        let images = self.resolve_images(request, dir).await?;
        progress.stage(
            RenderStage::Download,
            &format!("Prepared {} image(s)", images.len()),
        );

        let segments = request.spoken_segments();
        let voice = synthesize_voice(self.voice.as_ref(), self.encoder.as_ref(), &segments, dir).await?;
        progress.stage(
            RenderStage::Voice,
            &format!("Voiceover ready ({:.1}s)", voice.duration),
        );

        let mut audio = voice.path.clone();
        match (&request.music, &self.music) {
            (Some(music), Some(library)) => {
                let mixed = dir.join("mixed.m4a");
                match mix_music(
                    self.encoder.as_ref(),
                    library,
                    music,
                    &voice.path,
                    voice.duration,
                    &mixed,
                    encoding,
                    timeout,
                )
                .await
                {
                    Ok(()) => {
                        audio = mixed;
                        progress.stage(RenderStage::Music, "Background music mixed");
                    }
                    Err(e) => {
                        record_degraded("music");
                        warn!(track = %music.track, error = %e, "Music mix failed, using voice only");
                        progress.stage(RenderStage::Music, "Using voiceover audio");
                    }
                }
            }
            (Some(music), None) => {
                record_degraded("music");
                warn!(track = %music.track, "No music library configured, using voice only");
                progress.stage(RenderStage::Music, "Using voiceover audio");
            }
            (None, _) => progress.stage(RenderStage::Music, "Using voiceover audio"),
        }

        let video = dir.join("video.mp4");
        render_slideshow(
            self.encoder.as_ref(),
            &images,
            &audio,
            voice.duration,
            &video,
            encoding,
            timeout,
        )
        .await?;
        progress.stage(RenderStage::Render, "Slideshow rendered");

        if let Some(style) = request.subtitle_style {
            let cues = build_cues(&segments, voice.duration);
            let srt = dir.join("subtitles.srt");
            let burned = match write_srt(&srt, &cues).await {
                Ok(()) if !cues.is_empty() => {
                    burn_subtitles(self.encoder.as_ref(), &video, &srt, style, encoding, timeout).await
                }
                Ok(()) => Err(MediaError::invalid_input("no subtitle text")),
                Err(e) => Err(e),
            };
            match burned {
                Ok(()) => progress.stage(RenderStage::Overlay, "Text overlay added"),
                Err(e) => {
                    record_degraded("overlay");
                    warn!(error = %e, "Subtitle burn-in failed, keeping video without overlay");
                    progress.stage(RenderStage::Overlay, "Text overlay skipped");
                }
            }
        } else {
            progress.stage(RenderStage::Overlay, "Text overlay skipped");
        }

        if let Some(spec) = &request.watermark {
            match apply_watermark(self.encoder.as_ref(), &video, spec, encoding, timeout).await {
                Ok(()) => progress.stage(RenderStage::Watermark, "Watermark applied"),
                Err(e) => {
                    record_degraded("watermark");
                    warn!(error = %e, "Watermark failed, keeping video without watermark");
                    progress.stage(RenderStage::Watermark, "Watermark skipped");
                }
            }
        } else {
            progress.stage(RenderStage::Watermark, "Watermark skipped");
        }

        let thumbnail = self.thumbnail(&video, dir, progress).await;

        let audio_ext = audio
            .extension()
            .map(|e| e.to_string_lossy().to_string())
            .unwrap_or_else(|| "m4a".to_string());
        let audio_out = self.config.output_dir.join(format!("{}.{}", render_id, audio_ext));
        move_file(&audio, &audio_out).await?;

        let (video_out, thumbnail_out) = self.publish(render_id, &video, thumbnail).await?;

        info!(
            render_id = render_id,
            images = images.len(),
            duration = voice.duration,
            "Video composed"
        );

        Ok(ComposedVideo {
            video_path: video_out,
            audio_path: Some(audio_out),
            duration: voice.duration,
            thumbnail_path: thumbnail_out,
        })
    }

    async fn compose_generated(
        &self,
        request: &VideoCompositionRequest,
        dir: &Path,
        render_id: &str,
        progress: &dyn ProgressSink,
    ) -> MediaResult<ComposedVideo> {
        let generator = self
            .video_generator
            .as_deref()
            .ok_or_else(|| MediaError::invalid_input("no video generator configured"))?;

        let prompt = build_prompt(
            &request.product_name,
            &request.spoken_segments(),
            &request.image_style,
        );
        progress.stage(RenderStage::Download, "Video generation submitted");

        let generated = generate_video(
            generator,
            self.clock.as_ref(),
            &prompt,
            self.config.generation_poll_interval,
            self.config.generation_poll_ceiling,
        )
        .await?;

        let video = dir.join("video.mp4");
        match generated {
            GeneratedVideo::Url(url) => self.fetcher.fetch(&url, &video).await?,
            GeneratedVideo::Bytes(data) => tokio::fs::write(&video, data).await?,
        }
        progress.stage(RenderStage::Render, "Generated video downloaded");

        let info = self.encoder.probe(&video).await?;
        let thumbnail = self.thumbnail(&video, dir, progress).await;
        let (video_out, thumbnail_out) = self.publish(render_id, &video, thumbnail).await?;

        info!(render_id = render_id, duration = info.duration, "Generated video ready");

        Ok(ComposedVideo {
            video_path: video_out,
            audio_path: None,
            duration: info.duration,
            thumbnail_path: thumbnail_out,
        })
    }

    async fn thumbnail(&self, video: &Path, dir: &Path, progress: &dyn ProgressSink) -> Option<PathBuf> {
        let path = dir.join("thumbnail.jpg");
        match generate_thumbnail(self.encoder.as_ref(), video, &path, self.config.thumbnail_timeout).await {
            Ok(()) => {
                progress.stage(RenderStage::Thumbnail, "Thumbnail extracted");
                Some(path)
            }
            Err(e) => {
                record_degraded("thumbnail");
                warn!(error = %e, "Thumbnail extraction failed");
                progress.stage(RenderStage::Thumbnail, "Thumbnail skipped");
                None
            }
        }
    }

    /// Move the finished artifacts out of scratch.
    async fn publish(
        &self,
        render_id: &str,
        video: &Path,
        thumbnail: Option<PathBuf>,
    ) -> MediaResult<(PathBuf, Option<PathBuf>)> {
        let video_out = self.config.output_dir.join(format!("{}.mp4", render_id));
        move_file(video, &video_out).await?;

        let thumbnail_out = match thumbnail {
            Some(thumb) if thumb.exists() => {
                let out = self.config.output_dir.join(format!("{}.jpg", render_id));
                match move_file(&thumb, &out).await {
                    Ok(()) => Some(out),
                    Err(e) => {
                        warn!(error = %e, "Could not keep thumbnail");
                        None
                    }
                }
            }
            _ => None,
        };

        Ok((video_out, thumbnail_out))
    }
}

#[async_trait]
impl VideoRenderer for VideoCompositor {
    async fn compose(
        &self,
        request: &VideoCompositionRequest,
        progress: &dyn ProgressSink,
    ) -> MediaResult<ComposedVideo> {
        tokio::fs::create_dir_all(&self.config.work_dir).await?;
        let scratch = tempfile::Builder::new()
            .prefix("render-")
            .tempdir_in(&self.config.work_dir)?;
        let render_id = Uuid::new_v4().to_string();

        info!(
            render_id = %render_id,
            backend = %request.backend,
            product = %request.product_name,
            "Starting render"
        );

        let result = match request.backend {
            RenderBackend::TextToVideo => {
                self.compose_generated(request, scratch.path(), &render_id, progress)
                    .await
            }
            RenderBackend::Slideshow | RenderBackend::AiImages => {
                self.compose_slideshow(request, scratch.path(), &render_id, progress)
                    .await
            }
        };

        let scratch_path = scratch.path().to_path_buf();
        if let Err(e) = scratch.close() {
            warn!(dir = %scratch_path.display(), error = %e, "Failed to remove scratch directory");
        }

        if result.is_ok() {
            progress.stage(RenderStage::Cleanup, "Video ready");
        }
        result
    }
}
