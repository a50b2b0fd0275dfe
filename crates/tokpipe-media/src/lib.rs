#![deny(unreachable_patterns)]
//! Media pipeline for short-form product videos.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building over a swappable `Encoder`
//! - Asset fetching and edge-tts voice synthesis
//! - Ken Burns slideshows, music beds, burned subtitles and watermarks
//! - AI-image and text-to-video backends behind generator traits
//! - A `VideoCompositor` tying the steps together with progress reporting

pub mod ai_slideshow;
pub mod audio;
pub mod command;
pub mod compositor;
pub mod error;
pub mod fetch;
pub mod fs_utils;
pub mod kenburns;
pub mod metrics;
pub mod probe;
pub mod progress;
pub mod subtitles;
pub mod text_to_video;
pub mod thumbnail;
pub mod tts;
pub mod watermark;

pub use ai_slideshow::{GeneratedImage, ImageGenerator};
pub use audio::MusicLibrary;
pub use command::{check_ffmpeg, check_ffprobe, Encoder, FfmpegCommand, FfmpegEncoder};
pub use compositor::{CompositorConfig, VideoCompositor, VideoRenderer};
pub use error::{MediaError, MediaResult};
pub use fetch::{AssetFetcher, FetcherConfig, HttpFetcher};
pub use probe::{probe_media, MediaInfo};
pub use progress::{NoopProgress, ProgressSink, RenderStage};
pub use subtitles::SubtitleCue;
pub use text_to_video::{GeneratedVideo, GenerationStatus, VideoGenerator};
pub use tts::{EdgeTtsSynthesizer, TtsConfig, VoiceSynthesizer, VoiceTrack};
