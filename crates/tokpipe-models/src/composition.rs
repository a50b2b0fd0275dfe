//! Video composition inputs and outputs.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::config::VideoDefaults;
use crate::job::Job;

/// Which engine produces the visual track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum RenderBackend {
    /// Ken Burns slideshow over product images
    #[default]
    Slideshow,
    /// Slideshow over one generated image per narrative segment
    AiImages,
    /// Third-party text-to-video generation
    TextToVideo,
}

impl RenderBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenderBackend::Slideshow => "slideshow",
            RenderBackend::AiImages => "ai_images",
            RenderBackend::TextToVideo => "text_to_video",
        }
    }

    /// Whether product images must be supplied by the caller.
    pub fn needs_source_images(&self) -> bool {
        matches!(self, RenderBackend::Slideshow)
    }
}

impl fmt::Display for RenderBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Subtitle overlay presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum SubtitleStyle {
    #[default]
    Classic,
    Bold,
    Minimal,
    Neon,
}

impl SubtitleStyle {
    pub const ALL: [SubtitleStyle; 4] = [
        SubtitleStyle::Classic,
        SubtitleStyle::Bold,
        SubtitleStyle::Minimal,
        SubtitleStyle::Neon,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SubtitleStyle::Classic => "classic",
            SubtitleStyle::Bold => "bold",
            SubtitleStyle::Minimal => "minimal",
            SubtitleStyle::Neon => "neon",
        }
    }

    pub fn font_size(&self) -> u32 {
        match self {
            SubtitleStyle::Classic => 64,
            SubtitleStyle::Bold => 76,
            SubtitleStyle::Minimal => 52,
            SubtitleStyle::Neon => 70,
        }
    }

    /// Text colour as RGB hex.
    pub fn primary_color(&self) -> &'static str {
        match self {
            SubtitleStyle::Classic | SubtitleStyle::Minimal => "FFFFFF",
            SubtitleStyle::Bold => "FFFF00",
            SubtitleStyle::Neon => "00FFFF",
        }
    }

    /// Border colour as RGB hex.
    pub fn outline_color(&self) -> &'static str {
        match self {
            SubtitleStyle::Neon => "FF00FF",
            _ => "000000",
        }
    }

    pub fn border_width(&self) -> u32 {
        match self {
            SubtitleStyle::Classic => 3,
            SubtitleStyle::Bold => 5,
            SubtitleStyle::Minimal => 1,
            SubtitleStyle::Neon => 4,
        }
    }

    pub fn is_bold(&self) -> bool {
        matches!(self, SubtitleStyle::Bold | SubtitleStyle::Neon)
    }
}

impl FromStr for SubtitleStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "classic" => Ok(SubtitleStyle::Classic),
            "bold" => Ok(SubtitleStyle::Bold),
            "minimal" => Ok(SubtitleStyle::Minimal),
            "neon" => Ok(SubtitleStyle::Neon),
            other => Err(format!("unknown subtitle style: {}", other)),
        }
    }
}

/// Background music selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MusicSpec {
    /// Track name in the music library
    pub track: String,
    /// Music bed volume (0.0 - 1.0); voice stays at full volume
    pub volume: f32,
}

impl MusicSpec {
    pub fn new(track: impl Into<String>, volume: f32) -> Self {
        Self {
            track: track.into(),
            volume: volume.clamp(0.0, 1.0),
        }
    }
}

/// Watermark content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WatermarkKind {
    Image { path: PathBuf },
    Text { text: String },
}

/// Watermark anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum WatermarkPosition {
    TopLeft,
    TopRight,
    BottomLeft,
    #[default]
    BottomRight,
    Center,
}

/// Watermark overlay settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct WatermarkSpec {
    pub kind: WatermarkKind,

    #[serde(default)]
    pub position: WatermarkPosition,

    /// 0.0 (invisible) - 1.0 (opaque)
    #[serde(default = "default_opacity")]
    pub opacity: f32,

    /// Logo width as a fraction of frame width, or text height as a
    /// fraction of frame height
    #[serde(default = "default_scale")]
    pub scale: f32,

    /// Edge margin in pixels
    #[serde(default = "default_margin")]
    pub margin: u32,
}

fn default_opacity() -> f32 {
    0.7
}
fn default_scale() -> f32 {
    0.15
}
fn default_margin() -> u32 {
    40
}

impl WatermarkSpec {
    pub fn image(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: WatermarkKind::Image { path: path.into() },
            position: WatermarkPosition::default(),
            opacity: default_opacity(),
            scale: default_scale(),
            margin: default_margin(),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: WatermarkKind::Text { text: text.into() },
            position: WatermarkPosition::default(),
            opacity: default_opacity(),
            scale: 0.03,
            margin: default_margin(),
        }
    }

    pub fn with_position(mut self, position: WatermarkPosition) -> Self {
        self.position = position;
        self
    }

    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity.clamp(0.0, 1.0);
        self
    }

    pub fn with_scale(mut self, scale: f32) -> Self {
        self.scale = scale.clamp(0.01, 1.0);
        self
    }

    pub fn with_margin(mut self, margin: u32) -> Self {
        self.margin = margin;
        self
    }
}

/// Caller-supplied video options; unset fields fall back to pipeline defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VideoOptions {
    #[serde(default)]
    pub backend: Option<RenderBackend>,

    /// Music track name; empty string disables music
    #[serde(default)]
    pub music: Option<String>,

    #[serde(default)]
    pub music_volume: Option<f32>,

    #[serde(default)]
    pub text_overlay: Option<bool>,

    #[serde(default)]
    pub overlay_style: Option<SubtitleStyle>,

    #[serde(default)]
    pub watermark: Option<WatermarkSpec>,

    /// Style tag for generated images
    #[serde(default)]
    pub image_style: Option<String>,
}

/// Full input set for one render call.
#[derive(Debug, Clone)]
pub struct VideoCompositionRequest {
    pub product_name: String,
    pub image_urls: Vec<String>,
    /// Three hooks and the ending, in order
    pub segments: Vec<String>,
    pub music: Option<MusicSpec>,
    /// `Some` enables subtitle burn-in with this preset
    pub subtitle_style: Option<SubtitleStyle>,
    pub watermark: Option<WatermarkSpec>,
    pub backend: RenderBackend,
    pub image_style: String,
}

impl VideoCompositionRequest {
    pub fn new(product_name: impl Into<String>, image_urls: Vec<String>, segments: Vec<String>) -> Self {
        Self {
            product_name: product_name.into(),
            image_urls,
            segments,
            music: None,
            subtitle_style: None,
            watermark: None,
            backend: RenderBackend::Slideshow,
            image_style: VideoDefaults::default().image_style,
        }
    }

    /// Build a request for a job, merging caller options over defaults.
    pub fn for_job(job: &Job, options: &VideoOptions, defaults: &VideoDefaults) -> Self {
        let track = options.music.clone().or_else(|| defaults.music.clone());
        let volume = options.music_volume.unwrap_or(defaults.music_volume);
        let music = track
            .filter(|t| !t.trim().is_empty())
            .map(|t| MusicSpec::new(t, volume));

        let overlay = options.text_overlay.unwrap_or(defaults.text_overlay);
        let subtitle_style = overlay.then(|| options.overlay_style.unwrap_or(defaults.overlay_style));

        Self {
            product_name: job.product_name.clone(),
            image_urls: job.images(),
            segments: job.segments(),
            music,
            subtitle_style,
            watermark: options.watermark.clone().or_else(|| defaults.watermark.clone()),
            backend: options.backend.unwrap_or(defaults.backend),
            image_style: options
                .image_style
                .clone()
                .unwrap_or_else(|| defaults.image_style.clone()),
        }
    }

    /// Segments with text, in order. Falls back to the product name when no
    /// segment has text, so a job without hooks still gets a voiceover.
    pub fn spoken_segments(&self) -> Vec<&str> {
        let spoken: Vec<&str> = self
            .segments
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect();
        if spoken.is_empty() && !self.product_name.trim().is_empty() {
            return vec![self.product_name.trim()];
        }
        spoken
    }

    /// Narration script: non-empty segments joined by single spaces.
    pub fn narration(&self) -> String {
        self.spoken_segments().join(" ")
    }

    pub fn with_music(mut self, music: MusicSpec) -> Self {
        self.music = Some(music);
        self
    }

    pub fn with_subtitles(mut self, style: SubtitleStyle) -> Self {
        self.subtitle_style = Some(style);
        self
    }

    pub fn with_watermark(mut self, watermark: WatermarkSpec) -> Self {
        self.watermark = Some(watermark);
        self
    }

    pub fn with_backend(mut self, backend: RenderBackend) -> Self {
        self.backend = backend;
        self
    }
}

/// Result of a successful render.
#[derive(Debug, Clone, PartialEq)]
pub struct ComposedVideo {
    pub video_path: PathBuf,
    /// Final audio track; absent when the backend embeds its own audio
    pub audio_path: Option<PathBuf>,
    /// Seconds
    pub duration: f64,
    pub thumbnail_path: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::product::ProductId;
    use chrono::Utc;

    fn job() -> Job {
        let mut job = Job::new(ProductId::from("p"), "Mug", Utc::now());
        job.hooks = vec!["Hot coffee".into(), "".into(), "All day".into()];
        job.ending = Some("Link in bio".into());
        job.image_url = Some("https://img/mug.jpg".into());
        job
    }

    #[test]
    fn test_narration_skips_empty_segments() {
        let req = VideoCompositionRequest::for_job(&job(), &VideoOptions::default(), &VideoDefaults::default());
        assert_eq!(req.segments.len(), 4);
        assert_eq!(req.narration(), "Hot coffee All day Link in bio");

        let bare = VideoCompositionRequest::new("Mug", vec![], vec![String::new(); 4]);
        assert_eq!(bare.spoken_segments(), vec!["Mug"]);
    }

    #[test]
    fn test_options_override_defaults() {
        let defaults = VideoDefaults {
            music: Some("chill".into()),
            text_overlay: false,
            ..Default::default()
        };
        let options = VideoOptions {
            music_volume: Some(3.0),
            text_overlay: Some(true),
            overlay_style: Some(SubtitleStyle::Neon),
            ..Default::default()
        };
        let req = VideoCompositionRequest::for_job(&job(), &options, &defaults);
        let music = req.music.unwrap();
        assert_eq!(music.track, "chill");
        assert_eq!(music.volume, 1.0);
        assert_eq!(req.subtitle_style, Some(SubtitleStyle::Neon));
    }

    #[test]
    fn test_empty_music_disables() {
        let defaults = VideoDefaults {
            music: Some("chill".into()),
            ..Default::default()
        };
        let options = VideoOptions {
            music: Some(String::new()),
            ..Default::default()
        };
        let req = VideoCompositionRequest::for_job(&job(), &options, &defaults);
        assert!(req.music.is_none());
    }

    #[test]
    fn test_subtitle_presets_are_distinct() {
        let sizes: Vec<u32> = SubtitleStyle::ALL.iter().map(|s| s.font_size()).collect();
        assert_eq!(sizes, vec![64, 76, 52, 70]);
        assert_eq!("NEON".parse::<SubtitleStyle>().unwrap(), SubtitleStyle::Neon);
        assert!("comic".parse::<SubtitleStyle>().is_err());
    }

    #[test]
    fn test_watermark_serde() {
        let spec = WatermarkSpec::text("@shop").with_position(WatermarkPosition::TopLeft);
        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["kind"]["type"], "text");
        assert_eq!(json["position"], "top_left");
    }
}
