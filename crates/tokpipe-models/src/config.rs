//! Process-wide pipeline configuration.
//!
//! Loaded once at start-up and passed by value (or `Arc`) into the scheduler
//! and orchestrator. Nothing in the pipeline mutates it.

use std::time::Duration;

use crate::composition::{RenderBackend, SubtitleStyle, WatermarkSpec};
use crate::error::{ModelError, ModelResult};

pub const DEFAULT_BEST_HOURS: [u32; 5] = [9, 12, 17, 19, 21];
pub const DEFAULT_MIN_POST_INTERVAL_MINUTES: u32 = 120;
pub const DEFAULT_MAX_POSTS_PER_DAY: u32 = 3;
pub const DEFAULT_MUSIC_VOLUME: f32 = 0.15;
pub const DEFAULT_IMAGE_STYLE: &str = "product photography";

/// Default composition options applied when a caller leaves them unset.
#[derive(Debug, Clone)]
pub struct VideoDefaults {
    pub music: Option<String>,
    pub music_volume: f32,
    pub text_overlay: bool,
    pub overlay_style: SubtitleStyle,
    pub watermark: Option<WatermarkSpec>,
    pub backend: RenderBackend,
    pub image_style: String,
}

impl Default for VideoDefaults {
    fn default() -> Self {
        Self {
            music: None,
            music_volume: DEFAULT_MUSIC_VOLUME,
            text_overlay: true,
            overlay_style: SubtitleStyle::Classic,
            watermark: None,
            backend: RenderBackend::Slideshow,
            image_style: DEFAULT_IMAGE_STYLE.to_string(),
        }
    }
}

impl VideoDefaults {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let watermark = std::env::var("PIPELINE_WATERMARK_IMAGE")
            .ok()
            .filter(|s| !s.is_empty())
            .map(WatermarkSpec::image)
            .or_else(|| {
                std::env::var("PIPELINE_WATERMARK_TEXT")
                    .ok()
                    .filter(|s| !s.is_empty())
                    .map(WatermarkSpec::text)
            });

        Self {
            music: std::env::var("PIPELINE_DEFAULT_MUSIC")
                .ok()
                .filter(|s| !s.is_empty()),
            music_volume: std::env::var("PIPELINE_MUSIC_VOLUME")
                .ok()
                .and_then(|s| s.parse::<f32>().ok())
                .map(|v| v.clamp(0.0, 1.0))
                .unwrap_or(defaults.music_volume),
            text_overlay: env_bool("PIPELINE_TEXT_OVERLAY", defaults.text_overlay),
            overlay_style: std::env::var("PIPELINE_OVERLAY_STYLE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.overlay_style),
            watermark,
            backend: match std::env::var("PIPELINE_RENDER_BACKEND").ok().as_deref() {
                Some("ai_images") => RenderBackend::AiImages,
                Some("text_to_video") => RenderBackend::TextToVideo,
                _ => RenderBackend::Slideshow,
            },
            image_style: std::env::var("PIPELINE_IMAGE_STYLE").unwrap_or(defaults.image_style),
        }
    }
}

/// Pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Allowed posting hours (local day), ascending
    pub best_hours: Vec<u32>,
    /// Minimum spacing between two posts on one account
    pub min_post_interval_minutes: u32,
    /// Daily cap per account
    pub max_posts_per_day: u32,
    /// Offset of the local day boundary from UTC
    pub utc_offset_minutes: i32,
    pub auto_hooks: bool,
    pub auto_video: bool,
    pub auto_schedule: bool,
    /// Periodic sweeps post due jobs; a manual sweep always posts
    pub auto_post: bool,
    /// Pause between successive posts in one sweep
    pub inter_post_delay: Duration,
    pub video: VideoDefaults,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            best_hours: DEFAULT_BEST_HOURS.to_vec(),
            min_post_interval_minutes: DEFAULT_MIN_POST_INTERVAL_MINUTES,
            max_posts_per_day: DEFAULT_MAX_POSTS_PER_DAY,
            utc_offset_minutes: 0,
            auto_hooks: true,
            auto_video: true,
            auto_schedule: true,
            auto_post: true,
            inter_post_delay: Duration::from_secs(30),
            video: VideoDefaults::default(),
        }
    }
}

impl PipelineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            best_hours: std::env::var("PIPELINE_BEST_HOURS")
                .ok()
                .and_then(|s| parse_hours(&s))
                .unwrap_or(defaults.best_hours),
            min_post_interval_minutes: std::env::var("PIPELINE_MIN_POST_INTERVAL_MINUTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.min_post_interval_minutes),
            max_posts_per_day: std::env::var("PIPELINE_MAX_POSTS_PER_DAY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_posts_per_day),
            utc_offset_minutes: std::env::var("PIPELINE_UTC_OFFSET_MINUTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(0),
            auto_hooks: env_bool("PIPELINE_AUTO_HOOKS", defaults.auto_hooks),
            auto_video: env_bool("PIPELINE_AUTO_VIDEO", defaults.auto_video),
            auto_schedule: env_bool("PIPELINE_AUTO_SCHEDULE", defaults.auto_schedule),
            auto_post: env_bool("PIPELINE_AUTO_POST", defaults.auto_post),
            inter_post_delay: Duration::from_secs(
                std::env::var("PIPELINE_INTER_POST_DELAY_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            video: VideoDefaults::from_env(),
        }
    }

    /// Replace best hours, sorted and de-duplicated.
    pub fn with_best_hours(mut self, hours: Vec<u32>) -> Self {
        self.best_hours = normalize_hours(hours);
        self
    }

    pub fn with_max_posts_per_day(mut self, cap: u32) -> Self {
        self.max_posts_per_day = cap;
        self
    }

    pub fn with_min_post_interval(mut self, minutes: u32) -> Self {
        self.min_post_interval_minutes = minutes;
        self
    }

    pub fn with_inter_post_delay(mut self, delay: Duration) -> Self {
        self.inter_post_delay = delay;
        self
    }

    pub fn validate(&self) -> ModelResult<()> {
        if self.best_hours.is_empty() {
            return Err(ModelError::invalid_config("best_hours must not be empty"));
        }
        if let Some(bad) = self.best_hours.iter().find(|h| **h >= 24) {
            return Err(ModelError::invalid_config(format!(
                "best hour {} is outside 0-23",
                bad
            )));
        }
        if self.max_posts_per_day == 0 {
            return Err(ModelError::invalid_config("max_posts_per_day must be at least 1"));
        }
        if self.utc_offset_minutes.abs() >= 24 * 60 {
            return Err(ModelError::invalid_config("utc_offset_minutes must be within one day"));
        }
        Ok(())
    }
}

fn parse_hours(raw: &str) -> Option<Vec<u32>> {
    let hours: Vec<u32> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<u32>())
        .collect::<Result<_, _>>()
        .ok()?;
    if hours.is_empty() {
        None
    } else {
        Some(normalize_hours(hours))
    }
}

fn normalize_hours(mut hours: Vec<u32>) -> Vec<u32> {
    hours.sort_unstable();
    hours.dedup();
    hours
}

fn env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(v) => matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_default_config_is_valid() {
        let config = PipelineConfig::default();
        assert_eq!(config.best_hours, vec![9, 12, 17, 19, 21]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(PipelineConfig::default().with_best_hours(vec![]).validate().is_err());
        assert!(PipelineConfig::default().with_best_hours(vec![9, 24]).validate().is_err());
        assert!(PipelineConfig::default().with_max_posts_per_day(0).validate().is_err());
    }

    #[test]
    fn test_with_best_hours_sorts() {
        let config = PipelineConfig::default().with_best_hours(vec![21, 9, 9, 12]);
        assert_eq!(config.best_hours, vec![9, 12, 21]);
    }

    #[test]
    #[serial]
    fn test_from_env() {
        std::env::set_var("PIPELINE_BEST_HOURS", "20, 8,14");
        std::env::set_var("PIPELINE_MAX_POSTS_PER_DAY", "5");
        std::env::set_var("PIPELINE_AUTO_POST", "false");
        std::env::set_var("PIPELINE_OVERLAY_STYLE", "bold");

        let config = PipelineConfig::from_env();
        assert_eq!(config.best_hours, vec![8, 14, 20]);
        assert_eq!(config.max_posts_per_day, 5);
        assert!(!config.auto_post);
        assert_eq!(config.video.overlay_style, SubtitleStyle::Bold);

        std::env::remove_var("PIPELINE_BEST_HOURS");
        std::env::remove_var("PIPELINE_MAX_POSTS_PER_DAY");
        std::env::remove_var("PIPELINE_AUTO_POST");
        std::env::remove_var("PIPELINE_OVERLAY_STYLE");
    }

    #[test]
    #[serial]
    fn test_from_env_ignores_malformed_hours() {
        std::env::set_var("PIPELINE_BEST_HOURS", "9,noon");
        let config = PipelineConfig::from_env();
        assert_eq!(config.best_hours, DEFAULT_BEST_HOURS.to_vec());
        std::env::remove_var("PIPELINE_BEST_HOURS");
    }
}
