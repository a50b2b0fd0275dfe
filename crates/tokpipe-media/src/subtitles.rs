//! Subtitle timing and burn-in.
//!
//! Each spoken segment gets an equal share of the narration, regardless of
//! its length. Cue computation is pure; burn-in goes through the encoder.

use std::path::Path;
use std::time::Duration;
use tracing::info;

use tokpipe_models::{EncodingConfig, SubtitleStyle};

use crate::command::{escape_filter_path, Encoder, FfmpegCommand};
use crate::error::MediaResult;
use crate::fs_utils::{remove_if_exists, replace_file, sibling_temp_path};

/// Distance from the bottom edge for cues, in script pixels.
const SUBTITLE_MARGIN_V: u32 = 320;

/// One timed caption.
#[derive(Debug, Clone, PartialEq)]
pub struct SubtitleCue {
    /// 1-based
    pub index: usize,
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// Split `duration` evenly across the non-empty segments.
pub fn build_cues(segments: &[&str], duration: f64) -> Vec<SubtitleCue> {
    let texts: Vec<&str> = segments
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();
    if texts.is_empty() || duration <= 0.0 {
        return Vec::new();
    }

    let slice = duration / texts.len() as f64;
    texts
        .iter()
        .enumerate()
        .map(|(i, text)| SubtitleCue {
            index: i + 1,
            start: i as f64 * slice,
            end: if i + 1 == texts.len() {
                duration
            } else {
                (i + 1) as f64 * slice
            },
            text: text.to_string(),
        })
        .collect()
}

/// Format seconds as an SRT timestamp (`HH:MM:SS,mmm`).
pub fn format_srt_time(seconds: f64) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0).round() as u64;
    let hours = total_ms / 3_600_000;
    let minutes = (total_ms % 3_600_000) / 60_000;
    let secs = (total_ms % 60_000) / 1000;
    let millis = total_ms % 1000;
    format!("{:02}:{:02}:{:02},{:03}", hours, minutes, secs, millis)
}

pub fn render_srt(cues: &[SubtitleCue]) -> String {
    let mut out = String::new();
    for cue in cues {
        out.push_str(&format!(
            "{}\n{} --> {}\n{}\n\n",
            cue.index,
            format_srt_time(cue.start),
            format_srt_time(cue.end),
            cue.text
        ));
    }
    out
}

pub async fn write_srt(path: &Path, cues: &[SubtitleCue]) -> MediaResult<()> {
    tokio::fs::write(path, render_srt(cues)).await?;
    Ok(())
}

/// Convert `RRGGBB` to an ASS `&HAABBGGRR` colour.
fn ass_colour(rgb: &str) -> String {
    if rgb.len() != 6 {
        return "&H00FFFFFF".to_string();
    }
    let (r, rest) = rgb.split_at(2);
    let (g, b) = rest.split_at(2);
    format!("&H00{}{}{}", b, g, r)
}

/// ASS style override for a preset.
pub fn force_style(style: SubtitleStyle) -> String {
    format!(
        "FontName=Arial,FontSize={},PrimaryColour={},OutlineColour={},BorderStyle=1,Outline={},Shadow=0,Bold={},Alignment=2,MarginV={}",
        style.font_size(),
        ass_colour(style.primary_color()),
        ass_colour(style.outline_color()),
        style.border_width(),
        if style.is_bold() { -1 } else { 0 },
        SUBTITLE_MARGIN_V,
    )
}

/// `subtitles` filter for an SRT file.
pub fn subtitle_filter(srt: &Path, style: SubtitleStyle) -> String {
    format!(
        "subtitles='{}':original_size=1080x1920:force_style='{}'",
        escape_filter_path(srt),
        force_style(style)
    )
}

/// Burn subtitles into `video` in place.
pub async fn burn_subtitles(
    encoder: &dyn Encoder,
    video: &Path,
    srt: &Path,
    style: SubtitleStyle,
    encoding: &EncodingConfig,
    timeout: Duration,
) -> MediaResult<()> {
    let temp = sibling_temp_path(video, "subs");
    let cmd = FfmpegCommand::new("subtitles", &temp)
        .input(video)
        .video_filter(subtitle_filter(srt, style))
        .video_encoding(encoding)
        .copy_audio()
        .faststart();

    if let Err(e) = encoder.run(&cmd, timeout).await {
        remove_if_exists(&temp).await;
        return Err(e);
    }
    replace_file(&temp, video).await?;

    info!(video = %video.display(), style = style.as_str(), "Subtitles burned in");
    Ok(())
}
