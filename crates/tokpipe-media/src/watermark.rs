//! Watermark overlay.
//!
//! Two kinds: a scaled, semi-transparent logo image composited with
//! `overlay`, or a text string drawn with `drawtext`. Both anchor at one of
//! five positions with an edge margin, and both rewrite the video in place.

use std::path::Path;
use std::time::Duration;
use tracing::info;

use tokpipe_models::encoding::{OUTPUT_HEIGHT, OUTPUT_WIDTH};
use tokpipe_models::{EncodingConfig, WatermarkKind, WatermarkPosition, WatermarkSpec};

use crate::command::{Encoder, FfmpegCommand};
use crate::error::{MediaError, MediaResult};
use crate::fs_utils::{remove_if_exists, replace_file, sibling_temp_path};

/// `overlay` x/y expressions (`W`/`H` frame, `w`/`h` logo).
pub fn overlay_position(position: WatermarkPosition, margin: u32) -> (String, String) {
    let m = margin;
    match position {
        WatermarkPosition::TopLeft => (format!("{m}"), format!("{m}")),
        WatermarkPosition::TopRight => (format!("W-w-{m}"), format!("{m}")),
        WatermarkPosition::BottomLeft => (format!("{m}"), format!("H-h-{m}")),
        WatermarkPosition::BottomRight => (format!("W-w-{m}"), format!("H-h-{m}")),
        WatermarkPosition::Center => ("(W-w)/2".to_string(), "(H-h)/2".to_string()),
    }
}

/// `drawtext` x/y expressions (`w`/`h` frame, `tw`/`th` text).
pub fn text_position(position: WatermarkPosition, margin: u32) -> (String, String) {
    let m = margin;
    match position {
        WatermarkPosition::TopLeft => (format!("{m}"), format!("{m}")),
        WatermarkPosition::TopRight => (format!("w-tw-{m}"), format!("{m}")),
        WatermarkPosition::BottomLeft => (format!("{m}"), format!("h-th-{m}")),
        WatermarkPosition::BottomRight => (format!("w-tw-{m}"), format!("h-th-{m}")),
        WatermarkPosition::Center => ("(w-tw)/2".to_string(), "(h-th)/2".to_string()),
    }
}

/// Escape text for a `drawtext` `text=` value.
pub fn escape_drawtext(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('\'', "\u{2019}")
        .replace(':', "\\:")
        .replace('%', "\\%")
}

/// Filter complex for a logo on input 1 over video input 0.
pub fn image_overlay_filter(spec: &WatermarkSpec) -> String {
    let logo_width = ((OUTPUT_WIDTH as f32 * spec.scale).round() as u32).max(1);
    let (x, y) = overlay_position(spec.position, spec.margin);
    format!(
        "[1:v]scale={}:-1,format=rgba,colorchannelmixer=aa={:.2}[wm];[0:v][wm]overlay={}:{}:format=auto[vout]",
        logo_width, spec.opacity, x, y
    )
}

/// `drawtext` video filter for a text watermark.
pub fn text_overlay_filter(spec: &WatermarkSpec, text: &str) -> String {
    let font_size = ((OUTPUT_HEIGHT as f32 * spec.scale).round() as u32).max(8);
    let (x, y) = text_position(spec.position, spec.margin);
    format!(
        "drawtext=text='{}':fontsize={}:fontcolor=white@{:.2}:borderw=2:bordercolor=black@{:.2}:x={}:y={}",
        escape_drawtext(text),
        font_size,
        spec.opacity,
        spec.opacity,
        x,
        y
    )
}

pub fn watermark_command(
    video: &Path,
    output: &Path,
    spec: &WatermarkSpec,
    encoding: &EncodingConfig,
) -> MediaResult<FfmpegCommand> {
    let cmd = FfmpegCommand::new("watermark", output).input(video);
    let cmd = match &spec.kind {
        WatermarkKind::Image { path } => {
            if !path.is_file() {
                return Err(MediaError::FileNotFound(path.clone()));
            }
            cmd.input(path)
                .filter_complex(image_overlay_filter(spec))
                .map("[vout]")
                .map("0:a?")
        }
        WatermarkKind::Text { text } => {
            if text.trim().is_empty() {
                return Err(MediaError::invalid_input("empty watermark text"));
            }
            cmd.video_filter(text_overlay_filter(spec, text))
        }
    };
    Ok(cmd.video_encoding(encoding).copy_audio().faststart())
}

/// Apply a watermark to `video` in place.
pub async fn apply_watermark(
    encoder: &dyn Encoder,
    video: &Path,
    spec: &WatermarkSpec,
    encoding: &EncodingConfig,
    timeout: Duration,
) -> MediaResult<()> {
    let temp = sibling_temp_path(video, "watermark");
    let cmd = watermark_command(video, &temp, spec, encoding)?;

    if let Err(e) = encoder.run(&cmd, timeout).await {
        remove_if_exists(&temp).await;
        return Err(e);
    }
    replace_file(&temp, video).await?;

    info!(
        video = %video.display(),
        position = ?spec.position,
        opacity = spec.opacity,
        "Watermark applied"
    );
    Ok(())
}
