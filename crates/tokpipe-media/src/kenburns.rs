//! Ken Burns slideshow rendering.
//!
//! Stills are upscaled to twice the output frame and cropped to 9:16 before
//! `zoompan`, so any source aspect ratio fills the frame without bars and the
//! pan has pixels to travel over.

use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use tokpipe_models::encoding::{KEN_BURNS_UPSCALE, OUTPUT_FPS, OUTPUT_HEIGHT, OUTPUT_WIDTH};
use tokpipe_models::EncodingConfig;

use crate::command::{Encoder, FfmpegCommand};
use crate::error::{MediaError, MediaResult};

/// Peak zoom factor for the zoom variants.
const MAX_ZOOM: f64 = 1.25;
/// Fixed zoom for the pan variants.
const PAN_ZOOM: f64 = 1.15;

/// Pan/zoom curve applied to one still.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KenBurnsVariant {
    /// Slow zoom toward the centre
    ZoomIn,
    PanRight,
    ZoomOut,
    PanLeft,
}

impl KenBurnsVariant {
    const CYCLE: [KenBurnsVariant; 4] = [
        KenBurnsVariant::ZoomIn,
        KenBurnsVariant::PanRight,
        KenBurnsVariant::ZoomOut,
        KenBurnsVariant::PanLeft,
    ];

    /// Variant for the image at `index` in a multi-image slideshow.
    pub fn for_index(index: usize) -> Self {
        Self::CYCLE[index % Self::CYCLE.len()]
    }

    /// `zoompan` z/x/y expressions over `frames` output frames.
    fn expressions(&self, frames: u64) -> (String, String, String) {
        let center_x = "iw/2-(iw/zoom/2)".to_string();
        let center_y = "ih/2-(ih/zoom/2)".to_string();
        let span = MAX_ZOOM - 1.0;
        match self {
            KenBurnsVariant::ZoomIn => (
                format!("min(1+{:.4}*on/{},{:.2})", span, frames, MAX_ZOOM),
                center_x,
                center_y,
            ),
            KenBurnsVariant::ZoomOut => (
                format!("max({:.2}-{:.4}*on/{},1)", MAX_ZOOM, span, frames),
                center_x,
                center_y,
            ),
            KenBurnsVariant::PanRight => (
                format!("{:.2}", PAN_ZOOM),
                format!("(iw-iw/zoom)*on/{}", frames),
                center_y,
            ),
            KenBurnsVariant::PanLeft => (
                format!("{:.2}", PAN_ZOOM),
                format!("(iw-iw/zoom)*(1-on/{})", frames),
                center_y,
            ),
        }
    }
}

/// Split `total` seconds evenly across `count` images.
pub fn segment_durations(total: f64, count: usize) -> Vec<f64> {
    if count == 0 {
        return Vec::new();
    }
    vec![total / count as f64; count]
}

/// Output frames for a segment; never zero.
pub fn frames_for(duration: f64, fps: u32) -> u64 {
    ((duration * fps as f64).round() as u64).max(1)
}

/// Filter chain for one still: fill, crop, pan/zoom, normalise.
pub fn zoompan_chain(variant: KenBurnsVariant, duration: f64) -> String {
    let frames = frames_for(duration, OUTPUT_FPS);
    let (z, x, y) = variant.expressions(frames);
    let up_w = OUTPUT_WIDTH * KEN_BURNS_UPSCALE;
    let up_h = OUTPUT_HEIGHT * KEN_BURNS_UPSCALE;
    format!(
        "scale={up_w}:{up_h}:force_original_aspect_ratio=increase,crop={up_w}:{up_h},\
zoompan=z='{z}':x='{x}':y='{y}':d={frames}:s={w}x{h}:fps={fps},setsar=1,format=yuv420p",
        w = OUTPUT_WIDTH,
        h = OUTPUT_HEIGHT,
        fps = OUTPUT_FPS,
    )
}

/// Filter graph over inputs `0..n`, producing `[vout]`.
///
/// A single image always gets the centre zoom-in; multiple images cycle
/// through the variants and are concatenated.
pub fn slideshow_filter(durations: &[f64]) -> String {
    if durations.len() == 1 {
        return format!(
            "[0:v]{}[vout]",
            zoompan_chain(KenBurnsVariant::ZoomIn, durations[0])
        );
    }

    let mut chains: Vec<String> = durations
        .iter()
        .enumerate()
        .map(|(i, d)| {
            format!(
                "[{i}:v]{}[v{i}]",
                zoompan_chain(KenBurnsVariant::for_index(i), *d)
            )
        })
        .collect();

    let labels: String = (0..durations.len()).map(|i| format!("[v{}]", i)).collect();
    chains.push(format!(
        "{}concat=n={}:v=1:a=0[vout]",
        labels,
        durations.len()
    ));
    chains.join(";")
}

/// Slideshow over `images` with `audio` as the soundtrack, cut to `duration`.
pub fn slideshow_command(
    images: &[PathBuf],
    audio: &Path,
    duration: f64,
    output: &Path,
    encoding: &EncodingConfig,
) -> FfmpegCommand {
    let durations = segment_durations(duration, images.len());
    let audio_index = images.len();

    let cmd = images
        .iter()
        .fold(FfmpegCommand::new("slideshow", output), |cmd, img| cmd.input(img));

    cmd.input(audio)
        .filter_complex(slideshow_filter(&durations))
        .map("[vout]")
        .map(format!("{}:a", audio_index))
        .encoding(encoding)
        .frame_rate(OUTPUT_FPS)
        .duration(duration)
        .faststart()
}

/// Render the base video. Failure here is fatal to the render.
pub async fn render_slideshow(
    encoder: &dyn Encoder,
    images: &[PathBuf],
    audio: &Path,
    duration: f64,
    output: &Path,
    encoding: &EncodingConfig,
    timeout: Duration,
) -> MediaResult<()> {
    if images.is_empty() {
        return Err(MediaError::invalid_input("slideshow needs at least one image"));
    }
    if duration <= 0.0 {
        return Err(MediaError::invalid_input("slideshow duration must be positive"));
    }

    let cmd = slideshow_command(images, audio, duration, output, encoding);
    encoder.run(&cmd, timeout).await?;

    info!(
        images = images.len(),
        duration = duration,
        per_image = duration / images.len() as f64,
        "Slideshow rendered"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_even_split_sums_to_total() {
        for n in 1..=7 {
            let durations = segment_durations(13.7, n);
            assert_eq!(durations.len(), n);
            let sum: f64 = durations.iter().sum();
            assert!((sum - 13.7).abs() < 1e-9);
            for d in &durations {
                assert!((d - 13.7 / n as f64).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_variants_cycle_by_index() {
        assert_eq!(KenBurnsVariant::for_index(0), KenBurnsVariant::ZoomIn);
        assert_eq!(KenBurnsVariant::for_index(3), KenBurnsVariant::PanLeft);
        assert_eq!(KenBurnsVariant::for_index(4), KenBurnsVariant::ZoomIn);
        assert_ne!(KenBurnsVariant::for_index(1), KenBurnsVariant::for_index(2));
    }

    #[test]
    fn test_chain_upscales_before_zoompan() {
        let chain = zoompan_chain(KenBurnsVariant::ZoomIn, 2.0);
        let scale = chain.find("scale=2160:3840").unwrap();
        let zoom = chain.find("zoompan").unwrap();
        assert!(scale < zoom);
        assert!(chain.contains("d=60"));
        assert!(chain.contains("s=1080x1920"));
    }

    #[test]
    fn test_single_image_filter() {
        let filter = slideshow_filter(&[9.0]);
        assert!(filter.starts_with("[0:v]"));
        assert!(filter.ends_with("[vout]"));
        assert!(!filter.contains("concat"));
        assert!(filter.contains("min(1+"));
    }

    #[test]
    fn test_multi_image_filter_concats_all() {
        let filter = slideshow_filter(&segment_durations(12.0, 3));
        assert!(filter.contains("[v0][v1][v2]concat=n=3:v=1:a=0[vout]"));
        assert_eq!(filter.matches("d=120").count(), 3);
    }

    #[test]
    fn test_command_maps_audio_after_images() {
        let images = vec![PathBuf::from("a.jpg"), PathBuf::from("b.jpg")];
        let cmd = slideshow_command(
            &images,
            Path::new("voice.mp3"),
            10.0,
            Path::new("out.mp4"),
            &EncodingConfig::default(),
        );
        let args = cmd.build_args();
        assert!(args.contains(&"2:a".to_string()));
        assert!(args.contains(&"10.000".to_string()));
        assert_eq!(cmd.inputs().len(), 3);
    }

    #[test]
    fn test_frames_never_zero() {
        assert_eq!(frames_for(0.001, 30), 1);
        assert_eq!(frames_for(1.0, 30), 30);
    }
}
