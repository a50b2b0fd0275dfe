//! Progress reporting.
//!
//! Two levels: `FfmpegProgress` is parsed from a running encoder's
//! `-progress pipe:2` stream, `RenderStage` marks the compositor's
//! checkpoints that are reported to a `ProgressSink`.

use serde::{Deserialize, Serialize};

/// Progress information from FFmpeg.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FfmpegProgress {
    /// Current frame number
    pub frame: u64,
    /// Output time in milliseconds
    pub out_time_ms: i64,
    /// Encoding speed (e.g., 1.5 = 1.5x realtime)
    pub speed: f64,
    pub is_complete: bool,
}

impl FfmpegProgress {
    /// Percentage of `total_duration_ms` encoded so far.
    pub fn percentage(&self, total_duration_ms: i64) -> f64 {
        if total_duration_ms <= 0 {
            return 0.0;
        }
        ((self.out_time_ms as f64 / total_duration_ms as f64) * 100.0).min(100.0)
    }
}

/// Parse one line of FFmpeg's `-progress` output.
///
/// Returns a snapshot whenever a `progress=` line closes a block.
pub fn parse_progress_line(line: &str, current: &mut FfmpegProgress) -> Option<FfmpegProgress> {
    let (key, value) = line.trim().split_once('=')?;
    match key {
        "out_time_us" => {
            if let Ok(us) = value.parse::<i64>() {
                current.out_time_ms = us / 1000;
            }
        }
        // FFmpeg reports microseconds under this key too
        "out_time_ms" => {
            if let Ok(us) = value.parse::<i64>() {
                current.out_time_ms = us / 1000;
            }
        }
        "frame" => {
            if let Ok(frame) = value.parse() {
                current.frame = frame;
            }
        }
        "speed" => {
            if let Some(speed) = value.strip_suffix('x').and_then(|s| s.trim().parse().ok()) {
                current.speed = speed;
            }
        }
        "progress" => {
            current.is_complete = value == "end";
            return Some(current.clone());
        }
        _ => {}
    }
    None
}

/// Whether a stderr line belongs to the `-progress` key/value stream.
pub fn is_progress_line(line: &str) -> bool {
    const KEYS: &[&str] = &[
        "frame", "fps", "stream_0_0_q", "bitrate", "total_size", "out_time_us", "out_time_ms",
        "out_time", "dup_frames", "drop_frames", "speed", "progress",
    ];
    line.split_once('=')
        .map(|(k, _)| KEYS.contains(&k.trim()))
        .unwrap_or(false)
}

/// Compositor checkpoints, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RenderStage {
    Download,
    Voice,
    Music,
    Render,
    Overlay,
    Watermark,
    Thumbnail,
    Cleanup,
}

impl RenderStage {
    pub fn percent(&self) -> u8 {
        match self {
            RenderStage::Download => 5,
            RenderStage::Voice => 25,
            RenderStage::Music => 45,
            RenderStage::Render => 70,
            RenderStage::Overlay => 85,
            RenderStage::Watermark => 95,
            RenderStage::Thumbnail => 98,
            RenderStage::Cleanup => 100,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RenderStage::Download => "download",
            RenderStage::Voice => "voice",
            RenderStage::Music => "music",
            RenderStage::Render => "render",
            RenderStage::Overlay => "overlay",
            RenderStage::Watermark => "watermark",
            RenderStage::Thumbnail => "thumbnail",
            RenderStage::Cleanup => "cleanup",
        }
    }
}

/// Receives render checkpoints.
///
/// Implementations must return quickly; persistence belongs on a spawned
/// task, not inline.
pub trait ProgressSink: Send + Sync {
    fn report(&self, percent: u8, step: &str);

    fn stage(&self, stage: RenderStage, step: &str) {
        self.report(stage.percent(), step);
    }
}

impl<F> ProgressSink for F
where
    F: Fn(u8, &str) + Send + Sync,
{
    fn report(&self, percent: u8, step: &str) {
        self(percent, step)
    }
}

/// Discards all reports.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn report(&self, _percent: u8, _step: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_progress_parsing() {
        let mut progress = FfmpegProgress::default();

        parse_progress_line("out_time_us=5000000", &mut progress);
        assert_eq!(progress.out_time_ms, 5000);

        parse_progress_line("speed=1.5x", &mut progress);
        assert!((progress.speed - 1.5).abs() < 0.01);

        parse_progress_line("speed=N/A", &mut progress);
        assert!((progress.speed - 1.5).abs() < 0.01);

        let result = parse_progress_line("progress=end", &mut progress);
        assert!(result.is_some());
        assert!(progress.is_complete);
    }

    #[test]
    fn test_progress_percentage() {
        let progress = FfmpegProgress {
            out_time_ms: 5000,
            ..Default::default()
        };
        assert!((progress.percentage(10000) - 50.0).abs() < 0.01);
        assert_eq!(progress.percentage(0), 0.0);
    }

    #[test]
    fn test_is_progress_line() {
        assert!(is_progress_line("frame=12"));
        assert!(is_progress_line("progress=continue"));
        assert!(!is_progress_line("[libx264 @ 0x1] error"));
    }

    #[test]
    fn test_stage_percentages_monotonic() {
        let stages = [
            RenderStage::Download,
            RenderStage::Voice,
            RenderStage::Music,
            RenderStage::Render,
            RenderStage::Overlay,
            RenderStage::Watermark,
            RenderStage::Thumbnail,
            RenderStage::Cleanup,
        ];
        let pct: Vec<u8> = stages.iter().map(|s| s.percent()).collect();
        assert_eq!(pct, vec![5, 25, 45, 70, 85, 95, 98, 100]);
    }

    #[test]
    fn test_closure_sink() {
        let seen = Mutex::new(Vec::new());
        let sink = |p: u8, s: &str| seen.lock().unwrap().push((p, s.to_string()));
        sink.stage(RenderStage::Render, "Rendered");
        assert_eq!(seen.lock().unwrap()[0], (70, "Rendered".to_string()));
    }
}
