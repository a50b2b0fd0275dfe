//! FFmpeg command builder and the `Encoder` capability.
//!
//! Every encoder invocation in the crate goes through a typed
//! `FfmpegCommand` and an `Encoder`; no call site assembles argument
//! strings by hand.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

use tokpipe_models::EncodingConfig;

use crate::error::{MediaError, MediaResult};
use crate::metrics::record_encoder_run;
use crate::probe::{probe_media, MediaInfo};
use crate::progress::{is_progress_line, parse_progress_line, FfmpegProgress};

/// Lines of non-progress stderr kept for error reports.
const STDERR_TAIL_LINES: usize = 20;

/// One `-i` input with the options that precede it.
#[derive(Debug, Clone, PartialEq)]
pub struct FfmpegInput {
    pub args: Vec<String>,
    pub path: PathBuf,
}

/// Builder for FFmpeg commands.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    /// Label for logs and metrics
    operation: String,
    inputs: Vec<FfmpegInput>,
    output: PathBuf,
    output_args: Vec<String>,
    overwrite: bool,
    log_level: String,
}

impl FfmpegCommand {
    pub fn new(operation: impl Into<String>, output: impl AsRef<Path>) -> Self {
        Self {
            operation: operation.into(),
            inputs: Vec::new(),
            output: output.as_ref().to_path_buf(),
            output_args: Vec::new(),
            overwrite: true,
            log_level: "error".to_string(),
        }
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    pub fn inputs(&self) -> &[FfmpegInput] {
        &self.inputs
    }

    /// Add a plain input.
    pub fn input(self, path: impl AsRef<Path>) -> Self {
        self.input_with(Vec::<String>::new(), path)
    }

    /// Add an input with its own pre-input options.
    pub fn input_with<I, S>(mut self, args: I, path: impl AsRef<Path>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inputs.push(FfmpegInput {
            args: args.into_iter().map(Into::into).collect(),
            path: path.as_ref().to_path_buf(),
        });
        self
    }

    /// Add an input that repeats forever (`-stream_loop -1`).
    pub fn looped_input(self, path: impl AsRef<Path>) -> Self {
        self.input_with(["-stream_loop", "-1"], path)
    }

    /// Add an input read from a seek position.
    pub fn seeked_input(self, position: impl Into<String>, path: impl AsRef<Path>) -> Self {
        self.input_with(["-ss".to_string(), position.into()], path)
    }

    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set video filter.
    pub fn video_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-vf").output_arg(filter)
    }

    /// Set filter complex.
    pub fn filter_complex(self, filter: impl Into<String>) -> Self {
        self.output_arg("-filter_complex").output_arg(filter)
    }

    /// Map a stream or filter label into the output.
    pub fn map(self, stream: impl Into<String>) -> Self {
        self.output_arg("-map").output_arg(stream)
    }

    /// Video and audio codec settings.
    pub fn encoding(self, encoding: &EncodingConfig) -> Self {
        self.output_args(encoding.to_ffmpeg_args())
    }

    pub fn video_encoding(self, encoding: &EncodingConfig) -> Self {
        self.output_args(encoding.video_args())
    }

    pub fn audio_encoding(self, encoding: &EncodingConfig) -> Self {
        self.output_args(encoding.audio_args())
    }

    /// Copy the audio stream untouched.
    pub fn copy_audio(self) -> Self {
        self.output_arg("-c:a").output_arg("copy")
    }

    /// Limit output duration.
    pub fn duration(self, seconds: f64) -> Self {
        self.output_arg("-t").output_arg(format!("{:.3}", seconds))
    }

    pub fn frame_rate(self, fps: u32) -> Self {
        self.output_arg("-r").output_arg(fps.to_string())
    }

    pub fn shortest(self) -> Self {
        self.output_arg("-shortest")
    }

    /// Move the moov atom to the front for progressive playback.
    pub fn faststart(self) -> Self {
        self.output_arg("-movflags").output_arg("+faststart")
    }

    /// Extract single frame.
    pub fn single_frame(self) -> Self {
        self.output_arg("-frames:v").output_arg("1")
    }

    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if self.overwrite {
            args.push("-y".to_string());
        }

        args.push("-hide_banner".to_string());
        args.push("-v".to_string());
        args.push(self.log_level.clone());

        // Progress output to stderr
        args.push("-progress".to_string());
        args.push("pipe:2".to_string());

        for input in &self.inputs {
            args.extend(input.args.iter().cloned());
            args.push("-i".to_string());
            args.push(input.path.to_string_lossy().to_string());
        }

        args.extend(self.output_args.iter().cloned());
        args.push(self.output.to_string_lossy().to_string());

        args
    }
}

/// The external encoder: runs compositing commands and probes results.
#[async_trait]
pub trait Encoder: Send + Sync {
    /// Run a command, failing with `MediaError::Timeout` past `timeout`.
    async fn run(&self, cmd: &FfmpegCommand, timeout: Duration) -> MediaResult<()>;

    async fn probe(&self, path: &Path) -> MediaResult<MediaInfo>;
}

/// `Encoder` backed by the `ffmpeg` and `ffprobe` binaries.
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl FfmpegEncoder {
    /// Locate both binaries on PATH.
    pub fn from_path() -> MediaResult<Self> {
        Ok(Self {
            ffmpeg: check_ffmpeg()?,
            ffprobe: check_ffprobe()?,
        })
    }

    pub fn with_binaries(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    async fn run_inner(&self, cmd: &FfmpegCommand, timeout: Duration) -> MediaResult<()> {
        let args = cmd.build_args();
        debug!(operation = cmd.operation(), "Running FFmpeg: ffmpeg {}", args.join(" "));

        let mut child = Command::new(&self.ffmpeg)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => MediaError::FfmpegNotFound,
                _ => MediaError::Io(e),
            })?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::encode_failed("stderr not captured", None, None))?;
        let operation = cmd.operation().to_string();

        // Progress lines go to tracing, everything else into a bounded tail
        let reader_handle = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            let mut current = FfmpegProgress::default();
            let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);
            while let Ok(Some(line)) = lines.next_line().await {
                if is_progress_line(&line) {
                    if let Some(p) = parse_progress_line(&line, &mut current) {
                        debug!(
                            operation = %operation,
                            out_time_ms = p.out_time_ms,
                            speed = p.speed,
                            "FFmpeg progress"
                        );
                    }
                } else if !line.trim().is_empty() {
                    if tail.len() == STDERR_TAIL_LINES {
                        tail.pop_front();
                    }
                    tail.push_back(line);
                }
            }
            tail.into_iter().collect::<Vec<_>>().join("\n")
        });

        let status = match tokio::time::timeout(timeout, child.wait()).await {
            Ok(status) => status?,
            Err(_) => {
                warn!(
                    operation = cmd.operation(),
                    timeout_secs = timeout.as_secs(),
                    "FFmpeg timed out, killing process"
                );
                let _ = child.kill().await;
                reader_handle.abort();
                return Err(MediaError::timeout(
                    format!("ffmpeg {}", cmd.operation()),
                    timeout.as_secs(),
                ));
            }
        };

        let stderr_tail = reader_handle.await.unwrap_or_default();

        if status.success() {
            Ok(())
        } else {
            Err(MediaError::encode_failed(
                format!("ffmpeg {} exited with non-zero status", cmd.operation()),
                (!stderr_tail.is_empty()).then_some(stderr_tail),
                status.code(),
            ))
        }
    }
}

#[async_trait]
impl Encoder for FfmpegEncoder {
    async fn run(&self, cmd: &FfmpegCommand, timeout: Duration) -> MediaResult<()> {
        let started = Instant::now();
        let result = self.run_inner(cmd, timeout).await;
        record_encoder_run(cmd.operation(), result.is_ok(), started.elapsed().as_secs_f64());
        result
    }

    async fn probe(&self, path: &Path) -> MediaResult<MediaInfo> {
        probe_media(&self.ffprobe, path).await
    }
}

/// Check if FFmpeg is available.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}

/// Check if FFprobe is available.
pub fn check_ffprobe() -> MediaResult<PathBuf> {
    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)
}

/// Escape a path for use inside a filter graph argument.
pub fn escape_filter_path(path: &Path) -> String {
    path.to_string_lossy()
        .replace('\\', "\\\\")
        .replace('\'', "\\'")
        .replace(':', "\\:")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_builder_orders_inputs() {
        let cmd = FfmpegCommand::new("mix", "out.m4a")
            .input("voice.mp3")
            .looped_input("music.mp3")
            .filter_complex("[0:a][1:a]amix=inputs=2[aout]")
            .map("[aout]")
            .duration(12.5);

        let args = cmd.build_args();
        let voice = args.iter().position(|a| a == "voice.mp3").unwrap();
        let loop_flag = args.iter().position(|a| a == "-stream_loop").unwrap();
        let music = args.iter().position(|a| a == "music.mp3").unwrap();
        assert!(voice < loop_flag && loop_flag < music);
        assert!(args.contains(&"12.500".to_string()));
        assert_eq!(args.last().unwrap(), "out.m4a");
    }

    #[test]
    fn test_encoding_args() {
        let cmd = FfmpegCommand::new("render", "out.mp4")
            .input("a.jpg")
            .encoding(&EncodingConfig::default())
            .faststart();
        let args = cmd.build_args();
        assert!(args.contains(&"libx264".to_string()));
        assert!(args.contains(&"+faststart".to_string()));
        assert!(args.contains(&"yuv420p".to_string()));
    }

    #[test]
    fn test_seeked_input() {
        let cmd = FfmpegCommand::new("thumbnail", "t.jpg")
            .seeked_input("00:00:01", "v.mp4")
            .single_frame();
        let args = cmd.build_args();
        let ss = args.iter().position(|a| a == "-ss").unwrap();
        let i = args.iter().position(|a| a == "-i").unwrap();
        assert!(ss < i);
        assert!(args.contains(&"-frames:v".to_string()));
    }

    #[test]
    fn test_escape_filter_path() {
        let escaped = escape_filter_path(Path::new("/tmp/it's:here.srt"));
        assert_eq!(escaped, "/tmp/it\\'s\\:here.srt");
    }

    #[tokio::test]
    async fn test_missing_binary_is_reported() {
        let encoder = FfmpegEncoder::with_binaries("/nonexistent/ffmpeg", "/nonexistent/ffprobe");
        let cmd = FfmpegCommand::new("render", "/tmp/never.mp4").input("in.jpg");
        let err = encoder.run(&cmd, Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, MediaError::FfmpegNotFound));
    }
}
