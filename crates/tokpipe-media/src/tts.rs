//! Voice synthesis.
//!
//! The narration is spoken by an external TTS engine; its measured length
//! drives every downstream timing (slideshow segments, subtitle cues).

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{info, warn};

use crate::command::Encoder;
use crate::error::{MediaError, MediaResult};

/// Longest narration passed to the engine, in characters.
pub const MAX_TTS_CHARS: usize = 1000;

/// Turns text into an audio file.
#[async_trait]
pub trait VoiceSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, output: &Path) -> MediaResult<()>;
}

/// TTS engine configuration.
#[derive(Debug, Clone)]
pub struct TtsConfig {
    pub voice: String,
    /// Speaking-rate adjustment, e.g. "+10%"
    pub rate: String,
    pub timeout: Duration,
    pub edge_tts_bin: String,
    pub python_bin: String,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            voice: "en-US-AriaNeural".to_string(),
            rate: "+0%".to_string(),
            timeout: Duration::from_secs(60),
            edge_tts_bin: "edge-tts".to_string(),
            python_bin: "python3".to_string(),
        }
    }
}

impl TtsConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            voice: std::env::var("TTS_VOICE").unwrap_or(defaults.voice),
            rate: std::env::var("TTS_RATE").unwrap_or(defaults.rate),
            timeout: Duration::from_secs(
                std::env::var("TTS_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(60),
            ),
            edge_tts_bin: std::env::var("EDGE_TTS_BIN").unwrap_or(defaults.edge_tts_bin),
            python_bin: std::env::var("PYTHON_BIN").unwrap_or(defaults.python_bin),
        }
    }
}

/// One way of invoking the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct TtsInvocation {
    pub program: String,
    pub args: Vec<String>,
}

/// `edge-tts` CLI, with `python3 -m edge_tts` as the alternate form.
#[derive(Debug, Clone, Default)]
pub struct EdgeTtsSynthesizer {
    config: TtsConfig,
}

impl EdgeTtsSynthesizer {
    pub fn new(config: TtsConfig) -> Self {
        Self { config }
    }

    /// Primary and alternate invocations, in the order they are tried.
    pub fn invocations(&self, text: &str, output: &Path) -> [TtsInvocation; 2] {
        let tail = vec![
            "--voice".to_string(),
            self.config.voice.clone(),
            format!("--rate={}", self.config.rate),
            "--text".to_string(),
            text.to_string(),
            "--write-media".to_string(),
            output.to_string_lossy().to_string(),
        ];

        let mut module_args = vec!["-m".to_string(), "edge_tts".to_string()];
        module_args.extend(tail.iter().cloned());

        [
            TtsInvocation {
                program: self.config.edge_tts_bin.clone(),
                args: tail,
            },
            TtsInvocation {
                program: self.config.python_bin.clone(),
                args: module_args,
            },
        ]
    }

    async fn run(&self, invocation: &TtsInvocation, output: &Path) -> MediaResult<()> {
        let child = Command::new(&invocation.program)
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let result = tokio::time::timeout(self.config.timeout, child)
            .await
            .map_err(|_| MediaError::timeout("tts", self.config.timeout.as_secs()))?
            .map_err(|e| MediaError::tts_failed(format!("{}: {}", invocation.program, e)))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(MediaError::tts_failed(format!(
                "{} exited with {:?}: {}",
                invocation.program,
                result.status.code(),
                stderr.trim()
            )));
        }

        let written = tokio::fs::metadata(output).await.map(|m| m.len()).unwrap_or(0);
        if written == 0 {
            return Err(MediaError::tts_failed(format!(
                "{} produced no audio",
                invocation.program
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl VoiceSynthesizer for EdgeTtsSynthesizer {
    async fn synthesize(&self, text: &str, output: &Path) -> MediaResult<()> {
        let [primary, alternate] = self.invocations(text, output);

        match self.run(&primary, output).await {
            Ok(()) => Ok(()),
            Err(first) => {
                warn!(error = %first, "Primary TTS invocation failed, trying alternate form");
                self.run(&alternate, output).await.map_err(|second| {
                    MediaError::tts_failed(format!("{}; alternate: {}", first, second))
                })
            }
        }
    }
}

/// Synthesized narration with its measured duration.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceTrack {
    pub path: PathBuf,
    /// Seconds, probed from the file
    pub duration: f64,
}

/// Truncate to at most `max_chars` characters on a char boundary.
pub fn truncate_text(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].trim_end(),
        None => text,
    }
}

/// Speak the segments and measure the result.
pub async fn synthesize_voice(
    synthesizer: &dyn VoiceSynthesizer,
    encoder: &dyn Encoder,
    segments: &[&str],
    dir: &Path,
) -> MediaResult<VoiceTrack> {
    let script = segments
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    if script.is_empty() {
        return Err(MediaError::tts_failed("no narration text"));
    }
    let text = truncate_text(&script, MAX_TTS_CHARS);

    let path = dir.join("voice.mp3");
    synthesizer.synthesize(text, &path).await?;

    let info = encoder
        .probe(&path)
        .await
        .map_err(|e| MediaError::tts_failed(format!("could not measure voice track: {}", e)))?;
    if info.duration <= 0.0 {
        return Err(MediaError::tts_failed("voice track has zero duration"));
    }

    info!(chars = text.chars().count(), duration = info.duration, "Voice synthesized");
    Ok(VoiceTrack {
        path,
        duration: info.duration,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::FfmpegCommand;
    use crate::probe::MediaInfo;
    use std::sync::Mutex;

    struct RecordingSynth {
        spoken: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl VoiceSynthesizer for RecordingSynth {
        async fn synthesize(&self, text: &str, output: &Path) -> MediaResult<()> {
            self.spoken.lock().unwrap().push(text.to_string());
            tokio::fs::write(output, b"mp3").await?;
            Ok(())
        }
    }

    struct FixedProbe(f64);

    #[async_trait]
    impl Encoder for FixedProbe {
        async fn run(&self, _cmd: &FfmpegCommand, _timeout: Duration) -> MediaResult<()> {
            Ok(())
        }

        async fn probe(&self, _path: &Path) -> MediaResult<MediaInfo> {
            Ok(MediaInfo {
                duration: self.0,
                has_audio: true,
                ..Default::default()
            })
        }
    }

    #[test]
    fn test_truncate_text_char_boundary() {
        assert_eq!(truncate_text("héllo wörld", 7), "héllo w");
        assert_eq!(truncate_text("short", 100), "short");
        assert_eq!(truncate_text("ab cd", 3), "ab");
    }

    #[test]
    fn test_invocations() {
        let synth = EdgeTtsSynthesizer::default();
        let [primary, alternate] = synth.invocations("hi", Path::new("/tmp/v.mp3"));
        assert_eq!(primary.program, "edge-tts");
        assert!(primary.args.contains(&"en-US-AriaNeural".to_string()));
        assert_eq!(alternate.program, "python3");
        assert_eq!(&alternate.args[..2], &["-m".to_string(), "edge_tts".to_string()]);
        assert_eq!(alternate.args[2..], primary.args[..]);
    }

    #[tokio::test]
    async fn test_synthesize_voice_joins_segments_and_measures() {
        let dir = tempfile::TempDir::new().unwrap();
        let synth = RecordingSynth {
            spoken: Mutex::new(Vec::new()),
        };

        let track = synthesize_voice(&synth, &FixedProbe(9.5), &["One.", "", " Two. ", "Buy"], dir.path())
            .await
            .unwrap();

        assert_eq!(synth.spoken.lock().unwrap()[0], "One. Two. Buy");
        assert!((track.duration - 9.5).abs() < 1e-9);
        assert!(track.path.ends_with("voice.mp3"));
    }

    #[tokio::test]
    async fn test_zero_duration_is_tts_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let synth = RecordingSynth {
            spoken: Mutex::new(Vec::new()),
        };
        let err = synthesize_voice(&synth, &FixedProbe(0.0), &["hello"], dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::Tts(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_alternate_invocation_used_when_primary_missing() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new().unwrap();
        let python = dir.path().join("python3");
        std::fs::write(
            &python,
            "#!/bin/sh\n\
             [ \"$1\" = \"-m\" ] && [ \"$2\" = \"edge_tts\" ] || exit 3\n\
             while [ $# -gt 0 ]; do\n\
               if [ \"$1\" = \"--write-media\" ]; then printf mp3 > \"$2\"; fi\n\
               shift\n\
             done\n",
        )
        .unwrap();
        std::fs::set_permissions(&python, std::fs::Permissions::from_mode(0o755)).unwrap();

        let synth = EdgeTtsSynthesizer::new(TtsConfig {
            edge_tts_bin: "/nonexistent/edge-tts".into(),
            python_bin: python.to_string_lossy().to_string(),
            ..Default::default()
        });
        let output = dir.path().join("v.mp3");
        synth.synthesize("hello", &output).await.unwrap();
        assert_eq!(std::fs::read(&output).unwrap(), b"mp3");
    }

    #[tokio::test]
    async fn test_both_invocations_failing_is_tts_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let synth = EdgeTtsSynthesizer::new(TtsConfig {
            edge_tts_bin: "/nonexistent/edge-tts".into(),
            python_bin: "/nonexistent/python3".into(),
            ..Default::default()
        });
        let err = synth
            .synthesize("hello", &dir.path().join("v.mp3"))
            .await
            .unwrap_err();
        match err {
            MediaError::Tts(msg) => assert!(msg.contains("alternate")),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
