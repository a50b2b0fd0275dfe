//! Background music.
//!
//! Voice stays at full volume; the music bed is looped under it at the
//! requested volume and cut to the voice duration.

use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use tokpipe_models::{EncodingConfig, MusicSpec};

use crate::command::{Encoder, FfmpegCommand};
use crate::error::{MediaError, MediaResult};

/// Named tracks stored as `<dir>/<name>.mp3`.
#[derive(Debug, Clone)]
pub struct MusicLibrary {
    dir: PathBuf,
}

impl MusicLibrary {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn from_env() -> Self {
        Self::new(std::env::var("MUSIC_DIR").unwrap_or_else(|_| "/app/assets/music".to_string()))
    }

    /// Resolve a track name to an existing file.
    pub fn resolve(&self, track: &str) -> MediaResult<PathBuf> {
        let name = track.trim();
        if name.is_empty() || name.contains(['/', '\\']) || name.contains("..") {
            return Err(MediaError::invalid_input(format!("invalid track name: {:?}", track)));
        }
        let path = self.dir.join(format!("{}.mp3", name));
        if !path.is_file() {
            return Err(MediaError::FileNotFound(path));
        }
        Ok(path)
    }

    /// Track names available in the library.
    pub fn tracks(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(&self.dir)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .map(|e| e.path())
                    .filter(|p| p.extension().map(|x| x == "mp3").unwrap_or(false))
                    .filter_map(|p| p.file_stem().map(|s| s.to_string_lossy().to_string()))
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }
}

/// Filter graph mixing `[0:a]` voice with a `[1:a]` music bed.
pub fn music_mix_filter(volume: f32) -> String {
    format!(
        "[1:a]volume={:.2}[bg];[0:a][bg]amix=inputs=2:duration=first:dropout_transition=0:normalize=0[aout]",
        volume.clamp(0.0, 1.0)
    )
}

pub fn music_mix_command(
    voice: &Path,
    music: &Path,
    volume: f32,
    duration: f64,
    output: &Path,
    encoding: &EncodingConfig,
) -> FfmpegCommand {
    FfmpegCommand::new("music_mix", output)
        .input(voice)
        .looped_input(music)
        .filter_complex(music_mix_filter(volume))
        .map("[aout]")
        .audio_encoding(encoding)
        .duration(duration)
}

/// Mix the voice track over the requested music bed into `output`.
#[allow(clippy::too_many_arguments)]
pub async fn mix_music(
    encoder: &dyn Encoder,
    library: &MusicLibrary,
    music: &MusicSpec,
    voice: &Path,
    duration: f64,
    output: &Path,
    encoding: &EncodingConfig,
    timeout: Duration,
) -> MediaResult<()> {
    let track = library.resolve(&music.track)?;
    let cmd = music_mix_command(voice, &track, music.volume, duration, output, encoding);
    encoder.run(&cmd, timeout).await?;

    info!(track = %music.track, volume = music.volume, "Music mixed under voice");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_mix_filter_keeps_voice_full_volume() {
        let filter = music_mix_filter(0.15);
        assert!(filter.starts_with("[1:a]volume=0.15[bg]"));
        assert!(filter.contains("duration=first"));
        assert!(filter.contains("normalize=0"));
        assert!(!filter.contains("[0:a]volume"));
    }

    #[test]
    fn test_mix_filter_clamps_volume() {
        assert!(music_mix_filter(4.0).contains("volume=1.00"));
    }

    #[test]
    fn test_mix_command_loops_music() {
        let cmd = music_mix_command(
            Path::new("voice.mp3"),
            Path::new("chill.mp3"),
            0.2,
            8.0,
            Path::new("mix.m4a"),
            &EncodingConfig::default(),
        );
        assert_eq!(cmd.inputs()[1].args, vec!["-stream_loop", "-1"]);
        assert!(cmd.build_args().contains(&"8.000".to_string()));
    }

    #[test]
    fn test_library_resolve() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("chill.mp3"), b"x").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        let library = MusicLibrary::new(dir.path());

        assert!(library.resolve("chill").is_ok());
        assert!(matches!(library.resolve("upbeat"), Err(MediaError::FileNotFound(_))));
        assert!(matches!(library.resolve("../etc/passwd"), Err(MediaError::InvalidInput(_))));
        assert_eq!(library.tracks(), vec!["chill".to_string()]);
    }
}
