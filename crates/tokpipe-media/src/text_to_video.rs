//! Text-to-video backend.
//!
//! A single prompt goes to an asynchronous generation service; the
//! operation is polled on a fixed interval until it finishes or the
//! wall-clock ceiling is hit.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info, warn};

use tokpipe_models::Clock;

use crate::error::{MediaError, MediaResult};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_POLL_CEILING: Duration = Duration::from_secs(6 * 60);
pub const VERTICAL_ASPECT_RATIO: &str = "9:16";

/// A finished video asset.
#[derive(Debug, Clone, PartialEq)]
pub enum GeneratedVideo {
    Url(String),
    Bytes(Vec<u8>),
}

/// Poll result for a long-running operation.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationStatus {
    Pending,
    Done(GeneratedVideo),
}

/// Asynchronous text-to-video service.
#[async_trait]
pub trait VideoGenerator: Send + Sync {
    /// Start generation; returns an operation handle.
    async fn submit(&self, prompt: &str, aspect_ratio: &str) -> MediaResult<String>;

    async fn poll(&self, operation: &str) -> MediaResult<GenerationStatus>;
}

/// Compose the natural-language prompt from product, narrative and style.
pub fn build_prompt(product_name: &str, segments: &[&str], style: &str) -> String {
    let mut prompt = format!(
        "A vertical short-form promotional video for \"{}\" in the style of {}. ",
        product_name, style
    );
    let narrative: Vec<&str> = segments
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();
    if !narrative.is_empty() {
        prompt.push_str("Scenes, in order: ");
        for (i, scene) in narrative.iter().enumerate() {
            prompt.push_str(&format!("({}) {} ", i + 1, scene));
        }
        prompt.push_str(&format!(
            "A clear voiceover narrates: \"{}\". ",
            narrative.join(" ")
        ));
    }
    prompt.push_str("Bright lighting, smooth camera motion, product always in focus, no on-screen text.");
    prompt
}

/// Poll `operation` until done, failing with `Timeout` past `ceiling`.
pub async fn wait_for_video(
    generator: &dyn VideoGenerator,
    clock: &dyn Clock,
    operation: &str,
    interval: Duration,
    ceiling: Duration,
) -> MediaResult<GeneratedVideo> {
    let started = clock.now();
    let mut polls = 0u32;

    loop {
        polls += 1;
        if let GenerationStatus::Done(video) = generator.poll(operation).await? {
            info!(operation = operation, polls = polls, "Video generation finished");
            return Ok(video);
        }

        let elapsed = (clock.now() - started).to_std().unwrap_or_default();
        if elapsed + interval > ceiling {
            warn!(
                operation = operation,
                polls = polls,
                elapsed_secs = elapsed.as_secs(),
                "Video generation exceeded polling ceiling"
            );
            return Err(MediaError::timeout("text-to-video generation", ceiling.as_secs()));
        }

        debug!(operation = operation, polls = polls, "Video generation pending");
        clock.sleep(interval).await;
    }
}

/// Submit a prompt and wait for the result.
pub async fn generate_video(
    generator: &dyn VideoGenerator,
    clock: &dyn Clock,
    prompt: &str,
    interval: Duration,
    ceiling: Duration,
) -> MediaResult<GeneratedVideo> {
    let operation = generator.submit(prompt, VERTICAL_ASPECT_RATIO).await?;
    info!(operation = %operation, "Video generation submitted");
    wait_for_video(generator, clock, &operation, interval, ceiling).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::Mutex;
    use tokpipe_models::ManualClock;

    struct CountdownGenerator {
        remaining: Mutex<Option<u32>>,
        aspect: Mutex<String>,
    }

    #[async_trait]
    impl VideoGenerator for CountdownGenerator {
        async fn submit(&self, _prompt: &str, aspect_ratio: &str) -> MediaResult<String> {
            *self.aspect.lock().unwrap() = aspect_ratio.to_string();
            Ok("operations/1".into())
        }

        async fn poll(&self, _operation: &str) -> MediaResult<GenerationStatus> {
            let mut remaining = self.remaining.lock().unwrap();
            match remaining.as_mut() {
                Some(0) => Ok(GenerationStatus::Done(GeneratedVideo::Url("https://v/1.mp4".into()))),
                Some(n) => {
                    *n -= 1;
                    Ok(GenerationStatus::Pending)
                }
                None => Ok(GenerationStatus::Pending),
            }
        }
    }

    #[tokio::test]
    async fn test_completes_after_pending_polls() {
        let clock = ManualClock::new(Utc::now());
        let generator = CountdownGenerator {
            remaining: Mutex::new(Some(3)),
            aspect: Mutex::new(String::new()),
        };

        let video = generate_video(&generator, &clock, "p", DEFAULT_POLL_INTERVAL, DEFAULT_POLL_CEILING)
            .await
            .unwrap();

        assert_eq!(video, GeneratedVideo::Url("https://v/1.mp4".into()));
        assert_eq!(clock.sleeps().len(), 3);
        assert_eq!(*generator.aspect.lock().unwrap(), "9:16");
    }

    #[tokio::test]
    async fn test_times_out_at_ceiling() {
        let clock = ManualClock::new(Utc::now());
        let generator = CountdownGenerator {
            remaining: Mutex::new(None),
            aspect: Mutex::new(String::new()),
        };

        let err = wait_for_video(&generator, &clock, "op", DEFAULT_POLL_INTERVAL, DEFAULT_POLL_CEILING)
            .await
            .unwrap_err();

        assert!(matches!(err, MediaError::Timeout { secs: 360, .. }));
        assert!(clock.total_slept() <= DEFAULT_POLL_CEILING);
        assert_eq!(clock.total_slept(), DEFAULT_POLL_CEILING);
    }

    #[test]
    fn test_build_prompt() {
        let prompt = build_prompt("Desk Lamp", &["Tired eyes?", "", "Buy now"], "cinematic");
        assert!(prompt.contains("\"Desk Lamp\""));
        assert!(prompt.contains("(1) Tired eyes?"));
        assert!(prompt.contains("(2) Buy now"));
        assert!(prompt.contains("cinematic"));
    }
}
