//! Job definitions for the content pipeline.
//!
//! A job is one unit of work tied to a product: hooks are generated, a video
//! is rendered, a posting slot is assigned and the video is published.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::{ModelError, ModelResult};
use crate::product::{Product, ProductId};

/// Maximum number of sequential hook segments on a job.
pub const MAX_HOOKS: usize = 3;

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Job lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Waiting for the next pipeline stage or the posting sweep
    #[default]
    Pending,
    /// Claimed by a posting sweep
    Processing,
    /// Published to the platform
    Done,
    /// Failed permanently (re-enterable through a manual retry)
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Processing => "PROCESSING",
            JobStatus::Done => "DONE",
            JobStatus::Failed => "FAILED",
        }
    }

    /// Terminal states produce notifications.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed)
    }

    /// Jobs that occupy a posting slot.
    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Processing)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A pipeline job.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    /// Unique job ID
    pub id: JobId,

    /// Internal product ID
    pub product_id: ProductId,

    /// Product ID on the affiliate platform
    #[serde(default)]
    pub external_product_id: Option<String>,

    /// Affiliate link used in captions
    #[serde(default)]
    pub affiliate_url: Option<String>,

    /// Product display name
    pub product_name: String,

    /// Up to three sequential hook segments
    #[serde(default)]
    pub hooks: Vec<String>,

    /// Call-to-action segment
    #[serde(default)]
    pub ending: Option<String>,

    #[serde(default)]
    pub caption: Option<String>,

    #[serde(default)]
    pub hashtags: Vec<String>,

    /// Primary image
    #[serde(default)]
    pub image_url: Option<String>,

    /// Ordered gallery images
    #[serde(default)]
    pub image_urls: Vec<String>,

    /// Public URL of the rendered video
    #[serde(default)]
    pub video_url: Option<String>,

    #[serde(default)]
    pub thumbnail_url: Option<String>,

    #[serde(default)]
    pub status: JobStatus,

    /// Progress (0-100)
    #[serde(default)]
    pub progress: u8,

    /// Human-readable description of the current step
    #[serde(default)]
    pub progress_step: Option<String>,

    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub posted_at: Option<DateTime<Utc>>,

    /// Assigned posting account
    #[serde(default)]
    pub tiktok_account_id: Option<String>,

    /// Platform post id once published
    #[serde(default)]
    pub tiktok_post_id: Option<String>,

    /// Number of failed post attempts
    #[serde(default)]
    pub retry_count: u32,

    #[serde(default)]
    pub error: Option<String>,

    /// Held by a pipeline run until this instant
    #[serde(default)]
    pub pipeline_lease_until: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Create a new pending job for a product name.
    pub fn new(product_id: ProductId, product_name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: JobId::new(),
            product_id,
            external_product_id: None,
            affiliate_url: None,
            product_name: product_name.into(),
            hooks: Vec::new(),
            ending: None,
            caption: None,
            hashtags: Vec::new(),
            image_url: None,
            image_urls: Vec::new(),
            video_url: None,
            thumbnail_url: None,
            status: JobStatus::Pending,
            progress: 0,
            progress_step: None,
            scheduled_at: None,
            posted_at: None,
            tiktok_account_id: None,
            tiktok_post_id: None,
            retry_count: 0,
            error: None,
            pipeline_lease_until: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Seed a job from a product record.
    pub fn from_product(product: &Product, now: DateTime<Utc>) -> Self {
        let mut job = Self::new(product.id.clone(), product.title.clone(), now);
        job.external_product_id = product.external_id.clone();
        job.affiliate_url = product.affiliate_url.clone();
        job.image_url = product.image_url.clone();
        job.image_urls = product.gallery_urls.clone();
        job
    }

    /// Whether any hook text exists.
    pub fn has_hooks(&self) -> bool {
        self.hooks.iter().any(|h| !h.trim().is_empty())
    }

    /// Ordered narrative segments: hooks followed by the ending.
    ///
    /// Always four entries; missing segments are empty strings.
    pub fn segments(&self) -> Vec<String> {
        let mut segments: Vec<String> = (0..MAX_HOOKS)
            .map(|i| self.hooks.get(i).cloned().unwrap_or_default())
            .collect();
        segments.push(self.ending.clone().unwrap_or_default());
        segments
    }

    /// Images to render, gallery first, falling back to the hero image.
    pub fn images(&self) -> Vec<String> {
        if !self.image_urls.is_empty() {
            return self.image_urls.clone();
        }
        self.image_url.iter().cloned().collect()
    }

    /// Store generated creative fields, keeping at most three hooks.
    pub fn set_creative(
        &mut self,
        hooks: Vec<String>,
        ending: Option<String>,
        caption: Option<String>,
        hashtags: Vec<String>,
        now: DateTime<Utc>,
    ) {
        self.hooks = hooks.into_iter().take(MAX_HOOKS).collect();
        self.ending = ending;
        self.caption = caption;
        self.hashtags = hashtags;
        self.updated_at = now;
    }

    /// Caption with hashtags appended, as posted to the platform.
    pub fn full_caption(&self) -> String {
        let base = self
            .caption
            .clone()
            .unwrap_or_else(|| self.product_name.clone());
        let tags: Vec<String> = self
            .hashtags
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .map(|t| {
                if t.starts_with('#') {
                    t.to_string()
                } else {
                    format!("#{}", t)
                }
            })
            .collect();
        if tags.is_empty() {
            base
        } else {
            format!("{} {}", base, tags.join(" "))
        }
    }

    /// Update progress.
    pub fn set_progress(&mut self, progress: u8, step: impl Into<String>, now: DateTime<Utc>) {
        self.progress = progress.min(100);
        self.progress_step = Some(step.into());
        self.updated_at = now;
    }

    /// Record the rendered video.
    pub fn set_video(&mut self, video_url: impl Into<String>, thumbnail_url: Option<String>, now: DateTime<Utc>) {
        self.video_url = Some(video_url.into());
        self.thumbnail_url = thumbnail_url;
        self.updated_at = now;
    }

    /// Assign a posting slot. Requires a rendered video.
    pub fn schedule(
        &mut self,
        at: DateTime<Utc>,
        account_id: impl Into<String>,
        now: DateTime<Utc>,
    ) -> ModelResult<()> {
        if self.video_url.is_none() {
            return Err(ModelError::MissingVideo(self.id.to_string()));
        }
        self.scheduled_at = Some(at);
        self.tiktok_account_id = Some(account_id.into());
        self.status = JobStatus::Pending;
        self.updated_at = now;
        Ok(())
    }

    /// Whether the posting sweep may pick this job up at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == JobStatus::Pending
            && self.video_url.is_some()
            && self.tiktok_account_id.is_some()
            && self.scheduled_at.map(|at| at <= now).unwrap_or(false)
    }

    /// Take the pipeline lease for one run.
    ///
    /// Fails while another run holds an unexpired lease. An expired lease is
    /// taken over, so a crashed run only blocks the job until `until`.
    pub fn acquire_pipeline_lease(&mut self, until: DateTime<Utc>, now: DateTime<Utc>) -> ModelResult<()> {
        if self.pipeline_leased(now) {
            return Err(ModelError::PipelineBusy(self.id.to_string()));
        }
        self.pipeline_lease_until = Some(until);
        self.updated_at = now;
        Ok(())
    }

    /// Whether a pipeline run holds an unexpired lease at `now`.
    pub fn pipeline_leased(&self, now: DateTime<Utc>) -> bool {
        self.pipeline_lease_until.is_some_and(|until| until > now)
    }

    pub fn release_pipeline_lease(&mut self, now: DateTime<Utc>) {
        self.pipeline_lease_until = None;
        self.updated_at = now;
    }

    /// Mark as claimed by a posting sweep.
    pub fn start_processing(&mut self, now: DateTime<Utc>) -> ModelResult<()> {
        if self.status != JobStatus::Pending {
            return Err(ModelError::InvalidTransition {
                job_id: self.id.to_string(),
                from: self.status.to_string(),
                to: JobStatus::Processing.to_string(),
            });
        }
        self.status = JobStatus::Processing;
        self.updated_at = now;
        Ok(())
    }

    /// Mark as published. Requires a post id.
    pub fn complete(&mut self, post_id: impl Into<String>, posted_at: DateTime<Utc>) -> ModelResult<()> {
        let post_id = post_id.into();
        if post_id.trim().is_empty() {
            return Err(ModelError::MissingPostRecord(self.id.to_string()));
        }
        self.tiktok_post_id = Some(post_id);
        self.posted_at = Some(posted_at);
        self.status = JobStatus::Done;
        self.progress = 100;
        self.progress_step = Some("Posted".into());
        self.error = None;
        self.updated_at = posted_at;
        Ok(())
    }

    /// Mark as failed with an error message.
    pub fn fail(&mut self, error: impl Into<String>, now: DateTime<Utc>) {
        self.status = JobStatus::Failed;
        self.error = Some(error.into());
        self.updated_at = now;
    }

    /// Return to the queue after a failed post attempt.
    pub fn requeue(&mut self, at: DateTime<Utc>, error: impl Into<String>, now: DateTime<Utc>) {
        self.status = JobStatus::Pending;
        self.scheduled_at = Some(at);
        self.error = Some(error.into());
        self.updated_at = now;
    }

    /// Manual retry: clears the retry budget and error and returns to pending.
    pub fn reset_for_retry(&mut self, now: DateTime<Utc>) {
        self.status = JobStatus::Pending;
        self.retry_count = 0;
        self.error = None;
        self.progress = 0;
        self.progress_step = Some("Queued for retry".into());
        self.updated_at = now;
    }
}
