//! Shared data models for the TokPipe content pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Jobs and their lifecycle status
//! - Posting accounts and their daily quota window
//! - Products that seed jobs
//! - Process-wide pipeline configuration
//! - Video composition requests (overlay, watermark, music, backend)
//! - Pipeline result DTOs returned to the admin surfaces
//! - An injectable clock for time-dependent logic

pub mod account;
pub mod clock;
pub mod composition;
pub mod config;
pub mod encoding;
pub mod error;
pub mod job;
pub mod pipeline;
pub mod product;

// Re-export common types
pub use account::{next_utc_midnight, Account, AccountId};
pub use clock::{Clock, ManualClock, SystemClock};
pub use composition::{
    ComposedVideo, MusicSpec, RenderBackend, SubtitleStyle, VideoCompositionRequest, VideoOptions,
    WatermarkKind, WatermarkPosition, WatermarkSpec,
};
pub use config::{PipelineConfig, VideoDefaults};
pub use encoding::EncodingConfig;
pub use error::{ModelError, ModelResult};
pub use job::{Job, JobId, JobStatus, MAX_HOOKS};
pub use pipeline::{
    BatchSummary, JobProgressView, PipelineOptions, PipelineResult, PipelineStage, SweepSummary,
};
pub use product::{Product, ProductId};
