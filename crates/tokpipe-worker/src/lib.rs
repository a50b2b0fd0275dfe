//! Content pipeline worker.
//!
//! This crate provides:
//! - The pipeline orchestrator (hooks, video, schedule, post)
//! - The posting scheduler
//! - Job-level post retry policy
//! - Best-effort webhook notifications
//! - The periodic sweep executor

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod metrics;
pub mod notify;
pub mod orchestrator;
pub mod progress;
pub mod retry;
pub mod scheduler;

pub use config::WorkerConfig;
pub use error::{PipelineError, WorkerResult};
pub use executor::{SweepExecutor, TickReport};
pub use logging::JobLogger;
pub use notify::{NotificationHub, Notifier, NotifierConfig, WebhookKind, WebhookNotifier};
pub use orchestrator::{Orchestrator, PipelineDeps};
pub use retry::{PostRetryPolicy, RetryDecision, MAX_POST_RETRIES};
pub use scheduler::PostingScheduler;
