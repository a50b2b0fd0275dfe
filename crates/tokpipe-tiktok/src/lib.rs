//! TikTok publish client.
//!
//! This crate provides:
//! - OAuth token exchange and refresh with per-account single-flight
//! - Daily post quota reserved atomically through the account store
//! - Content Posting API upload init (pull-from-URL and chunked file)
//! - Publish status polling on an injected clock
//! - Retry with exponential backoff honoring `Retry-After`

pub mod client;
pub mod config;
pub mod error;
pub mod metrics;
pub mod publisher;
pub mod quota;
pub mod retry;
pub mod token;
pub mod types;

pub use client::{TikTokApi, TikTokClient};
pub use config::TikTokConfig;
pub use error::{TikTokError, TikTokResult};
pub use publisher::{PublishOutcome, PublishSettings, Publisher};
pub use quota::{DailyLimit, QuotaTracker};
pub use retry::{with_retry, RetryConfig};
pub use token::TokenManager;
pub use types::{PostInfo, PublishState, PublishStatus, TokenGrant};
