//! Artifact storage for rendered videos and thumbnails.
//!
//! The platform's pull-from-URL upload needs a reachable URL, so every
//! backend returns one from `put`.

pub mod client;
pub mod error;
pub mod keys;
pub mod local;

use async_trait::async_trait;
use std::path::Path;

pub use client::{R2Client, R2Config};
pub use error::{StorageError, StorageResult};
pub use keys::{thumbnail_key, video_key};
pub use local::LocalArtifactStore;

/// Where finished artifacts are published.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Upload `path` under `key` and return a URL that serves it.
    async fn put(&self, path: &Path, key: &str) -> StorageResult<String>;

    async fn delete(&self, key: &str) -> StorageResult<()>;
}
