//! Disk-backed artifact store for single-host setups.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::StorageResult;
use crate::keys::{join_url, validate_key};
use crate::ArtifactStore;

/// Copies artifacts under `root` and serves them from `base_url`.
#[derive(Debug, Clone)]
pub struct LocalArtifactStore {
    root: PathBuf,
    base_url: String,
}

impl LocalArtifactStore {
    pub fn new(root: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.into(),
        }
    }

    pub fn from_env() -> Self {
        let root = std::env::var("LOCAL_ARTIFACT_DIR").unwrap_or_else(|_| "/tmp/tokpipe/artifacts".to_string());
        let base_url = std::env::var("LOCAL_ARTIFACT_BASE_URL").unwrap_or_else(|_| format!("file://{}", root));
        Self::new(root, base_url)
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

#[async_trait]
impl ArtifactStore for LocalArtifactStore {
    async fn put(&self, path: &Path, key: &str) -> StorageResult<String> {
        validate_key(key)?;
        let dest = self.path_for(key);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(path, &dest).await?;
        debug!(key = key, dest = %dest.display(), "Stored artifact locally");
        Ok(join_url(&self.base_url, key))
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        validate_key(key)?;
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::video_key;
    use crate::StorageError;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_put_and_delete() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("render.mp4");
        tokio::fs::write(&src, b"video").await.unwrap();

        let store = LocalArtifactStore::new(dir.path().join("root"), "https://media.local/");
        let url = store.put(&src, &video_key("job-1")).await.unwrap();

        assert_eq!(url, "https://media.local/videos/job-1.mp4");
        assert!(store.path_for("videos/job-1.mp4").exists());

        store.delete("videos/job-1.mp4").await.unwrap();
        store.delete("videos/job-1.mp4").await.unwrap();
        assert!(!store.path_for("videos/job-1.mp4").exists());
    }

    #[tokio::test]
    async fn test_rejects_escaping_keys() {
        let dir = TempDir::new().unwrap();
        let store = LocalArtifactStore::new(dir.path(), "file:///x");
        let err = store.put(Path::new("/nonexistent"), "../x.mp4").await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidKey(_)));
    }
}
