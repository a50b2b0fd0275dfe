//! Object key layout.

use crate::error::{StorageError, StorageResult};

pub fn video_key(job_id: &str) -> String {
    format!("videos/{}.mp4", job_id)
}

pub fn thumbnail_key(job_id: &str) -> String {
    format!("thumbnails/{}.jpg", job_id)
}

pub fn content_type_for(key: &str) -> &'static str {
    match key.rsplit('.').next() {
        Some("mp4") => "video/mp4",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("m4a") => "audio/mp4",
        Some("mp3") => "audio/mpeg",
        _ => "application/octet-stream",
    }
}

/// Reject keys that could escape a prefix or a local root.
pub fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key.split('/').any(|part| part.is_empty() || part == "..")
    {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}

/// Join a base URL and key with exactly one slash.
pub fn join_url(base: &str, key: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), key.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys() {
        assert_eq!(video_key("j1"), "videos/j1.mp4");
        assert_eq!(thumbnail_key("j1"), "thumbnails/j1.jpg");
        assert_eq!(content_type_for("videos/j1.mp4"), "video/mp4");
        assert_eq!(content_type_for("x.bin"), "application/octet-stream");
    }

    #[test]
    fn test_validate_key() {
        assert!(validate_key("videos/a.mp4").is_ok());
        assert!(validate_key("../etc/passwd").is_err());
        assert!(validate_key("/abs").is_err());
        assert!(validate_key("a//b").is_err());
    }

    #[test]
    fn test_join_url() {
        assert_eq!(join_url("https://cdn.x/", "/videos/a.mp4"), "https://cdn.x/videos/a.mp4");
    }
}
