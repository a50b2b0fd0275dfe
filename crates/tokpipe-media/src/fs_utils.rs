//! Filesystem helpers for render artifacts.
//!
//! Scratch directories and the output directory may sit on different
//! mounts, so moves fall back to copy-and-delete on EXDEV.

use std::path::{Path, PathBuf};
use tokio::fs;

use crate::error::{MediaError, MediaResult};

/// Move a file from `src` to `dst`, creating the parent of `dst`.
pub async fn move_file(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> MediaResult<()> {
    let src = src.as_ref();
    let dst = dst.as_ref();

    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).await?;
    }

    match fs::rename(src, dst).await {
        Ok(()) => Ok(()),
        Err(e) if is_cross_device_error(&e) => {
            tracing::debug!(
                src = %src.display(),
                dst = %dst.display(),
                "Cross-device rename, copying instead"
            );
            copy_and_delete(src, dst).await
        }
        Err(e) => Err(MediaError::from(e)),
    }
}

/// Path next to `path` for an intermediate result, e.g. `video.watermark.mp4`.
pub fn sibling_temp_path(path: &Path, tag: &str) -> PathBuf {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_string())
        .unwrap_or_else(|| "tmp".to_string());
    path.with_extension(format!("{}.{}", tag, ext))
}

/// Replace `target` with `replacement`; on failure the replacement is removed.
pub async fn replace_file(replacement: &Path, target: &Path) -> MediaResult<()> {
    if let Err(e) = fs::rename(replacement, target).await {
        let _ = fs::remove_file(replacement).await;
        return Err(MediaError::from(e));
    }
    Ok(())
}

/// Delete a file, ignoring a missing one.
pub async fn remove_if_exists(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove file");
        }
    }
}

/// Check if an IO error is EXDEV (cross-device link).
fn is_cross_device_error(e: &std::io::Error) -> bool {
    e.raw_os_error() == Some(18)
}

async fn copy_and_delete(src: &Path, dst: &Path) -> MediaResult<()> {
    // Copy next to the destination so the final rename stays on one mount
    let tmp_dst = dst.with_extension("partial");

    fs::copy(src, &tmp_dst).await.map_err(|e| {
        tracing::error!(
            src = %src.display(),
            dst = %tmp_dst.display(),
            error = %e,
            "Copy failed during cross-device move"
        );
        MediaError::from(e)
    })?;

    replace_file(&tmp_dst, dst).await?;

    if let Err(e) = fs::remove_file(src).await {
        tracing::warn!(src = %src.display(), error = %e, "Failed to remove source after copy");
    }
    Ok(())
}
