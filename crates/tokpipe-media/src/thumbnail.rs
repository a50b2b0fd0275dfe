//! Thumbnail generation.

use std::path::Path;
use std::time::Duration;

use tokpipe_models::encoding::{THUMBNAIL_SCALE_WIDTH, THUMBNAIL_TIMESTAMP};

use crate::command::{Encoder, FfmpegCommand};
use crate::error::MediaResult;

pub fn thumbnail_command(video: &Path, output: &Path) -> FfmpegCommand {
    FfmpegCommand::new("thumbnail", output)
        .seeked_input(THUMBNAIL_TIMESTAMP, video)
        .single_frame()
        .video_filter(format!("scale={}:-2", THUMBNAIL_SCALE_WIDTH))
        .output_args(["-q:v", "3"])
}

/// Extract a single reduced frame about one second in.
pub async fn generate_thumbnail(
    encoder: &dyn Encoder,
    video: &Path,
    output: &Path,
    timeout: Duration,
) -> MediaResult<()> {
    encoder.run(&thumbnail_command(video, output), timeout).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thumbnail_command() {
        let args = thumbnail_command(Path::new("v.mp4"), Path::new("t.jpg")).build_args();
        assert!(args.contains(&"00:00:01".to_string()));
        assert!(args.contains(&"scale=480:-2".to_string()));
        assert_eq!(args.last().unwrap(), "t.jpg");
    }
}
