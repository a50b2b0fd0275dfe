//! Wire types for the TikTok OAuth and Content Posting APIs.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Token pair returned by the OAuth endpoint.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Seconds until the access token expires
    pub expires_in: i64,
    #[serde(default)]
    pub refresh_expires_in: Option<i64>,
    #[serde(default)]
    pub open_id: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// OAuth responses are flat and report failures inline.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct OAuthResponse {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_in: Option<i64>,
    pub refresh_expires_in: Option<i64>,
    pub open_id: Option<String>,
    pub scope: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl OAuthResponse {
    /// The grant, or the platform's error description.
    pub fn into_grant(self) -> Result<TokenGrant, String> {
        if let Some(error) = self.error.filter(|e| !e.is_empty()) {
            return Err(match self.error_description {
                Some(desc) if !desc.is_empty() => format!("{}: {}", error, desc),
                _ => error,
            });
        }
        match (self.access_token, self.expires_in) {
            (Some(access_token), Some(expires_in)) if !access_token.is_empty() => Ok(TokenGrant {
                access_token,
                refresh_token: self.refresh_token,
                expires_in,
                refresh_expires_in: self.refresh_expires_in,
                open_id: self.open_id,
                scope: self.scope,
            }),
            _ => Err("token response missing access_token".to_string()),
        }
    }
}

/// Content Posting API envelope.
#[derive(Debug, Deserialize)]
pub(crate) struct ApiEnvelope<T> {
    pub data: Option<T>,
    pub error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorBody {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub log_id: Option<String>,
}

impl ApiErrorBody {
    pub fn is_ok(&self) -> bool {
        self.code.is_empty() || self.code == "ok"
    }
}

/// Post settings sent with every upload init.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostInfo {
    pub title: String,
    pub privacy_level: String,
    pub disable_comment: bool,
    pub disable_duet: bool,
    pub disable_stitch: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_cover_timestamp_ms: Option<u64>,
}

impl PostInfo {
    pub fn new(title: impl Into<String>, privacy_level: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            privacy_level: privacy_level.into(),
            disable_comment: false,
            disable_duet: false,
            disable_stitch: false,
            video_cover_timestamp_ms: Some(1000),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "source", rename_all = "SCREAMING_SNAKE_CASE")]
pub(crate) enum SourceInfo {
    PullFromUrl {
        video_url: String,
    },
    FileUpload {
        video_size: u64,
        chunk_size: u64,
        total_chunk_count: u64,
    },
}

#[derive(Debug, Serialize)]
pub(crate) struct InitRequest<'a> {
    pub post_info: &'a PostInfo,
    pub source_info: SourceInfo,
}

#[derive(Debug, Deserialize)]
pub(crate) struct InitData {
    pub publish_id: String,
    #[serde(default)]
    pub upload_url: Option<String>,
}

/// Lifecycle of one post attempt.
///
/// `Init` and `Uploading` are tracked locally; the rest are reported by the
/// status endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PublishState {
    Init,
    Uploading,
    ProcessingUpload,
    ProcessingDownload,
    /// Delivered to the creator's inbox as a draft
    SendToUserInbox,
    PublishComplete,
    Failed,
    #[serde(other)]
    Unknown,
}

impl PublishState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublishState::Init => "INIT",
            PublishState::Uploading => "UPLOADING",
            PublishState::ProcessingUpload => "PROCESSING_UPLOAD",
            PublishState::ProcessingDownload => "PROCESSING_DOWNLOAD",
            PublishState::SendToUserInbox => "SEND_TO_USER_INBOX",
            PublishState::PublishComplete => "PUBLISH_COMPLETE",
            PublishState::Failed => "FAILED",
            PublishState::Unknown => "UNKNOWN",
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, PublishState::PublishComplete | PublishState::SendToUserInbox)
    }

    pub fn is_terminal(&self) -> bool {
        self.is_complete() || *self == PublishState::Failed
    }
}

impl fmt::Display for PublishState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one status fetch.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PublishStatus {
    #[serde(rename = "status")]
    pub state: PublishState,
    #[serde(default)]
    pub fail_reason: Option<String>,
    /// The platform spells this field `publicaly_available_post_id`
    #[serde(
        default,
        rename = "publicaly_available_post_id",
        alias = "publicly_available_post_id"
    )]
    pub post_ids: Vec<serde_json::Value>,
    #[serde(default)]
    pub uploaded_bytes: Option<u64>,
}

impl PublishStatus {
    pub fn new(state: PublishState) -> Self {
        Self {
            state,
            fail_reason: None,
            post_ids: Vec::new(),
            uploaded_bytes: None,
        }
    }

    /// First public post id, rendered as a string.
    pub fn post_id(&self) -> Option<String> {
        self.post_ids.first().map(|v| match v {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }
}

/// Inclusive byte range of one upload chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRange {
    pub start: u64,
    pub end: u64,
}

impl ChunkRange {
    pub fn size(&self) -> u64 {
        self.end - self.start + 1
    }

    pub fn content_range(&self, total: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, total)
    }
}

/// Split `total` bytes into upload chunks.
///
/// A file no larger than one chunk is a single chunk; otherwise there are
/// `total / chunk_size` chunks and the last one absorbs the remainder.
pub fn chunk_ranges(total: u64, chunk_size: u64) -> Vec<ChunkRange> {
    if total == 0 {
        return Vec::new();
    }
    let chunk_size = chunk_size.max(1);
    if total <= chunk_size {
        return vec![ChunkRange {
            start: 0,
            end: total - 1,
        }];
    }

    let count = total / chunk_size;
    (0..count)
        .map(|i| ChunkRange {
            start: i * chunk_size,
            end: if i + 1 == count {
                total - 1
            } else {
                (i + 1) * chunk_size - 1
            },
        })
        .collect()
}
