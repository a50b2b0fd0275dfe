//! End-to-end post of one rendered video.
//!
//! INIT -> UPLOADING -> PROCESSING_* -> PUBLISH_COMPLETE | FAILED
//!
//! The daily slot is reserved before anything is sent to the platform and
//! given back if the attempt does not end in a published post. The caller
//! owns the job record: any error returned here must be applied to it.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use tokpipe_models::{AccountId, Clock, JobId};

use crate::client::TikTokApi;
use crate::config::TikTokConfig;
use crate::error::{TikTokError, TikTokResult};
use crate::metrics::record_post;
use crate::quota::QuotaTracker;
use crate::token::TokenManager;
use crate::types::{PostInfo, PublishState};

/// Platform limit on caption length, in characters.
pub const MAX_CAPTION_CHARS: usize = 2200;

#[derive(Debug, Clone)]
pub struct PublishSettings {
    pub privacy_level: String,
    pub poll_interval: Duration,
    pub max_polls: u32,
}

impl Default for PublishSettings {
    fn default() -> Self {
        Self {
            privacy_level: "SELF_ONLY".to_string(),
            poll_interval: Duration::from_secs(5),
            max_polls: 60,
        }
    }
}

impl From<&TikTokConfig> for PublishSettings {
    fn from(config: &TikTokConfig) -> Self {
        Self {
            privacy_level: config.privacy_level.clone(),
            poll_interval: config.publish_poll_interval,
            max_polls: config.publish_max_polls,
        }
    }
}

/// A finished post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishOutcome {
    pub publish_id: String,
    /// Public post id, or the publish id for inbox deliveries
    pub post_id: String,
    pub state: PublishState,
}

pub struct Publisher {
    api: Arc<dyn TikTokApi>,
    tokens: Arc<TokenManager>,
    quota: Arc<QuotaTracker>,
    clock: Arc<dyn Clock>,
    settings: PublishSettings,
}

impl Publisher {
    pub fn new(
        api: Arc<dyn TikTokApi>,
        tokens: Arc<TokenManager>,
        quota: Arc<QuotaTracker>,
        clock: Arc<dyn Clock>,
        settings: PublishSettings,
    ) -> Self {
        Self {
            api,
            tokens,
            quota,
            clock,
            settings,
        }
    }

    pub fn quota(&self) -> &QuotaTracker {
        &self.quota
    }

    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    /// Post `video_url` to the account's feed.
    ///
    /// `file://` URLs are pushed with a chunked upload; anything else is
    /// pulled by the platform.
    pub async fn post_video(
        &self,
        account_id: &AccountId,
        job_id: &JobId,
        video_url: &str,
        caption: &str,
    ) -> TikTokResult<PublishOutcome> {
        let limit = self.quota.check_daily_limit(account_id).await?;
        if !limit.allowed {
            record_post("rejected");
            return Err(TikTokError::DailyLimitReached {
                account_id: account_id.to_string(),
                limit: self.quota.max_posts_per_day(),
            });
        }

        let reservation = self.quota.reserve_post(account_id).await?;

        match self.publish(account_id, job_id, video_url, caption).await {
            Ok(outcome) => {
                // The video is live; a lost lastPostAt write must not turn it
                // into a failed attempt that gets posted again.
                if let Err(e) = self.quota.record_post(account_id).await {
                    warn!(
                        job_id = %job_id,
                        account_id = %account_id,
                        "Failed to stamp last post time: {}",
                        e
                    );
                }
                record_post("published");
                info!(
                    job_id = %job_id,
                    account_id = %account_id,
                    publish_id = %outcome.publish_id,
                    post_id = %outcome.post_id,
                    state = %outcome.state,
                    "Video published"
                );
                Ok(outcome)
            }
            Err(e) => {
                record_post("failed");
                if let Err(release_err) = self.quota.release_post(account_id, &reservation).await {
                    warn!(
                        account_id = %account_id,
                        "Failed to release daily post slot: {}",
                        release_err
                    );
                }
                warn!(job_id = %job_id, account_id = %account_id, "Publish failed: {}", e);
                Err(e)
            }
        }
    }

    async fn publish(
        &self,
        account_id: &AccountId,
        job_id: &JobId,
        video_url: &str,
        caption: &str,
    ) -> TikTokResult<PublishOutcome> {
        let token = self.tokens.get_valid_access_token(account_id).await?;
        let post = PostInfo::new(truncate_caption(caption), &self.settings.privacy_level);

        debug!(job_id = %job_id, state = %PublishState::Init, "Initializing upload");
        let publish_id = match local_path(video_url) {
            Some(path) => self.api.upload_file(&token, &post, &path).await?,
            None => self.api.init_pull_upload(&token, &post, video_url).await?,
        };
        debug!(job_id = %job_id, publish_id = %publish_id, state = %PublishState::Uploading, "Upload accepted");

        self.wait_for_publish(&token, job_id, publish_id).await
    }

    async fn wait_for_publish(
        &self,
        token: &str,
        job_id: &JobId,
        publish_id: String,
    ) -> TikTokResult<PublishOutcome> {
        for attempt in 1..=self.settings.max_polls {
            self.clock.sleep(self.settings.poll_interval).await;

            let status = self.api.fetch_publish_status(token, &publish_id).await?;
            match status.state {
                state if state.is_complete() => {
                    let post_id = status.post_id().unwrap_or_else(|| publish_id.clone());
                    return Ok(PublishOutcome {
                        publish_id,
                        post_id,
                        state,
                    });
                }
                PublishState::Failed => {
                    return Err(TikTokError::publish_failed(
                        status
                            .fail_reason
                            .filter(|r| !r.is_empty())
                            .unwrap_or_else(|| "platform reported FAILED".to_string()),
                    ));
                }
                state => {
                    debug!(
                        job_id = %job_id,
                        publish_id = %publish_id,
                        attempt = attempt,
                        state = %state,
                        "Publish still processing"
                    );
                }
            }
        }

        Err(TikTokError::Timeout {
            attempts: self.settings.max_polls,
        })
    }
}

fn local_path(video_url: &str) -> Option<PathBuf> {
    if !video_url.starts_with("file://") {
        return None;
    }
    url::Url::parse(video_url).ok()?.to_file_path().ok()
}

fn truncate_caption(caption: &str) -> String {
    match caption.char_indices().nth(MAX_CAPTION_CHARS) {
        Some((idx, _)) => caption[..idx].to_string(),
        None => caption.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PublishStatus, TokenGrant};
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};
    use std::collections::VecDeque;
    use std::path::Path;
    use std::sync::Mutex;
    use tokpipe_models::{Account, ManualClock};
    use tokpipe_store::{AccountMutation, AccountStore, MemoryStore, StoreError, StoreResult};

    #[derive(Default)]
    struct ScriptedApi {
        statuses: Mutex<VecDeque<TikTokResult<PublishStatus>>>,
        inits: Mutex<Vec<String>>,
        uploads: Mutex<Vec<PathBuf>>,
        init_error: Mutex<Option<TikTokError>>,
    }

    impl ScriptedApi {
        fn with_states(states: &[PublishState]) -> Self {
            let api = Self::default();
            *api.statuses.lock().unwrap() =
                states.iter().map(|s| Ok(PublishStatus::new(*s))).collect();
            api
        }
    }

    #[async_trait]
    impl TikTokApi for ScriptedApi {
        async fn refresh_access_token(&self, _: &str) -> TikTokResult<TokenGrant> {
            unreachable!("token is fresh")
        }

        async fn init_pull_upload(
            &self,
            _: &str,
            post: &PostInfo,
            video_url: &str,
        ) -> TikTokResult<String> {
            if let Some(e) = self.init_error.lock().unwrap().take() {
                return Err(e);
            }
            assert_eq!(post.privacy_level, "SELF_ONLY");
            self.inits.lock().unwrap().push(video_url.to_string());
            Ok("pub-1".into())
        }

        async fn upload_file(&self, _: &str, _: &PostInfo, path: &Path) -> TikTokResult<String> {
            self.uploads.lock().unwrap().push(path.to_path_buf());
            Ok("pub-file".into())
        }

        async fn fetch_publish_status(&self, token: &str, _: &str) -> TikTokResult<PublishStatus> {
            assert_eq!(token, "tok");
            self.statuses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(PublishStatus::new(PublishState::ProcessingUpload)))
        }
    }

    struct Fixture {
        publisher: Publisher,
        api: Arc<ScriptedApi>,
        clock: Arc<ManualClock>,
        store: Arc<MemoryStore>,
    }

    /// Accounts backed by memory, failing any update that stamps `last_post_at`.
    struct StampFailingAccounts {
        inner: Arc<MemoryStore>,
    }

    #[async_trait]
    impl AccountStore for StampFailingAccounts {
        async fn save_account(&self, account: &Account) -> StoreResult<()> {
            self.inner.save_account(account).await
        }

        async fn get_account(&self, id: &AccountId) -> StoreResult<Option<Account>> {
            self.inner.get_account(id).await
        }

        async fn list_accounts(&self) -> StoreResult<Vec<Account>> {
            self.inner.list_accounts().await
        }

        async fn update_account(
            &self,
            id: &AccountId,
            mutation: AccountMutation<'_>,
        ) -> StoreResult<Option<Account>> {
            if let Some(mut preview) = self.inner.get_account(id).await? {
                let before = preview.last_post_at;
                mutation(&mut preview);
                if preview.last_post_at != before {
                    return Err(StoreError::Conflict("transient".into()));
                }
            }
            self.inner.update_account(id, mutation).await
        }
    }

    async fn fixture(api: ScriptedApi, max_polls: u32) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        fixture_with(api, max_polls, store.clone(), store).await
    }

    async fn fixture_with(
        api: ScriptedApi,
        max_polls: u32,
        store: Arc<MemoryStore>,
        accounts: Arc<dyn AccountStore>,
    ) -> Fixture {
        let now = Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(now));
        store
            .save_account(&Account::new("acc-1", "tok", "ref", now + ChronoDuration::days(1), now))
            .await
            .unwrap();

        let api = Arc::new(api);
        let tokens = Arc::new(TokenManager::new(api.clone(), accounts.clone(), clock.clone()));
        let quota = Arc::new(QuotaTracker::new(accounts, clock.clone(), 3));
        let settings = PublishSettings {
            max_polls,
            ..PublishSettings::default()
        };
        Fixture {
            publisher: Publisher::new(api.clone(), tokens, quota, clock.clone(), settings),
            api,
            clock,
            store,
        }
    }

    async fn account(store: &MemoryStore) -> Account {
        store.require_account(&"acc-1".into()).await.unwrap()
    }

    #[tokio::test]
    async fn test_publish_polls_until_complete() {
        let mut done = PublishStatus::new(PublishState::PublishComplete);
        done.post_ids = vec![serde_json::json!("7300")];
        let api = ScriptedApi::default();
        *api.statuses.lock().unwrap() = VecDeque::from(vec![
            Ok(PublishStatus::new(PublishState::ProcessingUpload)),
            Ok(PublishStatus::new(PublishState::ProcessingDownload)),
            Ok(done),
        ]);
        let f = fixture(api, 60).await;

        let outcome = f
            .publisher
            .post_video(&"acc-1".into(), &JobId::from_string("job-1"), "https://cdn/v.mp4", "Great lamp")
            .await
            .unwrap();

        assert_eq!(outcome.post_id, "7300");
        assert_eq!(outcome.state, PublishState::PublishComplete);
        assert_eq!(f.clock.sleeps(), vec![Duration::from_secs(5); 3]);
        assert_eq!(f.api.inits.lock().unwrap().as_slice(), ["https://cdn/v.mp4"]);

        let acc = account(&f.store).await;
        assert_eq!(acc.daily_post_count, 1);
        assert_eq!(acc.last_post_at, Some(f.clock.now()));
    }

    #[tokio::test]
    async fn test_inbox_delivery_counts_as_complete() {
        let f = fixture(ScriptedApi::with_states(&[PublishState::SendToUserInbox]), 60).await;
        let outcome = f
            .publisher
            .post_video(&"acc-1".into(), &JobId::from_string("job-1"), "https://cdn/v.mp4", "c")
            .await
            .unwrap();
        assert_eq!(outcome.post_id, "pub-1");
        assert_eq!(account(&f.store).await.daily_post_count, 1);
    }

    #[tokio::test]
    async fn test_published_video_survives_failed_last_post_stamp() {
        let store = Arc::new(MemoryStore::new());
        let accounts = Arc::new(StampFailingAccounts {
            inner: store.clone(),
        });
        let f = fixture_with(
            ScriptedApi::with_states(&[PublishState::PublishComplete]),
            60,
            store,
            accounts,
        )
        .await;

        let outcome = f
            .publisher
            .post_video(&"acc-1".into(), &JobId::from_string("job-1"), "https://cdn/v.mp4", "c")
            .await
            .unwrap();
        assert_eq!(outcome.state, PublishState::PublishComplete);
        assert_eq!(f.api.inits.lock().unwrap().len(), 1);

        let acc = account(&f.store).await;
        assert_eq!(acc.daily_post_count, 1, "published post keeps its slot");
        assert!(acc.last_post_at.is_none());
    }

    #[tokio::test]
    async fn test_platform_failure_releases_slot() {
        let mut failed = PublishStatus::new(PublishState::Failed);
        failed.fail_reason = Some("video_pull_failed".into());
        let api = ScriptedApi::default();
        *api.statuses.lock().unwrap() = VecDeque::from(vec![Ok(failed)]);
        let f = fixture(api, 60).await;

        let err = f
            .publisher
            .post_video(&"acc-1".into(), &JobId::from_string("job-1"), "https://cdn/v.mp4", "c")
            .await
            .unwrap_err();
        assert!(matches!(err, TikTokError::PublishFailed(ref r) if r == "video_pull_failed"));

        let acc = account(&f.store).await;
        assert_eq!(acc.daily_post_count, 0);
        assert!(acc.last_post_at.is_none());
    }

    #[tokio::test]
    async fn test_polling_is_bounded() {
        let f = fixture(ScriptedApi::default(), 4).await;
        let err = f
            .publisher
            .post_video(&"acc-1".into(), &JobId::from_string("job-1"), "https://cdn/v.mp4", "c")
            .await
            .unwrap_err();
        assert!(matches!(err, TikTokError::Timeout { attempts: 4 }));
        assert_eq!(f.clock.sleeps().len(), 4);
        assert_eq!(account(&f.store).await.daily_post_count, 0);
    }

    #[tokio::test]
    async fn test_exhausted_quota_rejected_before_upload() {
        let f = fixture(ScriptedApi::default(), 60).await;
        let now = f.clock.now();
        f.store
            .update_account(&"acc-1".into(), &move |a: &mut Account| {
                a.daily_post_count = 3;
                a.updated_at = now;
                true
            })
            .await
            .unwrap();

        let err = f
            .publisher
            .post_video(&"acc-1".into(), &JobId::from_string("job-1"), "https://cdn/v.mp4", "c")
            .await
            .unwrap_err();
        assert!(matches!(err, TikTokError::DailyLimitReached { limit: 3, .. }));
        assert!(f.api.inits.lock().unwrap().is_empty());
        assert_eq!(account(&f.store).await.daily_post_count, 3);
    }

    #[tokio::test]
    async fn test_init_error_releases_slot() {
        let api = ScriptedApi::default();
        *api.init_error.lock().unwrap() = Some(TikTokError::from_http_status(503, "down", None));
        let f = fixture(api, 60).await;

        let err = f
            .publisher
            .post_video(&"acc-1".into(), &JobId::from_string("job-1"), "https://cdn/v.mp4", "c")
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(account(&f.store).await.daily_post_count, 0);
    }

    #[tokio::test]
    async fn test_file_url_uses_chunked_upload() {
        let f = fixture(ScriptedApi::with_states(&[PublishState::PublishComplete]), 60).await;
        f.publisher
            .post_video(&"acc-1".into(), &JobId::from_string("job-1"), "file:///tmp/out/v.mp4", "c")
            .await
            .unwrap();
        assert_eq!(
            f.api.uploads.lock().unwrap().as_slice(),
            [PathBuf::from("/tmp/out/v.mp4")]
        );
        assert!(f.api.inits.lock().unwrap().is_empty());
    }

    #[test]
    fn test_truncate_caption() {
        let long = "é".repeat(MAX_CAPTION_CHARS + 10);
        assert_eq!(truncate_caption(&long).chars().count(), MAX_CAPTION_CHARS);
        assert_eq!(truncate_caption("short"), "short");
    }
}
