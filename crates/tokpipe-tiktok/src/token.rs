//! Access token lifecycle.
//!
//! Tokens expiring within five minutes are refreshed with the stored refresh
//! token and written back to the account record. Refreshes are serialized per
//! account so concurrent callers trigger a single refresh.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use tokpipe_models::{Account, AccountId, Clock};
use tokpipe_store::AccountStore;

use crate::client::TikTokApi;
use crate::error::{TikTokError, TikTokResult};
use crate::metrics::record_token_refresh;

pub struct TokenManager {
    api: Arc<dyn TikTokApi>,
    accounts: Arc<dyn AccountStore>,
    clock: Arc<dyn Clock>,
    locks: Mutex<HashMap<AccountId, Arc<Mutex<()>>>>,
}

impl TokenManager {
    pub fn new(
        api: Arc<dyn TikTokApi>,
        accounts: Arc<dyn AccountStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            api,
            accounts,
            clock,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// A token that stays valid for at least the refresh buffer.
    pub async fn get_valid_access_token(&self, account_id: &AccountId) -> TikTokResult<String> {
        let account = self.load(account_id).await?;
        if !account.needs_refresh(self.clock.now()) {
            return Ok(account.access_token);
        }

        let lock = self.lock_for(account_id).await;
        let _guard = lock.lock().await;

        // Another caller may have refreshed while we waited.
        let account = self.load(account_id).await?;
        if !account.needs_refresh(self.clock.now()) {
            debug!(account_id = %account_id, "Token refreshed by a concurrent caller");
            return Ok(account.access_token);
        }

        self.refresh(&account).await
    }

    async fn refresh(&self, account: &Account) -> TikTokResult<String> {
        if account.refresh_token.is_empty() {
            record_token_refresh(false);
            return Err(TikTokError::auth(format!(
                "account {} has no refresh token",
                account.id
            )));
        }

        let grant = match self.api.refresh_access_token(&account.refresh_token).await {
            Ok(grant) => grant,
            Err(e) => {
                record_token_refresh(false);
                warn!(account_id = %account.id, "Token refresh failed: {}", e);
                return Err(match e {
                    TikTokError::Auth(msg) => TikTokError::Auth(msg),
                    other => TikTokError::auth(format!("token refresh failed: {}", other)),
                });
            }
        };

        let now = self.clock.now();
        let expires_at = now + Duration::seconds(grant.expires_in);
        let access_token = grant.access_token.clone();
        let refresh_token = grant.refresh_token.clone().filter(|t| !t.is_empty());

        self.accounts
            .update_account(&account.id, &move |a: &mut Account| {
                a.set_tokens(access_token.clone(), refresh_token.clone(), expires_at, now);
                true
            })
            .await?;

        record_token_refresh(true);
        info!(
            account_id = %account.id,
            expires_at = %expires_at,
            "Refreshed TikTok access token"
        );
        Ok(grant.access_token)
    }

    async fn load(&self, account_id: &AccountId) -> TikTokResult<Account> {
        let account = self.accounts.require_account(account_id).await?;
        if !account.is_active {
            return Err(TikTokError::auth(format!("account {} is inactive", account_id)));
        }
        Ok(account)
    }

    async fn lock_for(&self, account_id: &AccountId) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .await
            .entry(account_id.clone())
            .or_default()
            .clone()
    }
}
