//! Per-account daily post quota.
//!
//! The counter is only touched through `update_account`, so a reservation is
//! a single guarded increment and two sweeps can never both take the last
//! slot.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use tokpipe_models::{Account, AccountId, Clock};
use tokpipe_store::AccountStore;

use crate::error::{TikTokError, TikTokResult};

/// Snapshot of an account's quota.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyLimit {
    pub allowed: bool,
    pub remaining: u32,
    pub resets_at: DateTime<Utc>,
}

impl DailyLimit {
    fn of(account: &Account, cap: u32) -> Self {
        let remaining = account.remaining_posts(cap);
        Self {
            allowed: remaining > 0,
            remaining,
            resets_at: account.daily_post_reset_at,
        }
    }
}

pub struct QuotaTracker {
    accounts: Arc<dyn AccountStore>,
    clock: Arc<dyn Clock>,
    max_posts_per_day: u32,
}

impl QuotaTracker {
    pub fn new(accounts: Arc<dyn AccountStore>, clock: Arc<dyn Clock>, max_posts_per_day: u32) -> Self {
        Self {
            accounts,
            clock,
            max_posts_per_day,
        }
    }

    pub fn max_posts_per_day(&self) -> u32 {
        self.max_posts_per_day
    }

    /// Current quota, resetting the counter when the boundary has passed.
    pub async fn check_daily_limit(&self, account_id: &AccountId) -> TikTokResult<DailyLimit> {
        let now = self.clock.now();
        let account = match self
            .accounts
            .update_account(account_id, &move |a: &mut Account| a.roll_daily_window(now))
            .await?
        {
            Some(rolled) => {
                debug!(account_id = %account_id, resets_at = %rolled.daily_post_reset_at, "Daily post window reset");
                rolled
            }
            None => self.accounts.require_account(account_id).await?,
        };
        Ok(DailyLimit::of(&account, self.max_posts_per_day))
    }

    /// Take one slot of today's quota.
    pub async fn reserve_post(&self, account_id: &AccountId) -> TikTokResult<DailyLimit> {
        let now = self.clock.now();
        let cap = self.max_posts_per_day;
        match self
            .accounts
            .update_account(account_id, &move |a: &mut Account| a.reserve_post(cap, now))
            .await?
        {
            Some(account) => Ok(DailyLimit::of(&account, cap)),
            None => Err(TikTokError::DailyLimitReached {
                account_id: account_id.to_string(),
                limit: cap,
            }),
        }
    }

    /// Return a slot taken by an attempt that did not post.
    ///
    /// `reservation` is what `reserve_post` handed out; a slot from a day
    /// that has already closed is not returned to the new day.
    pub async fn release_post(
        &self,
        account_id: &AccountId,
        reservation: &DailyLimit,
    ) -> TikTokResult<()> {
        let now = self.clock.now();
        let window = reservation.resets_at;
        self.accounts
            .update_account(account_id, &move |a: &mut Account| a.release_post(window, now))
            .await?;
        Ok(())
    }

    pub async fn record_post(&self, account_id: &AccountId) -> TikTokResult<()> {
        let now = self.clock.now();
        self.accounts
            .update_account(account_id, &move |a: &mut Account| {
                a.record_post(now);
                true
            })
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use tokpipe_models::ManualClock;
    use tokpipe_store::MemoryStore;

    async fn setup() -> (QuotaTracker, Arc<ManualClock>, Arc<MemoryStore>) {
        let now = Utc.with_ymd_and_hms(2026, 3, 10, 22, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(now));
        let store = Arc::new(MemoryStore::new());
        store
            .save_account(&Account::new("acc-1", "a", "r", now + Duration::days(1), now))
            .await
            .unwrap();
        let tracker = QuotaTracker::new(store.clone(), clock.clone(), 3);
        (tracker, clock, store)
    }

    #[tokio::test]
    async fn test_reserve_until_cap() {
        let (tracker, _, _) = setup().await;
        let id: AccountId = "acc-1".into();

        for expected in [2, 1, 0] {
            assert_eq!(tracker.reserve_post(&id).await.unwrap().remaining, expected);
        }
        let err = tracker.reserve_post(&id).await.unwrap_err();
        assert!(matches!(err, TikTokError::DailyLimitReached { limit: 3, .. }));

        let limit = tracker.check_daily_limit(&id).await.unwrap();
        assert!(!limit.allowed);
        assert_eq!(limit.remaining, 0);
    }

    #[tokio::test]
    async fn test_reset_after_boundary_is_idempotent() {
        let (tracker, clock, store) = setup().await;
        let id: AccountId = "acc-1".into();
        for _ in 0..3 {
            tracker.reserve_post(&id).await.unwrap();
        }

        clock.advance(std::time::Duration::from_secs(3 * 3600));
        let first = tracker.check_daily_limit(&id).await.unwrap();
        assert!(first.allowed);
        assert_eq!(first.remaining, 3);
        assert_eq!(
            first.resets_at,
            Utc.with_ymd_and_hms(2026, 3, 12, 0, 0, 0).unwrap()
        );

        tracker.reserve_post(&id).await.unwrap();
        let second = tracker.check_daily_limit(&id).await.unwrap();
        assert_eq!(second.remaining, 2);
        assert_eq!(store.require_account(&id).await.unwrap().daily_post_count, 1);
    }

    #[tokio::test]
    async fn test_release_returns_slot() {
        let (tracker, _, _) = setup().await;
        let id: AccountId = "acc-1".into();
        let reservation = tracker.reserve_post(&id).await.unwrap();
        tracker.release_post(&id, &reservation).await.unwrap();
        assert_eq!(tracker.check_daily_limit(&id).await.unwrap().remaining, 3);
    }

    #[tokio::test]
    async fn test_release_across_midnight_does_not_free_new_day_slot() {
        let (tracker, clock, store) = setup().await;
        let id: AccountId = "acc-1".into();
        let stale = tracker.reserve_post(&id).await.unwrap();

        clock.advance(std::time::Duration::from_secs(2 * 3600 + 5 * 60));
        for _ in 0..3 {
            tracker.reserve_post(&id).await.unwrap();
        }

        tracker.release_post(&id, &stale).await.unwrap();
        assert_eq!(store.require_account(&id).await.unwrap().daily_post_count, 3);
        assert!(tracker.reserve_post(&id).await.is_err());
    }

    #[tokio::test]
    async fn test_concurrent_reservations_never_exceed_cap() {
        let (tracker, _, store) = setup().await;
        let tracker = Arc::new(tracker);

        let tasks: Vec<_> = (0..10)
            .map(|_| {
                let tracker = tracker.clone();
                tokio::spawn(async move { tracker.reserve_post(&"acc-1".into()).await.is_ok() })
            })
            .collect();
        let mut granted = 0;
        for task in tasks {
            if task.await.unwrap() {
                granted += 1;
            }
        }
        assert_eq!(granted, 3);
        assert_eq!(
            store.require_account(&"acc-1".into()).await.unwrap().daily_post_count,
            3
        );
    }

    #[tokio::test]
    async fn test_unknown_account_is_store_error() {
        let (tracker, _, _) = setup().await;
        let err = tracker.check_daily_limit(&"ghost".into()).await.unwrap_err();
        assert!(matches!(err, TikTokError::Store(_)));
    }
}
