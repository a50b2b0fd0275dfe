//! Posting accounts and their daily quota window.

use chrono::{DateTime, Days, Duration, NaiveTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Tokens expiring within this window are refreshed before use.
pub const TOKEN_REFRESH_BUFFER_SECS: i64 = 5 * 60;

/// Posting account identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct AccountId(pub String);

impl AccountId {
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AccountId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for AccountId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// First UTC midnight strictly after `now`.
pub fn next_utc_midnight(now: DateTime<Utc>) -> DateTime<Utc> {
    (now.date_naive() + Days::new(1))
        .and_time(NaiveTime::MIN)
        .and_utc()
}

/// A TikTok posting identity.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: AccountId,

    #[serde(default)]
    pub display_name: Option<String>,

    /// Platform user id
    #[serde(default)]
    pub open_id: Option<String>,

    pub access_token: String,

    pub refresh_token: String,

    pub token_expires_at: DateTime<Utc>,

    #[serde(default = "default_true")]
    pub is_active: bool,

    #[serde(default)]
    pub daily_post_count: u32,

    /// Boundary after which `daily_post_count` resets
    pub daily_post_reset_at: DateTime<Utc>,

    #[serde(default)]
    pub last_post_at: Option<DateTime<Utc>>,

    pub updated_at: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}

impl Account {
    pub fn new(
        id: impl Into<AccountId>,
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        token_expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: None,
            open_id: None,
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            token_expires_at,
            is_active: true,
            daily_post_count: 0,
            daily_post_reset_at: next_utc_midnight(now),
            last_post_at: None,
            updated_at: now,
        }
    }

    /// Whether the access token expires within the refresh buffer.
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        self.token_expires_at - now <= Duration::seconds(TOKEN_REFRESH_BUFFER_SECS)
    }

    /// Store a refreshed token pair.
    pub fn set_tokens(
        &mut self,
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) {
        self.access_token = access_token.into();
        if let Some(refresh) = refresh_token {
            self.refresh_token = refresh;
        }
        self.token_expires_at = expires_at;
        self.updated_at = now;
    }

    /// Reset the daily counter if the boundary has passed.
    ///
    /// Idempotent: the boundary moves to the next UTC midnight after `now`,
    /// so repeated calls within the same day leave the window untouched.
    pub fn roll_daily_window(&mut self, now: DateTime<Utc>) -> bool {
        if now < self.daily_post_reset_at {
            return false;
        }
        self.daily_post_count = 0;
        self.daily_post_reset_at = next_utc_midnight(now);
        self.updated_at = now;
        true
    }

    /// Posts left today given the cap. Does not roll the window.
    pub fn remaining_posts(&self, cap: u32) -> u32 {
        cap.saturating_sub(self.daily_post_count)
    }

    /// Reserve one post against the daily cap.
    ///
    /// Returns false and leaves the counter unchanged when the cap is reached.
    pub fn reserve_post(&mut self, cap: u32, now: DateTime<Utc>) -> bool {
        self.roll_daily_window(now);
        if self.daily_post_count >= cap {
            return false;
        }
        self.daily_post_count += 1;
        self.updated_at = now;
        true
    }

    /// Give back a reservation taken in the window ending at `window`.
    ///
    /// A reservation from a window that has since closed is dropped: the
    /// counter already belongs to a later day. Returns whether anything
    /// changed.
    pub fn release_post(&mut self, window: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        let rolled = self.roll_daily_window(now);
        if rolled || self.daily_post_reset_at != window {
            return rolled;
        }
        self.daily_post_count = self.daily_post_count.saturating_sub(1);
        self.updated_at = now;
        true
    }

    pub fn record_post(&mut self, now: DateTime<Utc>) {
        self.last_post_at = Some(now);
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, h, m, 0).unwrap()
    }

    fn account(now: DateTime<Utc>) -> Account {
        Account::new("acc-1", "tok", "ref", now + Duration::hours(1), now)
    }

    #[test]
    fn test_next_utc_midnight() {
        assert_eq!(
            next_utc_midnight(at(15, 30)),
            Utc.with_ymd_and_hms(2026, 3, 11, 0, 0, 0).unwrap()
        );
        assert_eq!(
            next_utc_midnight(at(0, 0)),
            Utc.with_ymd_and_hms(2026, 3, 11, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_needs_refresh_buffer() {
        let now = at(10, 0);
        let mut acc = account(now);
        acc.token_expires_at = now + Duration::minutes(4);
        assert!(acc.needs_refresh(now));
        acc.token_expires_at = now + Duration::minutes(6);
        assert!(!acc.needs_refresh(now));
    }

    #[test]
    fn test_roll_daily_window_idempotent() {
        let now = at(10, 0);
        let mut acc = account(now);
        acc.daily_post_count = 3;

        let next_day = Utc.with_ymd_and_hms(2026, 3, 11, 8, 0, 0).unwrap();
        assert!(acc.roll_daily_window(next_day));
        assert_eq!(acc.daily_post_count, 0);
        assert_eq!(
            acc.daily_post_reset_at,
            Utc.with_ymd_and_hms(2026, 3, 12, 0, 0, 0).unwrap()
        );

        acc.daily_post_count = 1;
        assert!(!acc.roll_daily_window(next_day + Duration::hours(2)));
        assert_eq!(acc.daily_post_count, 1);
    }

    #[test]
    fn test_roll_after_gap_lands_on_next_midnight() {
        let now = at(10, 0);
        let mut acc = account(now);
        let much_later = Utc.with_ymd_and_hms(2026, 3, 20, 13, 0, 0).unwrap();
        acc.roll_daily_window(much_later);
        assert_eq!(
            acc.daily_post_reset_at,
            Utc.with_ymd_and_hms(2026, 3, 21, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_reserve_respects_cap() {
        let now = at(10, 0);
        let mut acc = account(now);
        assert!(acc.reserve_post(2, now));
        assert!(acc.reserve_post(2, now));
        assert!(!acc.reserve_post(2, now));
        assert_eq!(acc.daily_post_count, 2);

        let window = acc.daily_post_reset_at;
        assert!(acc.release_post(window, now));
        assert_eq!(acc.remaining_posts(2), 1);
    }

    #[test]
    fn test_release_from_closed_window_keeps_new_day_count() {
        let evening = Utc.with_ymd_and_hms(2026, 3, 10, 23, 50, 0).unwrap();
        let mut acc = account(evening);
        assert!(acc.reserve_post(2, evening));
        let window = acc.daily_post_reset_at;

        // Another sweep rolls the window and reserves after midnight.
        let morning = Utc.with_ymd_and_hms(2026, 3, 11, 0, 5, 0).unwrap();
        assert!(acc.reserve_post(2, morning));
        assert_eq!(acc.daily_post_count, 1);

        assert!(!acc.release_post(window, morning + Duration::minutes(1)));
        assert_eq!(acc.daily_post_count, 1);
        assert!(acc.reserve_post(2, morning));
        assert!(!acc.reserve_post(2, morning));
    }

    #[test]
    fn test_release_after_unobserved_midnight_rolls_instead() {
        let evening = Utc.with_ymd_and_hms(2026, 3, 10, 23, 50, 0).unwrap();
        let mut acc = account(evening);
        assert!(acc.reserve_post(2, evening));
        let window = acc.daily_post_reset_at;

        let morning = Utc.with_ymd_and_hms(2026, 3, 11, 0, 5, 0).unwrap();
        assert!(acc.release_post(window, morning));
        assert_eq!(acc.daily_post_count, 0);
        assert_eq!(
            acc.daily_post_reset_at,
            Utc.with_ymd_and_hms(2026, 3, 12, 0, 0, 0).unwrap()
        );
    }
}
