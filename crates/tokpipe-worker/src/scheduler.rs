//! Posting slot selection.
//!
//! `next_slot` is a pure function of the current schedule and the pipeline
//! config. Every slot it returns:
//! - falls inside a configured best hour (local day)
//! - is at least `min_post_interval_minutes` after the latest active slot
//! - lands on a day that still has room under the daily cap

use std::sync::Arc;

use chrono::{DateTime, Days, Duration, FixedOffset, NaiveDate, Offset, Timelike, Utc};
use rand::Rng;

use tokpipe_models::{Job, ModelResult, PipelineConfig};

/// How far ahead a full schedule is allowed to push a slot.
pub const MAX_LOOKAHEAD_DAYS: u32 = 30;

#[derive(Debug, Clone)]
pub struct PostingScheduler {
    config: Arc<PipelineConfig>,
    offset: FixedOffset,
}

impl PostingScheduler {
    pub fn new(config: Arc<PipelineConfig>) -> ModelResult<Self> {
        config.validate()?;
        let offset = FixedOffset::east_opt(config.utc_offset_minutes * 60).unwrap_or_else(|| Utc.fix());
        Ok(Self { config, offset })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn local_date(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.offset).date_naive()
    }

    fn at_local(&self, date: NaiveDate, hour: u32, minute: u32) -> DateTime<Utc> {
        let local = date
            .and_hms_opt(hour, minute, 0)
            .unwrap_or_else(|| date.and_time(chrono::NaiveTime::MIN));
        (local - Duration::seconds(self.offset.local_minus_utc() as i64)).and_utc()
    }

    fn first_hour(&self) -> u32 {
        self.config.best_hours.first().copied().unwrap_or(0)
    }

    /// First best hour strictly after the local hour of `at`.
    fn snap(&self, at: DateTime<Utc>) -> (NaiveDate, u32) {
        let local = at.with_timezone(&self.offset);
        let date = local.date_naive();
        match self.config.best_hours.iter().find(|h| **h > local.hour()) {
            Some(hour) => (date, *hour),
            None => (next_day(date), self.first_hour()),
        }
    }

    /// Next posting slot for `account_id`, or across all accounts when `None`.
    ///
    /// `jobs` is the persisted schedule; only active jobs with a slot count.
    pub fn next_slot<R: Rng + ?Sized>(
        &self,
        now: DateTime<Utc>,
        jobs: &[Job],
        account_id: Option<&str>,
        rng: &mut R,
    ) -> DateTime<Utc> {
        let slots: Vec<DateTime<Utc>> = jobs
            .iter()
            .filter(|j| j.status.is_active())
            .filter(|j| account_id.map_or(true, |a| j.tiktok_account_id.as_deref() == Some(a)))
            .filter_map(|j| j.scheduled_at)
            .collect();
        let count_on = |date: NaiveDate| {
            slots.iter().filter(|s| self.local_date(**s) == date).count() as u32
        };

        let interval = Duration::minutes(self.config.min_post_interval_minutes as i64);
        let earliest = slots
            .iter()
            .max()
            .map(|last| (*last + interval).max(now))
            .unwrap_or(now);

        let today = self.local_date(now);
        let (mut date, mut hour) = if count_on(today) >= self.config.max_posts_per_day {
            (next_day(today), self.first_hour())
        } else {
            self.snap(earliest)
        };

        for _ in 0..MAX_LOOKAHEAD_DAYS * 24 {
            if count_on(date) >= self.config.max_posts_per_day {
                date = next_day(date);
                hour = self.first_hour();
                continue;
            }
            if self.at_local(date, hour, 0) < earliest {
                (date, hour) = self.snap(earliest);
                continue;
            }
            break;
        }

        let minute = rng.random_range(0..60);
        self.at_local(date, hour, minute)
    }
}

fn next_day(date: NaiveDate) -> NaiveDate {
    date.checked_add_days(Days::new(1)).unwrap_or(date)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tokpipe_models::{JobStatus, ProductId};

    fn at(day: u32, h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, day, h, m, 0).unwrap()
    }

    fn scheduler(config: PipelineConfig) -> PostingScheduler {
        PostingScheduler::new(Arc::new(config)).unwrap()
    }

    fn job_at(slot: DateTime<Utc>, account: &str) -> Job {
        let mut job = Job::new(ProductId::from("p"), "Lamp", slot);
        job.video_url = Some("https://cdn/v.mp4".into());
        job.schedule(slot, account, slot).unwrap();
        job
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[test]
    fn test_empty_schedule_snaps_to_next_best_hour() {
        let s = scheduler(PipelineConfig::default());
        let slot = s.next_slot(at(10, 10, 15), &[], Some("acc"), &mut rng());
        assert_eq!(slot.date_naive(), at(10, 0, 0).date_naive());
        assert_eq!(slot.hour(), 12);
    }

    #[test]
    fn test_hour_is_strictly_after_candidate_hour() {
        let s = scheduler(PipelineConfig::default());
        let slot = s.next_slot(at(10, 9, 0), &[], Some("acc"), &mut rng());
        assert_eq!(slot.hour(), 12);
    }

    #[test]
    fn test_min_interval_from_latest_slot() {
        let s = scheduler(PipelineConfig::default());
        let jobs = vec![job_at(at(10, 12, 20), "acc")];
        let slot = s.next_slot(at(10, 8, 0), &jobs, Some("acc"), &mut rng());
        assert_eq!(slot.hour(), 17);
        assert!(slot - at(10, 12, 20) >= Duration::minutes(120));
    }

    #[test]
    fn test_wraps_to_tomorrow_after_last_best_hour() {
        let s = scheduler(PipelineConfig::default());
        let slot = s.next_slot(at(10, 21, 30), &[], Some("acc"), &mut rng());
        assert_eq!(slot.date_naive(), at(11, 0, 0).date_naive());
        assert_eq!(slot.hour(), 9);
    }

    #[test]
    fn test_full_day_returns_tomorrow_first_best_hour() {
        let s = scheduler(PipelineConfig::default());
        let jobs = vec![
            job_at(at(10, 9, 5), "acc"),
            job_at(at(10, 12, 40), "acc"),
            job_at(at(10, 17, 10), "acc"),
        ];
        let slot = s.next_slot(at(10, 8, 0), &jobs, Some("acc"), &mut rng());
        assert_eq!(slot.date_naive(), at(11, 0, 0).date_naive());
        assert_eq!(slot.hour(), 9);
    }

    #[test]
    fn test_rolls_past_full_target_day() {
        let s = scheduler(PipelineConfig::default());
        let jobs = vec![
            job_at(at(10, 9, 10), "acc"),
            job_at(at(11, 9, 10), "acc"),
            job_at(at(11, 12, 10), "acc"),
            job_at(at(11, 17, 10), "acc"),
        ];
        let slot = s.next_slot(at(10, 10, 0), &jobs, Some("acc"), &mut rng());
        assert_eq!(slot.date_naive(), at(12, 0, 0).date_naive());
        assert_eq!(slot.hour(), 9);
    }

    #[test]
    fn test_other_accounts_and_finished_jobs_ignored() {
        let s = scheduler(PipelineConfig::default());
        let mut done = job_at(at(10, 12, 0), "acc");
        done.status = JobStatus::Done;
        let jobs = vec![
            job_at(at(10, 9, 5), "other"),
            job_at(at(10, 12, 5), "other"),
            job_at(at(10, 17, 5), "other"),
            done,
        ];
        let slot = s.next_slot(at(10, 8, 0), &jobs, Some("acc"), &mut rng());
        assert_eq!(slot.date_naive(), at(10, 0, 0).date_naive());
        assert_eq!(slot.hour(), 9);

        let global = s.next_slot(at(10, 8, 0), &jobs, None, &mut rng());
        assert_eq!(global.date_naive(), at(11, 0, 0).date_naive());
    }

    #[test]
    fn test_local_day_offset() {
        let mut config = PipelineConfig::default();
        config.utc_offset_minutes = 120;
        let s = scheduler(config);
        // 08:30 local
        let slot = s.next_slot(at(10, 6, 30), &[], None, &mut rng());
        assert_eq!(slot.hour(), 7);
    }

    #[test]
    fn test_generated_schedule_respects_all_constraints() {
        let config = PipelineConfig::default();
        let s = scheduler(config.clone());
        let now = at(10, 7, 0);
        let mut jobs = Vec::new();
        let mut r = rng();

        for _ in 0..20 {
            let slot = s.next_slot(now, &jobs, Some("acc"), &mut r);
            jobs.push(job_at(slot, "acc"));
        }

        let mut slots: Vec<_> = jobs.iter().filter_map(|j| j.scheduled_at).collect();
        slots.sort();
        for slot in &slots {
            assert!(config.best_hours.contains(&slot.hour()));
            let same_day = slots.iter().filter(|s| s.date_naive() == slot.date_naive()).count();
            assert!(same_day as u32 <= config.max_posts_per_day);
        }
        for pair in slots.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::minutes(config.min_post_interval_minutes as i64));
        }
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = PipelineConfig::default().with_max_posts_per_day(0);
        assert!(PostingScheduler::new(Arc::new(config)).is_err());
    }
}
