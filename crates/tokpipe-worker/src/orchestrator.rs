//! Pipeline orchestrator.
//!
//! Drives a job through `created -> hooks -> video -> scheduled` and runs the
//! posting sweep that takes scheduled jobs to `posted`. Every record change
//! goes through the store's atomic `update_job`.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::{debug, error, info, warn};

use tokpipe_ai::HookGenerator;
use tokpipe_media::fs_utils::remove_if_exists;
use tokpipe_media::VideoRenderer;
use tokpipe_models::{
    AccountId, BatchSummary, Clock, ComposedVideo, Job, JobId, JobProgressView, JobStatus,
    ModelError, PipelineConfig, PipelineOptions, PipelineResult, PipelineStage, ProductId,
    SweepSummary, VideoCompositionRequest, VideoOptions,
};
use tokpipe_storage::{thumbnail_key, video_key, ArtifactStore};
use tokpipe_store::{Store, StoreError};
use tokpipe_tiktok::{Publisher, TikTokError};

use crate::config::WorkerConfig;
use crate::error::{PipelineError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics::{record_degraded, record_pipeline_run, record_sweep};
use crate::notify::NotificationHub;
use crate::progress::StoreProgressSink;
use crate::retry::{retry_async, PostRetryPolicy, RetryConfig, RetryDecision};
use crate::scheduler::PostingScheduler;

const HOOKS_PROGRESS: u8 = 20;
const RENDER_FLOOR: u8 = 20;
const RENDER_CEILING: u8 = 80;
const VIDEO_READY_PROGRESS: u8 = 85;
const READY_PROGRESS: u8 = 90;
const POSTING_PROGRESS: u8 = 95;

/// How long one pipeline run may hold a job before another run may take it.
const PIPELINE_LEASE_MINUTES: i64 = 30;

/// Collaborators the orchestrator drives.
pub struct PipelineDeps {
    pub store: Arc<dyn Store>,
    pub renderer: Arc<dyn VideoRenderer>,
    /// `None` disables hook generation
    pub hooks: Option<Arc<dyn HookGenerator>>,
    pub artifacts: Arc<dyn ArtifactStore>,
    pub publisher: Arc<Publisher>,
    pub notifier: NotificationHub,
    pub clock: Arc<dyn Clock>,
}

/// What one sweep did with one due job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PostOutcome {
    Posted,
    Retried,
    GaveUp,
    /// Claimed elsewhere or pushed to a later slot for quota
    Skipped,
}

pub struct Orchestrator {
    store: Arc<dyn Store>,
    renderer: Arc<dyn VideoRenderer>,
    hooks: Option<Arc<dyn HookGenerator>>,
    artifacts: Arc<dyn ArtifactStore>,
    publisher: Arc<Publisher>,
    notifier: NotificationHub,
    clock: Arc<dyn Clock>,
    config: Arc<PipelineConfig>,
    scheduler: PostingScheduler,
    retry_policy: PostRetryPolicy,
    upload_retry: RetryConfig,
    record_retry: RetryConfig,
}

impl Orchestrator {
    pub fn new(deps: PipelineDeps, config: Arc<PipelineConfig>, worker: &WorkerConfig) -> WorkerResult<Self> {
        let scheduler = PostingScheduler::new(Arc::clone(&config))?;
        Ok(Self {
            store: deps.store,
            renderer: deps.renderer,
            hooks: deps.hooks,
            artifacts: deps.artifacts,
            publisher: deps.publisher,
            notifier: deps.notifier,
            clock: deps.clock,
            config,
            scheduler,
            retry_policy: PostRetryPolicy::default(),
            upload_retry: RetryConfig::new("artifact_upload")
                .with_max_retries(worker.upload_retries.saturating_sub(1)),
            record_retry: RetryConfig::new("record_post").with_max_retries(2),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    // ------------------------------------------------------------------
    // Pipeline runs
    // ------------------------------------------------------------------

    /// Advance one job as far as the options allow.
    ///
    /// Hook failures degrade; a render failure marks the job FAILED and ends
    /// the run. Only store errors and unknown jobs surface as `Err`.
    pub async fn run_auto_pipeline(
        &self,
        job_id: &JobId,
        options: &PipelineOptions,
    ) -> WorkerResult<PipelineResult> {
        let job = self.store.require_job(job_id).await?;
        if job.status != JobStatus::Pending {
            return Ok(PipelineResult::failed(
                PipelineStage::Created,
                "Job is not pending",
                format!("job status is {}", job.status),
            ));
        }

        let now = self.clock.now();
        let until = now + chrono::Duration::minutes(PIPELINE_LEASE_MINUTES);
        let job = match self
            .store
            .update_job(job_id, &move |j: &mut Job| j.acquire_pipeline_lease(until, now))
            .await
        {
            Ok(job) => job,
            Err(StoreError::Model(ModelError::PipelineBusy(_))) => {
                debug!(job_id = %job_id, "Pipeline already running elsewhere");
                return Ok(PipelineResult::failed(
                    PipelineStage::Created,
                    "Pipeline already running",
                    format!("job {} is being processed by another run", job_id),
                ));
            }
            Err(e) => return Err(e.into()),
        };

        let result = self.run_leased(job, options).await;

        let released_at = self.clock.now();
        if let Err(e) = self
            .store
            .update_job(job_id, &move |j: &mut Job| {
                j.release_pipeline_lease(released_at);
                Ok(())
            })
            .await
        {
            warn!(job_id = %job_id, "Failed to release pipeline lease: {}", e);
        }
        result
    }

    async fn run_leased(&self, mut job: Job, options: &PipelineOptions) -> WorkerResult<PipelineResult> {
        let id = job.id.clone();
        let job_id = &id;
        let logger = JobLogger::new(job_id, "auto_pipeline");

        let generate_hooks = options.generate_hooks.unwrap_or(self.config.auto_hooks);
        let generate_video = options.generate_video.unwrap_or(self.config.auto_video);
        let auto_schedule = options.auto_schedule.unwrap_or(self.config.auto_schedule);
        let mut stage = PipelineStage::Created;

        logger.log_start(&job.product_name);

        if job.has_hooks() {
            stage = PipelineStage::Hooks;
        } else if generate_hooks {
            match self.generate_hooks(&job).await {
                Ok(Some(updated)) => {
                    job = updated;
                    stage = PipelineStage::Hooks;
                    logger.log_progress("Hooks generated");
                }
                Ok(None) => logger.log_warning("No hook generator configured, continuing without hooks"),
                Err(e) if e.is_not_found() => return Err(e),
                Err(e) => {
                    record_degraded("hooks");
                    logger.log_warning(&format!("Hook generation failed, continuing without hooks: {}", e));
                }
            }
        }

        if job.video_url.is_some() {
            stage = PipelineStage::Video;
        } else if generate_video {
            if job.images().is_empty() {
                logger.log_warning("No product images, skipping video");
            } else {
                match self.render_video(&job, &options.video_options).await {
                    Ok(updated) => {
                        job = updated;
                        stage = PipelineStage::Video;
                        logger.log_progress("Video ready");
                    }
                    Err(e) if e.is_not_found() => return Err(e),
                    Err(e) => {
                        let message = e.to_string();
                        logger.log_error(&message);
                        self.fail_job(job_id, &message).await?;
                        record_pipeline_run(PipelineStage::Video, false);
                        return Ok(PipelineResult::failed(
                            PipelineStage::Video,
                            "Video generation failed",
                            message,
                        ));
                    }
                }
            }
        }

        if job.scheduled_at.is_some() && job.tiktok_account_id.is_some() {
            stage = PipelineStage::Scheduled;
        } else if job.video_url.is_some() && auto_schedule {
            match self.schedule_job(&job).await {
                Ok(updated) => {
                    job = updated;
                    stage = PipelineStage::Scheduled;
                }
                Err(PipelineError::NoActiveAccount) => {
                    logger.log_warning("No active posting account, leaving job unscheduled")
                }
                Err(e) => return Err(e),
            }
        }

        let step = match (job.scheduled_at, job.video_url.is_some()) {
            (Some(at), true) => format!("Scheduled for {}", format_slot(at)),
            (None, true) => "Ready to post".to_string(),
            (_, false) => "Waiting for video".to_string(),
        };
        let progress = if job.video_url.is_some() {
            READY_PROGRESS
        } else {
            job.progress
        };
        self.store
            .set_job_progress(job_id, progress, &step, self.clock.now())
            .await?;

        logger.log_completion(&step);
        record_pipeline_run(stage, true);
        Ok(PipelineResult::ok(stage, step))
    }

    /// Run the default pipeline for up to `limit` jobs still waiting for
    /// hooks, video or a slot, oldest first.
    pub async fn process_pending_pipelines(&self, limit: usize) -> WorkerResult<BatchSummary> {
        let now = self.clock.now();
        let mut pending: Vec<Job> = self
            .store
            .jobs_by_status(JobStatus::Pending)
            .await?
            .into_iter()
            .filter(|j| needs_pipeline(j) && !j.pipeline_leased(now))
            .collect();
        pending.sort_by_key(|j| j.created_at);
        pending.truncate(limit);

        let options = PipelineOptions::default();
        let mut summary = BatchSummary::default();
        for job in pending {
            let ok = match self.run_auto_pipeline(&job.id, &options).await {
                Ok(result) => result.success,
                Err(e) => {
                    warn!(job_id = %job.id, "Pipeline run failed: {}", e);
                    false
                }
            };
            summary.record(ok);
        }

        info!(
            processed = summary.processed,
            success = summary.success,
            failed = summary.failed,
            "Pending pipelines processed"
        );
        Ok(summary)
    }

    async fn generate_hooks(&self, job: &Job) -> WorkerResult<Option<Job>> {
        let Some(generator) = &self.hooks else {
            return Ok(None);
        };

        self.store
            .set_job_progress(&job.id, 10, "Generating hooks", self.clock.now())
            .await?;

        let set = generator.generate_hooks(&job.product_name).await?.normalized();
        if set.is_empty() {
            return Err(PipelineError::stage(PipelineStage::Hooks, "generator returned no hooks"));
        }

        let now = self.clock.now();
        let updated = self
            .store
            .update_job(&job.id, &move |j: &mut Job| {
                j.set_creative(
                    set.hooks.clone(),
                    non_empty(&set.ending),
                    non_empty(&set.caption),
                    set.hashtags.clone(),
                    now,
                );
                j.set_progress(HOOKS_PROGRESS, "Hooks ready", now);
                Ok(())
            })
            .await?;
        Ok(Some(updated))
    }

    async fn render_video(&self, job: &Job, options: &VideoOptions) -> WorkerResult<Job> {
        let request = VideoCompositionRequest::for_job(job, options, &self.config.video);
        let (sink, writer) = StoreProgressSink::spawn(
            Arc::clone(&self.store),
            Arc::clone(&self.clock),
            job.id.clone(),
            RENDER_FLOOR,
            RENDER_CEILING,
        );

        let composed = self.renderer.compose(&request, &sink).await;
        writer.finish(sink).await;
        let composed = composed?;

        let uploaded = self.upload_artifacts(&job.id, &composed).await;
        remove_local_artifacts(&composed).await;
        let (video_url, thumbnail_url) = uploaded?;

        let now = self.clock.now();
        let job = self
            .store
            .update_job(&job.id, &move |j: &mut Job| {
                j.set_video(video_url.clone(), thumbnail_url.clone(), now);
                j.set_progress(VIDEO_READY_PROGRESS, "Video ready", now);
                Ok(())
            })
            .await?;
        Ok(job)
    }

    /// Upload the rendered video (required) and thumbnail (best effort).
    async fn upload_artifacts(
        &self,
        job_id: &JobId,
        composed: &ComposedVideo,
    ) -> WorkerResult<(String, Option<String>)> {
        let key = video_key(job_id.as_str());
        let video_url = retry_async(&self.upload_retry, self.clock.as_ref(), || {
            self.artifacts.put(&composed.video_path, &key)
        })
        .await
        .into_result()?;

        let thumbnail_url = match &composed.thumbnail_path {
            Some(path) => {
                let key = thumbnail_key(job_id.as_str());
                match retry_async(&self.upload_retry, self.clock.as_ref(), || {
                    self.artifacts.put(path, &key)
                })
                .await
                .into_result()
                {
                    Ok(url) => Some(url),
                    Err(e) => {
                        record_degraded("thumbnail_upload");
                        warn!(job_id = %job_id, "Thumbnail upload failed: {}", e);
                        None
                    }
                }
            }
            None => None,
        };

        debug!(job_id = %job_id, video_url = %video_url, "Artifacts uploaded");
        Ok((video_url, thumbnail_url))
    }

    // ------------------------------------------------------------------
    // Scheduling
    // ------------------------------------------------------------------

    /// Next free slot for `account_id`, or across all accounts.
    pub async fn next_posting_slot(&self, account_id: Option<&AccountId>) -> WorkerResult<DateTime<Utc>> {
        self.next_slot_excluding(account_id, None, self.clock.now()).await
    }

    /// Slot search starting at `not_before`, ignoring the job being moved.
    async fn next_slot_excluding(
        &self,
        account_id: Option<&AccountId>,
        exclude: Option<&JobId>,
        not_before: DateTime<Utc>,
    ) -> WorkerResult<DateTime<Utc>> {
        let mut jobs = self.store.jobs_by_status(JobStatus::Pending).await?;
        jobs.extend(self.store.jobs_by_status(JobStatus::Processing).await?);
        if let Some(exclude) = exclude {
            jobs.retain(|j| &j.id != exclude);
        }

        let from = not_before.max(self.clock.now());
        let slot = {
            let mut rng = rand::rng();
            self.scheduler
                .next_slot(from, &jobs, account_id.map(|a| a.as_str()), &mut rng)
        };
        Ok(slot)
    }

    /// Assign the least recently posting active account and its next slot.
    async fn schedule_job(&self, job: &Job) -> WorkerResult<Job> {
        let accounts = self.store.active_accounts().await?;
        let account = accounts.first().ok_or(PipelineError::NoActiveAccount)?;
        let slot = self.next_posting_slot(Some(&account.id)).await?;

        let account_id = account.id.to_string();
        let now = self.clock.now();
        let job = self
            .store
            .update_job(&job.id, &move |j: &mut Job| {
                j.schedule(slot, account_id.clone(), now)?;
                j.set_progress(READY_PROGRESS, format!("Scheduled for {}", format_slot(slot)), now);
                Ok(())
            })
            .await?;

        info!(
            job_id = %job.id,
            account_id = %account.id,
            slot = %format_slot(slot),
            "Job scheduled"
        );
        Ok(job)
    }

    // ------------------------------------------------------------------
    // Posting sweep
    // ------------------------------------------------------------------

    /// Post every due job, earliest slot first.
    ///
    /// A job that fails here is handed to the retry policy and is not
    /// attempted again in the same pass.
    pub async fn process_scheduled_jobs(&self) -> WorkerResult<SweepSummary> {
        let started = Instant::now();
        let now = self.clock.now();

        let mut due: Vec<Job> = self
            .store
            .jobs_by_status(JobStatus::Pending)
            .await?
            .into_iter()
            .filter(|j| j.is_due(now))
            .collect();
        due.sort_by_key(|j| j.scheduled_at);

        let mut summary = SweepSummary {
            due: due.len() as u32,
            ..Default::default()
        };
        let mut posted_before = false;

        for job in due {
            let outcome = match self.post_job(&job, &mut posted_before).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(job_id = %job.id, "Post attempt could not be recorded: {}", e);
                    PostOutcome::Skipped
                }
            };
            match outcome {
                PostOutcome::Posted => summary.posted += 1,
                PostOutcome::Retried => summary.retried += 1,
                PostOutcome::GaveUp => summary.failed += 1,
                PostOutcome::Skipped => summary.skipped += 1,
            }
        }

        record_sweep(&summary, started.elapsed());
        if summary.due > 0 {
            info!(
                due = summary.due,
                posted = summary.posted,
                retried = summary.retried,
                failed = summary.failed,
                skipped = summary.skipped,
                "Posting sweep finished"
            );
        }
        Ok(summary)
    }

    async fn post_job(&self, job: &Job, posted_before: &mut bool) -> WorkerResult<PostOutcome> {
        let logger = JobLogger::new(&job.id, "post");
        let Some(account_id) = job.tiktok_account_id.as_deref().map(AccountId::from) else {
            return Ok(PostOutcome::Skipped);
        };

        match self.publisher.quota().check_daily_limit(&account_id).await {
            Ok(limit) if !limit.allowed => {
                return self
                    .reschedule_for_quota(&job.id, &account_id, JobStatus::Pending, Some(limit.resets_at))
                    .await;
            }
            Ok(_) => {}
            Err(e) => {
                logger.log_warning(&format!("Daily limit check failed: {}", e));
            }
        }

        let Some(claimed) = self.store.claim_job(&job.id, self.clock.now()).await? else {
            debug!(job_id = %job.id, "Job already claimed by another sweep");
            return Ok(PostOutcome::Skipped);
        };

        if *posted_before {
            self.clock.sleep(self.config.inter_post_delay).await;
        }
        *posted_before = true;

        match self.post_claimed(&claimed, &account_id, &logger).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                // Claimed jobs never stay PROCESSING: the sweep only picks up PENDING.
                let message = format!("Post attempt failed: {}", e);
                logger.log_error(&message);
                self.record_post_failure(&claimed.id, &message).await
            }
        }
    }

    async fn post_claimed(
        &self,
        claimed: &Job,
        account_id: &AccountId,
        logger: &JobLogger,
    ) -> WorkerResult<PostOutcome> {
        logger.log_start(&format!("posting to account {}", account_id));
        if let Err(e) = self
            .store
            .set_job_progress(&claimed.id, POSTING_PROGRESS, "Posting to TikTok", self.clock.now())
            .await
        {
            logger.log_warning(&format!("Progress update failed: {}", e));
        }

        let video_url = claimed.video_url.clone().unwrap_or_default();
        let caption = claimed.full_caption();

        match self
            .publisher
            .post_video(account_id, &claimed.id, &video_url, &caption)
            .await
        {
            Ok(outcome) => Ok(self.record_posted(claimed, &outcome.post_id, logger).await),
            Err(TikTokError::DailyLimitReached { .. }) => {
                self.reschedule_for_quota(&claimed.id, account_id, JobStatus::Processing, None)
                    .await
            }
            Err(e) => {
                let message = e.to_string();
                logger.log_error(&message);
                self.record_post_failure(&claimed.id, &message).await
            }
        }
    }

    /// Mark a published job DONE.
    ///
    /// The video is already live, so this never hands the job back to the
    /// retry policy: if DONE cannot be written the job is parked as FAILED
    /// with the post id in its error.
    async fn record_posted(&self, claimed: &Job, post_id: &str, logger: &JobLogger) -> PostOutcome {
        let posted_at = self.clock.now();
        let complete = {
            let post_id = post_id.to_string();
            move |j: &mut Job| j.complete(post_id.clone(), posted_at)
        };

        match retry_async(&self.record_retry, self.clock.as_ref(), || {
            self.store.update_job(&claimed.id, &complete)
        })
        .await
        .into_result()
        {
            Ok(done) => {
                logger.log_completion(&format!("posted as {}", post_id));
                self.notifier.notify_job(&done).await;
                PostOutcome::Posted
            }
            Err(e) => {
                let message = format!("Posted as {} but the job could not be marked done: {}", post_id, e);
                logger.log_error(&message);
                if let Err(e) = self.fail_job(&claimed.id, &message).await {
                    error!(job_id = %claimed.id, post_id, "Published job left in PROCESSING: {}", e);
                }
                PostOutcome::GaveUp
            }
        }
    }

    /// Count a failed attempt against the job's retry budget.
    async fn record_post_failure(&self, job_id: &JobId, message: &str) -> WorkerResult<PostOutcome> {
        let now = self.clock.now();
        let policy = self.retry_policy;
        let message = message.to_string();
        let job = self
            .store
            .update_job(job_id, &move |j: &mut Job| {
                policy.apply(j, &message, now);
                Ok(())
            })
            .await?;

        match RetryDecision::of(&job) {
            RetryDecision::Requeued { at, retry_count } => {
                warn!(
                    job_id = %job_id,
                    retry_count,
                    retry_at = %format_slot(at),
                    "Post failed, requeued"
                );
                Ok(PostOutcome::Retried)
            }
            RetryDecision::GaveUp { retry_count } => {
                error!(job_id = %job_id, retry_count, "Post failed permanently");
                self.notifier.notify_job(&job).await;
                Ok(PostOutcome::GaveUp)
            }
        }
    }

    /// Move a job to the account's first slot after its quota resets,
    /// without spending a retry.
    async fn reschedule_for_quota(
        &self,
        job_id: &JobId,
        account_id: &AccountId,
        expected: JobStatus,
        resets_at: Option<DateTime<Utc>>,
    ) -> WorkerResult<PostOutcome> {
        let now = self.clock.now();
        let resets_at = match resets_at {
            Some(at) => at,
            None => self
                .publisher
                .quota()
                .check_daily_limit(account_id)
                .await
                .map(|limit| limit.resets_at)
                .unwrap_or(now),
        };
        let slot = self
            .next_slot_excluding(Some(account_id), Some(job_id), resets_at)
            .await?;
        self.store
            .update_job(job_id, &move |j: &mut Job| {
                if j.status != expected {
                    return Err(ModelError::InvalidTransition {
                        job_id: j.id.to_string(),
                        from: j.status.to_string(),
                        to: JobStatus::Pending.to_string(),
                    });
                }
                j.status = JobStatus::Pending;
                j.scheduled_at = Some(slot);
                j.set_progress(
                    j.progress,
                    format!("Daily limit reached, rescheduled for {}", format_slot(slot)),
                    now,
                );
                Ok(())
            })
            .await
            .map(|_| ())
            .or_else(|e| if e.is_invalid_transition() { Ok(()) } else { Err(e) })?;

        info!(
            job_id = %job_id,
            account_id = %account_id,
            slot = %format_slot(slot),
            "Daily limit reached, job rescheduled"
        );
        Ok(PostOutcome::Skipped)
    }

    // ------------------------------------------------------------------
    // Manual actions
    // ------------------------------------------------------------------

    /// Reset a FAILED job's retry budget and run the pipeline again.
    pub async fn retry_job(&self, job_id: &JobId) -> WorkerResult<PipelineResult> {
        let now = self.clock.now();
        let reset = self
            .store
            .update_job(job_id, &move |j: &mut Job| {
                if j.status != JobStatus::Failed {
                    return Err(ModelError::InvalidTransition {
                        job_id: j.id.to_string(),
                        from: j.status.to_string(),
                        to: JobStatus::Pending.to_string(),
                    });
                }
                j.reset_for_retry(now);
                Ok(())
            })
            .await;

        match reset {
            Ok(_) => {
                info!(job_id = %job_id, "Job reset for retry");
                self.run_auto_pipeline(job_id, &PipelineOptions::default()).await
            }
            Err(e) if e.is_invalid_transition() => Ok(PipelineResult::failed(
                PipelineStage::Created,
                "Only failed jobs can be retried",
                e.to_string(),
            )),
            Err(e) => Err(e.into()),
        }
    }

    /// Retry each job in turn; one failure never stops the batch.
    pub async fn bulk_retry(&self, job_ids: &[JobId]) -> BatchSummary {
        let mut summary = BatchSummary::default();
        for job_id in job_ids {
            let ok = match self.retry_job(job_id).await {
                Ok(result) => {
                    if !result.success {
                        debug!(job_id = %job_id, "Retry did not succeed: {:?}", result.error);
                    }
                    result.success
                }
                Err(e) => {
                    warn!(job_id = %job_id, "Retry failed: {}", e);
                    false
                }
            };
            summary.record(ok);
        }
        summary
    }

    /// Progress snapshots in request order; unknown ids are omitted.
    pub async fn job_progress(&self, job_ids: &[JobId]) -> WorkerResult<Vec<JobProgressView>> {
        let jobs = self.store.get_jobs(job_ids).await?;
        Ok(jobs.iter().map(JobProgressView::from).collect())
    }

    /// Seed a PENDING job from a stored product.
    pub async fn create_job_from_product(&self, product_id: &ProductId) -> WorkerResult<Job> {
        let product = self.store.require_product(product_id).await?;
        let job = Job::from_product(&product, self.clock.now());
        self.store.create_job(&job).await?;
        info!(job_id = %job.id, product_id = %product_id, "Job created from product");
        Ok(job)
    }

    pub async fn create_jobs_from_products(&self, product_ids: &[ProductId]) -> (BatchSummary, Vec<JobId>) {
        let mut summary = BatchSummary::default();
        let mut created = Vec::new();
        for product_id in product_ids {
            match self.create_job_from_product(product_id).await {
                Ok(job) => {
                    created.push(job.id);
                    summary.record(true);
                }
                Err(e) => {
                    warn!(product_id = %product_id, "Job creation failed: {}", e);
                    summary.record(false);
                }
            }
        }
        (summary, created)
    }

    async fn fail_job(&self, job_id: &JobId, message: &str) -> WorkerResult<()> {
        let now = self.clock.now();
        let message = message.to_string();
        let job = self
            .store
            .update_job(job_id, &move |j: &mut Job| {
                j.fail(message.clone(), now);
                j.set_progress(j.progress, "Failed", now);
                Ok(())
            })
            .await?;
        self.notifier.notify_job(&job).await;
        Ok(())
    }
}

/// Pending and still missing a video or a slot, with something to render.
fn needs_pipeline(job: &Job) -> bool {
    job.scheduled_at.is_none() && (job.video_url.is_some() || !job.images().is_empty())
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

fn format_slot(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

async fn remove_local_artifacts(composed: &ComposedVideo) {
    remove_if_exists(&composed.video_path).await;
    if let Some(audio) = &composed.audio_path {
        remove_if_exists(audio).await;
    }
    if let Some(thumbnail) = &composed.thumbnail_path {
        remove_if_exists(thumbnail).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_needs_pipeline() {
        let now = Utc::now();
        let mut job = Job::new(ProductId::from("p"), "Lamp", now);
        assert!(!needs_pipeline(&job));

        job.image_url = Some("https://img/1.jpg".into());
        assert!(needs_pipeline(&job));

        job.video_url = Some("https://cdn/v.mp4".into());
        job.schedule(now, "acc", now).unwrap();
        assert!(!needs_pipeline(&job));
    }

    #[test]
    fn test_non_empty() {
        assert_eq!(non_empty("  "), None);
        assert_eq!(non_empty(" Link in bio "), Some("Link in bio".to_string()));
    }
}
