//! Persistence seams.
//!
//! Every mutation of a stored record goes through an `update_*` call that
//! applies a closure atomically: no caller ever reads, modifies and writes
//! back in separate steps.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use tokpipe_models::{
    Account, AccountId, Job, JobId, JobStatus, ModelResult, Product, ProductId,
};

use crate::error::{StoreError, StoreResult};

/// Mutation applied to a job under the store's atomicity guarantee.
pub type JobMutation<'a> = &'a (dyn Fn(&mut Job) -> ModelResult<()> + Send + Sync);

/// Mutation applied to an account. Returning false discards the change.
pub type AccountMutation<'a> = &'a (dyn Fn(&mut Account) -> bool + Send + Sync);

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new job; fails if the id is taken.
    async fn create_job(&self, job: &Job) -> StoreResult<()>;

    async fn get_job(&self, id: &JobId) -> StoreResult<Option<Job>>;

    /// Atomically apply `mutation` and return the stored result.
    async fn update_job(&self, id: &JobId, mutation: JobMutation<'_>) -> StoreResult<Job>;

    async fn jobs_by_status(&self, status: JobStatus) -> StoreResult<Vec<Job>>;

    async fn require_job(&self, id: &JobId) -> StoreResult<Job> {
        self.get_job(id)
            .await?
            .ok_or_else(|| StoreError::not_found("job", id.as_str()))
    }

    /// Jobs in request order; unknown ids are skipped.
    async fn get_jobs(&self, ids: &[JobId]) -> StoreResult<Vec<Job>> {
        let mut jobs = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(job) = self.get_job(id).await? {
                jobs.push(job);
            }
        }
        Ok(jobs)
    }

    /// Move a PENDING job to PROCESSING.
    ///
    /// Returns `None` when the job is no longer pending, which means another
    /// sweep already owns it.
    async fn claim_job(&self, id: &JobId, now: DateTime<Utc>) -> StoreResult<Option<Job>> {
        match self.update_job(id, &move |job: &mut Job| job.start_processing(now)).await {
            Ok(job) => Ok(Some(job)),
            Err(e) if e.is_invalid_transition() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn set_job_progress(
        &self,
        id: &JobId,
        progress: u8,
        step: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        let step = step.to_string();
        self.update_job(id, &move |job: &mut Job| {
            job.set_progress(progress, step.clone(), now);
            Ok(())
        })
        .await
        .map(|_| ())
    }
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Insert or replace.
    async fn save_account(&self, account: &Account) -> StoreResult<()>;

    async fn get_account(&self, id: &AccountId) -> StoreResult<Option<Account>>;

    async fn list_accounts(&self) -> StoreResult<Vec<Account>>;

    /// Atomically apply `mutation`; `None` when it declined the change.
    async fn update_account(
        &self,
        id: &AccountId,
        mutation: AccountMutation<'_>,
    ) -> StoreResult<Option<Account>>;

    async fn require_account(&self, id: &AccountId) -> StoreResult<Account> {
        self.get_account(id)
            .await?
            .ok_or_else(|| StoreError::not_found("account", id.as_str()))
    }

    /// Active accounts, least recently posted first (never-posted first).
    async fn active_accounts(&self) -> StoreResult<Vec<Account>> {
        let mut accounts: Vec<Account> = self
            .list_accounts()
            .await?
            .into_iter()
            .filter(|a| a.is_active)
            .collect();
        accounts.sort_by(|a, b| {
            a.last_post_at
                .cmp(&b.last_post_at)
                .then_with(|| a.id.as_str().cmp(b.id.as_str()))
        });
        Ok(accounts)
    }
}

#[async_trait]
pub trait ProductStore: Send + Sync {
    async fn save_product(&self, product: &Product) -> StoreResult<()>;

    async fn get_product(&self, id: &ProductId) -> StoreResult<Option<Product>>;

    async fn require_product(&self, id: &ProductId) -> StoreResult<Product> {
        self.get_product(id)
            .await?
            .ok_or_else(|| StoreError::not_found("product", id.as_str()))
    }
}
