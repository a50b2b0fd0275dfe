//! In-process store for single-instance deployments and tests.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use tokpipe_models::{Account, AccountId, Job, JobId, JobStatus, Product, ProductId};

use crate::error::{StoreError, StoreResult};
use crate::traits::{AccountMutation, AccountStore, JobMutation, JobStore, ProductStore};

/// Store backed by hash maps behind async locks.
///
/// Each `update_*` runs its closure while holding the write lock, which
/// makes the read-modify-write a single step for every caller.
#[derive(Default)]
pub struct MemoryStore {
    jobs: RwLock<HashMap<JobId, Job>>,
    accounts: RwLock<HashMap<AccountId, Account>>,
    products: RwLock<HashMap<ProductId, Product>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn job_count(&self) -> usize {
        self.jobs.read().await.len()
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn create_job(&self, job: &Job) -> StoreResult<()> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.id) {
            return Err(StoreError::already_exists("job", job.id.as_str()));
        }
        jobs.insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn get_job(&self, id: &JobId) -> StoreResult<Option<Job>> {
        Ok(self.jobs.read().await.get(id).cloned())
    }

    async fn update_job(&self, id: &JobId, mutation: JobMutation<'_>) -> StoreResult<Job> {
        let mut jobs = self.jobs.write().await;
        let stored = jobs
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found("job", id.as_str()))?;
        let mut updated = stored.clone();
        mutation(&mut updated)?;
        *stored = updated.clone();
        Ok(updated)
    }

    async fn jobs_by_status(&self, status: JobStatus) -> StoreResult<Vec<Job>> {
        let mut jobs: Vec<Job> = self
            .jobs
            .read()
            .await
            .values()
            .filter(|j| j.status == status)
            .cloned()
            .collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(jobs)
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn save_account(&self, account: &Account) -> StoreResult<()> {
        self.accounts
            .write()
            .await
            .insert(account.id.clone(), account.clone());
        Ok(())
    }

    async fn get_account(&self, id: &AccountId) -> StoreResult<Option<Account>> {
        Ok(self.accounts.read().await.get(id).cloned())
    }

    async fn list_accounts(&self) -> StoreResult<Vec<Account>> {
        Ok(self.accounts.read().await.values().cloned().collect())
    }

    async fn update_account(
        &self,
        id: &AccountId,
        mutation: AccountMutation<'_>,
    ) -> StoreResult<Option<Account>> {
        let mut accounts = self.accounts.write().await;
        let stored = accounts
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found("account", id.as_str()))?;
        let mut updated = stored.clone();
        if !mutation(&mut updated) {
            return Ok(None);
        }
        *stored = updated.clone();
        Ok(Some(updated))
    }
}

#[async_trait]
impl ProductStore for MemoryStore {
    async fn save_product(&self, product: &Product) -> StoreResult<()> {
        self.products
            .write()
            .await
            .insert(product.id.clone(), product.clone());
        Ok(())
    }

    async fn get_product(&self, id: &ProductId) -> StoreResult<Option<Product>> {
        Ok(self.products.read().await.get(id).cloned())
    }
}
