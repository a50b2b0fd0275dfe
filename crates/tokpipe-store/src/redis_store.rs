//! Redis-backed store.
//!
//! Layout (prefix `tokpipe`):
//! - `tokpipe:job:{id}` hash `{data, version}`
//! - `tokpipe:jobs:{STATUS}` set of job ids
//! - `tokpipe:account:{id}` hash `{data, version}`, `tokpipe:accounts` set
//! - `tokpipe:product:{id}` JSON string
//!
//! Updates are optimistic: read data and version, apply the mutation
//! locally, then write through a Lua compare-and-set that only succeeds if
//! the version is unchanged. The script also moves the id between status
//! index sets, so record and index never disagree.

use async_trait::async_trait;
use redis::AsyncCommands;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use tokpipe_models::{Account, AccountId, Job, JobId, JobStatus, Product, ProductId};

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::traits::{AccountMutation, AccountStore, JobMutation, JobStore, ProductStore};

/// KEYS: record, index to leave, index to join.
/// ARGV: expected version, payload, member id.
const CAS_SCRIPT: &str = r#"
local current = redis.call('HGET', KEYS[1], 'version')
if not current then current = '0' end
if current ~= ARGV[1] then
  return 0
end
redis.call('HSET', KEYS[1], 'data', ARGV[2], 'version', tostring(tonumber(ARGV[1]) + 1))
if KEYS[2] ~= KEYS[3] then
  redis.call('SREM', KEYS[2], ARGV[3])
end
redis.call('SADD', KEYS[3], ARGV[3])
return 1
"#;

pub struct RedisStore {
    client: redis::Client,
    config: StoreConfig,
    cas: redis::Script,
}

struct Versioned<T> {
    value: T,
    version: u64,
}

impl RedisStore {
    pub fn new(config: StoreConfig) -> StoreResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self {
            client,
            config,
            cas: redis::Script::new(CAS_SCRIPT),
        })
    }

    pub fn from_env() -> StoreResult<Self> {
        Self::new(StoreConfig::from_env())
    }

    pub async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        redis::cmd("PING").query_async::<()>(&mut conn).await?;
        Ok(())
    }

    fn job_key(&self, id: &JobId) -> String {
        format!("{}:job:{}", self.config.key_prefix, id)
    }

    fn status_key(&self, status: JobStatus) -> String {
        format!("{}:jobs:{}", self.config.key_prefix, status.as_str())
    }

    fn account_key(&self, id: &AccountId) -> String {
        format!("{}:account:{}", self.config.key_prefix, id)
    }

    fn accounts_key(&self) -> String {
        format!("{}:accounts", self.config.key_prefix)
    }

    fn product_key(&self, id: &ProductId) -> String {
        format!("{}:product:{}", self.config.key_prefix, id)
    }

    async fn load<T: DeserializeOwned>(&self, key: &str) -> StoreResult<Option<Versioned<T>>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let (data, version): (Option<String>, Option<u64>) = redis::cmd("HMGET")
            .arg(key)
            .arg("data")
            .arg("version")
            .query_async(&mut conn)
            .await?;
        match data {
            Some(data) => Ok(Some(Versioned {
                value: serde_json::from_str(&data)?,
                version: version.unwrap_or(0),
            })),
            None => Ok(None),
        }
    }

    /// Run the compare-and-set script. Returns false when the version moved.
    async fn compare_and_set<T: Serialize>(
        &self,
        key: &str,
        leave_index: &str,
        join_index: &str,
        member: &str,
        expected_version: u64,
        value: &T,
    ) -> StoreResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payload = serde_json::to_string(value)?;
        let written: i32 = self
            .cas
            .key(key)
            .key(leave_index)
            .key(join_index)
            .arg(expected_version)
            .arg(payload)
            .arg(member)
            .invoke_async(&mut conn)
            .await?;
        Ok(written == 1)
    }

    async fn load_jobs(&self, ids: Vec<String>) -> StoreResult<Vec<Job>> {
        let mut jobs = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(v) = self.load::<Job>(&self.job_key(&JobId::from_string(id))).await? {
                jobs.push(v.value);
            }
        }
        Ok(jobs)
    }
}

#[async_trait]
impl JobStore for RedisStore {
    async fn create_job(&self, job: &Job) -> StoreResult<()> {
        let index = self.status_key(job.status);
        let created = self
            .compare_and_set(&self.job_key(&job.id), &index, &index, job.id.as_str(), 0, job)
            .await?;
        if !created {
            return Err(StoreError::already_exists("job", job.id.as_str()));
        }
        debug!(job_id = %job.id, "Job created");
        Ok(())
    }

    async fn get_job(&self, id: &JobId) -> StoreResult<Option<Job>> {
        Ok(self.load::<Job>(&self.job_key(id)).await?.map(|v| v.value))
    }

    async fn update_job(&self, id: &JobId, mutation: JobMutation<'_>) -> StoreResult<Job> {
        let key = self.job_key(id);
        for attempt in 1..=self.config.max_update_attempts {
            let current = self
                .load::<Job>(&key)
                .await?
                .ok_or_else(|| StoreError::not_found("job", id.as_str()))?;

            let mut updated = current.value.clone();
            mutation(&mut updated)?;

            let written = self
                .compare_and_set(
                    &key,
                    &self.status_key(current.value.status),
                    &self.status_key(updated.status),
                    id.as_str(),
                    current.version,
                    &updated,
                )
                .await?;
            if written {
                return Ok(updated);
            }
            debug!(job_id = %id, attempt = attempt, "Job update raced, retrying");
        }

        warn!(job_id = %id, "Job update gave up after repeated conflicts");
        Err(StoreError::Conflict(format!("job {}", id)))
    }

    async fn jobs_by_status(&self, status: JobStatus) -> StoreResult<Vec<Job>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let ids: Vec<String> = conn.smembers(self.status_key(status)).await?;
        let mut jobs = self.load_jobs(ids).await?;
        // Index membership may lag a concurrent update by one read
        jobs.retain(|j| j.status == status);
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(jobs)
    }
}

#[async_trait]
impl AccountStore for RedisStore {
    async fn save_account(&self, account: &Account) -> StoreResult<()> {
        let key = self.account_key(&account.id);
        let index = self.accounts_key();
        for _ in 0..self.config.max_update_attempts {
            let version = self
                .load::<Account>(&key)
                .await?
                .map(|v| v.version)
                .unwrap_or(0);
            if self
                .compare_and_set(&key, &index, &index, account.id.as_str(), version, account)
                .await?
            {
                return Ok(());
            }
        }
        Err(StoreError::Conflict(format!("account {}", account.id)))
    }

    async fn get_account(&self, id: &AccountId) -> StoreResult<Option<Account>> {
        Ok(self.load::<Account>(&self.account_key(id)).await?.map(|v| v.value))
    }

    async fn list_accounts(&self) -> StoreResult<Vec<Account>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let ids: Vec<String> = conn.smembers(self.accounts_key()).await?;
        let mut accounts = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(account) = self.get_account(&AccountId::from_string(id)).await? {
                accounts.push(account);
            }
        }
        Ok(accounts)
    }

    async fn update_account(
        &self,
        id: &AccountId,
        mutation: AccountMutation<'_>,
    ) -> StoreResult<Option<Account>> {
        let key = self.account_key(id);
        let index = self.accounts_key();
        for attempt in 1..=self.config.max_update_attempts {
            let current = self
                .load::<Account>(&key)
                .await?
                .ok_or_else(|| StoreError::not_found("account", id.as_str()))?;

            let mut updated = current.value.clone();
            if !mutation(&mut updated) {
                return Ok(None);
            }

            if self
                .compare_and_set(&key, &index, &index, id.as_str(), current.version, &updated)
                .await?
            {
                return Ok(Some(updated));
            }
            debug!(account_id = %id, attempt = attempt, "Account update raced, retrying");
        }

        warn!(account_id = %id, "Account update gave up after repeated conflicts");
        Err(StoreError::Conflict(format!("account {}", id)))
    }
}

#[async_trait]
impl ProductStore for RedisStore {
    async fn save_product(&self, product: &Product) -> StoreResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payload = serde_json::to_string(product)?;
        conn.set::<_, _, ()>(self.product_key(&product.id), payload).await?;
        Ok(())
    }

    async fn get_product(&self, id: &ProductId) -> StoreResult<Option<Product>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payload: Option<String> = conn.get(self.product_key(id)).await?;
        payload
            .map(|p| serde_json::from_str(&p).map_err(StoreError::from))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> RedisStore {
        RedisStore::new(StoreConfig {
            key_prefix: "tp".into(),
            ..StoreConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_key_layout() {
        let s = store();
        assert_eq!(s.job_key(&JobId::from_string("j1")), "tp:job:j1");
        assert_eq!(s.status_key(JobStatus::Processing), "tp:jobs:PROCESSING");
        assert_eq!(s.account_key(&AccountId::from("a1")), "tp:account:a1");
        assert_eq!(s.product_key(&ProductId::from("p1")), "tp:product:p1");
    }

    #[test]
    fn test_script_guards_version_and_moves_index() {
        assert!(CAS_SCRIPT.contains("if current ~= ARGV[1]"));
        assert!(CAS_SCRIPT.contains("SREM"));
        assert!(CAS_SCRIPT.contains("SADD"));
    }
}
