//! Persistence for jobs, posting accounts and products.
//!
//! `MemoryStore` keeps everything in-process; `RedisStore` persists to
//! Redis with compare-and-set updates so concurrent sweeps cannot double
//! claim a job or post past an account's daily cap.

pub mod config;
pub mod error;
pub mod memory;
pub mod redis_store;
pub mod traits;

use std::sync::Arc;

pub use config::{StoreBackend, StoreConfig};
pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use redis_store::RedisStore;
pub use traits::{AccountMutation, AccountStore, JobMutation, JobStore, ProductStore};

/// One backend serving all three stores.
pub trait Store: JobStore + AccountStore + ProductStore {
    /// The same backend viewed as an account store only.
    fn account_store(self: Arc<Self>) -> Arc<dyn AccountStore>;
}

impl<T: JobStore + AccountStore + ProductStore + 'static> Store for T {
    fn account_store(self: Arc<Self>) -> Arc<dyn AccountStore> {
        self
    }
}

/// Build the configured backend.
pub fn connect(config: StoreConfig) -> StoreResult<Arc<dyn Store>> {
    match config.backend {
        StoreBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        StoreBackend::Redis => Ok(Arc::new(RedisStore::new(config)?)),
    }
}
