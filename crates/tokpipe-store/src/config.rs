//! Store configuration.

/// Which backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Redis,
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub redis_url: String,
    /// Namespace for every key
    pub key_prefix: String,
    /// Optimistic update attempts before giving up with `Conflict`
    pub max_update_attempts: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Redis,
            redis_url: "redis://localhost:6379".to_string(),
            key_prefix: "tokpipe".to_string(),
            max_update_attempts: 8,
        }
    }
}

impl StoreConfig {
    pub fn from_env() -> Self {
        let backend = match std::env::var("STORE_BACKEND").as_deref() {
            Ok("memory") => StoreBackend::Memory,
            _ => StoreBackend::Redis,
        };
        Self {
            backend,
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            key_prefix: std::env::var("STORE_KEY_PREFIX").unwrap_or_else(|_| "tokpipe".to_string()),
            max_update_attempts: std::env::var("STORE_MAX_UPDATE_ATTEMPTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(8),
        }
    }
}
