//! Store error types.

use thiserror::Error;

use tokpipe_models::ModelError;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("{kind} already exists: {id}")]
    AlreadyExists { kind: &'static str, id: String },

    /// Optimistic update lost the race too many times.
    #[error("Concurrent update conflict on {0}")]
    Conflict(String),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound { kind, id: id.into() }
    }

    pub fn already_exists(kind: &'static str, id: impl Into<String>) -> Self {
        Self::AlreadyExists { kind, id: id.into() }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    /// A rejected state transition, e.g. claiming a job that is not pending.
    pub fn is_invalid_transition(&self) -> bool {
        matches!(self, StoreError::Model(ModelError::InvalidTransition { .. }))
    }
}
