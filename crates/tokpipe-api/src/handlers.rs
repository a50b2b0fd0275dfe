//! Request handlers.

pub mod health;
pub mod jobs;
pub mod pipeline;
pub mod schedule;

pub use health::*;
pub use jobs::*;
pub use pipeline::*;
pub use schedule::*;

use crate::error::{ApiError, ApiResult};

/// Most ids accepted by one batch request.
pub const MAX_BATCH: usize = 100;

/// Ids are stored as Redis key suffixes; keep them to a safe alphabet.
pub(crate) fn validate_id(id: &str) -> ApiResult<&str> {
    let valid = !id.is_empty()
        && id.len() <= 128
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(id)
    } else {
        Err(ApiError::bad_request(format!("invalid id: {:?}", id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_id() {
        assert!(validate_id("3f2a9c1e-77aa-4b0e-9c1d-0d6f6a1b2c3d").is_ok());
        assert!(validate_id("acc_1").is_ok());
        assert!(validate_id("").is_err());
        assert!(validate_id("job:1").is_err());
        assert!(validate_id("a b").is_err());
        assert!(validate_id(&"x".repeat(129)).is_err());
    }
}
