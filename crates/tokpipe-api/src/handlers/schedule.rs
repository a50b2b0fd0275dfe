//! Posting schedule handlers.

use axum::extract::{Query, State};
use axum::Json;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use tokpipe_models::AccountId;

use crate::error::ApiResult;
use crate::handlers::validate_id;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NextSlotQuery {
    pub account_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct NextSlotResponse {
    /// RFC 3339, UTC
    pub slot: String,
}

impl From<DateTime<Utc>> for NextSlotResponse {
    fn from(slot: DateTime<Utc>) -> Self {
        Self {
            slot: slot.to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }
}

/// Next free posting slot for one account, or across all accounts.
pub async fn next_slot(
    State(state): State<AppState>,
    Query(query): Query<NextSlotQuery>,
) -> ApiResult<Json<NextSlotResponse>> {
    let account_id = match query.account_id.as_deref().filter(|s| !s.is_empty()) {
        Some(id) => Some(AccountId::from(validate_id(id)?)),
        None => None,
    };

    let slot = state
        .orchestrator
        .next_posting_slot(account_id.as_ref())
        .await?;
    Ok(Json(slot.into()))
}
