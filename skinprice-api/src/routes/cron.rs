//! Scheduled Cleanup Endpoint
//!
//! `POST /api/cron/cleanup` (and `GET`, for schedulers that only issue GETs)
//! runs one sweep of expired price rows. The caller must present the shared
//! cron secret. Sweeping is idempotent, so retried calls are harmless.

use axum::{extract::State, http::HeaderMap, routing::get, Json, Router};
use serde::{Deserialize, Serialize};

use crate::auth::authorize_cron;
use crate::error::ApiResult;
use crate::state::AppState;
use crate::telemetry::with_metrics;

/// Response body for a cleanup run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupResponse {
    /// Rows deleted by this run
    pub deleted: u64,
    /// Rows are kept this long past expiry
    pub grace_seconds: u64,
}

/// POST|GET /api/cron/cleanup - Delete rows expired beyond the grace window
pub async fn cleanup(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<CleanupResponse>> {
    authorize_cron(state.cron_secret.as_ref(), &headers)?;

    let deleted = state.sweeper.sweep_once().await?;
    with_metrics(|m| m.record_sweep(deleted));

    Ok(Json(CleanupResponse {
        deleted,
        grace_seconds: state.sweeper.config().grace.as_secs(),
    }))
}

/// Create the cron router.
pub fn create_router() -> Router<AppState> {
    Router::new().route("/cleanup", get(cleanup).post(cleanup))
}
