//! Scheduler entry point.

use axum::extract::State;
use axum::Json;

use avgpay_jobs::CronSummary;

use crate::auth::RequireAuth;
use crate::error::ApiError;
use crate::state::AppState;

/// One sweep-and-process pass, bounded by the configured cron budget.
pub async fn run_enrichment(
    _auth: RequireAuth,
    State(state): State<AppState>,
) -> Result<Json<CronSummary>, ApiError> {
    Ok(Json(state.cron.run().await?))
}
