//! `/api/enrichment/*` handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use tracing::info;
use uuid::Uuid;

use avgpay_core::defaults::{RECENT_JOBS_LIMIT, RECENT_JOBS_MAX, RECOVERY_BATCH_LIMIT};
use avgpay_core::{EntityCoverage, EntityType, JobView, QueueStats};
use avgpay_jobs::{BackfillSummary, ProcessAllSummary, ProcessOutcome};

use crate::auth::RequireAuth;
use crate::error::ApiError;
use crate::state::AppState;

fn parse_entity_type(raw: &str) -> Result<EntityType, ApiError> {
    raw.parse::<EntityType>().map_err(ApiError::from)
}

fn parse_entity_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::BadRequest(format!("invalid entity id '{}'", raw)))
}

fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    body.map(|Json(v)| v)
        .map_err(|e| ApiError::BadRequest(e.body_text()))
}

// ─── Queue ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueRequest {
    pub entity_type: String,
    pub entity_id: String,
    pub entity_name: String,
    #[serde(default)]
    pub context: Option<JsonValue>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueResponse {
    pub job_id: Option<Uuid>,
    pub queued: bool,
}

pub async fn queue_enrichment(
    _auth: RequireAuth,
    State(state): State<AppState>,
    body: Result<Json<QueueRequest>, JsonRejection>,
) -> Result<Json<QueueResponse>, ApiError> {
    let req = json_body(body)?;
    let entity_type = parse_entity_type(&req.entity_type)?;
    let entity_id = parse_entity_id(&req.entity_id)?;
    let entity_name = req.entity_name.trim();
    if entity_name.is_empty() {
        return Err(ApiError::BadRequest("entityName must not be empty".to_string()));
    }

    let job_id = state
        .queue
        .queue_enrichment(entity_type, entity_id, entity_name, req.context)
        .await?;

    Ok(Json(QueueResponse {
        job_id,
        queued: job_id.is_some(),
    }))
}

// ─── Status and diagnostics ────────────────────────────────────────────────

pub async fn get_status(
    _auth: RequireAuth,
    State(state): State<AppState>,
    Path((entity_type, entity_id)): Path<(String, String)>,
) -> Result<Json<Option<JobView>>, ApiError> {
    let entity_type = parse_entity_type(&entity_type)?;
    let entity_id = parse_entity_id(&entity_id)?;
    let job = state.queue.get_status(entity_type, entity_id).await?;
    Ok(Json(job.map(JobView::from)))
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<i64>,
}

pub async fn recent_jobs(
    _auth: RequireAuth,
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<JobView>>, ApiError> {
    let limit = query
        .limit
        .unwrap_or(RECENT_JOBS_LIMIT)
        .clamp(1, RECENT_JOBS_MAX);
    let jobs = state.queue.list_recent(limit).await?;
    Ok(Json(jobs.into_iter().map(JobView::from).collect()))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub queue: QueueStats,
    pub coverage: Vec<EntityCoverage>,
}

pub async fn enrichment_health(
    _auth: RequireAuth,
    State(state): State<AppState>,
) -> Result<Json<HealthResponse>, ApiError> {
    let queue = state.queue.queue_stats().await?;
    let mut coverage = Vec::with_capacity(EntityType::ALL.len());
    for entity_type in EntityType::ALL {
        coverage.push(state.entities.coverage(entity_type).await?);
    }
    Ok(Json(HealthResponse { queue, coverage }))
}

// ─── Processing ────────────────────────────────────────────────────────────

pub async fn process_next(
    _auth: RequireAuth,
    State(state): State<AppState>,
) -> Result<Json<ProcessOutcome>, ApiError> {
    Ok(Json(state.processor.process_next().await?))
}

pub async fn process_all(
    _auth: RequireAuth,
    State(state): State<AppState>,
) -> Result<Json<ProcessAllSummary>, ApiError> {
    Ok(Json(state.processor.process_all(None).await?))
}

pub async fn recover_failed(
    _auth: RequireAuth,
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<JsonValue>, ApiError> {
    let limit = query.limit.unwrap_or(RECOVERY_BATCH_LIMIT);
    let recovered = state.sweeper.recover_failed(limit).await?;
    Ok(Json(json!({ "recovered": recovered })))
}

pub async fn backfill(
    _auth: RequireAuth,
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<BackfillSummary>, ApiError> {
    let ceiling = query.limit.unwrap_or(state.config.backfill_ceiling);
    Ok(Json(state.backfill.run(ceiling).await?))
}

// ─── Trigger ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerRequest {
    pub entity_type: String,
    pub entity_id: String,
    #[serde(default)]
    pub source: Option<String>,
}

/// Evaluate an entity in the background and queue it when its analysis
/// needs refreshing. Responds before the evaluation finishes.
pub async fn trigger(
    _auth: RequireAuth,
    State(state): State<AppState>,
    body: Result<Json<TriggerRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<JsonValue>), ApiError> {
    let req = json_body(body)?;
    let entity_type = parse_entity_type(&req.entity_type)?;
    let entity_id = parse_entity_id(&req.entity_id)?;
    let source = req.source.as_deref().unwrap_or("api");

    info!(
        subsystem = "api",
        source,
        entity_type = %entity_type,
        entity_id = %entity_id,
        "Enrichment trigger accepted"
    );
    // Detached; the handle is not awaited.
    let _ = state
        .trigger
        .trigger_opportunistic(source, entity_type, entity_id);

    Ok((StatusCode::ACCEPTED, Json(json!({ "accepted": true }))))
}
