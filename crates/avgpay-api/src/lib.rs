//! # avgpay-api
//!
//! HTTP surface of the enrichment service: queue and status routes, manual
//! processing and recovery, backfill, coverage health, and the cron entry
//! point called by the external scheduler.

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod state;

use axum::routing::{get, post};
use axum::Router;
use tower_http::request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

pub use config::AppConfig;
pub use error::ApiError;
pub use state::AppState;

use handlers::{cron, enrichment, health_check};

/// Request IDs are UUIDv7 so they sort by arrival time in log queries.
#[derive(Clone, Default)]
struct MakeRequestUuidV7;

impl MakeRequestId for MakeRequestUuidV7 {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        let id = Uuid::now_v7().to_string().parse().ok()?;
        Some(RequestId::new(id))
    }
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        // Enrichment queue
        .route("/api/enrichment/queue", post(enrichment::queue_enrichment))
        .route(
            "/api/enrichment/status/:entity_type/:entity_id",
            get(enrichment::get_status),
        )
        .route("/api/enrichment/jobs", get(enrichment::recent_jobs))
        .route("/api/enrichment/health", get(enrichment::enrichment_health))
        // Processing
        .route("/api/enrichment/process", post(enrichment::process_next))
        .route("/api/enrichment/process-all", post(enrichment::process_all))
        .route("/api/enrichment/recover", post(enrichment::recover_failed))
        .route("/api/enrichment/backfill", post(enrichment::backfill))
        .route("/api/enrichment/trigger", post(enrichment::trigger))
        // Scheduler
        .route(
            "/api/cron/enrichment",
            get(cron::run_enrichment).post(cron::run_enrichment),
        )
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV7))
        .with_state(state)
}
