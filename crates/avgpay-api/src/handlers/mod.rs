//! Route handlers.

pub mod cron;
pub mod enrichment;

use axum::Json;
use serde_json::{json, Value as JsonValue};

/// Liveness check; no auth.
pub async fn health_check() -> Json<JsonValue> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
