// src/api/health.rs
// Health/liveness probes, grounded on `api::http::health`: probe each
// dependency independently, report per-dependency status, 200 if all
// healthy else 503.

use crate::state::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    outbox_store: &'static str,
    search_index: &'static str,
}

/// GET /healthz — checks the outbox store connection and the search index.
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let db_ok = sqlx::query("SELECT 1").fetch_one(&state.db_pool).await.is_ok();
    let index_ok = state
        .index
        .latest_context("__healthcheck__", "__healthcheck__")
        .await
        .is_ok();

    let response = HealthResponse {
        status: if db_ok && index_ok { "healthy" } else { "unhealthy" },
        outbox_store: if db_ok { "ok" } else { "error" },
        search_index: if index_ok { "ok" } else { "error" },
    };

    if db_ok && index_ok {
        (StatusCode::OK, Json(response))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(response))
    }
}

/// GET /livez — trivial liveness probe.
pub async fn liveness_check() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "alive" })))
}
