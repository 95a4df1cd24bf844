// src/api/http.rs
// The one wire endpoint in scope (spec.md §6), grounded on
// `api::http::auth`'s router + handler + IntoResponse pattern.

use super::health;
use crate::error::{CoreError, CoreResult};
use crate::search::request::SearchRequest;
use crate::search::response::SearchResponse;
use crate::state::AppState;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v0/search", post(search_handler))
        .route("/healthz", get(health::health_check))
        .route("/livez", get(health::liveness_check))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(std::time::Duration::from_secs(30)))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn bearer_token(headers: &HeaderMap) -> CoreResult<String> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
        .ok_or_else(|| CoreError::unauthorized("missing or malformed Authorization header"))
}

async fn search_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<SearchRequest>,
) -> Response {
    match handle_search(state, headers, request).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn handle_search(
    state: Arc<AppState>,
    headers: HeaderMap,
    request: SearchRequest,
) -> CoreResult<SearchResponse> {
    let token = bearer_token(&headers)?;
    state.search_service.search(&token, request).await
}
