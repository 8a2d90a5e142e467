//! HTTP API
//!
//! REST endpoints over the refresh pipeline and the cache.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use std::any::Any;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any as AnyOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use super::types::*;
use super::AppState;
use crate::pipeline::RefreshError;
use crate::types::{now_iso, HealthState, TransformedBatch};

/// Create the API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    let router = Router::new()
        .route("/api/data", get(get_data))
        .route("/api/refresh", get(refresh_data))
        .route("/api/health", get(get_health))
        .fallback(not_found)
        .with_state(state);

    with_layers(router)
}

/// Panic catching, request tracing and CORS for the frontend
fn with_layers(router: Router) -> Router {
    router
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(AnyOrigin)
                .allow_methods(AnyOrigin)
                .allow_headers(AnyOrigin),
        )
}

// ─────────────────────────────────────────────────────────────────
// API Handlers
// ─────────────────────────────────────────────────────────────────

/// GET /api/data - Latest batch and counters
async fn get_data(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.cache().snapshot().await;
    Json(DataResponse::from(snapshot))
}

/// GET /api/refresh - Fetch, transform and cache a new batch
async fn refresh_data(State(state): State<AppState>) -> impl IntoResponse {
    let (status, body) = refresh_outcome(state.refresher().refresh().await);
    (status, Json(body))
}

/// Fetch failures get a fixed message; anything else reports its own text
fn refresh_outcome(result: Result<TransformedBatch, RefreshError>) -> (StatusCode, RefreshResponse) {
    match result {
        Ok(batch) => (StatusCode::OK, RefreshResponse::success(batch)),
        Err(RefreshError::Fetch(_)) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            RefreshResponse::error(FETCH_FAILED_MESSAGE),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            RefreshResponse::error(e.to_string()),
        ),
    }
}

/// GET /api/health - Ingester and cache health. Always 200.
async fn get_health(State(state): State<AppState>) -> impl IntoResponse {
    let ingester = state.refresher().source().status().await;
    let cache = state.cache().snapshot().await;

    let status = if ingester.is_healthy() {
        HealthState::Healthy
    } else {
        HealthState::Degraded
    };

    Json(HealthResponse {
        status,
        timestamp: now_iso(),
        ingester,
        cache: CacheHealth::from(cache),
    })
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(ErrorResponse::new("Not found")))
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    tracing::error!(panic = %detail, "Internal server error");

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::new("Internal server error")),
    )
        .into_response()
}
