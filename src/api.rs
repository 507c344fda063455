//! HTTP endpoints: health and store snapshot management.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;
use crate::store::StoreSnapshot;
use crate::ws;

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub connections: usize,
    pub messages: u64,
}

/// Build the full application router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/health", get(health))
        .route("/api/state/export", get(export_state))
        .route("/api/state/import", post(import_state))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health
pub async fn health(State(state): State<Arc<AppState>>) -> Response {
    match state.chat.stats().await {
        Ok(stats) => Json(HealthResponse {
            status: "ok".to_string(),
            connections: stats.connections,
            messages: stats.messages,
        })
        .into_response(),
        Err(e) => {
            tracing::error!("Health check failed: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response()
        }
    }
}

/// Export every store table as JSON.
///
/// GET /api/state/export
pub async fn export_state(State(state): State<Arc<AppState>>) -> Json<StoreSnapshot> {
    Json(state.store.export().await)
}

/// Replace every store table with an uploaded snapshot.
///
/// POST /api/state/import
pub async fn import_state(
    State(state): State<Arc<AppState>>,
    Json(snapshot): Json<StoreSnapshot>,
) -> Response {
    match state.import_snapshot(snapshot).await {
        Ok(()) => (StatusCode::OK, "State imported successfully").into_response(),
        Err(e) => {
            tracing::error!("State import failed: {}", e);
            (StatusCode::BAD_REQUEST, format!("Import failed: {}", e)).into_response()
        }
    }
}
