//! Health check and service banner
//!
//! Mounted at the server root, outside the API base path.

use axum::{response::IntoResponse, routing::get, Json, Router};
use serde_json::json;

use crate::http::AppState;

pub fn create_health_router() -> Router<AppState> {
    Router::new()
        .route("/", get(banner))
        .route("/health", get(health_check))
}

/// Basic health check (always healthy if the server is running)
pub async fn health_check() -> impl IntoResponse {
    Json(json!({ "status": "healthy" }))
}

async fn banner() -> impl IntoResponse {
    Json(json!({
        "message": "spiderhub: TVBox spider aggregation service",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
