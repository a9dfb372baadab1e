use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
};
use tracing::warn;

use crate::db::Repository;
use crate::server::AppState;

pub async fn banner_handler(State(state): State<AppState>) -> String {
    format!("{} server is running", state.config.server_name)
}

pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state.db.ping().await {
        Ok(()) => (
            StatusCode::OK,
            [(header::CACHE_CONTROL, "no-cache, no-store")],
            "Healthy",
        ),
        Err(e) => {
            warn!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [(header::CACHE_CONTROL, "no-cache, no-store")],
                "Unhealthy",
            )
        }
    }
}
