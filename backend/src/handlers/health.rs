//! Health check handler

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub database: &'static str,
    /// Whether the image directory exists yet; it is created on first upload
    pub media_root: &'static str,
}

/// Reports 503 when the database is unreachable
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let database_ok = sqlx::query("SELECT 1").execute(&state.db).await.is_ok();
    let media_root = match tokio::fs::metadata(&state.config.media.root).await {
        Ok(meta) if meta.is_dir() => "present",
        _ => "missing",
    };

    let (status, code) = if database_ok {
        ("healthy", StatusCode::OK)
    } else {
        tracing::warn!("Health check could not reach the database");
        ("degraded", StatusCode::SERVICE_UNAVAILABLE)
    };

    (
        code,
        Json(HealthResponse {
            status,
            version: env!("CARGO_PKG_VERSION"),
            database: if database_ok { "connected" } else { "disconnected" },
            media_root,
        }),
    )
}
