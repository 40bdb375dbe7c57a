//! Health check endpoint.

use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub message: &'static str,
    pub version: &'static str,
    pub timestamp: DateTime<Utc>,
}

/// `GET /api/health`: liveness check.
pub async fn check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        message: "HealthVault API is running",
        version: crate::config::APP_VERSION,
        timestamp: Utc::now(),
    })
}
