use axum::{Json, extract::State};
use serde::Serialize;
use std::sync::Arc;

use super::{ApiError, ApiResponse, AppState};
use crate::db::repositories::settings::GEOCODING_ENABLED_KEY;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: bool,
}

/// GET /system/health (public liveness probe)
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let database = state.store().ping().await.is_ok();

    Json(HealthResponse {
        status: if database { "ok" } else { "degraded" },
        database,
    })
}

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub version: String,
    pub uptime_seconds: u64,
    pub total_searches: u64,
    pub total_employees: u64,
    pub geocoding_enabled: bool,
}

/// GET /system/status
pub async fn status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<SystemStatus>>, ApiError> {
    let store = state.store();

    let total_searches = store
        .count_searches()
        .await
        .map_err(|e| ApiError::DatabaseError(e.to_string()))?;

    let total_employees = store
        .count_users()
        .await
        .map_err(|e| ApiError::DatabaseError(e.to_string()))?;

    let geocoding_enabled = store
        .get_setting(GEOCODING_ENABLED_KEY)
        .await
        .map(|v| v.as_deref() == Some("true"))
        .unwrap_or(false);

    Ok(Json(ApiResponse::success(SystemStatus {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        total_searches,
        total_employees,
        geocoding_enabled,
    })))
}
