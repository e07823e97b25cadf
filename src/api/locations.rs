//! Location search surface: suggestions for the rider-facing app and the
//! analytics endpoints behind the dashboard.
//!
//! Response shapes here are consumed directly by the dashboard widgets, so
//! they are plain payloads rather than the `ApiResponse` envelope the rest
//! of the API uses. Read endpoints degrade to empty payloads on persistence
//! failure; only a missing provider credential surfaces as a 500, since that
//! is an operator mistake that must not hide behind empty results.

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;

use super::{AppState, SearchRecordDto};
use crate::db::repositories::settings::{GEOCODING_API_KEY_KEY, GEOCODING_ENABLED_KEY};
use crate::services::locations::{
    AccuracyReport, LocationsError, PageInfo, PopularQuery, Suggestion, TrendPoint,
};

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub query: String,
}

#[derive(Debug, Serialize)]
pub struct SuggestionsResponse {
    pub suggestions: Vec<Suggestion>,
}

#[derive(Debug, Serialize)]
struct SuggestionsError {
    error: String,
    suggestions: Vec<Suggestion>,
}

/// GET /locations/search?query=
pub async fn search(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> Response {
    match state.locations().suggest(&params.query).await {
        Ok(suggestions) => (StatusCode::OK, Json(SuggestionsResponse { suggestions })).into_response(),
        Err(LocationsError::MissingCredential) => {
            error!("Location search rejected: geocoding API key missing");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(SuggestionsError {
                    error: "Configuration error: geocoding API key missing".to_string(),
                    suggestions: Vec::new(),
                }),
            )
                .into_response()
        }
        Err(LocationsError::Database(e)) => {
            error!("Location search failed: {e:#}");
            (
                StatusCode::OK,
                Json(SuggestionsResponse {
                    suggestions: Vec::new(),
                }),
            )
                .into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    #[serde(default = "default_sort")]
    pub sort: String,
    #[serde(default = "default_desc")]
    pub desc: bool,
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_page_size", rename = "pageSize")]
    pub page_size: u64,
}

fn default_sort() -> String {
    "last_searched".to_string()
}

const fn default_desc() -> bool {
    true
}

const fn default_page() -> u64 {
    1
}

const fn default_page_size() -> u64 {
    20
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub data: Vec<SearchRecordDto>,
    pub pagination: PageInfo,
}

/// GET /locations/history?sort=&desc=&page=&pageSize=
pub async fn history(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HistoryParams>,
) -> Response {
    match state
        .locations()
        .history(&params.sort, params.desc, params.page, params.page_size)
        .await
    {
        Ok((items, pagination)) => Json(HistoryResponse {
            data: items.into_iter().map(SearchRecordDto::from).collect(),
            pagination,
        })
        .into_response(),
        Err(e) => {
            error!("Failed to fetch search history: {e:#}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "Failed to fetch search history" })),
            )
                .into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PopularParams {
    #[serde(default = "default_popular_limit")]
    pub limit: u64,
}

const fn default_popular_limit() -> u64 {
    10
}

/// GET /locations/popular?limit=
pub async fn popular(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PopularParams>,
) -> Response {
    let limit = params.limit.clamp(1, 100);

    match state.locations().popular(limit).await {
        Ok(rows) => Json(rows).into_response(),
        Err(e) => {
            error!("Failed to fetch popular searches: {e:#}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(Vec::<PopularQuery>::new()),
            )
                .into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TrendsParams {
    #[serde(default = "default_range")]
    pub range: String,
}

fn default_range() -> String {
    "week".to_string()
}

/// GET /locations/trends?range=week|month|year
pub async fn trends(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TrendsParams>,
) -> Response {
    match state.locations().trends(&params.range).await {
        Ok(points) => Json(points).into_response(),
        Err(e) => {
            error!("Failed to fetch search trends: {e:#}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(Vec::<TrendPoint>::new()),
            )
                .into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AccuracyParams {
    #[serde(default = "default_accuracy_days")]
    pub days: i64,
}

const fn default_accuracy_days() -> i64 {
    7
}

/// GET /locations/accuracy?days=
///
/// Always answers 200: a dashboard tile prefers a zero-valued report over an
/// error state.
pub async fn accuracy(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AccuracyParams>,
) -> Json<AccuracyReport> {
    let days = params.days.clamp(1, 365);

    match state.locations().accuracy(days).await {
        Ok(report) => Json(report),
        Err(e) => {
            error!("Failed to compute search accuracy: {e:#}");
            Json(AccuracyReport::default())
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProviderSettingsResponse {
    pub enabled: bool,
    #[serde(rename = "apiKey")]
    pub api_key: String,
}

/// GET /locations/settings/google-api
pub async fn get_provider_settings(State(state): State<Arc<AppState>>) -> Json<ProviderSettingsResponse> {
    let store = state.store();

    let enabled = store.get_setting(GEOCODING_ENABLED_KEY).await;
    let api_key = store.get_setting(GEOCODING_API_KEY_KEY).await;

    match (enabled, api_key) {
        (Ok(enabled), Ok(api_key)) => Json(ProviderSettingsResponse {
            enabled: enabled.as_deref() == Some("true"),
            api_key: api_key.unwrap_or_default(),
        }),
        (enabled, api_key) => {
            if let Err(e) = enabled {
                error!("Failed to read provider toggle: {e:#}");
            }
            if let Err(e) = api_key {
                error!("Failed to read provider API key: {e:#}");
            }
            Json(ProviderSettingsResponse {
                enabled: false,
                api_key: String::new(),
            })
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateProviderSettingsRequest {
    pub enabled: bool,
    #[serde(rename = "apiKey", default)]
    pub api_key: Option<String>,
}

/// POST /locations/settings/google-api
pub async fn update_provider_settings(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<UpdateProviderSettingsRequest>,
) -> Response {
    let store = state.store();

    let result = async {
        store
            .set_setting(GEOCODING_ENABLED_KEY, if payload.enabled { "true" } else { "false" })
            .await?;

        // An absent or empty key leaves the stored credential untouched.
        if let Some(api_key) = payload.api_key.as_deref().filter(|k| !k.is_empty()) {
            store.set_setting(GEOCODING_API_KEY_KEY, api_key).await?;
        }

        anyhow::Ok(())
    }
    .await;

    match result {
        Ok(()) => Json(serde_json::json!({ "success": true })).into_response(),
        Err(e) => {
            error!("Failed to update provider settings: {e:#}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "Failed to update API settings" })),
            )
                .into_response()
        }
    }
}
