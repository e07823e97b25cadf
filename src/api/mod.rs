use axum::{
    Router,
    http::HeaderValue,
    middleware,
    routing::{delete, get, post, put},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer};

use time;

use crate::clients::geocode::GoogleGeocodeClient;
use crate::config::Config;
use crate::db::Store;
use crate::services::LocationSearchService;

pub mod auth;
mod employees;
mod error;
mod locations;
mod observability;
mod system;
mod types;

pub use error::ApiError;
pub use types::*;

use metrics_exporter_prometheus::PrometheusHandle;
use tokio::sync::RwLock;

pub struct AppState {
    pub config: Arc<RwLock<Config>>,

    pub store: Store,

    pub locations: Arc<LocationSearchService>,

    pub start_time: std::time::Instant,

    pub prometheus_handle: Option<PrometheusHandle>,
}

impl AppState {
    #[must_use]
    pub fn config(&self) -> &Arc<RwLock<Config>> {
        &self.config
    }

    #[must_use]
    pub fn store(&self) -> &Store {
        &self.store
    }

    #[must_use]
    pub fn locations(&self) -> &Arc<LocationSearchService> {
        &self.locations
    }
}

pub async fn create_app_state(
    config: Config,
    prometheus_handle: Option<PrometheusHandle>,
) -> anyhow::Result<Arc<AppState>> {
    let store = Store::with_pool_options(
        &config.general.database_path,
        config.general.max_db_connections,
        config.general.min_db_connections,
    )
    .await?;

    let geocode_client = GoogleGeocodeClient::new(
        &config.geocoding.base_url,
        std::time::Duration::from_secs(config.geocoding.timeout_seconds),
    )
    .map_err(|e| anyhow::anyhow!("Failed to build geocoding client: {e}"))?;

    let locations = Arc::new(LocationSearchService::new(
        store.clone(),
        Arc::new(geocode_client),
        config.geocoding.clone(),
    ));

    Ok(Arc::new(AppState {
        config: Arc::new(RwLock::new(config)),
        store,
        locations,
        start_time: std::time::Instant::now(),
        prometheus_handle,
    }))
}

pub async fn router(state: Arc<AppState>) -> Router {
    let (cors_origins, session_expiry_minutes) = {
        let config = state.config().read().await;
        (
            config.server.cors_allowed_origins.clone(),
            config.server.session_expiry_minutes,
        )
    };

    let protected_routes = create_protected_router(state.clone());

    let session_store = MemoryStore::default();
    let session_layer = SessionManagerLayer::new(session_store)
        .with_secure(false)
        .with_same_site(tower_sessions::cookie::SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::minutes(
            session_expiry_minutes,
        )));

    let api_router = Router::new()
        .merge(protected_routes)
        .route("/locations/search", get(locations::search))
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout))
        .route("/system/health", get(system::health))
        .layer(session_layer)
        .with_state(state.clone());

    let cors_layer = if cors_origins.contains(&"*".to_string()) {
        CorsLayer::new().allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> =
            cors_origins.iter().filter_map(|s| s.parse().ok()).collect();
        CorsLayer::new().allow_origin(origins)
    };

    Router::new()
        .nest("/api", api_router)
        .layer(cors_layer.allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(observability::track_requests))
}

fn create_protected_router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/profile", get(auth::profile))
        .route("/auth/password", put(auth::change_password))
        .route("/locations/history", get(locations::history))
        .route("/locations/popular", get(locations::popular))
        .route("/locations/trends", get(locations::trends))
        .route("/locations/accuracy", get(locations::accuracy))
        .route(
            "/locations/settings/google-api",
            get(locations::get_provider_settings),
        )
        .route(
            "/locations/settings/google-api",
            post(locations::update_provider_settings),
        )
        .route("/employees", get(employees::list_employees))
        .route("/employees", post(employees::create_employee))
        .route("/employees/{id}", get(employees::get_employee))
        .route("/employees/{id}", put(employees::update_employee))
        .route("/employees/{id}", delete(employees::remove_employee))
        .route("/employees/{id}/suspend", post(employees::suspend_employee))
        .route(
            "/employees/{id}/activate",
            post(employees::activate_employee),
        )
        .route("/system/status", get(system::status))
        .route("/metrics", get(observability::get_metrics))
        .route_layer(middleware::from_fn_with_state(state, auth::auth_middleware))
}
