use axum::{
    Json,
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_sessions::Session;

use super::{ApiError, ApiResponse, AppState, EmployeeDto};
use crate::db::STATUS_ACTIVE;

const SESSION_USER_KEY: &str = "user";

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: String,
}

// ============================================================================
// Middleware
// ============================================================================

/// Authentication middleware for dashboard routes. Accepts either:
/// 1. Session cookie (from login)
/// 2. `X-Auth-Code` header (machine credential of an active employee)
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    session: Session,
    request: Request,
    next: Next,
) -> Result<impl IntoResponse, ApiError> {
    if let Ok(Some(email)) = session.get::<String>(SESSION_USER_KEY).await {
        tracing::Span::current().record("user_id", &email);
        return Ok(next.run(request).await);
    }

    if let Some(code) = headers.get("X-Auth-Code").and_then(|v| v.to_str().ok())
        && let Ok(Some(user)) = state.store().verify_auth_code(code).await
    {
        tracing::Span::current().record("user_id", &user.email);
        return Ok(next.run(request).await);
    }

    let response = (StatusCode::UNAUTHORIZED, "Unauthorized");
    Ok(response.into_response())
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /auth/login
/// Authenticate with email and password; establishes a session on success.
pub async fn login(
    State(state): State<Arc<AppState>>,
    session: Session,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<ApiResponse<EmployeeDto>>, ApiError> {
    if payload.email.trim().is_empty() {
        return Err(ApiError::validation("Email is required"));
    }
    if payload.password.is_empty() {
        return Err(ApiError::validation("Password is required"));
    }

    let user = state
        .store()
        .get_user_by_email(&payload.email)
        .await
        .map_err(|e| ApiError::internal(format!("Authentication error: {e}")))?;

    let Some(user) = user else {
        return Err(ApiError::Unauthorized("Invalid credentials".to_string()));
    };

    let is_valid = state
        .store()
        .verify_user_password(&user.email, &payload.password)
        .await
        .map_err(|e| ApiError::internal(format!("Authentication error: {e}")))?;

    if !is_valid {
        return Err(ApiError::Unauthorized("Invalid credentials".to_string()));
    }

    if user.status != STATUS_ACTIVE {
        return Err(ApiError::Unauthorized("Account is suspended".to_string()));
    }

    if let Err(e) = session.insert(SESSION_USER_KEY, &user.email).await {
        return Err(ApiError::internal(format!("Failed to create session: {e}")));
    }

    tracing::info!("Login for {}", user.email);

    Ok(Json(ApiResponse::success(EmployeeDto::from(user))))
}

/// POST /auth/logout
/// Invalidate the current session
pub async fn logout(session: Session) -> impl IntoResponse {
    let _ = session.flush().await;
    (StatusCode::OK, "Logged out")
}

/// GET /auth/profile
/// Current user's profile (requires a session; not available to the
/// machine-credential path).
pub async fn profile(
    State(state): State<Arc<AppState>>,
    session: Session,
) -> Result<Json<ApiResponse<EmployeeDto>>, ApiError> {
    let email = session_email(&session).await?;

    let user = state
        .store()
        .get_user_by_email(&email)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to get user: {e}")))?
        .ok_or_else(|| ApiError::Unauthorized("User not found".to_string()))?;

    Ok(Json(ApiResponse::success(EmployeeDto::from(user))))
}

/// PUT /auth/password
/// Change password (requires current password verification)
pub async fn change_password(
    State(state): State<Arc<AppState>>,
    session: Session,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    let email = session_email(&session).await?;

    if payload.new_password.len() < 8 {
        return Err(ApiError::validation(
            "New password must be at least 8 characters",
        ));
    }

    if payload.current_password == payload.new_password {
        return Err(ApiError::validation(
            "New password must be different from current password",
        ));
    }

    let is_valid = state
        .store()
        .verify_user_password(&email, &payload.current_password)
        .await
        .map_err(|e| ApiError::internal(format!("Password verification error: {e}")))?;

    if !is_valid {
        return Err(ApiError::validation("Current password is incorrect"));
    }

    let security = state.config().read().await.security.clone();
    state
        .store()
        .update_user_password(&email, &payload.new_password, &security)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to update password: {e}")))?;

    tracing::info!("Password changed for {email}");

    Ok(Json(ApiResponse::success(MessageResponse {
        message: "Password updated successfully".to_string(),
    })))
}

// ============================================================================
// Helpers
// ============================================================================

async fn session_email(session: &Session) -> Result<String, ApiError> {
    session
        .get::<String>(SESSION_USER_KEY)
        .await
        .map_err(|e| ApiError::internal(format!("Session error: {e}")))?
        .ok_or_else(|| ApiError::Unauthorized("Not authenticated".to_string()))
}
