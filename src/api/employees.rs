use axum::{
    Json,
    extract::{Path, State},
};
use std::sync::Arc;

use super::{
    ApiError, ApiResponse, AppState, CreateEmployeeRequest, EmployeeDto, IssuedCredentialsDto,
    UpdateEmployeeRequest,
};
use crate::db::{EmployeePatch, NewEmployee, STATUS_ACTIVE, STATUS_SUSPENDED};

/// Initial password for newly created accounts; rotation is forced on first
/// login.
const DEFAULT_EMPLOYEE_PASSWORD: &str = "Admin@123";

/// GET /employees
pub async fn list_employees(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Vec<EmployeeDto>>>, ApiError> {
    let employees = state
        .store()
        .list_users()
        .await
        .map_err(|e| ApiError::DatabaseError(e.to_string()))?;

    Ok(Json(ApiResponse::success(
        employees.into_iter().map(EmployeeDto::from).collect(),
    )))
}

/// POST /employees
///
/// Creates an account with a generated badge id, PIN and auth code. The
/// credentials are returned exactly once, in this response.
pub async fn create_employee(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateEmployeeRequest>,
) -> Result<Json<ApiResponse<IssuedCredentialsDto>>, ApiError> {
    for (value, label) in [
        (&payload.full_name, "Full name"),
        (&payload.email, "Email"),
        (&payload.phone, "Phone"),
        (&payload.designation, "Designation"),
        (&payload.department, "Department"),
    ] {
        if value.trim().is_empty() {
            return Err(ApiError::validation(format!("{label} is required")));
        }
    }

    if !payload.email.contains('@') {
        return Err(ApiError::validation("Email is not valid"));
    }

    let existing = state
        .store()
        .find_conflicting_user(
            &payload.email,
            &payload.full_name,
            &payload.department,
            &payload.designation,
        )
        .await
        .map_err(|e| ApiError::DatabaseError(e.to_string()))?;

    if let Some(existing) = existing {
        if existing.email == payload.email.trim().to_lowercase() {
            return Err(ApiError::conflict(
                "An employee with this email already exists",
            ));
        }
        return Err(ApiError::conflict(
            "An employee with the same name, department, and designation already exists. \
             Please add a distinguishing middle name or initial.",
        ));
    }

    let role = match payload.role.as_deref() {
        Some("admin") => "admin".to_string(),
        _ => "user".to_string(),
    };

    let new = NewEmployee {
        full_name: payload.full_name,
        email: payload.email,
        phone: payload.phone,
        designation: payload.designation,
        department: payload.department,
        manager: payload.manager,
        approver: payload.approver,
        role,
    };

    let security = state.config().read().await.security.clone();
    let created = state
        .store()
        .create_user(new, DEFAULT_EMPLOYEE_PASSWORD, &security)
        .await
        .map_err(|e| ApiError::DatabaseError(e.to_string()))?;

    tracing::info!("Created employee {} ({})", created.employee_id, created.email);

    let pin = created.pin.clone();
    let auth_code = created.auth_code.clone();

    Ok(Json(ApiResponse::success(IssuedCredentialsDto {
        employee: EmployeeDto::from(created),
        pin,
        auth_code,
    })))
}

/// GET /employees/{id}
pub async fn get_employee(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<EmployeeDto>>, ApiError> {
    let employee = state
        .store()
        .get_user_by_id(id)
        .await
        .map_err(|e| ApiError::DatabaseError(e.to_string()))?
        .ok_or_else(|| ApiError::employee_not_found(id))?;

    Ok(Json(ApiResponse::success(EmployeeDto::from(employee))))
}

/// PUT /employees/{id}
pub async fn update_employee(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateEmployeeRequest>,
) -> Result<Json<ApiResponse<EmployeeDto>>, ApiError> {
    if let Some(role) = payload.role.as_deref()
        && role != "admin"
        && role != "user"
    {
        return Err(ApiError::validation("Role must be 'admin' or 'user'"));
    }

    let patch = EmployeePatch {
        full_name: payload.full_name,
        phone: payload.phone,
        designation: payload.designation,
        department: payload.department,
        manager: payload.manager,
        approver: payload.approver,
        role: payload.role,
    };

    let updated = state
        .store()
        .update_user(id, patch)
        .await
        .map_err(|e| ApiError::DatabaseError(e.to_string()))?
        .ok_or_else(|| ApiError::employee_not_found(id))?;

    Ok(Json(ApiResponse::success(EmployeeDto::from(updated))))
}

/// POST /employees/{id}/suspend
pub async fn suspend_employee(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<EmployeeDto>>, ApiError> {
    set_status(&state, id, STATUS_SUSPENDED).await
}

/// POST /employees/{id}/activate
pub async fn activate_employee(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<EmployeeDto>>, ApiError> {
    set_status(&state, id, STATUS_ACTIVE).await
}

/// DELETE /employees/{id}
pub async fn remove_employee(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let removed = state
        .store()
        .remove_user(id)
        .await
        .map_err(|e| ApiError::DatabaseError(e.to_string()))?;

    if !removed {
        return Err(ApiError::employee_not_found(id));
    }

    tracing::info!("Removed employee {id}");

    Ok(Json(ApiResponse::success(
        serde_json::json!({ "deleted": true }),
    )))
}

async fn set_status(
    state: &Arc<AppState>,
    id: i32,
    status: &str,
) -> Result<Json<ApiResponse<EmployeeDto>>, ApiError> {
    let updated = state
        .store()
        .set_user_status(id, status)
        .await
        .map_err(|e| ApiError::DatabaseError(e.to_string()))?
        .ok_or_else(|| ApiError::employee_not_found(id))?;

    tracing::info!("Employee {} is now {}", updated.employee_id, updated.status);

    Ok(Json(ApiResponse::success(EmployeeDto::from(updated))))
}
