use serde::{Deserialize, Serialize};

use crate::db::Employee;
use crate::entities::search_history;

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub const fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// One row of the search history table, shaped for the dashboard.
#[derive(Debug, Serialize)]
pub struct SearchRecordDto {
    pub search_id: i32,
    pub search_query: String,
    pub city: Option<String>,
    pub state: Option<String>,
    pub region: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub search_count: i32,
    pub first_searched: String,
    pub last_searched: String,
    pub user_type: String,
    pub category: String,
    pub is_successful: bool,
}

impl From<search_history::Model> for SearchRecordDto {
    fn from(model: search_history::Model) -> Self {
        Self {
            search_id: model.id,
            search_query: model.query,
            city: model.city,
            state: model.state,
            region: model.region,
            latitude: model.latitude,
            longitude: model.longitude,
            search_count: model.search_count,
            first_searched: model.first_searched,
            last_searched: model.last_searched,
            user_type: model.user_type,
            category: model.category,
            is_successful: model.is_successful,
        }
    }
}

/// Employee profile without credentials; used by list/get/update responses.
#[derive(Debug, Serialize)]
pub struct EmployeeDto {
    pub id: i32,
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub employee_id: String,
    pub designation: String,
    pub department: String,
    pub manager: String,
    pub approver: String,
    pub role: String,
    pub status: String,
    pub needs_password_change: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Employee> for EmployeeDto {
    fn from(employee: Employee) -> Self {
        Self {
            id: employee.id,
            full_name: employee.full_name,
            email: employee.email,
            phone: employee.phone,
            employee_id: employee.employee_id,
            designation: employee.designation,
            department: employee.department,
            manager: employee.manager,
            approver: employee.approver,
            role: employee.role,
            status: employee.status,
            needs_password_change: employee.needs_password_change,
            created_at: employee.created_at,
            updated_at: employee.updated_at,
        }
    }
}

/// Creation response: profile plus the credentials issued exactly once.
#[derive(Debug, Serialize)]
pub struct IssuedCredentialsDto {
    #[serde(flatten)]
    pub employee: EmployeeDto,
    pub pin: String,
    pub auth_code: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateEmployeeRequest {
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub designation: String,
    pub department: String,
    #[serde(default)]
    pub manager: String,
    #[serde(default)]
    pub approver: String,
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct UpdateEmployeeRequest {
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub designation: Option<String>,
    pub department: Option<String>,
    pub manager: Option<String>,
    pub approver: Option<String>,
    pub role: Option<String>,
}
