// src/handlers.rs
use actix_web::{web, HttpResponse};
use uuid::Uuid;
use validator::Validate;
use std::sync::Arc;
use serde::{Serialize, Deserialize};
use chrono::Utc;

use crate::AppState;
use crate::error::{ApiError, ApiResult};
use crate::models::{Lab, User, UserRole};

// ==================== COMMON STRUCTURES ====================

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }

    pub fn success_with_message(data: T, message: String) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: Some(message),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
}

#[derive(Debug, Deserialize)]
pub struct PaginationQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub search: Option<String>,
    pub status: Option<String>,
    pub category: Option<String>,
    pub lab_id: Option<String>,
    pub role: Option<String>,
}

impl PaginationQuery {
    pub fn normalize(&self) -> (i64, i64, i64) {
        let page = self.page.unwrap_or(1).max(1);
        let per_page = self.per_page.unwrap_or(20).clamp(1, 100);
        let offset = (page - 1) * per_page;
        (page, per_page, offset)
    }
}

// ==================== LAB HANDLERS ====================

pub async fn get_all_labs(
    app_state: web::Data<Arc<AppState>>,
) -> ApiResult<HttpResponse> {
    let labs: Vec<Lab> = sqlx::query_as("SELECT * FROM labs ORDER BY name ASC")
        .fetch_all(&app_state.db_pool)
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(labs)))
}

pub async fn get_lab(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let lab_id = path.into_inner();

    let lab: Option<Lab> = sqlx::query_as("SELECT * FROM labs WHERE id = ?")
        .bind(&lab_id)
        .fetch_optional(&app_state.db_pool)
        .await?;

    match lab {
        Some(lab) => Ok(HttpResponse::Ok().json(ApiResponse::success(lab))),
        None => Err(ApiError::lab_not_found(&lab_id)),
    }
}

pub async fn create_lab(
    app_state: web::Data<Arc<AppState>>,
    lab: web::Json<crate::models::CreateLabRequest>,
) -> ApiResult<HttpResponse> {
    lab.validate()?;

    let id = Uuid::new_v4().to_string();
    let now = Utc::now();

    sqlx::query(
        r#"INSERT INTO labs (id, name, location, department, capacity, status, description, created_at, updated_at)
           VALUES (?, ?, ?, ?, ?, 'active', ?, ?, ?)"#,
    )
    .bind(&id)
    .bind(&lab.name)
    .bind(&lab.location)
    .bind(&lab.department)
    .bind(lab.capacity)
    .bind(&lab.description)
    .bind(&now)
    .bind(&now)
    .execute(&app_state.db_pool)
    .await?;

    let created: Lab = sqlx::query_as("SELECT * FROM labs WHERE id = ?")
        .bind(&id)
        .fetch_one(&app_state.db_pool)
        .await?;

    Ok(HttpResponse::Created().json(ApiResponse::success(created)))
}

#[derive(Debug, Deserialize, validator::Validate)]
pub struct UpdateLabRequest {
    #[validate(length(min = 1, max = 255, message = "Name must be between 1 and 255 characters"))]
    pub name: Option<String>,

    #[validate(length(max = 255, message = "Location cannot exceed 255 characters"))]
    pub location: Option<String>,

    #[validate(length(max = 255, message = "Department cannot exceed 255 characters"))]
    pub department: Option<String>,

    #[validate(range(min = 1, max = 1000, message = "Capacity must be between 1 and 1000"))]
    pub capacity: Option<i64>,

    pub status: Option<String>,

    #[validate(length(max = 1000, message = "Description cannot exceed 1000 characters"))]
    pub description: Option<String>,
}

pub async fn update_lab(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    update: web::Json<UpdateLabRequest>,
) -> ApiResult<HttpResponse> {
    update.validate()?;
    let lab_id = path.into_inner();

    let existing: Option<Lab> = sqlx::query_as("SELECT * FROM labs WHERE id = ?")
        .bind(&lab_id)
        .fetch_optional(&app_state.db_pool)
        .await?;

    if existing.is_none() {
        return Err(ApiError::lab_not_found(&lab_id));
    }

    if let Some(ref status) = update.status {
        if !crate::models::LabStatus::is_valid(status) {
            return Err(ApiError::invalid_status_value(
                "status",
                status,
                crate::models::LabStatus::all_values(),
            ));
        }
    }

    let mut updates = Vec::new();
    let mut values: Vec<String> = Vec::new();

    if let Some(ref name) = update.name {
        updates.push("name = ?");
        values.push(name.clone());
    }
    if let Some(ref location) = update.location {
        updates.push("location = ?");
        values.push(location.clone());
    }
    if let Some(ref department) = update.department {
        updates.push("department = ?");
        values.push(department.clone());
    }
    if let Some(capacity) = update.capacity {
        updates.push("capacity = ?");
        values.push(capacity.to_string());
    }
    if let Some(ref status) = update.status {
        updates.push("status = ?");
        values.push(status.clone());
    }
    if let Some(ref description) = update.description {
        updates.push("description = ?");
        values.push(description.clone());
    }

    if updates.is_empty() {
        return Err(ApiError::bad_request("No fields to update"));
    }

    updates.push("updated_at = ?");
    values.push(Utc::now().to_rfc3339());

    let sql = format!("UPDATE labs SET {} WHERE id = ?", updates.join(", "));

    let mut query = sqlx::query(&sql);
    for value in &values {
        query = query.bind(value);
    }
    query = query.bind(&lab_id);
    query.execute(&app_state.db_pool).await?;

    let updated: Lab = sqlx::query_as("SELECT * FROM labs WHERE id = ?")
        .bind(&lab_id)
        .fetch_one(&app_state.db_pool)
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(updated)))
}

pub async fn delete_lab(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let lab_id = path.into_inner();

    let result = sqlx::query("DELETE FROM labs WHERE id = ?")
        .bind(&lab_id)
        .execute(&app_state.db_pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::lab_not_found(&lab_id));
    }

    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        (),
        "Lab deleted successfully".to_string(),
    )))
}

// ==================== USER HANDLERS ====================

pub async fn get_users(
    app_state: web::Data<Arc<AppState>>,
    query: web::Query<PaginationQuery>,
) -> ApiResult<HttpResponse> {
    let (page, per_page, offset) = query.normalize();

    let (total, users): (i64, Vec<User>) = if let Some(ref role) = query.role {
        if !UserRole::is_valid(role) {
            return Err(ApiError::invalid_status_value("role", role, UserRole::all_values()));
        }

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE role = ?")
            .bind(role)
            .fetch_one(&app_state.db_pool)
            .await?;
        let users: Vec<User> = sqlx::query_as(
            "SELECT * FROM users WHERE role = ? ORDER BY name ASC LIMIT ? OFFSET ?",
        )
        .bind(role)
        .bind(per_page)
        .bind(offset)
        .fetch_all(&app_state.db_pool)
        .await?;
        (total, users)
    } else {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&app_state.db_pool)
            .await?;
        let users: Vec<User> = sqlx::query_as(
            "SELECT * FROM users ORDER BY name ASC LIMIT ? OFFSET ?",
        )
        .bind(per_page)
        .bind(offset)
        .fetch_all(&app_state.db_pool)
        .await?;
        (total, users)
    };

    let total_pages = (total + per_page - 1) / per_page;

    Ok(HttpResponse::Ok().json(ApiResponse::success(PaginatedResponse {
        data: users,
        total,
        page,
        per_page,
        total_pages,
    })))
}

pub async fn get_user(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let user_id = path.into_inner();

    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(&user_id)
        .fetch_optional(&app_state.db_pool)
        .await?;

    match user {
        Some(user) => Ok(HttpResponse::Ok().json(ApiResponse::success(user))),
        None => Err(ApiError::user_not_found(&user_id)),
    }
}

pub async fn create_user(
    app_state: web::Data<Arc<AppState>>,
    user: web::Json<crate::models::CreateUserRequest>,
) -> ApiResult<HttpResponse> {
    user.validate()?;

    if !UserRole::is_valid(&user.role) {
        return Err(ApiError::invalid_status_value("role", &user.role, UserRole::all_values()));
    }

    let existing: Option<String> = sqlx::query_scalar("SELECT id FROM users WHERE email = ?")
        .bind(&user.email)
        .fetch_optional(&app_state.db_pool)
        .await?;

    if existing.is_some() {
        return Err(ApiError::Conflict(format!(
            "User with email '{}' already exists",
            user.email
        )));
    }

    let id = Uuid::new_v4().to_string();
    let now = Utc::now();

    sqlx::query(
        r#"INSERT INTO users (id, name, email, role, department, student_id, created_at, updated_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&id)
    .bind(&user.name)
    .bind(&user.email)
    .bind(&user.role)
    .bind(&user.department)
    .bind(&user.student_id)
    .bind(&now)
    .bind(&now)
    .execute(&app_state.db_pool)
    .await?;

    let created: User = sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(&id)
        .fetch_one(&app_state.db_pool)
        .await?;

    log::info!("Created user {} ({})", created.name, created.role);

    Ok(HttpResponse::Created().json(ApiResponse::success(created)))
}

// ==================== TESTS ====================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_normalize() {
        let query = PaginationQuery {
            page: None,
            per_page: None,
            search: None,
            status: None,
            category: None,
            lab_id: None,
            role: None,
        };
        assert_eq!(query.normalize(), (1, 20, 0));

        let query = PaginationQuery {
            page: Some(3),
            per_page: Some(50),
            search: None,
            status: None,
            category: None,
            lab_id: None,
            role: None,
        };
        assert_eq!(query.normalize(), (3, 50, 100));

        // Выход за границы прижимается к допустимым значениям
        let query = PaginationQuery {
            page: Some(-1),
            per_page: Some(100_000),
            search: None,
            status: None,
            category: None,
            lab_id: None,
            role: None,
        };
        assert_eq!(query.normalize(), (1, 100, 0));
    }

    #[test]
    fn test_api_response_builders() {
        let response = ApiResponse::success(42);
        assert!(response.success);
        assert_eq!(response.data, Some(42));
        assert!(response.message.is_none());

        let response = ApiResponse::success_with_message((), "done".to_string());
        assert_eq!(response.message.as_deref(), Some("done"));
    }
}
