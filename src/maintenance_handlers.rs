// src/maintenance_handlers.rs
//! Обработчики записей обслуживания
//!
//! Планирование и учет обслуживания оборудования: создание, обновление,
//! завершение с фиксацией фактической стоимости.

use actix_web::{web, HttpResponse};
use std::sync::Arc;
use chrono::Utc;
use uuid::Uuid;
use validator::Validate;

use crate::AppState;
use crate::models::*;
use crate::error::{validate_cost, ApiError, ApiResult};
use crate::equipment_handlers::check_equipment_exists;
use crate::handlers::{ApiResponse, PaginatedResponse, PaginationQuery};

// ==================== CRUD ====================

/// Список записей обслуживания с фильтрами по статусу и категории работ
pub async fn get_maintenance_records(
    app_state: web::Data<Arc<AppState>>,
    query: web::Query<PaginationQuery>,
) -> ApiResult<HttpResponse> {
    let (page, per_page, offset) = query.normalize();

    let mut conditions: Vec<&str> = Vec::new();
    let mut params: Vec<String> = Vec::new();

    if let Some(ref status) = query.status {
        if !MaintenanceStatus::is_valid(status) {
            return Err(ApiError::invalid_status_value(
                "status",
                status,
                MaintenanceStatus::all_values(),
            ));
        }
        conditions.push("status = ?");
        params.push(status.clone());
    }
    if let Some(ref category) = query.category {
        if !MaintenanceType::is_valid(category) {
            return Err(ApiError::invalid_status_value(
                "maintenance type",
                category,
                MaintenanceType::all_values(),
            ));
        }
        conditions.push("maintenance_type = ?");
        params.push(category.clone());
    }

    let clause = if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    };

    let count_sql = format!("SELECT COUNT(*) FROM maintenance_records{}", clause);
    let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
    for param in &params {
        count_query = count_query.bind(param);
    }
    let total: i64 = count_query.fetch_one(&app_state.db_pool).await?;

    let data_sql = format!(
        "SELECT * FROM maintenance_records{} ORDER BY scheduled_date DESC LIMIT ? OFFSET ?",
        clause
    );
    let mut data_query = sqlx::query_as::<_, MaintenanceRecord>(&data_sql);
    for param in &params {
        data_query = data_query.bind(param);
    }
    data_query = data_query.bind(per_page).bind(offset);
    let records = data_query.fetch_all(&app_state.db_pool).await?;

    let total_pages = (total + per_page - 1) / per_page;

    Ok(HttpResponse::Ok().json(ApiResponse::success(PaginatedResponse {
        data: records,
        total,
        page,
        per_page,
        total_pages,
    })))
}

pub async fn get_maintenance_record(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let record_id = path.into_inner();

    let record: Option<MaintenanceRecord> = sqlx::query_as(
        "SELECT * FROM maintenance_records WHERE id = ?"
    )
    .bind(&record_id)
    .fetch_optional(&app_state.db_pool)
    .await?;

    match record {
        Some(record) => Ok(HttpResponse::Ok().json(ApiResponse::success(record))),
        None => Err(ApiError::maintenance_not_found(&record_id)),
    }
}

/// Создание записи об обслуживании
pub async fn create_maintenance(
    app_state: web::Data<Arc<AppState>>,
    maintenance: web::Json<CreateMaintenanceRequest>,
) -> ApiResult<HttpResponse> {
    maintenance.validate()?;
    validate_cost(maintenance.estimated_cost)?;

    if !MaintenanceType::is_valid(&maintenance.maintenance_type) {
        return Err(ApiError::invalid_status_value(
            "maintenance type",
            &maintenance.maintenance_type,
            MaintenanceType::all_values(),
        ));
    }

    let priority = maintenance
        .priority
        .clone()
        .unwrap_or_else(|| MaintenancePriority::default().as_str().to_string());
    if !MaintenancePriority::is_valid(&priority) {
        return Err(ApiError::invalid_status_value(
            "priority",
            &priority,
            MaintenancePriority::all_values(),
        ));
    }

    if let Some(ref equipment_id) = maintenance.equipment_id {
        check_equipment_exists(&app_state.db_pool, equipment_id).await?;
    }

    let id = Uuid::new_v4().to_string();
    let now = Utc::now();

    sqlx::query(
        r#"INSERT INTO maintenance_records
           (id, equipment_id, maintenance_type, scheduled_date, status, technician_id,
            equipment_name, technician_name, estimated_cost, duration_minutes, priority,
            description, created_at, updated_at)
           VALUES (?, ?, ?, ?, 'scheduled', ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&id)
    .bind(&maintenance.equipment_id)
    .bind(&maintenance.maintenance_type)
    .bind(&maintenance.scheduled_date)
    .bind(&maintenance.technician_id)
    .bind(&maintenance.equipment_name)
    .bind(&maintenance.technician_name)
    .bind(maintenance.estimated_cost)
    .bind(maintenance.duration_minutes.unwrap_or(0.0))
    .bind(&priority)
    .bind(&maintenance.description)
    .bind(&now)
    .bind(&now)
    .execute(&app_state.db_pool)
    .await?;

    let created: MaintenanceRecord = sqlx::query_as(
        "SELECT * FROM maintenance_records WHERE id = ?"
    )
    .bind(&id)
    .fetch_one(&app_state.db_pool)
    .await?;

    Ok(HttpResponse::Created().json(ApiResponse::success(created)))
}

/// Обновление записи об обслуживании
pub async fn update_maintenance(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    update: web::Json<UpdateMaintenanceRequest>,
) -> ApiResult<HttpResponse> {
    update.validate()?;
    let record_id = path.into_inner();

    let existing: Option<MaintenanceRecord> = sqlx::query_as(
        "SELECT * FROM maintenance_records WHERE id = ?"
    )
    .bind(&record_id)
    .fetch_optional(&app_state.db_pool)
    .await?;

    if existing.is_none() {
        return Err(ApiError::maintenance_not_found(&record_id));
    }

    let mut updates = Vec::new();
    let mut values: Vec<String> = Vec::new();

    if let Some(ref maintenance_type) = update.maintenance_type {
        if !MaintenanceType::is_valid(maintenance_type) {
            return Err(ApiError::invalid_status_value(
                "maintenance type",
                maintenance_type,
                MaintenanceType::all_values(),
            ));
        }
        updates.push("maintenance_type = ?");
        values.push(maintenance_type.clone());
    }
    if let Some(ref scheduled_date) = update.scheduled_date {
        updates.push("scheduled_date = ?");
        values.push(scheduled_date.to_rfc3339());
    }
    if let Some(ref status) = update.status {
        if !MaintenanceStatus::is_valid(status) {
            return Err(ApiError::invalid_status_value(
                "status",
                status,
                MaintenanceStatus::all_values(),
            ));
        }
        updates.push("status = ?");
        values.push(status.clone());
    }
    if let Some(ref technician_id) = update.technician_id {
        updates.push("technician_id = ?");
        values.push(technician_id.clone());
    }
    if let Some(ref technician_name) = update.technician_name {
        updates.push("technician_name = ?");
        values.push(technician_name.clone());
    }
    if let Some(estimated_cost) = update.estimated_cost {
        validate_cost(estimated_cost)?;
        updates.push("estimated_cost = ?");
        values.push(estimated_cost.to_string());
    }
    if let Some(actual_cost) = update.actual_cost {
        validate_cost(actual_cost)?;
        updates.push("actual_cost = ?");
        values.push(actual_cost.to_string());
    }
    if let Some(duration_minutes) = update.duration_minutes {
        updates.push("duration_minutes = ?");
        values.push(duration_minutes.to_string());
    }
    if let Some(ref priority) = update.priority {
        if !MaintenancePriority::is_valid(priority) {
            return Err(ApiError::invalid_status_value(
                "priority",
                priority,
                MaintenancePriority::all_values(),
            ));
        }
        updates.push("priority = ?");
        values.push(priority.clone());
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

    let sql = format!(
        "UPDATE maintenance_records SET {} WHERE id = ?",
        updates.join(", ")
    );

    let mut query = sqlx::query(&sql);
    for value in &values {
        query = query.bind(value);
    }
    query = query.bind(&record_id);
    query.execute(&app_state.db_pool).await?;

    let updated: MaintenanceRecord = sqlx::query_as(
        "SELECT * FROM maintenance_records WHERE id = ?"
    )
    .bind(&record_id)
    .fetch_one(&app_state.db_pool)
    .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(updated)))
}

/// Завершение обслуживания
pub async fn complete_maintenance(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    body: web::Json<CompleteMaintenanceRequest>,
) -> ApiResult<HttpResponse> {
    body.validate()?;
    let record_id = path.into_inner();

    let existing: Option<MaintenanceRecord> = sqlx::query_as(
        "SELECT * FROM maintenance_records WHERE id = ?"
    )
    .bind(&record_id)
    .fetch_optional(&app_state.db_pool)
    .await?;

    let existing = existing.ok_or_else(|| ApiError::maintenance_not_found(&record_id))?;

    if existing.status == "completed" {
        return Err(ApiError::bad_request("Maintenance record is already completed"));
    }
    if existing.status == "cancelled" {
        return Err(ApiError::bad_request("Cannot complete a cancelled maintenance record"));
    }

    if let Some(actual_cost) = body.actual_cost {
        validate_cost(actual_cost)?;
    }

    let completed_date = body.completed_date.unwrap_or_else(Utc::now);

    sqlx::query(
        r#"UPDATE maintenance_records
           SET status = 'completed',
               completed_date = ?,
               actual_cost = COALESCE(?, actual_cost),
               duration_minutes = COALESCE(?, duration_minutes),
               description = COALESCE(?, description),
               updated_at = ?
           WHERE id = ?"#,
    )
    .bind(&completed_date)
    .bind(body.actual_cost)
    .bind(body.duration_minutes)
    .bind(&body.notes)
    .bind(Utc::now())
    .bind(&record_id)
    .execute(&app_state.db_pool)
    .await?;

    let updated: MaintenanceRecord = sqlx::query_as(
        "SELECT * FROM maintenance_records WHERE id = ?"
    )
    .bind(&record_id)
    .fetch_one(&app_state.db_pool)
    .await?;

    log::info!(
        "Maintenance {} completed (actual cost: {:?})",
        record_id, updated.actual_cost
    );

    Ok(HttpResponse::Ok().json(ApiResponse::success(updated)))
}

/// Удаление записи об обслуживании
pub async fn delete_maintenance(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let record_id = path.into_inner();

    let result = sqlx::query("DELETE FROM maintenance_records WHERE id = ?")
        .bind(&record_id)
        .execute(&app_state.db_pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::maintenance_not_found(&record_id));
    }

    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        (),
        "Maintenance record deleted successfully".to_string(),
    )))
}
