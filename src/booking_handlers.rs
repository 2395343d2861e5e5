// src/booking_handlers.rs
//! Обработчики бронирований
//!
//! Создание проверяет корректность интервала и пересечения с другими
//! бронированиями того же оборудования. Переходы статусов:
//! pending -> confirmed -> completed, отмена из pending/confirmed.

use actix_web::{web, HttpResponse};
use std::sync::Arc;
use chrono::Utc;
use uuid::Uuid;
use validator::Validate;

use crate::AppState;
use crate::models::*;
use crate::error::{validate_time_range, ApiError, ApiResult};
use crate::equipment_handlers::check_equipment_exists;
use crate::handlers::{ApiResponse, PaginatedResponse};

// ==================== СТРУКТУРЫ ЗАПРОСОВ ====================

/// Специфичная структура пагинации для бронирований
#[derive(Debug, serde::Deserialize)]
pub struct BookingListQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub status: Option<String>,
    pub equipment_id: Option<String>,
    pub user_id: Option<String>,
}

impl BookingListQuery {
    pub fn normalize(&self) -> (i64, i64, i64) {
        let page = self.page.unwrap_or(1).max(1);
        let per_page = self.per_page.unwrap_or(20).clamp(1, 100);
        let offset = (page - 1) * per_page;
        (page, per_page, offset)
    }
}

// ==================== ПЕРЕХОДЫ СТАТУСОВ ====================

fn can_transition(from: BookingStatus, to: BookingStatus) -> bool {
    matches!(
        (from, to),
        (BookingStatus::Pending, BookingStatus::Confirmed)
            | (BookingStatus::Confirmed, BookingStatus::Completed)
            | (BookingStatus::Pending, BookingStatus::Cancelled)
            | (BookingStatus::Confirmed, BookingStatus::Cancelled)
    )
}

async fn transition_booking(
    app_state: &AppState,
    booking_id: &str,
    target: BookingStatus,
) -> ApiResult<Booking> {
    let booking: Booking = sqlx::query_as("SELECT * FROM bookings WHERE id = ?")
        .bind(booking_id)
        .fetch_optional(&app_state.db_pool)
        .await?
        .ok_or_else(|| ApiError::booking_not_found(booking_id))?;

    let current = BookingStatus::from_str(&booking.status)
        .ok_or_else(|| ApiError::InternalServerError(format!(
            "Booking {} has unexpected status '{}'",
            booking_id, booking.status
        )))?;

    if !can_transition(current, target) {
        return Err(ApiError::invalid_status_transition(current.as_str(), target.as_str()));
    }

    sqlx::query("UPDATE bookings SET status = ?, updated_at = ? WHERE id = ?")
        .bind(target.as_str())
        .bind(Utc::now())
        .bind(booking_id)
        .execute(&app_state.db_pool)
        .await?;

    let updated: Booking = sqlx::query_as("SELECT * FROM bookings WHERE id = ?")
        .bind(booking_id)
        .fetch_one(&app_state.db_pool)
        .await?;

    Ok(updated)
}

// ==================== CRUD ====================

/// Список бронирований с фильтрами
pub async fn get_bookings(
    app_state: web::Data<Arc<AppState>>,
    query: web::Query<BookingListQuery>,
) -> ApiResult<HttpResponse> {
    let (page, per_page, offset) = query.normalize();

    let mut conditions: Vec<&str> = Vec::new();
    let mut params: Vec<String> = Vec::new();

    if let Some(ref status) = query.status {
        if !BookingStatus::is_valid(status) {
            return Err(ApiError::invalid_status_value(
                "status",
                status,
                BookingStatus::all_values(),
            ));
        }
        conditions.push("status = ?");
        params.push(status.clone());
    }
    if let Some(ref equipment_id) = query.equipment_id {
        conditions.push("equipment_id = ?");
        params.push(equipment_id.clone());
    }
    if let Some(ref user_id) = query.user_id {
        conditions.push("user_id = ?");
        params.push(user_id.clone());
    }

    let clause = if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    };

    let count_sql = format!("SELECT COUNT(*) FROM bookings{}", clause);
    let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
    for param in &params {
        count_query = count_query.bind(param);
    }
    let total: i64 = count_query.fetch_one(&app_state.db_pool).await?;

    let data_sql = format!(
        "SELECT * FROM bookings{} ORDER BY start_time DESC LIMIT ? OFFSET ?",
        clause
    );
    let mut data_query = sqlx::query_as::<_, Booking>(&data_sql);
    for param in &params {
        data_query = data_query.bind(param);
    }
    data_query = data_query.bind(per_page).bind(offset);
    let bookings = data_query.fetch_all(&app_state.db_pool).await?;

    let total_pages = (total + per_page - 1) / per_page;

    Ok(HttpResponse::Ok().json(ApiResponse::success(PaginatedResponse {
        data: bookings,
        total,
        page,
        per_page,
        total_pages,
    })))
}

pub async fn get_booking(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let booking_id = path.into_inner();

    let booking: Option<Booking> = sqlx::query_as("SELECT * FROM bookings WHERE id = ?")
        .bind(&booking_id)
        .fetch_optional(&app_state.db_pool)
        .await?;

    match booking {
        Some(booking) => Ok(HttpResponse::Ok().json(ApiResponse::success(booking))),
        None => Err(ApiError::booking_not_found(&booking_id)),
    }
}

/// Создание бронирования
pub async fn create_booking(
    app_state: web::Data<Arc<AppState>>,
    booking: web::Json<CreateBookingRequest>,
) -> ApiResult<HttpResponse> {
    booking.validate()?;
    validate_time_range(&booking.start_time, &booking.end_time)?;

    let user_exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE id = ?)")
        .bind(&booking.user_id)
        .fetch_one(&app_state.db_pool)
        .await?;
    if !user_exists {
        return Err(ApiError::user_not_found(&booking.user_id));
    }

    if let Some(ref equipment_id) = booking.equipment_id {
        check_equipment_exists(&app_state.db_pool, equipment_id).await?;

        // Пересечение с живыми бронированиями того же оборудования
        let conflict: Option<String> = sqlx::query_scalar(
            r#"SELECT id FROM bookings
               WHERE equipment_id = ?
                 AND status IN ('pending', 'confirmed')
                 AND start_time < ?
                 AND end_time > ?
               LIMIT 1"#,
        )
        .bind(equipment_id)
        .bind(&booking.end_time)
        .bind(&booking.start_time)
        .fetch_optional(&app_state.db_pool)
        .await?;

        if conflict.is_some() {
            let name: String = sqlx::query_scalar("SELECT name FROM equipment WHERE id = ?")
                .bind(equipment_id)
                .fetch_one(&app_state.db_pool)
                .await?;
            return Err(ApiError::booking_conflict(&name));
        }
    }

    if let Some(ref lab_id) = booking.lab_id {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM labs WHERE id = ?)")
            .bind(lab_id)
            .fetch_one(&app_state.db_pool)
            .await?;
        if !exists {
            return Err(ApiError::lab_not_found(lab_id));
        }
    }

    let id = Uuid::new_v4().to_string();
    let now = Utc::now();

    sqlx::query(
        r#"INSERT INTO bookings
           (id, equipment_id, lab_id, user_id, start_time, end_time, status, purpose, created_at, updated_at)
           VALUES (?, ?, ?, ?, ?, ?, 'pending', ?, ?, ?)"#,
    )
    .bind(&id)
    .bind(&booking.equipment_id)
    .bind(&booking.lab_id)
    .bind(&booking.user_id)
    .bind(&booking.start_time)
    .bind(&booking.end_time)
    .bind(&booking.purpose)
    .bind(&now)
    .bind(&now)
    .execute(&app_state.db_pool)
    .await?;

    let created: Booking = sqlx::query_as("SELECT * FROM bookings WHERE id = ?")
        .bind(&id)
        .fetch_one(&app_state.db_pool)
        .await?;

    log::info!(
        "Booking {} created for user {} ({} - {})",
        id, booking.user_id, booking.start_time, booking.end_time
    );

    Ok(HttpResponse::Created().json(ApiResponse::success(created)))
}

// ==================== ПЕРЕХОДЫ ====================

pub async fn confirm_booking(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let booking = transition_booking(&app_state, &path.into_inner(), BookingStatus::Confirmed).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(booking)))
}

pub async fn complete_booking(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let booking = transition_booking(&app_state, &path.into_inner(), BookingStatus::Completed).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(booking)))
}

pub async fn cancel_booking(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let booking = transition_booking(&app_state, &path.into_inner(), BookingStatus::Cancelled).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(booking)))
}

// ==================== УДАЛЕНИЕ ====================

pub async fn delete_booking(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let booking_id = path.into_inner();

    let result = sqlx::query("DELETE FROM bookings WHERE id = ?")
        .bind(&booking_id)
        .execute(&app_state.db_pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::booking_not_found(&booking_id));
    }

    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        (),
        "Booking deleted successfully".to_string(),
    )))
}

// ==================== ТЕСТЫ ====================
