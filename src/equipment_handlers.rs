// src/equipment_handlers.rs
//! Обработчики для модуля оборудования
//!
//! Включает:
//! - CRUD операции для оборудования
//! - Детальную карточку с последним обслуживанием и ближайшими бронированиями
//! - Фильтрацию списка по статусу, категории, лаборатории и подстроке имени

use actix_web::{web, HttpResponse};
use sqlx::SqlitePool;
use std::sync::Arc;
use chrono::Utc;
use uuid::Uuid;
use validator::Validate;

use crate::AppState;
use crate::models::*;
use crate::error::{ApiError, ApiResult};
use crate::handlers::{ApiResponse, PaginatedResponse, PaginationQuery};

/// Сколько записей обслуживания показывать в детальной карточке
const RECENT_MAINTENANCE_LIMIT: i64 = 5;

// ==================== СТРУКТУРЫ ОТВЕТОВ ====================

#[derive(Debug, serde::Serialize)]
pub struct EquipmentDetailResponse {
    pub equipment: Equipment,
    pub recent_maintenance: Vec<MaintenanceRecord>,
    pub upcoming_bookings: Vec<Booking>,
}

// ==================== ВСПОМОГАТЕЛЬНЫЕ ФУНКЦИИ ====================

/// Собирает WHERE-условия списка из параметров запроса.
/// Возвращает пары (условие с плейсхолдером, значение параметра).
fn equipment_filters(query: &PaginationQuery) -> Result<Vec<(&'static str, String)>, ApiError> {
    let mut filters = Vec::new();

    if let Some(ref status) = query.status {
        if !EquipmentStatus::is_valid(status) {
            return Err(ApiError::invalid_status_value(
                "status",
                status,
                EquipmentStatus::all_values(),
            ));
        }
        filters.push(("status = ?", status.clone()));
    }

    if let Some(ref category) = query.category {
        filters.push(("category = ?", category.clone()));
    }

    if let Some(ref lab_id) = query.lab_id {
        filters.push(("lab_id = ?", lab_id.clone()));
    }

    if let Some(ref search) = query.search {
        let trimmed = search.trim();
        if !trimmed.is_empty() {
            filters.push(("name LIKE ?", format!("%{}%", trimmed)));
        }
    }

    Ok(filters)
}

fn where_clause(filters: &[(&'static str, String)]) -> String {
    if filters.is_empty() {
        String::new()
    } else {
        let conditions: Vec<&str> = filters.iter().map(|(cond, _)| *cond).collect();
        format!(" WHERE {}", conditions.join(" AND "))
    }
}

/// Проверка существования оборудования
pub async fn check_equipment_exists(pool: &SqlitePool, equipment_id: &str) -> ApiResult<()> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM equipment WHERE id = ?)"
    )
    .bind(equipment_id)
    .fetch_one(pool)
    .await?;

    if !exists {
        return Err(ApiError::equipment_not_found(equipment_id));
    }
    Ok(())
}

// ==================== ОСНОВНЫЕ CRUD ОПЕРАЦИИ ====================

/// Получение списка оборудования с пагинацией и фильтрами
pub async fn get_equipment(
    app_state: web::Data<Arc<AppState>>,
    query: web::Query<PaginationQuery>,
) -> ApiResult<HttpResponse> {
    let (page, per_page, offset) = query.normalize();
    let filters = equipment_filters(&query)?;
    let clause = where_clause(&filters);

    let count_sql = format!("SELECT COUNT(*) FROM equipment{}", clause);
    let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
    for (_, param) in &filters {
        count_query = count_query.bind(param);
    }
    let total: i64 = count_query.fetch_one(&app_state.db_pool).await?;

    let data_sql = format!(
        "SELECT * FROM equipment{} ORDER BY name ASC LIMIT ? OFFSET ?",
        clause
    );
    let mut data_query = sqlx::query_as::<_, Equipment>(&data_sql);
    for (_, param) in &filters {
        data_query = data_query.bind(param);
    }
    data_query = data_query.bind(per_page).bind(offset);
    let equipment = data_query.fetch_all(&app_state.db_pool).await?;

    let total_pages = (total + per_page - 1) / per_page;

    Ok(HttpResponse::Ok().json(ApiResponse::success(PaginatedResponse {
        data: equipment,
        total,
        page,
        per_page,
        total_pages,
    })))
}

/// Получение оборудования по ID с деталями
pub async fn get_equipment_by_id(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let equipment_id = path.into_inner();

    let equipment: Option<Equipment> = sqlx::query_as(
        "SELECT * FROM equipment WHERE id = ?"
    )
    .bind(&equipment_id)
    .fetch_optional(&app_state.db_pool)
    .await?;

    match equipment {
        Some(equipment) => {
            let recent_maintenance: Vec<MaintenanceRecord> = sqlx::query_as(
                r#"SELECT * FROM maintenance_records
                   WHERE equipment_id = ?
                   ORDER BY scheduled_date DESC
                   LIMIT ?"#,
            )
            .bind(&equipment_id)
            .bind(RECENT_MAINTENANCE_LIMIT)
            .fetch_all(&app_state.db_pool)
            .await?;

            let upcoming_bookings: Vec<Booking> = sqlx::query_as(
                r#"SELECT * FROM bookings
                   WHERE equipment_id = ?
                     AND end_time >= datetime('now')
                     AND status IN ('pending', 'confirmed')
                   ORDER BY start_time ASC"#,
            )
            .bind(&equipment_id)
            .fetch_all(&app_state.db_pool)
            .await?;

            let response = EquipmentDetailResponse {
                equipment,
                recent_maintenance,
                upcoming_bookings,
            };

            Ok(HttpResponse::Ok().json(ApiResponse::success(response)))
        }
        None => Err(ApiError::equipment_not_found(&equipment_id)),
    }
}

/// Создание нового оборудования
pub async fn create_equipment(
    app_state: web::Data<Arc<AppState>>,
    equipment: web::Json<CreateEquipmentRequest>,
) -> ApiResult<HttpResponse> {
    equipment.validate()?;

    if let Some(ref lab_id) = equipment.lab_id {
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
        r#"INSERT INTO equipment
           (id, name, model, category, status, lab_id, serial_number, description, created_at, updated_at)
           VALUES (?, ?, ?, ?, 'available', ?, ?, ?, ?, ?)"#,
    )
    .bind(&id)
    .bind(&equipment.name)
    .bind(&equipment.model)
    .bind(&equipment.category)
    .bind(&equipment.lab_id)
    .bind(&equipment.serial_number)
    .bind(&equipment.description)
    .bind(&now)
    .bind(&now)
    .execute(&app_state.db_pool)
    .await?;

    let created: Equipment = sqlx::query_as("SELECT * FROM equipment WHERE id = ?")
        .bind(&id)
        .fetch_one(&app_state.db_pool)
        .await?;

    Ok(HttpResponse::Created().json(ApiResponse::success(created)))
}

/// Обновление оборудования
pub async fn update_equipment(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    update: web::Json<UpdateEquipmentRequest>,
) -> ApiResult<HttpResponse> {
    update.validate()?;
    let equipment_id = path.into_inner();

    check_equipment_exists(&app_state.db_pool, &equipment_id).await?;

    if let Some(ref status) = update.status {
        if !EquipmentStatus::is_valid(status) {
            return Err(ApiError::invalid_status_value(
                "status",
                status,
                EquipmentStatus::all_values(),
            ));
        }
    }

    // Строим динамический UPDATE
    let mut updates = Vec::new();
    let mut values: Vec<String> = Vec::new();

    macro_rules! add_field {
        ($field:ident, $name:expr) => {
            if let Some(ref val) = update.$field {
                updates.push(concat!($name, " = ?"));
                values.push(val.clone());
            }
        };
    }

    add_field!(name, "name");
    add_field!(model, "model");
    add_field!(category, "category");
    add_field!(status, "status");
    add_field!(lab_id, "lab_id");
    add_field!(serial_number, "serial_number");
    add_field!(description, "description");

    if updates.is_empty() {
        return Err(ApiError::bad_request("No fields to update"));
    }

    updates.push("updated_at = ?");
    values.push(Utc::now().to_rfc3339());

    let sql = format!("UPDATE equipment SET {} WHERE id = ?", updates.join(", "));

    let mut query = sqlx::query(&sql);
    for value in &values {
        query = query.bind(value);
    }
    query = query.bind(&equipment_id);

    query.execute(&app_state.db_pool).await?;

    let updated: Equipment = sqlx::query_as("SELECT * FROM equipment WHERE id = ?")
        .bind(&equipment_id)
        .fetch_one(&app_state.db_pool)
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(updated)))
}

/// Удаление оборудования.
/// Связанные бронирования и записи обслуживания остаются (FK обнуляет
/// ссылку), имя фиксируется в плоской колонке записей обслуживания.
pub async fn delete_equipment(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let equipment_id = path.into_inner();

    // Перед удалением фиксируем имя в связанных записях обслуживания
    sqlx::query(
        r#"UPDATE maintenance_records
           SET equipment_name = (SELECT name FROM equipment WHERE id = ?)
           WHERE equipment_id = ? AND equipment_name IS NULL"#,
    )
    .bind(&equipment_id)
    .bind(&equipment_id)
    .execute(&app_state.db_pool)
    .await?;

    let result = sqlx::query("DELETE FROM equipment WHERE id = ?")
        .bind(&equipment_id)
        .execute(&app_state.db_pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::equipment_not_found(&equipment_id));
    }

    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        (),
        "Equipment deleted successfully".to_string(),
    )))
}

// ==================== ТЕСТЫ ====================

#[cfg(test)]
mod tests {
    use super::*;

    fn query(status: Option<&str>, search: Option<&str>) -> PaginationQuery {
        PaginationQuery {
            page: None,
            per_page: None,
            search: search.map(String::from),
            status: status.map(String::from),
            category: None,
            lab_id: None,
            role: None,
        }
    }

    #[test]
    fn test_equipment_filters_validates_status() {
        assert!(equipment_filters(&query(Some("available"), None)).is_ok());
        assert!(equipment_filters(&query(Some("bogus"), None)).is_err());
    }

    #[test]
    fn test_equipment_filters_builds_like_pattern() {
        let filters = equipment_filters(&query(None, Some("  spectro "))).unwrap();
        assert_eq!(filters.len(), 1);
        assert_eq!(filters[0].0, "name LIKE ?");
        assert_eq!(filters[0].1, "%spectro%");

        // Пустой поиск не добавляет условий
        let filters = equipment_filters(&query(None, Some("   "))).unwrap();
        assert!(filters.is_empty());
    }

    #[test]
    fn test_where_clause_joins_conditions() {
        assert_eq!(where_clause(&[]), "");

        let filters = vec![
            ("status = ?", "available".to_string()),
            ("category = ?", "instrument".to_string()),
        ];
        assert_eq!(where_clause(&filters), " WHERE status = ? AND category = ?");
    }
}
