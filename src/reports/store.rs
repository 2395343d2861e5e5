// src/reports/store.rs
//! Интерфейс чтения данных для отчётов.
//!
//! Слой отчётов не трогает таблицы напрямую: все выборки идут через trait
//! ReportStore - явные типизированные запросы (фильтр по дате, join,
//! группировка, агрегаты). Это позволяет подменять хранилище в тестах и
//! моделировать отсутствие подсистемы бронирований флагом supports_bookings.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

// ==================== СТРОКИ ВЫБОРОК ====================

/// Агрегат бронирований по единице оборудования
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EquipmentUsageRow {
    pub equipment_id: String,
    pub equipment_name: String,
    pub category: String,
    pub booking_count: i64,
    pub total_hours: f64,
}

/// Краткая карточка оборудования для отчёта доступности
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EquipmentRef {
    pub id: String,
    pub name: String,
    pub category: String,
    pub status: String,
}

/// Запись обслуживания с присоединёнными именами.
///
/// linked_* приходят из JOIN, fallback_* - плоские колонки самой записи;
/// выбор между ними делает слой отчётов.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MaintenanceJoinedRow {
    pub id: String,
    pub maintenance_type: String,
    pub status: String,
    pub scheduled_date: DateTime<Utc>,
    pub estimated_cost: f64,
    pub actual_cost: Option<f64>,
    pub priority: String,
    pub linked_equipment_name: Option<String>,
    pub fallback_equipment_name: Option<String>,
    pub linked_technician_name: Option<String>,
    pub fallback_technician_name: Option<String>,
}

/// Активность пользователя: все пользователи, включая нулевые счётчики
/// (отсечение нулей - послеагрегационный фильтр сервиса отчётов)
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserActivityRow {
    pub user_id: String,
    pub user_name: String,
    pub email: String,
    pub role: String,
    pub department: Option<String>,
    pub booking_count: i64,
    pub total_hours: f64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RoleCountRow {
    pub role: String,
    pub user_count: i64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MonthlyCostRow {
    pub year: i64,
    pub month: i64,
    pub total_cost: f64,
    pub record_count: i64,
}

// ==================== ИНТЕРФЕЙС ====================

/// Запросы чтения, которые нужны генераторам отчётов.
///
/// Все методы read-only. Статусный фильтр бронирований везде одинаковый:
/// учитываются только confirmed и completed.
#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Доступна ли подсистема бронирований в данной инсталляции
    fn supports_bookings(&self) -> bool {
        true
    }

    async fn usage_by_equipment(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<EquipmentUsageRow>>;

    /// Все подтверждённые/завершённые бронирования за период,
    /// включая бронирования без ссылки на оборудование
    async fn count_bookings(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<i64>;

    async fn all_equipment(&self) -> Result<Vec<EquipmentRef>>;

    async fn booked_hours_for_equipment(
        &self,
        equipment_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<f64>;

    async fn maintenance_minutes_for_equipment(
        &self,
        equipment_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<f64>;

    async fn maintenance_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<MaintenanceJoinedRow>>;

    async fn user_booking_activity(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<UserActivityRow>>;

    /// Распределение ролей по ВСЕМ пользователям, без фильтра активности
    async fn role_distribution(&self) -> Result<Vec<RoleCountRow>>;

    async fn monthly_maintenance_costs(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<MonthlyCostRow>>;

    /// Сумма стоимости обслуживания за период (actual с откатом на estimated)
    async fn sum_maintenance_cost(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<f64>;

    async fn avg_booking_hours(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<f64>;

    async fn distinct_booked_equipment(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<i64>;

    async fn count_available_equipment(&self) -> Result<i64>;
}

// ==================== SQLITE РЕАЛИЗАЦИЯ ====================

#[derive(Clone)]
pub struct SqliteReportStore {
    pool: SqlitePool,
}

impl SqliteReportStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReportStore for SqliteReportStore {
    async fn usage_by_equipment(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<EquipmentUsageRow>> {
        let rows: Vec<EquipmentUsageRow> = sqlx::query_as(
            r#"SELECT b.equipment_id as equipment_id,
                      e.name as equipment_name,
                      e.category as category,
                      COUNT(*) as booking_count,
                      COALESCE(SUM((julianday(b.end_time) - julianday(b.start_time)) * 24.0), 0.0) as total_hours
               FROM bookings b
               JOIN equipment e ON b.equipment_id = e.id
               WHERE b.start_time >= ? AND b.start_time < ?
                 AND b.status IN ('confirmed', 'completed')
               GROUP BY b.equipment_id, e.name, e.category
               ORDER BY booking_count DESC, e.name ASC"#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn count_bookings(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"SELECT COUNT(*) FROM bookings
               WHERE start_time >= ? AND start_time < ?
                 AND status IN ('confirmed', 'completed')"#,
        )
        .bind(start)
        .bind(end)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn all_equipment(&self) -> Result<Vec<EquipmentRef>> {
        let rows: Vec<EquipmentRef> = sqlx::query_as(
            "SELECT id, name, category, status FROM equipment ORDER BY name ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn booked_hours_for_equipment(
        &self,
        equipment_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<f64> {
        let hours: f64 = sqlx::query_scalar(
            r#"SELECT COALESCE(SUM((julianday(end_time) - julianday(start_time)) * 24.0), 0.0)
               FROM bookings
               WHERE equipment_id = ?
                 AND start_time >= ? AND start_time < ?
                 AND status IN ('confirmed', 'completed')"#,
        )
        .bind(equipment_id)
        .bind(start)
        .bind(end)
        .fetch_one(&self.pool)
        .await?;

        Ok(hours)
    }

    async fn maintenance_minutes_for_equipment(
        &self,
        equipment_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<f64> {
        let minutes: f64 = sqlx::query_scalar(
            r#"SELECT COALESCE(SUM(duration_minutes), 0.0)
               FROM maintenance_records
               WHERE equipment_id = ?
                 AND scheduled_date >= ? AND scheduled_date < ?"#,
        )
        .bind(equipment_id)
        .bind(start)
        .bind(end)
        .fetch_one(&self.pool)
        .await?;

        Ok(minutes)
    }

    async fn maintenance_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<MaintenanceJoinedRow>> {
        let rows: Vec<MaintenanceJoinedRow> = sqlx::query_as(
            r#"SELECT m.id as id,
                      m.maintenance_type as maintenance_type,
                      m.status as status,
                      m.scheduled_date as scheduled_date,
                      m.estimated_cost as estimated_cost,
                      m.actual_cost as actual_cost,
                      m.priority as priority,
                      e.name as linked_equipment_name,
                      m.equipment_name as fallback_equipment_name,
                      u.name as linked_technician_name,
                      m.technician_name as fallback_technician_name
               FROM maintenance_records m
               LEFT JOIN equipment e ON m.equipment_id = e.id
               LEFT JOIN users u ON m.technician_id = u.id
               WHERE m.scheduled_date >= ? AND m.scheduled_date < ?
               ORDER BY m.scheduled_date ASC"#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn user_booking_activity(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<UserActivityRow>> {
        let rows: Vec<UserActivityRow> = sqlx::query_as(
            r#"SELECT u.id as user_id,
                      u.name as user_name,
                      u.email as email,
                      u.role as role,
                      u.department as department,
                      COUNT(b.id) as booking_count,
                      COALESCE(SUM((julianday(b.end_time) - julianday(b.start_time)) * 24.0), 0.0) as total_hours
               FROM users u
               LEFT JOIN bookings b ON b.user_id = u.id
                   AND b.start_time >= ? AND b.start_time < ?
                   AND b.status IN ('confirmed', 'completed')
               GROUP BY u.id, u.name, u.email, u.role, u.department
               ORDER BY booking_count DESC, u.name ASC"#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn role_distribution(&self) -> Result<Vec<RoleCountRow>> {
        let rows: Vec<RoleCountRow> = sqlx::query_as(
            "SELECT role, COUNT(*) as user_count FROM users GROUP BY role ORDER BY role ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn monthly_maintenance_costs(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<MonthlyCostRow>> {
        let rows: Vec<MonthlyCostRow> = sqlx::query_as(
            r#"SELECT CAST(strftime('%Y', scheduled_date) AS INTEGER) as year,
                      CAST(strftime('%m', scheduled_date) AS INTEGER) as month,
                      SUM(COALESCE(actual_cost, estimated_cost)) as total_cost,
                      COUNT(*) as record_count
               FROM maintenance_records
               WHERE scheduled_date >= ? AND scheduled_date < ?
               GROUP BY year, month
               ORDER BY year ASC, month ASC"#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn sum_maintenance_cost(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<f64> {
        let total: f64 = sqlx::query_scalar(
            r#"SELECT COALESCE(SUM(COALESCE(actual_cost, estimated_cost)), 0.0)
               FROM maintenance_records
               WHERE scheduled_date >= ? AND scheduled_date < ?"#,
        )
        .bind(start)
        .bind(end)
        .fetch_one(&self.pool)
        .await?;

        Ok(total)
    }

    async fn avg_booking_hours(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<f64> {
        let avg: Option<f64> = sqlx::query_scalar(
            r#"SELECT AVG((julianday(end_time) - julianday(start_time)) * 24.0)
               FROM bookings
               WHERE start_time >= ? AND start_time < ?
                 AND status IN ('confirmed', 'completed')"#,
        )
        .bind(start)
        .bind(end)
        .fetch_one(&self.pool)
        .await?;

        Ok(avg.unwrap_or(0.0))
    }

    async fn distinct_booked_equipment(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"SELECT COUNT(DISTINCT equipment_id) FROM bookings
               WHERE equipment_id IS NOT NULL
                 AND start_time >= ? AND start_time < ?
                 AND status IN ('confirmed', 'completed')"#,
        )
        .bind(start)
        .bind(end)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn count_available_equipment(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM equipment WHERE status = 'available'",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }
}

// ==================== ТЕСТЫ ====================
