// src/models.rs
//! Модели данных для LabMS
//!
//! Включает:
//! - Сущности предметной области (лаборатории, оборудование, бронирования,
//!   обслуживание, пользователи)
//! - Статусы и типы через единый макрос define_status_enum!
//! - DTO запросов с валидацией

use serde::{Serialize, Deserialize};
use validator::Validate;
use chrono::{DateTime, Utc};

// ==================== СТАТУСЫ И ТИПЫ ====================

/// Макрос для генерации status/type enum с as_str, from_str, is_valid, Display
macro_rules! define_status_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $( $variant:ident => $str_val:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        $vis enum $name {
            $( $variant ),+
        }

        impl $name {
            #[inline]
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $( $name::$variant => $str_val ),+
                }
            }

            pub fn from_str(s: &str) -> Option<Self> {
                match s.to_lowercase().as_str() {
                    $( $str_val => Some($name::$variant), )+
                    _ => None,
                }
            }

            #[inline]
            pub fn is_valid(s: &str) -> bool {
                Self::from_str(s).is_some()
            }

            /// Все допустимые значения
            pub const fn all_values() -> &'static [&'static str] {
                &[ $( $str_val ),+ ]
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::from_str(s).ok_or_else(|| format!("Invalid {}: '{}'", stringify!($name), s))
            }
        }
    };
}

define_status_enum! {
    /// Статус лаборатории
    pub enum LabStatus {
        Active => "active",
        Inactive => "inactive",
        Closed => "closed",
    }
}

impl Default for LabStatus {
    fn default() -> Self {
        LabStatus::Active
    }
}

define_status_enum! {
    /// Статус оборудования
    ///
    /// - Available: доступно для бронирования
    /// - InUse: занято текущим бронированием
    /// - Maintenance: на обслуживании
    /// - Broken: неисправно, ждёт ремонта
    /// - Retired: выведено из эксплуатации
    pub enum EquipmentStatus {
        Available => "available",
        InUse => "in_use",
        Maintenance => "maintenance",
        Broken => "broken",
        Retired => "retired",
    }
}

impl Default for EquipmentStatus {
    fn default() -> Self {
        EquipmentStatus::Available
    }
}

define_status_enum! {
    /// Статус бронирования
    ///
    /// Жизненный цикл: pending -> confirmed -> completed,
    /// отмена возможна из pending и confirmed.
    pub enum BookingStatus {
        Pending => "pending",
        Confirmed => "confirmed",
        Completed => "completed",
        Cancelled => "cancelled",
    }
}

impl Default for BookingStatus {
    fn default() -> Self {
        BookingStatus::Pending
    }
}

define_status_enum! {
    /// Тип обслуживания оборудования
    pub enum MaintenanceType {
        Preventive => "preventive",
        Corrective => "corrective",
        Calibration => "calibration",
        Inspection => "inspection",
        Other => "other",
    }
}

define_status_enum! {
    /// Статус обслуживания
    pub enum MaintenanceStatus {
        Scheduled => "scheduled",
        InProgress => "in_progress",
        Completed => "completed",
        Cancelled => "cancelled",
    }
}

define_status_enum! {
    /// Приоритет обслуживания
    pub enum MaintenancePriority {
        Low => "low",
        Medium => "medium",
        High => "high",
        Critical => "critical",
    }
}

impl Default for MaintenancePriority {
    fn default() -> Self {
        MaintenancePriority::Medium
    }
}

define_status_enum! {
    /// Роль пользователя
    pub enum UserRole {
        Admin => "admin",
        Faculty => "faculty",
        Student => "student",
        LabTechnician => "lab_technician",
    }
}

// ==================== LAB ====================

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Lab {
    pub id: String,
    pub name: String,
    pub location: Option<String>,
    pub department: Option<String>,
    pub capacity: Option<i64>,
    pub status: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate, Clone)]
pub struct CreateLabRequest {
    #[validate(length(min = 1, max = 255, message = "Name must be between 1 and 255 characters"))]
    pub name: String,

    #[validate(length(max = 255, message = "Location cannot exceed 255 characters"))]
    pub location: Option<String>,

    #[validate(length(max = 255, message = "Department cannot exceed 255 characters"))]
    pub department: Option<String>,

    #[validate(range(min = 1, max = 1000, message = "Capacity must be between 1 and 1000"))]
    pub capacity: Option<i64>,

    #[validate(length(max = 1000, message = "Description cannot exceed 1000 characters"))]
    pub description: Option<String>,
}

// ==================== EQUIPMENT ====================

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Equipment {
    pub id: String,
    pub name: String,
    pub model: Option<String>,
    pub category: String,
    pub status: String,
    pub lab_id: Option<String>,
    pub serial_number: Option<String>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate, Clone)]
pub struct CreateEquipmentRequest {
    #[validate(length(min = 1, max = 255, message = "Name must be between 1 and 255 characters"))]
    pub name: String,

    #[validate(length(max = 255, message = "Model cannot exceed 255 characters"))]
    pub model: Option<String>,

    #[validate(length(min = 1, max = 100, message = "Category must be between 1 and 100 characters"))]
    pub category: String,

    pub lab_id: Option<String>,

    #[validate(length(max = 100, message = "Serial number cannot exceed 100 characters"))]
    pub serial_number: Option<String>,

    #[validate(length(max = 1000, message = "Description cannot exceed 1000 characters"))]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateEquipmentRequest {
    #[validate(length(min = 1, max = 255, message = "Name must be between 1 and 255 characters"))]
    pub name: Option<String>,

    #[validate(length(max = 255, message = "Model cannot exceed 255 characters"))]
    pub model: Option<String>,

    #[validate(length(min = 1, max = 100, message = "Category must be between 1 and 100 characters"))]
    pub category: Option<String>,

    pub status: Option<String>,
    pub lab_id: Option<String>,

    #[validate(length(max = 100, message = "Serial number cannot exceed 100 characters"))]
    pub serial_number: Option<String>,

    #[validate(length(max = 1000, message = "Description cannot exceed 1000 characters"))]
    pub description: Option<String>,
}

// ==================== BOOKING ====================

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Booking {
    pub id: String,
    pub equipment_id: Option<String>,
    pub lab_id: Option<String>,
    pub user_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: String,
    pub purpose: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate, Clone)]
pub struct CreateBookingRequest {
    pub equipment_id: Option<String>,
    pub lab_id: Option<String>,
    pub user_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,

    #[validate(length(max = 500, message = "Purpose cannot exceed 500 characters"))]
    pub purpose: Option<String>,
}

// ==================== MAINTENANCE ====================

/// Запись об обслуживании.
///
/// equipment_name/technician_name дублируют имена из связанных таблиц на
/// момент создания записи: связь может отсутствовать (оборудование удалено,
/// техник внешний), отчёты используют эти поля как запасной вариант.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct MaintenanceRecord {
    pub id: String,
    pub equipment_id: Option<String>,
    pub maintenance_type: String,
    pub scheduled_date: DateTime<Utc>,
    pub completed_date: Option<DateTime<Utc>>,
    pub status: String,
    pub technician_id: Option<String>,
    pub equipment_name: Option<String>,
    pub technician_name: Option<String>,
    pub estimated_cost: f64,
    pub actual_cost: Option<f64>,
    pub duration_minutes: f64,
    pub priority: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate, Clone)]
pub struct CreateMaintenanceRequest {
    pub equipment_id: Option<String>,
    pub maintenance_type: String,
    pub scheduled_date: DateTime<Utc>,
    pub technician_id: Option<String>,

    #[validate(length(max = 255, message = "Equipment name cannot exceed 255 characters"))]
    pub equipment_name: Option<String>,

    #[validate(length(max = 255, message = "Technician name cannot exceed 255 characters"))]
    pub technician_name: Option<String>,

    #[validate(range(min = 0.0, message = "Estimated cost must be non-negative"))]
    pub estimated_cost: f64,

    #[validate(range(min = 0.0, message = "Duration must be non-negative"))]
    pub duration_minutes: Option<f64>,

    pub priority: Option<String>,

    #[validate(length(max = 1000, message = "Description cannot exceed 1000 characters"))]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateMaintenanceRequest {
    pub maintenance_type: Option<String>,
    pub scheduled_date: Option<DateTime<Utc>>,
    pub status: Option<String>,
    pub technician_id: Option<String>,

    #[validate(length(max = 255, message = "Technician name cannot exceed 255 characters"))]
    pub technician_name: Option<String>,

    #[validate(range(min = 0.0, message = "Estimated cost must be non-negative"))]
    pub estimated_cost: Option<f64>,

    #[validate(range(min = 0.0, message = "Actual cost must be non-negative"))]
    pub actual_cost: Option<f64>,

    #[validate(range(min = 0.0, message = "Duration must be non-negative"))]
    pub duration_minutes: Option<f64>,

    pub priority: Option<String>,

    #[validate(length(max = 1000, message = "Description cannot exceed 1000 characters"))]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CompleteMaintenanceRequest {
    pub completed_date: Option<DateTime<Utc>>,

    #[validate(range(min = 0.0, message = "Actual cost must be non-negative"))]
    pub actual_cost: Option<f64>,

    #[validate(range(min = 0.0, message = "Duration must be non-negative"))]
    pub duration_minutes: Option<f64>,

    #[validate(length(max = 1000, message = "Notes cannot exceed 1000 characters"))]
    pub notes: Option<String>,
}

// ==================== USER ====================

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: String,
    pub department: Option<String>,
    pub student_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate, Clone)]
pub struct CreateUserRequest {
    #[validate(length(min = 1, max = 255, message = "Name must be between 1 and 255 characters"))]
    pub name: String,

    #[validate(email(message = "Invalid email address"))]
    pub email: String,

    pub role: String,

    #[validate(length(max = 255, message = "Department cannot exceed 255 characters"))]
    pub department: Option<String>,

    #[validate(length(max = 50, message = "Student ID cannot exceed 50 characters"))]
    pub student_id: Option<String>,
}

// ==================== ТЕСТЫ ====================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equipment_status() {
        assert_eq!(EquipmentStatus::InUse.as_str(), "in_use");
        assert_eq!(EquipmentStatus::from_str("in_use"), Some(EquipmentStatus::InUse));
        assert_eq!(EquipmentStatus::from_str("BROKEN"), Some(EquipmentStatus::Broken));
        assert!(EquipmentStatus::is_valid("retired"));
        assert!(!EquipmentStatus::is_valid("unknown"));
    }

    #[test]
    fn test_booking_status() {
        assert_eq!(BookingStatus::Confirmed.as_str(), "confirmed");
        assert_eq!(BookingStatus::from_str("cancelled"), Some(BookingStatus::Cancelled));
        assert!(!BookingStatus::is_valid("rejected"));
    }

    #[test]
    fn test_maintenance_enums() {
        assert_eq!(MaintenanceType::Preventive.as_str(), "preventive");
        assert_eq!(MaintenanceStatus::from_str("in_progress"), Some(MaintenanceStatus::InProgress));
        assert_eq!(MaintenancePriority::default(), MaintenancePriority::Medium);
        assert!(MaintenanceType::is_valid("calibration"));
        assert!(!MaintenanceStatus::is_valid("overdue"));
    }

    #[test]
    fn test_user_role() {
        assert_eq!(UserRole::LabTechnician.as_str(), "lab_technician");
        assert_eq!(UserRole::from_str("faculty"), Some(UserRole::Faculty));
        let roles = UserRole::all_values();
        assert!(roles.contains(&"admin"));
        assert!(roles.contains(&"student"));
        assert_eq!(roles.len(), 4);
    }

    #[test]
    fn test_from_str_trait() {
        let status: Result<BookingStatus, _> = "confirmed".parse();
        assert_eq!(status.unwrap(), BookingStatus::Confirmed);

        let invalid: Result<BookingStatus, _> = "nonsense".parse();
        assert!(invalid.is_err());
    }

    #[test]
    fn test_defaults() {
        assert_eq!(EquipmentStatus::default(), EquipmentStatus::Available);
        assert_eq!(BookingStatus::default(), BookingStatus::Pending);
        assert_eq!(LabStatus::default(), LabStatus::Active);
    }
}
