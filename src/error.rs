use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;
use std::fmt;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    InternalServerError(String),
    ValidationError(String),
    DatabaseError(sqlx::Error),
}

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    message: String,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ApiError::BadRequest(msg) => write!(f, "Bad Request: {}", msg),
            ApiError::NotFound(msg) => write!(f, "Not Found: {}", msg),
            ApiError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            ApiError::InternalServerError(msg) => write!(f, "Internal Server Error: {}", msg),
            ApiError::ValidationError(msg) => write!(f, "Validation Error: {}", msg),
            ApiError::DatabaseError(err) => write!(f, "Database Error: {}", err),
        }
    }
}

impl ResponseError for ApiError {
    fn error_response(&self) -> HttpResponse {
        let error_response = ErrorResponse {
            success: false,
            message: self.to_string(),
        };

        match self {
            ApiError::BadRequest(_) => HttpResponse::BadRequest().json(error_response),
            ApiError::NotFound(_) => HttpResponse::NotFound().json(error_response),
            ApiError::Conflict(_) => HttpResponse::Conflict().json(error_response),
            ApiError::ValidationError(_) => HttpResponse::UnprocessableEntity().json(error_response),
            ApiError::DatabaseError(_) => HttpResponse::InternalServerError().json(error_response),
            ApiError::InternalServerError(_) => HttpResponse::InternalServerError().json(error_response),
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError::DatabaseError(err)
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(err: validator::ValidationErrors) -> Self {
        ApiError::ValidationError(err.to_string())
    }
}

// Специфичные ошибки для LabMS
impl ApiError {
    pub fn bad_request(msg: &str) -> Self {
        ApiError::BadRequest(msg.to_string())
    }

    pub fn lab_not_found(id: &str) -> Self {
        ApiError::NotFound(format!("Lab with ID '{}' not found", id))
    }

    pub fn equipment_not_found(id: &str) -> Self {
        ApiError::NotFound(format!("Equipment with ID '{}' not found", id))
    }

    pub fn booking_not_found(id: &str) -> Self {
        ApiError::NotFound(format!("Booking with ID '{}' not found", id))
    }

    pub fn maintenance_not_found(id: &str) -> Self {
        ApiError::NotFound(format!("Maintenance record with ID '{}' not found", id))
    }

    pub fn user_not_found(id: &str) -> Self {
        ApiError::NotFound(format!("User with ID '{}' not found", id))
    }

    pub fn booking_conflict(equipment_name: &str) -> Self {
        ApiError::Conflict(format!(
            "Equipment '{}' is already booked for an overlapping time slot",
            equipment_name
        ))
    }

    pub fn invalid_status_transition(from: &str, to: &str) -> Self {
        ApiError::BadRequest(format!("Cannot change status from '{}' to '{}'", from, to))
    }

    pub fn invalid_status_value(field: &str, value: &str, valid: &[&str]) -> Self {
        ApiError::BadRequest(format!(
            "Invalid {}: '{}'. Valid values: {}",
            field,
            value,
            valid.join(", ")
        ))
    }
}

// Функции валидации
pub fn validate_time_range(
    start: &chrono::DateTime<chrono::Utc>,
    end: &chrono::DateTime<chrono::Utc>,
) -> Result<(), ApiError> {
    if end <= start {
        return Err(ApiError::ValidationError(
            "End time must be after start time".to_string(),
        ));
    }
    Ok(())
}

pub fn validate_cost(cost: f64) -> Result<(), ApiError> {
    if cost < 0.0 {
        return Err(ApiError::ValidationError("Cost cannot be negative".to_string()));
    }
    if cost > 1e9 {
        return Err(ApiError::ValidationError("Cost too large".to_string()));
    }
    Ok(())
}
