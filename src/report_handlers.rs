// src/report_handlers.rs
//! Обработчики системы отчётов

use actix_web::{web, HttpResponse};
use std::str::FromStr;
use std::sync::Arc;
use serde::{Serialize, Deserialize};
use chrono::{DateTime, Utc};
use strum::IntoEnumIterator;

use crate::AppState;
use crate::error::{ApiError, ApiResult};
use crate::handlers::ApiResponse;
use crate::reports::{resolve_date_range, ReportKind, DEFAULT_RANGE_KEY};

// ==================== REQUEST/RESPONSE STRUCTURES ====================

#[derive(Debug, Deserialize)]
pub struct GenerateReportRequest {
    pub report_type: String,
    pub date_range: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct AvailableReport {
    pub id: String,
    pub description: String,
    pub default_range: String,
}

// ==================== HELPER FUNCTIONS ====================

fn parse_report_kind(raw: &str) -> ApiResult<ReportKind> {
    ReportKind::from_str(raw).map_err(|_| {
        let valid: Vec<String> = ReportKind::iter().map(|k| k.to_string()).collect();
        ApiError::bad_request(&format!(
            "Unknown report type '{}'. Valid types: {}",
            raw,
            valid.join(", ")
        ))
    })
}

/// Сериализация строк отчёта в CSV: заголовок берётся из порядка полей
/// структуры строки, поэтому колонки фиксированы для каждого вида отчёта
fn rows_to_csv<R: Serialize>(rows: &[R]) -> ApiResult<String> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(true)
        .from_writer(Vec::new());

    for row in rows {
        writer
            .serialize(row)
            .map_err(|e| ApiError::InternalServerError(format!("CSV serialization failed: {}", e)))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| ApiError::InternalServerError(format!("CSV flush failed: {}", e)))?;

    // BOM для корректного отображения UTF-8 в Excel
    let mut content = String::from("\u{FEFF}");
    content.push_str(
        &String::from_utf8(bytes)
            .map_err(|e| ApiError::InternalServerError(format!("CSV is not valid UTF-8: {}", e)))?,
    );
    Ok(content)
}

fn csv_attachment(kind: ReportKind, content: String) -> HttpResponse {
    let filename = format!("report_{}_{}.csv", kind, Utc::now().format("%Y%m%d_%H%M%S"));

    HttpResponse::Ok()
        .insert_header(("Content-Type", "text/csv; charset=utf-8"))
        .insert_header(("Content-Disposition", format!("attachment; filename=\"{}\"", filename)))
        .body(content)
}

// ==================== HANDLERS ====================

pub async fn get_report_types(
    _app_state: web::Data<Arc<AppState>>,
) -> ApiResult<HttpResponse> {
    let types: Vec<AvailableReport> = ReportKind::iter()
        .map(|kind| AvailableReport {
            id: kind.to_string(),
            description: kind.description().to_string(),
            default_range: DEFAULT_RANGE_KEY.to_string(),
        })
        .collect();

    Ok(HttpResponse::Ok().json(ApiResponse::success(types)))
}

/// Генерация отчёта. Отказ данных не приводит к ошибке HTTP: сервис
/// возвращает нулевую форму с degraded = true, дашборд остаётся живым.
pub async fn generate_report(
    app_state: web::Data<Arc<AppState>>,
    request: web::Json<GenerateReportRequest>,
) -> ApiResult<HttpResponse> {
    let kind = parse_report_kind(&request.report_type)?;
    let range = resolve_date_range(
        request.date_range.as_deref(),
        request.start_date,
        request.end_date,
    );
    let service = &app_state.report_service;

    let response = match kind {
        ReportKind::Usage => {
            HttpResponse::Ok().json(ApiResponse::success(service.usage_report(&range).await))
        }
        ReportKind::Availability => {
            HttpResponse::Ok().json(ApiResponse::success(service.availability_report(&range).await))
        }
        ReportKind::Maintenance => {
            HttpResponse::Ok().json(ApiResponse::success(service.maintenance_report(&range).await))
        }
        ReportKind::UserActivity => {
            HttpResponse::Ok().json(ApiResponse::success(service.user_activity_report(&range).await))
        }
        ReportKind::Financial => {
            HttpResponse::Ok().json(ApiResponse::success(service.financial_report(&range).await))
        }
    };

    Ok(response)
}

/// Экспорт строк отчёта в CSV-вложение
pub async fn export_report(
    app_state: web::Data<Arc<AppState>>,
    request: web::Json<GenerateReportRequest>,
) -> ApiResult<HttpResponse> {
    let kind = parse_report_kind(&request.report_type)?;
    let range = resolve_date_range(
        request.date_range.as_deref(),
        request.start_date,
        request.end_date,
    );
    let service = &app_state.report_service;

    let content = match kind {
        ReportKind::Usage => rows_to_csv(&service.usage_report(&range).await.data)?,
        ReportKind::Availability => rows_to_csv(&service.availability_report(&range).await.data)?,
        ReportKind::Maintenance => rows_to_csv(&service.maintenance_report(&range).await.data)?,
        ReportKind::UserActivity => rows_to_csv(&service.user_activity_report(&range).await.data)?,
        ReportKind::Financial => rows_to_csv(&service.financial_report(&range).await.data)?,
    };

    Ok(csv_attachment(kind, content))
}

/// Снимок статистики для дашборда
pub async fn get_dashboard_stats(
    app_state: web::Data<Arc<AppState>>,
) -> ApiResult<HttpResponse> {
    let stats = app_state.report_service.quick_stats().await;
    Ok(HttpResponse::Ok().json(ApiResponse::success(stats)))
}

// ==================== TESTS ====================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reports::service::UsageReportRow;

    #[test]
    fn test_parse_report_kind() {
        assert_eq!(parse_report_kind("usage").unwrap(), ReportKind::Usage);
        assert_eq!(parse_report_kind("user_activity").unwrap(), ReportKind::UserActivity);

        let err = parse_report_kind("payroll").unwrap_err();
        assert!(err.to_string().contains("payroll"));
        assert!(err.to_string().contains("financial"));
    }

    #[test]
    fn test_rows_to_csv_header_matches_field_order() {
        let rows = vec![
            UsageReportRow {
                equipment_name: "Spectrometer".to_string(),
                category: "instrument".to_string(),
                booking_count: 2,
                total_hours: 5.0,
                usage_percentage: 100.0,
            },
            UsageReportRow {
                equipment_name: "Centrifuge".to_string(),
                category: "instrument".to_string(),
                booking_count: 1,
                total_hours: 1.5,
                usage_percentage: 50.0,
            },
        ];

        let csv = rows_to_csv(&rows).unwrap();
        let body = csv.trim_start_matches('\u{FEFF}');
        let lines: Vec<&str> = body.lines().collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[0],
            "equipment_name,category,booking_count,total_hours,usage_percentage"
        );
        assert!(lines[1].starts_with("Spectrometer,instrument,2,"));
    }

    #[test]
    fn test_rows_to_csv_escapes_embedded_commas() {
        let rows = vec![UsageReportRow {
            equipment_name: "Balance, analytical".to_string(),
            category: "instrument".to_string(),
            booking_count: 1,
            total_hours: 1.0,
            usage_percentage: 100.0,
        }];

        let csv = rows_to_csv(&rows).unwrap();
        assert!(csv.contains("\"Balance, analytical\""));
    }

    #[test]
    fn test_csv_starts_with_bom() {
        let rows: Vec<UsageReportRow> = Vec::new();
        let csv = rows_to_csv(&rows).unwrap();
        assert!(csv.starts_with('\u{FEFF}'));
    }

    #[test]
    fn test_generate_request_deserialization() {
        let request: GenerateReportRequest = serde_json::from_str(
            r#"{"report_type": "usage", "date_range": "last7days"}"#,
        )
        .unwrap();
        assert_eq!(request.report_type, "usage");
        assert_eq!(request.date_range.as_deref(), Some("last7days"));
        assert!(request.start_date.is_none());

        let request: GenerateReportRequest = serde_json::from_str(
            r#"{"report_type": "financial",
                "start_date": "2025-03-01T00:00:00Z",
                "end_date": "2025-04-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert!(request.start_date.is_some());
        assert!(request.end_date.is_some());
    }
}
