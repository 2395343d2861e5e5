// src/reports/mod.rs
//! Слой агрегации отчётов.
//!
//! Схема модуля:
//! - date_range: разрешение символьных диапазонов в конкретные границы
//! - store: типизированный интерфейс чтения поверх пула БД
//! - service: генераторы отчётов с политикой "не ломать дашборд"
//!
//! Результат всегда имеет форму Report { summary, data }: summary - сводные
//! цифры, data - плоские строки с фиксированным набором полей, пригодные
//! как заголовки колонок при экспорте.

pub mod date_range;
pub mod service;
pub mod store;

pub use date_range::{resolve_date_range, DateRange, DEFAULT_RANGE_KEY};
pub use service::{QuickStats, ReportService};
pub use store::{ReportStore, SqliteReportStore};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// Вид отчёта
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display, EnumIter,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    Usage,
    Availability,
    Maintenance,
    UserActivity,
    Financial,
}

impl ReportKind {
    pub fn description(&self) -> &'static str {
        match self {
            ReportKind::Usage => "Equipment ranked by booking volume",
            ReportKind::Availability => "Free operating hours per equipment item",
            ReportKind::Maintenance => "Maintenance records with cost and status breakdowns",
            ReportKind::UserActivity => "Users ranked by booking activity",
            ReportKind::Financial => "Maintenance spend with a monthly series",
        }
    }
}

/// Пара сводка + строки: форма результата любого генератора
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Report<S, R> {
    pub summary: S,
    pub data: Vec<R>,
}
