// src/reports/date_range.rs
//! Разрешение символьных диапазонов дат для отчётов.

use chrono::{DateTime, Duration, Months, Utc};

/// Диапазон, по которому строится отчёт: [start, end)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Число календарных дней в диапазоне, неполный день округляется вверх
    pub fn days_ceil(&self) -> i64 {
        let seconds = (self.end - self.start).num_seconds();
        if seconds <= 0 {
            return 0;
        }
        (seconds + 86_399) / 86_400
    }
}

/// Ключ диапазона по умолчанию: нераспознанные ключи тихо откатываются сюда,
/// ошибкой это не считается
pub const DEFAULT_RANGE_KEY: &str = "last30days";

/// Преобразует символьный ключ (или явную пару дат) в конкретный диапазон.
///
/// Явная пара используется как есть, без проверки start <= end - валидация,
/// если нужна, остаётся на вызывающей стороне.
pub fn resolve_date_range(
    range_key: Option<&str>,
    custom_start: Option<DateTime<Utc>>,
    custom_end: Option<DateTime<Utc>>,
) -> DateRange {
    if let (Some(start), Some(end)) = (custom_start, custom_end) {
        return DateRange::new(start, end);
    }

    let end = Utc::now();
    let key = range_key.unwrap_or(DEFAULT_RANGE_KEY);

    let start = match key {
        "last7days" => end - Duration::days(7),
        "last30days" => end - Duration::days(30),
        "last3months" => end
            .checked_sub_months(Months::new(3))
            .unwrap_or(end - Duration::days(90)),
        "last6months" => end
            .checked_sub_months(Months::new(6))
            .unwrap_or(end - Duration::days(180)),
        "lastyear" => end
            .checked_sub_months(Months::new(12))
            .unwrap_or(end - Duration::days(365)),
        other => {
            log::debug!("Unknown date range key '{}', using {}", other, DEFAULT_RANGE_KEY);
            end - Duration::days(30)
        }
    };

    DateRange::new(start, end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_symbolic_ranges() {
        let r = resolve_date_range(Some("last7days"), None, None);
        assert_eq!((r.end - r.start).num_days(), 7);

        let r = resolve_date_range(Some("last30days"), None, None);
        assert_eq!((r.end - r.start).num_days(), 30);

        // Месячные ключи считаются по календарю, допускаем разброс
        let r = resolve_date_range(Some("last3months"), None, None);
        let days = (r.end - r.start).num_days();
        assert!((89..=92).contains(&days), "3 months resolved to {} days", days);

        let r = resolve_date_range(Some("last6months"), None, None);
        let days = (r.end - r.start).num_days();
        assert!((181..=184).contains(&days), "6 months resolved to {} days", days);

        let r = resolve_date_range(Some("lastyear"), None, None);
        let days = (r.end - r.start).num_days();
        assert!((365..=366).contains(&days), "1 year resolved to {} days", days);
    }

    #[test]
    fn test_unknown_key_falls_back_to_30_days() {
        let r = resolve_date_range(Some("bogus-key"), None, None);
        assert_eq!((r.end - r.start).num_days(), 30);

        let r = resolve_date_range(None, None, None);
        assert_eq!((r.end - r.start).num_days(), 30);
    }

    #[test]
    fn test_custom_range_used_verbatim() {
        let start = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 3, 15, 0, 0, 0).unwrap();

        let r = resolve_date_range(Some("last7days"), Some(start), Some(end));
        assert_eq!(r.start, start);
        assert_eq!(r.end, end);

        // Перевёрнутая пара не валидируется на этом уровне
        let r = resolve_date_range(None, Some(end), Some(start));
        assert_eq!(r.start, end);
        assert_eq!(r.end, start);
    }

    #[test]
    fn test_custom_range_requires_both_bounds() {
        let start = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();

        // Одной границы недостаточно - используется символьный ключ
        let r = resolve_date_range(Some("last7days"), Some(start), None);
        assert_eq!((r.end - r.start).num_days(), 7);
    }

    #[test]
    fn test_days_ceil() {
        let start = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();

        let r = DateRange::new(start, start + Duration::days(10));
        assert_eq!(r.days_ceil(), 10);

        // Неполный день округляется вверх
        let r = DateRange::new(start, start + Duration::days(10) + Duration::hours(1));
        assert_eq!(r.days_ceil(), 11);

        let r = DateRange::new(start, start);
        assert_eq!(r.days_ceil(), 0);

        // Перевёрнутый диапазон не даёт отрицательных дней
        let r = DateRange::new(start + Duration::days(1), start);
        assert_eq!(r.days_ceil(), 0);
    }
}
