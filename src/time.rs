//! Calendar helpers: date windows and lenient date parsing for feed cells.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Formats accepted for feed dates, tried in order.
const DATE_FORMATS: [&str; 5] = ["%Y-%m-%d", "%Y/%m/%d", "%d-%m-%Y", "%d/%m/%Y", "%Y%m%d"];

/// Inclusive calendar window `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        if start <= end {
            Self { start, end }
        } else {
            Self { start: end, end: start }
        }
    }

    /// The `days` calendar days ending at (and including) `today`.
    pub fn last_n_days(days: u32, today: NaiveDate) -> Self {
        let span = i64::from(days.max(1)) - 1;
        Self {
            start: today - Duration::days(span),
            end: today,
        }
    }

    /// Every day in the window, ascending.
    pub fn days(&self) -> Vec<NaiveDate> {
        let mut out = Vec::new();
        let mut current = self.start;
        while current <= self.end {
            out.push(current);
            current += Duration::days(1);
        }
        out
    }

    pub fn len(&self) -> usize {
        ((self.end - self.start).num_days() + 1) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

/// Parse a date in any of the supported formats.
pub fn parse_date_string(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    let parsed = DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok());
    if parsed.is_none() {
        warn!("Could not parse date string: {}", raw);
    }
    parsed
}

/// Canonical `YYYY-MM-DD` rendering used in snapshots.
pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_last_n_days_is_inclusive() {
        let window = DateWindow::last_n_days(30, d(2024, 1, 30));
        assert_eq!(window.start, d(2024, 1, 1));
        assert_eq!(window.len(), 30);
        assert_eq!(window.days().len(), 30);
    }

    #[test]
    fn test_new_orders_bounds() {
        let window = DateWindow::new(d(2024, 2, 3), d(2024, 2, 1));
        assert_eq!(window.start, d(2024, 2, 1));
        assert!(window.contains(d(2024, 2, 2)));
        assert!(!window.contains(d(2024, 2, 4)));
    }

    #[test]
    fn test_parse_date_formats() {
        assert_eq!(parse_date_string("2024-01-05"), Some(d(2024, 1, 5)));
        assert_eq!(parse_date_string("2024/01/05"), Some(d(2024, 1, 5)));
        assert_eq!(parse_date_string("05-01-2024"), Some(d(2024, 1, 5)));
        assert_eq!(parse_date_string("05/01/2024"), Some(d(2024, 1, 5)));
        assert_eq!(parse_date_string("20240105"), Some(d(2024, 1, 5)));
        assert_eq!(parse_date_string("yesterday"), None);
    }
}
