//! KPI Datamart - joins the analytics and payments feeds into daily KPI rows
//!
//! Numeric policy:
//! - the payments feed is left-joined on exact date; unmatched days get 0 revenue
//! - ratios over `sessions == 0` are NaN (undefined), never 0 and never an error
//! - every numeric field is rounded to 4 decimals, half away from zero

use crate::error::{KpiError, Result};
use crate::tabular::{Backend, PolarsFrame, Record, SimpleFrame, Tabular};
use crate::time::parse_date_string;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::{debug, info};

pub const DATE: &str = "date";
pub const SESSIONS: &str = "sessions";
pub const NEW_USERS: &str = "newUsers";
pub const TOTAL_REVENUE: &str = "totalRevenue";
pub const TRANSACTIONS: &str = "transactions";
pub const GROSS_REVENUE: &str = "gross_revenue";
pub const CONVERSION_RATE: &str = "conversion_rate";
pub const REVENUE_PER_SESSION: &str = "revenue_per_session";
pub const LTV_CAC_RATIO: &str = "ltv_cac_ratio";

/// Fields every analytics row must carry.
pub const ANALYTICS_FIELDS: [&str; 5] = [DATE, SESSIONS, NEW_USERS, TOTAL_REVENUE, TRANSACTIONS];

/// Fields every payments row must carry.
pub const PAYMENTS_FIELDS: [&str; 2] = [DATE, GROSS_REVENUE];

/// Snapshot column order.
pub const KPI_COLUMNS: [&str; 9] = [
    DATE,
    SESSIONS,
    NEW_USERS,
    TOTAL_REVENUE,
    TRANSACTIONS,
    GROSS_REVENUE,
    CONVERSION_RATE,
    REVENUE_PER_SESSION,
    LTV_CAC_RATIO,
];

const PRECISION: f64 = 10_000.0;

/// One calendar day of the datamart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KpiRow {
    pub date: NaiveDate,
    pub sessions: f64,
    #[serde(rename = "newUsers")]
    pub new_users: f64,
    #[serde(rename = "totalRevenue")]
    pub total_revenue: f64,
    pub transactions: f64,
    pub gross_revenue: f64,
    pub conversion_rate: f64,
    pub revenue_per_session: f64,
    /// Reserved for a cost feed; always NaN for now.
    pub ltv_cac_ratio: f64,
}

impl KpiRow {
    /// Numeric fields in snapshot column order (everything after `date`).
    pub fn numeric_fields(&self) -> [f64; 8] {
        [
            self.sessions,
            self.new_users,
            self.total_revenue,
            self.transactions,
            self.gross_revenue,
            self.conversion_rate,
            self.revenue_per_session,
            self.ltv_cac_ratio,
        ]
    }

    /// Value of a numeric column by its snapshot name.
    pub fn metric(&self, name: &str) -> Option<f64> {
        let value = match name {
            SESSIONS => self.sessions,
            NEW_USERS => self.new_users,
            TOTAL_REVENUE => self.total_revenue,
            TRANSACTIONS => self.transactions,
            GROSS_REVENUE => self.gross_revenue,
            CONVERSION_RATE => self.conversion_rate,
            REVENUE_PER_SESSION => self.revenue_per_session,
            LTV_CAC_RATIO => self.ltv_cac_ratio,
            _ => return None,
        };
        Some(value)
    }

    /// Field-wise equality where NaN matches NaN.
    pub fn same_values(&self, other: &KpiRow) -> bool {
        self.date == other.date
            && self
                .numeric_fields()
                .iter()
                .zip(other.numeric_fields().iter())
                .all(|(a, b)| (a.is_nan() && b.is_nan()) || a == b)
    }
}

/// Round to 4 decimals, half away from zero. NaN stays NaN.
pub fn round4(value: f64) -> f64 {
    (value * PRECISION).round() / PRECISION
}

/// `numerator / denominator`, undefined when the denominator is 0.
pub fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        f64::NAN
    } else {
        numerator / denominator
    }
}

/// Builds the KPI datamart from any tabular backend.
#[derive(Debug, Default, Clone, Copy)]
pub struct DatamartBuilder;

impl DatamartBuilder {
    pub fn new() -> Self {
        Self
    }

    pub fn build<A: Tabular, P: Tabular>(&self, analytics: &A, payments: &P) -> Result<Vec<KpiRow>> {
        if analytics.is_empty() {
            return Err(KpiError::EmptyInput(
                "analytics feed returned no rows; there is no day of activity to report".to_string(),
            ));
        }

        let analytics_cols = FeedColumns::extract(analytics, "analytics", &ANALYTICS_FIELDS)?;
        let payments_cols = FeedColumns::extract(payments, "payments", &PAYMENTS_FIELDS)?;

        let analytics_dates = analytics_cols.dates("analytics")?;
        let payments_dates = payments_cols.dates("payments")?;
        let sessions = analytics_cols.numbers("analytics", SESSIONS)?;
        let new_users = analytics_cols.numbers("analytics", NEW_USERS)?;
        let total_revenue = analytics_cols.numbers("analytics", TOTAL_REVENUE)?;
        let transactions = analytics_cols.numbers("analytics", TRANSACTIONS)?;
        let gross_revenue = payments_cols.numbers("payments", GROSS_REVENUE)?;

        let revenue_by_date: HashMap<NaiveDate, f64> = payments_dates
            .iter()
            .copied()
            .zip(gross_revenue.iter().copied())
            .collect();

        let mut unmatched = 0usize;
        let rows: Vec<KpiRow> = analytics_dates
            .iter()
            .enumerate()
            .map(|(i, &date)| {
                let revenue = revenue_by_date.get(&date).copied().unwrap_or_else(|| {
                    unmatched += 1;
                    0.0
                });
                let row_sessions = sessions[i];

                KpiRow {
                    date,
                    sessions: round4(row_sessions),
                    new_users: round4(new_users[i]),
                    total_revenue: round4(total_revenue[i]),
                    transactions: round4(transactions[i]),
                    gross_revenue: round4(revenue),
                    conversion_rate: round4(ratio(transactions[i], row_sessions)),
                    revenue_per_session: round4(ratio(revenue, row_sessions)),
                    ltv_cac_ratio: f64::NAN,
                }
            })
            .collect();

        if unmatched > 0 {
            debug!("{} analytics days had no payments row; revenue defaulted to 0", unmatched);
        }
        info!("Created KPI datamart with {} rows", rows.len());
        Ok(rows)
    }

    /// Build from raw feed records on the chosen backend.
    pub fn build_records(&self, backend: Backend, analytics: Vec<Record>, payments: Vec<Record>) -> Result<Vec<KpiRow>> {
        debug!("Building datamart on the {} backend", backend);
        match backend {
            Backend::Simple => self.build(
                &SimpleFrame::from_records(analytics)?,
                &SimpleFrame::from_records(payments)?,
            ),
            Backend::Polars => self.build(
                &PolarsFrame::from_records(analytics)?,
                &PolarsFrame::from_records(payments)?,
            ),
        }
    }

    /// Build from exported feed CSV files on the chosen backend.
    pub fn build_csv(&self, backend: Backend, analytics: &Path, payments: &Path) -> Result<Vec<KpiRow>> {
        for (feed, path) in [("analytics", analytics), ("payments", payments)] {
            if !path.is_file() {
                return Err(KpiError::Upstream(format!("{} file not found: {}", feed, path.display())));
            }
        }
        match backend {
            Backend::Simple => self.build(&SimpleFrame::read_csv(analytics)?, &SimpleFrame::read_csv(payments)?),
            Backend::Polars => self.build(&PolarsFrame::read_csv(analytics)?, &PolarsFrame::read_csv(payments)?),
        }
    }
}

/// Required columns pulled out of one feed.
struct FeedColumns {
    len: usize,
    columns: HashMap<&'static str, Vec<Value>>,
}

impl FeedColumns {
    fn extract<T: Tabular>(table: &T, feed: &str, required: &[&'static str]) -> Result<Self> {
        let mut columns = HashMap::new();
        // A feed without rows has no fields to check
        if table.is_empty() {
            return Ok(Self { len: 0, columns });
        }
        for &field in required {
            let values = table.column(field).ok_or_else(|| {
                KpiError::Schema(format!("{} feed is missing required field '{}'", feed, field))
            })?;
            columns.insert(field, values);
        }
        Ok(Self {
            len: table.len(),
            columns,
        })
    }

    fn values(&self, field: &str) -> &[Value] {
        self.columns.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    fn dates(&self, feed: &str) -> Result<Vec<NaiveDate>> {
        let mut seen = HashSet::with_capacity(self.len);
        self.values(DATE)
            .iter()
            .enumerate()
            .map(|(row, cell)| {
                let date = date_cell(cell).ok_or_else(|| {
                    KpiError::Schema(format!("{} feed row {} has no usable 'date' ({})", feed, row + 1, cell))
                })?;
                if !seen.insert(date) {
                    return Err(KpiError::Schema(format!(
                        "{} feed has more than one row for {}",
                        feed, date
                    )));
                }
                Ok(date)
            })
            .collect()
    }

    fn numbers(&self, feed: &str, field: &str) -> Result<Vec<f64>> {
        self.values(field)
            .iter()
            .enumerate()
            .map(|(row, cell)| {
                number_cell(cell).ok_or_else(|| {
                    KpiError::Schema(format!(
                        "{} feed row {} has no numeric '{}' ({})",
                        feed,
                        row + 1,
                        field,
                        cell
                    ))
                })
            })
            .collect()
    }
}

fn date_cell(cell: &Value) -> Option<NaiveDate> {
    match cell {
        Value::String(s) => parse_date_string(s),
        Value::Number(n) => parse_date_string(&n.to_string()),
        _ => None,
    }
}

fn number_cell(cell: &Value) -> Option<f64> {
    match cell {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn frame(rows: Vec<Value>) -> SimpleFrame {
        SimpleFrame::new(rows.into_iter().map(|r| r.as_object().cloned().unwrap()).collect())
    }

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_single_day_join_and_ratios() {
        let analytics = frame(vec![json!({
            "date": "2024-01-01", "sessions": 100, "newUsers": 50,
            "totalRevenue": 1000, "transactions": 10
        })]);
        let payments = frame(vec![json!({"date": "2024-01-01", "gross_revenue": 1100})]);

        let rows = DatamartBuilder::new().build(&analytics, &payments).unwrap();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.date, d("2024-01-01"));
        assert_eq!(row.conversion_rate, 0.1);
        assert_eq!(row.revenue_per_session, 11.0);
        assert_eq!(row.gross_revenue, 1100.0);
        assert!(row.ltv_cac_ratio.is_nan());
    }

    #[test]
    fn test_zero_sessions_without_payment_is_undefined_not_zero() {
        let analytics = frame(vec![json!({
            "date": "2024-01-02", "sessions": 0, "newUsers": 0,
            "totalRevenue": 0, "transactions": 0
        })]);
        let payments = frame(vec![json!({"date": "2024-01-01", "gross_revenue": 5})]);

        let rows = DatamartBuilder::new().build(&analytics, &payments).unwrap();
        assert_eq!(rows[0].gross_revenue, 0.0);
        assert!(rows[0].conversion_rate.is_nan());
        assert!(rows[0].revenue_per_session.is_nan());
    }

    #[test]
    fn test_row_count_and_order_follow_analytics() {
        let analytics = frame(vec![
            json!({"date": "2024-01-03", "sessions": 10, "newUsers": 1, "totalRevenue": 0, "transactions": 1}),
            json!({"date": "2024-01-01", "sessions": 20, "newUsers": 2, "totalRevenue": 0, "transactions": 2}),
            json!({"date": "2024-01-02", "sessions": 30, "newUsers": 3, "totalRevenue": 0, "transactions": 3}),
        ]);
        let payments = frame(vec![
            json!({"date": "2024-01-01", "gross_revenue": 40}),
            json!({"date": "2023-12-31", "gross_revenue": 99}),
        ]);

        let rows = DatamartBuilder::new().build(&analytics, &payments).unwrap();
        let dates: Vec<NaiveDate> = rows.iter().map(|r| r.date).collect();
        assert_eq!(dates, vec![d("2024-01-03"), d("2024-01-01"), d("2024-01-02")]);
        assert_eq!(rows[1].gross_revenue, 40.0);
        assert_eq!(rows[1].revenue_per_session, 2.0);
        assert_eq!(rows[0].gross_revenue, 0.0);
    }

    #[test]
    fn test_compact_date_format_is_accepted() {
        let analytics = frame(vec![json!({
            "date": "20240105", "sessions": 3, "newUsers": 1, "totalRevenue": 0, "transactions": 1
        })]);
        let payments = SimpleFrame::from_records(vec![Record::from_iter([
            ("date".to_string(), json!("2024-01-01")),
            ("gross_revenue".to_string(), json!(1)),
        ])])
        .unwrap();

        let rows = DatamartBuilder::new().build(&analytics, &payments).unwrap();
        assert_eq!(rows[0].date, d("2024-01-05"));
        assert_eq!(rows[0].conversion_rate, 0.3333);
    }

    #[test]
    fn test_empty_payments_feed_defaults_revenue() {
        let analytics = frame(vec![json!({
            "date": "2024-01-01", "sessions": 4, "newUsers": 1, "totalRevenue": 0, "transactions": 1
        })]);
        let rows = DatamartBuilder::new()
            .build(&analytics, &SimpleFrame::default())
            .unwrap();
        assert_eq!(rows[0].gross_revenue, 0.0);
        assert_eq!(rows[0].revenue_per_session, 0.0);
        assert_eq!(rows[0].conversion_rate, 0.25);
    }

    #[test]
    fn test_rounding_is_half_away_from_zero() {
        // 1/32 is exact in binary, so x * 10_000 lands exactly on .5
        assert_eq!(round4(0.03125), 0.0313);
        assert_eq!(round4(-0.03125), -0.0313);
        assert_eq!(round4(0.09375), 0.0938);
        assert_eq!(round4(2.0 / 3.0), 0.6667);
        assert!(round4(f64::NAN).is_nan());
    }

    #[test]
    fn test_empty_analytics_is_an_error() {
        let payments = frame(vec![json!({"date": "2024-01-01", "gross_revenue": 1})]);
        let err = DatamartBuilder::new()
            .build(&SimpleFrame::default(), &payments)
            .unwrap_err();
        assert!(matches!(err, KpiError::EmptyInput(_)));
    }

    #[test]
    fn test_missing_field_is_schema_error() {
        let analytics = frame(vec![json!({"date": "2024-01-01", "sessions": 1, "newUsers": 1, "totalRevenue": 1})]);
        let payments = frame(vec![json!({"date": "2024-01-01", "gross_revenue": 1})]);
        let err = DatamartBuilder::new().build(&analytics, &payments).unwrap_err();
        assert!(matches!(err, KpiError::Schema(ref m) if m.contains("transactions")));

        let analytics = frame(vec![json!({
            "date": "2024-01-01", "sessions": 1, "newUsers": 1, "totalRevenue": 1, "transactions": 1
        })]);
        let payments = frame(vec![json!({"date": "2024-01-01", "revenue": 1})]);
        let err = DatamartBuilder::new().build(&analytics, &payments).unwrap_err();
        assert!(matches!(err, KpiError::Schema(ref m) if m.contains("gross_revenue")));
    }

    #[test]
    fn test_row_lacking_cell_is_schema_error() {
        let analytics = frame(vec![
            json!({"date": "2024-01-01", "sessions": 1, "newUsers": 1, "totalRevenue": 1, "transactions": 1}),
            json!({"date": "2024-01-02", "sessions": 1, "newUsers": 1, "totalRevenue": 1}),
        ]);
        let payments = frame(vec![json!({"date": "2024-01-01", "gross_revenue": 1})]);
        let err = DatamartBuilder::new().build(&analytics, &payments).unwrap_err();
        assert!(matches!(err, KpiError::Schema(ref m) if m.contains("row 2")));
    }

    #[test]
    fn test_duplicate_dates_are_rejected() {
        let analytics = frame(vec![
            json!({"date": "2024-01-01", "sessions": 1, "newUsers": 1, "totalRevenue": 1, "transactions": 1}),
            json!({"date": "2024-01-01", "sessions": 2, "newUsers": 1, "totalRevenue": 1, "transactions": 1}),
        ]);
        let payments = frame(vec![json!({"date": "2024-01-01", "gross_revenue": 1})]);
        let err = DatamartBuilder::new().build(&analytics, &payments).unwrap_err();
        assert!(matches!(err, KpiError::Schema(_)));
    }

    #[test]
    fn test_polars_backend_builds_same_rows() {
        let records = |rows: Vec<Value>| -> Vec<Record> {
            rows.into_iter().map(|r| r.as_object().cloned().unwrap()).collect()
        };
        let analytics_rows = vec![
            json!({"date": "2024-01-01", "sessions": 100, "newUsers": 50, "totalRevenue": 1000, "transactions": 10}),
            json!({"date": "2024-01-02", "sessions": 0, "newUsers": 0, "totalRevenue": 0, "transactions": 0}),
        ];
        let payments_rows = vec![json!({"date": "2024-01-01", "gross_revenue": 1100.0})];

        let simple = DatamartBuilder::new()
            .build(
                &SimpleFrame::new(records(analytics_rows.clone())),
                &SimpleFrame::new(records(payments_rows.clone())),
            )
            .unwrap();
        let polars = DatamartBuilder::new()
            .build(
                &PolarsFrame::from_records(records(analytics_rows)).unwrap(),
                &PolarsFrame::from_records(records(payments_rows)).unwrap(),
            )
            .unwrap();

        assert_eq!(simple.len(), polars.len());
        assert!(simple.iter().zip(polars.iter()).all(|(a, b)| a.same_values(b)));
    }
}
