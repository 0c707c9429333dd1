//! Window statistics over the KPI table.
//!
//! Two trend rules live here and are intentionally separate:
//! - `TrendDirection` (prompt input): mean of the last 7 rows vs the first 7,
//!   strictly greater means increasing, anything else decreasing
//! - `TrendClass` (`classify_trend`): ±5% relative change with `stable` and
//!   `insufficient_data` outcomes

use crate::datamart::{KpiRow, CONVERSION_RATE, GROSS_REVENUE, NEW_USERS, REVENUE_PER_SESSION, SESSIONS};
use crate::error::{KpiError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Metrics summarized for the prompt, in prompt order.
pub const SUMMARY_METRICS: [&str; 5] = [SESSIONS, NEW_USERS, GROSS_REVENUE, CONVERSION_RATE, REVENUE_PER_SESSION];

/// Rows in each leading/trailing trend window.
pub const TREND_WINDOW: usize = 7;

/// Relative change that separates a trend from noise in `classify_trend`.
const CLASSIFY_THRESHOLD: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
}

impl TrendDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrendDirection::Increasing => "increasing",
            TrendDirection::Decreasing => "decreasing",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendClass {
    Increasing,
    Decreasing,
    Stable,
    InsufficientData,
}

impl TrendClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrendClass::Increasing => "increasing",
            TrendClass::Decreasing => "decreasing",
            TrendClass::Stable => "stable",
            TrendClass::InsufficientData => "insufficient_data",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendSummary {
    pub mean: f64,
    pub max: f64,
    pub min: f64,
    /// Only reported for revenue-like metrics.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub total: Option<f64>,
    pub trend: TrendDirection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KpiSummary {
    pub days: usize,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub metrics: BTreeMap<String, TrendSummary>,
}

impl KpiSummary {
    pub fn get(&self, metric: &str) -> Option<&TrendSummary> {
        self.metrics.get(metric)
    }
}

/// Summarize every prompt metric over `rows`, ordered by date.
pub fn summarize(rows: &[KpiRow]) -> Result<KpiSummary> {
    if rows.is_empty() {
        return Err(KpiError::EmptyInput("cannot summarize an empty KPI table".to_string()));
    }

    let mut ordered: Vec<&KpiRow> = rows.iter().collect();
    ordered.sort_by_key(|row| row.date);

    let mut metrics = BTreeMap::new();
    for metric in SUMMARY_METRICS {
        let values: Vec<f64> = ordered
            .iter()
            .filter_map(|row| row.metric(metric))
            .collect();

        let total = (metric == GROSS_REVENUE).then(|| nan_sum(&values));
        metrics.insert(
            metric.to_string(),
            TrendSummary {
                mean: nan_mean(&values),
                max: nan_max(&values),
                min: nan_min(&values),
                total,
                trend: window_trend(&values),
            },
        );
    }

    Ok(KpiSummary {
        days: ordered.len(),
        start: ordered[0].date,
        end: ordered[ordered.len() - 1].date,
        metrics,
    })
}

/// Last-window mean vs first-window mean. Short series compare overlapping
/// windows, so ties and NaN means resolve to `Decreasing`.
pub fn window_trend(values: &[f64]) -> TrendDirection {
    let head = &values[..values.len().min(TREND_WINDOW)];
    let tail = &values[values.len().saturating_sub(TREND_WINDOW)..];
    if nan_mean(tail) > nan_mean(head) {
        TrendDirection::Increasing
    } else {
        TrendDirection::Decreasing
    }
}

/// Three-way trend classification over `window`-sized leading/trailing slices.
pub fn classify_trend(values: &[f64], window: usize) -> TrendClass {
    if window == 0 || values.len() < window * 2 {
        return TrendClass::InsufficientData;
    }

    let recent = nan_mean(&values[values.len() - window..]);
    let past = nan_mean(&values[..window]);

    if past == 0.0 {
        return TrendClass::Stable;
    }

    let change = (recent - past) / past;
    if change > CLASSIFY_THRESHOLD {
        TrendClass::Increasing
    } else if change < -CLASSIFY_THRESHOLD {
        TrendClass::Decreasing
    } else {
        TrendClass::Stable
    }
}

fn defined(values: &[f64]) -> impl Iterator<Item = f64> + '_ {
    values.iter().copied().filter(|v| !v.is_nan())
}

pub fn nan_sum(values: &[f64]) -> f64 {
    defined(values).sum()
}

pub fn nan_mean(values: &[f64]) -> f64 {
    let (sum, count) = defined(values).fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        f64::NAN
    } else {
        sum / count as f64
    }
}

pub fn nan_max(values: &[f64]) -> f64 {
    defined(values).reduce(f64::max).unwrap_or(f64::NAN)
}

pub fn nan_min(values: &[f64]) -> f64 {
    defined(values).reduce(f64::min).unwrap_or(f64::NAN)
}
