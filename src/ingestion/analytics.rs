//! GA4 Analytics Feed - daily traffic and e-commerce metrics via `runReport`

use crate::datamart::{DATE, NEW_USERS, SESSIONS, TOTAL_REVENUE, TRANSACTIONS};
use crate::error::{KpiError, Result};
use crate::ingestion::FeedAdapter;
use crate::tabular::{coerce_cell, Record};
use crate::time::{format_date, parse_date_string, DateWindow};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

pub const GA4_BASE_URL: &str = "https://analyticsdata.googleapis.com/v1beta";

/// Metrics requested from GA4, in response order.
const REPORT_METRICS: [&str; 4] = [SESSIONS, NEW_USERS, TOTAL_REVENUE, TRANSACTIONS];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RunReportResponse {
    #[serde(default)]
    rows: Vec<ReportRow>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReportRow {
    #[serde(default)]
    dimension_values: Vec<ReportCell>,
    #[serde(default)]
    metric_values: Vec<ReportCell>,
}

#[derive(Debug, Deserialize)]
struct ReportCell {
    value: String,
}

pub struct AnalyticsFeed {
    property_id: String,
    access_token: String,
    endpoint: String,
    client: reqwest::Client,
}

impl AnalyticsFeed {
    pub fn new(property_id: String, access_token: String) -> Self {
        Self::with_base_url(property_id, access_token, GA4_BASE_URL)
    }

    pub fn with_base_url(property_id: String, access_token: String, base_url: &str) -> Self {
        let endpoint = format!(
            "{}/properties/{}:runReport",
            base_url.trim_end_matches('/'),
            property_id
        );
        Self {
            property_id,
            access_token,
            endpoint,
            client: reqwest::Client::new(),
        }
    }
}

/// Request body for a one-dimension (date) daily report.
pub fn report_request(window: DateWindow) -> Value {
    json!({
        "dateRanges": [{
            "startDate": format_date(window.start),
            "endDate": format_date(window.end)
        }],
        "dimensions": [{"name": "date"}],
        "metrics": REPORT_METRICS.iter().map(|m| json!({"name": m})).collect::<Vec<_>>(),
        "orderBys": [{"dimension": {"dimensionName": "date"}}],
        "keepEmptyRows": true
    })
}

/// Decode a `runReport` response into date-sorted records.
pub fn decode_report(response: &Value) -> Result<Vec<Record>> {
    let report: RunReportResponse = serde_json::from_value(response.clone())?;

    let mut dated = Vec::with_capacity(report.rows.len());
    for (idx, row) in report.rows.iter().enumerate() {
        let raw_date = row
            .dimension_values
            .first()
            .map(|c| c.value.as_str())
            .unwrap_or("");
        let date = parse_date_string(raw_date).ok_or_else(|| {
            KpiError::Upstream(format!("GA4 row {} has unreadable date '{}'", idx, raw_date))
        })?;

        if row.metric_values.len() != REPORT_METRICS.len() {
            return Err(KpiError::Upstream(format!(
                "GA4 row {} has {} metric values, expected {}",
                idx,
                row.metric_values.len(),
                REPORT_METRICS.len()
            )));
        }

        let mut record = Record::new();
        record.insert(DATE.to_string(), Value::String(format_date(date)));
        for (name, cell) in REPORT_METRICS.iter().zip(row.metric_values.iter()) {
            let value = coerce_cell(&cell.value);
            if !value.is_number() {
                return Err(KpiError::Upstream(format!(
                    "GA4 row {} has non-numeric {} '{}'",
                    idx, name, cell.value
                )));
            }
            record.insert(name.to_string(), value);
        }
        dated.push((date, record));
    }

    dated.sort_by_key(|(date, _)| *date);
    Ok(dated.into_iter().map(|(_, record)| record).collect())
}

#[async_trait]
impl FeedAdapter for AnalyticsFeed {
    async fn fetch(&self, window: DateWindow) -> Result<Vec<Record>> {
        info!(
            "Fetching GA4 report for property {} ({} to {})",
            self.property_id, window.start, window.end
        );

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.access_token)
            .json(&report_request(window))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(KpiError::Upstream(format!("GA4 API returned {}: {}", status, detail)));
        }

        let body: Value = response.json().await?;
        let records = decode_report(&body)?;
        debug!("GA4 returned {} daily rows", records.len());
        Ok(records)
    }

    fn source_id(&self) -> &str {
        &self.property_id
    }

    fn source_type(&self) -> &str {
        "ga4"
    }

    fn source_uri(&self) -> Option<&str> {
        Some(&self.endpoint)
    }
}
