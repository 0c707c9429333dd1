//! Stripe Payments Feed - succeeded payment intents summed per local day

use crate::datamart::{DATE, GROSS_REVENUE};
use crate::error::{KpiError, Result};
use crate::ingestion::FeedAdapter;
use crate::tabular::Record;
use crate::time::{format_date, DateWindow};
use async_trait::async_trait;
use chrono::{Local, NaiveDate, NaiveTime, TimeZone};
use serde::Deserialize;
use serde_json::{Number, Value};
use std::collections::BTreeMap;
use tracing::{debug, info};

pub const STRIPE_BASE_URL: &str = "https://api.stripe.com/v1";
const PAGE_LIMIT: u32 = 100;
const SUCCEEDED: &str = "succeeded";

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    /// Smallest currency unit (cents).
    pub amount: i64,
    /// Unix seconds.
    pub created: i64,
    pub status: String,
}

#[derive(Debug, Deserialize)]
struct PaymentIntentPage {
    #[serde(default)]
    data: Vec<PaymentIntent>,
    #[serde(default)]
    has_more: bool,
}

pub struct PaymentsFeed {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl PaymentsFeed {
    pub fn new(api_key: String) -> Self {
        Self::with_base_url(api_key, STRIPE_BASE_URL)
    }

    pub fn with_base_url(api_key: String, base_url: &str) -> Self {
        Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    async fn fetch_page(&self, gte: i64, lte: i64, starting_after: Option<&str>) -> Result<PaymentIntentPage> {
        let mut query = vec![
            ("limit", PAGE_LIMIT.to_string()),
            ("created[gte]", gte.to_string()),
            ("created[lte]", lte.to_string()),
        ];
        if let Some(cursor) = starting_after {
            query.push(("starting_after", cursor.to_string()));
        }

        let response = self
            .client
            .get(format!("{}/payment_intents", self.base_url))
            .basic_auth(&self.api_key, None::<&str>)
            .query(&query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(KpiError::Upstream(format!("Stripe API returned {}: {}", status, detail)));
        }
        Ok(response.json().await?)
    }
}

/// Unix-second bounds covering the window in `tz`: first to last second.
pub fn window_bounds<Tz: TimeZone>(window: DateWindow, tz: &Tz) -> (i64, i64) {
    let to_timestamp = |date: NaiveDate, time: NaiveTime| {
        let naive = date.and_time(time);
        tz.from_local_datetime(&naive)
            .earliest()
            .unwrap_or_else(|| tz.from_utc_datetime(&naive))
            .timestamp()
    };
    let last_second = NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN);
    (
        to_timestamp(window.start, NaiveTime::MIN),
        to_timestamp(window.end, last_second),
    )
}

/// Sum succeeded intents per calendar day in `tz`. Every day of the window is
/// present, days without payments carry 0.
pub fn aggregate_daily_revenue<Tz: TimeZone>(
    intents: &[PaymentIntent],
    window: DateWindow,
    tz: &Tz,
) -> Vec<Record> {
    let mut cents: BTreeMap<NaiveDate, i64> = window.days().into_iter().map(|d| (d, 0)).collect();

    for intent in intents.iter().filter(|i| i.status == SUCCEEDED) {
        let Some(created) = tz.timestamp_opt(intent.created, 0).single() else {
            debug!("Skipping payment intent {} with invalid timestamp", intent.id);
            continue;
        };
        match cents.get_mut(&created.date_naive()) {
            Some(total) => *total += intent.amount,
            None => debug!("Payment intent {} falls outside the window", intent.id),
        }
    }

    cents
        .into_iter()
        .map(|(date, total)| {
            let amount = Number::from_f64(total as f64 / 100.0).map(Value::Number).unwrap_or(Value::Null);
            let mut record = Record::new();
            record.insert(DATE.to_string(), Value::String(format_date(date)));
            record.insert(GROSS_REVENUE.to_string(), amount);
            record
        })
        .collect()
}

#[async_trait]
impl FeedAdapter for PaymentsFeed {
    async fn fetch(&self, window: DateWindow) -> Result<Vec<Record>> {
        let (gte, lte) = window_bounds(window, &Local);
        info!("Fetching Stripe payment intents ({} to {})", window.start, window.end);

        let mut intents = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = self.fetch_page(gte, lte, cursor.as_deref()).await?;
            let last_id = page.data.last().map(|i| i.id.clone());
            intents.extend(page.data);

            match last_id {
                Some(id) if page.has_more => cursor = Some(id),
                _ => break,
            }
        }

        debug!("Stripe returned {} payment intents", intents.len());
        Ok(aggregate_daily_revenue(&intents, window, &Local))
    }

    fn source_id(&self) -> &str {
        "stripe"
    }

    fn source_type(&self) -> &str {
        "stripe"
    }

    fn source_uri(&self) -> Option<&str> {
        Some(&self.base_url)
    }
}
