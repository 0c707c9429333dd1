//! Ingestion Module - daily feeds for the datamart
//!
//! Every adapter yields JSON records for one calendar window:
//! - `AnalyticsFeed`: GA4 Data API `runReport` (date, sessions, newUsers, totalRevenue, transactions)
//! - `PaymentsFeed`: Stripe payment intents summed per day (date, gross_revenue)
//! - `CsvFeed`: replays an exported CSV file for offline runs

pub mod analytics;
pub mod csv_feed;
pub mod payments;

pub use analytics::AnalyticsFeed;
pub use csv_feed::CsvFeed;
pub use payments::PaymentsFeed;

use crate::error::Result;
use crate::tabular::Record;
use crate::time::DateWindow;
use async_trait::async_trait;

/// Feed Adapter Trait
///
/// Implementations must not read credentials from the environment; they are
/// handed everything they need at construction.
#[async_trait]
pub trait FeedAdapter: Send + Sync {
    /// Fetch one record per day for `window`, ordered by date
    async fn fetch(&self, window: DateWindow) -> Result<Vec<Record>>;

    /// Unique identifier used in logs
    fn source_id(&self) -> &str;

    /// Source kind (e.g., "ga4", "stripe", "csv")
    fn source_type(&self) -> &str;

    /// Endpoint or file the adapter reads from
    fn source_uri(&self) -> Option<&str> {
        None
    }
}
