//! CSV Feed - replays an exported feed file through the adapter interface

use crate::datamart::DATE;
use crate::error::{KpiError, Result};
use crate::ingestion::FeedAdapter;
use crate::tabular::{cell_to_string, Record, SimpleFrame, Tabular};
use crate::time::{parse_date_string, DateWindow};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::path::PathBuf;
use tracing::info;

pub struct CsvFeed {
    source_id: String,
    path: PathBuf,
    uri: String,
}

impl CsvFeed {
    pub fn new(source_id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let uri = path.display().to_string();
        Self {
            source_id: source_id.into(),
            path,
            uri,
        }
    }

    /// Every record in the file, unfiltered.
    pub fn read_all(&self) -> Result<Vec<Record>> {
        if !self.path.exists() {
            return Err(KpiError::Upstream(format!("feed file not found: {}", self.uri)));
        }
        Ok(SimpleFrame::read_csv(&self.path)?.to_records())
    }
}

fn record_date(record: &Record) -> Option<NaiveDate> {
    record
        .get(DATE)
        .map(cell_to_string)
        .and_then(|raw| parse_date_string(&raw))
}

#[async_trait]
impl FeedAdapter for CsvFeed {
    /// Rows dated outside the window are dropped and the rest ordered by
    /// date. Rows whose date cannot be read are kept, last, so the builder
    /// reports them.
    async fn fetch(&self, window: DateWindow) -> Result<Vec<Record>> {
        let mut dated: Vec<(Option<NaiveDate>, Record)> = self
            .read_all()?
            .into_iter()
            .map(|record| (record_date(&record), record))
            .filter(|(date, _)| date.map_or(true, |date| window.contains(date)))
            .collect();
        dated.sort_by_key(|(date, _)| (date.is_none(), *date));
        let records: Vec<Record> = dated.into_iter().map(|(_, record)| record).collect();

        info!("Replayed {} rows from {}", records.len(), self.uri);
        Ok(records)
    }

    fn source_id(&self) -> &str {
        &self.source_id
    }

    fn source_type(&self) -> &str {
        "csv"
    }

    fn source_uri(&self) -> Option<&str> {
        Some(&self.uri)
    }
}
