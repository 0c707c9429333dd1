//! SimpleFrame - dependency-free record set
//!
//! Rows are kept as ordered maps; columns are derived from the first row.

use crate::error::Result;
use crate::tabular::{cell_to_string, coerce_cell, Record, Tabular};
use csv::{ReaderBuilder, WriterBuilder};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimpleFrame {
    rows: Vec<Record>,
    columns: Vec<String>,
}

impl SimpleFrame {
    pub fn new(rows: Vec<Record>) -> Self {
        let columns = rows
            .first()
            .map(|row| row.keys().cloned().collect())
            .unwrap_or_default();
        Self { rows, columns }
    }

    pub fn rows(&self) -> &[Record] {
        &self.rows
    }

    pub fn row(&self, index: usize) -> Option<&Record> {
        self.rows.get(index)
    }
}

/// Join key; cells are compared by their JSON rendering.
fn key_of(value: &Value) -> String {
    value.to_string()
}

impl Tabular for SimpleFrame {
    fn backend_name(&self) -> &'static str {
        "simple"
    }

    fn from_records(records: Vec<Record>) -> Result<Self> {
        Ok(Self::new(records))
    }

    fn to_records(&self) -> Vec<Record> {
        self.rows.clone()
    }

    fn columns(&self) -> Vec<String> {
        self.columns.clone()
    }

    fn len(&self) -> usize {
        self.rows.len()
    }

    fn column(&self, name: &str) -> Option<Vec<Value>> {
        if !self.columns.iter().any(|c| c == name) {
            return None;
        }
        Some(
            self.rows
                .iter()
                .map(|row| row.get(name).cloned().unwrap_or(Value::Null))
                .collect(),
        )
    }

    fn merge(&self, other: &Self, on: &str) -> Result<Self> {
        // Later rows win when the right side repeats a key
        let lookup: HashMap<String, &Record> = other
            .rows
            .iter()
            .filter_map(|row| row.get(on).map(|key| (key_of(key), row)))
            .collect();

        let merged = self
            .rows
            .iter()
            .map(|row| {
                let mut merged_row = row.clone();
                if let Some(right) = row.get(on).and_then(|key| lookup.get(&key_of(key))) {
                    for (field, value) in right.iter() {
                        merged_row.insert(field.clone(), value.clone());
                    }
                }
                merged_row
            })
            .collect();

        Ok(Self::new(merged))
    }

    fn write_csv(&self, path: &Path) -> Result<()> {
        if self.rows.is_empty() {
            debug!("Skipping CSV write for empty frame: {}", path.display());
            return Ok(());
        }

        let mut writer = WriterBuilder::new().from_path(path)?;
        writer.write_record(&self.columns)?;
        for row in &self.rows {
            let record: Vec<String> = self
                .columns
                .iter()
                .map(|c| row.get(c).map(cell_to_string).unwrap_or_default())
                .collect();
            writer.write_record(&record)?;
        }
        writer.flush()?;
        Ok(())
    }

    fn read_csv(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!("File not found: {}", path.display());
            return Ok(Self::default());
        }

        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(path)?;

        let headers: Vec<String> = reader.headers()?.iter().map(|h| h.trim().to_string()).collect();

        let mut rows = Vec::new();
        for result in reader.records() {
            let record = result?;
            let mut row = Record::new();
            for (idx, header) in headers.iter().enumerate() {
                let cell = record.get(idx).unwrap_or("");
                row.insert(header.clone(), coerce_cell(cell));
            }
            rows.push(row);
        }

        Ok(Self::new(rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    fn sample() -> SimpleFrame {
        SimpleFrame::new(vec![
            record(json!({"date": "2024-01-01", "sessions": 100, "channel": "organic"})),
            record(json!({"date": "2024-01-02", "sessions": 300, "channel": "paid"})),
            record(json!({"date": "2024-01-03", "sessions": "n/a", "channel": "paid"})),
        ])
    }

    #[test]
    fn test_columns_follow_first_row() {
        let frame = sample();
        assert_eq!(frame.columns(), vec!["date", "sessions", "channel"]);
        assert_eq!(frame.len(), 3);
        assert!(frame.column("missing").is_none());
    }

    #[test]
    fn test_aggregates_treat_non_numeric_as_zero() {
        let frame = sample();
        assert_eq!(frame.sum("sessions"), 400.0);
        assert!((frame.mean("sessions") - 400.0 / 3.0).abs() < 1e-9);
        assert_eq!(frame.max("sessions"), 300.0);
        assert_eq!(frame.min("sessions"), 0.0);
        assert_eq!(frame.sum("unknown"), 0.0);
    }

    #[test]
    fn test_empty_frame_aggregates_to_zero() {
        let frame = SimpleFrame::default();
        assert_eq!(frame.mean("x"), 0.0);
        assert_eq!(frame.max("x"), 0.0);
        assert_eq!(frame.min("x"), 0.0);
        assert!(frame.columns().is_empty());
    }

    #[test]
    fn test_merge_is_left_join_with_right_override() {
        let left = sample();
        let right = SimpleFrame::new(vec![
            record(json!({"date": "2024-01-02", "channel": "email", "gross_revenue": 50.5})),
            record(json!({"date": "2024-02-01", "channel": "ignored", "gross_revenue": 9.0})),
        ]);

        let merged = left.merge(&right, "date").unwrap();
        assert_eq!(merged.len(), 3);
        assert_eq!(merged.columns(), vec!["date", "sessions", "channel"]);

        let channel = merged.column("channel").unwrap();
        assert_eq!(channel, vec![json!("organic"), json!("email"), json!("paid")]);

        // Column set comes from the first merged row, which had no match
        assert!(merged.column("gross_revenue").is_none());
        assert_eq!(merged.row(1).unwrap().get("gross_revenue"), Some(&json!(50.5)));
    }

    #[test]
    fn test_merge_last_duplicate_right_key_wins() {
        let left = SimpleFrame::new(vec![record(json!({"k": 1, "v": "a"}))]);
        let right = SimpleFrame::new(vec![
            record(json!({"k": 1, "v": "first"})),
            record(json!({"k": 1, "v": "second"})),
        ]);
        let merged = left.merge(&right, "k").unwrap();
        assert_eq!(merged.column("v").unwrap(), vec![json!("second")]);
    }

    #[test]
    fn test_csv_round_trip_decodes_opportunistically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.csv");

        sample().write_csv(&path).unwrap();
        let loaded = SimpleFrame::read_csv(&path).unwrap();

        assert_eq!(loaded.columns(), vec!["date", "sessions", "channel"]);
        assert_eq!(
            loaded.column("sessions").unwrap(),
            vec![json!(100), json!(300), json!("n/a")]
        );
        assert_eq!(loaded.column("date").unwrap()[0], json!("2024-01-01"));
    }

    #[test]
    fn test_read_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = SimpleFrame::read_csv(&dir.path().join("nope.csv")).unwrap();
        assert!(loaded.is_empty());
    }
}
