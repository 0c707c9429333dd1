//! PolarsFrame - `Tabular` backed by a polars DataFrame

use crate::error::Result;
use crate::tabular::{Record, Tabular};
use polars::prelude::*;
use serde_json::{Number, Value};
use std::fs::File;
use std::path::Path;
use tracing::warn;

/// Marks right-hand rows that found a partner during a merge.
const MATCH_FLAG: &str = "__merge_matched";
const RIGHT_SUFFIX: &str = "_right";

#[derive(Debug, Clone)]
pub struct PolarsFrame {
    df: DataFrame,
}

impl Default for PolarsFrame {
    fn default() -> Self {
        Self::new(DataFrame::empty())
    }
}

impl PolarsFrame {
    pub fn new(df: DataFrame) -> Self {
        Self { df }
    }

    pub fn dataframe(&self) -> &DataFrame {
        &self.df
    }

    pub fn into_dataframe(self) -> DataFrame {
        self.df
    }
}

/// Build one typed series from JSON cells; mixed columns fall back to strings.
fn series_from_cells(name: &str, cells: &[Value]) -> Series {
    let present = || cells.iter().filter(|v| !v.is_null());

    if present().all(|v| v.is_i64()) {
        let values: Vec<Option<i64>> = cells.iter().map(|v| v.as_i64()).collect();
        return Series::new(name, values);
    }
    if present().all(|v| v.is_number()) {
        let values: Vec<Option<f64>> = cells.iter().map(|v| v.as_f64()).collect();
        return Series::new(name, values);
    }
    if present().all(|v| v.is_boolean()) {
        let values: Vec<Option<bool>> = cells.iter().map(|v| v.as_bool()).collect();
        return Series::new(name, values);
    }

    let values: Vec<Option<String>> = cells
        .iter()
        .map(|v| match v {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        })
        .collect();
    Series::new(name, values)
}

fn any_value_to_json(value: AnyValue) -> Value {
    match value {
        AnyValue::Null => Value::Null,
        AnyValue::Boolean(b) => Value::Bool(b),
        AnyValue::Int8(v) => Value::from(v),
        AnyValue::Int16(v) => Value::from(v),
        AnyValue::Int32(v) => Value::from(v),
        AnyValue::Int64(v) => Value::from(v),
        AnyValue::UInt8(v) => Value::from(v),
        AnyValue::UInt16(v) => Value::from(v),
        AnyValue::UInt32(v) => Value::from(v),
        AnyValue::UInt64(v) => Value::from(v),
        AnyValue::Float32(v) => Number::from_f64(f64::from(v))
            .map(Value::Number)
            .unwrap_or(Value::Null),
        AnyValue::Float64(v) => Number::from_f64(v).map(Value::Number).unwrap_or(Value::Null),
        AnyValue::String(s) => Value::String(s.to_string()),
        AnyValue::StringOwned(s) => Value::String(s.to_string()),
        other => Value::String(other.to_string()),
    }
}

fn series_values(series: &Series) -> Vec<Value> {
    (0..series.len())
        .map(|i| series.get(i).map(any_value_to_json).unwrap_or(Value::Null))
        .collect()
}

impl Tabular for PolarsFrame {
    fn backend_name(&self) -> &'static str {
        "polars"
    }

    fn from_records(records: Vec<Record>) -> Result<Self> {
        let columns: Vec<String> = records
            .first()
            .map(|row| row.keys().cloned().collect())
            .unwrap_or_default();

        let series: Vec<Series> = columns
            .iter()
            .map(|name| {
                let cells: Vec<Value> = records
                    .iter()
                    .map(|row| row.get(name).cloned().unwrap_or(Value::Null))
                    .collect();
                series_from_cells(name, &cells)
            })
            .collect();

        Ok(Self::new(DataFrame::new(series)?))
    }

    fn to_records(&self) -> Vec<Record> {
        let names = self.columns();
        let columns: Vec<Vec<Value>> = self.df.get_columns().iter().map(series_values).collect();

        (0..self.df.height())
            .map(|row_idx| {
                names
                    .iter()
                    .zip(columns.iter())
                    .map(|(name, values)| (name.clone(), values[row_idx].clone()))
                    .collect()
            })
            .collect()
    }

    fn columns(&self) -> Vec<String> {
        self.df
            .get_column_names()
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn len(&self) -> usize {
        self.df.height()
    }

    fn column(&self, name: &str) -> Option<Vec<Value>> {
        self.df.column(name).ok().map(series_values)
    }

    fn merge(&self, other: &Self, on: &str) -> Result<Self> {
        let left_columns = self.columns();
        let right_columns = other.columns();

        let overlapping: Vec<&String> = right_columns
            .iter()
            .filter(|c| c.as_str() != on && left_columns.contains(c))
            .collect();
        let right_only: Vec<&String> = right_columns
            .iter()
            .filter(|c| c.as_str() != on && !left_columns.contains(c))
            .collect();

        let right = other
            .df
            .clone()
            .lazy()
            .unique_stable(Some(vec![on.to_string()]), UniqueKeepStrategy::Last)
            .with_column(lit(true).alias(MATCH_FLAG));

        let overrides: Vec<Expr> = overlapping
            .iter()
            .map(|c| {
                when(col(MATCH_FLAG).is_not_null())
                    .then(col(&format!("{}{}", c, RIGHT_SUFFIX)))
                    .otherwise(col(c.as_str()))
                    .alias(c.as_str())
            })
            .collect();

        let selection: Vec<Expr> = left_columns
            .iter()
            .chain(right_only.into_iter())
            .map(|c| col(c.as_str()))
            .collect();

        let mut joined = self
            .df
            .clone()
            .lazy()
            .join(right, [col(on)], [col(on)], JoinArgs::new(JoinType::Left));
        if !overrides.is_empty() {
            joined = joined.with_columns(overrides);
        }

        Ok(Self::new(joined.select(selection).collect()?))
    }

    fn write_csv(&self, path: &Path) -> Result<()> {
        let mut file = File::create(path)?;
        let mut df = self.df.clone();
        CsvWriter::new(&mut file).include_header(true).finish(&mut df)?;
        Ok(())
    }

    fn read_csv(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!("File not found: {}", path.display());
            return Ok(Self::default());
        }

        let df = LazyCsvReader::new(path)
            .with_has_header(true)
            .finish()?
            .collect()?;
        Ok(Self::new(df))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_from_records_and_aggregates() {
        let frame = PolarsFrame::from_records(vec![
            record(json!({"date": "2024-01-01", "sessions": 10})),
            record(json!({"date": "2024-01-02", "sessions": 30})),
        ])
        .unwrap();

        assert_eq!(frame.backend_name(), "polars");
        assert_eq!(frame.columns(), vec!["date", "sessions"]);
        assert_eq!(frame.len(), 2);
        assert_eq!(frame.sum("sessions"), 40.0);
        assert_eq!(frame.mean("sessions"), 20.0);
        assert_eq!(frame.column("date").unwrap(), vec![json!("2024-01-01"), json!("2024-01-02")]);
    }

    #[test]
    fn test_merge_matches_simple_frame_semantics() {
        let left = PolarsFrame::from_records(vec![
            record(json!({"date": "a", "channel": "organic"})),
            record(json!({"date": "b", "channel": "paid"})),
        ])
        .unwrap();
        let right = PolarsFrame::from_records(vec![
            record(json!({"date": "b", "channel": "email", "gross_revenue": 5.5})),
            record(json!({"date": "z", "channel": "x", "gross_revenue": 1.0})),
        ])
        .unwrap();

        let merged = left.merge(&right, "date").unwrap();
        assert_eq!(merged.len(), 2);
        assert_eq!(merged.column("channel").unwrap(), vec![json!("organic"), json!("email")]);
        assert_eq!(merged.column("gross_revenue").unwrap(), vec![Value::Null, json!(5.5)]);
    }
}
