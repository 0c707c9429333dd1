//! Tabular Module - ordered record sets behind one capability interface
//!
//! Two interchangeable backends:
//! - `SimpleFrame`: dependency-free, row-backed container
//! - `PolarsFrame`: wraps a polars `DataFrame`
//!
//! Aggregates here follow the container policy: missing or non-numeric cells
//! count as 0. The datamart has its own NaN-preserving rules.

pub mod polars_frame;
pub mod simple;

pub use polars_frame::PolarsFrame;
pub use simple::SimpleFrame;

use crate::error::Result;
use clap::ValueEnum;
use serde_json::{Map, Value};
use std::fmt;
use std::path::Path;

/// One row: ordered field name -> cell.
pub type Record = Map<String, Value>;

/// Selects the `Tabular` implementation used to build the datamart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Backend {
    #[default]
    Simple,
    Polars,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Simple => write!(f, "simple"),
            Backend::Polars => write!(f, "polars"),
        }
    }
}

/// Capability interface shared by the tabular backends.
pub trait Tabular: Sized {
    /// Backend name (e.g. "simple", "polars")
    fn backend_name(&self) -> &'static str;

    /// Build from ordered uniform rows; the column set is the first row's keys.
    fn from_records(records: Vec<Record>) -> Result<Self>;

    /// Row-oriented view
    fn to_records(&self) -> Vec<Record>;

    /// Column names in order
    fn columns(&self) -> Vec<String>;

    /// Number of rows
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Values of one column, `None` if the column is unknown.
    /// Rows lacking the field yield `Value::Null`.
    fn column(&self, name: &str) -> Option<Vec<Value>>;

    /// Left join on `on`; right-hand fields override on collision.
    fn merge(&self, other: &Self, on: &str) -> Result<Self>;

    fn write_csv(&self, path: &Path) -> Result<()>;

    fn read_csv(path: &Path) -> Result<Self>;

    fn sum(&self, name: &str) -> f64 {
        numeric_cells(self, name).iter().sum()
    }

    fn mean(&self, name: &str) -> f64 {
        let values = numeric_cells(self, name);
        if values.is_empty() {
            return 0.0;
        }
        values.iter().sum::<f64>() / values.len() as f64
    }

    fn max(&self, name: &str) -> f64 {
        numeric_cells(self, name)
            .into_iter()
            .reduce(f64::max)
            .unwrap_or(0.0)
    }

    fn min(&self, name: &str) -> f64 {
        numeric_cells(self, name)
            .into_iter()
            .reduce(f64::min)
            .unwrap_or(0.0)
    }

    /// Column-oriented view
    fn to_column_map(&self) -> Vec<(String, Vec<Value>)> {
        self.columns()
            .into_iter()
            .map(|name| {
                let values = self.column(&name).unwrap_or_default();
                (name, values)
            })
            .collect()
    }
}

/// One f64 per row; unknown columns contribute a 0 per row.
fn numeric_cells<T: Tabular>(table: &T, name: &str) -> Vec<f64> {
    match table.column(name) {
        Some(values) => values.iter().map(numeric_or_zero).collect(),
        None => vec![0.0; table.len()],
    }
}

/// Container numeric policy: anything that is not a number counts as 0.
pub fn numeric_or_zero(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::Bool(true) => 1.0,
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Opportunistic CSV cell decoding: int, then float, else the original text.
pub fn coerce_cell(raw: &str) -> Value {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }

    if let Ok(i) = trimmed.parse::<i64>() {
        return Value::Number(i.into());
    }

    if let Ok(f) = trimmed.parse::<f64>() {
        if let Some(n) = serde_json::Number::from_f64(f) {
            return Value::Number(n);
        }
    }

    Value::String(raw.to_string())
}

/// Text form of a cell as written to CSV.
pub fn cell_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}
