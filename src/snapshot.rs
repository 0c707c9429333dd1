//! Snapshot Module - persists the KPI datamart and the insights report
//!
//! Every write is a full snapshot: the content is rendered in memory, written
//! to a hidden sibling file and renamed over the destination, so a failed
//! write never leaves a truncated file behind.

use crate::datamart::{KpiRow, DATE, KPI_COLUMNS};
use crate::error::{KpiError, Result};
use crate::insight::{ActionItem, ParsedInsights};
use crate::time::{format_date, parse_date_string};
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const KPI_FILE: &str = "kpi_daily.csv";
pub const INSIGHTS_FILE: &str = "insights.md";
pub const ACTION_PLAN_FILE: &str = "action_plan.csv";

/// Cell spellings that decode to NaN.
const NAN_TOKENS: [&str; 6] = ["", "nan", "na", "n/a", "null", "none"];

fn format_number(value: f64) -> String {
    if value.is_nan() {
        String::new()
    } else {
        format!("{:.4}", value)
    }
}

fn parse_number(cell: &str) -> Option<f64> {
    let cell = cell.trim();
    if NAN_TOKENS.iter().any(|t| cell.eq_ignore_ascii_case(t)) {
        return Some(f64::NAN);
    }
    cell.parse::<f64>().ok()
}

fn temp_path(destination: &Path) -> PathBuf {
    let file_name = destination
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "snapshot".to_string());
    destination.with_file_name(format!(".{}.tmp", file_name))
}

fn discard(temp: &Path) {
    if temp.exists() {
        if let Err(e) = fs::remove_file(temp) {
            debug!("Could not remove {}: {}", temp.display(), e);
        }
    }
}

/// Write `bytes` to the temporary sibling of `destination` and flush it.
fn stage(destination: &Path, bytes: &[u8]) -> Result<PathBuf> {
    if let Some(parent) = destination.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let temp = temp_path(destination);
    let written = (|| -> Result<()> {
        let mut file = fs::File::create(&temp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        Ok(())
    })();

    match written {
        Ok(()) => Ok(temp),
        Err(e) => {
            discard(&temp);
            Err(e)
        }
    }
}

/// Write `bytes` to `destination` through a temporary sibling and a rename.
fn write_atomic(destination: &Path, bytes: &[u8]) -> Result<()> {
    let temp = stage(destination, bytes)?;
    fs::rename(&temp, destination).map_err(|e| {
        discard(&temp);
        KpiError::from(e)
    })
}

/// Replace several files as one unit. Every payload is staged before any
/// rename; if a rename fails, destinations already replaced get their
/// previous content back (or are removed if they did not exist).
fn write_atomic_all(files: &[(PathBuf, Vec<u8>)]) -> Result<()> {
    let mut staged = Vec::with_capacity(files.len());
    for (destination, bytes) in files {
        match stage(destination, bytes) {
            Ok(temp) => staged.push(temp),
            Err(e) => {
                staged.iter().for_each(|t| discard(t));
                return Err(e);
            }
        }
    }

    let previous: Vec<Option<Vec<u8>>> = files
        .iter()
        .map(|(destination, _)| if destination.is_file() { fs::read(destination).ok() } else { None })
        .collect();

    for (i, ((destination, _), temp)) in files.iter().zip(&staged).enumerate() {
        if let Err(e) = fs::rename(temp, destination) {
            staged[i..].iter().for_each(|t| discard(t));
            for ((committed, _), before) in files[..i].iter().zip(&previous) {
                let restored = match before {
                    Some(bytes) => write_atomic(committed, bytes),
                    None => fs::remove_file(committed).map_err(KpiError::from),
                };
                if let Err(restore) = restored {
                    warn!("Could not restore {}: {}", committed.display(), restore);
                }
            }
            return Err(e.into());
        }
    }
    Ok(())
}

fn finish_csv(writer: csv::Writer<Vec<u8>>) -> Result<Vec<u8>> {
    writer
        .into_inner()
        .map_err(|e| KpiError::Io(e.into_error()))
}

/// Write the KPI table with the fixed header and 4-decimal numbers.
pub fn write_kpi_snapshot(rows: &[KpiRow], destination: &Path) -> Result<()> {
    let mut writer = WriterBuilder::new().from_writer(Vec::new());
    writer.write_record(KPI_COLUMNS)?;

    for row in rows {
        let mut record = Vec::with_capacity(KPI_COLUMNS.len());
        record.push(format_date(row.date));
        record.extend(row.numeric_fields().iter().map(|v| format_number(*v)));
        writer.write_record(&record)?;
    }

    write_atomic(destination, &finish_csv(writer)?)?;
    info!("Wrote {} KPI rows to {}", rows.len(), destination.display());
    Ok(())
}

/// Read a KPI snapshot back. Columns are located by name.
pub fn read_kpi_snapshot(source: &Path) -> Result<Vec<KpiRow>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(source)?;

    let headers = reader.headers()?.clone();
    let positions: Vec<usize> = KPI_COLUMNS
        .iter()
        .map(|name| {
            headers
                .iter()
                .position(|h| h.trim() == *name)
                .ok_or_else(|| KpiError::Schema(format!("snapshot is missing column '{}'", name)))
        })
        .collect::<Result<_>>()?;

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        if record.len() != headers.len() {
            return Err(KpiError::MalformedRow {
                line,
                message: format!("expected {} fields, found {}", headers.len(), record.len()),
            });
        }
        rows.push(decode_row(&record, &positions, line)?);
    }

    debug!("Read {} KPI rows from {}", rows.len(), source.display());
    Ok(rows)
}

fn decode_row(record: &StringRecord, positions: &[usize], line: u64) -> Result<KpiRow> {
    let cell = |idx: usize| record.get(positions[idx]).unwrap_or("");

    let date = parse_date_string(cell(0)).ok_or_else(|| KpiError::MalformedRow {
        line,
        message: format!("unreadable {} '{}'", DATE, cell(0)),
    })?;

    let mut numbers = [0.0; 8];
    for (slot, value) in numbers.iter_mut().enumerate() {
        let raw = cell(slot + 1);
        *value = parse_number(raw).ok_or_else(|| KpiError::MalformedRow {
            line,
            message: format!("unreadable {} '{}'", KPI_COLUMNS[slot + 1], raw),
        })?;
    }

    let [sessions, new_users, total_revenue, transactions, gross_revenue, conversion_rate, revenue_per_session, ltv_cac_ratio] =
        numbers;
    Ok(KpiRow {
        date,
        sessions,
        new_users,
        total_revenue,
        transactions,
        gross_revenue,
        conversion_rate,
        revenue_per_session,
        ltv_cac_ratio,
    })
}

fn render_action_plan(items: &[ActionItem]) -> Result<Vec<u8>> {
    let mut writer = WriterBuilder::new().from_writer(Vec::new());
    for item in items {
        writer.serialize(item)?;
    }
    if items.is_empty() {
        writer.write_record(["priority", "issue", "recommended_action"])?;
    }
    finish_csv(writer)
}

pub fn read_action_plan(source: &Path) -> Result<Vec<ActionItem>> {
    let mut reader = ReaderBuilder::new().has_headers(true).from_path(source)?;
    let mut items = Vec::new();
    for result in reader.deserialize() {
        items.push(result?);
    }
    Ok(items)
}

/// Canonical snapshot locations under one output directory.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    output_dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn kpi_path(&self) -> PathBuf {
        self.output_dir.join(KPI_FILE)
    }

    pub fn insights_path(&self) -> PathBuf {
        self.output_dir.join(INSIGHTS_FILE)
    }

    pub fn action_plan_path(&self) -> PathBuf {
        self.output_dir.join(ACTION_PLAN_FILE)
    }

    pub fn write_kpi(&self, rows: &[KpiRow]) -> Result<PathBuf> {
        let path = self.kpi_path();
        write_kpi_snapshot(rows, &path)?;
        Ok(path)
    }

    pub fn read_kpi(&self) -> Result<Vec<KpiRow>> {
        let path = self.kpi_path();
        if !path.exists() {
            warn!("No KPI snapshot at {}", path.display());
            return Err(KpiError::EmptyInput(format!("no KPI snapshot at {}", path.display())));
        }
        read_kpi_snapshot(&path)
    }

    /// Write `insights.md` and `action_plan.csv` together: either both are
    /// replaced or both keep their previous content.
    pub fn write_insights(&self, insights: &ParsedInsights) -> Result<()> {
        write_atomic_all(&[
            (self.insights_path(), insights.report_markdown.as_bytes().to_vec()),
            (self.action_plan_path(), render_action_plan(&insights.action_items)?),
        ])?;
        info!(
            "Saved insights report and {} action items to {}",
            insights.action_items.len(),
            self.output_dir.display()
        );
        Ok(())
    }

    pub fn read_action_plan(&self) -> Result<Vec<ActionItem>> {
        read_action_plan(&self.action_plan_path())
    }
}
