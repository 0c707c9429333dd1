//! kpi-pulse: daily KPI datamart from web analytics and payments feeds,
//! with generated insights and an action plan.

pub mod config;
pub mod datamart;
pub mod error;
pub mod format;
pub mod ingestion;
pub mod insight;
pub mod llm;
pub mod pipeline;
pub mod snapshot;
pub mod social;
pub mod tabular;
pub mod telemetry;
pub mod time;

pub use config::PipelineConfig;
pub use datamart::{DatamartBuilder, KpiRow};
pub use error::{KpiError, Result};
pub use pipeline::{Pipeline, PipelineReport};
pub use snapshot::SnapshotStore;
pub use tabular::{Backend, PolarsFrame, Record, SimpleFrame, Tabular};
