use thiserror::Error;

#[derive(Error, Debug)]
pub enum KpiError {
    /// A source feed row is missing a required field (or the field is unusable).
    #[error("Schema error: {0}")]
    Schema(String),

    /// Nothing to build a datamart or summary from.
    #[error("Empty input: {0}")]
    EmptyInput(String),

    /// A persisted snapshot row could not be decoded.
    #[error("Malformed row at line {line}: {message}")]
    MalformedRow { line: u64, message: String },

    /// Generative-text output could not be decoded as text.
    #[error("Response parse error: {0}")]
    ResponseParse(String),

    /// Adapter / network failure, not further classified.
    #[error("Upstream failure: {0}")]
    Upstream(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Polars error: {0}")]
    Polars(String),
}

impl From<polars::error::PolarsError> for KpiError {
    fn from(err: polars::error::PolarsError) -> Self {
        KpiError::Polars(err.to_string())
    }
}

impl From<reqwest::Error> for KpiError {
    fn from(err: reqwest::Error) -> Self {
        KpiError::Upstream(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, KpiError>;
