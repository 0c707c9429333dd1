//! Configuration Module - pipeline settings from the environment and `.env`
//!
//! Core components never read the environment themselves; the binary builds
//! one `PipelineConfig` and hands the relevant pieces to each collaborator.

use crate::error::{KpiError, Result};
use crate::llm::{DEFAULT_BASE_URL, DEFAULT_MODEL};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

pub const GA_PROPERTY_ID: &str = "GA_PROPERTY_ID";
pub const GA_ACCESS_TOKEN: &str = "GA_ACCESS_TOKEN";
pub const STRIPE_API_KEY: &str = "STRIPE_API_KEY";
pub const OPENAI_API_KEY: &str = "OPENAI_API_KEY";
pub const OPENAI_MODEL: &str = "OPENAI_MODEL";
pub const OPENAI_BASE_URL: &str = "OPENAI_BASE_URL";
pub const TW_BEARER_TOKEN: &str = "TW_BEARER_TOKEN";
pub const KPI_OUTPUT_DIR: &str = "KPI_OUTPUT_DIR";
pub const KPI_WINDOW_DAYS: &str = "KPI_WINDOW_DAYS";
pub const LLM_TIMEOUT_SECS: &str = "LLM_TIMEOUT_SECS";

/// Keys reported by `credential_status`, in display order.
pub const CREDENTIAL_KEYS: [&str; 5] = [GA_PROPERTY_ID, GA_ACCESS_TOKEN, STRIPE_API_KEY, OPENAI_API_KEY, TW_BEARER_TOKEN];

const DEFAULT_OUTPUT_DIR: &str = "./output";
const DEFAULT_WINDOW_DAYS: u32 = 30;
const DEFAULT_LLM_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub ga_property_id: Option<String>,
    pub ga_access_token: Option<String>,
    pub stripe_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub openai_base_url: String,
    pub twitter_bearer_token: Option<String>,
    pub output_dir: PathBuf,
    pub window_days: u32,
    pub llm_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            ga_property_id: None,
            ga_access_token: None,
            stripe_api_key: None,
            openai_api_key: None,
            openai_model: DEFAULT_MODEL.to_string(),
            openai_base_url: DEFAULT_BASE_URL.to_string(),
            twitter_bearer_token: None,
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            window_days: DEFAULT_WINDOW_DAYS,
            llm_timeout: Duration::from_secs(DEFAULT_LLM_TIMEOUT_SECS),
        }
    }
}

/// `your_openai_api_key_here` style values left over from a template.
fn is_placeholder(key: &str, value: &str) -> bool {
    value == format!("your_{}_here", key.to_lowercase())
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: Option<String>, default: T) -> Result<T> {
    match raw {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| KpiError::Config(format!("{} must be a positive number, got '{}'", key, raw))),
    }
}

fn with_overrides<'a, F>(lookup: F, overrides: &'a [(&'a str, String)]) -> impl Fn(&str) -> Option<String> + 'a
where
    F: Fn(&str) -> Option<String> + 'a,
{
    move |key: &str| match overrides.iter().find(|(k, _)| *k == key) {
        Some((_, value)) => Some(value.clone()),
        None => lookup(key),
    }
}

impl PipelineConfig {
    /// Load `.env` (if present) and read the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_env_with(&[])
    }

    /// `from_env` with command-line values standing in for their keys, so a
    /// bad environment value that a flag replaces is never parsed.
    pub fn from_env_with(overrides: &[(&str, String)]) -> Result<Self> {
        match dotenv::dotenv() {
            Ok(path) => debug!("Loaded environment from {}", path.display()),
            Err(_) => debug!("No .env file found"),
        }
        Self::from_lookup(with_overrides(|key| std::env::var(key).ok(), overrides))
    }

    /// Build from any key lookup. Empty and placeholder values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty() && !is_placeholder(key, v))
        };

        let defaults = Self::default();
        let window_days = parse_number(KPI_WINDOW_DAYS, get(KPI_WINDOW_DAYS), defaults.window_days)?;
        if window_days == 0 {
            return Err(KpiError::Config(format!("{} must be at least 1", KPI_WINDOW_DAYS)));
        }
        let timeout_secs = parse_number(LLM_TIMEOUT_SECS, get(LLM_TIMEOUT_SECS), DEFAULT_LLM_TIMEOUT_SECS)?;

        Ok(Self {
            ga_property_id: get(GA_PROPERTY_ID),
            ga_access_token: get(GA_ACCESS_TOKEN),
            stripe_api_key: get(STRIPE_API_KEY),
            openai_api_key: get(OPENAI_API_KEY),
            openai_model: get(OPENAI_MODEL).unwrap_or(defaults.openai_model),
            openai_base_url: get(OPENAI_BASE_URL).unwrap_or(defaults.openai_base_url),
            twitter_bearer_token: get(TW_BEARER_TOKEN),
            output_dir: get(KPI_OUTPUT_DIR).map(PathBuf::from).unwrap_or(defaults.output_dir),
            window_days,
            llm_timeout: Duration::from_secs(timeout_secs),
        })
    }

    fn value(&self, key: &str) -> Option<&str> {
        match key {
            GA_PROPERTY_ID => self.ga_property_id.as_deref(),
            GA_ACCESS_TOKEN => self.ga_access_token.as_deref(),
            STRIPE_API_KEY => self.stripe_api_key.as_deref(),
            OPENAI_API_KEY => self.openai_api_key.as_deref(),
            TW_BEARER_TOKEN => self.twitter_bearer_token.as_deref(),
            _ => None,
        }
    }

    /// The value of a required credential, or a `Config` error naming it.
    pub fn require(&self, key: &str) -> Result<&str> {
        self.value(key)
            .ok_or_else(|| KpiError::Config(format!("{} is not configured", key)))
    }

    /// Format check per credential. Unset optional credentials pass.
    pub fn validate(&self) -> Vec<(&'static str, bool)> {
        CREDENTIAL_KEYS
            .iter()
            .map(|key| {
                let valid = match self.value(key) {
                    Some(value) => is_valid_format(key, value),
                    None => *key == TW_BEARER_TOKEN,
                };
                (*key, valid)
            })
            .collect()
    }

    pub fn credential_status(&self) -> Vec<(&'static str, CredentialStatus)> {
        CREDENTIAL_KEYS
            .iter()
            .map(|key| {
                let status = match self.value(key) {
                    None => CredentialStatus::NotConfigured,
                    Some(value) if !is_valid_format(key, value) => CredentialStatus::InvalidFormat,
                    Some(value) => CredentialStatus::Configured(mask_secret(value)),
                };
                (*key, status)
            })
            .collect()
    }
}

fn is_valid_format(key: &str, value: &str) -> bool {
    match key {
        GA_PROPERTY_ID => !value.is_empty() && value.chars().all(|c| c.is_ascii_digit()),
        STRIPE_API_KEY => (value.starts_with("sk_live_") || value.starts_with("sk_test_")) && value.len() > 10,
        OPENAI_API_KEY => value.starts_with("sk-") && value.len() > 10,
        TW_BEARER_TOKEN => value.is_empty() || value.len() > 20,
        _ => !value.is_empty(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialStatus {
    NotConfigured,
    InvalidFormat,
    Configured(String),
}

impl fmt::Display for CredentialStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialStatus::NotConfigured => write!(f, "not configured"),
            CredentialStatus::InvalidFormat => write!(f, "invalid format"),
            CredentialStatus::Configured(masked) => write!(f, "configured ({})", masked),
        }
    }
}

/// Keep the first 6 and last 4 characters; short values keep only 3.
pub fn mask_secret(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 10 {
        let head: String = chars.iter().take(3).collect();
        return format!("{}...", head);
    }
    let head: String = chars[..6].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}
