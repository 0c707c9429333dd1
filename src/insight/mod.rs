//! Insight Module - turns the KPI table into prompt input and the generated
//! text back into a prioritized action list.
//!
//! - `summary`: per-metric window statistics and the two trend rules
//! - `prompt`: renders a summary into the generative-text prompt
//! - `parser`: fail-soft extraction of action items and social posts

pub mod parser;
pub mod prompt;
pub mod summary;

pub use parser::{extract_social_posts, generation_failed, parse_response, parse_response_text};
pub use prompt::{build_prompt, SYSTEM_PROMPT};
pub use summary::{classify_trend, summarize, KpiSummary, TrendClass, TrendDirection, TrendSummary};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Fixed priority allow-list. Labels are matched verbatim, never translated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Priority {
    #[serde(rename = "高")]
    High,
    #[serde(rename = "中")]
    Medium,
    #[serde(rename = "低")]
    Low,
}

impl Priority {
    pub const ALL: [Priority; 3] = [Priority::High, Priority::Medium, Priority::Low];

    pub fn label(&self) -> &'static str {
        match self {
            Priority::High => "高",
            Priority::Medium => "中",
            Priority::Low => "低",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.label() == label)
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// One row of the action plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionItem {
    pub priority: Priority,
    pub issue: String,
    pub recommended_action: String,
}

impl ActionItem {
    pub fn new(priority: Priority, issue: impl Into<String>, recommended_action: impl Into<String>) -> Self {
        Self {
            priority,
            issue: issue.into(),
            recommended_action: recommended_action.into(),
        }
    }
}

/// Parsed generative-text output. `action_items` is never empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedInsights {
    pub report_markdown: String,
    pub action_items: Vec<ActionItem>,
    pub generated_at: NaiveDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_labels() {
        assert_eq!(Priority::from_label("高"), Some(Priority::High));
        assert_eq!(Priority::from_label("中"), Some(Priority::Medium));
        assert_eq!(Priority::from_label("低"), Some(Priority::Low));
        assert_eq!(Priority::from_label("High"), None);
        assert_eq!(Priority::Low.to_string(), "低");
    }
}
