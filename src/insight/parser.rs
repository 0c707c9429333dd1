//! Response parsing for generated insight text.
//!
//! The generator's output has no format guarantee. Everything here degrades
//! instead of failing; only undecodable bytes are an error.

use crate::error::{KpiError, Result};
use crate::insight::{ActionItem, ParsedInsights, Priority};
use chrono::{Local, NaiveDateTime};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, warn};

const MAX_POSTS: usize = 2;
const MIN_POST_CHARS: usize = 10;
const MAX_POST_CHARS: usize = 280;

lazy_static! {
    /// `| priority | issue | action |` anywhere on a line, so rows nested in
    /// quotes or list items still match.
    static ref TABLE_ROW: Regex =
        Regex::new(r"\|\s*([^|\s]+)\s*\|\s*([^|]*?)\s*\|\s*([^|]*?)\s*\|").unwrap();

    /// `Tweet: ...`, `ツイート1: ...`, `投稿：「...」`
    static ref SOCIAL_POST: Regex = Regex::new(
        r#"(?i)(?:\btweet|ツイート|投稿)(?:\s*\d+)?\s*[:：]\s*["'“「]?([^\n]+)"#
    )
    .unwrap();
}

/// Decode raw generator output and parse it, stamped with the local time.
pub fn parse_response(raw: &[u8]) -> Result<ParsedInsights> {
    let text = std::str::from_utf8(raw)
        .map_err(|e| KpiError::ResponseParse(format!("response is not valid UTF-8: {}", e)))?;
    Ok(parse_response_text(text, Local::now().naive_local()))
}

/// Parse already-decoded text. Never fails and never returns an empty list.
pub fn parse_response_text(text: &str, generated_at: NaiveDateTime) -> ParsedInsights {
    let mut action_items = extract_action_items(text);
    if action_items.is_empty() {
        warn!("No action items found in generated text; using fallback item");
        action_items.push(fallback_item());
    }

    ParsedInsights {
        report_markdown: render_report(text, generated_at),
        action_items,
        generated_at,
    }
}

/// Fallback insights for when the generator could not be reached at all.
pub fn generation_failed(reason: &str, generated_at: NaiveDateTime) -> ParsedInsights {
    let text = format!("インサイトの生成に失敗しました: {}", reason);
    ParsedInsights {
        report_markdown: render_report(&text, generated_at),
        action_items: vec![fallback_item()],
        generated_at,
    }
}

fn fallback_item() -> ActionItem {
    ActionItem::new(
        Priority::High,
        "データ分析の実行",
        "分析を再実行して詳細な洞察を取得してください",
    )
}

fn render_report(text: &str, generated_at: NaiveDateTime) -> String {
    format!(
        "# AI-Powered Insights\n\n## KPI Analysis\n\n{}\n\n## Generated: {}\n",
        text,
        generated_at.format("%Y-%m-%d %H:%M:%S")
    )
}

fn extract_action_items(text: &str) -> Vec<ActionItem> {
    text.lines()
        .filter_map(|line| TABLE_ROW.captures(line))
        .filter_map(|caps| {
            let label = caps.get(1)?.as_str();
            let issue = caps.get(2)?.as_str();
            let action = caps.get(3)?.as_str();
            match Priority::from_label(label) {
                Some(priority) => Some(ActionItem::new(priority, issue, action)),
                None => {
                    debug!("Discarding table row with priority {:?}", label);
                    None
                }
            }
        })
        .collect()
}

/// Up to two social-post lines of 11..=280 characters, in document order.
pub fn extract_social_posts(markdown: &str) -> Vec<String> {
    SOCIAL_POST
        .captures_iter(markdown)
        .filter_map(|caps| caps.get(1))
        .map(|m| {
            m.as_str()
                .trim()
                .trim_end_matches(|c: char| matches!(c, '"' | '\'' | '”' | '」'))
                .trim()
                .to_string()
        })
        .filter(|post| {
            let chars = post.chars().count();
            chars > MIN_POST_CHARS && chars <= MAX_POST_CHARS
        })
        .take(MAX_POSTS)
        .collect()
}
