//! Prompt rendering for the insight generator.

use crate::datamart::{CONVERSION_RATE, GROSS_REVENUE, NEW_USERS, REVENUE_PER_SESSION, SESSIONS};
use crate::format::{format_currency, format_percentage};
use crate::insight::summary::{KpiSummary, TrendSummary};

/// System message sent alongside every prompt.
pub const SYSTEM_PROMPT: &str =
    "あなたは経験豊富なビジネスアナリストです。KPIデータから実用的な洞察を提供してください。";

fn number(value: f64) -> String {
    if value.is_finite() {
        format!("{:.1}", value)
    } else {
        "-".to_string()
    }
}

fn dollars(value: f64) -> String {
    format_currency(value, "$")
}

fn percent(value: f64) -> String {
    format_percentage(value, 2)
}

/// One `title:` block with mean, max, min, optional total and trend.
fn metric_block(title: &str, summary: Option<&TrendSummary>, render: fn(f64) -> String, with_total: bool) -> String {
    let Some(s) = summary else {
        return format!("{}:\n- データなし\n", title);
    };
    let mut block = format!(
        "{}:\n- 平均: {}\n- 最大: {}\n- 最小: {}\n",
        title,
        render(s.mean),
        render(s.max),
        render(s.min)
    );
    if with_total {
        block.push_str(&format!("- 合計: {}\n", render(s.total.unwrap_or(f64::NAN))));
    }
    block.push_str(&format!("- トレンド: {}\n", s.trend.as_str()));
    block
}

/// Render the analyst prompt. The action table format requested here is the
/// one `parse_response` understands.
pub fn build_prompt(summary: &KpiSummary) -> String {
    let blocks = [
        metric_block("セッション数", summary.get(SESSIONS), number, false),
        metric_block("新規ユーザー", summary.get(NEW_USERS), number, false),
        metric_block("売上高", summary.get(GROSS_REVENUE), dollars, true),
        metric_block("コンバージョン率", summary.get(CONVERSION_RATE), percent, false),
        metric_block("セッションあたり売上", summary.get(REVENUE_PER_SESSION), dollars, false),
    ];

    format!(
        r#"以下のKPIデータ（{start} 〜 {end}、{days}日間）を分析して、ビジネス改善のための洞察を提供してください。

## KPIサマリー
{blocks}
## 出力形式
1. 現状分析（3-4文で簡潔に）
2. 主要な課題（箇条書きで3つ）
3. 改善アクション（以下の表形式で）

| 優先度 | 課題 | 推奨アクション |
|--------|------|----------------|
| 高 | 課題1 | アクション1 |
| 中 | 課題2 | アクション2 |
| 低 | 課題3 | アクション3 |

4. SNS投稿用の文章（各280文字以内で2つ、「投稿: 」で始めてください）"#,
        start = summary.start,
        end = summary.end,
        days = summary.days,
        blocks = blocks.join("\n"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datamart::KpiRow;
    use crate::insight::summary::summarize;
    use chrono::NaiveDate;

    fn rows() -> Vec<KpiRow> {
        (1..=3)
            .map(|d| KpiRow {
                date: NaiveDate::from_ymd_opt(2024, 1, d).unwrap(),
                sessions: 100.0 * d as f64,
                new_users: 10.0,
                total_revenue: 0.0,
                transactions: 5.0,
                gross_revenue: 1000.0,
                conversion_rate: 0.05,
                revenue_per_session: 10.0 / d as f64,
                ltv_cac_ratio: f64::NAN,
            })
            .collect()
    }

    #[test]
    fn test_prompt_carries_summary_figures() {
        let prompt = build_prompt(&summarize(&rows()).unwrap());
        assert!(prompt.contains("2024-01-01 〜 2024-01-03、3日間"));
        assert!(prompt.contains(
            "セッション数:\n- 平均: 200.0\n- 最大: 300.0\n- 最小: 100.0\n- トレンド: decreasing\n"
        ));
        assert!(prompt.contains("新規ユーザー:\n- 平均: 10.0\n- 最大: 10.0\n- 最小: 10.0\n"));
        assert!(prompt.contains(
            "売上高:\n- 平均: $1,000.00\n- 最大: $1,000.00\n- 最小: $1,000.00\n- 合計: $3,000.00\n"
        ));
        assert!(prompt.contains("コンバージョン率:\n- 平均: 5.00%\n- 最大: 5.00%\n- 最小: 5.00%\n"));
        assert!(prompt.contains("セッションあたり売上:\n- 平均: $6.11\n- 最大: $10.00\n- 最小: $3.33\n"));
        assert!(prompt.contains("| 優先度 | 課題 | 推奨アクション |"));
    }
}
