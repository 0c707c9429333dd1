//! Pipeline Module - one end-to-end KPI run
//!
//! fetch feeds -> build datamart -> write KPI snapshot -> summarize ->
//! generate insights -> write insights snapshot -> optional social post

use crate::datamart::{DatamartBuilder, KpiRow};
use crate::error::Result;
use crate::format::{format_currency, format_percentage};
use crate::ingestion::FeedAdapter;
use crate::insight::{
    build_prompt, extract_social_posts, generation_failed, parse_response, summarize, KpiSummary, ParsedInsights,
};
use crate::insight::summary::{nan_mean, nan_sum};
use crate::llm::TextGenerator;
use crate::snapshot::SnapshotStore;
use crate::social::SocialPublisher;
use crate::tabular::Backend;
use crate::time::DateWindow;
use chrono::{Local, NaiveDate};
use serde::Serialize;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{info, warn};

const TOTAL_STEPS: usize = 6;

/// Headline figures logged at the end of a run.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct KpiTotals {
    pub total_sessions: f64,
    pub total_revenue: f64,
    pub mean_conversion_rate: f64,
}

impl KpiTotals {
    pub fn from_rows(rows: &[KpiRow]) -> Self {
        let column = |f: fn(&KpiRow) -> f64| rows.iter().map(f).collect::<Vec<_>>();
        Self {
            total_sessions: nan_sum(&column(|r| r.sessions)),
            total_revenue: nan_sum(&column(|r| r.gross_revenue)),
            mean_conversion_rate: nan_mean(&column(|r| r.conversion_rate)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub window: DateWindow,
    pub kpi_rows: Vec<KpiRow>,
    pub kpi_path: PathBuf,
    pub summary: KpiSummary,
    pub insights: ParsedInsights,
    /// False when generation failed and the previous insights were kept.
    pub insights_saved: bool,
    pub social_posts: Vec<String>,
    /// `None` when no publisher is configured or there was nothing to post.
    pub posted: Option<bool>,
    pub totals: KpiTotals,
    pub elapsed: Duration,
}

pub struct Pipeline {
    analytics: Box<dyn FeedAdapter>,
    payments: Box<dyn FeedAdapter>,
    generator: Option<Box<dyn TextGenerator>>,
    publisher: Option<Box<dyn SocialPublisher>>,
    store: SnapshotStore,
    backend: Backend,
    window_days: u32,
}

impl Pipeline {
    pub fn new(analytics: Box<dyn FeedAdapter>, payments: Box<dyn FeedAdapter>, store: SnapshotStore) -> Self {
        Self {
            analytics,
            payments,
            generator: None,
            publisher: None,
            store,
            backend: Backend::default(),
            window_days: 30,
        }
    }

    pub fn with_generator(mut self, generator: Box<dyn TextGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn with_publisher(mut self, publisher: Box<dyn SocialPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_window_days(mut self, days: u32) -> Self {
        self.window_days = days;
        self
    }

    /// Run every step for the window ending at `today`. Feed, build and
    /// snapshot errors abort the run; generation errors degrade.
    pub async fn run(&self, today: NaiveDate) -> Result<PipelineReport> {
        let started = Instant::now();
        let window = DateWindow::last_n_days(self.window_days, today);
        info!("Starting KPI pipeline for {} to {}", window.start, window.end);

        info!("Step 1/{}: fetching feeds", TOTAL_STEPS);
        let analytics = self.analytics.fetch(window).await?;
        info!("Fetched {} rows from {} ({})", analytics.len(), self.analytics.source_id(), self.analytics.source_type());
        let payments = self.payments.fetch(window).await?;
        info!("Fetched {} rows from {} ({})", payments.len(), self.payments.source_id(), self.payments.source_type());

        info!("Step 2/{}: building KPI datamart", TOTAL_STEPS);
        let kpi_rows = DatamartBuilder::new().build_records(self.backend, analytics, payments)?;

        info!("Step 3/{}: saving KPI snapshot", TOTAL_STEPS);
        let kpi_path = self.store.write_kpi(&kpi_rows)?;

        info!("Step 4/{}: generating insights", TOTAL_STEPS);
        let summary = summarize(&kpi_rows)?;
        let (insights, generated) = self.generate(&summary).await;

        info!("Step 5/{}: saving insights", TOTAL_STEPS);
        if generated {
            self.store.write_insights(&insights)?;
        } else {
            warn!("Keeping the previous insights snapshot; this run's insights were not generated");
        }

        info!("Step 6/{}: social post", TOTAL_STEPS);
        let social_posts = extract_social_posts(&insights.report_markdown);
        let posted = self.publish(&social_posts).await;

        let totals = KpiTotals::from_rows(&kpi_rows);
        let elapsed = started.elapsed();
        info!("Pipeline completed in {:.2}s", elapsed.as_secs_f64());
        info!("Total sessions: {:.0}", totals.total_sessions);
        info!("Total revenue: {}", format_currency(totals.total_revenue, "$"));
        info!("Average conversion rate: {}", format_percentage(totals.mean_conversion_rate, 2));
        info!("Action items: {}", insights.action_items.len());

        Ok(PipelineReport {
            window,
            kpi_rows,
            kpi_path,
            summary,
            insights,
            insights_saved: generated,
            social_posts,
            posted,
            totals,
            elapsed,
        })
    }

    /// Parsed insights and whether they came from the generator.
    async fn generate(&self, summary: &KpiSummary) -> (ParsedInsights, bool) {
        let now = Local::now().naive_local();
        let Some(generator) = self.generator.as_ref() else {
            warn!("No text generator configured; using fallback insights");
            return (generation_failed("text generator is not configured", now), false);
        };

        let prompt = build_prompt(summary);
        let text = match generator.generate(&prompt).await {
            Ok(text) => text,
            Err(e) => {
                warn!("Insight generation failed: {}", e);
                return (generation_failed(&e.to_string(), now), false);
            }
        };

        match parse_response(text.as_bytes()) {
            Ok(parsed) => (parsed, true),
            Err(e) => {
                warn!("Generated insights could not be parsed: {}", e);
                (generation_failed(&e.to_string(), now), false)
            }
        }
    }

    async fn publish(&self, posts: &[String]) -> Option<bool> {
        let publisher = match self.publisher.as_ref() {
            Some(publisher) => publisher,
            None => {
                info!("No social publisher configured; skipping");
                return None;
            }
        };
        let Some(first) = posts.first() else {
            info!("No social post found in the insights; skipping");
            return None;
        };
        Some(publisher.post(first).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_totals_skip_undefined_ratios() {
        let day = |d: u32, sessions: f64, conversion: f64| KpiRow {
            date: NaiveDate::from_ymd_opt(2024, 1, d).unwrap(),
            sessions,
            new_users: 0.0,
            total_revenue: 0.0,
            transactions: 0.0,
            gross_revenue: 10.0,
            conversion_rate: conversion,
            revenue_per_session: f64::NAN,
            ltv_cac_ratio: f64::NAN,
        };
        let totals = KpiTotals::from_rows(&[day(1, 0.0, f64::NAN), day(2, 100.0, 0.1), day(3, 50.0, 0.2)]);
        assert_eq!(totals.total_sessions, 150.0);
        assert_eq!(totals.total_revenue, 30.0);
        assert!((totals.mean_conversion_rate - 0.15).abs() < 1e-12);
    }
}
