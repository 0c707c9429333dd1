use async_trait::async_trait;
use chrono::NaiveDate;
use kpi_pulse::ingestion::FeedAdapter;
use kpi_pulse::insight::Priority;
use kpi_pulse::llm::TextGenerator;
use kpi_pulse::social::SocialPublisher;
use kpi_pulse::time::DateWindow;
use kpi_pulse::{Backend, KpiError, Pipeline, Record, SnapshotStore};
use serde_json::json;
use std::fs;
use std::sync::{Arc, Mutex};

struct StaticFeed {
    id: &'static str,
    records: Vec<Record>,
}

#[async_trait]
impl FeedAdapter for StaticFeed {
    async fn fetch(&self, _window: DateWindow) -> kpi_pulse::Result<Vec<Record>> {
        Ok(self.records.clone())
    }

    fn source_id(&self) -> &str {
        self.id
    }

    fn source_type(&self) -> &str {
        "static"
    }
}

struct CannedGenerator(Result<String, String>);

#[async_trait]
impl TextGenerator for CannedGenerator {
    async fn generate(&self, prompt: &str) -> kpi_pulse::Result<String> {
        assert!(prompt.contains("KPIサマリー"));
        self.0.clone().map_err(KpiError::Upstream)
    }
}

#[derive(Clone, Default)]
struct RecordingPublisher {
    posts: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl SocialPublisher for RecordingPublisher {
    async fn post(&self, text: &str) -> bool {
        self.posts.lock().unwrap().push(text.to_string());
        true
    }
}

fn record(value: serde_json::Value) -> Record {
    value.as_object().cloned().unwrap()
}

fn analytics_feed(days: u32) -> Box<dyn FeedAdapter> {
    let records = (1..=days)
        .map(|d| {
            record(json!({
                "date": format!("2024-01-{:02}", d),
                "sessions": 100 + d * 10,
                "newUsers": 40,
                "totalRevenue": 900,
                "transactions": 5 + d
            }))
        })
        .collect();
    Box::new(StaticFeed { id: "analytics", records })
}

fn payments_feed() -> Box<dyn FeedAdapter> {
    let records = vec![
        record(json!({"date": "2024-01-01", "gross_revenue": 1000.0})),
        record(json!({"date": "2024-01-05", "gross_revenue": 250.5})),
    ];
    Box::new(StaticFeed { id: "payments", records })
}

const GENERATED: &str = "## 現状分析\nセッションは増加傾向です。\n\n| 優先度 | 課題 | 推奨アクション |\n|---|---|---|\n| 高 | Slow checkout | Add caching |\n| 中 | Low retention | Add email |\n\nTweet 1: Sessions are up again this week!\nTweet 2: Conversion keeps improving across channels.\n";

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 14).unwrap()
}

#[tokio::test]
async fn test_full_run_writes_every_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let store = SnapshotStore::new(dir.path().join("output"));
    let publisher = RecordingPublisher::default();

    let report = Pipeline::new(analytics_feed(14), payments_feed(), store.clone())
        .with_generator(Box::new(CannedGenerator(Ok(GENERATED.to_string()))))
        .with_publisher(Box::new(publisher.clone()))
        .with_window_days(14)
        .run(today())
        .await
        .unwrap();

    assert_eq!(report.kpi_rows.len(), 14);
    assert_eq!(report.window.start, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
    assert!(report.insights_saved);
    assert_eq!(report.insights.action_items.len(), 2);
    assert_eq!(report.insights.action_items[1].priority, Priority::Medium);
    assert_eq!(report.posted, Some(true));
    assert_eq!(report.totals.total_revenue, 1250.5);

    assert_eq!(store.read_kpi().unwrap().len(), 14);
    assert!(fs::read_to_string(store.insights_path()).unwrap().contains("| 高 | Slow checkout | Add caching |"));
    assert_eq!(store.read_action_plan().unwrap(), report.insights.action_items);
    assert_eq!(
        *publisher.posts.lock().unwrap(),
        vec!["Sessions are up again this week!".to_string()]
    );
}

#[tokio::test]
async fn test_generation_failure_keeps_previous_insights() {
    let dir = tempfile::tempdir().unwrap();
    let store = SnapshotStore::new(dir.path());
    fs::write(store.insights_path(), "previous report").unwrap();

    let report = Pipeline::new(analytics_feed(3), payments_feed(), store.clone())
        .with_generator(Box::new(CannedGenerator(Err("quota exceeded".to_string()))))
        .run(today())
        .await
        .unwrap();

    assert!(!report.insights_saved);
    assert_eq!(report.insights.action_items.len(), 1);
    assert_eq!(report.insights.action_items[0].priority, Priority::High);
    assert!(report.insights.report_markdown.contains("quota exceeded"));
    assert_eq!(report.posted, None);

    assert_eq!(fs::read_to_string(store.insights_path()).unwrap(), "previous report");
    assert!(!store.action_plan_path().exists());
    // The KPI snapshot is still refreshed
    assert_eq!(store.read_kpi().unwrap().len(), 3);
}

#[tokio::test]
async fn test_missing_generator_degrades_to_fallback() {
    let dir = tempfile::tempdir().unwrap();
    let report = Pipeline::new(analytics_feed(2), payments_feed(), SnapshotStore::new(dir.path()))
        .run(today())
        .await
        .unwrap();

    assert!(!report.insights_saved);
    assert_eq!(report.insights.action_items.len(), 1);
}

#[tokio::test]
async fn test_empty_analytics_aborts_before_writing() {
    let dir = tempfile::tempdir().unwrap();
    let store = SnapshotStore::new(dir.path());
    let empty = Box::new(StaticFeed { id: "analytics", records: vec![] });

    let err = Pipeline::new(empty, payments_feed(), store.clone())
        .run(today())
        .await
        .unwrap_err();

    assert!(matches!(err, KpiError::EmptyInput(_)));
    assert!(!store.kpi_path().exists());
}

#[tokio::test]
async fn test_backends_produce_the_same_datamart() {
    let dir = tempfile::tempdir().unwrap();
    let simple = Pipeline::new(analytics_feed(7), payments_feed(), SnapshotStore::new(dir.path().join("simple")))
        .with_backend(Backend::Simple)
        .run(today())
        .await
        .unwrap();
    let polars = Pipeline::new(analytics_feed(7), payments_feed(), SnapshotStore::new(dir.path().join("polars")))
        .with_backend(Backend::Polars)
        .run(today())
        .await
        .unwrap();

    assert_eq!(simple.kpi_rows.len(), polars.kpi_rows.len());
    assert!(simple
        .kpi_rows
        .iter()
        .zip(polars.kpi_rows.iter())
        .all(|(a, b)| a.same_values(b)));
}
