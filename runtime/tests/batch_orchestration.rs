//! Batch orchestration: parent selection, failure isolation and run reports.

use async_trait::async_trait;
use case_catalog::{RawItemRecord, TransformOptions};
use case_harvest::acquisition::DetailSource;
use case_harvest::dump::FileDump;
use case_harvest::error::{AcquireError, CaptureError};
use case_harvest::harvest::{ContainerDetailHarvester, Harvester, HarvesterRegistry};
use case_harvest::store::{tables, Row, SqliteStore, Store};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
enum Reply {
    Items,
    Empty,
    Timeout,
    Panic,
}

/// Answers per parent id; unknown ids get the standard item list.
struct ScriptedSource {
    replies: HashMap<i64, Reply>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedSource {
    fn new(replies: &[(i64, Reply)]) -> Self {
        Self {
            replies: replies.iter().cloned().collect(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

fn items() -> Vec<RawItemRecord> {
    vec![
        RawItemRecord::new(1, "AK-47 | Redline", "隐秘"),
        RawItemRecord::new(2, "Karambit | Fade", "非凡"),
        RawItemRecord::new(3, "P250 | Sand Dune", "消费"),
    ]
}

#[async_trait]
impl DetailSource for ScriptedSource {
    fn label(&self) -> &'static str {
        "scripted"
    }

    async fn fetch(&self, parent_id: i64) -> Result<Option<Vec<RawItemRecord>>, AcquireError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.replies.get(&parent_id).cloned().unwrap_or(Reply::Items) {
            Reply::Items => Ok(Some(items())),
            Reply::Empty => Ok(None),
            Reply::Timeout => Err(CaptureError::Timeout { waited_ms: 35_000 }.into()),
            Reply::Panic => panic!("detail source blew up for {parent_id}"),
        }
    }
}

async fn seeded_store(dir: &tempfile::TempDir) -> Arc<SqliteStore> {
    let store = SqliteStore::open(&dir.path().join("harvest.db")).unwrap();
    let parents: Vec<Row> = [
        (500, "Chroma Weapon Case"),
        (600, "Sticker Capsule"),
        (700, "梦魇武器箱"),
        (800, "The Dust 2 Collection"),
    ]
    .iter()
    .map(|(id, name)| json!({"qaq_id": id, "name": name}).as_object().cloned().unwrap())
    .collect();
    store
        .upsert_batch(tables::BOXES, &parents, &["qaq_id"])
        .await
        .unwrap();
    Arc::new(store)
}

#[tokio::test]
async fn test_eligible_parents_by_name_marker() {
    let dir = tempfile::tempdir().unwrap();
    let store = seeded_store(&dir).await;
    let harvester = ContainerDetailHarvester::new(
        Box::new(ScriptedSource::new(&[])),
        TransformOptions::default(),
    )
    .with_store(store);

    assert_eq!(harvester.eligible_parents().await.unwrap(), vec![700, 500, 800]);
}

#[tokio::test]
async fn test_failures_do_not_stop_the_batch() {
    let source = ScriptedSource::new(&[
        (501, Reply::Panic),
        (502, Reply::Timeout),
        (503, Reply::Empty),
    ]);
    let calls = Arc::clone(&source.calls);
    let harvester = ContainerDetailHarvester::new(Box::new(source), TransformOptions::default())
        .with_delay(Duration::ZERO);

    let batch = harvester.harvest_batch(&[501, 502, 503, 504]).await;

    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert_eq!(batch.total, 4);
    assert_eq!(batch.succeeded, 1);
    assert_eq!(batch.failed, 3);

    let errors: Vec<&str> = batch
        .outcomes
        .iter()
        .map(|o| o.error.as_deref().unwrap_or(""))
        .collect();
    assert!(errors[0].contains("blew up for 501"));
    assert!(errors[1].starts_with("no data"));
    assert!(errors[1].contains("35000ms"));
    assert_eq!(errors[2], "no data");
    assert!(batch.outcomes[3].success);
    assert_eq!(batch.outcomes[3].skins, 1);
    assert_eq!(batch.outcomes[3].melee, 1);
}

#[tokio::test]
async fn test_delay_applies_between_parents_only() {
    let harvester = ContainerDetailHarvester::new(
        Box::new(ScriptedSource::new(&[])),
        TransformOptions::default(),
    )
    .with_delay(Duration::from_millis(40));

    let started = std::time::Instant::now();
    harvester.harvest_batch(&[1, 2, 3]).await;
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_millis(80));
    assert!(elapsed < Duration::from_millis(2000));
}

#[tokio::test]
async fn test_full_run_persists_and_dumps() {
    let dir = tempfile::tempdir().unwrap();
    let store = seeded_store(&dir).await;
    let dumps = dir.path().join("out");
    let harvester = ContainerDetailHarvester::new(
        Box::new(ScriptedSource::new(&[(800, Reply::Panic)])),
        TransformOptions::default(),
    )
    .with_store(store.clone())
    .with_dump(FileDump::new(&dumps))
    .with_delay(Duration::ZERO);

    let report = harvester.run().await;

    assert_eq!(report.harvester, "container_detail");
    assert_eq!(report.processed, 3);
    assert_eq!(report.failed, 1);
    assert!(!report.success);
    assert!(report.finished_at >= report.started_at);

    let ok: Vec<i64> = report
        .outcomes
        .iter()
        .filter(|o| o.success)
        .map(|o| o.parent_id)
        .collect();
    assert_eq!(ok, vec![700, 500]);
    for outcome in report.outcomes.iter().filter(|o| o.success) {
        let stats = outcome.persist.as_ref().unwrap();
        assert_eq!((stats.skin_links, stats.melee_links, stats.failed), (1, 1, 0));
        assert!(outcome.dump.as_ref().unwrap().starts_with(&dumps));
    }

    assert_eq!(store.count(tables::GUN_SKINS).await.unwrap(), 1);
    assert_eq!(store.count(tables::KNIFE_GLOVES).await.unwrap(), 1);
    assert_eq!(store.count(tables::BOX_GUN_SKIN_RELATIONS).await.unwrap(), 2);
    assert_eq!(store.count(tables::BOX_KNIFE_GLOVE_RELATIONS).await.unwrap(), 2);
}

#[tokio::test]
async fn test_persist_disabled_reads_parents_but_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let store = seeded_store(&dir).await;
    let harvester = ContainerDetailHarvester::new(
        Box::new(ScriptedSource::new(&[])),
        TransformOptions::default(),
    )
    .with_store(store.clone())
    .with_persist(false)
    .with_delay(Duration::ZERO);

    let report = harvester.run().await;

    assert!(report.success);
    assert_eq!(report.processed, 3);
    assert!(report.outcomes.iter().all(|o| o.persist.is_none()));
    assert_eq!(store.count(tables::GUN_SKINS).await.unwrap(), 0);
}

#[tokio::test]
async fn test_run_without_store_fails_cleanly() {
    let harvester = ContainerDetailHarvester::new(
        Box::new(ScriptedSource::new(&[])),
        TransformOptions::default(),
    );
    let report = harvester.run().await;

    assert!(!report.success);
    assert_eq!(report.processed, 0);
    assert!(report.error.unwrap().contains("no store configured"));
}

#[tokio::test]
async fn test_registry_runs_detail_harvester_by_name() {
    let dir = tempfile::tempdir().unwrap();
    let store = seeded_store(&dir).await;
    let mut registry = HarvesterRegistry::new();
    registry.register(Box::new(
        ContainerDetailHarvester::new(
            Box::new(ScriptedSource::new(&[])),
            TransformOptions::default(),
        )
        .with_store(store)
        .with_delay(Duration::ZERO),
    ));

    assert_eq!(registry.names(), vec!["container_detail"]);
    let report = registry.run("container_detail").await;
    assert!(report.success);
    assert_eq!(report.processed, 3);

    let missing = registry.run("market_prices").await;
    assert!(!missing.success);
    assert!(missing.error.unwrap().contains("market_prices"));
}

#[tokio::test]
async fn test_report_json_shape() {
    let harvester = ContainerDetailHarvester::new(
        Box::new(ScriptedSource::new(&[(2, Reply::Empty)])),
        TransformOptions::default(),
    )
    .with_delay(Duration::ZERO);
    let batch = harvester.harvest_batch(&[1, 2]).await;

    assert_json_diff::assert_json_include!(
        actual: serde_json::to_value(&batch).unwrap(),
        expected: json!({
            "total": 2,
            "succeeded": 1,
            "failed": 1,
            "outcomes": [
                {"parent_id": 1, "success": true, "raw_items": 3, "skins": 1, "melee": 1},
                {"parent_id": 2, "success": false, "error": "no data"}
            ]
        })
    );
    let failed = serde_json::to_value(&batch.outcomes[1]).unwrap();
    assert!(failed.get("persist").is_none());
    assert!(failed.get("dump").is_none());
}
