//! Upsert/link pipeline against a real SQLite store.

use async_trait::async_trait;
use case_catalog::{transform, RawItemRecord, RarityTier, TransformOptions, Transformed};
use case_harvest::error::StoreError;
use case_harvest::pipeline::{persist, resolve_parent};
use case_harvest::store::{row_i64, tables, Filter, Row, SqliteStore, Store};
use case_harvest::ParentError;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};

fn row(v: serde_json::Value) -> Row {
    v.as_object().cloned().unwrap()
}

async fn store_with_parents(parents: &[(i64, &str)]) -> (tempfile::TempDir, SqliteStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::open(&dir.path().join("harvest.db")).unwrap();
    let rows: Vec<Row> = parents
        .iter()
        .map(|(id, name)| row(json!({"qaq_id": id, "name": name})))
        .collect();
    store
        .upsert_batch(tables::BOXES, &rows, &["qaq_id"])
        .await
        .unwrap();
    (dir, store)
}

fn scenario_items() -> Vec<RawItemRecord> {
    vec![
        RawItemRecord::new(1, "AK-47 | Redline", "隐秘"),
        RawItemRecord::new(2, "Karambit | Fade", "非凡"),
        RawItemRecord::new(3, "P250 | Sand Dune", "消费"),
    ]
}

async fn counts(store: &SqliteStore) -> [usize; 4] {
    [
        store.count(tables::GUN_SKINS).await.unwrap(),
        store.count(tables::KNIFE_GLOVES).await.unwrap(),
        store.count(tables::BOX_GUN_SKIN_RELATIONS).await.unwrap(),
        store.count(tables::BOX_KNIFE_GLOVE_RELATIONS).await.unwrap(),
    ]
}

#[tokio::test]
async fn test_end_to_end_scenario() {
    let (_dir, store) = store_with_parents(&[(500, "Chroma Weapon Case")]).await;
    let data = transform(&scenario_items(), 500, &TransformOptions::default());

    assert_eq!(data.skins.len(), 1);
    assert_eq!(data.skins[0].weapon_type.as_deref(), Some("AK-47"));
    assert_eq!(data.skins[0].rarity, RarityTier::Covert);
    assert_eq!(data.melee.len(), 1);
    assert_eq!(data.melee[0].rarity, RarityTier::Exceptional);

    let stats = persist(&store, 500, &data).await;
    assert_eq!(stats.skins, 1);
    assert_eq!(stats.melee, 1);
    assert_eq!(stats.skin_links, 1);
    assert_eq!(stats.melee_links, 1);
    assert_eq!(stats.failed, 0);
    assert_eq!(counts(&store).await, [1, 1, 1, 1]);

    let knives = store
        .query(tables::KNIFE_GLOVES, &[Filter::eq("qaq_id", 2)], None)
        .await
        .unwrap();
    assert_eq!(knives[0]["item_type"], "knife");
    assert!(store
        .query(tables::GUN_SKINS, &[Filter::eq("qaq_id", 3)], None)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_persist_twice_is_idempotent() {
    let (_dir, store) = store_with_parents(&[(500, "Chroma Weapon Case")]).await;
    let data = transform(&scenario_items(), 500, &TransformOptions::default());

    let first = persist(&store, 500, &data).await;
    let after_first = counts(&store).await;
    let second = persist(&store, 500, &data).await;

    assert_eq!(first, second);
    assert_eq!(counts(&store).await, after_first);
}

#[tokio::test]
async fn test_same_item_in_two_parents_links_both() {
    let (_dir, store) =
        store_with_parents(&[(500, "Chroma Weapon Case"), (501, "Chroma 2 Weapon Case")]).await;
    let options = TransformOptions::default();
    persist(&store, 500, &transform(&scenario_items(), 500, &options)).await;
    persist(&store, 501, &transform(&scenario_items(), 501, &options)).await;

    assert_eq!(counts(&store).await, [1, 1, 2, 2]);
}

#[tokio::test]
async fn test_duplicate_items_in_one_batch_collapse() {
    let (_dir, store) = store_with_parents(&[(500, "Chroma Weapon Case")]).await;
    let mut raw = scenario_items();
    raw.push(RawItemRecord::new(1, "AK-47 | Redline (dup)", "隐秘"));
    let data = transform(&raw, 500, &TransformOptions::default());
    assert_eq!(data.skins.len(), 2);

    let stats = persist(&store, 500, &data).await;
    assert_eq!(stats.skins, 1);
    assert_eq!(stats.skin_links, 1);
    assert_eq!(stats.failed, 0);

    let stored = store
        .query(tables::GUN_SKINS, &[Filter::eq("qaq_id", 1)], None)
        .await
        .unwrap();
    assert_eq!(stored[0]["name"], "AK-47 | Redline");
}

#[tokio::test]
async fn test_parent_guard_mismatch_writes_nothing() {
    let (_dir, store) = store_with_parents(&[(600, "Sticker Capsule")]).await;
    let data = transform(&scenario_items(), 600, &TransformOptions::default());
    assert!(!data.is_empty());

    let stats = persist(&store, 600, &data).await;
    assert_eq!(stats.failed, 1);
    assert!(stats.parent_error.unwrap().contains("Sticker Capsule"));
    assert_eq!(counts(&store).await, [0, 0, 0, 0]);

    assert!(matches!(
        resolve_parent(&store, 600).await,
        Err(ParentError::Mismatch { .. })
    ));
}

#[tokio::test]
async fn test_missing_parent_writes_nothing() {
    let (_dir, store) = store_with_parents(&[]).await;
    let data = transform(&scenario_items(), 999, &TransformOptions::default());

    let stats = persist(&store, 999, &data).await;
    assert_eq!(stats.failed, 1);
    assert_eq!(counts(&store).await, [0, 0, 0, 0]);
    assert!(matches!(
        resolve_parent(&store, 999).await,
        Err(ParentError::NotFound(999))
    ));
}

#[tokio::test]
async fn test_chinese_parent_marker_accepted() {
    let (_dir, store) = store_with_parents(&[(700, "梦魇武器箱")]).await;
    let data = transform(&scenario_items(), 700, &TransformOptions::default());
    let stats = persist(&store, 700, &data).await;
    assert_eq!(stats.failed, 0);
    assert_eq!(stats.skins + stats.melee, 2);
}

/// Delegates to SQLite but rejects every write to one table.
struct FailingTable {
    inner: SqliteStore,
    table: &'static str,
    rejected: AtomicUsize,
}

#[async_trait]
impl Store for FailingTable {
    fn kind(&self) -> &'static str {
        "failing"
    }

    async fn upsert_batch(
        &self,
        table: &str,
        rows: &[Row],
        conflict_columns: &[&str],
    ) -> Result<Vec<Row>, StoreError> {
        if table == self.table {
            self.rejected.fetch_add(1, Ordering::SeqCst);
            return Err(StoreError::Rejected {
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        self.inner.upsert_batch(table, rows, conflict_columns).await
    }

    async fn query(
        &self,
        table: &str,
        filters: &[Filter],
        limit: Option<usize>,
    ) -> Result<Vec<Row>, StoreError> {
        self.inner.query(table, filters, limit).await
    }
}

#[tokio::test]
async fn test_skin_failure_does_not_block_melee() {
    let (_dir, inner) = store_with_parents(&[(500, "Chroma Weapon Case")]).await;
    let store = FailingTable {
        inner: inner.clone(),
        table: tables::GUN_SKINS,
        rejected: AtomicUsize::new(0),
    };
    let data = transform(&scenario_items(), 500, &TransformOptions::default());

    let stats = persist(&store, 500, &data).await;
    assert_eq!(stats.skins, 0);
    assert_eq!(stats.skin_links, 0);
    assert_eq!(stats.melee, 1);
    assert_eq!(stats.melee_links, 1);
    assert_eq!(stats.failed, 1);
    assert_eq!(store.rejected.load(Ordering::SeqCst), 1);
    assert_eq!(counts(&inner).await, [0, 1, 0, 1]);
}

#[tokio::test]
async fn test_link_failure_counts_links() {
    let (_dir, inner) = store_with_parents(&[(500, "Chroma Weapon Case")]).await;
    let store = FailingTable {
        inner: inner.clone(),
        table: tables::BOX_KNIFE_GLOVE_RELATIONS,
        rejected: AtomicUsize::new(0),
    };
    let data = transform(&scenario_items(), 500, &TransformOptions::default());

    let stats = persist(&store, 500, &data).await;
    assert_eq!(stats.melee, 1);
    assert_eq!(stats.melee_links, 0);
    assert_eq!(stats.skin_links, 1);
    assert_eq!(stats.failed, 1);
}

#[tokio::test]
async fn test_empty_transform_persists_nothing() {
    let (_dir, store) = store_with_parents(&[(500, "Chroma Weapon Case")]).await;
    let stats = persist(&store, 500, &Transformed::default()).await;
    assert_eq!(stats.failed, 0);
    assert_eq!(stats.skins + stats.melee, 0);
    assert_eq!(counts(&store).await, [0, 0, 0, 0]);
}

#[tokio::test]
async fn test_links_reference_store_identities() {
    let (_dir, store) = store_with_parents(&[(500, "Chroma Weapon Case")]).await;
    let data = transform(&scenario_items(), 500, &TransformOptions::default());
    persist(&store, 500, &data).await;

    let parent = store
        .query(tables::BOXES, &[Filter::eq("qaq_id", 500)], None)
        .await
        .unwrap();
    let skin = store
        .query(tables::GUN_SKINS, &[Filter::eq("qaq_id", 1)], None)
        .await
        .unwrap();
    let links = store
        .query(tables::BOX_GUN_SKIN_RELATIONS, &[], None)
        .await
        .unwrap();

    assert_eq!(row_i64(&links[0], "box_id"), row_i64(&parent[0], "id"));
    assert_eq!(row_i64(&links[0], "gun_skin_id"), row_i64(&skin[0], "id"));
}
