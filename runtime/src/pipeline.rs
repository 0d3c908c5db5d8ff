//! Upsert/link pipeline: persist one parent's transformed items and their
//! parent links.
//!
//! The store has no multi-table transaction. Every write is an upsert on a
//! natural key (`qaq_id`) or a composite link key (`box_id`, item id), so a
//! whole persist call can be retried without creating duplicates.

use crate::error::ParentError;
use crate::store::{row_i64, row_str, tables, Filter, Row, Store};
use case_catalog::{is_parent_name_match, PendingLink, Transformed};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tracing::{error, info, warn};

/// Natural key of parent and item rows.
pub const EXTERNAL_ID: &str = "qaq_id";
/// Store-assigned identity column.
pub const IDENTITY: &str = "id";
/// Parent column of both link tables.
pub const PARENT_LINK_COLUMN: &str = "box_id";

/// Counters of one persist call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistStats {
    pub skins: usize,
    pub melee: usize,
    pub skin_links: usize,
    pub melee_links: usize,
    /// Rows of failed batches, or 1 when the parent could not be resolved.
    pub failed: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_error: Option<String>,
}

impl PersistStats {
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

/// One item category's tables.
struct Partition {
    label: &'static str,
    item_table: &'static str,
    link_table: &'static str,
    link_column: &'static str,
}

const SKINS: Partition = Partition {
    label: "skin",
    item_table: tables::GUN_SKINS,
    link_table: tables::BOX_GUN_SKIN_RELATIONS,
    link_column: "gun_skin_id",
};

const MELEE: Partition = Partition {
    label: "melee",
    item_table: tables::KNIFE_GLOVES,
    link_table: tables::BOX_KNIFE_GLOVE_RELATIONS,
    link_column: "knife_glove_id",
};

#[derive(Debug, Default)]
struct PartitionStats {
    items: usize,
    links: usize,
    failed: usize,
}

/// Look up a parent by external id and return its store identity.
///
/// Fails when the parent is missing or its name is not a case or collection.
pub async fn resolve_parent(store: &dyn Store, external_id: i64) -> Result<i64, ParentError> {
    let rows = store
        .query(tables::BOXES, &[Filter::eq(EXTERNAL_ID, external_id)], Some(1))
        .await?;
    let row = rows.first().ok_or(ParentError::NotFound(external_id))?;

    let name = row_str(row, "name").unwrap_or_default();
    if !is_parent_name_match(name) {
        return Err(ParentError::Mismatch {
            external_id,
            name: name.to_string(),
        });
    }
    row_i64(row, IDENTITY).ok_or(ParentError::MissingIdentity { external_id })
}

/// Persist `data` under the parent `parent_external_id`.
///
/// A missing or mismatched parent aborts before any write. Otherwise skins and
/// melee items are written independently; a failed item batch skips its link
/// batch and counts its rows as failed.
pub async fn persist(store: &dyn Store, parent_external_id: i64, data: &Transformed) -> PersistStats {
    let mut stats = PersistStats::default();

    let parent_id = match resolve_parent(store, parent_external_id).await {
        Ok(id) => id,
        Err(e) => {
            error!("aborting persist for parent {parent_external_id}: {e}");
            stats.failed = 1;
            stats.parent_error = Some(e.to_string());
            return stats;
        }
    };

    let skins = persist_partition(
        store,
        parent_id,
        &SKINS,
        to_rows(&data.skins),
        &data.skin_links,
    )
    .await;
    let melee = persist_partition(
        store,
        parent_id,
        &MELEE,
        to_rows(&data.melee),
        &data.melee_links,
    )
    .await;

    stats.skins = skins.items;
    stats.skin_links = skins.links;
    stats.melee = melee.items;
    stats.melee_links = melee.links;
    stats.failed = skins.failed + melee.failed;

    info!(
        "parent {parent_external_id}: {} skins ({} links), {} melee ({} links), {} failed",
        stats.skins, stats.skin_links, stats.melee, stats.melee_links, stats.failed
    );
    stats
}

async fn persist_partition(
    store: &dyn Store,
    parent_id: i64,
    partition: &Partition,
    rows: Vec<Row>,
    pending: &[PendingLink],
) -> PartitionStats {
    let mut stats = PartitionStats::default();
    let rows = dedupe_by(rows, |row| row_i64(row, EXTERNAL_ID));
    if rows.is_empty() {
        return stats;
    }

    let stored = match store
        .upsert_batch(partition.item_table, &rows, &[EXTERNAL_ID])
        .await
    {
        Ok(stored) if !stored.is_empty() => stored,
        Ok(_) => {
            warn!(
                "{} upsert into {} returned no rows",
                partition.label, partition.item_table
            );
            stats.failed = rows.len();
            return stats;
        }
        Err(e) => {
            warn!(
                "{} upsert into {} failed: {e}",
                partition.label, partition.item_table
            );
            stats.failed = rows.len();
            return stats;
        }
    };
    stats.items = stored.len();
    info!(
        "upserted {} {} rows into {}",
        stats.items, partition.label, partition.item_table
    );

    let identities: HashMap<i64, i64> = stored
        .iter()
        .filter_map(|row| Some((row_i64(row, EXTERNAL_ID)?, row_i64(row, IDENTITY)?)))
        .collect();

    let mut links = Vec::new();
    let mut seen = HashSet::new();
    for link in pending {
        let Some(item_id) = identities.get(&link.item_external_id) else {
            warn!(
                "no stored identity for {} {}, link skipped",
                partition.label, link.item_external_id
            );
            continue;
        };
        if seen.insert(*item_id) {
            let mut row = Row::new();
            row.insert(PARENT_LINK_COLUMN.to_string(), Value::from(parent_id));
            row.insert(partition.link_column.to_string(), Value::from(*item_id));
            links.push(row);
        }
    }
    if links.is_empty() {
        return stats;
    }

    match store
        .upsert_batch(
            partition.link_table,
            &links,
            &[PARENT_LINK_COLUMN, partition.link_column],
        )
        .await
    {
        Ok(linked) => {
            stats.links = linked.len();
            info!("linked {} {} rows", stats.links, partition.label);
        }
        Err(e) => {
            warn!("{} link upsert into {} failed: {e}", partition.label, partition.link_table);
            stats.failed += links.len();
        }
    }
    stats
}

pub(crate) fn to_rows<T: Serialize>(items: &[T]) -> Vec<Row> {
    items
        .iter()
        .filter_map(|item| match serde_json::to_value(item) {
            Ok(Value::Object(row)) => Some(row),
            Ok(other) => {
                warn!("item did not serialize to a row: {other}");
                None
            }
            Err(e) => {
                warn!("failed to serialize item: {e}");
                None
            }
        })
        .collect()
}

/// Keep the first row for each key; rows without a key are kept as-is.
pub(crate) fn dedupe_by<K, F>(rows: Vec<Row>, key: F) -> Vec<Row>
where
    K: std::hash::Hash + Eq,
    F: Fn(&Row) -> Option<K>,
{
    let mut seen = HashSet::new();
    rows.into_iter()
        .filter(|row| match key(row) {
            Some(k) => seen.insert(k),
            None => true,
        })
        .collect()
}
