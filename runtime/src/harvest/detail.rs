//! Container detail harvester: for each eligible parent, fetch its item list,
//! classify it and persist items plus parent links.

use super::{panic_message, BatchReport, Harvester, ParentOutcome, RunReport};
use crate::acquisition::DetailSource;
use crate::dump::FileDump;
use crate::error::StoreError;
use crate::pipeline::{self, EXTERNAL_ID};
use crate::store::{row_i64, tables, Filter, Store};
use async_trait::async_trait;
use case_catalog::classify::parent_name_markers;
use case_catalog::{transform, TransformOptions};
use futures::FutureExt;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

pub const NAME: &str = "container_detail";

/// Orchestrates fetch → transform → dump → persist for catalog parents.
pub struct ContainerDetailHarvester {
    source: Box<dyn DetailSource>,
    options: TransformOptions,
    store: Option<Arc<dyn Store>>,
    dump: Option<FileDump>,
    delay: Duration,
    persist: bool,
}

impl ContainerDetailHarvester {
    pub fn new(source: Box<dyn DetailSource>, options: TransformOptions) -> Self {
        Self {
            source,
            options,
            store: None,
            dump: None,
            delay: Duration::from_secs(1),
            persist: true,
        }
    }

    /// Read parents from `store` and persist results into it.
    pub fn with_store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    /// Whether harvested rows are written to the store. Parents are still read from it.
    pub fn with_persist(mut self, persist: bool) -> Self {
        self.persist = persist;
        self
    }

    /// Dump each parent's transformed rows to a file.
    pub fn with_dump(mut self, dump: FileDump) -> Self {
        self.dump = Some(dump);
        self
    }

    /// Pause between consecutive parents of a batch.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Harvest one parent. Every failure ends up in the outcome.
    pub async fn harvest_parent(&self, parent_id: i64) -> ParentOutcome {
        info!("harvesting parent {parent_id} via {}", self.source.label());

        let raw = match self.source.fetch(parent_id).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return ParentOutcome::failed(parent_id, "no data"),
            Err(e) => {
                warn!("no data for parent {parent_id}: {e}");
                return ParentOutcome::failed(parent_id, format!("no data: {e}"));
            }
        };

        let data = transform(&raw, parent_id, &self.options);
        let mut outcome = ParentOutcome {
            parent_id,
            raw_items: raw.len(),
            skins: data.skins.len(),
            melee: data.melee.len(),
            ..Default::default()
        };
        if data.is_empty() {
            info!("parent {parent_id}: none of {} records kept", raw.len());
            outcome.error = Some("transformation produced no rows".to_string());
            return outcome;
        }

        if let Some(dump) = &self.dump {
            match dump.write_detail(parent_id, &data).await {
                Ok(path) => outcome.dump = Some(path),
                Err(e) => error!("failed to dump parent {parent_id}: {e:#}"),
            }
        }

        match self.store.as_ref().filter(|_| self.persist) {
            Some(store) => {
                let stats = pipeline::persist(store.as_ref(), parent_id, &data).await;
                outcome.success = stats.is_clean();
                if let Some(reason) = &stats.parent_error {
                    outcome.error = Some(reason.clone());
                } else if !stats.is_clean() {
                    outcome.error = Some(format!("{} rows failed to persist", stats.failed));
                }
                outcome.persist = Some(stats);
            }
            None => outcome.success = true,
        }
        outcome
    }

    /// Harvest parents one after another, pausing between them. A failing or
    /// panicking parent never stops the batch.
    pub async fn harvest_batch(&self, parent_ids: &[i64]) -> BatchReport {
        let mut outcomes = Vec::with_capacity(parent_ids.len());

        for (i, &parent_id) in parent_ids.iter().enumerate() {
            if i > 0 && !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            info!("[{}/{}] parent {parent_id}", i + 1, parent_ids.len());

            let outcome = match AssertUnwindSafe(self.harvest_parent(parent_id))
                .catch_unwind()
                .await
            {
                Ok(outcome) => outcome,
                Err(panic) => {
                    let message = panic_message(panic);
                    error!("parent {parent_id} panicked: {message}");
                    ParentOutcome::failed(parent_id, format!("unexpected failure: {message}"))
                }
            };
            outcomes.push(outcome);
        }

        let report = BatchReport::from_outcomes(outcomes);
        info!(
            "batch finished: {}/{} parents succeeded",
            report.succeeded, report.total
        );
        report
    }

    /// Parents whose name marks them as a case or collection, in store order.
    pub async fn eligible_parents(&self) -> Result<Vec<i64>, StoreError> {
        let store = self.store.as_ref().ok_or(StoreError::NotConfigured)?;

        let mut seen = HashSet::new();
        let mut ids = Vec::new();
        for marker in parent_name_markers() {
            let rows = store
                .query(tables::BOXES, &[Filter::contains("name", marker)], None)
                .await?;
            for row in &rows {
                if let Some(id) = row_i64(row, EXTERNAL_ID) {
                    if seen.insert(id) {
                        ids.push(id);
                    }
                }
            }
        }
        info!("{} eligible parents", ids.len());
        Ok(ids)
    }
}

#[async_trait]
impl Harvester for ContainerDetailHarvester {
    fn name(&self) -> &str {
        NAME
    }

    async fn run(&self) -> RunReport {
        let report = RunReport::start(NAME);
        match self.eligible_parents().await {
            Ok(ids) => report.finish_batch(self.harvest_batch(&ids).await),
            Err(e) => {
                error!("cannot list parents: {e}");
                report.fail(format!("cannot list parents: {e}"))
            }
        }
    }
}
