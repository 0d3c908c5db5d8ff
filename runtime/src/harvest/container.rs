//! Container list harvester: capture the container page's list call and store
//! every container as a parent row.

use super::{Harvester, RunReport};
use crate::dump::FileDump;
use crate::error::{CaptureError, StoreError};
use crate::intercept::Interceptor;
use crate::pipeline::{dedupe_by, to_rows, EXTERNAL_ID};
use crate::store::{row_i64, tables, Store};
use async_trait::async_trait;
use case_catalog::{extract_records, transform_parents, CatalogParent};
use std::sync::Arc;
use tracing::{error, info};

pub const NAME: &str = "container";

/// Harvests the parent list from the container page.
pub struct ContainerHarvester {
    interceptor: Interceptor,
    page_url: String,
    api_pattern: String,
    timeout_ms: u64,
    settle_delay_ms: u64,
    store: Option<Arc<dyn Store>>,
    dump: Option<FileDump>,
}

impl ContainerHarvester {
    pub fn new(
        interceptor: Interceptor,
        page_url: &str,
        api_pattern: &str,
        timeout_ms: u64,
        settle_delay_ms: u64,
    ) -> Self {
        Self {
            interceptor,
            page_url: page_url.to_string(),
            api_pattern: api_pattern.to_string(),
            timeout_ms,
            settle_delay_ms,
            store: None,
            dump: None,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_dump(mut self, dump: FileDump) -> Self {
        self.dump = Some(dump);
        self
    }

    /// Capture the list call and turn its records into parents.
    pub async fn collect(&self) -> Result<Vec<CatalogParent>, CaptureError> {
        let body = self
            .interceptor
            .intercept(
                &self.page_url,
                &self.api_pattern,
                self.timeout_ms,
                self.settle_delay_ms,
            )
            .await?;
        let records = extract_records(body);
        let parents = transform_parents(&records);
        info!("{} of {} container records usable", parents.len(), records.len());
        Ok(parents)
    }

    /// Upsert parents on `qaq_id`; returns the number of stored rows.
    pub async fn save(&self, store: &dyn Store, parents: &[CatalogParent]) -> Result<usize, StoreError> {
        let rows = dedupe_by(to_rows(parents), |row| row_i64(row, EXTERNAL_ID));
        let stored = store
            .upsert_batch(tables::BOXES, &rows, &[EXTERNAL_ID])
            .await?;
        info!("upserted {} containers", stored.len());
        Ok(stored.len())
    }
}

#[async_trait]
impl Harvester for ContainerHarvester {
    fn name(&self) -> &str {
        NAME
    }

    async fn run(&self) -> RunReport {
        let report = RunReport::start(NAME);

        let parents = match self.collect().await {
            Ok(parents) if !parents.is_empty() => parents,
            Ok(_) => return report.fail("no containers captured"),
            Err(e) => return report.fail(e.to_string()),
        };

        if let Some(dump) = &self.dump {
            if let Err(e) = dump.write_containers(&parents).await {
                error!("failed to dump containers: {e:#}");
            }
        }

        match &self.store {
            Some(store) => match self.save(store.as_ref(), &parents).await {
                Ok(_) => report.finish(parents.len(), 0),
                Err(e) => {
                    error!("failed to save containers: {e}");
                    let mut report = report.finish(parents.len(), parents.len());
                    report.error = Some(e.to_string());
                    report
                }
            },
            None => report.finish(parents.len(), 0),
        }
    }
}
