//! Harvesters: the per-parent detail orchestrator, the container list
//! harvester and the registry that runs them by name.

pub mod container;
pub mod detail;
pub mod registry;

use crate::pipeline::PersistStats;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::path::PathBuf;
use uuid::Uuid;

pub use container::ContainerHarvester;
pub use detail::ContainerDetailHarvester;
pub use registry::HarvesterRegistry;

/// A named harvest job.
#[async_trait]
pub trait Harvester: Send + Sync {
    fn name(&self) -> &str;

    /// Run the whole job. Failures are reported, never raised.
    async fn run(&self) -> RunReport;
}

/// Result of harvesting one parent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParentOutcome {
    pub parent_id: i64,
    pub success: bool,
    /// Raw records received from the detail source.
    pub raw_items: usize,
    /// Rows left after transformation.
    pub skins: usize,
    pub melee: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persist: Option<PersistStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dump: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ParentOutcome {
    pub fn failed(parent_id: i64, error: impl Into<String>) -> Self {
        Self {
            parent_id,
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

/// Result of a sequential batch of parents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub outcomes: Vec<ParentOutcome>,
}

impl BatchReport {
    pub fn from_outcomes(outcomes: Vec<ParentOutcome>) -> Self {
        let succeeded = outcomes.iter().filter(|o| o.success).count();
        Self {
            total: outcomes.len(),
            succeeded,
            failed: outcomes.len() - succeeded,
            outcomes,
        }
    }
}

/// Result of one harvester run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub harvester: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub success: bool,
    /// Units processed (parents, or containers for the list harvester).
    pub processed: usize,
    pub failed: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outcomes: Vec<ParentOutcome>,
}

impl RunReport {
    /// A report whose run has started now.
    pub fn start(harvester: &str) -> Self {
        let now = Utc::now();
        Self {
            run_id: Uuid::new_v4(),
            harvester: harvester.to_string(),
            started_at: now,
            finished_at: now,
            success: false,
            processed: 0,
            failed: 0,
            error: None,
            outcomes: Vec::new(),
        }
    }

    /// Close a run that failed before processing anything.
    pub fn fail(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self.success = false;
        self.finished_at = Utc::now();
        self
    }

    /// Close a run from its batch report.
    pub fn finish_batch(mut self, batch: BatchReport) -> Self {
        self.processed = batch.total;
        self.failed = batch.failed;
        self.success = batch.failed == 0;
        self.outcomes = batch.outcomes;
        self.finished_at = Utc::now();
        self
    }

    /// Close a run that processed `processed` units, `failed` of them unsuccessfully.
    pub fn finish(mut self, processed: usize, failed: usize) -> Self {
        self.processed = processed;
        self.failed = failed;
        self.success = failed == 0;
        self.finished_at = Utc::now();
        self
    }

    pub fn elapsed_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
