//! Named harvester registry.

use super::{Harvester, RunReport};
use tracing::{info, warn};

/// Harvesters by name, run in registration order.
#[derive(Default)]
pub struct HarvesterRegistry {
    harvesters: Vec<Box<dyn Harvester>>,
}

impl HarvesterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a harvester, replacing any earlier one with the same name.
    pub fn register(&mut self, harvester: Box<dyn Harvester>) {
        let name = harvester.name().to_string();
        match self.harvesters.iter().position(|h| h.name() == name) {
            Some(i) => {
                warn!("replacing harvester {name}");
                self.harvesters[i] = harvester;
            }
            None => {
                info!("registered harvester {name}");
                self.harvesters.push(harvester);
            }
        }
    }

    pub fn names(&self) -> Vec<&str> {
        self.harvesters.iter().map(|h| h.name()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&dyn Harvester> {
        self.harvesters
            .iter()
            .find(|h| h.name() == name)
            .map(|h| h.as_ref())
    }

    /// Run one harvester. An unknown name yields a failed report.
    pub async fn run(&self, name: &str) -> RunReport {
        match self.get(name) {
            Some(harvester) => {
                info!("running harvester {name}");
                harvester.run().await
            }
            None => RunReport::start(name).fail(format!("harvester '{name}' is not registered")),
        }
    }

    /// Run every harvester sequentially.
    pub async fn run_all(&self) -> Vec<RunReport> {
        info!("running {} harvesters", self.harvesters.len());
        let mut reports = Vec::with_capacity(self.harvesters.len());
        for harvester in &self.harvesters {
            reports.push(harvester.run().await);
        }
        let succeeded = reports.iter().filter(|r| r.success).count();
        info!("all harvesters finished: {succeeded}/{} succeeded", reports.len());
        reports
    }
}
