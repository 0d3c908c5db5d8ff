//! `containers`, `details`, `run` and `list` subcommands.

use super::{output, setup};
use crate::config::{DetailSourceKind, HarvestConfig};
use crate::harvest::{detail, Harvester, RunReport};
use anyhow::{bail, Result};

/// Harvest the container list into the parent table.
pub async fn containers(config: &HarvestConfig) -> Result<()> {
    let store = setup::open_store(config)?;
    let report = setup::container_harvester(config, store)?.run().await;
    finish(&[report])
}

/// Harvest details for explicit parent ids, or for every eligible parent with `all`.
pub async fn details(
    config: &HarvestConfig,
    ids: &[i64],
    all: bool,
    source: Option<DetailSourceKind>,
) -> Result<()> {
    if ids.is_empty() && !all {
        bail!("pass parent ids or --all");
    }
    let store = setup::open_store(config)?;
    let kind = source.unwrap_or(config.site.detail_source);
    let harvester = setup::detail_harvester(config, store, kind)?;

    let report = if all {
        harvester.run().await
    } else {
        RunReport::start(detail::NAME).finish_batch(harvester.harvest_batch(ids).await)
    };
    finish(&[report])
}

/// Run one registered harvester, or all of them.
pub async fn run(config: &HarvestConfig, name: Option<&str>) -> Result<()> {
    let registry = setup::registry(config)?;
    let reports = match name {
        Some(name) => vec![registry.run(name).await],
        None => registry.run_all().await,
    };
    finish(&reports)
}

/// Print the registered harvester names.
pub fn list(config: &HarvestConfig) -> Result<()> {
    let registry = setup::registry(config)?;
    let names = registry.names();
    if output::is_json() {
        output::print_json(&serde_json::json!({ "harvesters": names }));
    } else {
        for name in names {
            println!("{name}");
        }
    }
    Ok(())
}

/// Print the reports; a run that failed before processing anything is an error.
fn finish(reports: &[RunReport]) -> Result<()> {
    for report in reports {
        output::print_report(report);
    }
    let setup_failures: Vec<&str> = reports
        .iter()
        .filter(|r| !r.success && r.processed == 0)
        .filter_map(|r| r.error.as_deref())
        .collect();
    if !setup_failures.is_empty() {
        bail!("{}", setup_failures.join("; "));
    }
    Ok(())
}
