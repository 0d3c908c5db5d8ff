//! Build harvesters and their collaborators from a validated configuration.

use crate::acquisition::{ApiAuth, ApiDetailSource, BrowserDetailSource, DetailSource, HttpClient};
use crate::config::{DetailSourceKind, HarvestConfig, StoreConfig};
use crate::dump::FileDump;
use crate::harvest::{ContainerDetailHarvester, ContainerHarvester, HarvesterRegistry};
use crate::intercept::{Interceptor, WaitPolicy};
use crate::renderer::chromium::ChromiumRenderer;
use crate::store::{RestStore, SqliteStore, Store};
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Open the configured store, if any.
pub fn open_store(config: &HarvestConfig) -> Result<Option<Arc<dyn Store>>> {
    let store: Arc<dyn Store> = match &config.store {
        None => return Ok(None),
        Some(StoreConfig::Rest { url, key }) => {
            Arc::new(RestStore::new(url, key, config.crawler.timeout_ms)?)
        }
        Some(StoreConfig::Sqlite { path }) => Arc::new(SqliteStore::open(path)?),
    };
    Ok(Some(store))
}

pub fn interceptor(config: &HarvestConfig) -> Result<Interceptor> {
    let renderer = ChromiumRenderer::new(config.launch_options()?);
    Ok(Interceptor::new(Arc::new(renderer), WaitPolicy::default()))
}

fn dump(config: &HarvestConfig) -> Option<FileDump> {
    config
        .crawler
        .save_to_file
        .then(|| FileDump::new(&config.crawler.output_dir))
}

pub fn detail_source(config: &HarvestConfig, kind: DetailSourceKind) -> Result<Box<dyn DetailSource>> {
    let site = &config.site;
    let source: Box<dyn DetailSource> = match kind {
        DetailSourceKind::Api => {
            let auth = match &site.api_token {
                Some(token) => ApiAuth::Header {
                    name: site.token_header.clone(),
                    value: token.clone(),
                },
                None => {
                    warn!("no API token configured, detail requests are unauthenticated");
                    ApiAuth::None
                }
            };
            let client = HttpClient::new(&site.user_agent, config.crawler.timeout_ms, auth)?;
            Box::new(ApiDetailSource::new(client, &site.detail_endpoint, &site.id_param))
        }
        DetailSourceKind::Browser => Box::new(BrowserDetailSource::new(
            interceptor(config)?,
            &site.resolve(&site.detail_page_template),
            &site.detail_api_pattern,
            config.crawler.browser_timeout_ms,
            config.crawler.settle_delay_ms,
        )),
    };
    Ok(source)
}

pub fn detail_harvester(
    config: &HarvestConfig,
    store: Option<Arc<dyn Store>>,
    kind: DetailSourceKind,
) -> Result<ContainerDetailHarvester> {
    let mut harvester =
        ContainerDetailHarvester::new(detail_source(config, kind)?, config.transform_options()?)
            .with_delay(Duration::from_millis(config.crawler.delay_ms))
            .with_persist(config.crawler.save_to_db);
    if let Some(store) = store {
        harvester = harvester.with_store(store);
    }
    if let Some(dump) = dump(config) {
        harvester = harvester.with_dump(dump);
    }
    Ok(harvester)
}

pub fn container_harvester(
    config: &HarvestConfig,
    store: Option<Arc<dyn Store>>,
) -> Result<ContainerHarvester> {
    let mut harvester = ContainerHarvester::new(
        interceptor(config)?,
        &config.site.container_page_url(),
        &config.site.container_api_pattern,
        config.crawler.browser_timeout_ms,
        config.crawler.settle_delay_ms,
    );
    if let Some(store) = store.filter(|_| config.crawler.save_to_db) {
        harvester = harvester.with_store(store);
    }
    if let Some(dump) = dump(config) {
        harvester = harvester.with_dump(dump);
    }
    Ok(harvester)
}

/// Every harvester, containers first so fresh parents are visible to the detail run.
pub fn registry(config: &HarvestConfig) -> Result<HarvesterRegistry> {
    let store = open_store(config)?;
    let mut registry = HarvesterRegistry::new();
    registry.register(Box::new(container_harvester(config, store.clone())?));
    registry.register(Box::new(detail_harvester(
        config,
        store,
        config.site.detail_source,
    )?));
    Ok(registry)
}
