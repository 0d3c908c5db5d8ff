//! Harvest configuration.
//!
//! Loaded as defaults → optional JSON file → environment overrides; the CLI
//! applies its flags last and then calls [`HarvestConfig::validate`].

use crate::error::ConfigError;
use crate::renderer::{LaunchOptions, ProxySettings};
use anyhow::{Context, Result};
use case_catalog::{RarityTier, TransformOptions};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

const ENV_PREFIX: &str = "CASE_HARVEST_";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HarvestConfig {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub store: Option<StoreConfig>,
}

/// Pacing, timeouts and output switches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Pause between parents of a batch.
    pub delay_ms: u64,
    /// HTTP request timeout.
    pub timeout_ms: u64,
    /// Browser navigation timeout.
    pub browser_timeout_ms: u64,
    /// Wait after navigation before looking for a capture.
    pub settle_delay_ms: u64,
    pub headless: bool,
    /// `[scheme://][user:pass@]host:port`
    pub proxy: Option<String>,
    pub save_to_file: bool,
    pub save_to_db: bool,
    pub output_dir: PathBuf,
    /// Rarity tiers kept by the detail harvest; empty keeps `restricted` and above.
    pub allowed_rarities: Vec<String>,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            delay_ms: 1000,
            timeout_ms: 30000,
            browser_timeout_ms: 30000,
            settle_delay_ms: 2000,
            headless: true,
            proxy: None,
            save_to_file: true,
            save_to_db: true,
            output_dir: PathBuf::from("."),
            allowed_rarities: Vec::new(),
        }
    }
}

/// How detail records are acquired.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DetailSourceKind {
    /// Authenticated call to the detail endpoint.
    #[default]
    Api,
    /// Intercept the detail call on the parent's page.
    Browser,
}

impl FromStr for DetailSourceKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "api" => Ok(DetailSourceKind::Api),
            "browser" => Ok(DetailSourceKind::Browser),
            _ => Err(ConfigError::InvalidValue {
                key: "detail_source".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Target site endpoints and credentials. `{base}` expands to `base_url`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    pub base_url: String,
    pub user_agent: String,
    pub item_url_template: String,
    pub container_page: String,
    pub container_api_pattern: String,
    pub detail_endpoint: String,
    pub detail_page_template: String,
    pub detail_api_pattern: String,
    pub api_token: Option<String>,
    pub token_header: String,
    pub id_param: String,
    pub detail_source: DetailSourceKind,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: "https://csqaq.com".to_string(),
            user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
                         AppleWebKit/537.36 (KHTML, like Gecko) \
                         Chrome/142.0.0.0 Safari/537.36"
                .to_string(),
            item_url_template: "{base}/goods/{id}".to_string(),
            container_page: "/container".to_string(),
            container_api_pattern: "/proxies/api/v1/info/container_data_info".to_string(),
            detail_endpoint: "https://api.csqaq.com/api/v1/info/good/container_detail".to_string(),
            detail_page_template: "{base}/goods/{id}".to_string(),
            detail_api_pattern: "container_detail".to_string(),
            api_token: None,
            token_header: "ApiToken".to_string(),
            id_param: "id".to_string(),
            detail_source: DetailSourceKind::Api,
        }
    }
}

impl SiteConfig {
    /// Expand `{base}` in a template.
    pub fn resolve(&self, template: &str) -> String {
        template.replace("{base}", self.base_url.trim_end_matches('/'))
    }

    pub fn container_page_url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), self.container_page)
    }
}

/// Backing store selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StoreConfig {
    /// PostgREST-compatible endpoint.
    Rest { url: String, key: String },
    /// Local database file.
    Sqlite { path: PathBuf },
}

/// `~/.case-harvest/config.json`.
pub fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(".case-harvest/config.json")
}

impl HarvestConfig {
    /// Defaults, then the JSON file (explicit, or the default one when it exists),
    /// then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default = default_config_path();
                if default.exists() {
                    Self::from_file(&default)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("failed to parse config: {}", path.display()))
    }

    /// Apply `CASE_HARVEST_*` and `SUPABASE_URL`/`SUPABASE_KEY` overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}")).filter(|v| !v.is_empty());

        if let Some(v) = var("DELAY_MS") {
            self.crawler.delay_ms = parse_value("DELAY_MS", &v)?;
        }
        if let Some(v) = var("TIMEOUT_MS") {
            self.crawler.timeout_ms = parse_value("TIMEOUT_MS", &v)?;
        }
        if let Some(v) = var("BROWSER_TIMEOUT_MS") {
            self.crawler.browser_timeout_ms = parse_value("BROWSER_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = var("SETTLE_DELAY_MS") {
            self.crawler.settle_delay_ms = parse_value("SETTLE_DELAY_MS", &v)?;
        }
        if let Some(v) = var("HEADLESS") {
            self.crawler.headless = parse_bool("HEADLESS", &v)?;
        }
        if let Some(v) = var("PROXY") {
            self.crawler.proxy = Some(v);
        }
        if let Some(v) = var("SAVE_TO_FILE") {
            self.crawler.save_to_file = parse_bool("SAVE_TO_FILE", &v)?;
        }
        if let Some(v) = var("SAVE_TO_DB") {
            self.crawler.save_to_db = parse_bool("SAVE_TO_DB", &v)?;
        }
        if let Some(v) = var("OUTPUT_DIR") {
            self.crawler.output_dir = PathBuf::from(v);
        }
        if let Some(v) = var("API_TOKEN") {
            self.site.api_token = Some(v);
        }
        if let Some(v) = var("DETAIL_SOURCE") {
            self.site.detail_source = v.parse()?;
        }
        if let Some(v) = var("SQLITE_PATH") {
            self.store = Some(StoreConfig::Sqlite {
                path: PathBuf::from(v),
            });
        }
        let url = lookup("SUPABASE_URL").filter(|v| !v.is_empty());
        let key = lookup("SUPABASE_KEY").filter(|v| !v.is_empty());
        if let (Some(url), Some(key)) = (url, key) {
            self.store = Some(StoreConfig::Rest { url, key });
        }
        Ok(())
    }

    /// Check that the configuration can run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.crawler.save_to_db && self.store.is_none() {
            return Err(ConfigError::MissingStore);
        }
        self.proxy()?;
        self.transform_options()?;
        if !self.site.detail_page_template.contains("{id}") {
            return Err(ConfigError::InvalidValue {
                key: "detail_page_template".to_string(),
                value: self.site.detail_page_template.clone(),
            });
        }
        Ok(())
    }

    pub fn proxy(&self) -> Result<Option<ProxySettings>, ConfigError> {
        self.crawler
            .proxy
            .as_deref()
            .map(ProxySettings::parse)
            .transpose()
    }

    pub fn launch_options(&self) -> Result<LaunchOptions, ConfigError> {
        Ok(LaunchOptions {
            headless: self.crawler.headless,
            user_agent: Some(self.site.user_agent.clone()),
            proxy: self.proxy()?,
        })
    }

    pub fn transform_options(&self) -> Result<TransformOptions, ConfigError> {
        let mut options = TransformOptions::default()
            .with_item_url_template(&self.site.resolve(&self.site.item_url_template))?;
        if !self.crawler.allowed_rarities.is_empty() {
            let tiers = self
                .crawler
                .allowed_rarities
                .iter()
                .map(|name| name.parse::<RarityTier>())
                .collect::<Result<Vec<_>, _>>()?;
            options = options.with_allowed(tiers);
        }
        Ok(options)
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: format!("{ENV_PREFIX}{key}"),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: format!("{ENV_PREFIX}{key}"),
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = HarvestConfig::default();
        assert_eq!(config.crawler.delay_ms, 1000);
        assert_eq!(config.crawler.browser_timeout_ms, 30000);
        assert!(config.crawler.headless);
        assert_eq!(config.site.token_header, "ApiToken");
        assert_eq!(config.site.id_param, "id");
        assert_eq!(config.site.container_page_url(), "https://csqaq.com/container");
        assert_eq!(
            config.site.resolve(&config.site.detail_page_template),
            "https://csqaq.com/goods/{id}"
        );
    }

    #[test]
    fn test_save_to_db_needs_store() {
        let mut config = HarvestConfig::default();
        assert!(matches!(config.validate(), Err(ConfigError::MissingStore)));
        config.crawler.save_to_db = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = HarvestConfig::default();
        config
            .apply_env(env(&[
                ("CASE_HARVEST_DELAY_MS", "250"),
                ("CASE_HARVEST_HEADLESS", "false"),
                ("CASE_HARVEST_PROXY", "u:p@127.0.0.1:8080"),
                ("CASE_HARVEST_DETAIL_SOURCE", "browser"),
                ("SUPABASE_URL", "https://x.supabase.co"),
                ("SUPABASE_KEY", "secret"),
            ]))
            .unwrap();

        assert_eq!(config.crawler.delay_ms, 250);
        assert!(!config.crawler.headless);
        assert_eq!(config.site.detail_source, DetailSourceKind::Browser);
        assert!(matches!(config.store, Some(StoreConfig::Rest { .. })));

        let launch = config.launch_options().unwrap();
        let proxy = launch.proxy.unwrap();
        assert_eq!(proxy.server, "http://127.0.0.1:8080");
        assert_eq!(proxy.username.as_deref(), Some("u"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bad_env_value() {
        let mut config = HarvestConfig::default();
        let err = config
            .apply_env(env(&[("CASE_HARVEST_HEADLESS", "maybe")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_file_round_trip_with_sqlite_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("harvest.json");
        std::fs::write(
            &path,
            r#"{
                "crawler": {"delay_ms": 10, "save_to_file": false},
                "store": {"kind": "sqlite", "path": "harvest.db"}
            }"#,
        )
        .unwrap();

        let config = HarvestConfig::from_file(&path).unwrap();
        assert_eq!(config.crawler.delay_ms, 10);
        assert_eq!(config.crawler.timeout_ms, 30000);
        assert!(!config.crawler.save_to_file);
        assert_eq!(
            config.store,
            Some(StoreConfig::Sqlite {
                path: PathBuf::from("harvest.db")
            })
        );
    }

    #[test]
    fn test_allowed_rarities() {
        let mut config = HarvestConfig::default();
        config.crawler.allowed_rarities = vec!["covert".into(), "exceptional".into()];
        let options = config.transform_options().unwrap();
        assert!(options.allows(RarityTier::Covert));
        assert!(!options.allows(RarityTier::Restricted));

        config.crawler.allowed_rarities = vec!["legendary".into()];
        assert!(matches!(
            config.transform_options(),
            Err(ConfigError::Catalog(_))
        ));
    }

    #[test]
    fn test_invalid_proxy_rejected() {
        let mut config = HarvestConfig::default();
        config.crawler.save_to_db = false;
        config.crawler.proxy = Some("http://".into());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidProxy { .. })
        ));
    }
}
