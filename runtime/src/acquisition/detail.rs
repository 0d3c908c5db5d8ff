//! Detail acquisition strategies.
//!
//! A parent's item list comes either from the authenticated detail endpoint or
//! from intercepting the same call on the parent's page. Both end in the same
//! `RawItemRecord` list.

use super::http_client::HttpClient;
use crate::error::{AcquireError, FetchError};
use crate::intercept::Interceptor;
use async_trait::async_trait;
use case_catalog::{extract_records, DetailEnvelope, RawItemRecord};
use tracing::{debug, info};

/// Where detail records for one parent come from.
#[async_trait]
pub trait DetailSource: Send + Sync {
    /// Short name for logs and reports.
    fn label(&self) -> &'static str;

    /// Fetch the raw item records of one parent. `Ok(None)` means the source has no data.
    async fn fetch(&self, parent_id: i64) -> Result<Option<Vec<RawItemRecord>>, AcquireError>;
}

/// Direct call to the detail endpoint: `GET <endpoint>?<id_param>=<id>`.
pub struct ApiDetailSource {
    client: HttpClient,
    endpoint: String,
    id_param: String,
}

impl ApiDetailSource {
    pub fn new(client: HttpClient, endpoint: &str, id_param: &str) -> Self {
        Self {
            client,
            endpoint: endpoint.to_string(),
            id_param: id_param.to_string(),
        }
    }
}

#[async_trait]
impl DetailSource for ApiDetailSource {
    fn label(&self) -> &'static str {
        "api"
    }

    async fn fetch(&self, parent_id: i64) -> Result<Option<Vec<RawItemRecord>>, AcquireError> {
        let body = self
            .client
            .get_json(&self.endpoint, &[(self.id_param.as_str(), parent_id.to_string())])
            .await?;

        let envelope: DetailEnvelope = serde_json::from_value(body).map_err(FetchError::from)?;
        if !envelope.is_success() {
            return Err(FetchError::Envelope {
                code: envelope.code.unwrap_or_default(),
                msg: envelope.msg.unwrap_or_default(),
            }
            .into());
        }

        let records = RawItemRecord::from_values(&envelope.into_records());
        if records.is_empty() {
            info!("no detail data for parent {parent_id}");
            return Ok(None);
        }
        debug!("fetched {} records for parent {parent_id}", records.len());
        Ok(Some(records))
    }
}

/// Load the parent's page in a browser and capture the detail call it makes.
pub struct BrowserDetailSource {
    interceptor: Interceptor,
    page_template: String,
    api_pattern: String,
    timeout_ms: u64,
    settle_delay_ms: u64,
}

impl BrowserDetailSource {
    /// `page_template` contains `{id}`, replaced by the parent id.
    pub fn new(
        interceptor: Interceptor,
        page_template: &str,
        api_pattern: &str,
        timeout_ms: u64,
        settle_delay_ms: u64,
    ) -> Self {
        Self {
            interceptor,
            page_template: page_template.to_string(),
            api_pattern: api_pattern.to_string(),
            timeout_ms,
            settle_delay_ms,
        }
    }

    pub fn page_url(&self, parent_id: i64) -> String {
        self.page_template.replace("{id}", &parent_id.to_string())
    }
}

#[async_trait]
impl DetailSource for BrowserDetailSource {
    fn label(&self) -> &'static str {
        "browser"
    }

    async fn fetch(&self, parent_id: i64) -> Result<Option<Vec<RawItemRecord>>, AcquireError> {
        let body = self
            .interceptor
            .intercept(
                &self.page_url(parent_id),
                &self.api_pattern,
                self.timeout_ms,
                self.settle_delay_ms,
            )
            .await?;

        let records = RawItemRecord::from_values(&extract_records(body));
        if records.is_empty() {
            info!("captured detail for parent {parent_id} holds no records");
            return Ok(None);
        }
        Ok(Some(records))
    }
}
