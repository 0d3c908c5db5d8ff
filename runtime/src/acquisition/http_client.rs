//! Async JSON client wrapping reqwest.
//!
//! Handles the API token header, timeouts, retry on transport errors and 5xx,
//! and backoff on 429.

use crate::error::FetchError;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

const MAX_RETRIES: u32 = 2;

/// How requests authenticate against the upstream API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiAuth {
    None,
    /// A static token sent in a named header.
    Header { name: String, value: String },
}

/// HTTP client for the detail endpoint.
#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    auth: ApiAuth,
    retry_base: Duration,
}

impl HttpClient {
    /// Create a client with JSON-oriented default headers.
    pub fn new(user_agent: &str, timeout_ms: u64, auth: ApiAuth) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_static("zh-CN,zh;q=0.9,en;q=0.8"),
        );

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent(user_agent)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            auth,
            retry_base: Duration::from_millis(500),
        })
    }

    /// Override the first retry delay (doubles on each retry).
    pub fn with_retry_base(mut self, base: Duration) -> Self {
        self.retry_base = base;
        self
    }

    /// GET `url` with `query` and decode the body as JSON.
    pub async fn get_json(&self, url: &str, query: &[(&str, String)]) -> Result<Value, FetchError> {
        let mut retries = 0u32;

        loop {
            let mut request = self.client.get(url).query(query);
            if let ApiAuth::Header { name, value } = &self.auth {
                request = request.header(name.as_str(), value.as_str());
            }

            match request.send().await {
                Ok(r) => {
                    let status = r.status().as_u16();

                    // Retry on 5xx
                    if status >= 500 && retries < MAX_RETRIES {
                        retries += 1;
                        warn!("{url} returned {status}, retry {retries}/{MAX_RETRIES}");
                        tokio::time::sleep(self.backoff(retries)).await;
                        continue;
                    }

                    // Backoff on 429
                    if status == 429 && retries < MAX_RETRIES {
                        retries += 1;
                        let retry_after = r
                            .headers()
                            .get("retry-after")
                            .and_then(|v| v.to_str().ok())
                            .and_then(|s| s.parse::<u64>().ok())
                            .unwrap_or(2);
                        warn!("{url} rate limited, waiting {retry_after}s");
                        tokio::time::sleep(Duration::from_secs(retry_after.min(10))).await;
                        continue;
                    }

                    if !r.status().is_success() {
                        return Err(FetchError::Status(status));
                    }

                    let body = r.text().await?;
                    debug!("{url} returned {} bytes", body.len());
                    return Ok(serde_json::from_str(&body)?);
                }
                Err(e) => {
                    if retries < MAX_RETRIES {
                        retries += 1;
                        warn!("request to {url} failed ({e}), retry {retries}/{MAX_RETRIES}");
                        tokio::time::sleep(self.backoff(retries)).await;
                        continue;
                    }
                    return Err(e.into());
                }
            }
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.retry_base * 2u32.pow(attempt - 1)
    }
}
