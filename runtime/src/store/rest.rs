//! PostgREST-compatible store (Supabase and friends) over reqwest.

use super::{validate_batch, validate_identifier, Filter, Row, Store};
use crate::error::StoreError;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

const UPSERT_PREFER: &str = "resolution=merge-duplicates,return=representation";

/// Store reached through a PostgREST endpoint at `<url>/rest/v1`.
#[derive(Clone)]
pub struct RestStore {
    client: reqwest::Client,
    base_url: String,
    key: String,
}

impl RestStore {
    pub fn new(url: &str, key: &str, timeout_ms: u64) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()?;
        Ok(Self {
            client,
            base_url: url.trim_end_matches('/').to_string(),
            key: key.to_string(),
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.base_url)
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header("apikey", self.key.as_str())
            .bearer_auth(&self.key)
    }

    async fn read_rows(resp: reqwest::Response) -> Result<Vec<Row>, StoreError> {
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(StoreError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        if body.trim().is_empty() {
            return Ok(Vec::new());
        }
        let value: Value =
            serde_json::from_str(&body).map_err(|e| StoreError::Decode(e.to_string()))?;
        match value {
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::Object(row) => Ok(row),
                    other => Err(StoreError::Decode(format!("expected row object, got {other}"))),
                })
                .collect(),
            Value::Object(row) => Ok(vec![row]),
            other => Err(StoreError::Decode(format!("expected row array, got {other}"))),
        }
    }
}

/// PostgREST operator form of a filter value.
fn filter_param(filter: &Filter) -> (String, String) {
    match filter {
        Filter::Eq(column, value) => {
            let v = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (column.clone(), format!("eq.{v}"))
        }
        Filter::Contains(column, needle) => (column.clone(), format!("ilike.*{needle}*")),
    }
}

#[async_trait]
impl Store for RestStore {
    fn kind(&self) -> &'static str {
        "rest"
    }

    async fn upsert_batch(
        &self,
        table: &str,
        rows: &[Row],
        conflict_columns: &[&str],
    ) -> Result<Vec<Row>, StoreError> {
        validate_batch(table, rows, conflict_columns)?;
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        debug!("upserting {} rows into {table}", rows.len());
        let resp = self
            .authorized(self.client.post(self.table_url(table)))
            .query(&[("on_conflict", conflict_columns.join(","))])
            .header("Prefer", UPSERT_PREFER)
            .json(rows)
            .send()
            .await?;
        Self::read_rows(resp).await
    }

    async fn query(
        &self,
        table: &str,
        filters: &[Filter],
        limit: Option<usize>,
    ) -> Result<Vec<Row>, StoreError> {
        validate_identifier(table)?;
        let mut params = vec![("select".to_string(), "*".to_string())];
        for filter in filters {
            validate_identifier(filter.column())?;
            params.push(filter_param(filter));
        }
        if let Some(limit) = limit {
            params.push(("limit".to_string(), limit.to_string()));
        }

        let resp = self
            .authorized(self.client.get(self.table_url(table)))
            .query(&params)
            .send()
            .await?;
        Self::read_rows(resp).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_filter_params() {
        assert_eq!(
            filter_param(&Filter::eq("qaq_id", 42)),
            ("qaq_id".to_string(), "eq.42".to_string())
        );
        assert_eq!(
            filter_param(&Filter::eq("name", json!("Chroma"))),
            ("name".to_string(), "eq.Chroma".to_string())
        );
        assert_eq!(
            filter_param(&Filter::contains("name", "武器箱")),
            ("name".to_string(), "ilike.*武器箱*".to_string())
        );
    }

    #[test]
    fn test_table_url_trims_slash() {
        let store = RestStore::new("https://db.example.co/", "k", 1000).unwrap();
        assert_eq!(store.table_url("boxes"), "https://db.example.co/rest/v1/boxes");
        assert_eq!(store.kind(), "rest");
    }
}
