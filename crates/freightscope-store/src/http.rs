//! HTTP client for a remote analytical store.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::Serialize;
use serde_json::Value;

use crate::error::{Result, StoreError};
use crate::query::{AggregateQuery, FieldQuery, ValuesQuery};
use crate::store::AnalyticsStore;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Store reached over HTTP.
///
/// Queries are POSTed as JSON to `{base_url}/v1/aggregate`, `/v1/explore`
/// and `/v1/values`.
#[derive(Clone)]
pub struct HttpStore {
    http: reqwest::Client,
    base_url: String,
}

impl HttpStore {
    pub fn builder() -> HttpStoreBuilder {
        HttpStoreBuilder::default()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Value> {
        let url = self.url(path);
        tracing::debug!(url = %url, "Store request");

        let response = self.http.post(&url).json(body).send().await?;
        let status = response.status();

        if status.is_success() {
            return Ok(response.json::<Value>().await?);
        }

        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<Value>(&text)
            .ok()
            .and_then(|v| {
                v.get("message")
                    .or_else(|| v.get("error"))
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .unwrap_or(text);

        Err(StoreError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl AnalyticsStore for HttpStore {
    async fn aggregate(&self, query: AggregateQuery) -> Result<Value> {
        query.validate()?;
        self.post("aggregate", &query).await
    }

    async fn explore_field(&self, query: FieldQuery) -> Result<Value> {
        self.post("explore", &query).await
    }

    async fn fetch_values(&self, query: ValuesQuery) -> Result<Value> {
        self.post("values", &query).await
    }

    fn name(&self) -> &str {
        "http"
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Builder
// ─────────────────────────────────────────────────────────────────────────────

/// Builder for [`HttpStore`].
#[derive(Debug, Default)]
pub struct HttpStoreBuilder {
    base_url: Option<String>,
    api_key: Option<String>,
    timeout: Option<Duration>,
}

impl HttpStoreBuilder {
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Bearer token sent with every request.
    pub fn api_key(mut self, key: Option<String>) -> Self {
        self.api_key = key;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Result<HttpStore> {
        let base_url = self
            .base_url
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| StoreError::Config("store base_url is required".to_string()))?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = self.api_key {
            let value = HeaderValue::from_str(&format!("Bearer {}", key))
                .map_err(|e| StoreError::Config(format!("invalid store api key: {}", e)))?;
            headers.insert(AUTHORIZATION, value);
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(self.timeout.unwrap_or(DEFAULT_TIMEOUT))
            .build()
            .map_err(|e| StoreError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(HttpStore {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_requires_base_url() {
        assert!(HttpStore::builder().build().is_err());
        assert!(HttpStore::builder().base_url("  ").build().is_err());
    }

    #[test]
    fn test_url_joining() {
        let store = HttpStore::builder()
            .base_url("http://store.local/")
            .api_key(Some("k".into()))
            .build()
            .unwrap();
        assert_eq!(store.base_url(), "http://store.local");
        assert_eq!(store.url("aggregate"), "http://store.local/v1/aggregate");
    }

    #[test]
    fn test_invalid_api_key_rejected() {
        let result = HttpStore::builder()
            .base_url("http://store.local")
            .api_key(Some("bad\nkey".into()))
            .build();
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_invalid_query_rejected_before_request() {
        let store = HttpStore::builder()
            .base_url("http://127.0.0.1:1")
            .build()
            .unwrap();
        let query = AggregateQuery::new("c1", crate::Aggregation::Sum);
        let err = store.aggregate(query).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidQuery(_)));
    }
}
