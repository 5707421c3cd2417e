//! HTTP client for the OpenTSDB query and suggest API

use crate::error::{ExportError, Result};
use crate::model::{SeriesResult, TagFilter, Window};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, error};

/// Aggregator used for every drill query
pub const AGGREGATOR: &str = "sum";

/// Longest body excerpt carried in a protocol error
const BODY_EXCERPT_LEN: usize = 512;

/// Connection settings for [`QueryClient`]
#[derive(Debug, Clone)]
pub struct QueryClientConfig {
    /// Base URL, e.g. `http://localhost:4242`
    pub base_url: String,
    /// Per-request timeout
    pub timeout: Duration,
    /// `max` passed to the suggest endpoint when listing metrics
    pub suggest_max: usize,
}

impl Default for QueryClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:4242".to_string(),
            timeout: Duration::from_secs(30),
            suggest_max: 999_999,
        }
    }
}

impl QueryClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_suggest_max(mut self, max: usize) -> Self {
        self.suggest_max = max;
        self
    }
}

/// Anything that can answer a (metric, window, filter) query
///
/// The drill engine only talks to this trait, so it can run against an
/// in-memory source in tests.
#[async_trait]
pub trait SeriesSource: Send + Sync {
    async fn query(
        &self,
        metric: &str,
        window: Window,
        filter: &TagFilter,
    ) -> Result<Vec<SeriesResult>>;
}

/// HTTP client for an OpenTSDB-compatible server
pub struct QueryClient {
    client: reqwest::Client,
    base_url: String,
    suggest_max: usize,
}

impl QueryClient {
    /// Create a new client from the given settings
    pub fn new(config: QueryClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;

        let mut base_url = config.base_url;
        // Remove trailing slash
        while base_url.ends_with('/') {
            base_url.pop();
        }
        if base_url.is_empty() {
            return Err(ExportError::Config("base URL is empty".to_string()));
        }

        Ok(Self {
            client,
            base_url,
            suggest_max: config.suggest_max,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Every metric name the server knows about
    pub async fn list_metric_names(&self) -> Result<Vec<String>> {
        let url = format!("{}/api/suggest", self.base_url);
        let max = self.suggest_max.to_string();
        self.get_json(&url, &[("type", "metrics"), ("max", max.as_str())])
            .await
    }

    /// Query `metric` over `window`, grouped and filtered by `filter`
    pub async fn query(
        &self,
        metric: &str,
        window: Window,
        filter: &TagFilter,
    ) -> Result<Vec<SeriesResult>> {
        if metric.is_empty() {
            return Err(ExportError::Validation("metric name is empty".to_string()));
        }

        let url = format!("{}/api/query", self.base_url);
        let start = window.start.to_string();
        let end = window.end.to_string();
        let expr = query_expression(metric, filter);

        debug!("Querying {} over {}", expr, window);
        self.get_json(
            &url,
            &[("start", start.as_str()), ("end", end.as_str()), ("m", expr.as_str())],
        )
        .await
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, params: &[(&str, &str)]) -> Result<T> {
        let response = self.client.get(url).query(params).send().await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ExportError::Server {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| {
            error!("Can't decode response body from {}: {}", url, e);
            error!("Body:\n{}", body);
            ExportError::Protocol(format!(
                "unexpected response from {}: {} (body: {})",
                url,
                e,
                excerpt(&body)
            ))
        })
    }
}

#[async_trait]
impl SeriesSource for QueryClient {
    async fn query(
        &self,
        metric: &str,
        window: Window,
        filter: &TagFilter,
    ) -> Result<Vec<SeriesResult>> {
        QueryClient::query(self, metric, window, filter).await
    }
}

/// The `m` parameter: `sum:metric{k=v,...}`
pub fn query_expression(metric: &str, filter: &TagFilter) -> String {
    format!("{}:{}{}", AGGREGATOR, metric, filter)
}

fn excerpt(body: &str) -> &str {
    if body.len() <= BODY_EXCERPT_LEN {
        return body;
    }
    let mut cut = BODY_EXCERPT_LEN;
    while !body.is_char_boundary(cut) {
        cut -= 1;
    }
    &body[..cut]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_expression() {
        assert_eq!(query_expression("sys.cpu", &TagFilter::new()), "sum:sys.cpu{}");

        let filter = TagFilter::new().with_wildcard("host").with_exact("dc", "eu");
        assert_eq!(query_expression("sys.cpu", &filter), "sum:sys.cpu{dc=eu,host=*}");
    }

    #[test]
    fn test_trailing_slash_removed() {
        let client = QueryClient::new(QueryClientConfig::new("http://tsdb:4242//")).unwrap();
        assert_eq!(client.base_url(), "http://tsdb:4242");
    }

    #[test]
    fn test_empty_base_url_rejected() {
        assert!(matches!(
            QueryClient::new(QueryClientConfig::new("/")),
            Err(ExportError::Config(_))
        ));
    }

    #[test]
    fn test_excerpt_respects_char_boundaries() {
        let body = "é".repeat(BODY_EXCERPT_LEN);
        let cut = excerpt(&body);
        assert!(cut.len() <= BODY_EXCERPT_LEN);
        assert!(body.starts_with(cut));
        assert_eq!(excerpt("short"), "short");
    }
}
