//! Paged GET against a FHIR search endpoint.

use crate::config::toml_config::{Secret, SourceConfig};
use crate::domain::model::ResourceKind;
use crate::utils::error::Result;
use reqwest::header::ACCEPT;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

const ERROR_BODY_PREVIEW: usize = 2000;

/// Why paging ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum StopReason {
    /// Last bundle had no `next` link: the result is complete.
    NoNextLink,
    HttpStatus(u16),
    Transport(String),
    InvalidBody(String),
    PageLimit,
}

impl StopReason {
    pub fn is_complete(&self) -> bool {
        matches!(self, StopReason::NoNextLink)
    }
}

#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub bundles: Vec<Value>,
    pub stop: StopReason,
}

/// 依 Bundle 的 `next` 連結逐頁抓取，無重試
pub struct BundleFetcher {
    client: Client,
    endpoint: String,
    token: Secret,
    page_size: usize,
    max_pages: usize,
    delay: Duration,
    headers: HashMap<String, String>,
}

impl BundleFetcher {
    pub fn new(source: &SourceConfig, token: Secret, kind: ResourceKind) -> Result<Self> {
        Self::with_endpoint(source, token, kind.endpoint(&source.base_url))
    }

    pub fn with_endpoint(source: &SourceConfig, token: Secret, endpoint: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(source.timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            endpoint,
            token,
            page_size: source.page_size,
            max_pages: source.max_pages,
            delay: Duration::from_millis(source.request_delay_ms),
            headers: source.headers.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Follows `next` links until there is none, a request fails, or
    /// `max_pages` bundles were collected. Only the first request carries
    /// `_count`; later URLs are used exactly as the server sent them.
    pub async fn fetch_pages(&self) -> FetchOutcome {
        let mut bundles: Vec<Value> = Vec::new();
        let mut url = self.endpoint.clone();

        let stop = loop {
            if bundles.len() >= self.max_pages {
                tracing::warn!("⚠️ Reached page limit ({}), stopping", self.max_pages);
                break StopReason::PageLimit;
            }
            if !bundles.is_empty() {
                tokio::time::sleep(self.delay).await;
            }

            let page = bundles.len() + 1;
            tracing::info!("📡 Fetching page {}: {}", page, url);

            let mut request = self
                .client
                .get(&url)
                .header(ACCEPT, "application/json")
                .bearer_auth(self.token.expose());
            for (key, value) in &self.headers {
                request = request.header(key, value);
            }
            if bundles.is_empty() {
                request = request.query(&[("_count", self.page_size)]);
            }

            let response = match request.send().await {
                Ok(response) => response,
                Err(e) => {
                    tracing::error!("❌ Request for page {} failed: {}", page, e);
                    break StopReason::Transport(e.to_string());
                }
            };

            let status = response.status();
            tracing::debug!("API response status: {}", status);
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                let preview: String = body.chars().take(ERROR_BODY_PREVIEW).collect();
                tracing::error!("❌ Page {} returned {}: {}", page, status, preview);
                break StopReason::HttpStatus(status.as_u16());
            }

            let bundle: Value = match response.json().await {
                Ok(bundle) => bundle,
                Err(e) => {
                    tracing::error!("❌ Page {} is not valid JSON: {}", page, e);
                    break StopReason::InvalidBody(e.to_string());
                }
            };

            if bundles.is_empty() {
                if let Some(total) = bundle.get("total") {
                    tracing::info!("Server reports total = {}", total);
                }
            }

            let next = next_link(&bundle);
            bundles.push(bundle);
            match next {
                Some(next) => url = next,
                None => break StopReason::NoNextLink,
            }
        };

        tracing::info!("📥 Fetched {} page(s) from {} ({:?})", bundles.len(), self.endpoint, stop);
        FetchOutcome { bundles, stop }
    }

    /// Bundles only; a short result means paging stopped early.
    pub async fn fetch_all_pages(&self) -> Vec<Value> {
        self.fetch_pages().await.bundles
    }
}

/// URL of the `link` entry with `relation == "next"`.
pub fn next_link(bundle: &Value) -> Option<String> {
    bundle
        .get("link")?
        .as_array()?
        .iter()
        .find(|link| link.get("relation").and_then(Value::as_str) == Some("next"))
        .and_then(|link| link.get("url"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Resources of every bundle entry, in bundle then entry order.
pub fn extract_resources(bundles: &[Value]) -> Vec<Value> {
    bundles
        .iter()
        .filter_map(|bundle| bundle.get("entry").and_then(Value::as_array))
        .flatten()
        .filter_map(|entry| entry.get("resource"))
        .filter(|resource| !resource.is_null())
        .cloned()
        .collect()
}
