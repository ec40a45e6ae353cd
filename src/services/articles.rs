//! Article index client.
//!
//! Finds published relocation articles relevant to a query, scoped to an
//! application id with a bounded result count.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Result, WayfareError};
use crate::services::knowledge::trim_url;

/// An article hit, as rendered into prompts and tool results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleSummary {
    pub title: String,
    #[serde(default)]
    pub excerpt: String,
    #[serde(default)]
    pub country_code: Option<String>,
}

/// Article search, as consumed by the voice pipeline and the chat tools.
#[async_trait]
pub trait ArticleIndex: Send + Sync {
    async fn search(&self, query: &str, limit: u32) -> Result<Vec<ArticleSummary>>;
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    app_id: &'a str,
    limit: u32,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<ArticleSummary>,
}

/// HTTP client for the article index.
pub struct HttpArticleIndex {
    client: reqwest::Client,
    base_url: String,
    app_id: String,
}

impl HttpArticleIndex {
    pub fn new(base_url: impl Into<String>, app_id: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: trim_url(base_url.into()),
            app_id: app_id.into(),
        }
    }
}

#[async_trait]
impl ArticleIndex for HttpArticleIndex {
    async fn search(&self, query: &str, limit: u32) -> Result<Vec<ArticleSummary>> {
        let body = SearchRequest {
            query,
            app_id: &self.app_id,
            limit,
        };
        let response = self
            .client
            .post(format!("{}/articles/search", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| WayfareError::Service(format!("article search failed: {e}")))?;
        if !response.status().is_success() {
            return Err(WayfareError::Service(format!(
                "article search HTTP {}",
                response.status().as_u16()
            )));
        }
        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| WayfareError::Service(format!("article search malformed: {e}")))?;
        Ok(parsed.results)
    }
}
