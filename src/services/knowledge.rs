//! Knowledge-graph search client.
//!
//! The graph service answers free-text queries scoped to a fixed graph id
//! with a bounded number of hits, pre-formatted for prompt inclusion.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Result, WayfareError};

/// Knowledge-graph search, as consumed by the voice pipeline.
#[async_trait]
pub trait KnowledgeGraph: Send + Sync {
    /// Search the graph. Returns a prompt-ready block, empty when the
    /// graph has nothing relevant.
    async fn search(&self, query: &str) -> Result<String>;
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    graph_id: &'a str,
    scope: &'a str,
    limit: u32,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    formatted: String,
}

/// HTTP client for the graph service.
pub struct HttpKnowledgeGraph {
    client: reqwest::Client,
    base_url: String,
    graph_id: String,
    limit: u32,
}

impl HttpKnowledgeGraph {
    pub fn new(base_url: impl Into<String>, graph_id: impl Into<String>, limit: u32) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: trim_url(base_url.into()),
            graph_id: graph_id.into(),
            limit,
        }
    }
}

#[async_trait]
impl KnowledgeGraph for HttpKnowledgeGraph {
    async fn search(&self, query: &str) -> Result<String> {
        let body = SearchRequest {
            query,
            graph_id: &self.graph_id,
            scope: "edges",
            limit: self.limit,
        };
        let response = self
            .client
            .post(format!("{}/search", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| WayfareError::Service(format!("graph search failed: {e}")))?;
        if !response.status().is_success() {
            return Err(WayfareError::Service(format!(
                "graph search HTTP {}",
                response.status().as_u16()
            )));
        }
        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| WayfareError::Service(format!("graph search malformed: {e}")))?;
        Ok(parsed.formatted)
    }
}

pub(crate) fn trim_url(url: String) -> String {
    url.trim_end_matches('/').to_owned()
}
