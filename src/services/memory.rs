//! Long-term memory service client.
//!
//! Stores conversation turns for future personalization and returns a
//! personalized context block for the current query.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Result, WayfareError};
use crate::services::knowledge::trim_url;

/// Long-term memory, as consumed by the voice pipeline.
#[async_trait]
pub trait MemoryService: Send + Sync {
    /// Persist a piece of conversation for later recall.
    async fn store(&self, user_id: &str, text: &str, metadata: serde_json::Value) -> Result<()>;

    /// Personalized context for the current query; empty when the user
    /// has no recallable history.
    async fn personalized_context(&self, user_id: &str, query: &str) -> Result<String>;
}

#[derive(Serialize)]
struct StoreRequest<'a> {
    user_id: &'a str,
    text: &'a str,
    metadata: serde_json::Value,
}

#[derive(Serialize)]
struct ContextRequest<'a> {
    user_id: &'a str,
    query: &'a str,
}

#[derive(Deserialize)]
struct ContextResponse {
    #[serde(default)]
    context: String,
}

/// HTTP client for the memory service.
pub struct HttpMemoryService {
    client: reqwest::Client,
    base_url: String,
}

impl HttpMemoryService {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: trim_url(base_url.into()),
        }
    }
}

#[async_trait]
impl MemoryService for HttpMemoryService {
    async fn store(&self, user_id: &str, text: &str, metadata: serde_json::Value) -> Result<()> {
        let body = StoreRequest {
            user_id,
            text,
            metadata,
        };
        let response = self
            .client
            .post(format!("{}/memories", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| WayfareError::Service(format!("memory store failed: {e}")))?;
        if !response.status().is_success() {
            return Err(WayfareError::Service(format!(
                "memory store HTTP {}",
                response.status().as_u16()
            )));
        }
        Ok(())
    }

    async fn personalized_context(&self, user_id: &str, query: &str) -> Result<String> {
        let body = ContextRequest { user_id, query };
        let response = self
            .client
            .post(format!("{}/memories/context", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| WayfareError::Service(format!("memory context failed: {e}")))?;
        if !response.status().is_success() {
            return Err(WayfareError::Service(format!(
                "memory context HTTP {}",
                response.status().as_u16()
            )));
        }
        let parsed: ContextResponse = response
            .json()
            .await
            .map_err(|e| WayfareError::Service(format!("memory context malformed: {e}")))?;
        Ok(parsed.context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_request_wire_shape() {
        let body = StoreRequest {
            user_id: "u1",
            text: "User: hi\nAssistant: hello",
            metadata: serde_json::json!({"channel": "voice"}),
        };
        let json = serde_json::to_value(&body).unwrap_or_default();
        assert_eq!(json["user_id"], "u1");
        assert_eq!(json["metadata"]["channel"], "voice");
    }

    #[test]
    fn context_response_tolerates_missing_field() {
        let parsed: std::result::Result<ContextResponse, _> = serde_json::from_str("{}");
        match parsed {
            Ok(r) => assert!(r.context.is_empty()),
            Err(_) => unreachable!("empty object parses"),
        }
    }
}
