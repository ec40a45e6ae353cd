//! OpenAI-compatible completion provider adapter.
//!
//! Speaks the `/v1/chat/completions` wire format (streaming and
//! non-streaming) and normalizes streamed SSE payloads into
//! [`ProviderEvent`]s. Tool-call fragments keep their provider-assigned
//! choice index; reassembly happens downstream in the turn accumulator.

use std::collections::BTreeSet;

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};

use crate::error::{Result, WayfareError};
use crate::llm::events::{FinishReason, ProviderEvent};
use crate::llm::provider::{
    ChatProvider, Message, ProviderStream, RequestOptions, Role, ToolSpec,
};
use crate::llm::sse::SseDecoder;

/// Configuration for the OpenAI-compatible adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    /// API key for bearer authentication.
    pub api_key: String,
    /// Base URL (e.g. `https://api.openai.com`).
    pub base_url: String,
    /// Model id sent with every request.
    pub model: String,
}

impl OpenAiConfig {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: "https://api.openai.com".into(),
            model: model.into(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        let url: String = url.into();
        self.base_url = url.trim_end_matches('/').to_owned();
        self
    }
}

/// OpenAI-compatible provider adapter.
pub struct OpenAiProvider {
    config: OpenAiConfig,
    client: reqwest::Client,
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("model", &self.config.model)
            .field("base_url", &self.config.base_url)
            .finish()
    }
}

impl OpenAiProvider {
    pub fn new(config: OpenAiConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/chat/completions", self.config.base_url)
    }

    async fn post_body(&self, body: &serde_json::Value) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| WayfareError::Provider(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(map_http_error(status, &text));
        }
        Ok(response)
    }
}

/// Build the JSON request body for the chat completions endpoint.
pub fn completion_body(
    model: &str,
    messages: &[Message],
    options: &RequestOptions,
    tools: &[ToolSpec],
    stream: bool,
) -> serde_json::Value {
    let mut body = serde_json::json!({
        "model": model,
        "messages": messages.iter().map(message_to_wire).collect::<Vec<_>>(),
        "stream": stream,
    });

    if let Some(obj) = body.as_object_mut() {
        if let Some(max_tokens) = options.max_tokens {
            obj.insert("max_tokens".into(), serde_json::json!(max_tokens));
        }
        if let Some(temperature) = options.temperature {
            obj.insert("temperature".into(), serde_json::json!(temperature));
        }
        if !tools.is_empty() {
            let tools_json: Vec<serde_json::Value> = tools
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect();
            obj.insert("tools".into(), serde_json::json!(tools_json));
        }
    }

    body
}

/// Convert one message to the wire representation.
fn message_to_wire(msg: &Message) -> serde_json::Value {
    match msg.role {
        Role::Tool => serde_json::json!({
            "role": "tool",
            "tool_call_id": msg.tool_call_id.as_deref().unwrap_or(""),
            "content": msg.content,
        }),
        role => {
            let mut wire = serde_json::json!({
                "role": role.to_string(),
                "content": msg.content,
            });
            if !msg.tool_calls.is_empty()
                && let Some(obj) = wire.as_object_mut()
            {
                let calls: Vec<serde_json::Value> = msg
                    .tool_calls
                    .iter()
                    .map(|tc| {
                        serde_json::json!({
                            "id": tc.call_id,
                            "type": "function",
                            "function": { "name": tc.name, "arguments": tc.arguments },
                        })
                    })
                    .collect();
                obj.insert("tool_calls".into(), serde_json::json!(calls));
            }
            wire
        }
    }
}

/// Map an HTTP error status to a provider error.
fn map_http_error(status: reqwest::StatusCode, body: &str) -> WayfareError {
    let message = extract_error_message(body);
    match status.as_u16() {
        401 | 403 => WayfareError::Provider(format!("authentication failed: {message}")),
        429 => WayfareError::Provider(format!("rate limited: {message}")),
        code => WayfareError::Provider(format!("HTTP {code}: {message}")),
    }
}

/// Pull the human-readable message out of an error response body.
fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(String::from)
        })
        .unwrap_or_else(|| body.to_owned())
}

fn map_finish_reason(reason: &str) -> FinishReason {
    match reason {
        "stop" => FinishReason::Stop,
        "length" => FinishReason::Length,
        "tool_calls" => FinishReason::ToolCalls,
        "content_filter" => FinishReason::ContentFilter,
        _ => FinishReason::Other,
    }
}

/// Tracks which tool-call indexes have been announced, so each index gets
/// exactly one [`ProviderEvent::ToolCallBegin`] before its fragments.
#[derive(Debug, Default)]
pub struct CallTracker {
    announced: BTreeSet<u32>,
}

impl CallTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn track(
        &mut self,
        index: u32,
        id: Option<&str>,
        name: Option<&str>,
        fragment: Option<&str>,
    ) -> Vec<ProviderEvent> {
        let mut events = Vec::new();
        if !self.announced.contains(&index) {
            self.announced.insert(index);
            events.push(ProviderEvent::ToolCallBegin {
                index,
                id: id.unwrap_or("").to_owned(),
                name: name.unwrap_or("").to_owned(),
            });
        }
        if let Some(fragment) = fragment
            && !fragment.is_empty()
        {
            events.push(ProviderEvent::ToolCallArgs {
                index,
                fragment: fragment.to_owned(),
            });
        }
        events
    }
}

/// Parse one streamed SSE data payload into normalized events.
pub fn parse_stream_payload(data: &str, tracker: &mut CallTracker) -> Vec<ProviderEvent> {
    let parsed: serde_json::Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(_) => return Vec::new(),
    };

    let mut events = Vec::new();
    let Some(choices) = parsed.get("choices").and_then(|c| c.as_array()) else {
        return events;
    };

    for choice in choices {
        if let Some(delta) = choice.get("delta") {
            if let Some(content) = delta.get("content").and_then(|c| c.as_str())
                && !content.is_empty()
            {
                events.push(ProviderEvent::Text {
                    delta: content.to_owned(),
                });
            }
            if let Some(calls) = delta.get("tool_calls").and_then(|tc| tc.as_array()) {
                for call in calls {
                    let index = call.get("index").and_then(|i| i.as_u64()).unwrap_or(0) as u32;
                    let id = call.get("id").and_then(|i| i.as_str());
                    let function = call.get("function");
                    let name = function.and_then(|f| f.get("name")).and_then(|n| n.as_str());
                    let fragment = function
                        .and_then(|f| f.get("arguments"))
                        .and_then(|a| a.as_str());
                    events.extend(tracker.track(index, id, name, fragment));
                }
            }
        }
        if let Some(reason) = choice.get("finish_reason").and_then(|f| f.as_str()) {
            events.push(ProviderEvent::Finish {
                reason: map_finish_reason(reason),
            });
        }
    }

    events
}

#[async_trait]
impl ChatProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn stream(
        &self,
        messages: &[Message],
        options: &RequestOptions,
        tools: &[ToolSpec],
    ) -> Result<ProviderStream> {
        let body = completion_body(&self.config.model, messages, options, tools, true);
        let response = self.post_body(&body).await?;

        let request_id = response
            .headers()
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("req")
            .to_owned();

        let mut bytes = response.bytes_stream();
        let stream = async_stream::stream! {
            yield ProviderEvent::Start { request_id };

            let mut decoder = SseDecoder::new();
            let mut tracker = CallTracker::new();

            while let Some(chunk) = bytes.next().await {
                match chunk {
                    Ok(chunk) => {
                        for sse in decoder.feed(&chunk) {
                            if sse.is_done() {
                                continue;
                            }
                            for event in parse_stream_payload(&sse.data, &mut tracker) {
                                yield event;
                            }
                        }
                    }
                    Err(e) => {
                        yield ProviderEvent::Error {
                            message: format!("stream read error: {e}"),
                        };
                        return;
                    }
                }
            }

            if let Some(sse) = decoder.finish() {
                if !sse.is_done() {
                    for event in parse_stream_payload(&sse.data, &mut tracker) {
                        yield event;
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }

    async fn complete(&self, messages: &[Message], options: &RequestOptions) -> Result<String> {
        let body = completion_body(&self.config.model, messages, options, &[], false);
        let response = self.post_body(&body).await?;

        let parsed: serde_json::Value = response
            .json()
            .await
            .map_err(|e| WayfareError::Provider(format!("malformed response: {e}")))?;

        let content = parsed
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|t| t.as_str())
            .unwrap_or("")
            .to_owned();

        Ok(content)
    }
}
