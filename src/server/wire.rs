//! Wire types for the HTTP endpoints.
//!
//! The voice endpoint speaks the OpenAI chat-completions chunk format so
//! third-party voice platforms can consume it unchanged; the genui
//! endpoint streams typed JSON lines. Both terminate with a literal
//! `[DONE]` data line.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::voice::IncomingMessage;

/// Request body for `POST /chat/genui`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenUiRequest {
    /// Conversation thread to continue; generated when absent.
    #[serde(default)]
    pub thread_id: Option<String>,
    /// The user's message, if any.
    #[serde(default)]
    pub message: Option<String>,
    /// Replacement context map, if any.
    #[serde(default)]
    pub context: Option<HashMap<String, String>>,
    /// Authenticated user id, if any.
    #[serde(default)]
    pub user_id: Option<String>,
}

/// Request body for `POST /voice/chat/completions` — the
/// OpenAI-compatible shape the voice platform sends.
#[derive(Debug, Clone, Deserialize)]
pub struct VoiceChatRequest {
    pub messages: Vec<IncomingMessage>,
    /// User identifier, when the platform knows it.
    #[serde(default)]
    pub user: Option<String>,
}

/// Query parameters on the voice endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VoiceQuery {
    /// Session identifier from the voice platform.
    #[serde(default)]
    pub session: Option<String>,
}

/// OpenAI-compatible streaming chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionChunk {
    /// Completion id, identical across all chunks of one answer.
    pub id: String,
    /// Always `"chat.completion.chunk"`.
    pub object: String,
    /// Unix timestamp of the completion.
    pub created: u64,
    /// Model name reported to the platform.
    pub model: String,
    pub choices: Vec<ChunkChoice>,
}

/// A single choice within a streaming chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkChoice {
    pub index: u32,
    pub delta: Delta,
    pub finish_reason: Option<String>,
}

/// Incremental content delta.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delta {
    /// Present only in the first chunk.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl ChatCompletionChunk {
    fn new(id: &str, created: u64, model: &str, delta: Delta, finish_reason: Option<String>) -> Self {
        Self {
            id: id.to_owned(),
            object: "chat.completion.chunk".to_owned(),
            created,
            model: model.to_owned(),
            choices: vec![ChunkChoice {
                index: 0,
                delta,
                finish_reason,
            }],
        }
    }

    /// The opening chunk carrying the assistant role.
    pub fn role_chunk(id: &str, created: u64, model: &str) -> Self {
        Self::new(
            id,
            created,
            model,
            Delta {
                role: Some("assistant".to_owned()),
                content: None,
            },
            None,
        )
    }

    /// A content chunk.
    pub fn content_chunk(id: &str, created: u64, model: &str, content: String) -> Self {
        Self::new(
            id,
            created,
            model,
            Delta {
                role: None,
                content: Some(content),
            },
            None,
        )
    }

    /// The closing chunk carrying the finish reason.
    pub fn final_chunk(id: &str, created: u64, model: &str) -> Self {
        Self::new(
            id,
            created,
            model,
            Delta {
                role: None,
                content: None,
            },
            Some("stop".to_owned()),
        )
    }
}

/// Generate a unique completion id.
pub fn completion_id() -> String {
    format!("chatcmpl-{}", Uuid::new_v4())
}

/// Current Unix timestamp in seconds.
pub fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genui_request_accepts_camel_case() {
        let parsed: Result<GenUiRequest, _> = serde_json::from_str(
            r#"{"threadId":"t1","message":"hi","context":{"destination":"Portugal"}}"#,
        );
        match parsed {
            Ok(r) => {
                assert_eq!(r.thread_id.as_deref(), Some("t1"));
                assert_eq!(r.message.as_deref(), Some("hi"));
                assert!(r.context.is_some_and(|c| c.contains_key("destination")));
            }
            Err(_) => unreachable!("request parses"),
        }
    }

    #[test]
    fn genui_request_all_fields_optional() {
        let parsed: Result<GenUiRequest, _> = serde_json::from_str("{}");
        assert!(parsed.is_ok());
    }

    #[test]
    fn voice_request_openai_shape() {
        let parsed: Result<VoiceChatRequest, _> = serde_json::from_str(
            r#"{"messages":[{"role":"user","content":"hello"}],"user":"u1"}"#,
        );
        match parsed {
            Ok(r) => {
                assert_eq!(r.messages.len(), 1);
                assert_eq!(r.user.as_deref(), Some("u1"));
            }
            Err(_) => unreachable!("request parses"),
        }
    }

    #[test]
    fn role_chunk_carries_role_only() {
        let chunk = ChatCompletionChunk::role_chunk("chatcmpl-1", 1_700_000_000, "wayfare-voice");
        assert_eq!(chunk.object, "chat.completion.chunk");
        assert_eq!(chunk.choices[0].delta.role.as_deref(), Some("assistant"));
        assert!(chunk.choices[0].delta.content.is_none());
        assert!(chunk.choices[0].finish_reason.is_none());
    }

    #[test]
    fn content_chunk_serializes_without_role() {
        let chunk = ChatCompletionChunk::content_chunk("c", 0, "m", "word ".into());
        let json = serde_json::to_string(&chunk).unwrap_or_default();
        assert!(!json.contains("\"role\""));
        assert!(json.contains("word "));
    }

    #[test]
    fn final_chunk_has_finish_reason() {
        let chunk = ChatCompletionChunk::final_chunk("c", 0, "m");
        assert_eq!(chunk.choices[0].finish_reason.as_deref(), Some("stop"));
        assert!(chunk.choices[0].delta.content.is_none());
    }

    #[test]
    fn completion_id_prefixed() {
        let id = completion_id();
        assert!(id.starts_with("chatcmpl-"));
        assert!(id.len() > "chatcmpl-".len());
    }
}
