//! Normalized streaming event model for completion providers.
//!
//! Every provider adapter converts its wire format into a sequence of
//! [`ProviderEvent`]s, so the rest of the service never sees
//! provider-specific SSE payloads. Tool-call fragments are keyed by the
//! provider-assigned choice index, since a single call's JSON arguments
//! may arrive split across many chunks.

use serde::{Deserialize, Serialize};

/// Why the provider stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Natural end of the answer.
    Stop,
    /// Token limit reached.
    Length,
    /// The model requested tool invocations.
    ToolCalls,
    /// Content was filtered by the provider.
    ContentFilter,
    /// Anything else (unknown wire value, truncated stream).
    Other,
}

/// A single normalized event from a streaming completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    /// Stream opened; carries the provider-assigned request id.
    Start {
        request_id: String,
    },
    /// Incremental answer text.
    Text {
        delta: String,
    },
    /// First fragment of a tool call at `index`. `id` and `name` may be
    /// empty on some providers until a later fragment fills them in.
    ToolCallBegin {
        index: u32,
        id: String,
        name: String,
    },
    /// A fragment of the JSON arguments string for the call at `index`.
    ToolCallArgs {
        index: u32,
        fragment: String,
    },
    /// The provider finished generating.
    Finish {
        reason: FinishReason,
    },
    /// The stream broke mid-flight.
    Error {
        message: String,
    },
}

impl ProviderEvent {
    /// True for events that terminate the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finish { .. } | Self::Error { .. })
    }
}
