//! Completion provider integration.
//!
//! Normalized event model, conversation message types, the
//! [`ChatProvider`] trait, the OpenAI-compatible adapter, and the
//! stream-side building blocks (SSE decoding, turn accumulation).

pub mod accumulator;
pub mod events;
pub mod openai;
pub mod provider;
pub mod sse;

pub use accumulator::{CompletedCall, CompletedTurn, TurnAccumulator};
pub use events::{FinishReason, ProviderEvent};
pub use openai::{OpenAiConfig, OpenAiProvider};
pub use provider::{
    ChatProvider, Message, ProviderStream, RequestOptions, Role, ToolInvocation, ToolSpec,
};
pub use sse::{ServerEvent, SseDecoder};
