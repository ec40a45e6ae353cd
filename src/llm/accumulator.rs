//! Folds a provider event stream into one completed turn.
//!
//! Text deltas concatenate in arrival order. Tool-call fragments are
//! gathered per provider-assigned index in an ordered map, so calls
//! finalize in index order with their argument strings reassembled by
//! plain concatenation. Argument JSON is only parsed after the stream
//! is exhausted, never mid-flight.

use std::collections::BTreeMap;

use crate::llm::events::{FinishReason, ProviderEvent};

/// A tool call with fully reassembled arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedCall {
    /// Provider-assigned call id.
    pub call_id: String,
    /// Function name.
    pub name: String,
    /// Reassembled JSON arguments string (may still be malformed —
    /// parsing is the executor's per-call concern).
    pub arguments: String,
}

impl CompletedCall {
    /// Parse the reassembled arguments string.
    pub fn parse_arguments(&self) -> std::result::Result<serde_json::Value, serde_json::Error> {
        serde_json::from_str(&self.arguments)
    }
}

/// Everything one provider round produced.
#[derive(Debug, Clone)]
pub struct CompletedTurn {
    /// Concatenated answer text.
    pub text: String,
    /// Tool calls in index order.
    pub calls: Vec<CompletedCall>,
    /// Why the stream ended.
    pub finish: FinishReason,
    /// Stream error, if the connection broke mid-answer.
    pub error: Option<String>,
}

impl CompletedTurn {
    /// True when the model asked for tools to run.
    pub fn wants_tools(&self) -> bool {
        self.finish == FinishReason::ToolCalls && !self.calls.is_empty()
    }
}

#[derive(Debug, Default)]
struct PendingCall {
    id: String,
    name: String,
    arguments: String,
}

/// Accumulates [`ProviderEvent`]s into a [`CompletedTurn`].
#[derive(Debug, Default)]
pub struct TurnAccumulator {
    text: String,
    calls: BTreeMap<u32, PendingCall>,
    finish: Option<FinishReason>,
    error: Option<String>,
}

impl TurnAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push one event, in stream arrival order.
    pub fn push(&mut self, event: ProviderEvent) {
        match event {
            ProviderEvent::Start { .. } => {}
            ProviderEvent::Text { delta } => self.text.push_str(&delta),
            ProviderEvent::ToolCallBegin { index, id, name } => {
                let call = self.calls.entry(index).or_default();
                if !id.is_empty() {
                    call.id = id;
                }
                if !name.is_empty() {
                    call.name = name;
                }
            }
            ProviderEvent::ToolCallArgs { index, fragment } => {
                self.calls.entry(index).or_default().arguments.push_str(&fragment);
            }
            ProviderEvent::Finish { reason } => self.finish = Some(reason),
            ProviderEvent::Error { message } => self.error = Some(message),
        }
    }

    /// Consume the accumulator; calls come out in index order.
    pub fn finish(self) -> CompletedTurn {
        let calls = self
            .calls
            .into_values()
            .map(|c| CompletedCall {
                call_id: c.id,
                name: c.name,
                arguments: c.arguments,
            })
            .collect();

        CompletedTurn {
            text: self.text,
            calls,
            finish: self.finish.unwrap_or(FinishReason::Other),
            error: self.error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start() -> ProviderEvent {
        ProviderEvent::Start {
            request_id: "req-1".into(),
        }
    }

    #[test]
    fn text_only_turn() {
        let mut acc = TurnAccumulator::new();
        acc.push(start());
        acc.push(ProviderEvent::Text { delta: "Porto ".into() });
        acc.push(ProviderEvent::Text { delta: "is lovely.".into() });
        acc.push(ProviderEvent::Finish {
            reason: FinishReason::Stop,
        });

        let turn = acc.finish();
        assert_eq!(turn.text, "Porto is lovely.");
        assert!(turn.calls.is_empty());
        assert!(!turn.wants_tools());
        assert_eq!(turn.finish, FinishReason::Stop);
        assert!(turn.error.is_none());
    }

    #[test]
    fn fragmented_arguments_reassemble_by_index() {
        let mut acc = TurnAccumulator::new();
        acc.push(start());
        acc.push(ProviderEvent::ToolCallBegin {
            index: 0,
            id: "call_1".into(),
            name: "search_articles".into(),
        });
        acc.push(ProviderEvent::ToolCallArgs {
            index: 0,
            fragment: r#"{"a":"#.into(),
        });
        acc.push(ProviderEvent::ToolCallArgs {
            index: 0,
            fragment: "1}".into(),
        });
        acc.push(ProviderEvent::Finish {
            reason: FinishReason::ToolCalls,
        });

        let turn = acc.finish();
        assert!(turn.wants_tools());
        assert_eq!(turn.calls.len(), 1);
        assert_eq!(turn.calls[0].arguments, r#"{"a":1}"#);
        let parsed = turn.calls[0].parse_arguments();
        match parsed {
            Ok(v) => assert_eq!(v["a"], 1),
            Err(_) => unreachable!("arguments parse"),
        }
    }

    #[test]
    fn calls_finalize_in_index_order_regardless_of_arrival() {
        let mut acc = TurnAccumulator::new();
        acc.push(ProviderEvent::ToolCallBegin {
            index: 1,
            id: "call_b".into(),
            name: "second".into(),
        });
        acc.push(ProviderEvent::ToolCallBegin {
            index: 0,
            id: "call_a".into(),
            name: "first".into(),
        });
        acc.push(ProviderEvent::ToolCallArgs {
            index: 1,
            fragment: "{}".into(),
        });
        acc.push(ProviderEvent::ToolCallArgs {
            index: 0,
            fragment: "{}".into(),
        });
        acc.push(ProviderEvent::Finish {
            reason: FinishReason::ToolCalls,
        });

        let turn = acc.finish();
        assert_eq!(turn.calls.len(), 2);
        assert_eq!(turn.calls[0].call_id, "call_a");
        assert_eq!(turn.calls[1].call_id, "call_b");
    }

    #[test]
    fn interleaved_fragments_stay_separate() {
        let mut acc = TurnAccumulator::new();
        acc.push(ProviderEvent::ToolCallBegin {
            index: 0,
            id: "c0".into(),
            name: "a".into(),
        });
        acc.push(ProviderEvent::ToolCallBegin {
            index: 1,
            id: "c1".into(),
            name: "b".into(),
        });
        acc.push(ProviderEvent::ToolCallArgs {
            index: 0,
            fragment: r#"{"x""#.into(),
        });
        acc.push(ProviderEvent::ToolCallArgs {
            index: 1,
            fragment: r#"{"y""#.into(),
        });
        acc.push(ProviderEvent::ToolCallArgs {
            index: 0,
            fragment: ":1}".into(),
        });
        acc.push(ProviderEvent::ToolCallArgs {
            index: 1,
            fragment: ":2}".into(),
        });
        acc.push(ProviderEvent::Finish {
            reason: FinishReason::ToolCalls,
        });

        let turn = acc.finish();
        assert_eq!(turn.calls[0].arguments, r#"{"x":1}"#);
        assert_eq!(turn.calls[1].arguments, r#"{"y":2}"#);
    }

    #[test]
    fn late_name_fill_in_updates_call() {
        let mut acc = TurnAccumulator::new();
        acc.push(ProviderEvent::ToolCallBegin {
            index: 0,
            id: String::new(),
            name: String::new(),
        });
        acc.push(ProviderEvent::ToolCallBegin {
            index: 0,
            id: "call_late".into(),
            name: "named_later".into(),
        });
        acc.push(ProviderEvent::Finish {
            reason: FinishReason::ToolCalls,
        });

        let turn = acc.finish();
        assert_eq!(turn.calls[0].call_id, "call_late");
        assert_eq!(turn.calls[0].name, "named_later");
    }

    #[test]
    fn stream_error_captured() {
        let mut acc = TurnAccumulator::new();
        acc.push(ProviderEvent::Text {
            delta: "partial".into(),
        });
        acc.push(ProviderEvent::Error {
            message: "connection reset".into(),
        });

        let turn = acc.finish();
        assert_eq!(turn.text, "partial");
        assert_eq!(turn.error.as_deref(), Some("connection reset"));
        assert_eq!(turn.finish, FinishReason::Other);
    }

    #[test]
    fn empty_stream() {
        let turn = TurnAccumulator::new().finish();
        assert!(turn.text.is_empty());
        assert!(turn.calls.is_empty());
        assert_eq!(turn.finish, FinishReason::Other);
    }

    #[test]
    fn malformed_arguments_survive_to_finalize() {
        let mut acc = TurnAccumulator::new();
        acc.push(ProviderEvent::ToolCallBegin {
            index: 0,
            id: "c".into(),
            name: "f".into(),
        });
        acc.push(ProviderEvent::ToolCallArgs {
            index: 0,
            fragment: r#"{"unclosed"#.into(),
        });
        acc.push(ProviderEvent::Finish {
            reason: FinishReason::ToolCalls,
        });

        let turn = acc.finish();
        assert_eq!(turn.calls[0].arguments, r#"{"unclosed"#);
        assert!(turn.calls[0].parse_arguments().is_err());
    }

    #[test]
    fn tool_calls_without_finish_reason_do_not_want_tools() {
        let mut acc = TurnAccumulator::new();
        acc.push(ProviderEvent::ToolCallBegin {
            index: 0,
            id: "c".into(),
            name: "f".into(),
        });
        acc.push(ProviderEvent::Finish {
            reason: FinishReason::Stop,
        });
        let turn = acc.finish();
        assert!(!turn.wants_tools());
    }
}
