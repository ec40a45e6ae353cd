//! The tool-augmented completion loop behind `/chat/genui`.
//!
//! One user-visible streamed answer per call, transparently handling a
//! round of provider-requested tool invocations: stream with tools
//! enabled, execute accumulated calls sequentially, then stream a
//! follow-up answer with tools disabled. Text deltas are forwarded to
//! the client the moment they arrive; tool results are appended to the
//! thread in call order, never reordered.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::StreamExt;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::error::{Result, WayfareError};
use crate::llm::accumulator::{CompletedTurn, TurnAccumulator};
use crate::llm::events::ProviderEvent;
use crate::llm::provider::{ChatProvider, Message, RequestOptions, ToolInvocation, ToolSpec};
use crate::chat::tools::{ToolCatalog, ToolContext};
use crate::thread::ThreadStore;

/// One JSON line on the genui SSE stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum GenUiEvent {
    /// Incremental answer text.
    Content { delta: String },
    /// A tool finished executing.
    Tool {
        name: String,
        result: serde_json::Value,
    },
    /// Turn complete. Carries the thread id so clients can continue a
    /// server-generated thread.
    Done { thread_id: String },
    /// The turn failed; emitted at most once, before Done.
    Error { message: String },
}

/// Inputs for one chat turn.
#[derive(Debug, Clone, Default)]
pub struct TurnRequest {
    pub thread_id: String,
    pub user_message: Option<String>,
    pub context: Option<HashMap<String, String>>,
    pub user_id: Option<String>,
}

/// Drives tool-augmented chat turns over the thread store.
pub struct ChatEngine {
    provider: Arc<dyn ChatProvider>,
    threads: Arc<ThreadStore>,
    catalog: Arc<ToolCatalog>,
    options: RequestOptions,
}

impl ChatEngine {
    pub fn new(
        provider: Arc<dyn ChatProvider>,
        threads: Arc<ThreadStore>,
        catalog: Arc<ToolCatalog>,
        options: RequestOptions,
    ) -> Self {
        Self {
            provider,
            threads,
            catalog,
            options,
        }
    }

    /// Run one turn, emitting [`GenUiEvent`]s as they happen. The stream
    /// always ends with `Done`, on success and on failure alike.
    pub fn handle_turn(self: &Arc<Self>, request: TurnRequest) -> ReceiverStream<GenUiEvent> {
        let (tx, rx) = mpsc::channel(32);
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            let thread_id = request.thread_id.clone();
            if let Err(e) = engine.run_turn(request, &tx).await {
                tracing::warn!(%thread_id, error = %e, "chat turn failed");
                let _ = tx
                    .send(GenUiEvent::Error {
                        message: "Something went wrong generating this answer.".into(),
                    })
                    .await;
            }
            let _ = tx.send(GenUiEvent::Done { thread_id }).await;
        });
        ReceiverStream::new(rx)
    }

    async fn run_turn(&self, request: TurnRequest, tx: &mpsc::Sender<GenUiEvent>) -> Result<()> {
        let thread_id = &request.thread_id;

        if let Some(context) = request.context {
            self.threads.set_context(thread_id, context);
        }
        if let Some(text) = request.user_message {
            self.threads.append(thread_id, Message::user(text));
        }

        let messages = self.threads.build_prompt_messages(thread_id);
        let specs = self.catalog.specs();
        let turn = self.consume_round(&messages, &specs, tx).await?;

        if !turn.wants_tools() {
            self.threads.append(thread_id, Message::assistant(turn.text));
            return Ok(());
        }

        // The assistant message carrying the calls must precede the tool
        // results in the thread, or the provider rejects the follow-up.
        let invocations: Vec<ToolInvocation> = turn
            .calls
            .iter()
            .map(|c| ToolInvocation {
                call_id: c.call_id.clone(),
                name: c.name.clone(),
                arguments: c.arguments.clone(),
            })
            .collect();
        self.threads.append(
            thread_id,
            Message::assistant_with_calls(turn.text.clone(), invocations),
        );

        let ctx = ToolContext {
            thread_id: Some(thread_id.clone()),
            user_id: request.user_id,
        };
        // Sequential, in call order: tools with side effects (preference
        // saving) must land before the personalized follow-up.
        for call in &turn.calls {
            let result = self.catalog.run(&call.name, &call.arguments, &ctx).await;
            self.threads
                .append(thread_id, Message::tool_result(&call.call_id, result.to_string()));
            let _ = tx
                .send(GenUiEvent::Tool {
                    name: call.name.clone(),
                    result,
                })
                .await;
        }

        // Follow-up round with tools disabled. Rebuild the prompt — a
        // tool may have updated the thread context.
        let messages = self.threads.build_prompt_messages(thread_id);
        let followup = self.consume_round(&messages, &[], tx).await?;
        self.threads
            .append(thread_id, Message::assistant(followup.text));
        Ok(())
    }

    /// One provider round: forward text deltas as they arrive, accumulate
    /// everything, and surface a broken stream as an error.
    async fn consume_round(
        &self,
        messages: &[Message],
        specs: &[ToolSpec],
        tx: &mpsc::Sender<GenUiEvent>,
    ) -> Result<CompletedTurn> {
        let mut stream = self.provider.stream(messages, &self.options, specs).await?;
        let mut acc = TurnAccumulator::new();

        while let Some(event) = stream.next().await {
            if let ProviderEvent::Text { delta } = &event {
                let _ = tx
                    .send(GenUiEvent::Content {
                        delta: delta.clone(),
                    })
                    .await;
            }
            let terminal = event.is_terminal();
            acc.push(event);
            if terminal {
                break;
            }
        }

        let turn = acc.finish();
        if let Some(error) = &turn.error {
            return Err(WayfareError::Stream(error.clone()));
        }
        Ok(turn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::events::FinishReason;
    use crate::llm::provider::{ProviderStream, Role};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Scripted provider: each `stream` call pops the next event list.
    struct ScriptedProvider {
        rounds: Mutex<Vec<Vec<ProviderEvent>>>,
        seen_tool_counts: Mutex<Vec<usize>>,
    }

    impl ScriptedProvider {
        fn new(rounds: Vec<Vec<ProviderEvent>>) -> Self {
            Self {
                rounds: Mutex::new(rounds),
                seen_tool_counts: Mutex::new(Vec::new()),
            }
        }

        fn text_round(text: &str) -> Vec<ProviderEvent> {
            vec![
                ProviderEvent::Start {
                    request_id: "req".into(),
                },
                ProviderEvent::Text { delta: text.into() },
                ProviderEvent::Finish {
                    reason: FinishReason::Stop,
                },
            ]
        }

        fn tool_round(call_id: &str, name: &str, args: &str) -> Vec<ProviderEvent> {
            vec![
                ProviderEvent::Start {
                    request_id: "req".into(),
                },
                ProviderEvent::ToolCallBegin {
                    index: 0,
                    id: call_id.into(),
                    name: name.into(),
                },
                ProviderEvent::ToolCallArgs {
                    index: 0,
                    fragment: args.into(),
                },
                ProviderEvent::Finish {
                    reason: FinishReason::ToolCalls,
                },
            ]
        }
    }

    #[async_trait]
    impl ChatProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn stream(
            &self,
            _messages: &[Message],
            _options: &RequestOptions,
            tools: &[ToolSpec],
        ) -> Result<ProviderStream> {
            self.seen_tool_counts
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(tools.len());
            let events = {
                let mut rounds = self.rounds.lock().unwrap_or_else(|e| e.into_inner());
                if rounds.is_empty() {
                    Self::text_round("")
                } else {
                    rounds.remove(0)
                }
            };
            Ok(Box::pin(futures_util::stream::iter(events)))
        }

        async fn complete(&self, _messages: &[Message], _options: &RequestOptions) -> Result<String> {
            Ok(String::new())
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl ChatProvider for FailingProvider {
        fn name(&self) -> &str {
            "failing"
        }
        async fn stream(
            &self,
            _messages: &[Message],
            _options: &RequestOptions,
            _tools: &[ToolSpec],
        ) -> Result<ProviderStream> {
            Err(WayfareError::Provider("connection refused".into()))
        }
        async fn complete(&self, _messages: &[Message], _options: &RequestOptions) -> Result<String> {
            Err(WayfareError::Provider("connection refused".into()))
        }
    }

    fn engine_with(provider: Arc<dyn ChatProvider>) -> (Arc<ChatEngine>, Arc<ThreadStore>) {
        let threads = Arc::new(ThreadStore::default());
        let catalog = Arc::new(crate::chat::tools::ToolCatalog::new());
        let engine = Arc::new(ChatEngine::new(
            provider,
            Arc::clone(&threads),
            catalog,
            RequestOptions::new(),
        ));
        (engine, threads)
    }

    async fn collect(stream: ReceiverStream<GenUiEvent>) -> Vec<GenUiEvent> {
        stream.collect().await
    }

    #[tokio::test]
    async fn text_only_turn_streams_and_persists() {
        let provider = Arc::new(ScriptedProvider::new(vec![ScriptedProvider::text_round(
            "Porto is a great pick.",
        )]));
        let (engine, threads) = engine_with(provider);

        let events = collect(engine.handle_turn(TurnRequest {
            thread_id: "t1".into(),
            user_message: Some("where should I move?".into()),
            ..TurnRequest::default()
        }))
        .await;

        assert!(matches!(&events[0], GenUiEvent::Content { delta } if delta == "Porto is a great pick."));
        assert!(matches!(&events[events.len() - 1], GenUiEvent::Done { thread_id } if thread_id == "t1"));

        let messages = threads.build_prompt_messages("t1");
        assert_eq!(messages.len(), 3); // system + user + assistant
        assert_eq!(messages[2].role, Role::Assistant);
        assert_eq!(messages[2].content, "Porto is a great pick.");
    }

    #[tokio::test]
    async fn done_emitted_exactly_once() {
        let provider = Arc::new(ScriptedProvider::new(vec![ScriptedProvider::text_round("hi")]));
        let (engine, _) = engine_with(provider);
        let events = collect(engine.handle_turn(TurnRequest {
            thread_id: "t1".into(),
            user_message: Some("hi".into()),
            ..TurnRequest::default()
        }))
        .await;
        let dones = events
            .iter()
            .filter(|e| matches!(e, GenUiEvent::Done { .. }))
            .count();
        assert_eq!(dones, 1);
    }

    #[tokio::test]
    async fn unknown_tool_degrades_and_turn_completes() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            ScriptedProvider::tool_round("call_1", "no_such_tool", "{}"),
            ScriptedProvider::text_round("Handled it anyway."),
        ]));
        let (engine, threads) = engine_with(provider);

        let events = collect(engine.handle_turn(TurnRequest {
            thread_id: "t1".into(),
            user_message: Some("do something".into()),
            ..TurnRequest::default()
        }))
        .await;

        let tool_event = events
            .iter()
            .find_map(|e| match e {
                GenUiEvent::Tool { result, .. } => Some(result.clone()),
                _ => None,
            });
        match tool_event {
            Some(result) => assert_eq!(result["error"], "Unknown tool: no_such_tool"),
            None => unreachable!("tool event emitted"),
        }
        assert!(matches!(events.last(), Some(GenUiEvent::Done { .. })));

        // Thread carries assistant-with-calls, tool result, final answer.
        let messages = threads.build_prompt_messages("t1");
        let roles: Vec<Role> = messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::User, Role::Assistant, Role::Tool, Role::Assistant]
        );
        assert_eq!(messages[3].tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(messages[4].content, "Handled it anyway.");
    }

    #[tokio::test]
    async fn follow_up_round_disables_tools() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            ScriptedProvider::tool_round("call_1", "no_such_tool", "{}"),
            ScriptedProvider::text_round("done"),
        ]));
        let (engine, _) = engine_with(Arc::clone(&provider) as Arc<dyn ChatProvider>);

        let _ = collect(engine.handle_turn(TurnRequest {
            thread_id: "t1".into(),
            user_message: Some("go".into()),
            ..TurnRequest::default()
        }))
        .await;

        let counts = provider
            .seen_tool_counts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        // Empty catalog: both rounds advertise zero tools, and the
        // follow-up never re-enables them.
        assert_eq!(counts.len(), 2);
        assert_eq!(counts[1], 0);
    }

    #[tokio::test]
    async fn provider_failure_emits_error_then_done() {
        let (engine, _) = engine_with(Arc::new(FailingProvider));
        let events = collect(engine.handle_turn(TurnRequest {
            thread_id: "t1".into(),
            user_message: Some("hi".into()),
            ..TurnRequest::default()
        }))
        .await;

        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], GenUiEvent::Error { .. }));
        assert!(matches!(&events[1], GenUiEvent::Done { .. }));
    }

    #[tokio::test]
    async fn mid_stream_error_emits_single_error() {
        let provider = Arc::new(ScriptedProvider::new(vec![vec![
            ProviderEvent::Start {
                request_id: "req".into(),
            },
            ProviderEvent::Text {
                delta: "partial".into(),
            },
            ProviderEvent::Error {
                message: "connection reset".into(),
            },
        ]]));
        let (engine, _) = engine_with(provider);
        let events = collect(engine.handle_turn(TurnRequest {
            thread_id: "t1".into(),
            user_message: Some("hi".into()),
            ..TurnRequest::default()
        }))
        .await;

        let errors = events
            .iter()
            .filter(|e| matches!(e, GenUiEvent::Error { .. }))
            .count();
        assert_eq!(errors, 1);
        assert!(matches!(events.last(), Some(GenUiEvent::Done { .. })));
    }

    #[tokio::test]
    async fn context_only_turn_works_without_message() {
        let provider = Arc::new(ScriptedProvider::new(vec![ScriptedProvider::text_round(
            "Noted your preferences.",
        )]));
        let (engine, threads) = engine_with(provider);

        let mut context = HashMap::new();
        context.insert("destination".to_owned(), "Portugal".to_owned());
        let events = collect(engine.handle_turn(TurnRequest {
            thread_id: "t1".into(),
            context: Some(context),
            ..TurnRequest::default()
        }))
        .await;

        assert!(matches!(events.last(), Some(GenUiEvent::Done { .. })));
        let prompt = &threads.build_prompt_messages("t1")[0].content;
        assert!(prompt.contains("Destination: Portugal"));
    }

    #[test]
    fn genui_event_wire_shapes() {
        let content = serde_json::to_value(GenUiEvent::Content { delta: "hi".into() })
            .unwrap_or_default();
        assert_eq!(content["type"], "content");
        assert_eq!(content["delta"], "hi");

        let done = serde_json::to_value(GenUiEvent::Done {
            thread_id: "t1".into(),
        })
        .unwrap_or_default();
        assert_eq!(done["type"], "done");
        assert_eq!(done["thread_id"], "t1");

        let error = serde_json::to_value(GenUiEvent::Error {
            message: "nope".into(),
        })
        .unwrap_or_default();
        assert_eq!(error["type"], "error");
    }
}
