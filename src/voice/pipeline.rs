//! The voice turn pipeline.
//!
//! One spoken-style answer per inbound utterance: resolve the user,
//! gather four context sources concurrently (each independently
//! fault-tolerant), optionally emit a filler phrase for complex
//! questions, generate the full answer, then re-chunk it into words and
//! emit them with fixed pacing. Durable learning (memory, transcript,
//! facts) happens after the answer, detached from the stream.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use super::context::{
    IncomingMessage, VoiceContext, is_complex_utterance, last_user_utterance, pick_filler_phrase,
    render_voice_prompt,
};
use super::facts::{FactExtractor, process_turn_facts};
use crate::llm::provider::{ChatProvider, Message, RequestOptions};
use crate::profile::ProfileStore;
use crate::services::{ArticleIndex, KnowledgeGraph, MemoryService};

/// Sentinel user id for unauthenticated callers.
pub const ANONYMOUS_USER: &str = "anonymous";

/// Delay between emitted words. Natural speech pacing for the voice UI,
/// independent of how the model itself streamed.
pub const DEFAULT_WORD_DELAY: Duration = Duration::from_millis(60);

/// How many articles the context fetch pulls.
const ARTICLE_LIMIT: u32 = 3;

/// Spoken when answer generation itself fails.
const APOLOGY: &str =
    "I'm sorry, I'm having trouble answering right now. Could you ask me again in a moment?";

/// Drives voice turns end to end.
pub struct VoicePipeline {
    provider: Arc<dyn ChatProvider>,
    store: Arc<ProfileStore>,
    graph: Arc<dyn KnowledgeGraph>,
    memory: Arc<dyn MemoryService>,
    articles: Arc<dyn ArticleIndex>,
    extractor: Arc<dyn FactExtractor>,
    word_delay: Duration,
    options: RequestOptions,
}

impl VoicePipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        provider: Arc<dyn ChatProvider>,
        store: Arc<ProfileStore>,
        graph: Arc<dyn KnowledgeGraph>,
        memory: Arc<dyn MemoryService>,
        articles: Arc<dyn ArticleIndex>,
        extractor: Arc<dyn FactExtractor>,
        word_delay: Duration,
        options: RequestOptions,
    ) -> Self {
        Self {
            provider,
            store,
            graph,
            memory,
            articles,
            extractor,
            word_delay,
            options,
        }
    }

    /// Run one turn. The stream yields text chunks (filler phrase, then
    /// paced words); it simply closes when the turn is over. A turn with
    /// no extractable utterance yields an empty, well-formed stream.
    pub fn handle_turn(
        self: &Arc<Self>,
        user_id: String,
        history: Vec<IncomingMessage>,
    ) -> ReceiverStream<String> {
        let (tx, rx) = mpsc::channel(64);
        let pipeline = Arc::clone(self);
        tokio::spawn(async move {
            pipeline.run_turn(&user_id, &history, tx).await;
        });
        ReceiverStream::new(rx)
    }

    async fn run_turn(
        &self,
        user_id: &str,
        history: &[IncomingMessage],
        tx: mpsc::Sender<String>,
    ) {
        let Some(utterance) = last_user_utterance(history) else {
            tracing::warn!(user_id, "voice turn without a user utterance");
            return;
        };

        let known_user = user_id != ANONYMOUS_USER && !user_id.is_empty();
        let context = self.gather_context(user_id, known_user, &utterance).await;

        // Mask generation latency on questions that take a while —
        // silence reads as a hang in a voice UI.
        if is_complex_utterance(&utterance) {
            let _ = tx.send(format!("{} ", pick_filler_phrase())).await;
        }

        let messages = vec![
            Message::system(render_voice_prompt(&context)),
            Message::user(utterance.clone()),
        ];
        let answer = match self.provider.complete(&messages, &self.options).await {
            Ok(answer) => answer,
            Err(e) => {
                tracing::error!(user_id, error = %e, "voice answer generation failed");
                let _ = tx.send(APOLOGY.to_owned()).await;
                return;
            }
        };

        // Re-chunk into whitespace-delimited words with fixed pacing.
        for word in answer.split_whitespace() {
            if tx.send(format!("{word} ")).await.is_err() {
                // Client went away; stop pacing but still learn from the turn.
                break;
            }
            tokio::time::sleep(self.word_delay).await;
        }

        if known_user {
            self.spawn_background(user_id.to_owned(), utterance, answer);
        }
    }

    /// Concurrently fetch the four context sources. Each failure is
    /// logged and degrades to an absent source — partial context is
    /// strictly better than no answer.
    async fn gather_context(&self, user_id: &str, known_user: bool, utterance: &str) -> VoiceContext {
        let profile = if known_user {
            match self.store.resolve_user(user_id, None) {
                Ok(user) => Some(user),
                Err(e) => {
                    tracing::warn!(user_id, error = %e, "user resolve failed");
                    None
                }
            }
        } else {
            None
        };

        let facts_fut = async {
            if !known_user {
                return Vec::new();
            }
            match self.store.active_facts(user_id) {
                Ok(facts) => facts,
                Err(e) => {
                    tracing::warn!(user_id, error = %e, "facts fetch failed");
                    Vec::new()
                }
            }
        };
        let knowledge_fut = async {
            match self.graph.search(utterance).await {
                Ok(formatted) => formatted,
                Err(e) => {
                    tracing::warn!(error = %e, "knowledge graph fetch failed");
                    String::new()
                }
            }
        };
        let memory_fut = async {
            if !known_user {
                return String::new();
            }
            match self.memory.personalized_context(user_id, utterance).await {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(user_id, error = %e, "memory fetch failed");
                    String::new()
                }
            }
        };
        let articles_fut = async {
            match self.articles.search(utterance, ARTICLE_LIMIT).await {
                Ok(articles) => articles,
                Err(e) => {
                    tracing::warn!(error = %e, "article fetch failed");
                    Vec::new()
                }
            }
        };

        let (facts, knowledge, memory, articles) =
            tokio::join!(facts_fut, knowledge_fut, memory_fut, articles_fut);

        VoiceContext {
            profile,
            facts,
            knowledge,
            memory,
            articles,
        }
    }

    /// Detached post-answer work: long-term memory, transcript, facts.
    /// Best-effort loss on shutdown is accepted.
    fn spawn_background(&self, user_id: String, utterance: String, answer: String) {
        let store = Arc::clone(&self.store);
        let memory = Arc::clone(&self.memory);
        let extractor = Arc::clone(&self.extractor);
        tokio::spawn(async move {
            let turn_text = format!("User: {utterance}\nAssistant: {answer}");
            if let Err(e) = memory
                .store(&user_id, &turn_text, serde_json::json!({ "kind": "voice_turn" }))
                .await
            {
                tracing::warn!(%user_id, error = %e, "turn memory store failed");
            }

            if let Err(e) = store.append_transcript(&user_id, "user", &utterance) {
                tracing::warn!(%user_id, error = %e, "transcript write failed");
            }
            if let Err(e) = store.append_transcript(&user_id, "assistant", &answer) {
                tracing::warn!(%user_id, error = %e, "transcript write failed");
            }

            process_turn_facts(&store, memory.as_ref(), extractor.as_ref(), &user_id, &utterance, &answer)
                .await;
        });
    }
}
