//! Tool catalog for the generative-UI chat loop.
//!
//! Tools are pure functions of (name, parsed arguments, call context) to
//! a JSON result. They degrade internally: an unknown name, malformed
//! arguments, or a failed collaborator all produce a structured
//! `{"error": …}` payload rather than aborting the turn. Mutating tools
//! acknowledge immediately; persistence failures are logged only.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::llm::provider::ToolSpec;
use crate::profile::{FactCandidate, FactKind, ProfileStore, route_candidates};
use crate::services::{ArticleIndex, KnowledgeGraph};
use crate::thread::ThreadStore;

/// Who and where a tool call is running for.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    /// The conversation thread, when invoked from the chat loop.
    pub thread_id: Option<String>,
    /// The authenticated user, when known.
    pub user_id: Option<String>,
}

/// A server-side tool the model can invoke.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON Schema for the arguments object.
    fn parameters(&self) -> serde_json::Value;
    /// Execute with parsed arguments. Must not fail the turn — errors
    /// come back as `{"error": …}` payloads.
    async fn run(&self, args: serde_json::Value, ctx: &ToolContext) -> serde_json::Value;
}

/// Registry of available tools.
#[derive(Default)]
pub struct ToolCatalog {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_owned(), tool);
    }

    /// Tool specs for the provider request, sorted by name.
    pub fn specs(&self) -> Vec<ToolSpec> {
        let mut specs: Vec<ToolSpec> = self
            .tools
            .values()
            .map(|t| ToolSpec::new(t.name(), t.description(), t.parameters()))
            .collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Execute one call. `raw_args` is the reassembled arguments string;
    /// parsing happens here so one bad call cannot abort its siblings.
    pub async fn run(&self, name: &str, raw_args: &str, ctx: &ToolContext) -> serde_json::Value {
        let Some(tool) = self.tools.get(name) else {
            return serde_json::json!({ "error": format!("Unknown tool: {name}") });
        };
        let args: serde_json::Value = if raw_args.trim().is_empty() {
            serde_json::json!({})
        } else {
            match serde_json::from_str(raw_args) {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(tool = name, error = %e, "malformed tool arguments");
                    return serde_json::json!({ "error": format!("invalid arguments: {e}") });
                }
            }
        };
        tool.run(args, ctx).await
    }
}

// ── save_preferences ─────────────────────────────────────────

/// Persists user-declared preferences: merges recognized keys into the
/// thread context (so the follow-up round sees them) and routes them
/// into the fact store when a user is known.
pub struct SavePreferencesTool {
    threads: Arc<ThreadStore>,
    store: Arc<ProfileStore>,
}

impl SavePreferencesTool {
    pub fn new(threads: Arc<ThreadStore>, store: Arc<ProfileStore>) -> Self {
        Self { threads, store }
    }
}

#[async_trait]
impl Tool for SavePreferencesTool {
    fn name(&self) -> &str {
        "save_preferences"
    }

    fn description(&self) -> &str {
        "Save relocation preferences the user has stated (destination, budget, timeline, \
         nationality, family_size, occupation, language). Call before answering."
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "preferences": {
                    "type": "object",
                    "description": "Map of preference key to stated value",
                    "additionalProperties": { "type": "string" }
                }
            },
            "required": ["preferences"]
        })
    }

    async fn run(&self, args: serde_json::Value, ctx: &ToolContext) -> serde_json::Value {
        let Some(preferences) = args.get("preferences").and_then(|p| p.as_object()) else {
            return serde_json::json!({ "error": "invalid arguments: preferences object required" });
        };

        let stated: Vec<(String, String)> = preferences
            .iter()
            .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_owned())))
            .collect();

        if let Some(thread_id) = &ctx.thread_id {
            let mut context = self.threads.context(thread_id);
            for (key, value) in &stated {
                context.insert(key.clone(), value.clone());
            }
            self.threads.set_context(thread_id, context);
        }

        // Best-effort fact write — the acknowledgment below does not wait
        // on it being durable, and failures never surface to the model.
        if let Some(user_id) = &ctx.user_id {
            let candidates: Vec<FactCandidate> = stated
                .iter()
                .filter_map(|(key, value)| {
                    FactKind::parse(key).map(|kind| FactCandidate {
                        kind,
                        value: value.clone(),
                        confidence: 0.95,
                        requires_confirmation: false,
                    })
                })
                .collect();
            if let Err(e) = route_candidates(&self.store, user_id, &candidates, "chat_tool", "") {
                tracing::warn!(user_id, error = %e, "preference fact write failed");
            }
        }

        serde_json::json!({
            "status": "saved",
            "saved_keys": stated.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>(),
        })
    }
}

// ── search_articles ──────────────────────────────────────────

/// Finds published relocation articles relevant to a query.
pub struct SearchArticlesTool {
    index: Arc<dyn ArticleIndex>,
    limit: u32,
}

impl SearchArticlesTool {
    pub fn new(index: Arc<dyn ArticleIndex>, limit: u32) -> Self {
        Self { index, limit }
    }
}

#[async_trait]
impl Tool for SearchArticlesTool {
    fn name(&self) -> &str {
        "search_articles"
    }

    fn description(&self) -> &str {
        "Search published relocation guides and articles for a topic or destination."
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "What to search for" }
            },
            "required": ["query"]
        })
    }

    async fn run(&self, args: serde_json::Value, _ctx: &ToolContext) -> serde_json::Value {
        let query = args.get("query").and_then(|q| q.as_str()).unwrap_or("");
        if query.is_empty() {
            return serde_json::json!({ "error": "invalid arguments: query required" });
        }
        match self.index.search(query, self.limit).await {
            Ok(results) => serde_json::json!({ "results": results }),
            Err(e) => {
                tracing::warn!(error = %e, "article search failed");
                serde_json::json!({ "error": "article search unavailable" })
            }
        }
    }
}

// ── destination_info ─────────────────────────────────────────

/// Looks up destination knowledge from the relocation graph.
pub struct DestinationInfoTool {
    graph: Arc<dyn KnowledgeGraph>,
}

impl DestinationInfoTool {
    pub fn new(graph: Arc<dyn KnowledgeGraph>) -> Self {
        Self { graph }
    }
}

#[async_trait]
impl Tool for DestinationInfoTool {
    fn name(&self) -> &str {
        "destination_info"
    }

    fn description(&self) -> &str {
        "Look up living costs, visas, healthcare, and practical facts about a destination."
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Destination question to answer" }
            },
            "required": ["query"]
        })
    }

    async fn run(&self, args: serde_json::Value, _ctx: &ToolContext) -> serde_json::Value {
        let query = args.get("query").and_then(|q| q.as_str()).unwrap_or("");
        if query.is_empty() {
            return serde_json::json!({ "error": "invalid arguments: query required" });
        }
        match self.graph.search(query).await {
            Ok(summary) if !summary.is_empty() => serde_json::json!({ "summary": summary }),
            Ok(_) => serde_json::json!({ "summary": "No destination data found." }),
            Err(e) => {
                tracing::warn!(error = %e, "destination lookup failed");
                serde_json::json!({ "error": "destination lookup unavailable" })
            }
        }
    }
}
