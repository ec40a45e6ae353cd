//! Fact extraction from voice turns, and the background stage that
//! routes extracted candidates through the confirmation policy.
//!
//! Everything here runs after the answer has already been delivered.
//! Every step is individually logged-and-swallowed: a failed extraction
//! or sync must never affect the user-visible stream.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{Result, WayfareError};
use crate::llm::provider::{ChatProvider, Message, RequestOptions};
use crate::profile::{Fact, FactCandidate, FactKind, ProfileStore, route_candidates};
use crate::services::MemoryService;

/// Extracts typed fact candidates from one conversational turn.
#[async_trait]
pub trait FactExtractor: Send + Sync {
    async fn extract(
        &self,
        utterance: &str,
        answer: &str,
        existing: &[Fact],
    ) -> Result<Vec<FactCandidate>>;
}

/// LLM-backed extractor: one non-streaming completion that must return a
/// JSON array of candidates.
pub struct LlmFactExtractor {
    provider: Arc<dyn ChatProvider>,
}

impl LlmFactExtractor {
    pub fn new(provider: Arc<dyn ChatProvider>) -> Self {
        Self { provider }
    }

    fn build_prompt(utterance: &str, answer: &str, existing: &[Fact]) -> String {
        let known = if existing.is_empty() {
            "none".to_owned()
        } else {
            existing
                .iter()
                .map(|f| format!("{}={}", f.kind, f.value))
                .collect::<Vec<_>>()
                .join(", ")
        };
        format!(
            "Extract relocation facts the user stated about themselves.\n\
             Allowed kinds: destination, budget, timeline, nationality, \
             family_size, occupation, language.\n\
             Known facts: {known}\n\
             Return ONLY a JSON array, one object per fact: \
             {{\"kind\": ..., \"value\": ..., \"confidence\": 0.0-1.0, \
             \"requires_confirmation\": bool}}. \
             Set requires_confirmation for anything uncertain or misheard-sounding. \
             Return [] when nothing was stated.\n\n\
             User: {utterance}\nAssistant: {answer}"
        )
    }
}

#[async_trait]
impl FactExtractor for LlmFactExtractor {
    async fn extract(
        &self,
        utterance: &str,
        answer: &str,
        existing: &[Fact],
    ) -> Result<Vec<FactCandidate>> {
        let prompt = Self::build_prompt(utterance, answer, existing);
        let messages = vec![Message::user(prompt)];
        let options = RequestOptions::new().with_temperature(0.0).with_max_tokens(512);
        let raw = self.provider.complete(&messages, &options).await?;
        parse_candidates(&raw)
    }
}

/// Lenient parse of the extractor's output: find the outermost JSON
/// array, drop entries with unknown kinds or empty values.
pub fn parse_candidates(raw: &str) -> Result<Vec<FactCandidate>> {
    let start = raw.find('[');
    let end = raw.rfind(']');
    let (Some(start), Some(end)) = (start, end) else {
        return Err(WayfareError::Provider("no JSON array in extractor output".into()));
    };
    if end < start {
        return Err(WayfareError::Provider("malformed extractor output".into()));
    }

    let entries: Vec<serde_json::Value> = serde_json::from_str(&raw[start..=end])
        .map_err(|e| WayfareError::Provider(format!("extractor output not JSON: {e}")))?;

    let mut candidates = Vec::new();
    for entry in entries {
        let Some(kind) = entry
            .get("kind")
            .and_then(|k| k.as_str())
            .and_then(FactKind::parse)
        else {
            tracing::debug!(entry = %entry, "extractor entry with unknown kind dropped");
            continue;
        };
        let value = entry
            .get("value")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .trim()
            .to_owned();
        if value.is_empty() {
            continue;
        }
        candidates.push(FactCandidate {
            kind,
            value,
            confidence: entry
                .get("confidence")
                .and_then(|c| c.as_f64())
                .unwrap_or(0.5)
                .clamp(0.0, 1.0),
            requires_confirmation: entry
                .get("requires_confirmation")
                .and_then(|r| r.as_bool())
                .unwrap_or(false),
        });
    }
    Ok(candidates)
}

/// The post-answer fact stage: extract, route, propagate, sync.
///
/// Each phase fails independently; the committed-state invariants are
/// enforced by [`route_candidates`], not here.
pub async fn process_turn_facts(
    store: &ProfileStore,
    memory: &dyn MemoryService,
    extractor: &dyn FactExtractor,
    user_id: &str,
    utterance: &str,
    answer: &str,
) {
    let existing = match store.active_facts(user_id) {
        Ok(facts) => facts,
        Err(e) => {
            tracing::warn!(user_id, error = %e, "facts snapshot failed");
            Vec::new()
        }
    };

    let candidates = match extractor.extract(utterance, answer, &existing).await {
        Ok(candidates) => candidates,
        Err(e) => {
            tracing::warn!(user_id, error = %e, "fact extraction failed");
            return;
        }
    };
    if candidates.is_empty() {
        return;
    }

    let turn_text = format!("User: {utterance}\nAssistant: {answer}");
    let report = match route_candidates(store, user_id, &candidates, "voice", &turn_text) {
        Ok(report) => report,
        Err(e) => {
            tracing::warn!(user_id, error = %e, "fact routing failed");
            return;
        }
    };
    tracing::debug!(
        user_id,
        committed = report.committed.len(),
        queued = report.queued.len(),
        skipped = report.skipped.len(),
        "fact routing done"
    );

    if !report.committed.is_empty() {
        if let Err(e) = store.refresh_destination_countries(user_id) {
            tracing::warn!(user_id, error = %e, "profile propagation failed");
        }
        // Sync the full committed set so future personalization sees it.
        match store.active_facts(user_id) {
            Ok(facts) if !facts.is_empty() => {
                let summary = facts
                    .iter()
                    .map(|f| format!("{}: {}", f.kind, f.value))
                    .collect::<Vec<_>>()
                    .join("\n");
                if let Err(e) = memory
                    .store(user_id, &summary, serde_json::json!({ "kind": "profile_facts" }))
                    .await
                {
                    tracing::warn!(user_id, error = %e, "fact memory sync failed");
                }
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(user_id, error = %e, "fact re-read failed"),
        }
    }
}
