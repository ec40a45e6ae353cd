//! Per-turn voice context: utterance extraction, the ephemeral context
//! aggregate, prompt rendering, and utterance classification.
//!
//! The context bundle is built fresh every turn from four independent
//! sources and discarded once the prompt is assembled. Sections render
//! only when present — an empty source is omitted, not emitted blank.

use rand::Rng;
use serde::Deserialize;

use crate::profile::{Fact, UserRecord};
use crate::services::ArticleSummary;

/// Utterances at or above this word count count as complex.
pub const COMPLEX_WORD_THRESHOLD: usize = 14;

/// Patterns marking comparison / explanation / definitional questions.
const COMPLEX_PATTERNS: &[&str] = &[
    "compare",
    "difference between",
    "versus",
    " vs ",
    "explain",
    "how does",
    "how do",
    "why is",
    "why do",
    "what is",
    "what are",
    "which is better",
    "pros and cons",
];

/// Filler phrases spoken while a complex answer is being generated.
/// Silence reads as a hang in a voice UI.
const FILLER_PHRASES: &[&str] = &[
    "Let me think about that for a moment.",
    "Good question, give me a second.",
    "Hmm, let me look into that.",
    "One moment while I check.",
    "Let me pull that together for you.",
];

/// An inbound message in the OpenAI-compatible request body. Content is
/// either a plain string or an array of typed blocks, depending on the
/// voice platform's mood.
#[derive(Debug, Clone, Deserialize)]
pub struct IncomingMessage {
    pub role: String,
    #[serde(default)]
    pub content: IncomingContent,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum IncomingContent {
    Text(String),
    Blocks(Vec<IncomingBlock>),
}

impl Default for IncomingContent {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct IncomingBlock {
    #[serde(rename = "type", default)]
    pub block_type: String,
    #[serde(default)]
    pub text: String,
}

impl IncomingContent {
    /// Flatten to plain text. Non-text blocks contribute nothing.
    pub fn as_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Blocks(blocks) => blocks
                .iter()
                .filter(|b| b.block_type.is_empty() || b.block_type == "text")
                .map(|b| b.text.as_str())
                .collect::<Vec<_>>()
                .join(" "),
        }
    }
}

/// The most recent user utterance, scanning backward through history.
pub fn last_user_utterance(messages: &[IncomingMessage]) -> Option<String> {
    messages
        .iter()
        .rev()
        .find(|m| m.role == "user")
        .map(|m| m.content.as_text())
        .filter(|text| !text.trim().is_empty())
}

/// Everything gathered for one voice turn.
#[derive(Debug, Clone, Default)]
pub struct VoiceContext {
    /// The user record, when the caller is not anonymous.
    pub profile: Option<UserRecord>,
    /// Committed facts.
    pub facts: Vec<Fact>,
    /// Pre-formatted knowledge-graph hits.
    pub knowledge: String,
    /// Personalized long-term memory text.
    pub memory: String,
    /// Relevant published articles.
    pub articles: Vec<ArticleSummary>,
}

/// Base instruction for the voice persona.
const VOICE_PROMPT: &str = "You are Wayfare's voice assistant for people planning a move \
abroad. Answer in short, natural spoken sentences. No markdown, no \
lists, no URLs — this will be read aloud.";

/// Render the system prompt for one turn: personalization instruction
/// first (when a name is known), then each present section under a fixed
/// label, in fixed order.
pub fn render_voice_prompt(ctx: &VoiceContext) -> String {
    let mut sections: Vec<String> = Vec::new();
    sections.push(VOICE_PROMPT.to_owned());

    if let Some(name) = ctx.profile.as_ref().and_then(|p| p.display_name.as_deref()) {
        sections.push(format!("Address the user by name: {name}."));
    }

    if let Some(profile) = &ctx.profile
        && !profile.destination_countries.is_empty()
    {
        sections.push(format!(
            "User profile:\n- Considering: {}",
            profile.destination_countries.join(", ")
        ));
    }

    if !ctx.facts.is_empty() {
        let lines: Vec<String> = ctx
            .facts
            .iter()
            .map(|f| format!("- {}: {}", f.kind, f.value))
            .collect();
        sections.push(format!("Known facts about the user:\n{}", lines.join("\n")));
    }

    if !ctx.knowledge.trim().is_empty() {
        sections.push(format!("Destination knowledge:\n{}", ctx.knowledge.trim()));
    }

    if !ctx.memory.trim().is_empty() {
        sections.push(format!("From earlier conversations:\n{}", ctx.memory.trim()));
    }

    if !ctx.articles.is_empty() {
        let lines: Vec<String> = ctx
            .articles
            .iter()
            .map(|a| format!("- {}: {}", a.title, a.excerpt))
            .collect();
        sections.push(format!("Relevant articles:\n{}", lines.join("\n")));
    }

    sections.join("\n\n")
}

/// Whether an utterance warrants a filler phrase: long, or matching a
/// comparison / explanation / definitional pattern.
pub fn is_complex_utterance(utterance: &str) -> bool {
    if utterance.split_whitespace().count() >= COMPLEX_WORD_THRESHOLD {
        return true;
    }
    let lowered = utterance.to_lowercase();
    COMPLEX_PATTERNS.iter().any(|p| lowered.contains(p))
}

/// One filler phrase, chosen uniformly at random.
pub fn pick_filler_phrase() -> &'static str {
    let idx = rand::thread_rng().gen_range(0..FILLER_PHRASES.len());
    FILLER_PHRASES[idx]
}
