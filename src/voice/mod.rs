//! The voice turn pipeline: per-turn context gathering, spoken-style
//! answer pacing, and background fact learning.

pub mod context;
pub mod facts;
pub mod pipeline;

pub use context::{
    IncomingBlock, IncomingContent, IncomingMessage, VoiceContext, is_complex_utterance,
    last_user_utterance, render_voice_prompt,
};
pub use facts::{FactExtractor, LlmFactExtractor, process_turn_facts};
pub use pipeline::{ANONYMOUS_USER, DEFAULT_WORD_DELAY, VoicePipeline};
