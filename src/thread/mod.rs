//! In-memory conversation threads: message history, per-thread context,
//! system prompt assembly, and TTL eviction.

pub mod context;
pub mod store;

pub use context::render_system_prompt;
pub use store::{DEFAULT_SWEEP_INTERVAL, DEFAULT_THREAD_TTL, SweeperHandle, ThreadStore};
