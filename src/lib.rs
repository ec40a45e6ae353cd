//! Wayfare: conversation backend for a relocation assistant.
//!
//! Two cooperating subsystems sit behind the HTTP surface:
//!
//! - **Generative-UI chat** (`/chat/genui`): an in-memory thread store
//!   feeds a tool-augmented completion loop that streams answers and
//!   transparently executes provider-requested tool calls.
//! - **Voice pipeline** (`/voice/chat/completions`): per-turn context
//!   fan-out (facts, knowledge graph, long-term memory, articles),
//!   word-paced answer streaming, and detached fact learning with
//!   human-in-the-loop confirmation for risky changes.
//!
//! Persistence for users, facts, and the confirmation queue is SQLite;
//! conversation threads live only in memory and expire on a TTL.

pub mod chat;
pub mod config;
pub mod error;
pub mod llm;
pub mod profile;
pub mod server;
pub mod services;
pub mod thread;
pub mod voice;

pub use config::Config;
pub use error::{Result, WayfareError};
