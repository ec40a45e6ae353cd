//! Clients for the external context services.
//!
//! Each collaborator is a trait so the pipelines can be driven by test
//! doubles; the HTTP implementations are thin JSON-over-POST clients
//! with bounded request timeouts.

pub mod articles;
pub mod knowledge;
pub mod memory;

pub use articles::{ArticleIndex, ArticleSummary, HttpArticleIndex};
pub use knowledge::{HttpKnowledgeGraph, KnowledgeGraph};
pub use memory::{HttpMemoryService, MemoryService};
