//! Error types for the wayfare service.

/// Top-level error type for the conversation backend.
#[derive(Debug, thiserror::Error)]
pub enum WayfareError {
    /// Completion provider request or response error.
    #[error("provider error: {0}")]
    Provider(String),

    /// Streaming transport error.
    #[error("stream error: {0}")]
    Stream(String),

    /// Tool execution error.
    #[error("tool error: {0}")]
    Tool(String),

    /// Profile / fact storage error.
    #[error("store error: {0}")]
    Store(String),

    /// SQLite error from the profile store.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Context service error (knowledge graph, memory, articles).
    #[error("service error: {0}")]
    Service(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, WayfareError>;
