//! Configuration for the wayfare service.
//!
//! Layered: compiled defaults, then an optional TOML file, then the API
//! key from the environment. Every section tolerates being absent.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WayfareError};

/// Environment variable holding the completion provider API key.
pub const API_KEY_ENV: &str = "WAYFARE_API_KEY";

/// Top-level service configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP listener settings.
    pub server: ServerConfig,
    /// Completion provider settings.
    pub provider: ProviderSettings,
    /// Thread store settings.
    pub threads: ThreadSettings,
    /// Voice pipeline settings.
    pub voice: VoiceSettings,
    /// External context service endpoints.
    pub services: ServiceSettings,
    /// On-disk storage settings.
    pub storage: StorageSettings,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind host.
    pub host: String,
    /// Bind port (0 = auto-assign).
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 8787,
        }
    }
}

/// Completion provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    /// OpenAI-compatible base URL.
    pub base_url: String,
    /// Model id.
    pub model: String,
    /// Max tokens per answer.
    pub max_tokens: u32,
    /// Sampling temperature for chat answers.
    pub temperature: f64,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".to_owned(),
            model: "gpt-4o-mini".to_owned(),
            max_tokens: 1024,
            temperature: 0.7,
        }
    }
}

/// Thread store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreadSettings {
    /// Seconds an untouched thread survives.
    pub ttl_secs: u64,
    /// Seconds between eviction sweeps.
    pub sweep_interval_secs: u64,
}

impl Default for ThreadSettings {
    fn default() -> Self {
        Self {
            ttl_secs: 24 * 60 * 60,
            sweep_interval_secs: 60 * 60,
        }
    }
}

impl ThreadSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// Voice pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceSettings {
    /// Milliseconds between emitted words.
    pub word_delay_ms: u64,
    /// Max tokens per spoken answer — kept short for voice.
    pub max_tokens: u32,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            word_delay_ms: 60,
            max_tokens: 300,
        }
    }
}

impl VoiceSettings {
    pub fn word_delay(&self) -> Duration {
        Duration::from_millis(self.word_delay_ms)
    }
}

/// External context service endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Knowledge-graph service base URL.
    pub knowledge_url: String,
    /// Graph id every search is scoped to.
    pub graph_id: String,
    /// Max knowledge-graph hits per search.
    pub graph_limit: u32,
    /// Long-term memory service base URL.
    pub memory_url: String,
    /// Article index base URL.
    pub articles_url: String,
    /// Application id for article searches.
    pub article_app_id: String,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            knowledge_url: "http://localhost:8701".to_owned(),
            graph_id: "relocation".to_owned(),
            graph_limit: 5,
            memory_url: "http://localhost:8702".to_owned(),
            articles_url: "http://localhost:8703".to_owned(),
            article_app_id: "wayfare".to_owned(),
        }
    }
}

/// On-disk storage configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Profile database path. `None` uses the platform data directory.
    pub db_path: Option<PathBuf>,
}

impl StorageSettings {
    /// Resolve the database path, falling back to the platform data dir.
    pub fn resolve_db_path(&self) -> PathBuf {
        match &self.db_path {
            Some(path) => path.clone(),
            None => dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("wayfare")
                .join("profile.db"),
        }
    }
}

impl Config {
    /// Load from a TOML file, or defaults when the file is absent.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|e| WayfareError::Config(format!("{}: {e}", path.display())))
    }

    /// The provider API key from the environment.
    pub fn api_key(&self) -> Result<String> {
        std::env::var(API_KEY_ENV)
            .map_err(|_| WayfareError::Config(format!("{API_KEY_ENV} is not set")))
    }

    /// Listener bind address.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
