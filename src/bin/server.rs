//! Wayfare server binary.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use wayfare::chat::{
    ChatEngine, DestinationInfoTool, SavePreferencesTool, SearchArticlesTool, ToolCatalog,
};
use wayfare::config::Config;
use wayfare::llm::provider::RequestOptions;
use wayfare::llm::{ChatProvider, OpenAiConfig, OpenAiProvider};
use wayfare::profile::ProfileStore;
use wayfare::server::{AppState, Server, build_router};
use wayfare::services::{HttpArticleIndex, HttpKnowledgeGraph, HttpMemoryService};
use wayfare::thread::ThreadStore;
use wayfare::voice::{LlmFactExtractor, VoicePipeline};

fn config_path() -> PathBuf {
    std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("wayfare")
                .join("config.toml")
        })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::load(&config_path()).context("loading config")?;
    let api_key = config.api_key().context("provider credentials")?;

    let provider: Arc<dyn ChatProvider> = Arc::new(OpenAiProvider::new(
        OpenAiConfig::new(api_key, config.provider.model.clone())
            .with_base_url(config.provider.base_url.clone()),
    ));

    let store = Arc::new(
        ProfileStore::open(&config.storage.resolve_db_path()).context("opening profile store")?,
    );

    let threads = Arc::new(ThreadStore::new(config.threads.ttl()));
    let _sweeper = threads.start_sweeper(config.threads.sweep_interval());

    let graph = Arc::new(HttpKnowledgeGraph::new(
        config.services.knowledge_url.clone(),
        config.services.graph_id.clone(),
        config.services.graph_limit,
    ));
    let memory = Arc::new(HttpMemoryService::new(config.services.memory_url.clone()));
    let articles = Arc::new(HttpArticleIndex::new(
        config.services.articles_url.clone(),
        config.services.article_app_id.clone(),
    ));

    let mut catalog = ToolCatalog::new();
    catalog.register(Arc::new(SavePreferencesTool::new(
        Arc::clone(&threads),
        Arc::clone(&store),
    )));
    catalog.register(Arc::new(SearchArticlesTool::new(
        Arc::clone(&articles) as Arc<dyn wayfare::services::ArticleIndex>,
        config.services.graph_limit,
    )));
    catalog.register(Arc::new(DestinationInfoTool::new(
        Arc::clone(&graph) as Arc<dyn wayfare::services::KnowledgeGraph>,
    )));

    let chat = Arc::new(ChatEngine::new(
        Arc::clone(&provider),
        Arc::clone(&threads),
        Arc::new(catalog),
        RequestOptions::new()
            .with_max_tokens(config.provider.max_tokens)
            .with_temperature(config.provider.temperature),
    ));

    let extractor = Arc::new(LlmFactExtractor::new(Arc::clone(&provider)));
    let voice = Arc::new(VoicePipeline::new(
        provider,
        store,
        graph,
        memory,
        articles,
        extractor,
        config.voice.word_delay(),
        RequestOptions::new().with_max_tokens(config.voice.max_tokens),
    ));

    let router = build_router(AppState { chat, voice });
    let server = Server::start(&config.bind_addr(), router).await?;

    tokio::signal::ctrl_c().await.context("signal handler")?;
    tracing::info!("shutting down");
    server.shutdown();
    Ok(())
}
