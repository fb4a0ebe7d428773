//! Ingestion server binary
//!
//! Run with: cargo run -p docpipe --bin docpipe-server [config.toml]

use docpipe::{config::PipelineConfig, server::IngestServer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "docpipe=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Optional config path as the first argument
    let config = match std::env::args().nth(1) {
        Some(path) => PipelineConfig::from_file(std::path::Path::new(&path))?,
        None => PipelineConfig::default(),
    };

    tracing::info!("Configuration loaded");
    tracing::info!("  - Workers: {:?}", config.processing.worker_count);
    tracing::info!("  - Max attempts: {}", config.processing.max_attempts);
    tracing::info!("  - Vector backend: {:?}", config.vector_store.backend);
    tracing::info!("  - Embedding model: {}", config.llm.embed_model);

    // Surface an unreachable Ollama early; processing degrades to fallbacks
    let client = reqwest::Client::new();
    match client
        .get(format!("{}/api/tags", config.llm.base_url))
        .send()
        .await
    {
        Ok(resp) if resp.status().is_success() => {
            tracing::info!("Ollama is running at {}", config.llm.base_url);
        }
        _ => {
            tracing::warn!("Ollama not available at {}", config.llm.base_url);
            tracing::warn!("Chunking will use the sliding-window fallback until it is up");
        }
    }

    let server = IngestServer::new(config).await?;

    tracing::info!("API: http://{}/api", server.address());
    tracing::info!("Health: http://{}/health", server.address());

    server.start().await?;

    Ok(())
}
