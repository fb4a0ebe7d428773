//! Application state for the ingestion server

use std::sync::Arc;

use crate::config::{PipelineConfig, VectorBackend};
use crate::error::Result;
use crate::pipeline::PipelineRunner;
use crate::processing::{PipelineWorker, TaskQueue};
use crate::providers::{
    ChromaStore, EmbeddingProvider, MemoryVectorStore, OllamaChunker, OllamaClient, OllamaEmbedder,
    PdfParser, VectorStore,
};
use crate::storage::StatusStore;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: PipelineConfig,
    store: Arc<StatusStore>,
    queue: Arc<TaskQueue>,
    runner: Arc<PipelineRunner>,
    vector_store: Arc<dyn VectorStore>,
}

impl AppState {
    /// Construct the full dependency graph from configuration.
    ///
    /// Every handle is built here and injected; nothing reaches for globals.
    pub async fn new(config: PipelineConfig) -> Result<Self> {
        tracing::info!("Initializing ingestion pipeline state");

        tokio::fs::create_dir_all(&config.server.upload_dir).await?;
        if let Some(parent) = config.storage.db_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let store = Arc::new(StatusStore::new(&config.storage.db_path)?);
        tracing::info!("Status store opened at {}", config.storage.db_path.display());

        let ollama = Arc::new(OllamaClient::new(&config.llm));
        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(OllamaEmbedder::from_client(
            Arc::clone(&ollama),
            config.llm.dimensions,
        ));
        let chunker = Arc::new(OllamaChunker::new(Arc::clone(&ollama), &config.chunking));
        let parser = Arc::new(PdfParser::new());

        let vector_store: Arc<dyn VectorStore> = match config.vector_store.backend {
            VectorBackend::Memory => {
                tracing::info!("Using in-process vector store");
                Arc::new(MemoryVectorStore::new(Arc::clone(&embedder)))
            }
            VectorBackend::Chroma => {
                tracing::info!("Using Chroma at {}", config.vector_store.chroma_url);
                Arc::new(ChromaStore::new(&config.vector_store, Arc::clone(&embedder)))
            }
        };
        vector_store
            .ensure_collection(&config.vector_store.collection)
            .await?;

        let queue = Arc::new(TaskQueue::new(
            Arc::clone(&store),
            config.queue.clone(),
            &config.processing,
        ));
        let runner = Arc::new(PipelineRunner::new(
            &config,
            Arc::clone(&store),
            parser,
            chunker,
            embedder,
            Arc::clone(&vector_store),
        ));

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                store,
                queue,
                runner,
                vector_store,
            }),
        })
    }

    /// Recover orphaned tasks and start the worker pool
    pub fn start_workers(&self) -> Result<()> {
        let worker = Arc::new(PipelineWorker::new(
            &self.inner.config.processing,
            Arc::clone(&self.inner.queue),
            Arc::clone(&self.inner.runner),
        ));
        worker.start()?;
        Ok(())
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &Arc<StatusStore> {
        &self.inner.store
    }

    pub fn queue(&self) -> &Arc<TaskQueue> {
        &self.inner.queue
    }

    pub fn runner(&self) -> &Arc<PipelineRunner> {
        &self.inner.runner
    }

    pub fn vector_store(&self) -> &Arc<dyn VectorStore> {
        &self.inner.vector_store
    }
}
