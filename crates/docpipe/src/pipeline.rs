//! Pipeline orchestrator: drives a file through the processing stages
//!
//! One call to [`PipelineRunner::process`] is one full pass through the state
//! machine: `parsing → chunking → embedding → storing → completed`, with
//! `error` reachable from any stage. Stage transitions are written to the
//! status store as they happen; the append-only stage log gets a row at entry
//! and at exit of every stage.

use futures_util::future::join_all;
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::providers::{AddDocuments, Chunker, DocumentParser, EmbeddingProvider, VectorStore};
use crate::storage::StatusStore;
use crate::types::{ChunkRecord, FileStatus, FileUpdate, LogStatus, Stage};

impl Stage {
    /// Progress checkpoint written when the stage is entered
    pub fn entry_progress(&self) -> u8 {
        match self {
            Stage::Parsing => 10,
            Stage::Chunking => 40,
            Stage::Embedding => 70,
            Stage::Storing => 95,
            Stage::Pipeline => 0,
        }
    }

    /// Progress checkpoint written when the stage completes
    pub fn completion_progress(&self) -> u8 {
        match self {
            Stage::Parsing => 30,
            Stage::Chunking => 60,
            Stage::Embedding => 90,
            Stage::Storing => 100,
            Stage::Pipeline => 100,
        }
    }

    /// File status corresponding to being inside this stage
    fn file_status(&self) -> FileStatus {
        match self {
            Stage::Parsing => FileStatus::Parsing,
            Stage::Chunking => FileStatus::Chunking,
            Stage::Embedding => FileStatus::Embedding,
            Stage::Storing => FileStatus::Storing,
            Stage::Pipeline => FileStatus::Pending,
        }
    }

    fn entry_message(&self) -> &'static str {
        match self {
            Stage::Parsing => "Extracting document text",
            Stage::Chunking => "Splitting document into chunks",
            Stage::Embedding => "Generating embeddings",
            Stage::Storing => "Writing vectors to store",
            Stage::Pipeline => "Processing",
        }
    }
}

/// Orchestrates stage execution and keeps the relational and vector stores
/// consistent. All collaborators are injected.
pub struct PipelineRunner {
    store: Arc<StatusStore>,
    parser: Arc<dyn DocumentParser>,
    chunker: Arc<dyn Chunker>,
    embedder: Arc<dyn EmbeddingProvider>,
    vector_store: Arc<dyn VectorStore>,
    collection: String,
    stage_timeout: Duration,
}

impl PipelineRunner {
    pub fn new(
        config: &PipelineConfig,
        store: Arc<StatusStore>,
        parser: Arc<dyn DocumentParser>,
        chunker: Arc<dyn Chunker>,
        embedder: Arc<dyn EmbeddingProvider>,
        vector_store: Arc<dyn VectorStore>,
    ) -> Self {
        Self {
            store,
            parser,
            chunker,
            embedder,
            vector_store,
            collection: config.vector_store.collection.clone(),
            stage_timeout: Duration::from_secs(config.processing.stage_timeout_secs),
        }
    }

    /// Collection holding this pipeline's chunk vectors
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Run one full processing pass for a file.
    ///
    /// Returns `Ok(())` both on completion and when the file record no longer
    /// exists (deleted mid-flight; the remaining writes become no-ops).
    /// Returns the stage error after recording it on the file.
    pub async fn process(&self, file_id: Uuid) -> Result<()> {
        let Some(record) = self.store.get_file(file_id)? else {
            tracing::debug!("File {} vanished before processing, skipping", file_id);
            return Ok(());
        };

        tracing::info!("Processing {} ({})", record.filename, file_id);
        let started = std::time::Instant::now();

        // Parsing
        if !self.enter_stage(file_id, Stage::Parsing)? {
            return Ok(());
        }
        let parsed = match self
            .run_stage(file_id, Stage::Parsing, self.parser.parse(Path::new(&record.filepath)))
            .await?
        {
            Some(parsed) => parsed,
            None => return Ok(()),
        };
        self.store.update_file(
            file_id,
            &FileUpdate {
                progress: Some(Stage::Parsing.completion_progress()),
                total_pages: Some(parsed.total_pages),
                message: Some("Document parsed".to_string()),
                ..Default::default()
            },
        )?;

        // Chunking
        if !self.enter_stage(file_id, Stage::Chunking)? {
            return Ok(());
        }
        let chunks = match self
            .run_stage(file_id, Stage::Chunking, self.chunker.chunk(&parsed.content))
            .await?
        {
            Some(chunks) => chunks,
            None => return Ok(()),
        };
        self.store.update_file(
            file_id,
            &FileUpdate {
                progress: Some(Stage::Chunking.completion_progress()),
                chunks_count: Some(chunks.len() as u32),
                message: Some(format!("Created {} chunks", chunks.len())),
                ..Default::default()
            },
        )?;

        // Embedding
        if !self.enter_stage(file_id, Stage::Embedding)? {
            return Ok(());
        }
        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let vectors = match self
            .run_stage(file_id, Stage::Embedding, self.embed_all(&texts))
            .await?
        {
            Some(vectors) => vectors,
            None => return Ok(()),
        };
        self.store.update_file(
            file_id,
            &FileUpdate {
                progress: Some(Stage::Embedding.completion_progress()),
                message: Some("Embeddings generated".to_string()),
                ..Default::default()
            },
        )?;

        // Storing
        if !self.enter_stage(file_id, Stage::Storing)? {
            return Ok(());
        }
        let store_op = self.store_chunks(file_id, &record.filename, &chunks, vectors);
        if self
            .run_stage(file_id, Stage::Storing, store_op)
            .await?
            .is_none()
        {
            return Ok(());
        }

        // Completed
        let duration = started.elapsed().as_secs_f64();
        self.store.update_file(
            file_id,
            &FileUpdate {
                status: Some(FileStatus::Completed),
                progress: Some(100),
                message: Some(format!("Processing completed in {:.1}s", duration)),
                processing_duration: Some(duration),
                ..Default::default()
            },
        )?;
        self.store.append_log(
            file_id,
            Stage::Pipeline,
            LogStatus::Completed,
            Some("Processing completed"),
            Some(duration),
        )?;

        tracing::info!(
            "Completed {} in {:.1}s: {} pages, {} chunks",
            record.filename,
            duration,
            parsed.total_pages,
            chunks.len()
        );
        Ok(())
    }

    /// Write the stage transition and the `started` log row.
    /// Returns false if the file record no longer exists.
    fn enter_stage(&self, file_id: Uuid, stage: Stage) -> Result<bool> {
        let touched = self.store.update_file(
            file_id,
            &FileUpdate::status(stage.file_status(), stage.entry_progress(), stage.entry_message()),
        )?;
        if !touched {
            tracing::debug!("File {} deleted mid-pipeline at {}", file_id, stage.as_str());
            return Ok(false);
        }
        self.store.append_log(
            file_id,
            stage,
            LogStatus::Started,
            Some(stage.entry_message()),
            None,
        )?;
        Ok(true)
    }

    /// Execute a stage future under the stage timeout, recording the outcome.
    ///
    /// `Ok(Some(v))` on success, `Ok(None)` when the file vanished, `Err`
    /// after the failure has been written to the log and the file record.
    async fn run_stage<T>(
        &self,
        file_id: Uuid,
        stage: Stage,
        operation: impl std::future::Future<Output = Result<T>>,
    ) -> Result<Option<T>> {
        let started = std::time::Instant::now();

        let outcome = match timeout(self.stage_timeout, operation).await {
            Ok(result) => result,
            Err(_) => Err(Error::Internal(format!(
                "{} timed out after {}s",
                stage.as_str(),
                self.stage_timeout.as_secs()
            ))),
        };

        let duration = started.elapsed().as_secs_f64();
        match outcome {
            Ok(value) => {
                self.store.append_log(
                    file_id,
                    stage,
                    LogStatus::Completed,
                    None,
                    Some(duration),
                )?;
                Ok(Some(value))
            }
            Err(err) => {
                let message = err.to_string();
                tracing::error!("Stage {} failed for {}: {}", stage.as_str(), file_id, message);

                // Audit trail first, then the status flip (causal order)
                self.store.append_log(
                    file_id,
                    stage,
                    LogStatus::Failed,
                    Some(&message),
                    Some(duration),
                )?;
                let touched = self.store.update_file(
                    file_id,
                    &FileUpdate::failure(format!("Processing failed: {}", message), &message),
                )?;
                if !touched {
                    return Ok(None);
                }
                self.store.append_log(
                    file_id,
                    Stage::Pipeline,
                    LogStatus::Failed,
                    Some(&message),
                    None,
                )?;
                Err(err)
            }
        }
    }

    /// Embed every chunk concurrently; one failed chunk fails the stage
    async fn embed_all(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let futures: Vec<_> = texts.iter().map(|text| self.embedder.embed(text)).collect();
        join_all(futures).await.into_iter().collect()
    }

    async fn store_chunks(
        &self,
        file_id: Uuid,
        filename: &str,
        chunks: &[ChunkRecord],
        vectors: Vec<Vec<f32>>,
    ) -> Result<()> {
        self.vector_store.ensure_collection(&self.collection).await?;

        let mut ids = Vec::with_capacity(chunks.len());
        let mut texts = Vec::with_capacity(chunks.len());
        let mut metadatas = Vec::with_capacity(chunks.len());

        for (index, chunk) in chunks.iter().enumerate() {
            ids.push(ChunkRecord::vector_id(&file_id, index));
            texts.push(chunk.content.clone());
            metadatas.push(chunk_metadata(file_id, filename, index, chunk));
        }

        self.vector_store
            .add_documents(
                &self.collection,
                AddDocuments {
                    ids,
                    texts,
                    metadatas,
                    vectors: Some(vectors),
                },
            )
            .await
    }

    /// Delete a file: best-effort vector cleanup, remove the stored upload,
    /// then the atomic relational cascade. Returns false when the file does
    /// not exist.
    pub async fn delete_file(&self, file_id: Uuid) -> Result<bool> {
        let Some(record) = self.store.get_file(file_id)? else {
            return Ok(false);
        };

        // Vector cleanup must never block the relational delete; the stores
        // are allowed to drift, never to corrupt.
        let chunk_ids: Vec<String> = (0..record.chunks_count.unwrap_or(0) as usize)
            .map(|i| ChunkRecord::vector_id(&file_id, i))
            .collect();
        if !chunk_ids.is_empty() {
            if let Err(e) = self.vector_store.delete(&self.collection, &chunk_ids).await {
                tracing::error!(
                    "Vector cleanup failed for {} ({} chunks), continuing: {}",
                    file_id,
                    chunk_ids.len(),
                    e
                );
            }
        }

        if let Err(e) = tokio::fs::remove_file(&record.filepath).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("Failed to remove stored upload {}: {}", record.filepath, e);
            }
        }

        self.store.delete_file(file_id)
    }
}

fn chunk_metadata(
    file_id: Uuid,
    filename: &str,
    index: usize,
    chunk: &ChunkRecord,
) -> Map<String, Value> {
    let mut metadata = Map::new();
    metadata.insert("file_id".to_string(), Value::String(file_id.to_string()));
    metadata.insert("filename".to_string(), Value::String(filename.to_string()));
    metadata.insert("chunk_index".to_string(), Value::from(index as u64));
    metadata.insert("chunk_title".to_string(), Value::String(chunk.title.clone()));
    metadata.insert(
        "chunk_summary".to_string(),
        Value::String(chunk.summary.clone()),
    );
    metadata.insert("chunk_type".to_string(), Value::String(chunk.kind.clone()));
    metadata.insert(
        "content_length".to_string(),
        Value::from(chunk.content.len() as u64),
    );
    metadata
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::providers::test_support::{FailingParser, HashEmbedder, ParagraphChunker, StaticParser};
    use crate::providers::{MemoryVectorStore, QueryMatch};
    use crate::types::FileRecord;
    use async_trait::async_trait;

    fn runner_with(
        store: Arc<StatusStore>,
        parser: Arc<dyn DocumentParser>,
        vector_store: Arc<dyn VectorStore>,
    ) -> PipelineRunner {
        let config = PipelineConfig::default();
        PipelineRunner::new(
            &config,
            store,
            parser,
            Arc::new(ParagraphChunker),
            Arc::new(HashEmbedder),
            vector_store,
        )
    }

    fn upload(store: &StatusStore) -> FileRecord {
        let record = FileRecord::new(
            "paper.pdf".to_string(),
            "/nonexistent/paper.pdf".to_string(),
            2048,
            Some("application/pdf".to_string()),
        );
        store.create_file(&record).unwrap();
        record
    }

    #[test]
    fn checkpoints_are_monotonic_and_end_at_100() {
        let stages = [Stage::Parsing, Stage::Chunking, Stage::Embedding, Stage::Storing];
        let mut sequence = vec![0u8];
        for stage in stages {
            sequence.push(stage.entry_progress());
            sequence.push(stage.completion_progress());
        }
        assert!(sequence.windows(2).all(|w| w[0] <= w[1]), "{:?}", sequence);
        assert_eq!(*sequence.last().unwrap(), 100);
    }

    #[tokio::test]
    async fn successful_run_reaches_completed() {
        let store = Arc::new(StatusStore::in_memory().unwrap());
        let vectors = Arc::new(MemoryVectorStore::new(Arc::new(HashEmbedder)));
        let runner = runner_with(
            Arc::clone(&store),
            Arc::new(StaticParser {
                content: "First paragraph about budgets.\n\nSecond paragraph about planning."
                    .to_string(),
                total_pages: 3,
            }),
            vectors,
        );

        let record = upload(&store);
        runner.process(record.id).await.unwrap();

        let finished = store.get_file(record.id).unwrap().unwrap();
        assert_eq!(finished.status, FileStatus::Completed);
        assert_eq!(finished.progress, 100);
        assert_eq!(finished.total_pages, Some(3));
        assert_eq!(finished.chunks_count, Some(2));
        assert!(finished.processing_duration.is_some());
        assert_eq!(finished.error_count, 0);

        let logs = store.get_logs(record.id).unwrap();
        let stages: Vec<(Stage, LogStatus)> = logs.iter().map(|l| (l.stage, l.status)).collect();
        assert_eq!(
            stages,
            vec![
                (Stage::Parsing, LogStatus::Started),
                (Stage::Parsing, LogStatus::Completed),
                (Stage::Chunking, LogStatus::Started),
                (Stage::Chunking, LogStatus::Completed),
                (Stage::Embedding, LogStatus::Started),
                (Stage::Embedding, LogStatus::Completed),
                (Stage::Storing, LogStatus::Started),
                (Stage::Storing, LogStatus::Completed),
                (Stage::Pipeline, LogStatus::Completed),
            ]
        );
    }

    #[tokio::test]
    async fn completed_chunks_are_queryable() {
        let store = Arc::new(StatusStore::in_memory().unwrap());
        let vectors = Arc::new(MemoryVectorStore::new(Arc::new(HashEmbedder)));
        let runner = runner_with(
            Arc::clone(&store),
            Arc::new(StaticParser {
                content: "Quarterly revenue grew fourteen percent.\n\nPenguins live in antarctica."
                    .to_string(),
                total_pages: 1,
            }),
            Arc::clone(&vectors) as Arc<dyn VectorStore>,
        );

        let record = upload(&store);
        runner.process(record.id).await.unwrap();

        let results = vectors
            .query(
                runner.collection(),
                &["quarterly revenue numbers".to_string()],
                2,
                None,
            )
            .await
            .unwrap();
        assert_eq!(results[0][0].id, ChunkRecord::vector_id(&record.id, 0));
        assert_eq!(
            results[0][0].metadata.get("filename").and_then(|v| v.as_str()),
            Some("paper.pdf")
        );
    }

    #[tokio::test]
    async fn parse_failure_lands_in_error_state() {
        let store = Arc::new(StatusStore::in_memory().unwrap());
        let vectors = Arc::new(MemoryVectorStore::new(Arc::new(HashEmbedder)));
        let runner = runner_with(Arc::clone(&store), Arc::new(FailingParser::new()), vectors);

        let record = upload(&store);
        let result = runner.process(record.id).await;
        assert!(result.is_err());

        let failed = store.get_file(record.id).unwrap().unwrap();
        assert_eq!(failed.status, FileStatus::Error);
        assert_eq!(failed.error_count, 1);
        assert!(failed
            .last_error
            .as_deref()
            .unwrap()
            .contains("simulated transient parser outage"));

        let logs = store.get_logs(record.id).unwrap();
        let failed_stage = logs
            .iter()
            .find(|l| l.stage == Stage::Parsing && l.status == LogStatus::Failed)
            .expect("stage failure row");
        assert!(failed_stage.message.is_some());
    }

    #[tokio::test]
    async fn deleted_file_makes_processing_a_noop() {
        let store = Arc::new(StatusStore::in_memory().unwrap());
        let vectors = Arc::new(MemoryVectorStore::new(Arc::new(HashEmbedder)));
        let runner = runner_with(
            Arc::clone(&store),
            Arc::new(StaticParser {
                content: "text".to_string(),
                total_pages: 1,
            }),
            vectors,
        );

        let record = upload(&store);
        store.delete_file(record.id).unwrap();

        runner.process(record.id).await.unwrap();
        assert!(store.get_logs(record.id).unwrap().is_empty());
    }

    struct BrokenVectorStore;

    #[async_trait]
    impl VectorStore for BrokenVectorStore {
        async fn ensure_collection(&self, _name: &str) -> Result<()> {
            Err(Error::VectorStore("store offline".to_string()))
        }

        async fn add_documents(&self, _collection: &str, _documents: AddDocuments) -> Result<()> {
            Err(Error::VectorStore("store offline".to_string()))
        }

        async fn query(
            &self,
            _collection: &str,
            _query_texts: &[String],
            _k: usize,
            _filter: Option<&Map<String, Value>>,
        ) -> Result<Vec<Vec<QueryMatch>>> {
            Err(Error::VectorStore("store offline".to_string()))
        }

        async fn delete(&self, _collection: &str, _ids: &[String]) -> Result<()> {
            Err(Error::VectorStore("store offline".to_string()))
        }

        fn name(&self) -> &str {
            "broken"
        }
    }

    #[tokio::test]
    async fn delete_succeeds_despite_vector_store_failure() {
        let store = Arc::new(StatusStore::in_memory().unwrap());
        let runner = runner_with(
            Arc::clone(&store),
            Arc::new(StaticParser {
                content: "text".to_string(),
                total_pages: 1,
            }),
            Arc::new(BrokenVectorStore),
        );

        let record = upload(&store);
        store
            .update_file(
                record.id,
                &FileUpdate {
                    chunks_count: Some(4),
                    ..Default::default()
                },
            )
            .unwrap();
        store
            .append_log(record.id, Stage::Parsing, LogStatus::Started, None, None)
            .unwrap();

        assert!(runner.delete_file(record.id).await.unwrap());
        assert!(store.get_file(record.id).unwrap().is_none());
        assert!(store.get_logs(record.id).unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_missing_file_returns_false() {
        let store = Arc::new(StatusStore::in_memory().unwrap());
        let vectors = Arc::new(MemoryVectorStore::new(Arc::new(HashEmbedder)));
        let runner = runner_with(
            Arc::clone(&store),
            Arc::new(StaticParser {
                content: "text".to_string(),
                total_pages: 1,
            }),
            vectors,
        );

        assert!(!runner.delete_file(Uuid::new_v4()).await.unwrap());
    }

    #[tokio::test]
    async fn storing_failure_records_stage_error() {
        let store = Arc::new(StatusStore::in_memory().unwrap());
        let runner = runner_with(
            Arc::clone(&store),
            Arc::new(StaticParser {
                content: "Some paragraph.".to_string(),
                total_pages: 1,
            }),
            Arc::new(BrokenVectorStore),
        );

        let record = upload(&store);
        assert!(runner.process(record.id).await.is_err());

        let failed = store.get_file(record.id).unwrap().unwrap();
        assert_eq!(failed.status, FileStatus::Error);
        // Results from earlier stages survive the failure
        assert_eq!(failed.total_pages, Some(1));
        assert_eq!(failed.chunks_count, Some(1));

        let logs = store.get_logs(record.id).unwrap();
        assert!(logs
            .iter()
            .any(|l| l.stage == Stage::Storing && l.status == LogStatus::Failed));
    }
}
