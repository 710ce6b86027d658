//! Long-lived request state: the active index and pipeline, and session memory
//!
//! Readers take a clone of the active `Arc<QueryPipeline>` and never observe
//! a half-built index; an upload builds and saves its index off to the side
//! and publishes it with a single write. Writers (uploads and the lazy load
//! on first question) are serialized by `rebuild_lock`.


use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use tempfile::NamedTempFile;
use tokio::sync::{Mutex, RwLock};
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::embeddings::{ChunkingConfig, Embedder, OllamaClient, split_pages};
use crate::extractor::extract_pdf;
use crate::index::{IndexStore, VectorIndex};
use crate::pipeline::{Generator, PromptTemplate, QueryPipeline};
use crate::session::SessionStore;
use crate::{RagError, Result};

/// Outcome of a successful upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSummary {
    pub upload_id: Uuid,
    pub pages: usize,
    pub chunks: usize,
}

pub struct Orchestrator {
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
    store: IndexStore,
    sessions: SessionStore,
    template: PromptTemplate,
    chunking: ChunkingConfig,
    top_k: usize,
    upload_dir: PathBuf,
    active: RwLock<Option<Arc<QueryPipeline>>>,
    rebuild_lock: Mutex<()>,
}

impl Orchestrator {
    #[inline]
    pub fn new(
        config: &Config,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
    ) -> Result<Self> {
        Ok(Self {
            embedder,
            generator,
            store: IndexStore::new(config.index_path()),
            sessions: SessionStore::new(&config.session),
            template: PromptTemplate::new(&config.prompt.template)?,
            chunking: config.chunking.clone(),
            top_k: config.retrieval.top_k,
            upload_dir: config.upload_dir(),
            active: RwLock::new(None),
            rebuild_lock: Mutex::new(()),
        })
    }

    /// Wire the orchestrator to the Ollama models named in `config`
    #[inline]
    pub fn with_ollama(config: &Config, client: OllamaClient) -> Result<Self> {
        let client = Arc::new(client);
        Self::new(
            config,
            Arc::clone(&client) as Arc<dyn Embedder>,
            client as Arc<dyn Generator>,
        )
    }

    #[inline]
    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    #[inline]
    pub fn index_store(&self) -> &IndexStore {
        &self.store
    }

    /// Whether a pipeline is currently published
    #[inline]
    pub async fn has_index(&self) -> bool {
        self.active.read().await.is_some()
    }

    /// Replace the active index with one built from an uploaded PDF.
    ///
    /// On any failure the previously active pipeline stays in place.
    #[inline]
    pub async fn upload(&self, file_name: &str, bytes: &[u8]) -> Result<UploadSummary> {
        let upload_id = Uuid::new_v4();
        let span = info_span!("upload", %upload_id, file = %file_name);

        self.rebuild(upload_id, file_name, bytes)
            .instrument(span)
            .await
    }

    async fn rebuild(&self, upload_id: Uuid, file_name: &str, bytes: &[u8]) -> Result<UploadSummary> {
        info!("Received {} bytes", bytes.len());
        let _writer = self.rebuild_lock.lock().await;

        let temp_file = self.write_temp_file(bytes)?;

        let embedder = Arc::clone(&self.embedder);
        let chunking = self.chunking.clone();
        let source = file_name.to_string();
        let (pages, index) = tokio::task::spawn_blocking(move || -> Result<(usize, VectorIndex)> {
            // The temp file is deleted when this closure returns
            let document = extract_pdf(temp_file.path())?;
            if !document.has_text() {
                return Err(RagError::Extraction(
                    "Document contains no extractable text".to_string(),
                ));
            }

            let chunks = split_pages(&source, &document.pages, &chunking);
            debug!(
                "Split {} pages into {} chunks",
                document.pages.len(),
                chunks.len()
            );
            let index = VectorIndex::build(chunks, embedder.as_ref())?;
            Ok((document.pages.len(), index))
        })
        .await
        .map_err(|e| RagError::Other(anyhow::anyhow!("Indexing task failed: {}", e)))??;

        self.store.save(&index).await?;

        let chunks = index.len();
        self.publish(index).await;

        info!("Indexed {} pages as {} chunks", pages, chunks);
        Ok(UploadSummary {
            upload_id,
            pages,
            chunks,
        })
    }

    /// Answer `question` in the context of `session_id`'s transcript, then
    /// record the exchange.
    ///
    /// Turns within one session are serialized; a failed turn records nothing.
    #[inline]
    pub async fn ask(&self, session_id: &str, question: &str) -> Result<String> {
        let pipeline = self.pipeline().await?;

        let mut transcript = self.sessions.begin_turn(session_id).await;
        let history = transcript.render();

        let owned_question = question.to_string();
        let answer =
            tokio::task::spawn_blocking(move || pipeline.answer(&owned_question, &history))
                .await
                .map_err(|e| RagError::Other(anyhow::anyhow!("Answer task failed: {}", e)))??;

        transcript.record_turn(question, &answer);
        debug!(
            "Session {} now holds {} entries",
            session_id,
            transcript.entries().len()
        );
        Ok(answer)
    }

    /// The active pipeline, loading the saved index on first use
    #[inline]
    pub async fn pipeline(&self) -> Result<Arc<QueryPipeline>> {
        if let Some(pipeline) = self.current().await {
            return Ok(pipeline);
        }

        let _writer = self.rebuild_lock.lock().await;

        // Another task may have published while we waited
        if let Some(pipeline) = self.current().await {
            return Ok(pipeline);
        }

        info!("No active index, loading from {}", self.store.path().display());
        let index = match self.store.load(self.embedder.model_id()).await {
            Ok(index) => index,
            Err(RagError::NotFound(reason)) => {
                warn!("Nothing to load: {}", reason);
                return Err(RagError::NoIndexAvailable);
            }
            Err(e) => return Err(e),
        };

        Ok(self.publish(index).await)
    }

    async fn current(&self) -> Option<Arc<QueryPipeline>> {
        self.active.read().await.as_ref().map(Arc::clone)
    }

    async fn publish(&self, index: VectorIndex) -> Arc<QueryPipeline> {
        let pipeline = Arc::new(QueryPipeline::new(
            Arc::new(index),
            Arc::clone(&self.embedder),
            Arc::clone(&self.generator),
            self.template.clone(),
            self.top_k,
        ));

        *self.active.write().await = Some(Arc::clone(&pipeline));
        info!(
            "Published index of {} chunks",
            pipeline.index().len()
        );
        pipeline
    }

    fn write_temp_file(&self, bytes: &[u8]) -> Result<NamedTempFile> {
        std::fs::create_dir_all(&self.upload_dir)?;

        let mut temp_file = tempfile::Builder::new()
            .prefix("upload-")
            .suffix(".pdf")
            .tempfile_in(&self.upload_dir)?;
        temp_file.write_all(bytes)?;
        temp_file.flush()?;

        debug!("Staged upload at {}", temp_file.path().display());
        Ok(temp_file)
    }
}
