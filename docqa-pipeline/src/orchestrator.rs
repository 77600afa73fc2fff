//! The pipeline orchestrator.
//!
//! [`PipelineOrchestrator`] owns one chunker, embedder, vector index and
//! generator, and composes them into two transactions:
//!
//! ```text
//! ingest: Chunker ─→ Embedder.embed_texts ─→ VectorIndex.add
//! query:  health check ─→ Embedder.embed_text ─→ VectorIndex.search ─→ Generator.generate
//! ```
//!
//! Neither transaction returns a raw backend error: failures come back as
//! `status: "error"` results. Only an invalid configuration stops the
//! orchestrator from being built.
//!
//! The generator's health is tracked in a [`ConnectionState`]. It is set by
//! probing at construction, and a degraded generator is probed again before
//! each query. Reading the state never waits on a probe. Probes are
//! single-flight: callers that queue behind a running probe take its outcome
//! instead of probing again, so a burst of queries against a dead backend
//! costs one probe.

use crate::config::{EmbeddingBackend, PipelineConfig};
use crate::document::{Chunker, DocumentChunker};
use crate::error::{PipelineError, Result, with_timeout};
use crate::generator::{Generator, OllamaGenerator};
use crate::index::{IndexedRecord, RecordMetadata, SqliteVectorIndex, VectorIndex};
use crate::result::{
    DocumentList, IngestResult, QueryResult, RemoveResult, ResultStatus, Source, StatusReport,
    format_elapsed,
};
use docqa_embed::{EmbedError, EmbeddingProvider, FastEmbedProvider, HashEmbedProvider};
use serde::Serialize;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;
use tokio::sync::Mutex;

/// Health of the generation backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Not probed yet; only seen during construction
    Uninitialized,
    Healthy,
    Degraded,
}

impl ConnectionState {
    pub fn generator_ready(self) -> bool {
        self == ConnectionState::Healthy
    }
}

/// The four backends an orchestrator coordinates.
#[derive(Clone)]
pub struct PipelineComponents {
    pub chunker: Arc<dyn Chunker>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub index: Arc<dyn VectorIndex>,
    pub generator: Arc<dyn Generator>,
}

pub struct PipelineOrchestrator {
    config: PipelineConfig,
    chunker: Arc<dyn Chunker>,
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    generator: Arc<dyn Generator>,
    /// Only ever locked for a copy or a store, never across an `.await`
    state: RwLock<ConnectionState>,
    /// Serializes probes
    probe_lock: Mutex<()>,
    /// Number of completed probes
    probe_epoch: AtomicU64,
}

impl std::fmt::Debug for PipelineOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineOrchestrator")
            .field("config", &self.config)
            .field("embedder", &self.embedder.provider_name())
            .field("generator", &self.generator.model_name())
            .finish()
    }
}

impl PipelineOrchestrator {
    /// Build an orchestrator from explicit components.
    ///
    /// Validates `config`, checks that the chunker, embedder and index agree
    /// with it, then probes the generator once.
    pub async fn new(config: PipelineConfig, components: PipelineComponents) -> Result<Self> {
        config.validate()?;

        let chunking = &config.chunking;
        let (chunk_size, chunk_overlap) = (
            components.chunker.chunk_size(),
            components.chunker.chunk_overlap(),
        );
        if (chunk_size, chunk_overlap) != (chunking.chunk_size, chunking.chunk_overlap) {
            return Err(PipelineError::config(format!(
                "chunker splits at {chunk_size}/{chunk_overlap}, configured chunking is {}/{}",
                chunking.chunk_size, chunking.chunk_overlap
            )));
        }

        let dimension = config.embedding.dimension;
        let embedder_dimension = components.embedder.embedding_dimension();
        if embedder_dimension != dimension {
            return Err(PipelineError::config(format!(
                "embedder produces {embedder_dimension}-dimensional vectors, configured dimension is {dimension}"
            )));
        }
        let index_dimension = components.index.dimension();
        if index_dimension != dimension {
            return Err(PipelineError::config(format!(
                "vector index holds {index_dimension}-dimensional vectors, configured dimension is {dimension}"
            )));
        }

        let orchestrator = Self {
            config,
            chunker: components.chunker,
            embedder: components.embedder,
            index: components.index,
            generator: components.generator,
            state: RwLock::new(ConnectionState::Uninitialized),
            probe_lock: Mutex::new(()),
            probe_epoch: AtomicU64::new(0),
        };

        let state = orchestrator.check_health().await;
        tracing::info!(
            "Pipeline ready: embedder={} ({}), generator={} ({:?})",
            orchestrator.embedder.model_name(),
            orchestrator.embedder.provider_name(),
            orchestrator.generator.model_name(),
            state
        );
        Ok(orchestrator)
    }

    /// Build an orchestrator with the default backends described by `config`:
    /// the document chunker, a FastEmbed or hashing embedder, the SQLite index
    /// and an Ollama generator.
    pub async fn from_config(config: PipelineConfig) -> Result<Self> {
        config.validate()?;

        let chunker = DocumentChunker::new(
            config.chunking.chunk_size,
            config.chunking.chunk_overlap,
        )?;

        let embedder: Arc<dyn EmbeddingProvider> = match config.embedding.backend {
            EmbeddingBackend::Fastembed => Arc::new(
                FastEmbedProvider::create(config.embedding.model.clone())
                    .await
                    .map_err(|e| {
                        PipelineError::config(format!("cannot load embedding model: {e}"))
                    })?,
            ),
            EmbeddingBackend::Hash => Arc::new(
                HashEmbedProvider::new(config.embedding.dimension)
                    .map_err(|e| PipelineError::config(e.to_string()))?,
            ),
        };

        let index = SqliteVectorIndex::open(&config.index.path, config.embedding.dimension)
            .await
            .map_err(|e| match e {
                PipelineError::Configuration(message) => PipelineError::Configuration(message),
                other => PipelineError::config(format!(
                    "cannot open vector index at {}: {other}",
                    config.index.path.display()
                )),
            })?
            .with_replace_on_reingest(config.index.replace_on_reingest);

        let generator = OllamaGenerator::new(&config.generator)?;

        let components = PipelineComponents {
            chunker: Arc::new(chunker),
            embedder,
            index: Arc::new(index),
            generator: Arc::new(generator),
        };
        Self::new(config, components).await
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Probe the generator and record the outcome.
    ///
    /// If another probe finishes while this call waits for its turn, that
    /// outcome is returned without probing again.
    pub async fn check_health(&self) -> ConnectionState {
        let epoch = self.probe_epoch.load(Ordering::Acquire);
        let _probing = self.probe_lock.lock().await;
        if self.probe_epoch.load(Ordering::Acquire) != epoch {
            return self.state();
        }
        self.probe().await
    }

    /// Probe only if the generator is not known to be healthy.
    async fn refresh_state(&self) -> ConnectionState {
        match self.state() {
            ConnectionState::Healthy => ConnectionState::Healthy,
            _ => self.check_health().await,
        }
    }

    /// Runs with `probe_lock` held.
    async fn probe(&self) -> ConnectionState {
        let limit = self.config.generator.probe_timeout();
        let alive = match tokio::time::timeout(limit, self.generator.probe()).await {
            Ok(alive) => alive,
            Err(_) => {
                tracing::warn!("Generator probe timed out after {}", format_elapsed(limit));
                false
            }
        };

        let next = if alive {
            ConnectionState::Healthy
        } else {
            ConnectionState::Degraded
        };
        let previous = {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *state, next)
        };
        self.probe_epoch.fetch_add(1, Ordering::AcqRel);

        if previous != next {
            match next {
                ConnectionState::Healthy => tracing::info!("Generator is reachable"),
                _ => tracing::warn!(
                    "Generator {} is unavailable, queries will fail until it recovers",
                    self.generator.model_name()
                ),
            }
        }
        next
    }

    /// Chunk, embed and store one document.
    ///
    /// Either every chunk is stored or nothing is; on error
    /// `chunks_processed` is 0.
    pub async fn ingest(&self, path: &Path) -> IngestResult {
        let start = Instant::now();
        tracing::info!("Ingesting {}", path.display());

        match self.try_ingest(path).await {
            Ok(count) => {
                let elapsed = start.elapsed();
                tracing::info!(
                    "Ingested {} chunks from {} in {}",
                    count,
                    path.display(),
                    format_elapsed(elapsed)
                );
                IngestResult::success(path, count, elapsed)
            }
            Err(e) => {
                tracing::warn!("Ingest of {} failed: {}", path.display(), e);
                IngestResult::failure(path, e, start.elapsed())
            }
        }
    }

    async fn try_ingest(&self, path: &Path) -> Result<usize> {
        let document = self.chunker.chunk(path).await?;
        if document.chunks.is_empty() {
            return Err(PipelineError::parse(path, "document produced no chunks"));
        }

        let texts: Vec<String> = document.chunks.iter().map(|c| c.text.clone()).collect();
        tracing::debug!("Embedding {} chunks of {}", texts.len(), document.source.id);
        let embedded = with_timeout("embedding", self.config.embedding.timeout(), async {
            self.embedder
                .embed_texts(&texts)
                .await
                .map_err(PipelineError::from)
        })
        .await?;

        if embedded.len() != document.chunks.len() {
            return Err(EmbedError::embedding_gen(format!(
                "expected {} embeddings, got {}",
                document.chunks.len(),
                embedded.len()
            ))
            .into());
        }

        let records = document
            .chunks
            .into_iter()
            .zip(embedded.embeddings)
            .map(|(chunk, embedding)| IndexedRecord {
                embedding,
                text: chunk.text,
                metadata: RecordMetadata {
                    document: chunk.document,
                    page: chunk.page,
                },
            })
            .collect();

        self.index.add(&document.source, records).await
    }

    /// Answer `question` from the indexed documents.
    ///
    /// `documents` restricts retrieval to the given document identifiers.
    pub async fn query(&self, question: &str, documents: Option<&[String]>) -> QueryResult {
        let start = Instant::now();
        tracing::info!("Query: {}", question);

        match self.try_query(question, documents).await {
            Ok((answer, sources)) => {
                let elapsed = start.elapsed();
                tracing::info!(
                    "Answered from {} sources in {}",
                    sources.len(),
                    format_elapsed(elapsed)
                );
                QueryResult::success(question, answer, sources, elapsed)
            }
            Err(e) => {
                tracing::warn!("Query failed: {}", e);
                QueryResult::failure(question, e, start.elapsed())
            }
        }
    }

    async fn try_query(
        &self,
        question: &str,
        documents: Option<&[String]>,
    ) -> Result<(String, Vec<Source>)> {
        if !self.refresh_state().await.generator_ready() {
            return Err(PipelineError::generation(format!(
                "generator {} is unavailable; make sure the generation service is running",
                self.generator.model_name()
            )));
        }

        let vector = with_timeout("embedding", self.config.embedding.timeout(), async {
            self.embedder
                .embed_text(question)
                .await
                .map_err(PipelineError::from)
        })
        .await?;

        let hits = self
            .index
            .search(&vector, self.config.retrieval.top_k, documents)
            .await?;
        tracing::debug!("Retrieved {} chunks", hits.len());

        let context = hits
            .iter()
            .map(|hit| hit.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let answer = with_timeout(
            "generation",
            self.config.generator.timeout(),
            self.generator.generate(&context, question),
        )
        .await?;

        let sources = hits
            .into_iter()
            .map(|hit| Source {
                document: hit.metadata.document,
                page: hit.metadata.page,
            })
            .collect();
        Ok((answer, sources))
    }

    /// Current settings and generator health. Does not probe and does not
    /// wait for a running probe; see [`check_health`](Self::check_health).
    pub fn status(&self) -> StatusReport {
        let state = self.state();
        StatusReport {
            generator_ready: state.generator_ready(),
            state,
            embedding_dimension: self.embedder.embedding_dimension(),
            chunk_size: self.config.chunking.chunk_size,
            chunk_overlap: self.config.chunking.chunk_overlap,
            embedding_model: self.embedder.model_name().to_string(),
            generator_model: self.generator.model_name().to_string(),
            top_k: self.config.retrieval.top_k,
        }
    }

    pub async fn list_documents(&self) -> DocumentList {
        match self.index.list_documents().await {
            Ok(documents) => DocumentList {
                status: ResultStatus::Success,
                documents,
                error: None,
            },
            Err(e) => {
                tracing::warn!("Listing documents failed: {}", e);
                DocumentList {
                    status: ResultStatus::Error,
                    documents: Vec::new(),
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// Delete a document and its records from the index.
    pub async fn remove_document(&self, id: &str) -> RemoveResult {
        let outcome = match self.index.remove_document(id).await {
            Ok(0) => Err(format!("no records for document {id}")),
            Ok(removed) => Ok(removed),
            Err(e) => Err(e.to_string()),
        };

        match outcome {
            Ok(records_removed) => RemoveResult {
                status: ResultStatus::Success,
                document: id.to_string(),
                records_removed,
                error: None,
            },
            Err(error) => {
                tracing::warn!("Removing {} failed: {}", id, error);
                RemoveResult {
                    status: ResultStatus::Error,
                    document: id.to_string(),
                    records_removed: 0,
                    error: Some(error),
                }
            }
        }
    }
}
