//! Test doubles and fixtures shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use docqa_embed::{EmbedError, EmbeddingProvider, EmbeddingResult, HashEmbedProvider};
use docqa_pipeline::config::{EmbeddingBackend, PipelineConfig};
use docqa_pipeline::document::{DocumentChunker, DocumentSource};
use docqa_pipeline::generator::Generator;
use docqa_pipeline::index::{DocumentInfo, IndexedRecord, SearchHit, SqliteVectorIndex, VectorIndex};
use docqa_pipeline::{PipelineComponents, PipelineError, PipelineOrchestrator};
use half::f16;
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, Stream, dictionary};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const DIMENSION: usize = 384;

/// Configuration with offline embeddings and short timeouts.
pub fn test_config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.embedding.backend = EmbeddingBackend::Hash;
    config.embedding.dimension = DIMENSION;
    config.embedding.timeout_secs = 2.0;
    config.generator.timeout_secs = 1.0;
    config.generator.probe_timeout_secs = 0.2;
    config
}

/// Hashing embedder that counts calls and can be told to fail.
pub struct CountingEmbedder {
    inner: HashEmbedProvider,
    pub calls: AtomicUsize,
    pub fail: AtomicBool,
}

impl CountingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            inner: HashEmbedProvider::new(dimension).unwrap(),
            calls: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for CountingEmbedder {
    async fn embed_texts(&self, texts: &[String]) -> docqa_embed::Result<EmbeddingResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(EmbedError::embedding_gen("embedding service crashed"));
        }
        self.inner.embed_texts(texts).await
    }

    fn embedding_dimension(&self) -> usize {
        self.inner.embedding_dimension()
    }

    fn provider_name(&self) -> &str {
        "counting"
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}

/// SQLite index that counts searches.
pub struct CountingIndex {
    pub inner: SqliteVectorIndex,
    pub searches: AtomicUsize,
}

impl CountingIndex {
    pub async fn new(dimension: usize) -> Self {
        Self {
            inner: SqliteVectorIndex::open_memory(dimension).await.unwrap(),
            searches: AtomicUsize::new(0),
        }
    }

    pub fn searches(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VectorIndex for CountingIndex {
    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    async fn add(
        &self,
        document: &DocumentSource,
        records: Vec<IndexedRecord>,
    ) -> docqa_pipeline::Result<usize> {
        self.inner.add(document, records).await
    }

    async fn search(
        &self,
        query: &[f16],
        k: usize,
        documents: Option<&[String]>,
    ) -> docqa_pipeline::Result<Vec<SearchHit>> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        self.inner.search(query, k, documents).await
    }

    async fn record_count(&self) -> docqa_pipeline::Result<usize> {
        self.inner.record_count().await
    }

    async fn list_documents(&self) -> docqa_pipeline::Result<Vec<DocumentInfo>> {
        self.inner.list_documents().await
    }

    async fn remove_document(&self, id: &str) -> docqa_pipeline::Result<usize> {
        self.inner.remove_document(id).await
    }
}

/// Scriptable generator.
pub struct StubGenerator {
    pub alive: AtomicBool,
    pub fail_generate: AtomicBool,
    pub probe_delay: Duration,
    pub generate_delay: Duration,
    pub probes: AtomicUsize,
    pub generations: AtomicUsize,
    in_flight_probes: AtomicUsize,
    pub max_concurrent_probes: AtomicUsize,
    pub last_context: Mutex<Option<String>>,
}

impl StubGenerator {
    pub fn new(alive: bool) -> Self {
        Self {
            alive: AtomicBool::new(alive),
            fail_generate: AtomicBool::new(false),
            probe_delay: Duration::ZERO,
            generate_delay: Duration::ZERO,
            probes: AtomicUsize::new(0),
            generations: AtomicUsize::new(0),
            in_flight_probes: AtomicUsize::new(0),
            max_concurrent_probes: AtomicUsize::new(0),
            last_context: Mutex::new(None),
        }
    }

    pub fn with_probe_delay(mut self, delay: Duration) -> Self {
        self.probe_delay = delay;
        self
    }

    pub fn with_generate_delay(mut self, delay: Duration) -> Self {
        self.generate_delay = delay;
        self
    }

    pub fn set_alive(&self, alive: bool) {
        self.alive.store(alive, Ordering::SeqCst);
    }

    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    pub fn generations(&self) -> usize {
        self.generations.load(Ordering::SeqCst)
    }

    pub fn last_context(&self) -> Option<String> {
        self.last_context.lock().unwrap().clone()
    }
}

#[async_trait]
impl Generator for StubGenerator {
    async fn generate(&self, context: &str, question: &str) -> docqa_pipeline::Result<String> {
        self.generations.fetch_add(1, Ordering::SeqCst);
        *self.last_context.lock().unwrap() = Some(context.to_string());
        if !self.generate_delay.is_zero() {
            tokio::time::sleep(self.generate_delay).await;
        }
        if self.fail_generate.load(Ordering::SeqCst) {
            return Err(PipelineError::generation("model crashed mid-answer"));
        }
        Ok(format!("Answer to: {question}"))
    }

    async fn probe(&self) -> bool {
        self.probes.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight_probes.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrent_probes.fetch_max(now, Ordering::SeqCst);
        if !self.probe_delay.is_zero() {
            tokio::time::sleep(self.probe_delay).await;
        }
        self.in_flight_probes.fetch_sub(1, Ordering::SeqCst);
        self.alive.load(Ordering::SeqCst)
    }

    fn model_name(&self) -> &str {
        "stub-model"
    }
}

/// Handles to the doubles behind an orchestrator.
pub struct Harness {
    pub pipeline: Arc<PipelineOrchestrator>,
    pub embedder: Arc<CountingEmbedder>,
    pub index: Arc<CountingIndex>,
    pub generator: Arc<StubGenerator>,
}

pub async fn harness(config: PipelineConfig, generator: StubGenerator) -> Harness {
    let embedder = Arc::new(CountingEmbedder::new(config.embedding.dimension));
    let index = Arc::new(CountingIndex::new(config.embedding.dimension).await);
    let generator = Arc::new(generator);
    let chunker = DocumentChunker::new(config.chunking.chunk_size, config.chunking.chunk_overlap)
        .unwrap();

    let components = PipelineComponents {
        chunker: Arc::new(chunker),
        embedder: embedder.clone(),
        index: index.clone(),
        generator: generator.clone(),
    };
    let pipeline = PipelineOrchestrator::new(config, components).await.unwrap();
    Harness {
        pipeline: Arc::new(pipeline),
        embedder,
        index,
        generator,
    }
}

/// Write a PDF with one page per entry of `pages`. Empty entries produce
/// pages without text.
pub fn write_pdf(path: &Path, pages: &[&str]) -> anyhow::Result<()> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for text in pages {
        let operations = if text.is_empty() {
            Vec::new()
        } else {
            vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 11.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ]
        };
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
        });
        kids.push(page_id.into());
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => pages.len() as i64,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.save(path)?;
    Ok(())
}
