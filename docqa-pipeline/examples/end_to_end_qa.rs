//! End-to-end question answering without any external services.
//!
//! Writes a couple of text documents to a temporary directory, ingests them
//! with the hashing embedder into a temporary index, and answers a question
//! with a generator that just quotes the best passage. Swap in
//! `PipelineOrchestrator::from_config` to use FastEmbed and Ollama instead.

use anyhow::Result;
use async_trait::async_trait;
use docqa_embed::HashEmbedProvider;
use docqa_pipeline::config::EmbeddingBackend;
use docqa_pipeline::document::DocumentChunker;
use docqa_pipeline::generator::Generator;
use docqa_pipeline::index::SqliteVectorIndex;
use docqa_pipeline::{PipelineComponents, PipelineConfig, PipelineOrchestrator};
use std::sync::Arc;
use tempfile::tempdir;

/// Answers with the first paragraph of the context.
struct QuotingGenerator;

#[async_trait]
impl Generator for QuotingGenerator {
    async fn generate(&self, context: &str, _question: &str) -> docqa_pipeline::Result<String> {
        Ok(context.split("\n\n").next().unwrap_or_default().trim().to_string())
    }

    async fn probe(&self) -> bool {
        true
    }

    fn model_name(&self) -> &str {
        "quoting"
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_writer(std::io::stderr)
        .init();

    let dir = tempdir()?;
    let documents = [
        (
            "trains.txt",
            "The night train to Vienna departs at 22:15 from platform 4.",
        ),
        (
            "museum.md",
            "# Opening hours\n\nThe museum is open from 10:00 to 18:00, closed on Mondays.",
        ),
    ];
    for (name, text) in documents {
        std::fs::write(dir.path().join(name), text)?;
    }

    let mut config = PipelineConfig::default();
    config.embedding.backend = EmbeddingBackend::Hash;
    config.index.path = dir.path().join("index.db");
    let dimension = config.embedding.dimension;

    let components = PipelineComponents {
        chunker: Arc::new(DocumentChunker::new(
            config.chunking.chunk_size,
            config.chunking.chunk_overlap,
        )?),
        embedder: Arc::new(HashEmbedProvider::new(dimension)?),
        index: Arc::new(SqliteVectorIndex::open(&config.index.path, dimension).await?),
        generator: Arc::new(QuotingGenerator),
    };
    let pipeline = PipelineOrchestrator::new(config, components).await?;

    for (name, _) in documents {
        let result = pipeline.ingest(&dir.path().join(name)).await;
        println!("{}", serde_json::to_string_pretty(&result)?);
    }

    let answer = pipeline
        .query("When does the night train to Vienna depart?", None)
        .await;
    println!("{}", serde_json::to_string_pretty(&answer)?);
    Ok(())
}
