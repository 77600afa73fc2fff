//! docqa-pipeline: question answering over a private document collection.
//!
//! Documents (PDF, text, Markdown) are split into overlapping chunks, embedded
//! and stored in a SQLite vector index. A question is embedded the same way,
//! the nearest chunks are handed to a generation model as context, and the
//! answer comes back with the document and page each chunk came from.
//!
//! ## Key Modules
//!
//! - **[`orchestrator`]**: [`PipelineOrchestrator`], the entry point tying everything together
//! - **[`document`]**: loading documents and splitting them into chunks
//! - **[`index`]**: the [`VectorIndex`](index::VectorIndex) trait and its SQLite store
//! - **[`generator`]**: the [`Generator`](generator::Generator) trait and the Ollama client
//! - **[`config`]**: TOML configuration
//! - **[`result`]**: JSON result shapes
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docqa_pipeline::{PipelineConfig, PipelineOrchestrator};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let pipeline = Arc::new(PipelineOrchestrator::from_config(PipelineConfig::default()).await?);
//!
//! let ingested = pipeline.ingest(Path::new("handbook.pdf")).await;
//! println!("stored {} chunks", ingested.chunks_processed);
//!
//! let answer = pipeline.query("How many vacation days do I get?", None).await;
//! println!("{}", serde_json::to_string_pretty(&answer)?);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod document;
pub mod error;
pub mod generator;
pub mod index;
pub mod orchestrator;
pub mod result;

pub use config::PipelineConfig;
pub use error::{PipelineError, Result};
pub use orchestrator::{ConnectionState, PipelineComponents, PipelineOrchestrator};
pub use result::{IngestResult, QueryResult, StatusReport, format_elapsed};
