//! Vector index abstraction.
//!
//! A [`VectorIndex`] stores `(embedding, text, metadata)` records and answers
//! nearest-neighbour queries by cosine distance. The SQLite implementation in
//! [`sqlite`] is the one the pipeline uses; the trait exists so tests and
//! other backends can stand in for it.
//!
//! ## Architecture
//!
//! ```text
//! PipelineOrchestrator ── VectorIndex ── SqliteVectorIndex (documents + records tables)
//! ```

use crate::document::DocumentSource;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use half::f16;
use serde::Serialize;

pub mod sqlite;

pub use sqlite::SqliteVectorIndex;

/// Provenance attached to every record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordMetadata {
    /// Document identifier (file name); must not be empty
    pub document: String,
    /// 1-based page number, `None` for unpaged documents
    pub page: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexedRecord {
    pub embedding: Vec<f16>,
    pub text: String,
    pub metadata: RecordMetadata,
}

/// One search result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub text: String,
    pub metadata: RecordMetadata,
    /// Cosine distance to the query, `1 - cos(query, record)`
    pub distance: f32,
}

/// A document known to the index.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentInfo {
    pub id: String,
    pub path: String,
    pub size: u64,
    pub modified_at: Option<DateTime<Utc>>,
    pub ingested_at: DateTime<Utc>,
    pub content_hash: String,
    pub chunk_count: usize,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Length of every vector stored in this index
    fn dimension(&self) -> usize;

    /// Register `document` and append `records` in one transaction.
    ///
    /// Either every record is stored or none is. Returns the number of
    /// records written.
    async fn add(&self, document: &DocumentSource, records: Vec<IndexedRecord>) -> Result<usize>;

    /// The `k` records closest to `query`, nearest first.
    ///
    /// When `documents` is given only records of those documents are
    /// considered. Equal distances keep insertion order. An empty index
    /// yields an empty result.
    async fn search(
        &self,
        query: &[f16],
        k: usize,
        documents: Option<&[String]>,
    ) -> Result<Vec<SearchHit>>;

    /// Total number of records
    async fn record_count(&self) -> Result<usize>;

    async fn list_documents(&self) -> Result<Vec<DocumentInfo>>;

    /// Delete a document and all of its records, returning how many records
    /// were removed.
    async fn remove_document(&self, id: &str) -> Result<usize>;
}

/// Cosine distance between two vectors.
///
/// Vectors of different length, or with zero norm, are at distance 1.
pub fn cosine_distance(a: &[f16], b: &[f16]) -> f32 {
    if a.len() != b.len() {
        return 1.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (x.to_f32(), y.to_f32());
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        1.0
    } else {
        1.0 - dot / (norm_a.sqrt() * norm_b.sqrt())
    }
}
