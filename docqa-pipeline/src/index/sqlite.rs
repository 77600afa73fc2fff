//! SQLite-backed vector index.
//!
//! Vectors are stored as little-endian f16 blobs and scored by brute force in
//! Rust, which is plenty for a personal document collection.
//!
//! ## Database Schema
//!
//! ```sql
//! -- Key/value settings fixed at creation (currently just the dimension)
//! CREATE TABLE index_meta (
//!     key TEXT PRIMARY KEY,
//!     value TEXT NOT NULL
//! );
//!
//! -- One row per ingested document
//! CREATE TABLE documents (
//!     id TEXT PRIMARY KEY,             -- file name
//!     path TEXT NOT NULL,
//!     size INTEGER NOT NULL,
//!     modified_at TIMESTAMP,
//!     ingested_at TIMESTAMP NOT NULL,
//!     content_hash TEXT NOT NULL       -- hex blake3 of the raw bytes
//! );
//!
//! -- One row per chunk, in insertion order
//! CREATE TABLE records (
//!     id INTEGER PRIMARY KEY AUTOINCREMENT,
//!     document TEXT NOT NULL,
//!     page INTEGER,                    -- NULL for unpaged documents
//!     content_hash TEXT NOT NULL,
//!     text TEXT NOT NULL,
//!     embedding BLOB NOT NULL
//! );
//! ```
//!
//! The file is opened in WAL mode and every [`add`](VectorIndex::add) runs in
//! a single transaction, so concurrent searches see all of a batch or none.

use super::{DocumentInfo, IndexedRecord, RecordMetadata, SearchHit, VectorIndex, cosine_distance};
use crate::document::DocumentSource;
use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use half::f16;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::path::Path;

#[derive(Clone, Debug)]
pub struct SqliteVectorIndex {
    pool: SqlitePool,
    dimension: usize,
    replace_on_reingest: bool,
}

impl SqliteVectorIndex {
    /// Open (or create) the index stored at `path`.
    ///
    /// A new index records `dimension`; an existing one must have been created
    /// with the same dimension or [`PipelineError::Configuration`] is returned.
    pub async fn open(path: &Path, dimension: usize) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                PipelineError::index(format!("cannot create {}: {e}", parent.display()))
            })?;
        }

        let pool = SqlitePool::connect_with(
            SqliteConnectOptions::new()
                .filename(path)
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
                .busy_timeout(std::time::Duration::from_secs(5))
                .create_if_missing(true)
                .auto_vacuum(sqlx::sqlite::SqliteAutoVacuum::Full)
                .page_size(1 << 16)
                .optimize_on_close(true, 1 << 10),
        )
        .await?;
        tracing::info!("Opened vector index at {}", path.display());
        Self::new_with_pool(pool, dimension).await
    }

    /// In-memory index, mostly for tests. Limited to one connection so every
    /// query sees the same database.
    pub async fn open_memory(dimension: usize) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        Self::new_with_pool(pool, dimension).await
    }

    async fn new_with_pool(pool: SqlitePool, dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(PipelineError::config("index dimension must be greater than 0"));
        }
        Self::create_tables(&pool).await?;
        Self::check_dimension(&pool, dimension).await?;
        Ok(Self {
            pool,
            dimension,
            replace_on_reingest: false,
        })
    }

    /// When enabled, adding a document first drops records whose source had
    /// the same content hash.
    pub fn with_replace_on_reingest(mut self, replace: bool) -> Self {
        self.replace_on_reingest = replace;
        self
    }

    async fn create_tables(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS index_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                path TEXT NOT NULL,
                size INTEGER NOT NULL,
                modified_at TIMESTAMP,
                ingested_at TIMESTAMP NOT NULL,
                content_hash TEXT NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                document TEXT NOT NULL,
                page INTEGER,
                content_hash TEXT NOT NULL,
                text TEXT NOT NULL,
                embedding BLOB NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_records_document ON records(document)")
            .execute(pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_records_content_hash ON records(content_hash)")
            .execute(pool)
            .await?;

        Ok(())
    }

    async fn check_dimension(pool: &SqlitePool, dimension: usize) -> Result<()> {
        let stored: Option<String> =
            sqlx::query_scalar("SELECT value FROM index_meta WHERE key = 'dimension'")
                .fetch_optional(pool)
                .await?;

        match stored {
            None => {
                sqlx::query("INSERT INTO index_meta (key, value) VALUES ('dimension', ?1)")
                    .bind(dimension.to_string())
                    .execute(pool)
                    .await?;
                tracing::debug!("Created index with dimension {}", dimension);
                Ok(())
            }
            Some(value) => {
                let existing: usize = value.parse().map_err(|_| {
                    PipelineError::index(format!("corrupt dimension entry {value:?}"))
                })?;
                if existing != dimension {
                    return Err(PipelineError::config(format!(
                        "index was created with dimension {existing}, embedder produces {dimension}"
                    )));
                }
                Ok(())
            }
        }
    }

    fn validate(&self, record: &IndexedRecord) -> Result<()> {
        if record.metadata.document.trim().is_empty() {
            return Err(PipelineError::index("record has no document identifier"));
        }
        if record.embedding.len() != self.dimension {
            return Err(PipelineError::config(format!(
                "embedding has dimension {}, index expects {}",
                record.embedding.len(),
                self.dimension
            )));
        }
        Ok(())
    }

    /// Remove every record and document, keeping the recorded dimension.
    pub async fn clear(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM records").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM documents").execute(&mut *tx).await?;
        tx.commit().await?;
        tracing::info!("Cleared vector index");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn decode_embedding(bytes: &[u8]) -> Vec<f16> {
    bytes
        .chunks_exact(2)
        .map(|pair| f16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

#[async_trait]
impl VectorIndex for SqliteVectorIndex {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn add(&self, document: &DocumentSource, records: Vec<IndexedRecord>) -> Result<usize> {
        for record in &records {
            self.validate(record)?;
        }

        let mut tx = self.pool.begin().await?;

        if self.replace_on_reingest {
            let removed = sqlx::query("DELETE FROM records WHERE content_hash = ?1")
                .bind(&document.content_hash)
                .execute(&mut *tx)
                .await?
                .rows_affected();
            sqlx::query("DELETE FROM documents WHERE content_hash = ?1 AND id <> ?2")
                .bind(&document.content_hash)
                .bind(&document.id)
                .execute(&mut *tx)
                .await?;
            if removed > 0 {
                tracing::info!(
                    "Replaced {} records from an earlier ingest of {}",
                    removed,
                    document.id
                );
            }
        }

        sqlx::query(
            r#"
            INSERT INTO documents (id, path, size, modified_at, ingested_at, content_hash)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(id) DO UPDATE SET
                path = excluded.path,
                size = excluded.size,
                modified_at = excluded.modified_at,
                ingested_at = excluded.ingested_at,
                content_hash = excluded.content_hash
            "#,
        )
        .bind(&document.id)
        .bind(document.path.to_string_lossy().into_owned())
        .bind(document.size as i64)
        .bind(document.modified_at)
        .bind(Utc::now())
        .bind(&document.content_hash)
        .execute(&mut *tx)
        .await?;

        for record in &records {
            sqlx::query(
                r#"
                INSERT INTO records (document, page, content_hash, text, embedding)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
            )
            .bind(&record.metadata.document)
            .bind(record.metadata.page.map(i64::from))
            .bind(&document.content_hash)
            .bind(&record.text)
            .bind(bytemuck::cast_slice::<f16, u8>(&record.embedding))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        tracing::debug!("Stored {} records for {}", records.len(), document.id);
        Ok(records.len())
    }

    async fn search(
        &self,
        query: &[f16],
        k: usize,
        documents: Option<&[String]>,
    ) -> Result<Vec<SearchHit>> {
        if query.len() != self.dimension {
            return Err(PipelineError::config(format!(
                "query has dimension {}, index expects {}",
                query.len(),
                self.dimension
            )));
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let rows = match documents {
            Some([]) => return Ok(Vec::new()),
            Some(ids) => {
                let placeholders = vec!["?"; ids.len()].join(", ");
                let sql = format!(
                    "SELECT document, page, text, embedding FROM records WHERE document IN ({placeholders}) ORDER BY id"
                );
                let mut q = sqlx::query(&sql);
                for id in ids {
                    q = q.bind(id);
                }
                q.fetch_all(&self.pool).await?
            }
            None => {
                sqlx::query("SELECT document, page, text, embedding FROM records ORDER BY id")
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        let mut hits = Vec::with_capacity(rows.len());
        for row in rows {
            let embedding: Vec<u8> = row.try_get("embedding")?;
            let page: Option<i64> = row.try_get("page")?;
            hits.push(SearchHit {
                distance: cosine_distance(query, &decode_embedding(&embedding)),
                text: row.try_get("text")?,
                metadata: RecordMetadata {
                    document: row.try_get("document")?,
                    page: page.and_then(|p| u32::try_from(p).ok()),
                },
            });
        }

        // Stable sort keeps insertion order among equal distances
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits.truncate(k);
        Ok(hits)
    }

    async fn record_count(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM records")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }

    async fn list_documents(&self) -> Result<Vec<DocumentInfo>> {
        let rows = sqlx::query(
            r#"
            SELECT d.id, d.path, d.size, d.modified_at, d.ingested_at, d.content_hash,
                   (SELECT COUNT(*) FROM records r WHERE r.document = d.id) AS chunk_count
            FROM documents d
            ORDER BY d.ingested_at, d.id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut documents = Vec::with_capacity(rows.len());
        for row in rows {
            let size: i64 = row.try_get("size")?;
            let chunk_count: i64 = row.try_get("chunk_count")?;
            let modified_at: Option<DateTime<Utc>> = row.try_get("modified_at")?;
            documents.push(DocumentInfo {
                id: row.try_get("id")?,
                path: row.try_get("path")?,
                size: size as u64,
                modified_at,
                ingested_at: row.try_get("ingested_at")?,
                content_hash: row.try_get("content_hash")?,
                chunk_count: chunk_count as usize,
            });
        }
        Ok(documents)
    }

    async fn remove_document(&self, id: &str) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        let removed = sqlx::query("DELETE FROM records WHERE document = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        sqlx::query("DELETE FROM documents WHERE id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!("Removed {} records of {}", removed, id);
        Ok(removed as usize)
    }
}
