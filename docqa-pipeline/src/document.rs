//! Loading documents and cutting them into chunks.
//!
//! PDFs are read page by page with `lopdf`, so every chunk knows the 1-based
//! page it came from. Plain text and Markdown files are read as a single
//! unpaged page.

use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use docqa_context::{MARKDOWN_DELIMITERS, PROSE_DELIMITERS, TextSplitter};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Identity and file attributes of a loaded document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentSource {
    /// Identifier used in record metadata and provenance (the file name)
    pub id: String,
    pub path: PathBuf,
    pub size: u64,
    pub modified_at: Option<DateTime<Utc>>,
    /// Hex-encoded blake3 hash of the raw bytes
    pub content_hash: String,
}

/// Text of one page. `number` is `None` for documents without pages.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub number: Option<u32>,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct LoadedDocument {
    pub source: DocumentSource,
    pub pages: Vec<Page>,
}

/// A contiguous piece of one page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chunk {
    pub text: String,
    pub document: String,
    pub page: Option<u32>,
    /// Position of the chunk within the whole document
    pub sequence: usize,
    /// Byte offset within the page text
    pub start: usize,
}

#[derive(Debug, Clone)]
pub struct ChunkedDocument {
    pub source: DocumentSource,
    pub chunks: Vec<Chunk>,
}

/// Turns a document path into chunks.
#[async_trait]
pub trait Chunker: Send + Sync {
    /// Load and split the document at `path`.
    ///
    /// Fails with [`PipelineError::NotFound`] when the path is not a readable
    /// file and with [`PipelineError::Parse`] when no text can be extracted.
    async fn chunk(&self, path: &Path) -> Result<ChunkedDocument>;

    /// Maximum chunk length in characters
    fn chunk_size(&self) -> usize;

    /// Characters shared by consecutive chunks
    fn chunk_overlap(&self) -> usize;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DocumentKind {
    Pdf,
    Text,
    Markdown,
}

impl DocumentKind {
    fn detect(path: &Path, bytes: &[u8]) -> Option<Self> {
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase());
        match ext.as_deref() {
            Some("pdf") => Some(Self::Pdf),
            Some("txt") | Some("text") => Some(Self::Text),
            Some("md") | Some("markdown") => Some(Self::Markdown),
            _ if bytes.starts_with(b"%PDF-") => Some(Self::Pdf),
            _ => None,
        }
    }
}

/// Read a document from disk and extract the text of each page.
pub async fn load_document(path: &Path) -> Result<LoadedDocument> {
    let not_found = || PipelineError::NotFound {
        path: path.to_path_buf(),
    };

    let metadata = tokio::fs::metadata(path).await.map_err(|_| not_found())?;
    if !metadata.is_file() {
        return Err(not_found());
    }
    let bytes = tokio::fs::read(path).await.map_err(|_| not_found())?;

    let id = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(not_found)?;

    let kind = DocumentKind::detect(path, &bytes)
        .ok_or_else(|| PipelineError::parse(path, "unsupported document type"))?;

    let source = DocumentSource {
        id,
        path: path.to_path_buf(),
        size: metadata.len(),
        modified_at: metadata.modified().ok().map(DateTime::<Utc>::from),
        content_hash: hex::encode(blake3::hash(&bytes).as_bytes()),
    };

    let pages = match kind {
        DocumentKind::Pdf => tokio::task::spawn_blocking(move || extract_pdf_pages(&bytes))
            .await
            .map_err(|e| PipelineError::parse(path, format!("PDF extraction task failed: {e}")))?
            .map_err(|message| PipelineError::parse(path, message))?,
        DocumentKind::Text | DocumentKind::Markdown => {
            let text = String::from_utf8(bytes)
                .map_err(|_| PipelineError::parse(path, "document is not valid UTF-8"))?;
            vec![Page { number: None, text }]
        }
    };

    if pages.iter().all(|page| page.text.trim().is_empty()) {
        return Err(PipelineError::parse(path, "document has no extractable text"));
    }

    tracing::debug!(
        "Loaded {} ({} bytes, {} pages)",
        source.id,
        source.size,
        pages.len()
    );
    Ok(LoadedDocument { source, pages })
}

/// Extract the text of every page, in page order.
///
/// A page whose content cannot be decoded contributes no text rather than
/// failing the whole document.
fn extract_pdf_pages(bytes: &[u8]) -> std::result::Result<Vec<Page>, String> {
    let document = lopdf::Document::load_mem(bytes).map_err(|e| format!("invalid PDF: {e}"))?;

    let mut pages = Vec::new();
    for number in document.get_pages().into_keys() {
        let text = match document.extract_text(&[number]) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("Skipping text of page {}: {}", number, e);
                String::new()
            }
        };
        pages.push(Page {
            number: Some(number),
            text,
        });
    }
    Ok(pages)
}

/// Default [`Chunker`]: loads PDFs, text and Markdown files and splits them
/// with [`TextSplitter`].
#[derive(Debug, Clone)]
pub struct DocumentChunker {
    prose: TextSplitter,
    markdown: TextSplitter,
}

impl DocumentChunker {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        let build = |delimiters: &[&str]| {
            TextSplitter::new(delimiters, chunk_size, chunk_overlap)
                .map_err(|e| PipelineError::config(e.to_string()))
        };
        Ok(Self {
            prose: build(PROSE_DELIMITERS)?,
            markdown: build(MARKDOWN_DELIMITERS)?,
        })
    }

    /// Split already loaded pages. Sequence numbers run across pages.
    pub fn split_pages(&self, document: &LoadedDocument) -> Vec<Chunk> {
        let splitter = match DocumentKind::detect(&document.source.path, &[]) {
            Some(DocumentKind::Markdown) => &self.markdown,
            _ => &self.prose,
        };

        let mut chunks = Vec::new();
        for page in &document.pages {
            for piece in splitter.split(&page.text) {
                chunks.push(Chunk {
                    text: piece.text,
                    document: document.source.id.clone(),
                    page: page.number,
                    sequence: chunks.len(),
                    start: piece.start,
                });
            }
        }
        chunks
    }
}

#[async_trait]
impl Chunker for DocumentChunker {
    async fn chunk(&self, path: &Path) -> Result<ChunkedDocument> {
        let document = load_document(path).await?;
        let chunks = self.split_pages(&document);
        tracing::debug!("Split {} into {} chunks", document.source.id, chunks.len());
        Ok(ChunkedDocument {
            source: document.source,
            chunks,
        })
    }

    fn chunk_size(&self) -> usize {
        self.prose.max_chunk_chars()
    }

    fn chunk_overlap(&self) -> usize {
        self.prose.overlap_chars()
    }
}
