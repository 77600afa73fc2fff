//! Overlapping text splitting for retrieval.
//!
//! Document text is cut into chunks small enough to embed, while keeping each
//! chunk on natural boundaries whenever possible. Consecutive chunks share a
//! configurable number of trailing characters so that a sentence straddling a
//! boundary stays retrievable from either side.
//!
//! The module defines two main items:
//! - [`TextSplitter`]: holds the delimiter hierarchy, the maximum chunk size and
//!   the overlap, and turns a string into chunks.
//! - [`TextChunk`]: one segment of the input, with its position in the sequence
//!   and its byte offset in the source text.
//!
//! # Splitting Policy
//!
//! *   **Recursive Segmentation**: the text is first cut on the most significant
//!     delimiter (paragraph breaks). Any piece still longer than the maximum is cut
//!     on the next delimiter (sentence ends, then line breaks, then whitespace),
//!     and as a last resort on character boundaries.
//! *   **Greedy Merging**: the resulting segments are packed left to right into
//!     chunks of at most `max_chunk_chars` characters.
//! *   **Overlap**: when a chunk is closed, its trailing segments totalling at most
//!     `overlap_chars` characters are carried into the next chunk.
//! *   **No Gaps**: every chunk is a contiguous slice of the input and each chunk
//!     starts at or before the end of the previous one, so the input can be
//!     rebuilt from the chunks and their offsets.
//!
//! Sizes are measured in characters, not bytes.
//!
//! # Usage
//!
//! ```
//! use docqa_context::text::{PROSE_DELIMITERS, TextSplitter};
//!
//! let splitter = TextSplitter::new(PROSE_DELIMITERS, 40, 10).unwrap();
//!
//! let text = "The first sentence is here. The second sentence follows it.\n\nA new paragraph.";
//! let chunks = splitter.split(text);
//!
//! assert!(chunks.len() > 1);
//! for chunk in &chunks {
//!     assert!(chunk.char_len() <= 40);
//!     assert_eq!(&text[chunk.start..chunk.end()], chunk.text);
//! }
//! ```
use regex::Regex;
use serde::Serialize;
use std::collections::VecDeque;
use std::ops::Range;
use std::path::Path;

/// Delimiters for prose such as text extracted from PDF pages.
///
/// Ordered from most to least significant:
///
/// - `\n[ \t]*\n`: blank lines between paragraphs.
/// - `[.!?]+["')\]]*\s+`: sentence terminators and the whitespace after them.
/// - `\n`: single line breaks.
/// - `[ \t]+`: runs of spaces between words.
pub const PROSE_DELIMITERS: &[&str] = &[
    r"\n[ \t]*\n",         // Paragraphs
    r#"[.!?]+["')\]]*\s+"#, // Sentence ends
    r"\n",                 // Line breaks
    r"[ \t]+",             // Words
];

/// Delimiters for Markdown documents.
///
/// Headings and code fences are tried before the prose hierarchy.
pub const MARKDOWN_DELIMITERS: &[&str] = &[
    r"(?m)^#{1,6}[ \t]+.*$", // Headings
    r"```",                  // Code block fences
    r"\n[ \t]*\n",           // Paragraphs
    r"(?m)^[ \t]*[-*+][ \t]+", // List items
    r#"[.!?]+["')\]]*\s+"#,  // Sentence ends
    r"\n",                   // Line breaks
    r"[ \t]+",               // Words
];

/// Pick the delimiter hierarchy for a document based on its extension.
///
/// ```
/// use std::path::Path;
/// use docqa_context::{MARKDOWN_DELIMITERS, PROSE_DELIMITERS, get_delimiters_for_path};
///
/// assert_eq!(get_delimiters_for_path(Path::new("notes.md")), MARKDOWN_DELIMITERS);
/// assert_eq!(get_delimiters_for_path(Path::new("paper.pdf")), PROSE_DELIMITERS);
/// ```
pub fn get_delimiters_for_path(path: &Path) -> &'static [&'static str] {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .as_deref()
    {
        Some("md") | Some("markdown") => MARKDOWN_DELIMITERS,
        _ => PROSE_DELIMITERS,
    }
}

/// Rejected splitter settings.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SplitterError {
    #[error("chunk size must be greater than zero")]
    ZeroChunkSize,

    #[error("chunk overlap ({overlap}) must be smaller than chunk size ({max})")]
    OverlapTooLarge { overlap: usize, max: usize },

    #[error("invalid delimiter pattern {pattern:?}: {message}")]
    InvalidDelimiter { pattern: String, message: String },
}

/// Splits text into bounded, overlapping chunks.
#[derive(Debug, Clone)]
pub struct TextSplitter {
    delimiters: Vec<Regex>,
    max_chunk_chars: usize,
    overlap_chars: usize,
}

/// A single chunk produced by [`TextSplitter::split`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextChunk {
    /// Position of this chunk in the output sequence (0-indexed).
    pub sequence: usize,
    /// Byte offset of the chunk in the text that was split.
    pub start: usize,
    /// The chunk text.
    pub text: String,
}

impl TextChunk {
    /// Byte offset one past the end of the chunk in the source text.
    pub fn end(&self) -> usize {
        self.start + self.text.len()
    }

    /// Length of the chunk in characters.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

impl TextSplitter {
    /// Creates a splitter from delimiter patterns, a maximum chunk size and an
    /// overlap, both in characters.
    ///
    /// Delimiters are applied in the order given, from most significant to least
    /// significant.
    ///
    /// # Errors
    ///
    /// Fails when `max_chunk_chars` is zero, when `overlap_chars` is not strictly
    /// smaller than `max_chunk_chars`, or when a pattern is not a valid regex.
    pub fn new(
        delimiter_patterns: &[&str],
        max_chunk_chars: usize,
        overlap_chars: usize,
    ) -> Result<Self, SplitterError> {
        if max_chunk_chars == 0 {
            return Err(SplitterError::ZeroChunkSize);
        }
        if overlap_chars >= max_chunk_chars {
            return Err(SplitterError::OverlapTooLarge {
                overlap: overlap_chars,
                max: max_chunk_chars,
            });
        }

        let delimiters = delimiter_patterns
            .iter()
            .map(|&pattern| {
                Regex::new(pattern).map_err(|e| SplitterError::InvalidDelimiter {
                    pattern: pattern.to_string(),
                    message: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            delimiters,
            max_chunk_chars,
            overlap_chars,
        })
    }

    /// Creates a splitter for a document path, choosing delimiters with
    /// [`get_delimiters_for_path`].
    pub fn for_path(
        path: &Path,
        max_chunk_chars: usize,
        overlap_chars: usize,
    ) -> Result<Self, SplitterError> {
        Self::new(get_delimiters_for_path(path), max_chunk_chars, overlap_chars)
    }

    pub fn max_chunk_chars(&self) -> usize {
        self.max_chunk_chars
    }

    pub fn overlap_chars(&self) -> usize {
        self.overlap_chars
    }

    /// Splits `text` into chunks.
    ///
    /// Every chunk is at most `max_chunk_chars` characters long. Chunks made up
    /// only of whitespace are dropped; empty input yields no chunks. The output is
    /// a pure function of the input and the splitter settings.
    ///
    /// ```
    /// use docqa_context::text::{PROSE_DELIMITERS, TextSplitter};
    ///
    /// let splitter = TextSplitter::new(PROSE_DELIMITERS, 1000, 200).unwrap();
    /// let chunks = splitter.split("Short enough to fit in one chunk.");
    ///
    /// assert_eq!(chunks.len(), 1);
    /// assert_eq!(chunks[0].sequence, 0);
    /// assert_eq!(chunks[0].start, 0);
    /// ```
    pub fn split(&self, text: &str) -> Vec<TextChunk> {
        let segments = self.split_recursively_into_segments(text, 0, 0);

        let mut chunks: Vec<TextChunk> = Vec::new();
        // (byte range, char length) of the segments in the chunk being built
        let mut window: VecDeque<(Range<usize>, usize)> = VecDeque::new();
        let mut window_chars = 0;

        for segment in segments {
            let segment_chars = text[segment.clone()].chars().count();

            if window_chars + segment_chars > self.max_chunk_chars && !window.is_empty() {
                self.push_chunk(text, &window, &mut chunks);

                // Keep a tail of at most `overlap_chars` that still leaves room
                // for the incoming segment.
                while window_chars > self.overlap_chars
                    || (window_chars > 0 && window_chars + segment_chars > self.max_chunk_chars)
                {
                    if let Some((_, len)) = window.pop_front() {
                        window_chars -= len;
                    }
                }
            }

            window.push_back((segment, segment_chars));
            window_chars += segment_chars;
        }

        if !window.is_empty() {
            self.push_chunk(text, &window, &mut chunks);
        }

        chunks
    }

    fn push_chunk(
        &self,
        text: &str,
        window: &VecDeque<(Range<usize>, usize)>,
        chunks: &mut Vec<TextChunk>,
    ) {
        let (Some((first, _)), Some((last, _))) = (window.front(), window.back()) else {
            return;
        };
        let chunk_text = &text[first.start..last.end];
        if chunk_text.trim().is_empty() {
            return;
        }
        chunks.push(TextChunk {
            sequence: chunks.len(),
            start: first.start,
            text: chunk_text.to_string(),
        });
    }

    // Recursively cuts `text` into contiguous byte ranges, each no longer than the
    // maximum chunk size. Delimiter matches are kept as their own segments so that
    // the ranges cover the input exactly.
    fn split_recursively_into_segments(
        &self,
        text: &str,
        delimiter_idx: usize,
        current_offset: usize,
    ) -> Vec<Range<usize>> {
        let mut result_segments: Vec<Range<usize>> = Vec::new();

        if text.is_empty() {
            return result_segments;
        }

        // Small enough already
        if text.chars().count() <= self.max_chunk_chars {
            result_segments.push(current_offset..current_offset + text.len());
            return result_segments;
        }

        // Out of delimiters: cut on character boundaries
        if delimiter_idx >= self.delimiters.len() {
            let mut local_start = 0;
            let mut chars_in_piece = 0;
            for (idx, _) in text.char_indices() {
                if chars_in_piece == self.max_chunk_chars {
                    result_segments.push(current_offset + local_start..current_offset + idx);
                    local_start = idx;
                    chars_in_piece = 0;
                }
                chars_in_piece += 1;
            }
            if local_start < text.len() {
                result_segments.push(current_offset + local_start..current_offset + text.len());
            }
            return result_segments;
        }

        let current_delimiter = &self.delimiters[delimiter_idx];
        let mut local_byte_start = 0;

        for mat in current_delimiter.find_iter(text) {
            if mat.start() == mat.end() {
                continue;
            }
            if mat.start() > local_byte_start {
                result_segments.extend(self.split_recursively_into_segments(
                    &text[local_byte_start..mat.start()],
                    delimiter_idx + 1,
                    current_offset + local_byte_start,
                ));
            }
            // The delimiter itself; oversized runs are cut further.
            result_segments.extend(self.split_recursively_into_segments(
                mat.as_str(),
                delimiter_idx + 1,
                current_offset + mat.start(),
            ));
            local_byte_start = mat.end();
        }

        if local_byte_start < text.len() {
            result_segments.extend(self.split_recursively_into_segments(
                &text[local_byte_start..],
                delimiter_idx + 1,
                current_offset + local_byte_start,
            ));
        }

        result_segments
    }
}
