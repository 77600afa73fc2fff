pub mod text;

// Re-export the splitter for external use
pub use text::{
    MARKDOWN_DELIMITERS, PROSE_DELIMITERS, SplitterError, TextChunk, TextSplitter,
    get_delimiters_for_path,
};
