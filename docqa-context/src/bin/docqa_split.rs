use clap::Parser;
use docqa_context::text::{PROSE_DELIMITERS, TextSplitter, get_delimiters_for_path};
use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

/// Split a text file into overlapping chunks and print them as JSON.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the input text file. If not provided, reads from stdin.
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Maximum length of each chunk, in characters.
    #[arg(short = 's', long, default_value_t = 1000)]
    chunk_size: usize,

    /// Characters shared between consecutive chunks.
    #[arg(short = 'o', long, default_value_t = 200)]
    chunk_overlap: usize,

    /// Comma-separated regex delimiters, most significant first.
    /// Chosen from the input extension when not provided.
    #[arg(short, long, value_delimiter = ',')]
    delimiters: Option<Vec<String>>,
}

fn main() -> io::Result<()> {
    let args = Args::parse();

    let content = match &args.input {
        Some(path) => fs::read_to_string(path)?,
        None => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
    };

    let owned_patterns: Vec<String> = match args.delimiters {
        Some(d) => d,
        None => args
            .input
            .as_deref()
            .map(get_delimiters_for_path)
            .unwrap_or(PROSE_DELIMITERS)
            .iter()
            .map(|&s| s.to_string())
            .collect(),
    };
    let patterns: Vec<&str> = owned_patterns.iter().map(|s| s.as_str()).collect();

    let splitter = TextSplitter::new(&patterns, args.chunk_size, args.chunk_overlap)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

    let chunks = splitter.split(&content);
    println!("{}", serde_json::to_string_pretty(&chunks)?);

    Ok(())
}
