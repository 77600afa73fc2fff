use clap::{Parser, Subcommand};
use docqa_pipeline::config::EmbeddingBackend;
use docqa_pipeline::{PipelineConfig, PipelineOrchestrator};
use serde::Serialize;
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

/// Ask questions about your PDF documents.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Location of the vector index database
    #[arg(short, long, global = true)]
    index: Option<PathBuf>,

    /// Use the built-in hashing embedder instead of downloading a model
    #[arg(long, global = true)]
    offline_embeddings: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Chunk, embed and store documents
    Ingest {
        /// PDF, text or Markdown files
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Answer a question from the stored documents
    Query {
        question: String,
        /// Only retrieve from this document (repeatable)
        #[arg(short, long = "document")]
        documents: Vec<String>,
        /// Number of chunks used as context
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },
    /// Check the generator and show pipeline settings
    Status,
    /// List ingested documents
    Documents,
    /// Remove a document and its chunks from the index
    Remove {
        /// Document identifier (its file name)
        document: String,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run().await {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(2);
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Returns whether every operation succeeded.
async fn run() -> anyhow::Result<bool> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(index) = args.index {
        config.index.path = index;
    }
    if args.offline_embeddings {
        config.embedding.backend = EmbeddingBackend::Hash;
    }
    if let Commands::Query {
        top_k: Some(top_k), ..
    } = &args.command
    {
        config.retrieval.top_k = *top_k;
    }

    let pipeline = PipelineOrchestrator::from_config(config).await?;

    let ok = match args.command {
        Commands::Ingest { paths } => {
            let mut results = Vec::with_capacity(paths.len());
            for path in &paths {
                results.push(pipeline.ingest(path).await);
            }
            let ok = results.iter().all(|r| r.is_success());
            match results.as_slice() {
                [single] => print_json(single)?,
                many => print_json(&many)?,
            }
            ok
        }
        Commands::Query {
            question,
            documents,
            ..
        } => {
            let filter = (!documents.is_empty()).then_some(documents.as_slice());
            let result = pipeline.query(&question, filter).await;
            print_json(&result)?;
            result.is_success()
        }
        Commands::Status => {
            pipeline.check_health().await;
            print_json(&pipeline.status())?;
            true
        }
        Commands::Documents => {
            let list = pipeline.list_documents().await;
            print_json(&list)?;
            list.error.is_none()
        }
        Commands::Remove { document } => {
            let result = pipeline.remove_document(&document).await;
            print_json(&result)?;
            result.error.is_none()
        }
    };
    Ok(ok)
}
