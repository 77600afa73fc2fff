//! Embed a few sentences and print how close each one is to a query.
//!
//! Pass `--offline` to use the hashing embedder instead of downloading a model.

use docqa_embed::{EmbedConfig, EmbeddingProvider, FastEmbedProvider, HashEmbedProvider};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let offline = std::env::args().any(|a| a == "--offline");
    let provider: Box<dyn EmbeddingProvider> = if offline {
        Box::new(HashEmbedProvider::new(384)?)
    } else {
        let temp_dir = tempfile::tempdir()?;
        let config = EmbedConfig::default_with_path(temp_dir.path()).with_batch_size(2);
        Box::new(FastEmbedProvider::create(config).await?)
    };

    println!(
        "provider={} model={} dimension={}",
        provider.provider_name(),
        provider.model_name(),
        provider.embedding_dimension()
    );

    let texts = vec![
        "Rust is a systems programming language.".to_string(),
        "Retrieval finds passages related to a question.".to_string(),
        "Photosynthesis happens in the leaves of plants.".to_string(),
    ];
    let result = provider.embed_texts(&texts).await?;
    let query = provider.embed_text("Which passage talks about plants?").await?;

    for (text, embedding) in texts.iter().zip(&result.embeddings) {
        let similarity: f32 = query
            .iter()
            .zip(embedding)
            .map(|(a, b)| a.to_f32() * b.to_f32())
            .sum();
        println!("{similarity:.3}  {text}");
    }
    Ok(())
}
